use once_cell::sync::OnceCell;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::stats::StatsReportType;

static INIT: OnceCell<()> = OnceCell::new();

/// Installs the fmt subscriber once; honours the config switches.
pub fn init() {
    if !crate::config::LOGGING_ENABLED || !crate::config::dev::ENABLE_LOGGING {
        return;
    }

    INIT.get_or_init(|| {
        // another subscriber may already be installed by the host (tests, desktop shell)
        let _ = tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .try_init();
    });
}

/// Logs an ICE candidate as it shows up (trickle)
pub fn dump_candidate(label: &str, cand: &RTCIceCandidate) {
    if let Ok(init) = cand.to_json() {
        tracing::info!(
            "ICE {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?} username_fragment={:?}",
            init.candidate,
            init.sdp_mid,
            init.sdp_mline_index,
            init.username_fragment
        );
    }
}

/// Quick getStats snapshot of the nominated pair
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, v) in stats.reports {
        if let StatsReportType::CandidatePair(pair) = v {
            if pair.nominated {
                tracing::info!(
                    "STATS {moment}: {}:{}  type: {:?}  bytes={}/{} state={:?}",
                    pair.local_candidate_id,
                    pair.remote_candidate_id,
                    pair.stats_type,
                    pair.bytes_sent,
                    pair.bytes_received,
                    pair.state
                );
            }
        }
    }
}
