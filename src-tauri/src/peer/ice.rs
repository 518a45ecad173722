use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use webrtc::{
    api::APIBuilder,
    ice_transport::{ice_gatherer_state::RTCIceGathererState, ice_server::RTCIceServer},
    peer_connection::{configuration::RTCConfiguration, RTCPeerConnection},
};

use crate::error::Result;
use crate::peer::state::SessionTable;
use crate::peer::types::{IceCandidate, ServerConfig};
use crate::utils::add_ice_url_scheme;

/// How long an availability probe waits for a matching candidate
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Applies a candidate relayed from the remote side, or queues it until
/// the remote description is known.
pub async fn add_remote_candidate(sessions: &SessionTable, candidate: IceCandidate) -> Result<()> {
    tracing::info!("add_remote_candidate: {:?}", candidate);
    let pc = sessions.pc(&candidate.session_id)?;

    if pc.remote_description().await.is_some() {
        pc.add_ice_candidate(candidate.to_init()).await?;
        tracing::info!("remote candidate applied");
    } else {
        tracing::info!("no remote description yet, queueing candidate");
        let id = candidate.session_id.clone();
        sessions.with(&id, |s| s.pending_remote.push(candidate))?;
    }
    Ok(())
}

/// Applies every queued remote candidate once the remote description is set.
pub async fn apply_pending_candidates(sessions: &SessionTable, session_id: &str) -> Result<()> {
    let (pc, candidates) = sessions.with(session_id, |s| {
        (s.pc.clone(), s.pending_remote.drain(..).collect::<Vec<_>>())
    })?;

    for candidate in candidates {
        tracing::info!("applying pending candidate: {:?}", candidate);
        if let Err(e) = pc.add_ice_candidate(candidate.to_init()).await {
            tracing::warn!("failed to apply pending candidate: {e}");
        }
    }
    Ok(())
}

/// Waits until ICE gathering completes, at most `limit`. Candidates
/// gathered by then end up in the local description.
pub async fn wait_for_gathering(pc: &RTCPeerConnection, limit: Duration) {
    let mut done = pc.gathering_complete_promise().await;
    if timeout(limit, done.recv()).await.is_err() {
        tracing::warn!(
            "ICE gathering still running after {} ms, handing out what we have",
            limit.as_millis()
        );
    }
}

pub fn analyze_candidates(candidates: &[IceCandidate]) {
    let mut host_count = 0;
    let mut srflx_count = 0;
    let mut relay_count = 0;

    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            host_count += 1;
        } else if candidate.candidate.contains("typ srflx") {
            srflx_count += 1;
        } else if candidate.candidate.contains("typ relay") {
            relay_count += 1;
        }
    }

    tracing::info!(
        "candidate analysis: {} host, {} srflx, {} relay",
        host_count,
        srflx_count,
        relay_count
    );

    if srflx_count == 0 && relay_count == 0 {
        tracing::warn!("no server-reflexive or relay candidates, peers behind NAT may not connect");
    }
}

/// Probes a single STUN/TURN server: gathers against it alone and waits for
/// a server-reflexive (STUN) or relay (TURN) candidate.
pub async fn check_ice_server_availability(config: &ServerConfig) -> Result<bool> {
    let url = add_ice_url_scheme(config);
    tracing::info!("checking ICE server {url}");

    let rtc_config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: vec![url],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
            ..Default::default()
        }],
        ..Default::default()
    };

    let api = APIBuilder::new().build();
    let pc = Arc::new(api.new_peer_connection(rtc_config).await?);
    let found = probe(&pc, &config.r#type).await;
    let _ = pc.close().await;
    found
}

async fn probe(pc: &Arc<RTCPeerConnection>, server_type: &str) -> Result<bool> {
    let wanted = if server_type == "turn" {
        "typ relay"
    } else {
        "typ srflx"
    };

    let (state_tx, mut state_rx) = mpsc::channel(10);
    pc.on_ice_gathering_state_change(Box::new(move |state| {
        let tx = state_tx.clone();
        Box::pin(async move {
            let _ = tx.send(state).await;
        })
    }));

    let (candidate_tx, mut candidate_rx) = mpsc::channel(10);
    pc.on_ice_candidate(Box::new(move |candidate| {
        let tx = candidate_tx.clone();
        Box::pin(async move {
            let Some(c) = candidate else { return };
            match c.to_json() {
                Ok(json) if json.candidate.contains(wanted) => {
                    tracing::info!("probe got matching candidate: {}", json.candidate);
                    let _ = tx.send(()).await;
                }
                Ok(json) => tracing::debug!("probe skips candidate: {}", json.candidate),
                Err(e) => tracing::warn!("probe candidate unreadable: {e}"),
            }
        })
    }));

    // a data channel gives the offer something to gather for
    pc.create_data_channel("probe", None).await?;
    let offer = pc.create_offer(None).await?;
    pc.set_local_description(offer).await?;

    let gathered = async {
        while let Some(state) = state_rx.recv().await {
            if state == RTCIceGathererState::Complete {
                break;
            }
        }
    };

    let found = tokio::select! {
        result = timeout(PROBE_TIMEOUT, candidate_rx.recv()) => matches!(result, Ok(Some(()))),
        _ = gathered => {
            // gathering may finish right after the matching candidate
            candidate_rx.try_recv().is_ok()
        }
    };
    tracing::info!("ICE server probe result: {found}");
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::peer::state::PeerSession;

    const HOST_CANDIDATE: &str = "candidate:1 1 udp 2130706431 192.168.1.20 54321 typ host";

    async fn table_with(id: &str) -> SessionTable {
        let api = APIBuilder::new().build();
        let pc = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap();
        let table = SessionTable::new();
        table.insert(PeerSession::new(id.into(), Arc::new(pc)));
        table
    }

    fn candidate(session: &str) -> IceCandidate {
        IceCandidate {
            candidate: HOST_CANDIDATE.into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            session_id: session.into(),
        }
    }

    #[tokio::test]
    async fn candidate_before_remote_description_is_queued() {
        let table = table_with("s1").await;

        add_remote_candidate(&table, candidate("s1")).await.unwrap();
        add_remote_candidate(&table, candidate("s1")).await.unwrap();

        let queued = table.with("s1", |s| s.pending_remote.clone()).unwrap();
        assert_eq!(queued, vec![candidate("s1"), candidate("s1")]);
    }

    #[tokio::test]
    async fn pending_candidates_are_drained_once_applied() {
        let table = table_with("s1").await;
        add_remote_candidate(&table, candidate("s1")).await.unwrap();

        // failures to apply are logged, the queue empties either way
        apply_pending_candidates(&table, "s1").await.unwrap();
        assert!(table.with("s1", |s| s.pending_remote.is_empty()).unwrap());
    }

    #[tokio::test]
    async fn candidate_for_unknown_session_is_rejected() {
        let table = table_with("s1").await;
        let err = add_remote_candidate(&table, candidate("other"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownSession(id) if id == "other"));
    }

    #[test]
    fn analysis_accepts_an_empty_list() {
        analyze_candidates(&[]);
    }
}
