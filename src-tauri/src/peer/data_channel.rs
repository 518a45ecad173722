use std::sync::Arc;

use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;

use crate::peer::state::SessionTable;
use crate::sync::DocumentSync;

/// Shared data-channel handler for both sides of a session.
///
/// Handlers are bound as soon as the channel exists, before negotiation
/// finishes. Nothing is buffered for messages that race the `open` event.
pub fn attach_dc(
    dc: &Arc<RTCDataChannel>,
    session_id: &str,
    sessions: &SessionTable,
    sync: &Arc<DocumentSync>,
) {
    tracing::info!("attach_dc: channel '{}' on session {session_id}", dc.label());

    if let Err(e) = sessions.set_channel(session_id, dc.clone()) {
        tracing::warn!("channel for a session that is gone: {e}");
    }

    dc.on_open(Box::new({
        let id = session_id.to_string();
        move || {
            tracing::info!("data channel open on session {id}");
            Box::pin(async {})
        }
    }));

    dc.on_message(Box::new({
        let id = session_id.to_string();
        let sync = sync.clone();
        move |msg: DataChannelMessage| {
            if !msg.is_string {
                tracing::debug!("binary snapshot on session {id}, reading as UTF-8");
            }
            let payload = String::from_utf8_lossy(&msg.data).into_owned();
            sync.on_remote_message(&id, payload);
            Box::pin(async {})
        }
    }));

    dc.on_error(Box::new({
        let id = session_id.to_string();
        move |err| {
            tracing::warn!("data channel error on session {id}: {err}");
            Box::pin(async {})
        }
    }));

    dc.on_close(Box::new({
        let id = session_id.to_string();
        let sessions = sessions.clone();
        move || {
            tracing::info!("data channel closed on session {id}");
            let _ = sessions.with(&id, |s| s.channel = None);
            Box::pin(async {})
        }
    }));
}
