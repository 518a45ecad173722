use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

use crate::error::{Error, Result};
use crate::peer::types::{IceCandidate, SessionId};

/// Signaling lifecycle of one peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    New,
    Offering,
    AwaitingAnswer,
    Answering,
    Connected,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::New => "new",
            SessionState::Offering => "offering",
            SessionState::AwaitingAnswer => "awaiting-answer",
            SessionState::Answering => "answering",
            SessionState::Connected => "connected",
            SessionState::Closed => "closed",
        })
    }
}

/// One peer connection and the data channel negotiated on it.
pub struct PeerSession {
    pub id: SessionId,
    pub pc: Arc<RTCPeerConnection>,
    pub channel: Option<Arc<RTCDataChannel>>,
    pub state: SessionState,
    pub transport: RTCPeerConnectionState,
    pub created_at: DateTime<Utc>,
    /// Candidates gathered locally, kept for manual relay
    pub local_candidates: Vec<IceCandidate>,
    /// Remote candidates received before the remote description
    pub pending_remote: Vec<IceCandidate>,
    /// Grace-period task armed when the transport drops
    pub teardown: Option<JoinHandle<()>>,
    seq: u64,
}

impl PeerSession {
    pub fn new(id: SessionId, pc: Arc<RTCPeerConnection>) -> Self {
        Self {
            id,
            pc,
            channel: None,
            state: SessionState::New,
            transport: RTCPeerConnectionState::New,
            created_at: Utc::now(),
            local_candidates: Vec::new(),
            pending_remote: Vec::new(),
            teardown: None,
            seq: 0,
        }
    }

    pub fn channel_open(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|dc| dc.ready_state() == RTCDataChannelState::Open)
    }
}

/// Serializable view of a session for the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: SessionState,
    pub transport: String,
    pub channel_open: bool,
    pub created_at: DateTime<Utc>,
}

/// Resources taken out of a session on teardown.
pub struct Teardown {
    pub pc: Arc<RTCPeerConnection>,
    pub channel: Option<Arc<RTCDataChannel>>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, PeerSession>,
    next_seq: u64,
}

/// Session table shared by the connection manager, the channel handlers and
/// the sync channel. Guards are never held across an `.await`.
#[derive(Clone, Default)]
pub struct SessionTable {
    inner: Arc<Mutex<Inner>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, mut session: PeerSession) {
        let mut inner = self.lock();
        inner.next_seq += 1;
        session.seq = inner.next_seq;
        inner.sessions.insert(session.id.clone(), session);
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }

    /// Runs `f` on the session, or fails with `UnknownSession`.
    pub fn with<R>(&self, id: &str, f: impl FnOnce(&mut PeerSession) -> R) -> Result<R> {
        let mut inner = self.lock();
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| Error::UnknownSession(id.to_string()))?;
        Ok(f(session))
    }

    pub fn pc(&self, id: &str) -> Result<Arc<RTCPeerConnection>> {
        self.with(id, |s| s.pc.clone())
    }

    pub fn state(&self, id: &str) -> Result<SessionState> {
        self.with(id, |s| s.state)
    }

    /// Moves the session to `to` when it currently is in one of `from`.
    pub fn transition(&self, id: &str, from: &[SessionState], to: SessionState) -> Result<()> {
        self.with(id, |s| {
            if from.contains(&s.state) {
                s.state = to;
                Ok(())
            } else {
                Err(Error::InvalidState {
                    session: s.id.clone(),
                    state: s.state,
                })
            }
        })?
    }

    pub fn set_channel(&self, id: &str, dc: Arc<RTCDataChannel>) -> Result<()> {
        self.with(id, |s| s.channel = Some(dc))
    }

    /// Every data channel currently open, across all sessions.
    pub fn open_channels(&self) -> Vec<(SessionId, Arc<RTCDataChannel>)> {
        self.lock()
            .sessions
            .values()
            .filter(|s| s.state != SessionState::Closed && s.channel_open())
            .filter_map(|s| s.channel.clone().map(|dc| (s.id.clone(), dc)))
            .collect()
    }

    /// Most recently created session in `state`.
    pub fn latest_in(&self, state: SessionState) -> Option<SessionId> {
        self.lock()
            .sessions
            .values()
            .filter(|s| s.state == state)
            .max_by_key(|s| s.seq)
            .map(|s| s.id.clone())
    }

    pub fn ids(&self) -> Vec<SessionId> {
        let inner = self.lock();
        let mut sessions: Vec<_> = inner.sessions.values().collect();
        sessions.sort_by_key(|s| s.seq);
        sessions.into_iter().map(|s| s.id.clone()).collect()
    }

    pub fn infos(&self) -> Vec<SessionInfo> {
        let inner = self.lock();
        let mut sessions: Vec<_> = inner.sessions.values().collect();
        sessions.sort_by_key(|s| s.seq);
        sessions
            .into_iter()
            .map(|s| SessionInfo {
                id: s.id.clone(),
                state: s.state,
                transport: s.transport.to_string(),
                channel_open: s.channel_open(),
                created_at: s.created_at,
            })
            .collect()
    }

    /// Marks the session closed and hands back what needs closing.
    /// `None` when it was already closed.
    pub fn mark_closed(&self, id: &str) -> Result<Option<Teardown>> {
        self.with(id, |s| {
            if s.state == SessionState::Closed {
                return None;
            }
            s.state = SessionState::Closed;
            if let Some(handle) = s.teardown.take() {
                handle.abort();
            }
            s.pending_remote.clear();
            Some(Teardown {
                pc: s.pc.clone(),
                channel: s.channel.take(),
            })
        })
    }

    /// Drops closed sessions from the table, returns how many went away.
    pub fn remove_closed(&self) -> usize {
        let mut inner = self.lock();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| s.state != SessionState::Closed);
        before - inner.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::api::APIBuilder;
    use webrtc::peer_connection::configuration::RTCConfiguration;

    async fn session(id: &str) -> PeerSession {
        let api = APIBuilder::new().build();
        let pc = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap();
        PeerSession::new(id.into(), Arc::new(pc))
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let table = SessionTable::new();
        assert!(matches!(table.state("nope"), Err(Error::UnknownSession(_))));
    }

    #[tokio::test]
    async fn transition_checks_current_state() {
        let table = SessionTable::new();
        table.insert(session("a").await);

        table
            .transition("a", &[SessionState::New], SessionState::Offering)
            .unwrap();
        let err = table
            .transition("a", &[SessionState::AwaitingAnswer], SessionState::Connected)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                state: SessionState::Offering,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn latest_in_follows_creation_order() {
        let table = SessionTable::new();
        for id in ["a", "b", "c"] {
            table.insert(session(id).await);
            table
                .transition(id, &[SessionState::New], SessionState::AwaitingAnswer)
                .unwrap();
        }
        table
            .transition("c", &[SessionState::AwaitingAnswer], SessionState::Connected)
            .unwrap();

        assert_eq!(table.latest_in(SessionState::AwaitingAnswer).as_deref(), Some("b"));
        assert_eq!(table.ids(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn closed_sessions_are_pruned_once() {
        let table = SessionTable::new();
        table.insert(session("a").await);
        table.insert(session("b").await);

        assert!(table.mark_closed("a").unwrap().is_some());
        assert!(table.mark_closed("a").unwrap().is_none());
        assert_eq!(table.state("a").unwrap(), SessionState::Closed);
        assert!(table.open_channels().is_empty());

        assert_eq!(table.remove_closed(), 1);
        assert_eq!(table.ids(), vec!["b"]);
    }
}
