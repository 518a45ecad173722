use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::sleep;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::{
    api::{APIBuilder, API},
    data_channel::{data_channel_init::RTCDataChannelInit, RTCDataChannel},
    ice_transport::ice_server::RTCIceServer,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        RTCPeerConnection,
    },
};

use crate::config::{self, CHANNEL_LABEL};
use crate::error::{Error, Result};
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::peer::data_channel::attach_dc;
use crate::peer::ice::{
    add_remote_candidate, analyze_candidates, apply_pending_candidates, wait_for_gathering,
};
use crate::peer::state::{PeerSession, SessionInfo, SessionState, SessionTable};
use crate::peer::types::{IceCandidate, ServerConfig, SessionId};
use crate::signal::{SdpRole, SessionDescription};
use crate::sync::DocumentSync;
use crate::utils::{add_ice_url_scheme, random_id};

/// Creates peer sessions and drives the offer/answer handshake.
pub struct PeerManager {
    api: API,
    ice_servers: Mutex<Vec<ServerConfig>>,
    sessions: SessionTable,
    sync: Arc<DocumentSync>,
    gather_timeout: Duration,
    grace_period: Duration,
}

impl PeerManager {
    pub fn new(sync: Arc<DocumentSync>, sessions: SessionTable) -> Self {
        Self {
            api: APIBuilder::new().build(),
            ice_servers: Mutex::new(config::default_ice_servers()),
            sessions,
            sync,
            gather_timeout: config::GATHER_TIMEOUT,
            grace_period: config::GRACE_PERIOD,
        }
    }

    pub fn with_ice_servers(self, servers: Vec<ServerConfig>) -> Self {
        *self.ice_servers.lock().unwrap_or_else(PoisonError::into_inner) = servers;
        self
    }

    pub fn with_timeouts(mut self, gather_timeout: Duration, grace_period: Duration) -> Self {
        self.gather_timeout = gather_timeout;
        self.grace_period = grace_period;
        self
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn ice_servers(&self) -> Vec<ServerConfig> {
        self.ice_servers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the servers used by sessions created from now on.
    pub fn set_ice_servers(&self, servers: Vec<ServerConfig>) -> Result<()> {
        config::validate_ice_servers(&servers)?;
        tracing::info!("using {} ICE server(s)", servers.len());
        *self.ice_servers.lock().unwrap_or_else(PoisonError::into_inner) = servers;
        Ok(())
    }

    /// New peer connection with the configured servers.
    pub async fn create_default_session(&self) -> Result<SessionId> {
        let servers = self.ice_servers();
        self.create_session(&servers).await
    }

    /// Allocates a peer connection for the given STUN/TURN servers and
    /// registers it in the session table in state `New`.
    pub async fn create_session(&self, stun_servers: &[ServerConfig]) -> Result<SessionId> {
        let id = random_id();
        let pc = Arc::new(self.api.new_peer_connection(rtc_config(stun_servers)).await?);
        tracing::info!("created peer session {id} with {} ICE server(s)", stun_servers.len());

        self.sessions.insert(PeerSession::new(id.clone(), pc.clone()));
        self.bind_handlers(&id, &pc);
        Ok(id)
    }

    fn bind_handlers(&self, id: &str, pc: &Arc<RTCPeerConnection>) {
        // candidates are logged and kept for manual relay
        pc.on_ice_candidate(Box::new({
            let id = id.to_string();
            let sessions = self.sessions.clone();
            move |cand: Option<RTCIceCandidate>| {
                match cand {
                    Some(c) => {
                        dump_candidate("LOCAL", &c);
                        if let Ok(init) = c.to_json() {
                            let candidate = IceCandidate::from_init(init, id.clone());
                            let _ = sessions.with(&id, |s| s.local_candidates.push(candidate));
                        }
                    }
                    None => tracing::info!("ICE gathering finished for session {id}"),
                }
                Box::pin(async {})
            }
        }));

        pc.on_ice_gathering_state_change(Box::new(move |state| {
            tracing::debug!("ICE gathering state changed to: {:?}", state);
            Box::pin(async {})
        }));

        // answering side: the offerer's channel shows up here
        pc.on_data_channel(Box::new({
            let id = id.to_string();
            let sessions = self.sessions.clone();
            let sync = self.sync.clone();
            move |dc: Arc<RTCDataChannel>| {
                attach_dc(&dc, &id, &sessions, &sync);
                Box::pin(async {})
            }
        }));

        pc.on_peer_connection_state_change(Box::new({
            let id = id.to_string();
            let sessions = self.sessions.clone();
            let grace = self.grace_period;
            let pc = Arc::downgrade(pc);
            move |st: RTCPeerConnectionState| {
                tracing::info!("session {id}: peer connection state {st}");
                let _ = sessions.with(&id, |s| s.transport = st);

                match st {
                    RTCPeerConnectionState::Connected => {
                        let pending = sessions.with(&id, |s| s.teardown.take()).ok().flatten();
                        if let Some(handle) = pending {
                            tracing::info!("session {id} recovered, cancelling teardown");
                            handle.abort();
                        }
                    }
                    RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                        let armed = sessions
                            .with(&id, |s| s.teardown.is_some())
                            .unwrap_or(true);
                        if !armed {
                            if let Some(pc) = pc.upgrade() {
                                arm_teardown(&sessions, &id, pc, grace);
                            }
                        }
                    }
                    RTCPeerConnectionState::Closed => {
                        if matches!(sessions.mark_closed(&id), Ok(Some(_))) {
                            tracing::info!("session {id} closed by the transport");
                        }
                    }
                    _ => {}
                }
                Box::pin(async {})
            }
        }));
    }

    /// Offering side: opens the `doc` channel, commits a local offer and
    /// returns it once ICE gathering settles. A failed negotiation closes
    /// the session.
    pub async fn create_offer(&self, session: &str) -> Result<SessionDescription> {
        self.sessions
            .transition(session, &[SessionState::New], SessionState::Offering)?;

        let desc = match self.negotiate_offer(session).await {
            Ok(desc) => desc,
            Err(e) => return Err(self.abandon(session, e).await),
        };

        self.sessions
            .transition(session, &[SessionState::Offering], SessionState::AwaitingAnswer)?;
        Ok(desc.with_session(session))
    }

    async fn negotiate_offer(&self, session: &str) -> Result<SessionDescription> {
        let pc = self.sessions.pc(session)?;

        let dc = pc
            .create_data_channel(CHANNEL_LABEL, Some(RTCDataChannelInit::default()))
            .await?;
        attach_dc(&dc, session, &self.sessions, &self.sync);

        let offer = pc.create_offer(None).await?;
        pc.set_local_description(offer).await?;
        self.settled_description(session, &pc).await
    }

    /// Answering side: commits the remote offer and returns a committed
    /// answer. A failed negotiation closes the session.
    pub async fn create_answer(
        &self,
        session: &str,
        remote: &SessionDescription,
    ) -> Result<SessionDescription> {
        expect_role(remote, SdpRole::Offer)?;
        self.sessions
            .transition(session, &[SessionState::New], SessionState::Answering)?;

        let desc = match self.negotiate_answer(session, remote).await {
            Ok(desc) => desc,
            Err(e) => return Err(self.abandon(session, e).await),
        };

        self.sessions
            .transition(session, &[SessionState::Answering], SessionState::Connected)?;
        let desc = match remote.session() {
            Some(offerer) => desc.with_session(offerer),
            None => desc,
        };
        Ok(desc)
    }

    async fn negotiate_answer(
        &self,
        session: &str,
        remote: &SessionDescription,
    ) -> Result<SessionDescription> {
        let pc = self.sessions.pc(session)?;

        pc.set_remote_description(remote.to_rtc()?).await?;
        apply_pending_candidates(&self.sessions, session).await?;

        let answer = pc.create_answer(None).await?;
        pc.set_local_description(answer).await?;
        self.settled_description(session, &pc).await
    }

    /// Tears down a session whose negotiation failed and hands the error back.
    async fn abandon(&self, session: &str, err: Error) -> Error {
        tracing::warn!("negotiation failed for session {session}: {err}");
        if let Err(e) = close_session(&self.sessions, session).await {
            tracing::warn!("closing session {session}: {e}");
        }
        err
    }

    /// Offering side: commits the remote answer. Only answers are accepted.
    pub async fn complete_handshake(&self, session: &str, remote: &SessionDescription) -> Result<()> {
        expect_role(remote, SdpRole::Answer)?;

        let state = self.sessions.state(session)?;
        if state != SessionState::AwaitingAnswer {
            return Err(Error::InvalidState {
                session: session.to_string(),
                state,
            });
        }

        let pc = self.sessions.pc(session)?;
        pc.set_remote_description(remote.to_rtc()?).await?;
        apply_pending_candidates(&self.sessions, session).await?;

        self.sessions
            .transition(session, &[SessionState::AwaitingAnswer], SessionState::Connected)?;
        tracing::info!("handshake complete for session {session}");
        Ok(())
    }

    async fn settled_description(
        &self,
        session: &str,
        pc: &RTCPeerConnection,
    ) -> Result<SessionDescription> {
        wait_for_gathering(pc, self.gather_timeout).await;
        analyze_candidates(&self.local_candidates(session)?);

        let local = pc.local_description().await.ok_or_else(|| {
            Error::MalformedPayload("local description missing after commit".into())
        })?;
        SessionDescription::from_rtc(&local)
    }

    /// Session the page's "apply answer" button targets.
    pub fn latest_offering_session(&self) -> Option<SessionId> {
        self.sessions.latest_in(SessionState::AwaitingAnswer)
    }

    pub fn session_state(&self, session: &str) -> Result<SessionState> {
        self.sessions.state(session)
    }

    pub fn session_infos(&self) -> Vec<SessionInfo> {
        self.sessions.infos()
    }

    pub fn local_candidates(&self, session: &str) -> Result<Vec<IceCandidate>> {
        self.sessions.with(session, |s| s.local_candidates.clone())
    }

    pub async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        add_remote_candidate(&self.sessions, candidate).await
    }

    /// Explicit teardown: closes the channel and the connection.
    pub async fn close_session(&self, session: &str) -> Result<()> {
        close_session(&self.sessions, session).await
    }

    pub async fn close_all(&self) {
        for id in self.sessions.ids() {
            if let Err(e) = self.close_session(&id).await {
                tracing::warn!("closing session {id}: {e}");
            }
        }
    }

    /// Forgets sessions that reached `Closed`.
    pub fn prune_closed(&self) -> usize {
        self.sessions.remove_closed()
    }
}

async fn close_session(sessions: &SessionTable, session: &str) -> Result<()> {
    let Some(down) = sessions.mark_closed(session)? else {
        return Ok(());
    };
    tracing::info!("tearing down session {session}");

    if let Some(dc) = down.channel {
        let _ = dc.close().await;
    }
    down.pc.close().await?;
    Ok(())
}

/// Grace period after a transport drop; a session that has not come back
/// by then is torn down.
fn arm_teardown(
    sessions: &SessionTable,
    id: &str,
    pc: Arc<RTCPeerConnection>,
    grace: Duration,
) {
    let handle = tokio::spawn({
        let sessions = sessions.clone();
        let id = id.to_string();
        async move {
            dump_selected_pair(&pc, "BEFORE-FAIL").await;
            tracing::info!("session {id}: grace period started, waiting {} s", grace.as_secs());
            sleep(grace).await;

            let state_now = pc.connection_state();
            if state_now == RTCPeerConnectionState::Connected {
                tracing::info!("session {id} recovered during grace period");
                return;
            }

            tracing::warn!("session {id} did not recover ({state_now}), tearing down");
            // detach our own handle so teardown does not abort this task
            let _ = sessions.with(&id, |s| s.teardown.take());
            if let Err(e) = close_session(&sessions, &id).await {
                tracing::warn!("teardown of session {id} failed: {e}");
            }
        }
    });

    if sessions.with(id, |s| s.teardown = Some(handle)).is_err() {
        tracing::debug!("session {id} vanished before teardown was armed");
    }
}

fn expect_role(desc: &SessionDescription, expected: SdpRole) -> Result<()> {
    if desc.role() == expected {
        Ok(())
    } else {
        Err(Error::UnexpectedRole {
            expected,
            found: desc.role(),
        })
    }
}

/// Peer connection configuration for the given server list
fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers(servers),
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

pub fn ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}
