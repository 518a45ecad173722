//! One method per action of the editor page.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::assist;
use crate::config::EditorConfig;
use crate::document::{Document, DocumentHandle, Origin};
use crate::error::{Error, Result};
use crate::export::{self, ExportFormat};
use crate::peer::{PeerManager, SessionId, SessionState, SessionTable};
use crate::signal::{self, SdpRole, SessionDescription};
use crate::storage::{FileStore, Persistence};
use crate::sync::DocumentSync;
use crate::voice::{RecognitionResult, Recognizer, VoiceInput, VoiceUpdate};

/// Text for the signaling textarea plus the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalOutput {
    pub session: SessionId,
    pub text: String,
}

pub struct Editor {
    config: EditorConfig,
    sync: Arc<DocumentSync>,
    peers: PeerManager,
    persistence: Persistence,
    voice: Mutex<VoiceInput>,
}

impl Editor {
    pub fn new(config: EditorConfig, persistence: Persistence, voice: VoiceInput) -> Self {
        let sessions = SessionTable::new();
        let sync = Arc::new(DocumentSync::new(DocumentHandle::default(), sessions.clone()));
        let peers = PeerManager::new(sync.clone(), sessions)
            .with_ice_servers(config.ice_servers.clone())
            .with_timeouts(config.gather_timeout, config.grace_period);

        Self {
            config,
            sync,
            peers,
            persistence,
            voice: Mutex::new(voice),
        }
    }

    /// File-backed storage at the configured path, no speech engine.
    pub fn with_defaults(config: EditorConfig) -> Self {
        let persistence = Persistence::new(Box::new(FileStore::new(config.storage_path.clone())));
        Self::new(config, persistence, VoiceInput::unsupported())
    }

    pub fn with_recognizer(self, recognizer: Box<dyn Recognizer>) -> Self {
        *self.voice() = VoiceInput::new(Some(recognizer));
        self
    }

    fn voice(&self) -> MutexGuard<'_, VoiceInput> {
        self.voice.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn peers(&self) -> &PeerManager {
        &self.peers
    }

    pub fn sync(&self) -> &Arc<DocumentSync> {
        &self.sync
    }

    pub fn document(&self) -> Document {
        self.sync.document()
    }

    // ----- signaling -----

    pub async fn start_offer(&self) -> Result<SignalOutput> {
        let session = self.peers.create_default_session().await?;
        let offer = self.peers.create_offer(&session).await?;
        if tracing::enabled!(tracing::Level::TRACE) {
            if let Ok(qr) = signal::encode_compact(&offer).and_then(|t| signal::to_qr_terminal(&t)) {
                tracing::trace!("offer for session {session}:\n{qr}");
            }
        }
        Ok(SignalOutput {
            session,
            text: signal::encode(&offer),
        })
    }

    /// Takes the offer text pasted by the user and produces the answer text.
    pub async fn start_answer(&self, offer_text: &str) -> Result<SignalOutput> {
        let offer = signal::decode(offer_text)?;
        let session = self.peers.create_default_session().await?;
        let answer = self.peers.create_answer(&session, &offer).await?;
        Ok(SignalOutput {
            session,
            text: signal::encode(&answer),
        })
    }

    /// Applies an answer to the session it names, or to the latest session
    /// still waiting for one.
    pub async fn apply_answer(&self, answer_text: &str) -> Result<SessionId> {
        let answer = signal::decode(answer_text)?;
        let session = match answer.session() {
            Some(id) if self.peers.session_state(id).is_ok() => id.to_string(),
            _ => self.peers.latest_offering_session().ok_or_else(|| {
                Error::UnknownSession("no session awaiting an answer".into())
            })?,
        };
        self.peers.complete_handshake(&session, &answer).await?;
        Ok(session)
    }

    /// Accepts either a bare payload or a share URL carrying one.
    pub fn read_signal(&self, input: &str) -> Result<SessionDescription> {
        let input = input.trim();
        if signal::is_share_url(input) {
            signal::decode(&signal::from_share_url(input)?)
        } else {
            signal::decode(input)
        }
    }

    /// Dispatches pasted text by role: offers get answered, answers complete
    /// the handshake.
    pub async fn apply_signal(&self, input: &str) -> Result<Option<SignalOutput>> {
        let desc = self.read_signal(input)?;
        match desc.role() {
            SdpRole::Offer => self.start_answer(&signal::encode(&desc)).await.map(Some),
            SdpRole::Answer => self.apply_answer(&signal::encode(&desc)).await.map(|_| None),
        }
    }

    /// QR code of the textarea text. A description too long for a code is
    /// retried in its compact form, which [`signal::decode`] also reads.
    pub fn share_qr(&self, text: &str) -> Result<String> {
        let text = text.trim();
        match signal::to_qr_svg(text, self.config.qr_size) {
            Err(Error::SignalTooLarge(len)) => {
                let desc = signal::decode(text).map_err(|_| Error::SignalTooLarge(len))?;
                let compact = signal::encode_compact(&desc)?;
                tracing::debug!("QR payload compacted from {len} to {} bytes", compact.len());
                signal::to_qr_svg(&compact, self.config.qr_size)
            }
            other => other,
        }
    }

    pub fn share_url(&self, text: &str) -> Result<String> {
        signal::to_share_url(&self.config.share_base, text.trim())
    }

    pub async fn disconnect(&self) {
        self.peers.close_all().await;
        self.peers.prune_closed();
    }

    pub fn connected_sessions(&self) -> usize {
        self.peers
            .session_infos()
            .iter()
            .filter(|s| s.state == SessionState::Connected)
            .count()
    }

    // ----- document -----

    /// Called on every edit in the page.
    pub async fn local_input(&self, markup: String) -> usize {
        self.sync.on_local_change(Document::new(markup)).await
    }

    pub fn save_local(&self) -> Result<()> {
        self.persistence.save(&self.document())
    }

    /// Restores the saved document; leaves the current one alone when
    /// nothing was saved.
    pub fn load_local(&self) -> Result<Option<Document>> {
        let loaded = self.persistence.load()?;
        if let Some(doc) = &loaded {
            self.sync.handle().replace(doc.clone(), Origin::Storage);
        }
        Ok(loaded)
    }

    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>> {
        export::export(format, &self.document())
    }

    pub fn save_export(&self, dir: &Path, format: ExportFormat) -> Result<PathBuf> {
        export::save_export(dir, format, &self.document())
    }

    // ----- stubs -----

    pub fn proofread(&self) -> String {
        assist::proofread(&self.document().plain_text())
    }

    pub fn summarize(&self) -> String {
        assist::summarize(&self.document().plain_text())
    }

    pub fn translate(&self) -> String {
        assist::translate(&self.document().plain_text())
    }

    pub fn start_voice(&self) -> Result<()> {
        self.voice().start()
    }

    pub fn stop_voice(&self) -> Result<()> {
        self.voice().stop()
    }

    /// Feeds a recognition batch; finalized text is appended to the document.
    pub async fn voice_result(&self, results: &[RecognitionResult]) -> VoiceUpdate {
        let update = self.voice().on_result(results);
        if !update.finalized.is_empty() {
            let mut doc = self.document();
            doc.append_text(&update.finalized);
            self.sync.publish(doc, Origin::Voice).await;
        }
        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::HostRecognizer;

    fn editor() -> Editor {
        Editor::new(
            EditorConfig {
                ice_servers: Vec::new(),
                ..EditorConfig::default()
            },
            Persistence::in_memory(),
            VoiceInput::unsupported(),
        )
    }

    #[tokio::test]
    async fn save_and_load_restore_the_document() {
        let editor = editor();
        editor.local_input("<p>draft</p>".into()).await;
        editor.save_local().unwrap();

        editor.local_input("<p>changed</p>".into()).await;
        let loaded = editor.load_local().unwrap();

        assert_eq!(loaded, Some(Document::new("<p>draft</p>")));
        assert_eq!(editor.document().markup(), "<p>draft</p>");
    }

    #[tokio::test]
    async fn load_with_nothing_saved_keeps_document() {
        let editor = editor();
        editor.local_input("<p>keep</p>".into()).await;

        assert_eq!(editor.load_local().unwrap(), None);
        assert_eq!(editor.document().markup(), "<p>keep</p>");
    }

    #[tokio::test]
    async fn ai_stubs_use_plain_text() {
        let editor = editor();
        editor.local_input("<b>太字</b>の文章".into()).await;
        assert_eq!(editor.summarize(), "[AI結果] 太字の文章...");
    }

    #[tokio::test]
    async fn exports_flatten_for_pdf() {
        let editor = editor();
        editor.local_input("<p>hello</p>".into()).await;

        assert_eq!(editor.export(ExportFormat::Html).unwrap(), b"<p>hello</p>".to_vec());
        assert!(editor.export(ExportFormat::Pdf).unwrap().starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn voice_needs_an_engine() {
        let editor = editor();
        assert!(matches!(editor.start_voice(), Err(Error::RecognitionUnsupported)));

        let editor = editor.with_recognizer(Box::<HostRecognizer>::default());
        editor.start_voice().unwrap();
        editor.local_input("<p>memo</p>".into()).await;

        let update = editor
            .voice_result(&[RecognitionResult {
                alternatives: vec!["追記".into()],
                is_final: true,
            }])
            .await;

        assert_eq!(update.finalized, "追記");
        assert_eq!(editor.document().markup(), "<p>memo</p>追記");
        editor.stop_voice().unwrap();
    }

    #[tokio::test]
    async fn answer_without_waiting_session_is_rejected() {
        let editor = editor();
        let answer = signal::encode(&SessionDescription::answer("v=0"));
        assert!(matches!(
            editor.apply_answer(&answer).await,
            Err(Error::UnknownSession(_))
        ));
    }

    #[test]
    fn long_description_falls_back_to_compact_qr() {
        let editor = editor();
        let sdp = "a=candidate:1 1 udp 2130706431 192.168.0.10 50000 typ host\r\n".repeat(60);
        let text = signal::encode(&SessionDescription::offer(sdp));

        assert!(matches!(
            signal::to_qr_svg(&text, 180),
            Err(Error::SignalTooLarge(_))
        ));
        assert!(editor.share_qr(&text).unwrap().contains("<svg"));
    }

    #[test]
    fn oversized_plain_text_is_too_large() {
        let editor = editor();
        let text = "x".repeat(8000);
        assert!(matches!(editor.share_qr(&text), Err(Error::SignalTooLarge(8000))));
    }

    #[test]
    fn share_url_with_other_fragment_params_is_read() {
        let editor = editor();
        let offer = SessionDescription::offer("v=0").with_session("s1");
        let url = signal::to_share_url("https://example.org/index.html", &signal::encode(&offer))
            .unwrap()
            .replacen("#offer=", "#x=1&offer=", 1);

        assert_eq!(editor.read_signal(&url).unwrap(), offer);
        assert_eq!(editor.read_signal(&signal::encode(&offer)).unwrap(), offer);
    }

    #[test]
    fn share_url_uses_configured_base() {
        let editor = editor();
        let url = editor.share_url(" {\"type\":\"offer\"} ").unwrap();
        assert!(url.starts_with("tauri://localhost/index.html#offer=%7B"));
    }
}
