use tauri::command;

use crate::commands::{user_error, EDITOR};
use crate::editor::SignalOutput;
use crate::peer::{IceCandidate, SessionInfo};
use crate::signal;

/// Offering side: new session, returns the offer text
#[command]
pub async fn start_offer() -> Result<SignalOutput, String> {
    tracing::info!("start_offer called");
    EDITOR.start_offer().await.map_err(user_error)
}

/// Answering side: pasted offer in, answer text out
#[command]
pub async fn start_answer(text: String) -> Result<SignalOutput, String> {
    tracing::info!("start_answer called, payload length {}", text.len());
    EDITOR.start_answer(&text).await.map_err(user_error)
}

/// Offering side: applies the pasted answer, returns the session it completed
#[command]
pub async fn apply_answer(text: String) -> Result<String, String> {
    tracing::info!("apply_answer called, payload length {}", text.len());
    EDITOR.apply_answer(&text).await.map_err(user_error)
}

/// Offer or answer, bare or inside a share URL
#[command]
pub async fn apply_signal(text: String) -> Result<Option<SignalOutput>, String> {
    EDITOR.apply_signal(&text).await.map_err(user_error)
}

/// Candidate relayed by hand from the other peer
#[command]
pub async fn add_ice_candidate(candidate: IceCandidate) -> Result<(), String> {
    EDITOR
        .peers()
        .add_remote_candidate(candidate)
        .await
        .map_err(user_error)
}

#[command]
pub fn local_candidates(session: String) -> Result<Vec<IceCandidate>, String> {
    EDITOR.peers().local_candidates(&session).map_err(user_error)
}

#[command]
pub fn sessions() -> Vec<SessionInfo> {
    EDITOR.peers().session_infos()
}

#[command]
pub async fn disconnect() {
    EDITOR.disconnect().await
}

/// SVG markup of the QR code for the textarea content
#[command]
pub fn share_qr(text: String) -> Result<String, String> {
    EDITOR.share_qr(&text).map_err(user_error)
}

#[command]
pub fn share_url(text: String) -> Result<String, String> {
    EDITOR.share_url(&text).map_err(user_error)
}

/// Payload carried by a share URL (opened link or scanned QR)
#[command]
pub fn read_share_url(url: String) -> Result<String, String> {
    signal::from_share_url(&url).map_err(user_error)
}
