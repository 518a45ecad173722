use tauri::command;

use crate::commands::{user_error, EDITOR};
use crate::config::default_export_dir;
use crate::export::ExportFormat;
use crate::voice::{RecognitionResult, VoiceUpdate};

/// Every edit in the page; returns how many peers received it
#[command]
pub async fn sync_document(markup: String) -> usize {
    EDITOR.local_input(markup).await
}

#[command]
pub fn save_local() -> Result<(), String> {
    EDITOR.save_local().map_err(user_error)
}

#[command]
pub fn load_local() -> Result<Option<String>, String> {
    EDITOR
        .load_local()
        .map(|doc| doc.map(|d| d.into_markup()))
        .map_err(user_error)
}

/// Writes greenword.<ext> into the download directory, returns its path
#[command]
pub fn export_document(format: ExportFormat) -> Result<String, String> {
    EDITOR
        .save_export(&default_export_dir(), format)
        .map(|path| path.display().to_string())
        .map_err(user_error)
}

#[command]
pub fn proofread() -> String {
    EDITOR.proofread()
}

#[command]
pub fn summarize() -> String {
    EDITOR.summarize()
}

#[command]
pub fn translate() -> String {
    EDITOR.translate()
}

/// The page tells whether its speech engine exists
#[command]
pub fn start_voice(engine_available: bool) -> Result<(), String> {
    if !engine_available {
        return Err(user_error(crate::error::Error::RecognitionUnsupported));
    }
    EDITOR.start_voice().map_err(user_error)
}

#[command]
pub fn stop_voice() -> Result<(), String> {
    EDITOR.stop_voice().map_err(user_error)
}

#[command]
pub async fn voice_result(results: Vec<RecognitionResult>) -> VoiceUpdate {
    EDITOR.voice_result(&results).await
}
