//! Tauri commands behind the editor page's buttons.

pub mod document_api;
pub mod session_api;
pub mod util_api;

use once_cell::sync::Lazy;
use serde::Serialize;
use tauri::{AppHandle, Emitter};

use crate::config::EditorConfig;
use crate::document::Origin;
use crate::editor::Editor;
use crate::voice::HostRecognizer;

/// ========== GLOBAL STATE ==========

/// The editor behind every command
pub static EDITOR: Lazy<Editor> = Lazy::new(|| {
    Editor::with_defaults(EditorConfig::default())
        .with_recognizer(Box::<HostRecognizer>::default())
});

/// Event carrying a document the page did not type itself
pub const DOCUMENT_EVENT: &str = "greenword-document";

#[derive(Debug, Clone, Serialize)]
struct DocumentEvent {
    markup: String,
    origin: String,
}

/// Forwards remote, restored and dictated documents to the page.
pub fn bind_app(app: AppHandle) {
    let mut rx = EDITOR.sync().subscribe();
    tauri::async_runtime::spawn(async move {
        while rx.changed().await.is_ok() {
            let rev = rx.borrow_and_update().clone();
            let origin = match &rev.origin {
                Origin::Local => continue,
                Origin::Remote(session) => format!("remote:{session}"),
                Origin::Storage => "storage".into(),
                Origin::Voice => "voice".into(),
            };

            let event = DocumentEvent {
                markup: rev.document.into_markup(),
                origin,
            };
            if let Err(e) = app.emit(DOCUMENT_EVENT, event) {
                tracing::warn!("failed to emit {DOCUMENT_EVENT}: {e}");
            }
        }
    });
}

pub(crate) fn user_error(e: crate::error::Error) -> String {
    tracing::warn!("{e}");
    e.to_string()
}
