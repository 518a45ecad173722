pub mod assist;
pub mod config;
pub mod document;
pub mod editor;
pub mod error;
pub mod export;
pub mod logger;
pub mod peer;
pub mod signal;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod voice;

#[cfg(feature = "desktop")]
mod commands;

pub use document::{Document, DocumentHandle, Origin};
pub use editor::{Editor, SignalOutput};
pub use error::{Error, Result};
pub use export::ExportFormat;
pub use peer::{PeerManager, SessionState};
pub use signal::{SdpRole, SessionDescription};
pub use sync::DocumentSync;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use commands::{document_api, session_api, util_api};

    logger::init();

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            commands::bind_app(app.handle().clone());
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Signaling and sessions
            session_api::start_offer,
            session_api::start_answer,
            session_api::apply_answer,
            session_api::apply_signal,
            session_api::add_ice_candidate,
            session_api::local_candidates,
            session_api::sessions,
            session_api::disconnect,
            session_api::share_qr,
            session_api::share_url,
            session_api::read_share_url,
            // Document, storage, export, stubs
            document_api::sync_document,
            document_api::save_local,
            document_api::load_local,
            document_api::export_document,
            document_api::proofread,
            document_api::summarize,
            document_api::translate,
            document_api::start_voice,
            document_api::stop_voice,
            document_api::voice_result,
            // Utility functions
            util_api::is_connected,
            util_api::check_ice_server_availability,
            util_api::set_ice_servers,
            util_api::get_ice_servers,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
