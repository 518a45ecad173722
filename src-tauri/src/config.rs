// Application configuration
// Logging can only be switched off in development builds

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::peer::types::ServerConfig;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // logging is on in debug builds

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // and off in release builds

// Extra switches for development builds
#[cfg(debug_assertions)]
pub mod dev {
    // Set to false to silence logging entirely while developing.
    // Only honoured in debug builds.
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const ENABLE_LOGGING: bool = false;
}

/// Fixed storage key holding the document markup.
pub const STORAGE_KEY: &str = "greenword_content";

/// Label of the data channel carrying document snapshots.
pub const CHANNEL_LABEL: &str = "doc";

/// Default base the share URL is built from when running inside the desktop shell.
pub const DEFAULT_SHARE_BASE: &str = "tauri://localhost/index.html";

/// Wait before tearing down a session whose transport dropped.
pub const GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Upper bound on ICE gathering before a description is handed out.
pub const GATHER_TIMEOUT: Duration = Duration::from_secs(5);

/// Editor-wide settings. There is no configuration file; everything here
/// has a default and the ICE server list can be replaced at runtime.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    pub ice_servers: Vec<ServerConfig>,
    pub gather_timeout: Duration,
    pub grace_period: Duration,
    pub storage_path: PathBuf,
    pub share_base: String,
    pub qr_size: u32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            gather_timeout: GATHER_TIMEOUT,
            grace_period: GRACE_PERIOD,
            storage_path: default_storage_path(),
            share_base: DEFAULT_SHARE_BASE.into(),
            qr_size: 180,
        }
    }
}

pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![ServerConfig {
        id: "default-stun".into(),
        r#type: "stun".into(),
        url: "stun:stun.l.google.com:19302".into(),
        username: None,
        credential: None,
    }]
}

/// `<data dir>/greenword/storage.json`, falling back to the working directory.
pub fn default_storage_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("greenword")
        .join("storage.json")
}

/// Where exports land when the caller does not pick a directory.
pub fn default_export_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// TURN servers need credentials, every server needs a URL.
pub fn validate_ice_servers(servers: &[ServerConfig]) -> Result<()> {
    for server in servers {
        if server.url.trim().is_empty() {
            return Err(Error::InvalidIceServer(format!(
                "server {} has an empty URL",
                server.id
            )));
        }

        if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none()) {
            return Err(Error::InvalidIceServer(format!(
                "TURN server {} requires username and credential",
                server.id
            )));
        }
    }
    Ok(())
}
