use tauri::command;

use crate::commands::{user_error, EDITOR};
use crate::peer::{check_ice_server_availability as probe_server, ServerConfig};

/// At least one session finished its handshake
#[command]
pub fn is_connected() -> bool {
    EDITOR.connected_sessions() > 0
}

#[command]
pub async fn check_ice_server_availability(config: ServerConfig) -> bool {
    match probe_server(&config).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("ICE server probe failed: {e}");
            false
        }
    }
}

/// Validates and installs the servers used by new sessions
#[command]
pub fn set_ice_servers(servers: Vec<ServerConfig>) -> Result<(), String> {
    EDITOR.peers().set_ice_servers(servers).map_err(user_error)
}

#[command]
pub fn get_ice_servers() -> Vec<ServerConfig> {
    EDITOR.peers().ice_servers()
}
