pub mod connection;
pub mod data_channel;
pub mod ice;
pub mod state;
pub mod types;

pub use connection::PeerManager;
pub use ice::check_ice_server_availability;
pub use state::{SessionInfo, SessionState, SessionTable};
pub use types::{IceCandidate, ServerConfig, SessionId};
