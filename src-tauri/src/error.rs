use crate::peer::state::SessionState;
use crate::signal::SdpRole;

/// Errors surfaced to the user by every editor action.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed negotiation payload: {0}")]
    MalformedPayload(String),

    #[error("unexpected session description role: expected {expected}, got {found}")]
    UnexpectedRole { expected: SdpRole, found: SdpRole },

    #[error("unknown peer session: {0}")]
    UnknownSession(String),

    #[error("peer session {session} is {state}, operation not allowed")]
    InvalidState { session: String, state: SessionState },

    #[error("negotiation payload of {0} bytes does not fit in a QR code")]
    SignalTooLarge(usize),

    #[error("invalid share URL: {0}")]
    InvalidShareUrl(String),

    #[error("{format} export failed: {reason}")]
    ExportFailed { format: String, reason: String },

    #[error("local storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("voice recognition is not supported on this system")]
    RecognitionUnsupported,

    #[error("invalid ICE server: {0}")]
    InvalidIceServer(String),

    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
