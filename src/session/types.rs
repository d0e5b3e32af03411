use serde::Serialize;
use std::fmt;

use crate::ai::{EncodedImage, QueryError};
use crate::capture::CameraSetting;
use crate::voice::{ListenerErrorKind, ListenerEvent};

/// What started a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureOrigin {
    Manual,
    Voice,
    Auto,
}

/// Whether a completed capture schedules another one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SessionMode {
    #[default]
    Idle,
    Manual,
    AutoLoop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    NoCredential,
    Ready { camera: bool, listener: bool },
    Capturing,
}

/// Immutable snapshot taken at the moment of capture.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub id: u64,
    pub origin: CaptureOrigin,
    pub image: EncodedImage,
    /// Resolution the frame was frozen at, before the square re-encode.
    pub native_size: (u32, u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    pub id: u64,
    pub origin: CaptureOrigin,
    pub result: Result<String, QueryError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InFlight,
    NoCamera,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InFlight => f.write_str("a capture is already in flight"),
            RejectReason::NoCamera => f.write_str("no live camera"),
        }
    }
}

/// Error type for session operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Enter your API key first")]
    CredentialMissing,
    #[error("Camera error: {0}")]
    DeviceUnavailable(String),
    #[error("Camera control unavailable: {0}")]
    DeviceDegraded(String),
    #[error("Speech recognition is not supported on this platform")]
    ListenerUnsupported,
    #[error("Speech recognition error: {kind}")]
    ListenerFault { kind: ListenerErrorKind, fatal: bool },
    #[error("Capture rejected: {0}")]
    CaptureRejected(RejectReason),
}

/// Operator intents forwarded by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    SetCredential(String),
    ClearCredential,
    SelectDevice(String),
    ApplySetting(CameraSetting),
    StartListening,
    StopListening,
    TriggerCapture(CaptureOrigin),
    StartAutoLoop,
    StopAutoLoop,
    Shutdown,
}

/// Everything the session loop reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Command(SessionCommand),
    Listener { generation: u64, event: ListenerEvent },
    CaptureFinished(CaptureOutcome),
    AutoTick { generation: u64 },
    /// Delayed restart attempt for a listener whose engine refused to start.
    ListenerRetry { generation: u64 },
}
