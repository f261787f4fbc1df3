// Scan session state, user-facing status and loop outcomes

use crate::capture::{CaptureError, ZoomCapability};
use crate::decoder::DecodedPayload;
use crate::host::ChannelError;
use crate::ScanError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Controller state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    /// Nothing started yet
    #[default]
    Idle,
    /// Waiting for the platform to grant the camera
    Requesting,
    /// Polling frames
    Scanning,
    /// Session ended (match, stop, failure or timeout)
    Stopped,
}

impl ScanState {
    /// A session exists (camera requested or held)
    pub fn is_active(&self) -> bool {
        matches!(self, ScanState::Requesting | ScanState::Scanning)
    }
}

/// Human-readable status line shown under the viewfinder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ScanStatus {
    #[default]
    Idle,
    RequestingCamera,
    Scanning,
    Recognized,
    Sent,
    Stopped,
    TimedOut,
    CameraDenied,
    CameraUnavailable(String),
    SendFailed(String),
    InvalidInput(String),
}

impl ScanStatus {
    /// Status to show for a failure
    pub fn from_error(err: &ScanError) -> Self {
        match err {
            ScanError::Capture(CaptureError::PermissionDenied) => ScanStatus::CameraDenied,
            ScanError::Capture(other) => ScanStatus::CameraUnavailable(other.to_string()),
            ScanError::Channel(ChannelError::Unavailable) => {
                ScanStatus::SendFailed("the chat bridge is not available".to_string())
            }
            ScanError::Channel(other) => ScanStatus::SendFailed(other.to_string()),
            ScanError::Message(e) => ScanStatus::InvalidInput(e.to_string()),
            ScanError::Launch(e) => ScanStatus::InvalidInput(e.to_string()),
            ScanError::Config(e) => ScanStatus::InvalidInput(e.to_string()),
            ScanError::NotScanning | ScanError::Cancelled => ScanStatus::Stopped,
            ScanError::ZoomUnsupported => ScanStatus::Scanning,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ScanStatus::CameraDenied
                | ScanStatus::CameraUnavailable(_)
                | ScanStatus::SendFailed(_)
                | ScanStatus::InvalidInput(_)
        )
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Idle => write!(f, "Press start to scan a QR code"),
            ScanStatus::RequestingCamera => write!(f, "Requesting camera access..."),
            ScanStatus::Scanning => write!(f, "Scan the QR code..."),
            ScanStatus::Recognized => write!(f, "QR code recognized, sending data..."),
            ScanStatus::Sent => write!(f, "Check-in sent"),
            ScanStatus::Stopped => write!(f, "Scanning stopped"),
            ScanStatus::TimedOut => write!(f, "No QR code found in time. Try again."),
            ScanStatus::CameraDenied => write!(
                f,
                "Camera access error. Allow camera access in the browser or Telegram."
            ),
            ScanStatus::CameraUnavailable(reason) => write!(f, "Camera unavailable: {}", reason),
            ScanStatus::SendFailed(reason) => {
                write!(f, "Could not send data to the chat: {}", reason)
            }
            ScanStatus::InvalidInput(reason) => write!(f, "Check the form: {}", reason),
        }
    }
}

/// Result of one polling tick
#[derive(Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Frame source not buffered yet, nothing decoded
    NotReady,
    /// Frame decoded, no symbol
    NoMatch,
    /// Symbol found; the session is already stopped
    Matched(DecodedPayload),
    /// Session was stopped; any in-flight result was discarded
    Cancelled,
    /// Configured scan duration elapsed; the session is stopped
    TimedOut,
}

/// How a scan loop ended
#[derive(Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    Matched(DecodedPayload),
    Stopped,
    TimedOut,
}

/// Callback interface for the UI layer
pub trait ScanObserver {
    /// The status line changed
    fn on_status(&self, status: &ScanStatus);

    /// A session opened; show or hide zoom controls
    fn on_zoom_capability(&self, _capability: &ZoomCapability) {}
}
