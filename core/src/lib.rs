// AttendScan Core: attendance check-in scanner
//
// Camera frames in, one JSON message to the chat out. Everything platform
// specific (camera, QR decoding, the chat bridge) sits behind a trait so the
// same scan loop runs in the browser and under test.

pub mod capture;
pub mod config;
pub mod decoder;
pub mod flow;
pub mod handoff;
pub mod host;
pub mod launch;
pub mod message;
pub mod scanner;
pub mod scripted;

use thiserror::Error;

pub use capture::{
    CaptureDevice, CaptureError, CaptureHandle, CapturePreferences, DeviceCapabilities,
    FacingMode, FrameBuffer, ZoomCapability, ZoomRange,
};
pub use config::{ConfigError, ScanConfig};
pub use decoder::{DecodedPayload, Decoder, Symbol};
pub use flow::{CheckInFlow, FlowOutcome};
pub use handoff::CheckInHandoff;
pub use host::{AuthStatus, ChannelError, HostChannel, HostIdentity, HostUser};
pub use launch::{LaunchContext, LaunchError, LaunchRole, Panel};
pub use message::{
    decode_message, encode_message, MessageError, OutboundMessage, PanelAction, Role,
    MAX_SEND_DATA_SIZE,
};
pub use scanner::{
    ScanController, ScanObserver, ScanOutcome, ScanState, ScanStatus, TickOutcome, Ticker,
};

#[cfg(not(target_arch = "wasm32"))]
pub use scanner::IntervalTicker;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScanError {
    #[error("Camera error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Host channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("Message error: {0}")]
    Message(#[from] MessageError),
    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("No scan session is active")]
    NotScanning,
    #[error("The camera offers no zoom")]
    ZoomUnsupported,
    #[error("Scan session was cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let err: ScanError = CaptureError::PermissionDenied.into();
        assert_eq!(err, ScanError::Capture(CaptureError::PermissionDenied));

        let err: ScanError = ChannelError::Unavailable.into();
        assert_eq!(err.to_string(), "Host channel error: Host channel unavailable");
    }
}
