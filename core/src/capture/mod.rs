//! Capture device abstraction
//!
//! A capture device is whatever hands us video frames: `getUserMedia` in the
//! browser, a scripted stream in tests and the CLI. The device is acquired once
//! per scan session and yields a [`CaptureHandle`] that the session owns
//! exclusively until it is released.

pub mod frame;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use frame::{FrameBuffer, BYTES_PER_PIXEL};

/// Errors raised by a capture device or its handle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The user or the platform refused camera access
    #[error("Camera permission denied")]
    PermissionDenied,
    /// No usable camera (missing, busy, insecure context, stream ended)
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),
    /// The frame source has not buffered enough data yet
    #[error("Frame not ready")]
    NotReady,
    /// A constraint (zoom) could not be applied
    #[error("Constraint rejected: {0}")]
    Constraint(String),
}

/// Which camera the session would like to open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera
    #[default]
    Environment,
    /// Front (selfie) camera
    User,
}

impl FacingMode {
    /// The `facingMode` constraint value understood by browsers
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "environment" | "rear" | "back" => Ok(FacingMode::Environment),
            "user" | "front" => Ok(FacingMode::User),
            other => Err(format!("unknown facing mode: {other}")),
        }
    }
}

/// Preferences passed to [`CaptureDevice::acquire`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturePreferences {
    pub facing_mode: FacingMode,
}

/// Zoom range reported by a camera, or the application default
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ZoomRange {
    /// Step used when the device does not report one
    pub const DEFAULT_STEP: f64 = 0.1;

    /// Build a range from raw device values.
    ///
    /// Swapped bounds are reordered and a missing or non-positive step falls
    /// back to [`ZoomRange::DEFAULT_STEP`].
    pub fn new(min: f64, max: f64, step: Option<f64>) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let step = match step {
            Some(s) if s.is_finite() && s > 0.0 => s,
            _ => Self::DEFAULT_STEP,
        };
        Self { min, max, step }
    }

    /// Clamp a requested level into `[min, max]`
    pub fn clamp(&self, level: f64) -> f64 {
        if level.is_nan() {
            return self.min;
        }
        level.clamp(self.min, self.max)
    }

    /// Whether `level` lies inside the range
    pub fn contains(&self, level: f64) -> bool {
        level >= self.min && level <= self.max
    }

    /// Whether the bounds are finite and ordered
    pub fn is_valid(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.min <= self.max
            && self.step.is_finite()
            && self.step > 0.0
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 3.0,
            step: Self::DEFAULT_STEP,
        }
    }
}

/// Optional capabilities exposed by an open handle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Optical zoom range, if the camera supports it
    pub zoom: Option<ZoomRange>,
}

/// How zoom can be offered to the user for the current session
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoomCapability {
    /// Hardware zoom applied to the camera track; affects decoded frames
    Optical { range: ZoomRange },
    /// Scale transform on the preview only; decoded frames are untouched
    Visual { range: ZoomRange },
    /// No zoom controls
    #[default]
    None,
}

impl ZoomCapability {
    /// Pick the capability for a freshly opened handle.
    ///
    /// Optical zoom wins whenever the device reports a range; otherwise the
    /// visual fallback is offered only if enabled.
    pub fn detect(
        capabilities: &DeviceCapabilities,
        visual_fallback: Option<ZoomRange>,
    ) -> Self {
        match (capabilities.zoom, visual_fallback) {
            (Some(range), _) if range.is_valid() => ZoomCapability::Optical { range },
            (_, Some(range)) => ZoomCapability::Visual { range },
            _ => ZoomCapability::None,
        }
    }

    pub fn range(&self) -> Option<ZoomRange> {
        match self {
            ZoomCapability::Optical { range } | ZoomCapability::Visual { range } => Some(*range),
            ZoomCapability::None => None,
        }
    }

    pub fn is_optical(&self) -> bool {
        matches!(self, ZoomCapability::Optical { .. })
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, ZoomCapability::None)
    }
}

/// A source of camera handles
#[async_trait(?Send)]
pub trait CaptureDevice {
    /// Open a video source honoring `preferences` where possible.
    ///
    /// Suspends until the platform grants or denies access.
    async fn acquire(
        &self,
        preferences: CapturePreferences,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError>;
}

/// An open video source, exclusively owned by one scan session
#[async_trait(?Send)]
pub trait CaptureHandle {
    /// Whether enough data is buffered to read a frame
    fn is_ready(&self) -> bool;

    /// Native resolution of the current frame, `None` while unknown
    fn frame_size(&self) -> Option<(u32, u32)>;

    /// Copy the current frame into `buffer` (RGBA, already sized by the caller)
    fn read_frame(&self, buffer: &mut FrameBuffer) -> Result<(), CaptureError>;

    /// Optional capabilities of the open source
    fn capabilities(&self) -> DeviceCapabilities;

    /// Apply an optical zoom level
    async fn apply_zoom(&self, level: f64) -> Result<(), CaptureError>;

    /// Stop the underlying tracks. Must tolerate repeated calls.
    fn release(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_range_new_reorders_bounds() {
        let range = ZoomRange::new(4.0, 1.0, Some(0.5));
        assert_eq!(range.min, 1.0);
        assert_eq!(range.max, 4.0);
        assert_eq!(range.step, 0.5);
    }

    #[test]
    fn test_zoom_range_default_step() {
        assert_eq!(ZoomRange::new(1.0, 2.0, None).step, ZoomRange::DEFAULT_STEP);
        assert_eq!(ZoomRange::new(1.0, 2.0, Some(0.0)).step, ZoomRange::DEFAULT_STEP);
        assert_eq!(ZoomRange::new(1.0, 2.0, Some(f64::NAN)).step, ZoomRange::DEFAULT_STEP);
    }

    #[test]
    fn test_zoom_range_clamp() {
        let range = ZoomRange::new(1.0, 5.0, None);
        assert_eq!(range.clamp(0.2), 1.0);
        assert_eq!(range.clamp(3.3), 3.3);
        assert_eq!(range.clamp(12.0), 5.0);
        assert_eq!(range.clamp(f64::NAN), 1.0);
        assert_eq!(range.clamp(f64::INFINITY), 5.0);
    }

    #[test]
    fn test_detect_prefers_optical() {
        let caps = DeviceCapabilities {
            zoom: Some(ZoomRange::new(1.0, 8.0, None)),
        };
        let capability = ZoomCapability::detect(&caps, Some(ZoomRange::default()));
        assert!(capability.is_optical());
        assert_eq!(capability.range().unwrap().max, 8.0);
    }

    #[test]
    fn test_detect_visual_fallback_is_not_optical() {
        let capability =
            ZoomCapability::detect(&DeviceCapabilities::default(), Some(ZoomRange::default()));
        assert!(!capability.is_optical());
        assert!(capability.is_available());
    }

    #[test]
    fn test_detect_without_zoom() {
        let capability = ZoomCapability::detect(&DeviceCapabilities::default(), None);
        assert_eq!(capability, ZoomCapability::None);
        assert!(capability.range().is_none());
    }

    #[test]
    fn test_facing_mode_parse() {
        assert_eq!("rear".parse::<FacingMode>().unwrap(), FacingMode::Environment);
        assert_eq!("User".parse::<FacingMode>().unwrap(), FacingMode::User);
        assert!("sideways".parse::<FacingMode>().is_err());
        assert_eq!(FacingMode::default().as_str(), "environment");
    }

    #[test]
    fn test_zoom_capability_serializes_with_kind() {
        let json = serde_json::to_string(&ZoomCapability::Optical {
            range: ZoomRange::new(1.0, 2.0, Some(0.5)),
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"kind":"optical","range":{"min":1.0,"max":2.0,"step":0.5}}"#
        );
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn clamp_stays_in_range(
                a in -100.0f64..100.0,
                b in -100.0f64..100.0,
                level in proptest::num::f64::ANY,
            ) {
                let range = ZoomRange::new(a, b, None);
                let clamped = range.clamp(level);
                prop_assert!(range.contains(clamped));
                if range.contains(level) {
                    prop_assert_eq!(clamped, level);
                }
            }
        }
    }
}
