//! Scan loop controller
//!
//! Owns the camera for the lifetime of one scan session and drives the
//! capture → decode → check cycle. The first successful decode stops the
//! session and yields a [`DecodedPayload`]; nothing is decoded or forwarded
//! after that, or after [`ScanController::stop`].
//!
//! Every start or stop bumps a generation counter. A tick records the
//! generation before decoding and re-checks it afterwards, so a stop that lands
//! while a decode is in flight discards that decode's result.

pub mod state;
pub mod ticker;

use crate::capture::{CaptureDevice, CaptureError, CaptureHandle, FrameBuffer, ZoomCapability};
use crate::config::ScanConfig;
use crate::decoder::{DecodedPayload, Decoder};
use crate::ScanError;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(not(target_arch = "wasm32"))]
use tokio::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

pub use state::{ScanObserver, ScanOutcome, ScanState, ScanStatus, TickOutcome};
pub use ticker::Ticker;

#[cfg(not(target_arch = "wasm32"))]
pub use ticker::IntervalTicker;

/// One scan attempt; holds the only reference to the open camera
struct ScanSession {
    handle: Arc<dyn CaptureHandle>,
    zoom: ZoomCapability,
    zoom_level: Option<f64>,
    started_at: Instant,
}

struct ControllerInner {
    state: ScanState,
    generation: u64,
    session: Option<ScanSession>,
    status: ScanStatus,
    decode_attempts: u64,
}

impl ControllerInner {
    /// Drop the session and release its camera. Returns true if one was active.
    fn teardown(&mut self) -> bool {
        let was_active = self.state.is_active();
        if let Some(session) = self.session.take() {
            session.handle.release();
        }
        if was_active {
            self.generation += 1;
        }
        self.state = ScanState::Stopped;
        was_active
    }
}

/// Drives scan sessions against a capture device and a decoder.
///
/// Cloning yields another handle to the same controller, so UI callbacks can
/// stop a scan that a background task is running.
#[derive(Clone)]
pub struct ScanController {
    device: Arc<dyn CaptureDevice>,
    decoder: Arc<dyn Decoder>,
    config: ScanConfig,
    inner: Arc<Mutex<ControllerInner>>,
    /// Pixel buffer reused across ticks, resized on resolution changes
    frame: Arc<Mutex<FrameBuffer>>,
    observer: Arc<RwLock<Option<Arc<dyn ScanObserver>>>>,
}

impl ScanController {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        decoder: Arc<dyn Decoder>,
        config: ScanConfig,
    ) -> Result<Self, ScanError> {
        config.validate()?;

        Ok(Self {
            device,
            decoder,
            config,
            inner: Arc::new(Mutex::new(ControllerInner {
                state: ScanState::Idle,
                generation: 0,
                session: None,
                status: ScanStatus::Idle,
                decode_attempts: 0,
            })),
            frame: Arc::new(Mutex::new(FrameBuffer::new())),
            observer: Arc::new(RwLock::new(None)),
        })
    }

    pub fn set_observer(&self, observer: Arc<dyn ScanObserver>) {
        *self.observer.write() = Some(observer);
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn state(&self) -> ScanState {
        self.inner.lock().state
    }

    pub fn status(&self) -> ScanStatus {
        self.inner.lock().status.clone()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Decoder invocations in the current (or last) session
    pub fn decode_attempts(&self) -> u64 {
        self.inner.lock().decode_attempts
    }

    pub fn zoom_capability(&self) -> ZoomCapability {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.zoom)
            .unwrap_or_default()
    }

    pub fn zoom_level(&self) -> Option<f64> {
        self.inner.lock().session.as_ref().and_then(|s| s.zoom_level)
    }

    /// Record and publish a status line
    pub fn report_status(&self, status: ScanStatus) {
        self.inner.lock().status = status.clone();
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer.on_status(&status);
        }
    }

    /// Open the camera and enter `Scanning`.
    ///
    /// An active session is torn down first. Acquisition failures leave the
    /// controller `Stopped`; calling `start` again retries.
    pub async fn start(&self) -> Result<ZoomCapability, ScanError> {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.teardown() {
                debug!("Tearing down previous scan session before restart");
            }
            inner.generation += 1;
            inner.state = ScanState::Requesting;
            inner.decode_attempts = 0;
            inner.generation
        };
        self.report_status(ScanStatus::RequestingCamera);

        let acquired = self.device.acquire(self.config.preferences()).await;

        let handle: Arc<dyn CaptureHandle> = match acquired {
            Ok(handle) => Arc::from(handle),
            Err(err) => {
                {
                    let mut inner = self.inner.lock();
                    if inner.generation == generation {
                        inner.state = ScanState::Stopped;
                    }
                }
                warn!("Camera acquisition failed: {}", err);
                let err = ScanError::from(err);
                self.report_status(ScanStatus::from_error(&err));
                return Err(err);
            }
        };

        let zoom = ZoomCapability::detect(&handle.capabilities(), self.config.visual_zoom());
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state != ScanState::Requesting {
                drop(inner);
                handle.release();
                debug!("Scan session {} cancelled during acquisition", generation);
                return Err(ScanError::Cancelled);
            }
            inner.session = Some(ScanSession {
                handle,
                zoom,
                zoom_level: zoom.range().map(|r| r.min),
                started_at: Instant::now(),
            });
            inner.state = ScanState::Scanning;
        }

        info!(
            "Scan session {} started (zoom: {:?}, facing: {})",
            generation, zoom, self.config.facing_mode
        );
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer.on_zoom_capability(&zoom);
        }
        self.report_status(ScanStatus::Scanning);
        Ok(zoom)
    }

    /// Cancel the session and release the camera. Safe to call at any time.
    pub fn stop(&self) {
        let was_active = self.inner.lock().teardown();
        if was_active {
            info!("Scan session stopped");
            self.report_status(ScanStatus::Stopped);
        }
    }

    /// Run one capture → decode → check cycle
    pub fn tick(&self) -> Result<TickOutcome, ScanError> {
        let (generation, handle) = {
            let mut inner = self.inner.lock();
            if inner.state != ScanState::Scanning {
                return Ok(TickOutcome::Cancelled);
            }
            let (handle, started_at) = match inner.session.as_ref() {
                Some(session) => (Arc::clone(&session.handle), session.started_at),
                None => return Ok(TickOutcome::Cancelled),
            };
            if let Some(limit) = self.config.max_scan_duration() {
                if started_at.elapsed() >= limit {
                    inner.teardown();
                    drop(inner);
                    info!("Scan timed out after {:?}", limit);
                    self.report_status(ScanStatus::TimedOut);
                    return Ok(TickOutcome::TimedOut);
                }
            }
            (inner.generation, handle)
        };

        if !handle.is_ready() {
            return Ok(TickOutcome::NotReady);
        }
        let Some((width, height)) = handle.frame_size() else {
            return Ok(TickOutcome::NotReady);
        };
        if width == 0 || height == 0 {
            return Ok(TickOutcome::NotReady);
        }

        let symbol = {
            let mut frame = self.frame.lock();
            if frame.ensure_size(width, height) {
                debug!("Frame buffer resized to {}x{}", width, height);
            }
            match handle.read_frame(&mut frame) {
                Ok(()) => {}
                Err(CaptureError::NotReady) => return Ok(TickOutcome::NotReady),
                Err(err) => {
                    let was_current = {
                        let mut inner = self.inner.lock();
                        inner.generation == generation && inner.teardown()
                    };
                    if !was_current {
                        return Ok(TickOutcome::Cancelled);
                    }
                    warn!("Frame capture failed, ending session: {}", err);
                    let err = ScanError::from(err);
                    self.report_status(ScanStatus::from_error(&err));
                    return Err(err);
                }
            }
            self.decoder.decode(frame.pixels(), width, height)
        };

        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.state != ScanState::Scanning {
            debug!("Discarding decode result from cancelled session");
            return Ok(TickOutcome::Cancelled);
        }
        inner.decode_attempts += 1;

        match symbol.and_then(DecodedPayload::from_symbol) {
            None => Ok(TickOutcome::NoMatch),
            Some(payload) => {
                let attempts = inner.decode_attempts;
                inner.teardown();
                drop(inner);
                info!("QR code recognized after {} decode attempts", attempts);
                self.report_status(ScanStatus::Recognized);
                Ok(TickOutcome::Matched(payload))
            }
        }
    }

    /// Poll until a match, a stop, or the configured timeout.
    ///
    /// Waits on `ticker` before every tick, including the first.
    pub async fn run<T: Ticker + ?Sized>(&self, ticker: &mut T) -> Result<ScanOutcome, ScanError> {
        loop {
            ticker.wait().await;
            match self.tick()? {
                TickOutcome::Matched(payload) => return Ok(ScanOutcome::Matched(payload)),
                TickOutcome::Cancelled => return Ok(ScanOutcome::Stopped),
                TickOutcome::TimedOut => return Ok(ScanOutcome::TimedOut),
                TickOutcome::NotReady | TickOutcome::NoMatch => {}
            }
        }
    }

    /// Set the zoom level, clamped into the capability range.
    ///
    /// Returns the level in effect afterwards. A device that rejects the
    /// constraint keeps its previous level; that is logged, not an error.
    pub async fn set_zoom(&self, level: f64) -> Result<f64, ScanError> {
        let (generation, handle, zoom, previous) = {
            let inner = self.inner.lock();
            if inner.state != ScanState::Scanning {
                return Err(ScanError::NotScanning);
            }
            let session = inner.session.as_ref().ok_or(ScanError::NotScanning)?;
            (
                inner.generation,
                Arc::clone(&session.handle),
                session.zoom,
                session.zoom_level,
            )
        };

        let range = zoom.range().ok_or(ScanError::ZoomUnsupported)?;
        let clamped = range.clamp(level);
        let previous = previous.unwrap_or(range.min);

        if zoom.is_optical() {
            if let Err(err) = handle.apply_zoom(clamped).await {
                warn!("Failed to apply zoom {}: {}", clamped, err);
                return Ok(previous);
            }
        }

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return Err(ScanError::NotScanning);
        }
        if let Some(session) = inner.session.as_mut() {
            session.zoom_level = Some(clamped);
        }
        debug!("Zoom set to {} ({:?})", clamped, zoom);
        Ok(clamped)
    }
}

impl std::fmt::Debug for ScanController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ScanController")
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("status", &inner.status)
            .field("decode_attempts", &inner.decode_attempts)
            .finish()
    }
}
