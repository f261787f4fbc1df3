//! Scripted collaborators
//!
//! A camera that plays back a fixed frame script, a decoder that reads the
//! symbols the camera painted into the pixels, and a host that records what it
//! was sent. The CLI replays scan scripts with these; tests use the counters to
//! check that the camera is never left open.
//!
//! Script lines (see [`parse_script`]):
//!
//! ```text
//! # comment
//! -           frame source not ready yet
//! .           frame without a symbol
//! @640x480    resolution change, then a frame without a symbol
//! !           stream ends (track stopped by the OS)
//! LECTURE:42  frame carrying this symbol
//! ```

use crate::capture::{
    CaptureDevice, CaptureError, CaptureHandle, CapturePreferences, DeviceCapabilities,
    FrameBuffer, ZoomRange,
};
use crate::decoder::{Decoder, Symbol};
use crate::host::{ChannelError, HostChannel, HostIdentity};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

const SYMBOL_MAGIC: &[u8; 4] = b"QRSC";
const SYMBOL_HEADER_LEN: usize = 8;

/// Default scripted resolution
pub const DEFAULT_FRAME_SIZE: (u32, u32) = (64, 64);

/// One step of a camera script; each consumes one polling tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFrame {
    NotReady,
    Blank,
    Code(String),
    Resize { width: u32, height: u32 },
    Disconnect,
}

impl FromStr for ScriptedFrame {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        match line {
            "" => Err("empty script line".to_string()),
            "-" => Ok(ScriptedFrame::NotReady),
            "." => Ok(ScriptedFrame::Blank),
            "!" => Ok(ScriptedFrame::Disconnect),
            _ if line.starts_with('@') => {
                let (w, h) = line[1..]
                    .split_once('x')
                    .ok_or_else(|| format!("resolution must look like @WxH: {}", line))?;
                let width = w.trim().parse::<u32>().map_err(|e| e.to_string())?;
                let height = h.trim().parse::<u32>().map_err(|e| e.to_string())?;
                if width == 0 || height == 0 {
                    return Err(format!("resolution must be non-zero: {}", line));
                }
                Ok(ScriptedFrame::Resize { width, height })
            }
            _ => Ok(ScriptedFrame::Code(line.to_string())),
        }
    }
}

/// Parse a frame script; blank lines and `#` comments are skipped
pub fn parse_script(text: &str) -> Result<Vec<ScriptedFrame>, String> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(number, line)| {
            line.parse::<ScriptedFrame>()
                .map_err(|e| format!("line {}: {}", number + 1, e))
        })
        .collect()
}

#[derive(Debug)]
struct CameraState {
    frames: VecDeque<ScriptedFrame>,
    size: (u32, u32),
    capabilities: DeviceCapabilities,
    acquire_failures: VecDeque<CaptureError>,
    zoom_fails: bool,
    applied_zoom: Option<f64>,
    acquire_attempts: usize,
    acquired: usize,
    released: usize,
    open: usize,
    peak_open: usize,
}

/// Camera that plays back a frame script.
///
/// Clones share the same script and counters. Once the script runs out the
/// camera keeps delivering blank frames.
#[derive(Debug, Clone)]
pub struct ScriptedCamera {
    state: Arc<Mutex<CameraState>>,
}

impl ScriptedCamera {
    pub fn new(frames: Vec<ScriptedFrame>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CameraState {
                frames: frames.into(),
                size: DEFAULT_FRAME_SIZE,
                capabilities: DeviceCapabilities::default(),
                acquire_failures: VecDeque::new(),
                zoom_fails: false,
                applied_zoom: None,
                acquire_attempts: 0,
                acquired: 0,
                released: 0,
                open: 0,
                peak_open: 0,
            })),
        }
    }

    pub fn with_zoom(self, range: ZoomRange) -> Self {
        self.state.lock().capabilities.zoom = Some(range);
        self
    }

    pub fn with_capabilities(self, capabilities: DeviceCapabilities) -> Self {
        self.state.lock().capabilities = capabilities;
        self
    }

    pub fn with_frame_size(self, width: u32, height: u32) -> Self {
        self.state.lock().size = (width, height);
        self
    }

    /// Make the next `acquire` fail with `err`
    pub fn fail_next_acquire(&self, err: CaptureError) {
        self.state.lock().acquire_failures.push_back(err);
    }

    /// Make zoom constraints fail (or succeed again)
    pub fn fail_zoom(&self, fail: bool) {
        self.state.lock().zoom_fails = fail;
    }

    /// Append frames to the script
    pub fn push_frames(&self, frames: impl IntoIterator<Item = ScriptedFrame>) {
        self.state.lock().frames.extend(frames);
    }

    pub fn acquire_attempts(&self) -> usize {
        self.state.lock().acquire_attempts
    }

    pub fn acquired(&self) -> usize {
        self.state.lock().acquired
    }

    pub fn released(&self) -> usize {
        self.state.lock().released
    }

    pub fn open_handles(&self) -> usize {
        self.state.lock().open
    }

    /// Highest number of simultaneously open handles seen
    pub fn peak_open_handles(&self) -> usize {
        self.state.lock().peak_open
    }

    pub fn applied_zoom(&self) -> Option<f64> {
        self.state.lock().applied_zoom
    }

    pub fn remaining_frames(&self) -> usize {
        self.state.lock().frames.len()
    }
}

#[async_trait(?Send)]
impl CaptureDevice for ScriptedCamera {
    async fn acquire(
        &self,
        _preferences: CapturePreferences,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let mut state = self.state.lock();
        state.acquire_attempts += 1;
        if let Some(err) = state.acquire_failures.pop_front() {
            return Err(err);
        }
        state.acquired += 1;
        state.open += 1;
        state.peak_open = state.peak_open.max(state.open);

        Ok(Box::new(ScriptedHandle {
            state: Arc::clone(&self.state),
            released: AtomicBool::new(false),
        }))
    }
}

struct ScriptedHandle {
    state: Arc<Mutex<CameraState>>,
    released: AtomicBool,
}

fn paint_symbol(buffer: &mut FrameBuffer, text: &str) -> Result<(), CaptureError> {
    let bytes = text.as_bytes();
    let needed = SYMBOL_HEADER_LEN + bytes.len();
    if needed > buffer.pixels().len() {
        return Err(CaptureError::DeviceUnavailable(format!(
            "{}x{} frame cannot carry a {} byte symbol",
            buffer.width(),
            buffer.height(),
            bytes.len()
        )));
    }

    buffer.clear();
    let pixels = buffer.pixels_mut();
    pixels[..4].copy_from_slice(SYMBOL_MAGIC);
    pixels[4..SYMBOL_HEADER_LEN].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
    pixels[SYMBOL_HEADER_LEN..needed].copy_from_slice(bytes);
    Ok(())
}

#[async_trait(?Send)]
impl CaptureHandle for ScriptedHandle {
    fn is_ready(&self) -> bool {
        if self.released.load(Ordering::SeqCst) {
            return false;
        }
        let mut state = self.state.lock();
        let front = state.frames.front().cloned();
        match front {
            Some(ScriptedFrame::Resize { width, height }) => {
                state.size = (width, height);
                state.frames.pop_front();
                state.frames.push_front(ScriptedFrame::Blank);
                true
            }
            Some(ScriptedFrame::NotReady) => {
                state.frames.pop_front();
                false
            }
            _ => true,
        }
    }

    fn frame_size(&self) -> Option<(u32, u32)> {
        if self.released.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.state.lock().size)
    }

    fn read_frame(&self, buffer: &mut FrameBuffer) -> Result<(), CaptureError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(CaptureError::DeviceUnavailable("handle released".to_string()));
        }
        let frame = self.state.lock().frames.pop_front();
        match frame {
            None | Some(ScriptedFrame::Blank) => {
                buffer.clear();
                Ok(())
            }
            Some(ScriptedFrame::Code(text)) => paint_symbol(buffer, &text),
            Some(ScriptedFrame::NotReady) => Err(CaptureError::NotReady),
            Some(ScriptedFrame::Resize { width, height }) => {
                self.state.lock().size = (width, height);
                Err(CaptureError::NotReady)
            }
            Some(ScriptedFrame::Disconnect) => Err(CaptureError::DeviceUnavailable(
                "video track ended".to_string(),
            )),
        }
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.state.lock().capabilities
    }

    async fn apply_zoom(&self, level: f64) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.zoom_fails {
            return Err(CaptureError::Constraint(format!("zoom {} rejected", level)));
        }
        state.applied_zoom = Some(level);
        Ok(())
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock();
        state.released += 1;
        state.open = state.open.saturating_sub(1);
    }
}

impl Drop for ScriptedHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Decoder for frames painted by [`ScriptedCamera`]
#[derive(Debug, Clone, Default)]
pub struct ScriptedDecoder {
    calls: Arc<AtomicUsize>,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `decode` invocations so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decoder for ScriptedDecoder {
    fn decode(&self, pixels: &[u8], _width: u32, _height: u32) -> Option<Symbol> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if pixels.len() < SYMBOL_HEADER_LEN || &pixels[..4] != SYMBOL_MAGIC {
            return None;
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&pixels[4..SYMBOL_HEADER_LEN]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        let body = pixels.get(SYMBOL_HEADER_LEN..SYMBOL_HEADER_LEN + len)?;
        String::from_utf8(body.to_vec()).ok().map(Symbol::new)
    }
}

#[derive(Debug, Default)]
struct HostState {
    identity: Option<HostIdentity>,
    sent: Vec<String>,
    close_calls: usize,
    send_failure: Option<ChannelError>,
    close_fails: bool,
}

/// Host channel that records every message
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    state: Arc<Mutex<HostState>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(self, identity: HostIdentity) -> Self {
        self.state.lock().identity = Some(identity);
        self
    }

    /// Make every `send` fail with `err`
    pub fn fail_sends(&self, err: ChannelError) {
        self.state.lock().send_failure = Some(err);
    }

    pub fn fail_close(&self, fail: bool) {
        self.state.lock().close_fails = fail;
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }
}

impl HostChannel for RecordingHost {
    fn identity(&self) -> Option<HostIdentity> {
        self.state.lock().identity.clone()
    }

    fn send(&self, message: &str) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        if let Some(err) = state.send_failure.clone() {
            return Err(err);
        }
        state.sent.push(message.to_string());
        Ok(())
    }

    fn close(&self) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        state.close_calls += 1;
        if state.close_fails {
            return Err(ChannelError::CloseFailed("host refused".to_string()));
        }
        Ok(())
    }
}
