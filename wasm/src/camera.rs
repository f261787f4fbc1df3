// Browser camera: a getUserMedia stream shown in a <video> and read back
// through a 2D canvas

use async_trait::async_trait;
use attendscan_core::{
    CaptureDevice, CaptureError, CaptureHandle, CapturePreferences, DeviceCapabilities,
    FrameBuffer, ZoomRange,
};
use js_sys::{Array, Function, Object, Reflect};
use std::cell::Cell;
use tracing::{debug, warn};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    CanvasRenderingContext2d, DomException, HtmlCanvasElement, HtmlMediaElement,
    HtmlVideoElement, MediaStream, MediaStreamConstraints, MediaStreamTrack,
    MediaTrackConstraints,
};

const HIDDEN_CLASS: &str = "hidden";

/// Map a rejected media promise to a capture error
fn capture_error(err: JsValue) -> CaptureError {
    match err.dyn_ref::<DomException>() {
        Some(exception) => match exception.name().as_str() {
            "NotAllowedError" | "SecurityError" | "PermissionDeniedError" => {
                CaptureError::PermissionDenied
            }
            name => CaptureError::DeviceUnavailable(format!("{}: {}", name, exception.message())),
        },
        None => CaptureError::DeviceUnavailable(
            err.as_string().unwrap_or_else(|| format!("{:?}", err)),
        ),
    }
}

fn video_constraints(preferences: &CapturePreferences) -> Result<MediaStreamConstraints, JsValue> {
    let video = Object::new();
    Reflect::set(
        &video,
        &JsValue::from_str("facingMode"),
        &JsValue::from_str(preferences.facing_mode.as_str()),
    )?;
    let constraints = Object::new();
    Reflect::set(&constraints, &JsValue::from_str("video"), &video)?;
    Reflect::set(&constraints, &JsValue::from_str("audio"), &JsValue::FALSE)?;
    Ok(constraints.unchecked_into())
}

/// Cosmetic preview scale for cameras without optical zoom. Frames are drawn
/// from the intrinsic video, so the decoder never sees the scale.
pub fn set_preview_scale(video: &HtmlVideoElement, scale: f64) -> Result<(), JsValue> {
    let style = Reflect::get(video, &JsValue::from_str("style"))?;
    let transform = if scale == 1.0 {
        String::new()
    } else {
        format!("scale({})", scale)
    };
    Reflect::set(
        &style,
        &JsValue::from_str("transform"),
        &JsValue::from_str(&transform),
    )?;
    Ok(())
}

/// Camera bound to the page's preview video and scratch canvas
pub struct BrowserCamera {
    video: HtmlVideoElement,
    canvas: HtmlCanvasElement,
}

impl BrowserCamera {
    pub fn new(video: HtmlVideoElement, canvas: HtmlCanvasElement) -> Self {
        Self { video, canvas }
    }

    /// Look up the preview elements by id
    pub fn from_element_ids(video_id: &str, canvas_id: &str) -> Result<Self, JsValue> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| JsValue::from_str("No document available"))?;

        let video = document
            .get_element_by_id(video_id)
            .ok_or_else(|| JsValue::from_str(&format!("No element #{}", video_id)))?
            .dyn_into::<HtmlVideoElement>()
            .map_err(|_| JsValue::from_str(&format!("#{} is not a <video>", video_id)))?;
        let canvas = document
            .get_element_by_id(canvas_id)
            .ok_or_else(|| JsValue::from_str(&format!("No element #{}", canvas_id)))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| JsValue::from_str(&format!("#{} is not a <canvas>", canvas_id)))?;

        Ok(Self::new(video, canvas))
    }

    pub fn video(&self) -> &HtmlVideoElement {
        &self.video
    }
}

#[async_trait(?Send)]
impl CaptureDevice for BrowserCamera {
    async fn acquire(
        &self,
        preferences: CapturePreferences,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let window = web_sys::window()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no window".to_string()))?;
        let media_devices = window.navigator().media_devices().map_err(|_| {
            CaptureError::DeviceUnavailable("camera API not available in this context".to_string())
        })?;

        let constraints = video_constraints(&preferences).map_err(capture_error)?;
        let promise = media_devices
            .get_user_media_with_constraints(&constraints)
            .map_err(capture_error)?;
        let stream: MediaStream = JsFuture::from(promise)
            .await
            .map_err(capture_error)?
            .unchecked_into();

        debug!("Camera stream granted (facing {})", preferences.facing_mode);
        let handle = attach_or_stop(self.video.clone(), self.canvas.clone(), stream)?;
        Ok(Box::new(handle))
    }
}

fn stop_tracks(stream: &MediaStream) {
    for track in stream.get_tracks().iter() {
        track.unchecked_into::<MediaStreamTrack>().stop();
    }
}

/// Bind a granted stream to the preview; a stream that cannot be bound is
/// stopped before the error is returned
fn attach_or_stop(
    video: HtmlVideoElement,
    canvas: HtmlCanvasElement,
    stream: MediaStream,
) -> Result<BrowserCaptureHandle, CaptureError> {
    BrowserCaptureHandle::attach(video, canvas, stream.clone()).map_err(|err| {
        stop_tracks(&stream);
        warn!("Camera stream stopped, preview setup failed: {}", err);
        err
    })
}

pub struct BrowserCaptureHandle {
    video: HtmlVideoElement,
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
    stream: MediaStream,
    track: Option<MediaStreamTrack>,
    released: Cell<bool>,
}

impl BrowserCaptureHandle {
    fn attach(
        video: HtmlVideoElement,
        canvas: HtmlCanvasElement,
        stream: MediaStream,
    ) -> Result<Self, CaptureError> {
        let context = canvas
            .get_context("2d")
            .map_err(capture_error)?
            .ok_or_else(|| CaptureError::DeviceUnavailable("2d canvas unsupported".to_string()))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| CaptureError::DeviceUnavailable("2d canvas unsupported".to_string()))?;

        let first = stream.get_video_tracks().get(0);
        let track = (!first.is_undefined()).then(|| first.unchecked_into::<MediaStreamTrack>());

        // inline playback keeps iOS from going fullscreen
        let _ = video.set_attribute("playsinline", "true");
        video.set_muted(true);
        video.set_src_object(Some(&stream));
        let _ = video.class_list().remove_1(HIDDEN_CLASS);
        if let Ok(promise) = video.play() {
            wasm_bindgen_futures::spawn_local(async move {
                if let Err(e) = JsFuture::from(promise).await {
                    debug!("Video autoplay rejected: {:?}", e);
                }
            });
        }

        Ok(Self {
            video,
            canvas,
            context,
            stream,
            track,
            released: Cell::new(false),
        })
    }

    fn zoom_range(&self) -> Option<ZoomRange> {
        let track = self.track.as_ref()?;
        // getCapabilities is missing on some engines
        let get_capabilities = Reflect::get(track, &JsValue::from_str("getCapabilities"))
            .ok()?
            .dyn_into::<Function>()
            .ok()?;
        let capabilities = get_capabilities.call0(track).ok()?;
        let zoom = Reflect::get(&capabilities, &JsValue::from_str("zoom")).ok()?;
        if !zoom.is_object() {
            return None;
        }

        let field = |name: &str| {
            Reflect::get(&zoom, &JsValue::from_str(name))
                .ok()
                .and_then(|v| v.as_f64())
        };
        let min = field("min")?;
        let max = field("max")?;
        Some(ZoomRange::new(min, max, field("step")))
    }
}

#[async_trait(?Send)]
impl CaptureHandle for BrowserCaptureHandle {
    fn is_ready(&self) -> bool {
        !self.released.get() && self.video.ready_state() >= HtmlMediaElement::HAVE_ENOUGH_DATA
    }

    fn frame_size(&self) -> Option<(u32, u32)> {
        if self.released.get() {
            return None;
        }
        let (width, height) = (self.video.video_width(), self.video.video_height());
        (width > 0 && height > 0).then_some((width, height))
    }

    fn read_frame(&self, buffer: &mut FrameBuffer) -> Result<(), CaptureError> {
        if self.released.get() {
            return Err(CaptureError::DeviceUnavailable("stream released".to_string()));
        }
        let (width, height) = (buffer.width(), buffer.height());
        if self.canvas.width() != width || self.canvas.height() != height {
            self.canvas.set_width(width);
            self.canvas.set_height(height);
        }

        self.context
            .draw_image_with_html_video_element_and_dw_and_dh(
                &self.video,
                0.0,
                0.0,
                width as f64,
                height as f64,
            )
            .map_err(|_| CaptureError::NotReady)?;
        let image = self
            .context
            .get_image_data(0.0, 0.0, width as f64, height as f64)
            .map_err(capture_error)?;

        let data = image.data();
        buffer.copy_from(&data.0).map_err(|len| {
            debug!("Canvas returned {} bytes for a {}x{} frame", len, width, height);
            CaptureError::NotReady
        })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            zoom: self.zoom_range(),
        }
    }

    async fn apply_zoom(&self, level: f64) -> Result<(), CaptureError> {
        let track = self
            .track
            .as_ref()
            .ok_or_else(|| CaptureError::Constraint("no video track".to_string()))?;

        let zoom = Object::new();
        Reflect::set(&zoom, &JsValue::from_str("zoom"), &JsValue::from_f64(level))
            .map_err(|e| CaptureError::Constraint(format!("{:?}", e)))?;
        let constraints = Object::new();
        Reflect::set(
            &constraints,
            &JsValue::from_str("advanced"),
            &Array::of1(&zoom),
        )
        .map_err(|e| CaptureError::Constraint(format!("{:?}", e)))?;

        let promise = track
            .apply_constraints_with_constraints(constraints.unchecked_ref::<MediaTrackConstraints>())
            .map_err(|e| CaptureError::Constraint(format!("{:?}", e)))?;
        JsFuture::from(promise)
            .await
            .map_err(|e| CaptureError::Constraint(format!("{:?}", e)))?;
        Ok(())
    }

    fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        stop_tracks(&self.stream);
        self.video.set_src_object(None);
        let _ = set_preview_scale(&self.video, 1.0);
        if let Err(e) = self.video.class_list().add_1(HIDDEN_CLASS) {
            warn!("Could not hide the preview: {:?}", e);
        }
        debug!("Camera tracks stopped");
    }
}

impl Drop for BrowserCaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;
    use web_sys::MediaStreamTrackState;

    fn element<T: JsCast>(tag: &str) -> T {
        web_sys::window()
            .and_then(|w| w.document())
            .unwrap()
            .create_element(tag)
            .unwrap()
            .dyn_into::<T>()
            .unwrap()
    }

    #[wasm_bindgen_test]
    fn test_stream_stopped_when_canvas_is_taken() {
        // a canvas bound to WebGL refuses a 2d context
        let canvas: HtmlCanvasElement = element("canvas");
        if canvas.get_context("webgl").ok().flatten().is_none() {
            return;
        }

        let source: HtmlCanvasElement = element("canvas");
        source.get_context("2d").unwrap();
        let stream = source.capture_stream().unwrap();
        assert!(stream.get_video_tracks().length() > 0);

        let result = attach_or_stop(element("video"), canvas, stream.clone());
        assert!(result.is_err());
        for track in stream.get_tracks().iter() {
            let track = track.unchecked_into::<MediaStreamTrack>();
            assert_eq!(track.ready_state(), MediaStreamTrackState::Ended);
        }
    }

    #[wasm_bindgen_test]
    fn test_release_ends_tracks() {
        let source: HtmlCanvasElement = element("canvas");
        source.get_context("2d").unwrap();
        let stream = source.capture_stream().unwrap();

        let handle = attach_or_stop(element("video"), element("canvas"), stream.clone()).unwrap();
        assert!(!handle.released.get());
        drop(handle);

        for track in stream.get_tracks().iter() {
            let track = track.unchecked_into::<MediaStreamTrack>();
            assert_eq!(track.ready_state(), MediaStreamTrackState::Ended);
        }
    }
}
