// attendscan-wasm: browser bindings for the check-in scanner

pub mod camera;
pub mod decoder;
pub mod telegram;
pub mod ticker;

use crate::camera::{set_preview_scale, BrowserCamera};
use crate::decoder::JsQrDecoder;
use crate::telegram::{DetachedHost, TelegramWebApp};
use crate::ticker::{AnimationFrameTicker, TimeoutTicker};
use attendscan_core::{
    CheckInFlow, CheckInHandoff, FlowOutcome, HostChannel, LaunchContext, PanelAction,
    ScanConfig, ScanController, ScanObserver, ScanStatus, Ticker, ZoomCapability,
};
use js_sys::{Array, Function, Promise};
use std::cell::RefCell;
use std::sync::Arc;
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::HtmlVideoElement;

#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging() {
    console_error_panic_hook::set_once();
    // a second app on the same page keeps the first subscriber
    let _ = tracing_wasm::try_set_as_global_default();
}

fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Forwards controller events to page callbacks
#[derive(Default)]
struct JsObserver {
    on_status: RefCell<Option<Function>>,
    on_zoom: RefCell<Option<Function>>,
}

impl JsObserver {
    fn notify(callback: &RefCell<Option<Function>>, value: &impl serde::Serialize, text: &str) {
        let Some(callback) = callback.borrow().clone() else {
            return;
        };
        let value = match serde_wasm_bindgen::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not serialize event: {}", e);
                return;
            }
        };
        if let Err(e) = callback.call2(&JsValue::NULL, &JsValue::from_str(text), &value) {
            warn!("Page callback threw: {:?}", e);
        }
    }
}

impl ScanObserver for JsObserver {
    fn on_status(&self, status: &ScanStatus) {
        Self::notify(&self.on_status, status, &status.to_string());
    }

    fn on_zoom_capability(&self, capability: &ZoomCapability) {
        let kind = match capability {
            ZoomCapability::Optical { .. } => "optical",
            ZoomCapability::Visual { .. } => "visual",
            ZoomCapability::None => "none",
        };
        Self::notify(&self.on_zoom, capability, kind);
    }
}

/// The mini app as seen from the page script.
///
/// ```js
/// const app = new CheckInApp("qr-video", "qr-canvas");
/// app.onStatus((text) => (statusEl.textContent = text));
/// app.onZoomCapability((kind, cap) => showSlider(cap.range));
/// lectureInput.onchange = () => app.setLectureId(lectureInput.value);
/// button.onclick = () => app.startScan();
/// ```
#[wasm_bindgen]
pub struct CheckInApp {
    flow: CheckInFlow,
    observer: Arc<JsObserver>,
    video: HtmlVideoElement,
}

#[wasm_bindgen]
impl CheckInApp {
    /// Bind to the preview elements. `config` is an optional partial
    /// `ScanConfig` object.
    #[wasm_bindgen(constructor)]
    pub fn new(video_id: &str, canvas_id: &str, config: JsValue) -> Result<CheckInApp, JsValue> {
        init_logging();

        let config: ScanConfig = if config.is_undefined() || config.is_null() {
            ScanConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };

        let search = web_sys::window()
            .map(|w| w.location().search().unwrap_or_default())
            .unwrap_or_default();
        let launch = LaunchContext::from_query(&search);

        let host: Arc<dyn HostChannel> = match TelegramWebApp::from_window() {
            Some(web_app) => {
                web_app.ready_and_expand();
                Arc::new(web_app)
            }
            None => {
                warn!("Telegram WebApp not found, messages cannot be sent");
                Arc::new(DetachedHost)
            }
        };

        let camera = BrowserCamera::from_element_ids(video_id, canvas_id)?;
        let video = camera.video().clone();
        let close_after_send = config.close_after_send;
        let controller = ScanController::new(Arc::new(camera), Arc::new(JsQrDecoder::new()), config)
            .map_err(to_js_error)?;

        #[allow(clippy::arc_with_non_send_sync)]
        let observer = Arc::new(JsObserver::default());
        controller.set_observer(observer.clone());

        debug!("Check-in app ready for role {}", launch.role());
        let handoff = CheckInHandoff::new(host, launch, close_after_send);
        Ok(Self {
            flow: CheckInFlow::new(controller, handoff),
            observer,
            video,
        })
    }

    /// `callback(text, status)` on every status change
    #[wasm_bindgen(js_name = onStatus)]
    pub fn on_status(&self, callback: Function) {
        *self.observer.on_status.borrow_mut() = Some(callback);
    }

    /// `callback(kind, capability)` when a camera opens
    #[wasm_bindgen(js_name = onZoomCapability)]
    pub fn on_zoom_capability(&self, callback: Function) {
        *self.observer.on_zoom.borrow_mut() = Some(callback);
    }

    /// Scan on the configured fixed delay. Resolves to `"sent"`, `"stopped"`
    /// or `"timed_out"`; rejects with the status text on failure.
    #[wasm_bindgen(js_name = startScan)]
    pub fn start_scan(&self) -> Promise {
        let delay = self.flow.controller().config().tick_interval_ms;
        self.spawn_scan(TimeoutTicker::new(delay))
    }

    /// Scan once per display frame
    #[wasm_bindgen(js_name = startScanOnAnimationFrame)]
    pub fn start_scan_on_animation_frame(&self) -> Promise {
        self.spawn_scan(AnimationFrameTicker)
    }

    fn spawn_scan<T: Ticker + 'static>(&self, mut ticker: T) -> Promise {
        let flow = self.flow.clone();
        future_to_promise(async move {
            match flow.scan(&mut ticker).await {
                Ok(FlowOutcome::Sent(message)) => {
                    debug!("Scan finished with {}", message.kind());
                    Ok(JsValue::from_str("sent"))
                }
                Ok(FlowOutcome::Stopped) => Ok(JsValue::from_str("stopped")),
                Ok(FlowOutcome::TimedOut) => Ok(JsValue::from_str("timed_out")),
                Err(err) => Err(JsValue::from_str(&ScanStatus::from_error(&err).to_string())),
            }
        })
    }

    #[wasm_bindgen(js_name = stopScan)]
    pub fn stop_scan(&self) {
        self.flow.stop();
    }

    #[wasm_bindgen(js_name = isScanning)]
    pub fn is_scanning(&self) -> bool {
        self.flow.controller().is_active()
    }

    /// Resolves to the zoom level in effect. Visual zoom only scales the
    /// preview.
    #[wasm_bindgen(js_name = setZoom)]
    pub fn set_zoom(&self, level: f64) -> Promise {
        let controller = self.flow.controller().clone();
        let video = self.video.clone();
        future_to_promise(async move {
            let applied = controller.set_zoom(level).await.map_err(to_js_error)?;
            if let ZoomCapability::Visual { range } = controller.zoom_capability() {
                set_preview_scale(&video, applied / range.min)?;
            }
            Ok(JsValue::from_f64(applied))
        })
    }

    #[wasm_bindgen(js_name = zoomLevel)]
    pub fn zoom_level(&self) -> Option<f64> {
        self.flow.controller().zoom_level()
    }

    #[wasm_bindgen(js_name = statusText)]
    pub fn status_text(&self) -> String {
        self.flow.controller().status().to_string()
    }

    #[wasm_bindgen(js_name = authStatus)]
    pub fn auth_status(&self) -> String {
        self.flow.handoff().auth_status().to_string()
    }

    #[wasm_bindgen(js_name = isAuthenticated)]
    pub fn is_authenticated(&self) -> bool {
        self.flow.handoff().auth_status().is_authenticated()
    }

    pub fn role(&self) -> String {
        self.flow.handoff().launch().role().to_string()
    }

    /// Panels the page should show, in display order
    pub fn panels(&self) -> Array {
        self.flow
            .handoff()
            .launch()
            .panels()
            .iter()
            .map(|panel| JsValue::from_str(panel.as_str()))
            .collect()
    }

    /// Lecture the next check-in is sent for, typed or from the launch link
    #[wasm_bindgen(js_name = lectureId)]
    pub fn lecture_id(&self) -> Option<f64> {
        self.flow.handoff().lecture_id().map(|id| id as f64)
    }

    /// Student panel lecture field. Blank clears it; returns the lecture in
    /// effect.
    #[wasm_bindgen(js_name = setLectureId)]
    pub fn set_lecture_id(&self, lecture_id: &str) -> Result<Option<f64>, JsValue> {
        let lecture_id = self
            .flow
            .handoff()
            .set_lecture_id(lecture_id)
            .map_err(to_js_error)?;
        Ok(lecture_id.map(|id| id as f64))
    }

    #[wasm_bindgen(js_name = toggleLecture)]
    pub fn toggle_lecture(&self, lecture_id: String, is_active: bool) -> Result<(), JsValue> {
        self.submit(PanelAction::SpeakerToggle {
            lecture_id,
            is_active,
        })
    }

    #[wasm_bindgen(js_name = setLectureLocation)]
    pub fn set_lecture_location(&self, lecture_id: String, lat: f64, lon: f64) -> Result<(), JsValue> {
        self.submit(PanelAction::SpeakerLocation {
            lecture_id,
            lat,
            lon,
        })
    }

    #[wasm_bindgen(js_name = setRatingChat)]
    pub fn set_rating_chat(&self, rating_chat_id: String) -> Result<(), JsValue> {
        self.submit(PanelAction::AdminRatingChat { rating_chat_id })
    }

    #[wasm_bindgen(js_name = setSheetId)]
    pub fn set_sheet_id(&self, sheet_id: String) -> Result<(), JsValue> {
        self.submit(PanelAction::AdminSheetId { sheet_id })
    }

    fn submit(&self, action: PanelAction) -> Result<(), JsValue> {
        self.flow
            .submit(action)
            .map(|_| ())
            .map_err(|err| JsValue::from_str(&ScanStatus::from_error(&err).to_string()))
    }
}
