// Browser tick sources

use async_trait::async_trait;
use attendscan_core::Ticker;
use js_sys::{Function, Promise, Reflect};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

/// Schedule `callback` on the global `setTimeout`; works in windows and workers
fn set_timeout(callback: &Function, delay_ms: i32) -> Result<(), JsValue> {
    let global = js_sys::global();
    let set_timeout = Reflect::get(&global, &JsValue::from_str("setTimeout"))?.dyn_into::<Function>()?;
    set_timeout.call2(&global, callback, &JsValue::from(delay_ms))?;
    Ok(())
}

/// Fixed delay between ticks
#[derive(Debug, Clone)]
pub struct TimeoutTicker {
    delay_ms: i32,
}

impl TimeoutTicker {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms: i32::try_from(delay_ms).unwrap_or(i32::MAX),
        }
    }
}

#[async_trait(?Send)]
impl Ticker for TimeoutTicker {
    async fn wait(&mut self) {
        let delay = self.delay_ms;
        let promise = Promise::new(&mut |resolve, reject| {
            if let Err(e) = set_timeout(&resolve, delay) {
                let _ = reject.call1(&JsValue::NULL, &e);
            }
        });
        if let Err(e) = JsFuture::from(promise).await {
            tracing::warn!("setTimeout unavailable: {:?}", e);
        }
    }
}

/// One tick per display frame, like a requestAnimationFrame loop
#[derive(Debug, Clone, Default)]
pub struct AnimationFrameTicker;

#[async_trait(?Send)]
impl Ticker for AnimationFrameTicker {
    async fn wait(&mut self) {
        let promise = Promise::new(&mut |resolve, reject| {
            let scheduled = match web_sys::window() {
                Some(window) => window.request_animation_frame(&resolve).map(|_| ()),
                // no display outside a window, approximate 60Hz
                None => set_timeout(&resolve, 16),
            };
            if let Err(e) = scheduled {
                let _ = reject.call1(&JsValue::NULL, &e);
            }
        });
        if let Err(e) = JsFuture::from(promise).await {
            tracing::warn!("Animation frame scheduling failed: {:?}", e);
        }
    }
}
