// jsQR binding; the page loads jsQR as a global script

use attendscan_core::{Decoder, Symbol};
use js_sys::{Reflect, Uint8ClampedArray};
use std::cell::Cell;
use tracing::warn;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_name = jsQR, catch)]
    fn js_qr(data: &Uint8ClampedArray, width: u32, height: u32) -> Result<JsValue, JsValue>;
}

#[derive(Debug, Default)]
pub struct JsQrDecoder {
    missing_reported: Cell<bool>,
}

impl JsQrDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True only the first time jsQR is found missing
    fn first_miss(&self) -> bool {
        !self.missing_reported.replace(true)
    }

    /// Whether the jsQR global has been loaded
    pub fn is_available() -> bool {
        Reflect::has(&js_sys::global(), &JsValue::from_str("jsQR")).unwrap_or(false)
    }
}

impl Decoder for JsQrDecoder {
    fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Option<Symbol> {
        if !Self::is_available() {
            if self.first_miss() {
                warn!("jsQR is not loaded, frames are skipped until it is");
            }
            return None;
        }

        let data = Uint8ClampedArray::from(pixels);
        match js_qr(&data, width, height) {
            Ok(code) if code.is_object() => Reflect::get(&code, &JsValue::from_str("data"))
                .ok()
                .and_then(|text| text.as_string())
                .map(Symbol::new),
            Ok(_) => None,
            Err(e) => {
                warn!("jsQR threw on a {}x{} frame: {:?}", width, height, e);
                None
            }
        }
    }
}
