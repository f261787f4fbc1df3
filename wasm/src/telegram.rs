// Telegram WebApp bridge (window.Telegram.WebApp)

use attendscan_core::{ChannelError, HostChannel, HostIdentity, HostUser};
use js_sys::{Array, Function, Reflect};
use tracing::{debug, warn};
use wasm_bindgen::{JsCast, JsValue};

fn get(target: &JsValue, key: &str) -> Option<JsValue> {
    Reflect::get(target, &JsValue::from_str(key))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

/// Host channel backed by the Telegram mini app object
pub struct TelegramWebApp {
    web_app: JsValue,
}

impl TelegramWebApp {
    /// The WebApp object, if the page runs inside Telegram
    pub fn from_window() -> Option<Self> {
        let window: JsValue = web_sys::window()?.into();
        let telegram = get(&window, "Telegram")?;
        let web_app = get(&telegram, "WebApp").filter(|v| v.is_object())?;
        Some(Self { web_app })
    }

    fn call(
        &self,
        method: &str,
        args: &Array,
        on_throw: fn(String) -> ChannelError,
    ) -> Result<JsValue, ChannelError> {
        let function = get(&self.web_app, method)
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or(ChannelError::Unavailable)?;
        function
            .apply(&self.web_app, args)
            .map_err(|e| on_throw(e.as_string().unwrap_or_else(|| format!("{:?}", e))))
    }

    /// Tell Telegram the app is ready and take the full height
    pub fn ready_and_expand(&self) {
        for method in ["ready", "expand"] {
            if let Err(e) = self.call(method, &Array::new(), ChannelError::SendFailed) {
                debug!("WebApp.{}() failed: {}", method, e);
            }
        }
    }

    fn user(&self) -> Option<HostUser> {
        let unsafe_data = get(&self.web_app, "initDataUnsafe")?;
        let user = get(&unsafe_data, "user")?;
        match serde_wasm_bindgen::from_value::<HostUser>(user) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Ignoring malformed WebApp user: {}", e);
                None
            }
        }
    }
}

impl HostChannel for TelegramWebApp {
    fn identity(&self) -> Option<HostIdentity> {
        let init_data = get(&self.web_app, "initData")
            .and_then(|v| v.as_string())
            .unwrap_or_default();
        HostIdentity {
            init_data,
            user: self.user(),
        }
        .non_empty()
    }

    fn send(&self, message: &str) -> Result<(), ChannelError> {
        self.call(
            "sendData",
            &Array::of1(&JsValue::from_str(message)),
            ChannelError::SendFailed,
        )?;
        Ok(())
    }

    fn close(&self) -> Result<(), ChannelError> {
        self.call("close", &Array::new(), ChannelError::CloseFailed)?;
        Ok(())
    }
}

/// Stand-in when the page is opened outside Telegram
#[derive(Debug, Default)]
pub struct DetachedHost;

impl HostChannel for DetachedHost {
    fn identity(&self) -> Option<HostIdentity> {
        None
    }

    fn send(&self, _message: &str) -> Result<(), ChannelError> {
        Err(ChannelError::Unavailable)
    }

    fn close(&self) -> Result<(), ChannelError> {
        Err(ChannelError::Unavailable)
    }
}
