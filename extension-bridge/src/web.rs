// Browser bindings
// `web_sys::Window` as host window, a Vuex store as state sink, and the
// `WasmBridge` class exported to the page's JavaScript

use std::rc::Rc;

use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{MessageEvent, Window};

use crate::bridge::ExtensionBridge;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::host::{HostWindow, MessageListener};
use crate::protocol::InboundEvent;
use crate::store::{Action, Mutation, StateSink};

/// Property set on `window` once a bridge listens there
const BRIDGE_MARKER: &str = "__lunieExtensionBridge";

fn to_js(value: &Value) -> Result<JsValue> {
    let text = serde_json::to_string(value)?;
    js_sys::JSON::parse(&text).map_err(|e| BridgeError::Post(format!("{:?}", e)))
}

fn from_js(value: &JsValue) -> Option<Value> {
    let text: JsValue = js_sys::JSON::stringify(value).ok()?.into();
    serde_json::from_str(&text.as_string()?).ok()
}

impl HostWindow for Window {
    fn post_message(&self, message: &Value, target_origin: &str) -> Result<()> {
        let message = to_js(message)?;
        Window::post_message(self, &message, target_origin)
            .map_err(|e| BridgeError::Post(format!("{:?}", e)))
    }

    fn add_message_listener(&self, listener: MessageListener) -> Result<()> {
        let window = self.clone();
        let closure = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let same_source = event
                .source()
                .map(|source| js_sys::Object::is(&source, &window))
                .unwrap_or(false);

            // Structured-clone data that is not plain JSON cannot be ours
            let Some(data) = from_js(&event.data()) else {
                return;
            };

            listener(InboundEvent {
                same_source,
                origin: event.origin(),
                data,
            });
        });

        self.add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
            .map_err(|e| BridgeError::Post(format!("{:?}", e)))?;

        // Lives as long as the page
        closure.forget();
        Ok(())
    }

    fn claim_bridge_listener(&self) -> bool {
        let key = JsValue::from_str(BRIDGE_MARKER);
        if js_sys::Reflect::has(self, &key).unwrap_or(false) {
            return false;
        }
        js_sys::Reflect::set(self, &key, &JsValue::TRUE).unwrap_or(false)
    }
}

/// Forwards commits and dispatches to a JS store object
pub struct JsStateSink {
    store: JsValue,
}

impl JsStateSink {
    pub fn new(store: JsValue) -> Self {
        Self { store }
    }

    fn call(&self, method: &str, name: &str, payload: Option<Value>) {
        if let Err(e) = self.try_call(method, name, payload) {
            log::warn!("store.{}({}) failed: {:?}", method, name, e);
        }
    }

    fn try_call(
        &self,
        method: &str,
        name: &str,
        payload: Option<Value>,
    ) -> std::result::Result<(), JsValue> {
        let function: js_sys::Function =
            js_sys::Reflect::get(&self.store, &JsValue::from_str(method))?.dyn_into()?;

        match payload {
            Some(payload) => {
                let payload = to_js(&payload).map_err(|e| JsValue::from_str(&e.to_string()))?;
                function.call2(&self.store, &JsValue::from_str(name), &payload)?;
            }
            None => {
                function.call1(&self.store, &JsValue::from_str(name))?;
            }
        }
        Ok(())
    }
}

impl StateSink for JsStateSink {
    fn commit(&self, mutation: Mutation) {
        self.call("commit", mutation.name(), mutation.payload());
    }

    fn dispatch(&self, action: Action) {
        self.call("dispatch", action.name(), None);
    }
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&e.to_string()).into()
}

#[wasm_bindgen]
pub struct WasmBridge {
    inner: Rc<ExtensionBridge<Window, JsStateSink>>,
}

#[wasm_bindgen]
impl WasmBridge {
    #[wasm_bindgen(constructor)]
    pub fn new(
        store: JsValue,
        target_origin: Option<String>,
        sign_timeout_ms: Option<u32>,
    ) -> std::result::Result<WasmBridge, JsValue> {
        let window = web_sys::window().ok_or_else(|| js_error("no global window"))?;

        let mut config = BridgeConfig::default();
        if let Some(origin) = target_origin {
            config.target_origin = origin;
        }
        if let Some(timeout) = sign_timeout_ms {
            config.sign_timeout_ms = u64::from(timeout);
        }
        config.validate().map_err(js_error)?;

        let sink = Rc::new(JsStateSink::new(store));
        Ok(WasmBridge {
            inner: Rc::new(ExtensionBridge::with_sink(Rc::new(window), sink, &config)),
        })
    }

    #[wasm_bindgen(js_name = initLogging)]
    pub fn init_logging() {
        wasm_logger::init(wasm_logger::Config::default());
    }

    #[wasm_bindgen(js_name = listenToExtensionMessages)]
    pub fn listen(&self) -> std::result::Result<(), JsValue> {
        self.inner.listen().map_err(js_error)
    }

    #[wasm_bindgen(js_name = getAccounts)]
    pub fn request_accounts(&self) -> std::result::Result<(), JsValue> {
        self.inner.request_accounts().map_err(js_error)
    }

    /// Resolves to `{ signature: Uint8Array, publicKey: Uint8Array }`
    #[wasm_bindgen(js_name = signWithExtension)]
    pub fn sign(&self, sign_message: String, sender_address: String) -> js_sys::Promise {
        let inner = Rc::clone(&self.inner);
        wasm_bindgen_futures::future_to_promise(async move {
            let signature = inner
                .sign(&sign_message, &sender_address)
                .await
                .map_err(js_error)?;

            let result = js_sys::Object::new();
            js_sys::Reflect::set(
                &result,
                &"signature".into(),
                &js_sys::Uint8Array::from(signature.signature.as_slice()),
            )?;
            js_sys::Reflect::set(
                &result,
                &"publicKey".into(),
                &js_sys::Uint8Array::from(signature.public_key.as_slice()),
            )?;
            Ok(result.into())
        })
    }
}
