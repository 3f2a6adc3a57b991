//! [`Document`] over a real Chrome tab
//!
//! Every operation is one `Runtime.evaluate` of a call into an injected bridge
//! script (`puppet_bridge.js`), which keeps the element handles and installs
//! the capture listeners. Listener events reach Rust through a page binding
//! and are forwarded to the capture sink on a dedicated thread, so the sink
//! may evaluate in the tab again.

use crate::codec::{decode, JsFunction, Jsonf};
use crate::dom::{BoundingBox, CaptureSink, Document, DomEvent, ElementInfo, NodeId, UploadedFile};
use crate::error::{BrowserError, Result};
use base64::{engine::general_purpose, Engine as _};
use headless_chrome::Tab;
use log::{debug, error, trace};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{mpsc, Arc};

const BRIDGE_SCRIPT: &str = include_str!("puppet_bridge.js");

/// Name of the page binding the bridge reports events through
const EMIT_BINDING: &str = "__puppetEmit";

#[derive(Debug, Deserialize)]
struct BridgeReply {
    #[serde(default)]
    ok: Option<Value>,
    #[serde(default)]
    error: Option<BridgeFailure>,
}

#[derive(Debug, Deserialize)]
struct BridgeFailure {
    kind: String,
    message: String,
}

impl From<BridgeFailure> for BrowserError {
    fn from(failure: BridgeFailure) -> Self {
        match failure.kind.as_str() {
            "InvalidNode" => BrowserError::InvalidNode(failure.message),
            "SyntaxError" => BrowserError::InvalidSelector(failure.message),
            _ => BrowserError::ScriptFailed(failure.message),
        }
    }
}

/// Listener event as reported by the bridge
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum BridgeEvent {
    Click { target: u64 },
    Focus { target: u64 },
    Input { target: u64 },
    Scroll { target: u64 },
    Change { target: u64 },
    Mouseover { target: u64 },
    #[serde(rename_all = "camelCase")]
    Keydown { target: u64, key_code: u32, ctrl_key: bool, shift_key: bool, alt_key: bool },
    Blur,
    #[serde(rename_all = "camelCase")]
    Console { message_type: String, message: String },
    Mutation,
}

impl From<BridgeEvent> for DomEvent {
    fn from(event: BridgeEvent) -> Self {
        match event {
            BridgeEvent::Click { target } => DomEvent::Click { target: NodeId(target) },
            BridgeEvent::Focus { target } => DomEvent::Focus { target: NodeId(target) },
            BridgeEvent::Input { target } => DomEvent::Input { target: NodeId(target) },
            BridgeEvent::Scroll { target } => DomEvent::Scroll { target: NodeId(target) },
            BridgeEvent::Change { target } => DomEvent::Change { target: NodeId(target) },
            BridgeEvent::Mouseover { target } => DomEvent::Mouseover { target: NodeId(target) },
            BridgeEvent::Keydown { target, key_code, ctrl_key, shift_key, alt_key } => {
                DomEvent::Keydown { target: NodeId(target), key_code, ctrl_key, shift_key, alt_key }
            }
            BridgeEvent::Blur => DomEvent::WindowBlur,
            BridgeEvent::Console { message_type, message } => {
                DomEvent::Console { message_type, message }
            }
            BridgeEvent::Mutation => DomEvent::Mutation,
        }
    }
}

/// Binding payloads arrive either already parsed or as the JSON text the bridge sent
fn parse_bridge_event(payload: Value) -> Result<DomEvent> {
    let event: BridgeEvent = match payload {
        Value::String(raw) => serde_json::from_str(&raw)?,
        other => serde_json::from_value(other)?,
    };
    Ok(event.into())
}

/// Wrap a bridge call so it reinstalls the bridge after a navigation
fn bridge_expression(call: &str) -> String {
    format!(
        "(function () {{ if (!window.__puppetBridge) {{ {} }} return {}; }})()",
        BRIDGE_SCRIPT, call
    )
}

fn parse_reply(raw: &str) -> Result<Value> {
    let reply: BridgeReply = serde_json::from_str(raw)?;
    match reply.error {
        Some(failure) => Err(failure.into()),
        None => Ok(reply.ok.unwrap_or(Value::Null)),
    }
}

/// Page capability backed by a headless_chrome tab
pub struct ChromeDocument {
    tab: Arc<Tab>,
    forward: Arc<Mutex<Option<mpsc::Sender<Value>>>>,
    binding_exposed: Mutex<bool>,
}

impl ChromeDocument {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab, forward: Arc::new(Mutex::new(None)), binding_exposed: Mutex::new(false) }
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    /// Inject the bridge into the current page
    pub fn install(&self) -> Result<()> {
        self.evaluate(&bridge_expression("true"), false).map(|_| ())
    }

    fn evaluate(&self, expression: &str, await_promise: bool) -> Result<Option<Value>> {
        let remote = self
            .tab
            .evaluate(expression, await_promise)
            .map_err(|e| BrowserError::ScriptFailed(e.to_string()))?;
        Ok(remote.value)
    }

    fn call(&self, op: &str, args: Value) -> Result<Value> {
        trace!("bridge call: {}", op);
        let call = format!("window.__puppetBridge.call({}, {})", json!(op), args);
        let expression = bridge_expression(&call);

        match self.evaluate(&expression, false)? {
            Some(Value::String(raw)) => parse_reply(&raw),
            other => Err(BrowserError::ScriptFailed(format!(
                "{}: unexpected bridge reply {:?}",
                op, other
            ))),
        }
    }

    fn call_as<T: DeserializeOwned>(&self, op: &str, args: Value) -> Result<T> {
        Ok(serde_json::from_value(self.call(op, args)?)?)
    }
}

impl Document for ChromeDocument {
    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        self.call_as("querySelectorAll", json!([selector]))
    }

    fn matches(&self, node: NodeId, selector: &str) -> Result<bool> {
        self.call_as("matches", json!([node, selector]))
    }

    fn element(&self, node: NodeId) -> Result<ElementInfo> {
        self.call_as("element", json!([node]))
    }

    fn is_displayed(&self, node: NodeId) -> Result<bool> {
        self.call_as("isDisplayed", json!([node]))
    }

    fn bounding_box(&self, node: NodeId) -> Result<BoundingBox> {
        self.call_as("boundingBox", json!([node]))
    }

    fn element_from_point(&self, x: f64, y: f64) -> Result<Option<NodeId>> {
        self.call_as("elementFromPoint", json!([x, y]))
    }

    fn contains(&self, ancestor: NodeId, node: NodeId) -> Result<bool> {
        self.call_as("contains", json!([ancestor, node]))
    }

    fn active_element(&self) -> Result<Option<NodeId>> {
        self.call_as("activeElement", json!([]))
    }

    fn click(&self, node: NodeId) -> Result<()> {
        self.call("click", json!([node])).map(|_| ())
    }

    fn focus(&self, node: NodeId) -> Result<()> {
        self.call("focus", json!([node])).map(|_| ())
    }

    fn set_value(&self, node: NodeId, value: &str) -> Result<()> {
        self.call("setValue", json!([node, value])).map(|_| ())
    }

    fn press_key(&self, node: NodeId, key_code: u32) -> Result<()> {
        self.call("pressKey", json!([node, key_code])).map(|_| ())
    }

    fn mouseover(&self, node: NodeId) -> Result<()> {
        self.call("mouseover", json!([node])).map(|_| ())
    }

    fn set_scroll_top(&self, node: NodeId, scroll_top: f64) -> Result<()> {
        self.call("setScrollTop", json!([node, scroll_top])).map(|_| ())
    }

    fn scroll_into_view(&self, node: NodeId) -> Result<()> {
        self.call("scrollIntoView", json!([node])).map(|_| ())
    }

    fn clear_persistent_data(&self) -> Result<()> {
        self.call("clearPersistentData", json!([])).map(|_| ())
    }

    fn assign_file(&self, destination: &str, file: UploadedFile) -> Result<()> {
        let encoded = general_purpose::STANDARD.encode(&file.bytes);
        self.call("assignFile", json!([destination, file.name, file.mime_type, encoded]))
            .map(|_| ())
    }

    fn exec_function(&self, function: &JsFunction, args: &[Jsonf]) -> Result<Jsonf> {
        let args = serde_json::to_string(args)?;
        let expression = bridge_expression(&format!(
            "window.__puppetBridge.exec(({}), {})",
            function.source(),
            args
        ));

        match self.evaluate(&expression, true)? {
            Some(Value::String(raw)) => {
                let reply: BridgeReply = serde_json::from_str(&raw)?;
                if let Some(failure) = reply.error {
                    return Err(failure.into());
                }
                // revive functions and regexes the page returned as text
                let result = reply.ok.unwrap_or(Value::Null);
                decode(&result.to_string())
            }
            other => Err(BrowserError::ScriptFailed(format!("exec: unexpected reply {:?}", other))),
        }
    }

    fn attach_capture(&self, sink: CaptureSink) -> Result<()> {
        let (sender, receiver) = mpsc::channel::<Value>();

        std::thread::Builder::new()
            .name("puppet-capture".to_string())
            .spawn(move || {
                while let Ok(payload) = receiver.recv() {
                    match parse_bridge_event(payload) {
                        Ok(event) => sink(event),
                        Err(e) => error!("dropping malformed capture event: {}", e),
                    }
                }
                debug!("capture forwarding stopped");
            })?;

        // replacing the sender ends the previous forwarding thread
        *self.forward.lock() = Some(sender);

        let mut exposed = self.binding_exposed.lock();
        if !*exposed {
            let forward = self.forward.clone();
            self.tab
                .expose_function(
                    EMIT_BINDING,
                    Arc::new(move |payload: Value| {
                        if let Some(sender) = forward.lock().as_ref() {
                            let _ = sender.send(payload);
                        }
                    }),
                )
                .map_err(|e| {
                    BrowserError::TabOperationFailed(format!("Failed to expose binding: {}", e))
                })?;
            *exposed = true;
        }

        self.install()
    }

    fn set_capture_suspended(&self, suspended: bool) -> Result<()> {
        self.call("setCaptureSuspended", json!([suspended])).map(|_| ())
    }
}
