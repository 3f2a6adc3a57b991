//! Page access for the puppet
//!
//! The puppet never touches a browser directly; it works through the
//! [`Document`] capability. This module provides:
//! - Document: the page operations commands and capture need
//! - ElementNode / DomTree: declarative and arena representations of a DOM
//! - SelectorList: the CSS query engine behind the in-memory document
//! - MemoryDocument: a complete in-process Document used by tests and tools

pub mod element;
pub mod memory;
pub mod query;
pub mod tree;

pub use element::{BoundingBox, ElementNode};
pub use memory::{DispatchedEvent, MemoryDocument, ScriptFn};
pub use query::SelectorList;
pub use tree::{DomNode, DomTree};

use crate::codec::{JsFunction, Jsonf};
use crate::error::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Opaque handle to an element of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

/// Snapshot of the element properties the puppet reads
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    /// Upper case tag name (`DIV`, `INPUT`)
    pub tag_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
    #[serde(default)]
    pub inner_text: String,
    /// Live value of form controls
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub scroll_top: f64,
    #[serde(default)]
    pub file_names: Vec<String>,
    #[serde(default)]
    pub parent: Option<NodeId>,
    /// 1-based position among the parent's element children
    #[serde(default = "first_sibling")]
    pub sibling_index: usize,
}

fn first_sibling() -> usize {
    1
}

impl ElementInfo {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn is_body(&self) -> bool {
        self.tag_name == "BODY"
    }

    /// `type` of form controls, lower case; `text` for inputs without one
    pub fn input_type(&self) -> Option<String> {
        match self.tag_name.as_str() {
            "INPUT" => Some(self.attribute("type").unwrap_or("text").to_ascii_lowercase()),
            "BUTTON" => Some(self.attribute("type").unwrap_or("submit").to_ascii_lowercase()),
            "TEXTAREA" => Some("textarea".to_string()),
            "SELECT" => Some("select-one".to_string()),
            _ => None,
        }
    }
}

/// DOM and window events the puppet listens to
#[derive(Debug, Clone, PartialEq)]
pub enum DomEvent {
    Click { target: NodeId },
    Focus { target: NodeId },
    Input { target: NodeId },
    Scroll { target: NodeId },
    Keydown { target: NodeId, key_code: u32, ctrl_key: bool, shift_key: bool, alt_key: bool },
    Change { target: NodeId },
    Mouseover { target: NodeId },
    /// The window lost focus
    WindowBlur,
    /// `console.warn` / `console.error` in the page
    Console { message_type: String, message: String },
    /// Something in the document changed (attributes, children, visibility)
    Mutation,
}

impl DomEvent {
    pub fn target(&self) -> Option<NodeId> {
        match self {
            DomEvent::Click { target }
            | DomEvent::Focus { target }
            | DomEvent::Input { target }
            | DomEvent::Scroll { target }
            | DomEvent::Keydown { target, .. }
            | DomEvent::Change { target }
            | DomEvent::Mouseover { target } => Some(*target),
            DomEvent::WindowBlur | DomEvent::Console { .. } | DomEvent::Mutation => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomEvent::Click { .. } => "click",
            DomEvent::Focus { .. } => "focus",
            DomEvent::Input { .. } => "input",
            DomEvent::Scroll { .. } => "scroll",
            DomEvent::Keydown { .. } => "keydown",
            DomEvent::Change { .. } => "change",
            DomEvent::Mouseover { .. } => "mouseover",
            DomEvent::WindowBlur => "blur",
            DomEvent::Console { .. } => "console",
            DomEvent::Mutation => "mutation",
        }
    }
}

/// Receiver of every DOM event; called synchronously from the dispatching thread
pub type CaptureSink = Arc<dyn Fn(DomEvent) + Send + Sync>;

/// Decoded upload, ready to be assigned into the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Page capability injected into the puppet
pub trait Document: Send + Sync {
    /// All matches of a CSS selector list, in document order
    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>>;

    fn matches(&self, node: NodeId, selector: &str) -> Result<bool>;

    fn element(&self, node: NodeId) -> Result<ElementInfo>;

    /// Not `display: none`, including through an ancestor
    fn is_displayed(&self, node: NodeId) -> Result<bool>;

    fn bounding_box(&self, node: NodeId) -> Result<BoundingBox>;

    /// Topmost element at a viewport point
    fn element_from_point(&self, x: f64, y: f64) -> Result<Option<NodeId>>;

    /// `ancestor.contains(node)`; a node contains itself
    fn contains(&self, ancestor: NodeId, node: NodeId) -> Result<bool>;

    fn active_element(&self) -> Result<Option<NodeId>>;

    fn click(&self, node: NodeId) -> Result<()>;

    fn focus(&self, node: NodeId) -> Result<()>;

    /// Set the value and dispatch a bubbling `input` event
    fn set_value(&self, node: NodeId, value: &str) -> Result<()>;

    /// Dispatch a bubbling keydown carrying `which`, `keyCode` and `charCode`
    fn press_key(&self, node: NodeId, key_code: u32) -> Result<()>;

    fn mouseover(&self, node: NodeId) -> Result<()>;

    fn set_scroll_top(&self, node: NodeId, scroll_top: f64) -> Result<()>;

    fn scroll_into_view(&self, node: NodeId) -> Result<()>;

    /// Expire every cookie and clear local storage
    fn clear_persistent_data(&self) -> Result<()>;

    /// Assign a file object to a dotted window path such as `app.files.upload`
    fn assign_file(&self, destination: &str, file: UploadedFile) -> Result<()>;

    /// Run a function in the page and return its (awaited) result
    fn exec_function(&self, function: &JsFunction, args: &[Jsonf]) -> Result<Jsonf>;

    /// Register the receiver of capture events, replacing any previous one
    fn attach_capture(&self, sink: CaptureSink) -> Result<()>;

    /// Drop listener events at the source while a command runs
    fn set_capture_suspended(&self, _suspended: bool) -> Result<()> {
        Ok(())
    }
}
