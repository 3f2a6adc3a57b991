use crate::codec::{truncate, JsFunction, Jsonf};
use crate::dom::query::SelectorList;
use crate::dom::tree::DomTree;
use crate::dom::{
    BoundingBox, CaptureSink, Document, DomEvent, ElementInfo, ElementNode, NodeId, UploadedFile,
};
use crate::error::{BrowserError, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Script implementation registered for a function source text
pub type ScriptFn = Arc<dyn Fn(&[Jsonf]) -> Result<Jsonf> + Send + Sync>;

/// Event dispatched on an element, in dispatch order
pub type DispatchedEvent = DomEvent;

#[derive(Debug)]
struct PageState {
    tree: DomTree,
    active: Option<NodeId>,
    cookies: IndexMap<String, String>,
    local_storage: IndexMap<String, String>,
    globals: IndexMap<String, UploadedFile>,
    dispatched: Vec<DispatchedEvent>,
    scrolled_into_view: Vec<NodeId>,
}

/// In-process page: an arena DOM with window state and synchronous event dispatch
///
/// Commands fire their events synchronously, like a real DOM. No lock is held
/// while the capture sink runs, so the sink may query the document again.
pub struct MemoryDocument {
    state: RwLock<PageState>,
    sink: RwLock<Option<CaptureSink>>,
    scripts: RwLock<HashMap<String, ScriptFn>>,
}

impl MemoryDocument {
    pub fn new(root: ElementNode) -> Self {
        Self {
            state: RwLock::new(PageState {
                tree: DomTree::new(root),
                active: None,
                cookies: IndexMap::new(),
                local_storage: IndexMap::new(),
                globals: IndexMap::new(),
                dispatched: Vec::new(),
                scrolled_into_view: Vec::new(),
            }),
            sink: RwLock::new(None),
            scripts: RwLock::new(HashMap::new()),
        }
    }

    /// Build from the JSON form of an [`ElementNode`] tree
    pub fn from_json(json: &str) -> Result<Self> {
        let root: ElementNode = serde_json::from_str(json)?;
        Ok(Self::new(root))
    }

    /// Make `exec_function` answer calls of the function with this source
    pub fn register_function<F>(&self, source: &str, script: F)
    where
        F: Fn(&[Jsonf]) -> Result<Jsonf> + Send + Sync + 'static,
    {
        self.scripts.write().insert(source.trim().to_string(), Arc::new(script));
    }

    pub fn root(&self) -> NodeId {
        self.state.read().tree.root()
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.state.read().tree.find_by_id(id)
    }

    /// Run a closure against the current tree
    pub fn with_tree<R>(&self, f: impl FnOnce(&DomTree) -> R) -> R {
        f(&self.state.read().tree)
    }

    /// Show or hide an element (`display`), notifying observers
    pub fn set_visible(&self, node: NodeId, visible: bool) -> Result<()> {
        self.state.write().tree.node_mut(node)?.is_visible = visible;
        self.emit(DomEvent::Mutation);
        Ok(())
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<()> {
        self.state
            .write()
            .tree
            .node_mut(node)?
            .attributes
            .insert(name.to_string(), value.to_string());
        self.emit(DomEvent::Mutation);
        Ok(())
    }

    pub fn append(&self, parent: NodeId, element: ElementNode) -> Result<NodeId> {
        let id = self.state.write().tree.append(parent, element)?;
        self.emit(DomEvent::Mutation);
        Ok(id)
    }

    /// Simulate the user picking files in a file input
    pub fn set_files(&self, node: NodeId, names: Vec<String>) -> Result<()> {
        self.state.write().tree.node_mut(node)?.file_names = names;
        Ok(())
    }

    pub fn set_cookie(&self, name: &str, value: &str) {
        self.state.write().cookies.insert(name.to_string(), value.to_string());
    }

    pub fn cookies(&self) -> IndexMap<String, String> {
        self.state.read().cookies.clone()
    }

    pub fn set_local_storage(&self, key: &str, value: &str) {
        self.state.write().local_storage.insert(key.to_string(), value.to_string());
    }

    pub fn local_storage(&self) -> IndexMap<String, String> {
        self.state.read().local_storage.clone()
    }

    /// File assigned to a window path by an upload command
    pub fn global_file(&self, path: &str) -> Option<UploadedFile> {
        self.state.read().globals.get(path).cloned()
    }

    pub fn dispatched_events(&self) -> Vec<DispatchedEvent> {
        self.state.read().dispatched.clone()
    }

    pub fn scrolled_into_view(&self) -> Vec<NodeId> {
        self.state.read().scrolled_into_view.clone()
    }

    /// Dispatch an event to the registered capture sink
    pub fn emit(&self, event: DomEvent) {
        if event.target().is_some() {
            self.state.write().dispatched.push(event.clone());
        }

        let sink = self.sink.read().clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }

    fn check_node(&self, node: NodeId) -> Result<()> {
        self.state.read().tree.node(node).map(|_| ())
    }
}

impl Document for MemoryDocument {
    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        let list = SelectorList::parse(selector)?;
        Ok(list.query_all(&self.state.read().tree))
    }

    fn matches(&self, node: NodeId, selector: &str) -> Result<bool> {
        let list = SelectorList::parse(selector)?;
        let state = self.state.read();
        state.tree.node(node)?;
        Ok(list.matches(&state.tree, node))
    }

    fn element(&self, node: NodeId) -> Result<ElementInfo> {
        let state = self.state.read();
        let tree = &state.tree;
        let element = tree.node(node)?;

        let value = match element.tag_name.as_str() {
            "INPUT" | "TEXTAREA" | "SELECT" => Some(element.value.clone().unwrap_or_default()),
            _ => element.value.clone(),
        };

        Ok(ElementInfo {
            tag_name: element.tag_name.clone(),
            id: element.id().to_string(),
            class_name: element.class_name().to_string(),
            attributes: element.attributes.clone(),
            inner_text: tree.inner_text(node),
            value,
            checked: element.checked,
            scroll_top: element.scroll_top,
            file_names: element.file_names.clone(),
            parent: element.parent,
            sibling_index: tree.sibling_index(node),
        })
    }

    fn is_displayed(&self, node: NodeId) -> Result<bool> {
        let state = self.state.read();
        state.tree.node(node)?;
        Ok(state.tree.is_displayed(node))
    }

    fn bounding_box(&self, node: NodeId) -> Result<BoundingBox> {
        Ok(self.state.read().tree.node(node)?.bounding_box.unwrap_or_default())
    }

    fn element_from_point(&self, x: f64, y: f64) -> Result<Option<NodeId>> {
        Ok(self.state.read().tree.hit_test(x, y))
    }

    fn contains(&self, ancestor: NodeId, node: NodeId) -> Result<bool> {
        let state = self.state.read();
        state.tree.node(ancestor)?;
        state.tree.node(node)?;
        Ok(state.tree.contains(ancestor, node))
    }

    fn active_element(&self) -> Result<Option<NodeId>> {
        Ok(self.state.read().active)
    }

    fn click(&self, node: NodeId) -> Result<()> {
        let toggled = {
            let mut state = self.state.write();
            let element = state.tree.node_mut(node)?;
            let is_toggle = element.tag_name == "INPUT"
                && matches!(element.attribute("type"), Some("checkbox") | Some("radio"));
            if is_toggle {
                element.checked = !element.checked;
            }
            is_toggle
        };

        self.emit(DomEvent::Click { target: node });
        if toggled {
            self.emit(DomEvent::Change { target: node });
        }
        Ok(())
    }

    fn focus(&self, node: NodeId) -> Result<()> {
        {
            let mut state = self.state.write();
            state.tree.node(node)?;
            if state.active == Some(node) {
                return Ok(());
            }
            state.active = Some(node);
        }
        self.emit(DomEvent::Focus { target: node });
        Ok(())
    }

    fn set_value(&self, node: NodeId, value: &str) -> Result<()> {
        self.state.write().tree.node_mut(node)?.value = Some(value.to_string());
        self.emit(DomEvent::Input { target: node });
        Ok(())
    }

    fn press_key(&self, node: NodeId, key_code: u32) -> Result<()> {
        self.check_node(node)?;
        self.emit(DomEvent::Keydown {
            target: node,
            key_code,
            ctrl_key: false,
            shift_key: false,
            alt_key: false,
        });
        Ok(())
    }

    fn mouseover(&self, node: NodeId) -> Result<()> {
        self.check_node(node)?;
        self.emit(DomEvent::Mouseover { target: node });
        Ok(())
    }

    fn set_scroll_top(&self, node: NodeId, scroll_top: f64) -> Result<()> {
        self.state.write().tree.node_mut(node)?.scroll_top = scroll_top;
        self.emit(DomEvent::Scroll { target: node });
        Ok(())
    }

    fn scroll_into_view(&self, node: NodeId) -> Result<()> {
        let mut state = self.state.write();
        state.tree.node(node)?;
        state.scrolled_into_view.push(node);
        Ok(())
    }

    fn clear_persistent_data(&self) -> Result<()> {
        let mut state = self.state.write();
        state.cookies.clear();
        state.local_storage.clear();
        Ok(())
    }

    fn assign_file(&self, destination: &str, file: UploadedFile) -> Result<()> {
        let valid = !destination.is_empty()
            && destination
                .split('.')
                .all(|segment| {
                    !segment.is_empty()
                        && segment.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
                });
        if !valid {
            return Err(BrowserError::ScriptFailed(format!(
                "invalid destination variable '{}'",
                destination
            )));
        }

        self.state.write().globals.insert(destination.to_string(), file);
        Ok(())
    }

    fn exec_function(&self, function: &JsFunction, args: &[Jsonf]) -> Result<Jsonf> {
        let script = self.scripts.read().get(function.source().trim()).cloned();
        match script {
            Some(script) => script(args),
            None => Err(BrowserError::ScriptFailed(format!(
                "function is not available in this document: {}",
                truncate(function.source(), 60)
            ))),
        }
    }

    fn attach_capture(&self, sink: CaptureSink) -> Result<()> {
        *self.sink.write() = Some(sink);
        Ok(())
    }
}
