use crate::dom::element::{BoundingBox, ElementNode};
use crate::dom::NodeId;
use crate::error::{BrowserError, Result};
use indexmap::IndexMap;

/// One element stored in the arena
#[derive(Debug, Clone)]
pub struct DomNode {
    /// Upper case, as `Element.tagName` reports it
    pub tag_name: String,
    pub attributes: IndexMap<String, String>,
    pub text: Option<String>,
    pub value: Option<String>,
    pub checked: bool,
    pub scroll_top: f64,
    pub is_visible: bool,
    pub bounding_box: Option<BoundingBox>,
    pub file_names: Vec<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl DomNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn id(&self) -> &str {
        self.attribute("id").unwrap_or("")
    }

    pub fn class_name(&self) -> &str {
        self.attribute("class").unwrap_or("")
    }

    pub fn has_class(&self, class_name: &str) -> bool {
        self.class_name().split_whitespace().any(|c| c == class_name)
    }
}

/// Arena-backed DOM tree; node ids are stable indices in document order of insertion
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<DomNode>,
    root: NodeId,
}

impl DomTree {
    /// Flatten a declarative element tree into an arena
    pub fn new(root: ElementNode) -> Self {
        let mut tree = Self { nodes: Vec::new(), root: NodeId(0) };
        tree.root = tree.insert(root, None);
        tree
    }

    fn insert(&mut self, element: ElementNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(DomNode {
            tag_name: element.tag_name.to_uppercase(),
            attributes: element.attributes,
            text: element.text_content,
            value: element.value,
            checked: element.checked,
            scroll_top: 0.0,
            is_visible: element.is_visible,
            bounding_box: element.bounding_box,
            file_names: Vec::new(),
            parent,
            children: Vec::new(),
        });

        for child in element.children {
            let child_id = self.insert(child, Some(id));
            self.nodes[id.0 as usize].children.push(child_id);
        }

        id
    }

    /// Append a new subtree as the last child of `parent`
    pub fn append(&mut self, parent: NodeId, element: ElementNode) -> Result<NodeId> {
        self.node(parent)?;
        let id = self.insert(element, Some(parent));
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Result<&DomNode> {
        self.nodes
            .get(id.0 as usize)
            .ok_or_else(|| BrowserError::InvalidNode(format!("no node with id {}", id.0)))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut DomNode> {
        self.nodes
            .get_mut(id.0 as usize)
            .ok_or_else(|| BrowserError::InvalidNode(format!("no node with id {}", id.0)))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.parent)
    }

    /// 1-based position among the parent's children; a root counts as 1
    pub fn sibling_index(&self, id: NodeId) -> usize {
        match self.parent(id).and_then(|p| self.node(p).ok()) {
            Some(parent) => parent.children.iter().position(|c| *c == id).map_or(1, |i| i + 1),
            None => 1,
        }
    }

    /// Strict ancestors, nearest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |n| self.parent(*n))
    }

    /// Every node in document (pre-)order
    pub fn document_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            order.push(id);
            if let Ok(node) = self.node(id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }

        order
    }

    /// True when `node` is `ancestor` itself or one of its descendants
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Rendered: the node and all of its ancestors are visible
    pub fn is_displayed(&self, id: NodeId) -> bool {
        let own = self.node(id).map(|n| n.is_visible).unwrap_or(false);
        own && self.ancestors(id).all(|a| self.node(a).map(|n| n.is_visible).unwrap_or(false))
    }

    /// Topmost displayed node whose box contains the point (later in document order wins)
    pub fn hit_test(&self, x: f64, y: f64) -> Option<NodeId> {
        self.document_order().into_iter().rev().find(|id| {
            self.is_displayed(*id)
                && self
                    .node(*id)
                    .ok()
                    .and_then(|n| n.bounding_box)
                    .is_some_and(|b| b.contains_point(x, y))
        })
    }

    /// Text of the node and its displayed descendants, joined by newlines
    pub fn inner_text(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        self.collect_text(id, &mut parts);
        parts.join("\n")
    }

    fn collect_text(&self, id: NodeId, parts: &mut Vec<String>) {
        let Ok(node) = self.node(id) else {
            return;
        };
        if !node.is_visible {
            return;
        }
        if let Some(text) = node.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            parts.push(text.to_string());
        }
        for child in &node.children {
            self.collect_text(*child, parts);
        }
    }

    /// Count total elements in the tree
    pub fn count_elements(&self) -> usize {
        self.nodes.len()
    }

    /// First node in document order with the given id attribute
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.document_order()
            .into_iter()
            .find(|n| self.node(*n).is_ok_and(|node| node.id() == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tree() -> ElementNode {
        ElementNode::new("body").with_children(vec![
            ElementNode::new("header").with_child(
                ElementNode::new("button")
                    .with_id("nav-btn")
                    .with_text("Menu")
                    .with_bounding_box(0.0, 0.0, 100.0, 20.0),
            ),
            ElementNode::new("main").with_children(vec![
                ElementNode::new("a").with_attribute("href", "/page").with_text("Click here"),
                ElementNode::new("div")
                    .with_class("content")
                    .with_text("Some text")
                    .with_visibility(false),
            ]),
        ])
    }

    #[test]
    fn test_dom_tree_creation() {
        let tree = DomTree::new(create_test_tree());
        let root = tree.node(tree.root()).unwrap();

        assert_eq!(root.tag_name, "BODY");
        assert_eq!(root.children.len(), 2);
        assert_eq!(tree.count_elements(), 6);
    }

    #[test]
    fn test_document_order_and_siblings() {
        let tree = DomTree::new(create_test_tree());
        let tags: Vec<String> = tree
            .document_order()
            .into_iter()
            .map(|id| tree.node(id).unwrap().tag_name.clone())
            .collect();
        assert_eq!(tags, ["BODY", "HEADER", "BUTTON", "MAIN", "A", "DIV"]);

        let div = tree.document_order()[5];
        assert_eq!(tree.sibling_index(div), 2);
        assert_eq!(tree.sibling_index(tree.root()), 1);
        assert_eq!(tree.ancestors(div).count(), 2);
    }

    #[test]
    fn test_visibility_and_hit_test() {
        let mut tree = DomTree::new(create_test_tree());
        let button = tree.find_by_id("nav-btn").unwrap();

        assert!(tree.is_displayed(button));
        assert_eq!(tree.hit_test(50.0, 10.0), Some(button));
        assert_eq!(tree.hit_test(500.0, 10.0), None);

        let header = tree.parent(button).unwrap();
        tree.node_mut(header).unwrap().is_visible = false;
        assert!(!tree.is_displayed(button));
        assert_eq!(tree.hit_test(50.0, 10.0), None);
    }

    #[test]
    fn test_inner_text_skips_hidden() {
        let tree = DomTree::new(create_test_tree());
        assert_eq!(tree.inner_text(tree.root()), "Menu\nClick here");
    }

    #[test]
    fn test_append_and_contains() {
        let mut tree = DomTree::new(create_test_tree());
        let main = tree.document_order()[3];
        let added = tree.append(main, ElementNode::new("p").with_text("new")).unwrap();

        assert_eq!(tree.sibling_index(added), 3);
        assert!(tree.contains(tree.root(), added));
        assert!(tree.contains(added, added));
        assert!(!tree.contains(added, main));
        assert!(tree.append(NodeId(999), ElementNode::new("p")).is_err());
    }
}
