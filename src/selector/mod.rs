//! Unique CSS selector synthesis
//!
//! [`UniqueSelector::get`] turns a node into the shortest selector it can find
//! that matches exactly that node:
//!
//! 1. a node with an id (and `use_ids`) is `#id`, nothing else is computed
//! 2. otherwise one [`SelectorElement`] is built per node from the target up
//!    to (not including) `BODY`, stopping early after an id candidate
//! 3. outer candidates are dropped while the match count stays the same
//! 4. if still ambiguous, `:nth-child(n)` is added from the target outwards
//!    wherever it lowers the match count
//! 5. trailing class tokens are dropped while the selector stays unique
//! 6. with a preferred class pattern, step 3 runs again without protection

pub mod element;
pub mod list;

pub use element::{SelectorElement, SelectorKind};
pub use list::SelectorElementList;

use crate::codec::JsRegExp;
use crate::dom::{Document, NodeId};
use crate::error::{BrowserError, Result};
use serde::{Deserialize, Serialize};

/// Hard guard on the preferred-class ancestor walk, independent of the user limit
pub const MAX_ANCESTOR_WALK: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueSelectorOptions {
    /// Class names stripped before building class candidates (case-insensitive)
    #[serde(rename = "ignoredClasses", default)]
    pub ignored_class_names: Vec<String>,

    #[serde(default = "default_true")]
    pub use_ids: bool,

    /// Classes matching this pattern are preferred and protected, e.g. `/test--[^ ]+/`
    #[serde(rename = "preferredClass", default, skip_serializing_if = "Option::is_none")]
    pub preferred_class_pattern: Option<JsRegExp>,

    /// Select the closest ancestor carrying a preferred class instead of the node
    #[serde(rename = "useClosestParentWithPreferredClass", default)]
    pub use_closest_ancestor_with_preferred_class: bool,

    /// How many levels the closest-ancestor walk may climb
    #[serde(rename = "preferredClassParentLimit", default)]
    pub preferred_class_ancestor_limit: usize,
}

impl Default for UniqueSelectorOptions {
    fn default() -> Self {
        Self {
            ignored_class_names: Vec::new(),
            use_ids: true,
            preferred_class_pattern: None,
            use_closest_ancestor_with_preferred_class: false,
            preferred_class_ancestor_limit: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Selector synthesizer bound to a set of options
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UniqueSelector {
    options: UniqueSelectorOptions,
}

impl UniqueSelector {
    pub fn new(options: UniqueSelectorOptions) -> Result<Self> {
        if options.preferred_class_pattern.as_ref().is_some_and(JsRegExp::is_global) {
            return Err(BrowserError::InvalidOptions(
                "global flag not allowed for \"preferredClass\"".to_string(),
            ));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &UniqueSelectorOptions {
        &self.options
    }

    pub fn set_ignored_classes(&mut self, classes: Vec<String>) {
        self.options.ignored_class_names = classes;
    }

    /// Minimal selector matching exactly `node`
    pub fn get(&self, document: &dyn Document, node: NodeId) -> Result<String> {
        let info = document.element(node)?;

        let id = info.id.trim();
        if self.options.use_ids && !id.is_empty() {
            return Ok(format!("#{}", id));
        }

        let target = self.closest_preferred_ancestor(document, node)?;
        let preferred = self.options.preferred_class_pattern.as_ref();

        let mut list = self.parent_selector_path(document, target)?;

        list.simplify(true)?;

        if !list.is_unique()? {
            list.uniqueify()?;
        }

        list.simplify_classes(false)?;

        if preferred.is_some() {
            list.simplify(false)?;
        }

        let selector = list.selector_path();
        log::trace!("unique selector for node {}: {}", node.0, selector);
        Ok(selector)
    }

    /// Unsimplified ancestor chain, for diagnostics
    pub fn full_selector_path(&self, document: &dyn Document, node: NodeId) -> Result<String> {
        Ok(self.parent_selector_path(document, node)?.selector_path())
    }

    fn closest_preferred_ancestor(&self, document: &dyn Document, node: NodeId) -> Result<NodeId> {
        let Some(preferred) = &self.options.preferred_class_pattern else {
            return Ok(node);
        };
        if !self.options.use_closest_ancestor_with_preferred_class {
            return Ok(node);
        }

        let mut current = Some(node);
        let mut depth = 0;

        while let Some(candidate) = current {
            let info = document.element(candidate)?;
            if info.is_body() {
                break;
            }

            if depth >= self.options.preferred_class_ancestor_limit {
                break;
            }

            if depth >= MAX_ANCESTOR_WALK {
                return Err(BrowserError::InvalidOptions(format!(
                    "preferred class ancestor walk exceeded {} levels",
                    MAX_ANCESTOR_WALK
                )));
            }

            if preferred.is_match(&info.class_name) {
                return Ok(candidate);
            }

            current = info.parent;
            depth += 1;
        }

        Ok(node)
    }

    fn parent_selector_path<'a>(
        &'a self,
        document: &'a dyn Document,
        node: NodeId,
    ) -> Result<SelectorElementList<'a>> {
        let preferred = self.options.preferred_class_pattern.as_ref();
        let mut list = SelectorElementList::new(document, preferred);
        let mut current = Some(node);

        while let Some(candidate) = current {
            let info = document.element(candidate)?;
            if info.is_body() {
                break;
            }

            let element = SelectorElement::new(candidate, &info, &self.options)?;
            let is_id = element.kind() == SelectorKind::Id;
            list.add_element(element);

            if self.options.use_ids && is_id {
                break;
            }

            current = info.parent;
        }

        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ElementNode, MemoryDocument};

    fn page() -> MemoryDocument {
        let body = ElementNode::new("body").with_children(vec![
            ElementNode::new("div").with_id("app").with_child(
                ElementNode::new("section").with_class("card test--card").with_children(vec![
                    ElementNode::new("button").with_class("btn primary"),
                    ElementNode::new("button").with_class("btn"),
                ]),
            ),
            ElementNode::new("section")
                .with_class("card")
                .with_child(ElementNode::new("button").with_class("btn")),
        ]);
        MemoryDocument::new(ElementNode::new("html").with_child(body))
    }

    fn assert_unique(doc: &MemoryDocument, selector: &str, node: NodeId) {
        assert_eq!(
            doc.query_selector_all(selector).unwrap(),
            vec![node],
            "selector {:?}",
            selector
        );
    }

    #[test]
    fn test_id_short_circuit() {
        let doc = page();
        let app = doc.find_by_id("app").unwrap();
        let selector = UniqueSelector::default();
        assert_eq!(selector.get(&doc, app).unwrap(), "#app");
    }

    #[test]
    fn test_id_ancestor_terminates_chain() {
        let doc = page();
        let selector = UniqueSelector::default();
        let second = doc.query_selector_all("button").unwrap()[1];

        assert_eq!(
            selector.full_selector_path(&doc, second).unwrap(),
            "#app > .card.test--card > .btn"
        );
        let unique = selector.get(&doc, second).unwrap();
        assert_eq!(unique, ".card > .btn:nth-child(2)");
        assert_unique(&doc, &unique, second);
    }

    #[test]
    fn test_class_simplification() {
        let doc = page();
        let selector = UniqueSelector::default();
        let first = doc.query_selector_all("button").unwrap()[0];

        let unique = selector.get(&doc, first).unwrap();
        assert_eq!(unique, ".primary");
        assert_unique(&doc, &unique, first);
    }

    #[test]
    fn test_idempotent() {
        let doc = page();
        let selector = UniqueSelector::default();
        for button in doc.query_selector_all("button").unwrap() {
            let a = selector.get(&doc, button).unwrap();
            let b = selector.get(&doc, button).unwrap();
            assert_eq!(a, b);
            assert_unique(&doc, &a, button);
        }
    }

    #[test]
    fn test_without_ids() {
        let doc = page();
        let options = UniqueSelectorOptions { use_ids: false, ..Default::default() };
        let selector = UniqueSelector::new(options).unwrap();

        for button in doc.query_selector_all("button").unwrap() {
            let unique = selector.get(&doc, button).unwrap();
            assert!(!unique.contains('#'));
            assert_unique(&doc, &unique, button);
        }
    }

    #[test]
    fn test_closest_ancestor_with_preferred_class() {
        let doc = page();
        let options = UniqueSelectorOptions {
            preferred_class_pattern: Some(JsRegExp::new("test--[^ ]+", "").unwrap()),
            use_closest_ancestor_with_preferred_class: true,
            preferred_class_ancestor_limit: 3,
            ..Default::default()
        };
        let selector = UniqueSelector::new(options.clone()).unwrap();
        let second = doc.query_selector_all("button").unwrap()[1];
        let card = doc.query_selector_all(".test--card").unwrap()[0];

        assert_eq!(selector.get(&doc, second).unwrap(), ".test--card");
        assert_unique(&doc, ".test--card", card);

        // a limit of 1 only inspects the node itself
        let limited = UniqueSelector::new(UniqueSelectorOptions {
            preferred_class_ancestor_limit: 1,
            ..options
        })
        .unwrap();
        let unique = limited.get(&doc, second).unwrap();
        assert_unique(&doc, &unique, second);
    }

    #[test]
    fn test_global_preferred_class_rejected() {
        let options = UniqueSelectorOptions {
            preferred_class_pattern: Some(JsRegExp::new("test--.+", "g").unwrap()),
            ..Default::default()
        };
        assert!(matches!(UniqueSelector::new(options), Err(BrowserError::InvalidOptions(_))));
    }

    #[test]
    fn test_options_wire_names() {
        let json = r#"{
            "ignoredClasses": ["active"],
            "preferredClass": "/test--[^ ]+/",
            "useClosestParentWithPreferredClass": true,
            "preferredClassParentLimit": 2
        }"#;
        let options: UniqueSelectorOptions = serde_json::from_str(json).unwrap();

        assert!(options.use_ids);
        assert_eq!(options.ignored_class_names, ["active"]);
        assert_eq!(options.preferred_class_ancestor_limit, 2);
        assert_eq!(options.preferred_class_pattern.unwrap().pattern(), "test--[^ ]+");
    }

    #[test]
    fn test_set_ignored_classes() {
        let mut selector = UniqueSelector::default();
        selector.set_ignored_classes(vec!["primary".into()]);
        assert_eq!(selector.options().ignored_class_names, ["primary"]);
    }
}
