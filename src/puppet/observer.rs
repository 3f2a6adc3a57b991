use crate::dom::Document;
use crate::error::Result;
use log::error;

#[derive(Debug)]
struct ObservedSelector {
    selector: String,
    /// `None` until the first pass
    was_visible: Option<bool>,
}

/// Tracks the visibility of a set of selectors across DOM mutations
///
/// A selector counts as visible when any of its matches is displayed. Only
/// hidden-to-visible transitions after the first pass are reported.
#[derive(Debug)]
pub struct SelectorObserver {
    observed: Vec<ObservedSelector>,
}

impl SelectorObserver {
    /// Start observing; records the starting visibility of every selector
    pub fn new(document: &dyn Document, selectors: Vec<String>) -> Self {
        let mut observer = Self {
            observed: selectors
                .into_iter()
                .map(|selector| ObservedSelector { selector, was_visible: None })
                .collect(),
        };
        observer.check(document);
        observer
    }

    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        self.observed.iter().map(|o| o.selector.as_str())
    }

    /// Re-evaluate after a mutation; returns the selectors that just became visible
    pub fn check(&mut self, document: &dyn Document) -> Vec<String> {
        let mut became_visible = Vec::new();

        for observed in &mut self.observed {
            let is_visible = match any_displayed(document, &observed.selector) {
                Ok(visible) => visible,
                Err(e) => {
                    error!("selector observer: {}: {}", observed.selector, e);
                    false
                }
            };

            if observed.was_visible == Some(false) && is_visible {
                became_visible.push(observed.selector.clone());
            }
            observed.was_visible = Some(is_visible);
        }

        became_visible
    }
}

fn any_displayed(document: &dyn Document, selector: &str) -> Result<bool> {
    for node in document.query_selector_all(selector)? {
        if document.is_displayed(node)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ElementNode, MemoryDocument};

    fn page() -> MemoryDocument {
        MemoryDocument::new(ElementNode::new("body").with_children(vec![
            ElementNode::new("div").with_class("toast").with_visibility(false),
            ElementNode::new("div").with_class("banner"),
        ]))
    }

    #[test]
    fn test_first_pass_reports_nothing() {
        let doc = page();
        let mut observer = SelectorObserver::new(&doc, vec![".toast".into(), ".banner".into()]);
        assert!(observer.check(&doc).is_empty());
        assert_eq!(observer.selectors().collect::<Vec<_>>(), [".toast", ".banner"]);
    }

    #[test]
    fn test_reports_hidden_to_visible_once() {
        let doc = page();
        let toast = doc.query_selector_all(".toast").unwrap()[0];
        let mut observer = SelectorObserver::new(&doc, vec![".toast".into()]);

        doc.set_visible(toast, true).unwrap();
        assert_eq!(observer.check(&doc), [".toast"]);
        assert!(observer.check(&doc).is_empty());

        doc.set_visible(toast, false).unwrap();
        assert!(observer.check(&doc).is_empty());
        doc.set_visible(toast, true).unwrap();
        assert_eq!(observer.check(&doc), [".toast"]);
    }

    #[test]
    fn test_new_matches_count() {
        let doc = page();
        let mut observer = SelectorObserver::new(&doc, vec![".modal".into()]);

        doc.append(doc.root(), ElementNode::new("div").with_class("modal")).unwrap();
        assert_eq!(observer.check(&doc), [".modal"]);
    }

    #[test]
    fn test_invalid_selector_is_not_visible() {
        let doc = page();
        let mut observer = SelectorObserver::new(&doc, vec!["div[".into()]);
        assert!(observer.check(&doc).is_empty());
    }
}
