use crate::codec::JsRegExp;
use crate::dom::Document;
use crate::error::Result;
use crate::selector::element::{class_tokens, SelectorElement, SelectorKind};

/// Ancestor chain of selector candidates, outermost first
///
/// Ambiguity is the number of document matches of the rendered path; the
/// passes below only ever keep changes that preserve or reduce it.
pub struct SelectorElementList<'a> {
    document: &'a dyn Document,
    preferred_class: Option<&'a JsRegExp>,
    elements: Vec<SelectorElement>,
}

impl<'a> SelectorElementList<'a> {
    pub fn new(document: &'a dyn Document, preferred_class: Option<&'a JsRegExp>) -> Self {
        Self { document, preferred_class, elements: Vec::new() }
    }

    /// Prepend a candidate; the chain is built target first
    pub fn add_element(&mut self, element: SelectorElement) {
        self.elements.insert(0, element);
    }

    pub fn elements(&self) -> &[SelectorElement] {
        &self.elements
    }

    /// Active fragments joined by `" > "`; a gap of inactive candidates
    /// between two active ones becomes a descendant combinator
    pub fn selector_path(&self) -> String {
        let mut path = String::new();
        let mut previous_active: Option<usize> = None;

        for (index, element) in self.elements.iter().enumerate() {
            let Some(fragment) = element.selector() else {
                continue;
            };

            if let Some(previous) = previous_active {
                path.push_str(if index == previous + 1 { " > " } else { " " });
            }
            path.push_str(&fragment);
            previous_active = Some(index);
        }

        path
    }

    pub fn ambiguity(&self) -> Result<usize> {
        let path = self.selector_path();
        if path.is_empty() {
            return Ok(0);
        }
        Ok(self.document.query_selector_all(&path)?.len())
    }

    pub fn is_unique(&self) -> Result<bool> {
        Ok(self.ambiguity()? == 1)
    }

    fn is_protected(&self, element: &SelectorElement, protect_preferred: bool) -> bool {
        if !protect_preferred || element.kind() != SelectorKind::Class {
            return false;
        }
        match (self.preferred_class, element.selector()) {
            (Some(preferred), Some(selector)) => preferred.is_match(&selector),
            _ => false,
        }
    }

    /// Drop outer candidates that do not change the ambiguity; the target itself always stays
    pub fn simplify(&mut self, protect_preferred: bool) -> Result<()> {
        let ambiguity = self.ambiguity()?;

        for i in 0..self.elements.len().saturating_sub(1) {
            if !self.elements[i].is_active()
                || self.is_protected(&self.elements[i], protect_preferred)
            {
                continue;
            }

            self.elements[i].set_active(false);

            if self.ambiguity()? != ambiguity {
                self.elements[i].set_active(true);
            }
        }

        Ok(())
    }

    /// Add `:nth-child` suffixes from the target outwards while they reduce ambiguity
    pub fn uniqueify(&mut self) -> Result<()> {
        let mut ambiguity = self.ambiguity()?;

        for i in (0..self.elements.len()).rev() {
            let was_active = self.elements[i].is_active();

            self.elements[i].set_active(true);
            self.elements[i].set_use_nth_child(true);

            let new_ambiguity = self.ambiguity()?;

            if new_ambiguity < ambiguity {
                ambiguity = new_ambiguity;

                if ambiguity == 1 {
                    break;
                }
            } else {
                self.elements[i].set_use_nth_child(false);
                self.elements[i].set_active(was_active);
            }
        }

        Ok(())
    }

    /// Drop trailing class tokens of multi-class candidates while the path stays unique
    pub fn simplify_classes(&mut self, protect_preferred: bool) -> Result<()> {
        for i in 0..self.elements.len() {
            if !self.elements[i].is_active() || self.elements[i].kind() != SelectorKind::Class {
                continue;
            }

            let Some(original) = self.elements[i].raw_selector().map(str::to_string) else {
                continue;
            };
            let tokens = class_tokens(&original);
            if tokens.len() < 2 {
                continue;
            }

            let mut enabled = vec![true; tokens.len()];

            for token_index in (0..tokens.len()).rev() {
                let protected = protect_preferred
                    && self
                        .preferred_class
                        .is_some_and(|preferred| preferred.is_match(&tokens[token_index]));
                if protected {
                    continue;
                }

                enabled[token_index] = false;
                let candidate = join_enabled(&tokens, &enabled);
                self.elements[i].set_raw_selector(candidate.clone());

                if candidate.is_empty() || self.ambiguity()? > 1 {
                    enabled[token_index] = true;
                }
            }

            self.elements[i].set_raw_selector(join_enabled(&tokens, &enabled));
        }

        Ok(())
    }
}

fn join_enabled(tokens: &[String], enabled: &[bool]) -> String {
    tokens
        .iter()
        .zip(enabled)
        .filter(|(_, on)| **on)
        .map(|(token, _)| token.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, ElementNode, MemoryDocument, NodeId};
    use crate::selector::UniqueSelectorOptions;

    fn chain<'a>(
        doc: &'a MemoryDocument,
        target: NodeId,
        options: &'a UniqueSelectorOptions,
    ) -> SelectorElementList<'a> {
        let mut list = SelectorElementList::new(doc, options.preferred_class_pattern.as_ref());
        let mut current = Some(target);
        while let Some(node) = current {
            let info = doc.element(node).unwrap();
            if info.is_body() {
                break;
            }
            list.add_element(SelectorElement::new(node, &info, options).unwrap());
            current = info.parent;
        }
        list
    }

    fn page() -> MemoryDocument {
        MemoryDocument::new(ElementNode::new("body").with_children(vec![
            ElementNode::new("div").with_class("wrap").with_child(
                ElementNode::new("ul").with_children(vec![
                    ElementNode::new("li").with_class("item first"),
                    ElementNode::new("li").with_class("item"),
                ]),
            ),
            ElementNode::new("div").with_class("wrap other").with_child(
                ElementNode::new("ul").with_child(ElementNode::new("li").with_class("item")),
            ),
        ]))
    }

    #[test]
    fn test_full_path_rendering() {
        let doc = page();
        let options = UniqueSelectorOptions::default();
        let target = doc.query_selector_all(".item").unwrap()[1];
        let list = chain(&doc, target, &options);

        assert_eq!(list.selector_path(), ".wrap > ul > .item");
        assert_eq!(list.ambiguity().unwrap(), 3);
    }

    #[test]
    fn test_gap_renders_as_descendant() {
        let doc = page();
        let options = UniqueSelectorOptions::default();
        let target = doc.query_selector_all(".item").unwrap()[1];
        let mut list = chain(&doc, target, &options);

        list.elements[1].set_active(false);
        assert_eq!(list.selector_path(), ".wrap .item");

        list.elements[0].set_active(false);
        assert_eq!(list.selector_path(), ".item");

        list.elements[2].set_active(false);
        assert_eq!(list.selector_path(), "");
        assert_eq!(list.ambiguity().unwrap(), 0);
    }

    #[test]
    fn test_simplify_keeps_ambiguity() {
        let doc = page();
        let options = UniqueSelectorOptions::default();
        let target = doc.query_selector_all(".item").unwrap()[1];
        let mut list = chain(&doc, target, &options);

        list.simplify(true).unwrap();
        assert_eq!(list.selector_path(), ".item");
        assert_eq!(list.ambiguity().unwrap(), 3);
    }

    #[test]
    fn test_uniqueify_never_increases_ambiguity() {
        let doc = page();
        let options = UniqueSelectorOptions::default();
        let target = doc.query_selector_all(".item").unwrap()[1];
        let mut list = chain(&doc, target, &options);

        list.simplify(true).unwrap();
        let before = list.ambiguity().unwrap();
        list.uniqueify().unwrap();
        let after = list.ambiguity().unwrap();

        assert!(after <= before);
        assert_eq!(after, 1);
        assert_eq!(list.selector_path(), ".item:nth-child(2)");
        assert_eq!(doc.query_selector_all(&list.selector_path()).unwrap(), vec![target]);
    }

    #[test]
    fn test_simplify_classes_drops_trailing_tokens() {
        let doc = page();
        let options = UniqueSelectorOptions::default();
        let target = doc.query_selector_all(".first").unwrap()[0];
        let mut list = chain(&doc, target, &options);

        list.simplify(true).unwrap();
        list.uniqueify().unwrap();
        assert_eq!(list.selector_path(), ".item.first");

        list.simplify_classes(false).unwrap();
        assert_eq!(list.selector_path(), ".first");
        assert!(list.is_unique().unwrap());
    }
}
