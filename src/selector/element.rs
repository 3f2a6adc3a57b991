use crate::dom::{ElementInfo, NodeId};
use crate::error::{BrowserError, Result};
use crate::selector::UniqueSelectorOptions;

/// Which property of the node a candidate selects on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorKind {
    Id,
    Class,
    Attribute,
    Tag,
}

/// Selector candidate for one node of the ancestor chain
///
/// ```text
/// .class1 .class2.red span [name="user"]
/// |-----| |---------| |--| |-----------|
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorElement {
    node: NodeId,
    kind: SelectorKind,
    raw_selector: String,
    active: bool,
    use_nth_child: bool,
    nth_child: usize,
}

impl SelectorElement {
    pub fn new(node: NodeId, info: &ElementInfo, options: &UniqueSelectorOptions) -> Result<Self> {
        let (raw_selector, kind) = node_selector(info, options)?;

        Ok(Self {
            node,
            kind,
            raw_selector,
            active: true,
            use_nth_child: false,
            nth_child: info.sibling_index,
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn kind(&self) -> SelectorKind {
        self.kind
    }

    /// Fragment without the positional suffix; `None` while inactive
    pub fn raw_selector(&self) -> Option<&str> {
        self.active.then_some(self.raw_selector.as_str())
    }

    pub(crate) fn set_raw_selector(&mut self, raw_selector: String) {
        self.raw_selector = raw_selector;
    }

    /// Rendered fragment, `:nth-child(n)` included; `None` while inactive
    pub fn selector(&self) -> Option<String> {
        if !self.active {
            return None;
        }

        Some(if self.use_nth_child {
            format!("{}:nth-child({})", self.raw_selector, self.nth_child)
        } else {
            self.raw_selector.clone()
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn use_nth_child(&self) -> bool {
        self.use_nth_child
    }

    pub fn set_use_nth_child(&mut self, use_nth_child: bool) {
        self.use_nth_child = use_nth_child;
    }

    pub fn nth_child(&self) -> usize {
        self.nth_child
    }
}

fn node_selector(
    info: &ElementInfo,
    options: &UniqueSelectorOptions,
) -> Result<(String, SelectorKind)> {
    if info.tag_name.trim().is_empty() {
        return Err(BrowserError::InvalidNode("node has no tag name".to_string()));
    }

    let id = info.id.trim();
    if options.use_ids && !id.is_empty() {
        return Ok((format!("#{}", id), SelectorKind::Id));
    }

    let mut classes: Vec<String> = info
        .class_name
        .split_whitespace()
        .filter(|class| {
            !options
                .ignored_class_names
                .iter()
                .any(|ignored| ignored.eq_ignore_ascii_case(class))
        })
        .map(str::to_string)
        .collect();

    if let Some(preferred) = &options.preferred_class_pattern {
        let joined = classes.join(" ");
        if preferred.is_match(&joined) {
            classes = preferred
                .find_all(&joined)
                .into_iter()
                .flat_map(str::split_whitespace)
                .map(str::to_string)
                .collect();
        }
    }

    if !classes.is_empty() {
        return Ok((format!(".{}", classes.join(".")), SelectorKind::Class));
    }

    Ok(tag_fragment(info))
}

fn tag_fragment(info: &ElementInfo) -> (String, SelectorKind) {
    let tag = info.tag_name.to_lowercase();

    match info.attribute("name").map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => (format!("{}[name=\"{}\"]", tag, name), SelectorKind::Attribute),
        None => (tag, SelectorKind::Tag),
    }
}

/// Split `.a.b.c` into `[".a", ".b", ".c"]`
pub(crate) fn class_tokens(raw_selector: &str) -> Vec<String> {
    raw_selector
        .split('.')
        .filter(|s| !s.is_empty())
        .map(|s| format!(".{}", s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsRegExp;

    fn info(tag: &str, id: &str, class: &str) -> ElementInfo {
        ElementInfo {
            tag_name: tag.to_string(),
            id: id.to_string(),
            class_name: class.to_string(),
            sibling_index: 3,
            ..ElementInfo::default()
        }
    }

    fn selector_of(info: &ElementInfo, options: &UniqueSelectorOptions) -> (String, SelectorKind) {
        let element = SelectorElement::new(NodeId(1), info, options).unwrap();
        (element.selector().unwrap(), element.kind())
    }

    #[test]
    fn test_id_wins_when_enabled() {
        let options = UniqueSelectorOptions::default();
        assert_eq!(
            selector_of(&info("DIV", " main ", "a b"), &options),
            ("#main".to_string(), SelectorKind::Id)
        );

        let options = UniqueSelectorOptions { use_ids: false, ..UniqueSelectorOptions::default() };
        assert_eq!(
            selector_of(&info("DIV", "main", "a  b"), &options),
            (".a.b".to_string(), SelectorKind::Class)
        );
    }

    #[test]
    fn test_name_attribute_and_tag() {
        let options = UniqueSelectorOptions::default();
        let mut input = info("INPUT", "", "");
        input.attributes.insert("name".into(), "user".into());
        assert_eq!(
            selector_of(&input, &options),
            ("input[name=\"user\"]".to_string(), SelectorKind::Attribute)
        );
        assert_eq!(
            selector_of(&info("SPAN", "", "  "), &options),
            ("span".to_string(), SelectorKind::Tag)
        );
    }

    #[test]
    fn test_ignored_classes_case_insensitive() {
        let options = UniqueSelectorOptions {
            ignored_class_names: vec!["Active".into()],
            ..UniqueSelectorOptions::default()
        };
        assert_eq!(selector_of(&info("LI", "", "item active"), &options).0, ".item");
        assert_eq!(selector_of(&info("LI", "", "ACTIVE"), &options).0, "li");
    }

    #[test]
    fn test_preferred_class_replaces_list() {
        let options = UniqueSelectorOptions {
            preferred_class_pattern: Some(JsRegExp::new("test--[^ ]+", "").unwrap()),
            ..UniqueSelectorOptions::default()
        };
        let button = info("BUTTON", "", "btn test--save big test--x");
        assert_eq!(selector_of(&button, &options).0, ".test--save.test--x");
        assert_eq!(selector_of(&info("BUTTON", "", "btn big"), &options).0, ".btn.big");
    }

    #[test]
    fn test_nth_child_and_activation() {
        let options = UniqueSelectorOptions::default();
        let mut element = SelectorElement::new(NodeId(7), &info("LI", "", ""), &options).unwrap();
        element.set_use_nth_child(true);
        assert_eq!(element.selector().as_deref(), Some("li:nth-child(3)"));
        assert_eq!(element.raw_selector(), Some("li"));

        element.set_active(false);
        assert_eq!(element.selector(), None);
        assert_eq!(element.raw_selector(), None);
        assert_eq!(element.node(), NodeId(7));
    }

    #[test]
    fn test_invalid_node() {
        let options = UniqueSelectorOptions::default();
        let result = SelectorElement::new(NodeId(0), &info("", "", ""), &options);
        assert!(matches!(result, Err(BrowserError::InvalidNode(_))));
    }

    #[test]
    fn test_class_tokens() {
        assert_eq!(class_tokens(".a.b.c"), [".a", ".b", ".c"]);
        assert!(class_tokens("").is_empty());
    }
}
