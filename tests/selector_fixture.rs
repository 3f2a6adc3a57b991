use browser_puppeteer::dom::MemoryDocument;
use browser_puppeteer::{Document, JsRegExp, NodeId, UniqueSelector, UniqueSelectorOptions};

const FIXTURE: &str = r#"{
  "tag_name": "html",
  "children": [{
    "tag_name": "body",
    "children": [
      {"tag_name": "header", "attributes": {"class": "top active"}, "children": [
        {"tag_name": "a", "attributes": {"class": "logo", "href": "/"}},
        {"tag_name": "nav", "children": [
          {"tag_name": "a", "attributes": {"class": "link active"}},
          {"tag_name": "a", "attributes": {"class": "link"}},
          {"tag_name": "a", "attributes": {"class": "link"}}
        ]}
      ]},
      {"tag_name": "main", "attributes": {"id": "content"}, "children": [
        {"tag_name": "ul", "attributes": {"class": "items"}, "children": [
          {"tag_name": "li", "attributes": {"class": "item test--first"}, "children": [
            {"tag_name": "span", "attributes": {"class": "label"}}
          ]},
          {"tag_name": "li", "attributes": {"class": "item"}, "children": [
            {"tag_name": "span", "attributes": {"class": "label"}}
          ]},
          {"tag_name": "li", "attributes": {"class": "item"}, "children": [
            {"tag_name": "span", "attributes": {"class": "label"}}
          ]}
        ]}
      ]},
      {"tag_name": "footer", "children": [
        {"tag_name": "ul", "attributes": {"class": "items"}, "children": [
          {"tag_name": "li", "attributes": {"class": "item"}},
          {"tag_name": "li", "attributes": {"class": "item"}}
        ]},
        {"tag_name": "p"}
      ]}
    ]
  }]
}"#;

fn fixture() -> MemoryDocument {
    MemoryDocument::from_json(FIXTURE).expect("fixture should parse")
}

fn elements(doc: &MemoryDocument) -> Vec<NodeId> {
    doc.query_selector_all("body *").expect("query should succeed")
}

fn assert_selects_only(doc: &MemoryDocument, selector: &str, node: NodeId) {
    let matches = doc.query_selector_all(selector).expect("generated selector should parse");
    assert_eq!(matches, vec![node], "selector {:?} should match exactly one element", selector);
}

#[test]
fn test_every_element_gets_a_unique_selector() {
    let doc = fixture();
    let selector = UniqueSelector::default();

    for node in elements(&doc) {
        let unique = selector.get(&doc, node).expect("selector should be generated");
        assert_selects_only(&doc, &unique, node);
    }
}

#[test]
fn test_selectors_are_stable() {
    let doc = fixture();
    let selector = UniqueSelector::default();

    for node in elements(&doc) {
        assert_eq!(selector.get(&doc, node).unwrap(), selector.get(&doc, node).unwrap());
    }
}

#[test]
fn test_id_is_used_when_allowed() {
    let doc = fixture();
    let main = doc.find_by_id("content").unwrap();

    assert_eq!(UniqueSelector::default().get(&doc, main).unwrap(), "#content");

    let options = UniqueSelectorOptions { use_ids: false, ..Default::default() };
    let without_ids = UniqueSelector::new(options).unwrap();
    for node in elements(&doc) {
        let unique = without_ids.get(&doc, node).unwrap();
        assert!(!unique.contains('#'), "{:?} uses an id", unique);
        assert_selects_only(&doc, &unique, node);
    }
}

#[test]
fn test_ignored_classes_never_appear() {
    let doc = fixture();
    let selector = UniqueSelector::new(UniqueSelectorOptions {
        ignored_class_names: vec!["ACTIVE".to_string()],
        ..Default::default()
    })
    .unwrap();

    for node in elements(&doc) {
        let unique = selector.get(&doc, node).unwrap();
        assert!(!unique.contains("active"), "{:?} uses an ignored class", unique);
        assert_selects_only(&doc, &unique, node);
    }
}

#[test]
fn test_preferred_class_is_kept() {
    let doc = fixture();
    let selector = UniqueSelector::new(UniqueSelectorOptions {
        preferred_class_pattern: Some(JsRegExp::new("test--[^ ]+", "").unwrap()),
        ..Default::default()
    })
    .unwrap();

    let first_item = doc.query_selector_all(".test--first").unwrap()[0];
    let unique = selector.get(&doc, first_item).unwrap();
    assert!(unique.contains("test--first"), "{:?} dropped the preferred class", unique);
    assert_selects_only(&doc, &unique, first_item);
}

#[test]
fn test_closest_ancestor_with_preferred_class() {
    let doc = fixture();
    let selector = UniqueSelector::new(UniqueSelectorOptions {
        use_ids: false,
        preferred_class_pattern: Some(JsRegExp::new("test--[^ ]+", "").unwrap()),
        use_closest_ancestor_with_preferred_class: true,
        preferred_class_ancestor_limit: 5,
        ..Default::default()
    })
    .unwrap();

    let first_item = doc.query_selector_all(".test--first").unwrap()[0];
    let label = doc.query_selector_all(".test--first .label").unwrap()[0];

    let unique = selector.get(&doc, label).unwrap();
    assert_selects_only(&doc, &unique, first_item);
}

const LIST_PAGE: &str = r#"{
  "tag_name": "html",
  "children": [{
    "tag_name": "body",
    "children": [
      {"tag_name": "ul", "children": [
        {"tag_name": "li"},
        {"tag_name": "li", "attributes": {"data-test": "1"}},
        {"tag_name": "li", "attributes": {"id": "li3", "data-test": "2"}, "children": [
          {"tag_name": "span", "attributes": {"class": "class2", "data-test": "3"}}
        ]}
      ]},
      {"tag_name": "div", "attributes": {"class": "class1"}, "children": [
        {"tag_name": "div"},
        {"tag_name": "div", "attributes": {"class": "class1", "data-test": "4"}}
      ]},
      {"tag_name": "form", "children": [
        {"tag_name": "input", "attributes": {"name": "user", "data-test": "5"}},
        {"tag_name": "a", "attributes": {"href": "/signup"}}
      ]},
      {"tag_name": "span", "children": [
        {"tag_name": "a", "attributes": {"href": "/help", "data-test": "6"}}
      ]}
    ]
  }]
}"#;

#[test]
fn test_exact_selectors_for_list_page() {
    let doc = MemoryDocument::from_json(LIST_PAGE).expect("fixture should parse");
    let selector = UniqueSelector::default();

    let generated: Vec<String> = (1..=6)
        .map(|n| {
            let node = doc.query_selector_all(&format!("[data-test=\"{}\"]", n)).unwrap()[0];
            selector.get(&doc, node).unwrap()
        })
        .collect();

    assert_eq!(
        generated,
        [
            "li:nth-child(2)",
            "#li3",
            ".class2",
            ".class1 > .class1",
            "input[name=\"user\"]",
            "span > a",
        ]
    );
}

#[test]
fn test_body_has_no_selector() {
    let doc = MemoryDocument::from_json(LIST_PAGE).expect("fixture should parse");
    let body = doc.query_selector_all("body").unwrap()[0];

    let unique = UniqueSelector::default().get(&doc, body).unwrap();
    assert_eq!(unique, "");
    assert_eq!(UniqueSelector::default().full_selector_path(&doc, body).unwrap(), "");
}
