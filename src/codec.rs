//! Structured message codec
//!
//! Protocol messages travel as JSON text. Two non-JSON value kinds are carried
//! as strings and revived on the receiving side:
//! - functions, as their source text (`function (a, b) { ... }` or
//!   `function name(a) { ... }`; arrow syntax is not recognised)
//! - regular expressions, as `/pattern/flags`
//!
//! Typed message fields use [`JsFunction`] and [`JsRegExp`] directly. Untyped
//! payloads (function arguments, ack results) use [`Jsonf`], which revives any
//! function- or regex-shaped string it finds. A string that looks like one of
//! them but fails to parse is kept as a plain string.

use crate::error::{BrowserError, Result};
use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use std::sync::LazyLock;

static FUNCTION_HEAD: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"^function(\s+[A-Za-z0-9_$]+)?\s*\(").expect("valid function head regex")
    });
static FUNCTION_PARAMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]*)\)").expect("valid function params regex"));
static FUNCTION_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{(.*)\}").expect("valid function body regex"));
static REGEXP_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^/(.+)/([gimsuy]*)$").expect("valid regexp shape regex"));

/// Serialize a message to its wire text
pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Parse wire text into a typed message
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}

/// Peek at the `type` tag of a raw message without decoding the rest
pub fn message_type(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    value.get("type")?.as_str().map(str::to_string)
}

/// Function value carried by its source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsFunction {
    source: String,
    params: Vec<String>,
    body: String,
}

impl JsFunction {
    /// Parse a `function (...) {...}` literal
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();

        if !Self::looks_like_function(source) {
            return Err(BrowserError::Protocol(format!(
                "not a function literal: {}",
                truncate(source, 80)
            )));
        }

        let params = FUNCTION_PARAMS
            .captures(source)
            .and_then(|c| c.get(1))
            .ok_or_else(|| {
                BrowserError::Protocol("function literal without parameter list".to_string())
            })?
            .as_str()
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        let body = FUNCTION_BODY
            .captures(source)
            .and_then(|c| c.get(1))
            .ok_or_else(|| BrowserError::Protocol("function literal without body".to_string()))?
            .as_str()
            .to_string();

        Ok(Self { source: source.to_string(), params, body })
    }

    pub fn looks_like_function(s: &str) -> bool {
        FUNCTION_HEAD.is_match(s)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl fmt::Display for JsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for JsFunction {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for JsFunction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        JsFunction::parse(&source).map_err(de::Error::custom)
    }
}

/// Regular expression value in JavaScript `/pattern/flags` form
#[derive(Debug, Clone)]
pub struct JsRegExp {
    pattern: String,
    flags: String,
    regex: Regex,
}

impl JsRegExp {
    /// Compile a pattern with JavaScript flags (`g`, `i`, `m`, `s`, `u`, `y`)
    ///
    /// `u` is kept for round trips only, matching is always Unicode aware.
    /// `y` anchors matching at the start of the haystack, the way a fresh
    /// sticky regex with `lastIndex` 0 behaves.
    pub fn new(pattern: &str, flags: &str) -> Result<Self> {
        if let Some(bad) = flags.chars().find(|c| !"gimsuy".contains(*c)) {
            return Err(BrowserError::InvalidOptions(format!(
                "invalid regular expression flag '{}' in /{}/{}",
                bad, pattern, flags
            )));
        }

        let regex = RegexBuilder::new(pattern)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .build()?;

        Ok(Self { pattern: pattern.to_string(), flags: flags.to_string(), regex })
    }

    /// Parse the `/pattern/flags` text form
    pub fn parse(text: &str) -> Result<Self> {
        let captures = REGEXP_SHAPE
            .captures(text)
            .ok_or_else(|| {
                BrowserError::Protocol(format!("not a regular expression literal: {}", text))
            })?;
        let pattern = captures.get(1).map_or("", |m| m.as_str());
        let flags = captures.get(2).map_or("", |m| m.as_str());
        Self::new(pattern, flags)
    }

    pub fn looks_like_regexp(s: &str) -> bool {
        REGEXP_SHAPE.is_match(s)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }

    pub fn is_global(&self) -> bool {
        self.flags.contains('g')
    }

    pub fn is_sticky(&self) -> bool {
        self.flags.contains('y')
    }

    /// Same as JavaScript `RegExp.prototype.test` on a non-global regex
    pub fn is_match(&self, haystack: &str) -> bool {
        if self.is_sticky() {
            return self.regex.find(haystack).is_some_and(|m| m.start() == 0);
        }
        self.regex.is_match(haystack)
    }

    /// Every non-overlapping match, like repeated `exec` with the `g` flag
    ///
    /// Sticky matches must follow each other without a gap.
    pub fn find_all<'h>(&self, haystack: &'h str) -> Vec<&'h str> {
        let mut end = 0;
        self.regex
            .find_iter(haystack)
            .take_while(|m| {
                let adjacent = !self.is_sticky() || m.start() == end;
                end = m.end();
                adjacent
            })
            .map(|m| m.as_str())
            .collect()
    }
}

impl PartialEq for JsRegExp {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.flags == other.flags
    }
}

impl fmt::Display for JsRegExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.pattern, self.flags)
    }
}

impl Serialize for JsRegExp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for JsRegExp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        JsRegExp::parse(&text).map_err(de::Error::custom)
    }
}

/// JSON value extended with function and regular expression values
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Jsonf {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Jsonf>),
    Object(IndexMap<String, Jsonf>),
    Function(JsFunction),
    RegExp(JsRegExp),
}

impl Jsonf {
    /// Plain JSON form, functions and regexes as their text
    pub fn to_json(&self) -> Value {
        match self {
            Jsonf::Null => Value::Null,
            Jsonf::Bool(b) => Value::Bool(*b),
            Jsonf::Number(n) => Value::Number(n.clone()),
            Jsonf::String(s) => Value::String(s.clone()),
            Jsonf::Array(items) => Value::Array(items.iter().map(Jsonf::to_json).collect()),
            Jsonf::Object(map) => {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
            Jsonf::Function(f) => Value::String(f.source().to_string()),
            Jsonf::RegExp(r) => Value::String(r.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Jsonf::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Jsonf::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Jsonf::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Jsonf::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&JsFunction> {
        match self {
            Jsonf::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_regexp(&self) -> Option<&JsRegExp> {
        match self {
            Jsonf::RegExp(r) => Some(r),
            _ => None,
        }
    }

    /// Object member or array element lookup
    pub fn get(&self, key: &str) -> Option<&Jsonf> {
        match self {
            Jsonf::Object(map) => map.get(key),
            Jsonf::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    fn revive_string(s: String) -> Jsonf {
        if JsFunction::looks_like_function(&s) {
            return match JsFunction::parse(&s) {
                Ok(f) => Jsonf::Function(f),
                Err(e) => {
                    log::error!("JSONF error, keeping string {:?}: {}", truncate(&s, 80), e);
                    Jsonf::String(s)
                }
            };
        }

        if JsRegExp::looks_like_regexp(&s) {
            return match JsRegExp::parse(&s) {
                Ok(r) => Jsonf::RegExp(r),
                Err(e) => {
                    log::error!("JSONF error, keeping string {:?}: {}", truncate(&s, 80), e);
                    Jsonf::String(s)
                }
            };
        }

        Jsonf::String(s)
    }
}

impl From<Value> for Jsonf {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Jsonf::Null,
            Value::Bool(b) => Jsonf::Bool(b),
            Value::Number(n) => Jsonf::Number(n),
            Value::String(s) => Jsonf::revive_string(s),
            Value::Array(items) => Jsonf::Array(items.into_iter().map(Jsonf::from).collect()),
            Value::Object(map) => {
                Jsonf::Object(map.into_iter().map(|(k, v)| (k, Jsonf::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Jsonf {
    fn from(b: bool) -> Self {
        Jsonf::Bool(b)
    }
}

impl From<&str> for Jsonf {
    fn from(s: &str) -> Self {
        Jsonf::String(s.to_string())
    }
}

impl From<String> for Jsonf {
    fn from(s: String) -> Self {
        Jsonf::String(s)
    }
}

impl From<JsFunction> for Jsonf {
    fn from(f: JsFunction) -> Self {
        Jsonf::Function(f)
    }
}

impl From<JsRegExp> for Jsonf {
    fn from(r: JsRegExp) -> Self {
        Jsonf::RegExp(r)
    }
}

impl Serialize for Jsonf {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Jsonf {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Jsonf::from)
    }
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let head: String = s.chars().take(max_chars).collect();
        format!("{} [...]", head)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json_passes_through() {
        let value = json!({"a": [1, 2, 3], "c": {"d": 5}, "s": "text", "n": null});
        let encoded = encode(&Jsonf::from(value.clone())).unwrap();
        let decoded: Jsonf = decode(&encoded).unwrap();
        assert_eq!(decoded.to_json(), value);
    }

    #[test]
    fn test_function_revival() {
        let raw = json!({
            "a": [1, 2, 3, "function (a,b) {\n/*  */\nreturn a*b\n}"],
            "b": "function(a){return a*a}",
            "e": "function named(x) { return x + '\\r\\n'; }",
            "f": "function(){}"
        })
        .to_string();

        let parsed: Jsonf = decode(&raw).unwrap();

        assert_eq!(parsed.get("a").and_then(|a| a.get("1")).and_then(Jsonf::as_f64), Some(2.0));

        let mul = parsed.get("a").and_then(|a| a.get("3")).and_then(Jsonf::as_function).unwrap();
        assert_eq!(mul.params(), ["a", "b"]);
        assert!(mul.body().contains("return a*b"));

        let square = parsed.get("b").and_then(Jsonf::as_function).unwrap();
        assert_eq!(square.params(), ["a"]);
        assert_eq!(square.body(), "return a*a");

        let named = parsed.get("e").and_then(Jsonf::as_function).unwrap();
        assert_eq!(named.params(), ["x"]);

        let empty = parsed.get("f").and_then(Jsonf::as_function).unwrap();
        assert!(empty.params().is_empty());
        assert_eq!(empty.body(), "");
    }

    #[test]
    fn test_function_round_trip_keeps_source() {
        let f = JsFunction::parse("function (x, y) { return x + y; }").unwrap();
        let encoded = encode(&Jsonf::Array(vec![Jsonf::Function(f.clone())])).unwrap();
        let decoded: Jsonf = decode(&encoded).unwrap();
        assert_eq!(decoded.get("0").and_then(Jsonf::as_function), Some(&f));
    }

    #[test]
    fn test_arrow_functions_are_plain_strings() {
        let parsed: Jsonf = decode(r#"{"f": "(a) => a * 2"}"#).unwrap();
        assert_eq!(parsed.get("f").and_then(Jsonf::as_str), Some("(a) => a * 2"));
    }

    #[test]
    fn test_regexp_round_trip() {
        let original = JsRegExp::new("^[a-z]+ latenc(y|ies)$", "gi").unwrap();
        let encoded = encode(&Jsonf::RegExp(original.clone())).unwrap();
        assert_eq!(encoded, r#""/^[a-z]+ latenc(y|ies)$/gi""#);

        let decoded: Jsonf = decode(&encoded).unwrap();
        let regex = decoded.as_regexp().unwrap();
        assert_eq!(regex.pattern(), "^[a-z]+ latenc(y|ies)$");
        assert_eq!(regex.flags(), "gi");
        assert!(regex.is_match("Network Latency"));
        assert!(regex.is_global());
    }

    #[test]
    fn test_malformed_values_pass_through() {
        // regex-shaped but not a valid pattern
        let parsed: Jsonf = decode(r#"{"r": "/a(b/", "f": "function (a {"}"#).unwrap();
        assert_eq!(parsed.get("r").and_then(Jsonf::as_str), Some("/a(b/"));
        assert_eq!(parsed.get("f").and_then(Jsonf::as_str), Some("function (a {"));
    }

    #[test]
    fn test_typed_regexp_field_rejects_garbage() {
        #[derive(Deserialize)]
        struct Holder {
            #[allow(dead_code)]
            re: JsRegExp,
        }
        assert!(decode::<Holder>(r#"{"re": "not a regex"}"#).is_err());
        assert!(decode::<Holder>(r#"{"re": "/x/q"}"#).is_err());
    }

    #[test]
    fn test_find_all() {
        let re = JsRegExp::new("test--[^ ]+", "").unwrap();
        assert_eq!(re.find_all("a test--one b test--two"), vec!["test--one", "test--two"]);
    }

    #[test]
    fn test_sticky_flag_anchors_matching() {
        let sticky = JsRegExp::new("ab", "y").unwrap();
        assert!(sticky.is_sticky());
        assert!(sticky.is_match("abc"));
        assert!(!sticky.is_match("cab"));
        assert_eq!(sticky.find_all("ababxab"), vec!["ab", "ab"]);

        let plain = JsRegExp::new("ab", "").unwrap();
        assert!(plain.is_match("cab"));
        assert_eq!(plain.find_all("ababxab"), vec!["ab", "ab", "ab"]);
    }

    #[test]
    fn test_unicode_flag_round_trips() {
        let decoded: Jsonf = decode(r#""/café/uy""#).unwrap();
        let regex = decoded.as_regexp().unwrap();
        assert_eq!(regex.flags(), "uy");
        assert!(regex.is_match("café au lait"));
        assert_eq!(encode(&decoded).unwrap(), r#""/café/uy""#);
    }

    #[test]
    fn test_message_type() {
        assert_eq!(message_type(r#"{"type":"ack"}"#), Some("ack".to_string()));
        assert_eq!(message_type("{}"), None);
        assert_eq!(message_type("not json"), None);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc [...]");
    }
}
