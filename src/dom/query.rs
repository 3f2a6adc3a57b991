//! Minimal CSS selector engine for [`DomTree`]
//!
//! Supported: type and universal selectors, `#id`, `.class`, `[attr]`,
//! `[attr="value"]` (quoted or bare), `:nth-child(n)`, the child (`>`) and
//! descendant (whitespace) combinators, and comma separated selector lists.

use crate::dom::tree::DomTree;
use crate::dom::NodeId;
use crate::error::{BrowserError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Simple {
    Tag(String),
    Id(String),
    Class(String),
    HasAttribute(String),
    AttributeEquals(String, String),
    NthChild(usize),
}

/// Compound selector plus its relation to the compound on its left
#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    combinator: Option<Combinator>,
    simples: Vec<Simple>,
}

/// Parsed selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    complexes: Vec<Vec<Part>>,
}

impl SelectorList {
    pub fn parse(selector: &str) -> Result<Self> {
        let mut parser = Parser { chars: selector.chars().collect(), pos: 0, source: selector };
        parser.selector_list()
    }

    pub fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        self.complexes.iter().any(|parts| match_part(tree, node, parts, parts.len() - 1))
    }

    /// Matching nodes in document order
    pub fn query_all(&self, tree: &DomTree) -> Vec<NodeId> {
        tree.document_order().into_iter().filter(|n| self.matches(tree, *n)).collect()
    }
}

fn match_part(tree: &DomTree, node: NodeId, parts: &[Part], index: usize) -> bool {
    let part = &parts[index];
    if !part.simples.iter().all(|s| match_simple(tree, node, s)) {
        return false;
    }

    match part.combinator {
        None => true,
        Some(Combinator::Child) => tree
            .parent(node)
            .is_some_and(|p| match_part(tree, p, parts, index - 1)),
        Some(Combinator::Descendant) => tree
            .ancestors(node)
            .any(|a| match_part(tree, a, parts, index - 1)),
    }
}

fn match_simple(tree: &DomTree, node: NodeId, simple: &Simple) -> bool {
    let Ok(element) = tree.node(node) else {
        return false;
    };

    match simple {
        Simple::Tag(tag) => element.tag_name.eq_ignore_ascii_case(tag),
        Simple::Id(id) => element.id() == id,
        Simple::Class(class) => element.has_class(class),
        Simple::HasAttribute(name) => element.attributes.contains_key(name),
        Simple::AttributeEquals(name, value) => element.attribute(name) == Some(value.as_str()),
        Simple::NthChild(n) => tree.sibling_index(node) == *n,
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> BrowserError {
        BrowserError::InvalidSelector(format!(
            "'{}': {} at offset {}",
            self.source, reason, self.pos
        ))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn selector_list(&mut self) -> Result<SelectorList> {
        let mut complexes = Vec::new();

        loop {
            self.skip_whitespace();
            complexes.push(self.complex()?);
            self.skip_whitespace();

            match self.peek() {
                Some(',') => self.pos += 1,
                None => break,
                Some(_) => return Err(self.error("unexpected character")),
            }
        }

        Ok(SelectorList { complexes })
    }

    fn complex(&mut self) -> Result<Vec<Part>> {
        let mut parts = vec![Part { combinator: None, simples: self.compound()? }];

        loop {
            let had_space = self.skip_whitespace();
            let combinator = match self.peek() {
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some(',') | None => break,
                Some(_) if had_space => Combinator::Descendant,
                Some(_) => return Err(self.error("unexpected character")),
            };

            parts.push(Part { combinator: Some(combinator), simples: self.compound()? });
        }

        Ok(parts)
    }

    fn compound(&mut self) -> Result<Vec<Simple>> {
        let mut simples = Vec::new();
        let mut universal = false;

        // `*` matches anything and adds no constraint
        if self.peek() == Some('*') {
            self.pos += 1;
            universal = true;
        } else if self.peek().is_some_and(is_ident_char) {
            simples.push(Simple::Tag(self.ident()?));
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    simples.push(Simple::Id(self.ident()?));
                }
                Some('.') => {
                    self.pos += 1;
                    simples.push(Simple::Class(self.ident()?));
                }
                Some('[') => {
                    self.pos += 1;
                    simples.push(self.attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    simples.push(self.pseudo()?);
                }
                _ => break,
            }
        }

        if simples.is_empty() && !universal {
            return Err(self.error("expected a selector"));
        }

        Ok(simples)
    }

    fn ident(&mut self) -> Result<String> {
        let mut ident = String::new();

        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                ident.push(escaped);
                self.pos += 1;
            } else if is_ident_char(c) {
                ident.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }

        if ident.is_empty() {
            return Err(self.error("expected an identifier"));
        }
        Ok(ident)
    }

    fn attribute(&mut self) -> Result<Simple> {
        self.skip_whitespace();
        let name = self.ident()?;
        self.skip_whitespace();

        let simple = if self.peek() == Some('=') {
            self.pos += 1;
            self.skip_whitespace();
            let value = match self.peek() {
                Some(quote @ ('"' | '\'')) => {
                    self.pos += 1;
                    let mut value = String::new();
                    loop {
                        match self.peek() {
                            Some(c) if c == quote => {
                                self.pos += 1;
                                break;
                            }
                            Some('\\') => {
                                self.pos += 1;
                                let escaped =
                                    self.peek().ok_or_else(|| self.error("dangling escape"))?;
                                value.push(escaped);
                                self.pos += 1;
                            }
                            Some(c) => {
                                value.push(c);
                                self.pos += 1;
                            }
                            None => return Err(self.error("unterminated string")),
                        }
                    }
                    value
                }
                _ => self.ident()?,
            };
            Simple::AttributeEquals(name, value)
        } else {
            Simple::HasAttribute(name)
        };

        self.skip_whitespace();
        self.expect(']')?;
        Ok(simple)
    }

    fn pseudo(&mut self) -> Result<Simple> {
        let name = self.ident()?;
        if name != "nth-child" {
            return Err(self.error(&format!("unsupported pseudo-class ':{}'", name)));
        }

        self.expect('(')?;
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        let n = digits.parse::<usize>().map_err(|_| self.error("expected a number"))?;
        self.skip_whitespace();
        self.expect(')')?;

        Ok(Simple::NthChild(n))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}
