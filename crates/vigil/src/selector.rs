//! Selector Resolver
//!
//! Parses structural selectors and resolves them against a [`DomSnapshot`].
//!
//! Supported grammar:
//!
//! ```text
//! selector   := complex ( "," complex )*
//! complex    := compound ( ( ">" | " " ) compound )*
//! compound   := ( "*" | tag )? ( "#" id | "." class | "[" attribute "]" )*
//! attribute  := name ( op value )?        op := = ^= $= *= ~= |=
//! ```
//!
//! An attribute value whose opening quote is never closed, at the very end of
//! the selector, is an *open prefix* match:
//! `button[data-test="create-endpoint` matches any button whose `data-test`
//! starts with `create-endpoint`. [`OpenValueMode::Reject`] turns that form
//! into an [`VigilError::InvalidSelector`] instead.
//!
//! Parsing is eager. Resolution never retries and never fails: it is a pure
//! function of the selector, the scope and the snapshot.

use crate::dom::{DomSnapshot, ElementHandle, ElementNode, NodeId};
use crate::result::{VigilError, VigilResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How to treat a quoted attribute value left open at the end of a selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenValueMode {
    /// Match attribute values starting with the open text
    #[default]
    Prefix,
    /// Reject as malformed
    Reject,
}

/// Attribute comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOperator {
    /// `[name]`
    Exists,
    /// `[name="v"]`
    Equals,
    /// `[name^="v"]`
    Prefix,
    /// `[name$="v"]`
    Suffix,
    /// `[name*="v"]`
    Substring,
    /// `[name~="v"]`
    Word,
    /// `[name|="v"]`
    DashMatch,
    /// `[name="v` with the quote and bracket never closed
    OpenPrefix,
}

impl AttrOperator {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Exists => "",
            Self::Equals | Self::OpenPrefix => "=",
            Self::Prefix => "^=",
            Self::Suffix => "$=",
            Self::Substring => "*=",
            Self::Word => "~=",
            Self::DashMatch => "|=",
        }
    }
}

/// One attribute condition of a compound selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrCondition {
    /// Lowercase attribute name
    pub name: String,
    /// Operator
    pub operator: AttrOperator,
    /// Comparison value, empty for [`AttrOperator::Exists`]
    pub value: String,
}

impl AttrCondition {
    fn matches(&self, node: &ElementNode) -> bool {
        let Some(actual) = node.attr(&self.name) else {
            return false;
        };
        let value = self.value.as_str();
        match self.operator {
            AttrOperator::Exists => true,
            AttrOperator::Equals => actual == value,
            AttrOperator::Prefix | AttrOperator::OpenPrefix => {
                !value.is_empty() && actual.starts_with(value)
            }
            AttrOperator::Suffix => !value.is_empty() && actual.ends_with(value),
            AttrOperator::Substring => !value.is_empty() && actual.contains(value),
            AttrOperator::Word => {
                !value.is_empty() && actual.split_ascii_whitespace().any(|word| word == value)
            }
            AttrOperator::DashMatch => {
                actual == value
                    || actual
                        .strip_prefix(value)
                        .is_some_and(|rest| rest.starts_with('-'))
            }
        }
    }
}

/// A sequence of simple selectors applying to one element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSelector {
    /// Lowercase tag name
    pub tag: Option<String>,
    /// `*` was written
    pub universal: bool,
    /// `#id`
    pub id: Option<String>,
    /// `.class` list
    pub classes: Vec<String>,
    /// Attribute conditions
    pub attrs: Vec<AttrCondition>,
}

impl CompoundSelector {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && !self.universal
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
    }

    fn matches(&self, node: &ElementNode) -> bool {
        if self.tag.as_deref().is_some_and(|tag| tag != node.tag) {
            return false;
        }
        if self
            .id
            .as_deref()
            .is_some_and(|id| node.element_id() != Some(id))
        {
            return false;
        }
        if !self
            .classes
            .iter()
            .all(|class| node.classes().any(|c| c == class))
        {
            return false;
        }
        self.attrs.iter().all(|attr| attr.matches(node))
    }
}

/// Relation between a compound and the one to its left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Whitespace
    Descendant,
    /// `>`
    Child,
}

/// Compounds joined by combinators, left to right
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    /// `(relation to previous, compound)`; the first relation is `None`
    pub parts: Vec<(Option<Combinator>, CompoundSelector)>,
}

impl ComplexSelector {
    fn matches(&self, node: &ElementNode, snapshot: &DomSnapshot) -> bool {
        self.parts
            .len()
            .checked_sub(1)
            .is_some_and(|last| self.matches_at(last, node, snapshot))
    }

    // Right-to-left with backtracking over ancestors for descendant combinators.
    fn matches_at(&self, index: usize, node: &ElementNode, snapshot: &DomSnapshot) -> bool {
        let (combinator, compound) = &self.parts[index];
        if !compound.matches(node) {
            return false;
        }
        let Some(combinator) = combinator else {
            return true;
        };
        let previous = index - 1;
        match combinator {
            Combinator::Child => snapshot
                .parent_of(node)
                .is_some_and(|parent| self.matches_at(previous, parent, snapshot)),
            Combinator::Descendant => {
                let mut ancestor = snapshot.parent_of(node);
                let mut remaining = snapshot.elements.len();
                while let Some(candidate) = ancestor {
                    if self.matches_at(previous, candidate, snapshot) {
                        return true;
                    }
                    if remaining == 0 {
                        break;
                    }
                    remaining -= 1;
                    ancestor = snapshot.parent_of(candidate);
                }
                false
            }
        }
    }
}

/// A parsed selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    groups: Vec<ComplexSelector>,
}

impl Selector {
    /// Parse with open quoted values treated as prefix matches.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::InvalidSelector`] when the selector is malformed.
    pub fn parse(source: &str) -> VigilResult<Self> {
        Self::parse_with(source, OpenValueMode::default())
    }

    /// Parse with an explicit open value mode.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::InvalidSelector`] when the selector is malformed.
    pub fn parse_with(source: &str, open_values: OpenValueMode) -> VigilResult<Self> {
        let groups = Parser::new(source, open_values).parse()?;
        Ok(Self {
            source: source.trim().to_string(),
            groups,
        })
    }

    /// Selector source text
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Comma separated alternatives
    #[must_use]
    pub fn groups(&self) -> &[ComplexSelector] {
        &self.groups
    }

    /// Whether any attribute condition is an open prefix
    #[must_use]
    pub fn uses_open_prefix(&self) -> bool {
        self.groups
            .iter()
            .flat_map(|group| &group.parts)
            .flat_map(|(_, compound)| &compound.attrs)
            .any(|attr| attr.operator == AttrOperator::OpenPrefix)
    }

    /// Whether `node` matches any alternative
    #[must_use]
    pub fn matches(&self, node: &ElementNode, snapshot: &DomSnapshot) -> bool {
        self.groups
            .iter()
            .any(|group| group.matches(node, snapshot))
    }

    /// Lazily select matching nodes in document order
    pub fn select<'s>(
        &'s self,
        scope: Scope<'s>,
        snapshot: &'s DomSnapshot,
    ) -> impl Iterator<Item = &'s ElementNode> + 's {
        snapshot
            .elements
            .iter()
            .filter(move |node| scope.contains(node, snapshot))
            .filter(move |node| self.matches(node, snapshot))
    }

    /// Canonical text form, with open prefixes written as `^=`
    #[must_use]
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        for (g, group) in self.groups.iter().enumerate() {
            if g > 0 {
                out.push_str(", ");
            }
            for (combinator, compound) in &group.parts {
                match combinator {
                    Some(Combinator::Child) => out.push_str(" > "),
                    Some(Combinator::Descendant) => out.push(' '),
                    None => {}
                }
                if compound.universal {
                    out.push('*');
                }
                if let Some(tag) = &compound.tag {
                    out.push_str(tag);
                }
                if let Some(id) = &compound.id {
                    out.push('#');
                    out.push_str(id);
                }
                for class in &compound.classes {
                    out.push('.');
                    out.push_str(class);
                }
                for attr in &compound.attrs {
                    let symbol = if attr.operator == AttrOperator::OpenPrefix {
                        "^="
                    } else {
                        attr.operator.symbol()
                    };
                    if attr.operator == AttrOperator::Exists {
                        out.push_str(&format!("[{}]", attr.name));
                    } else {
                        out.push_str(&format!("[{}{symbol}{:?}]", attr.name, attr.value));
                    }
                }
            }
        }
        out
    }
}

impl FromStr for Selector {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Where a lookup searches
#[derive(Debug, Clone, Copy, Default)]
pub enum Scope<'a> {
    /// The whole document
    #[default]
    Document,
    /// Descendants of the given elements
    Within(&'a [NodeId]),
}

impl Scope<'_> {
    fn contains(&self, node: &ElementNode, snapshot: &DomSnapshot) -> bool {
        match self {
            Self::Document => true,
            Self::Within(roots) => roots
                .iter()
                .any(|root| snapshot.is_descendant_of(node, *root)),
        }
    }
}

/// Resolve a selector to element handles in document order.
///
/// Deterministic for a fixed snapshot; an empty result is not an error.
#[must_use]
pub fn resolve(selector: &Selector, scope: Scope<'_>, snapshot: &DomSnapshot) -> Vec<ElementHandle> {
    selector
        .select(scope, snapshot)
        .map(ElementHandle::from)
        .collect()
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    source: &'a str,
    pos: usize,
    open_values: OpenValueMode,
}

impl<'a> Parser<'a> {
    const fn new(source: &'a str, open_values: OpenValueMode) -> Self {
        Self {
            source,
            pos: 0,
            open_values,
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
        self.pos > start
    }

    fn error(&self, message: impl fmt::Display) -> VigilError {
        VigilError::invalid_selector(self.source, format!("{message} at offset {}", self.pos))
    }

    fn parse(mut self) -> VigilResult<Vec<ComplexSelector>> {
        if self.source.trim().is_empty() {
            return Err(VigilError::invalid_selector(self.source, "empty selector"));
        }
        let mut groups = Vec::new();
        loop {
            let _ = self.skip_ws();
            groups.push(self.parse_complex()?);
            let _ = self.skip_ws();
            match self.bump() {
                None => break,
                Some(',') => {}
                Some(c) => return Err(self.error(format_args!("unexpected `{c}`"))),
            }
        }
        Ok(groups)
    }

    fn parse_complex(&mut self) -> VigilResult<ComplexSelector> {
        let mut parts = vec![(None, self.parse_compound()?)];
        loop {
            let had_ws = self.skip_ws();
            let combinator = match self.peek() {
                Some('>') => {
                    let _ = self.bump();
                    let _ = self.skip_ws();
                    Combinator::Child
                }
                Some(c) if had_ws && starts_compound(c) => Combinator::Descendant,
                _ => break,
            };
            parts.push((Some(combinator), self.parse_compound()?));
        }
        Ok(ComplexSelector { parts })
    }

    fn parse_compound(&mut self) -> VigilResult<CompoundSelector> {
        let mut compound = CompoundSelector::default();
        match self.peek() {
            Some('*') => {
                let _ = self.bump();
                compound.universal = true;
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some('#') => {
                    let _ = self.bump();
                    let id = self.ident()?;
                    if compound.id.replace(id).is_some() {
                        return Err(self.error("more than one id"));
                    }
                }
                Some('.') => {
                    let _ = self.bump();
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    let _ = self.bump();
                    compound.attrs.push(self.parse_attr()?);
                }
                Some(':') => {
                    let _ = self.bump();
                    let name = self.ident().unwrap_or_default();
                    return Err(self.error(format_args!("unsupported pseudo-class `:{name}`")));
                }
                _ => break,
            }
        }
        if compound.is_empty() {
            return Err(match self.peek() {
                Some(c) => self.error(format_args!("expected a selector, found `{c}`")),
                None => self.error("expected a selector"),
            });
        }
        Ok(compound)
    }

    fn ident(&mut self) -> VigilResult<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            let _ = self.bump();
        }
        if self.pos == start {
            return Err(self.error("expected an identifier"));
        }
        Ok(self.source[start..self.pos].to_string())
    }

    fn parse_attr(&mut self) -> VigilResult<AttrCondition> {
        let _ = self.skip_ws();
        let start = self.pos;
        while self.peek().is_some_and(|c| is_ident_char(c) || c == ':') {
            let _ = self.bump();
        }
        if self.pos == start {
            return Err(self.error("expected an attribute name"));
        }
        let name = self.source[start..self.pos].to_ascii_lowercase();
        let _ = self.skip_ws();

        let operator = match self.bump() {
            Some(']') => {
                return Ok(AttrCondition {
                    name,
                    operator: AttrOperator::Exists,
                    value: String::new(),
                })
            }
            Some('=') => AttrOperator::Equals,
            Some(c @ ('^' | '$' | '*' | '~' | '|')) => {
                if !self.eat('=') {
                    return Err(self.error(format_args!("expected `=` after `{c}`")));
                }
                match c {
                    '^' => AttrOperator::Prefix,
                    '$' => AttrOperator::Suffix,
                    '*' => AttrOperator::Substring,
                    '~' => AttrOperator::Word,
                    _ => AttrOperator::DashMatch,
                }
            }
            Some(c) => return Err(self.error(format_args!("unexpected `{c}` in attribute"))),
            None => return Err(self.error("unterminated attribute selector")),
        };
        let _ = self.skip_ws();

        let (value, open) = self.attr_value()?;
        if open {
            return match (self.open_values, operator) {
                (OpenValueMode::Prefix, AttrOperator::Equals | AttrOperator::Prefix) => {
                    Ok(AttrCondition {
                        name,
                        operator: AttrOperator::OpenPrefix,
                        value,
                    })
                }
                _ => Err(self.error("unterminated attribute value")),
            };
        }
        let _ = self.skip_ws();
        if !self.eat(']') {
            return Err(self.error("expected `]`"));
        }
        Ok(AttrCondition {
            name,
            operator,
            value,
        })
    }

    // Returns the value and whether input ended inside an open quote.
    fn attr_value(&mut self) -> VigilResult<(String, bool)> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                let _ = self.bump();
                let mut value = String::new();
                loop {
                    match self.bump() {
                        None => return Ok((value, true)),
                        Some('\\') => {
                            if let Some(c) = self.bump() {
                                value.push(c);
                            }
                        }
                        Some(c) if c == quote => return Ok((value, false)),
                        Some(c) => value.push(c),
                    }
                }
            }
            _ => {
                let start = self.pos;
                while self.peek().is_some_and(is_ident_char) {
                    let _ = self.bump();
                }
                if self.pos == start {
                    return Err(self.error("expected an attribute value"));
                }
                Ok((self.source[start..self.pos].to_string(), false))
            }
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn starts_compound(c: char) -> bool {
    matches!(c, '*' | '#' | '.' | '[' | ':') || is_ident_char(c)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::ReadyState;

    fn home_page() -> DomSnapshot {
        DomSnapshot {
            url: "http://localhost:8080/".into(),
            title: "Home | go-project".into(),
            ready_state: ReadyState::Complete,
            elements: vec![
                ElementNode::new(1, "html"),
                ElementNode::new(2, "body").with_parent(1),
                ElementNode::new(3, "form")
                    .with_parent(2)
                    .with_attr("id", "create")
                    .with_attr("lang", "en-US"),
                ElementNode::new(4, "button")
                    .with_parent(3)
                    .with_attr("data-test", "create-endpoint")
                    .with_attr("class", "btn btn-primary")
                    .with_text("Create endpoint"),
                ElementNode::new(5, "div").with_parent(2).with_attr("class", "footer"),
                ElementNode::new(6, "button")
                    .with_parent(5)
                    .with_attr("data-test", "create-endpoint-secondary")
                    .with_attr("class", "btn"),
                ElementNode::new(7, "span")
                    .with_parent(6)
                    .with_attr("title", "hello world"),
            ],
        }
    }

    fn ids(selector: &str) -> Vec<NodeId> {
        let snapshot = home_page();
        let selector = Selector::parse(selector).unwrap();
        resolve(&selector, Scope::Document, &snapshot)
            .into_iter()
            .map(|h| h.id)
            .collect()
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn test_tag_and_attribute() {
            let selector = Selector::parse(r#"button[data-test="create-endpoint"]"#).unwrap();
            let compound = &selector.groups()[0].parts[0].1;
            assert_eq!(compound.tag.as_deref(), Some("button"));
            assert_eq!(compound.attrs[0].operator, AttrOperator::Equals);
            assert_eq!(compound.attrs[0].value, "create-endpoint");
            assert!(!selector.uses_open_prefix());
        }

        #[test]
        fn test_open_quote_is_prefix() {
            let selector = Selector::parse(r#"button[data-test="create-endpoint"#).unwrap();
            let attr = &selector.groups()[0].parts[0].1.attrs[0];
            assert_eq!(attr.operator, AttrOperator::OpenPrefix);
            assert_eq!(attr.value, "create-endpoint");
            assert!(selector.uses_open_prefix());
            assert_eq!(
                selector.canonical(),
                r#"button[data-test^="create-endpoint"]"#
            );
        }

        #[test]
        fn test_open_quote_rejected_when_configured() {
            let err = Selector::parse_with(
                r#"button[data-test="create-endpoint"#,
                OpenValueMode::Reject,
            )
            .unwrap_err();
            assert!(matches!(err, VigilError::InvalidSelector { .. }));
            assert!(err.to_string().contains("unterminated attribute value"));
        }

        #[test]
        fn test_open_quote_only_for_equality_like_operators() {
            assert!(Selector::parse(r#"[title*="wor"#).is_err());
            assert!(Selector::parse(r#"[title^="hel"#).is_ok());
        }

        #[test]
        fn test_combinators_and_groups() {
            let selector = Selector::parse("form > button.btn, div  span").unwrap();
            assert_eq!(selector.groups().len(), 2);
            let first = &selector.groups()[0].parts;
            assert_eq!(first[1].0, Some(Combinator::Child));
            let second = &selector.groups()[1].parts;
            assert_eq!(second[1].0, Some(Combinator::Descendant));
        }

        #[test]
        fn test_malformed_selectors() {
            for bad in [
                "",
                "   ",
                "[",
                "button[",
                "div >",
                "> div",
                "a,,b",
                ",a",
                "#",
                ".",
                "a:hover",
                "[a~]",
                r#"[a="x""#,
                "[a=]",
                "a#x#y",
                "a!",
            ] {
                let result = Selector::parse(bad);
                assert!(
                    matches!(result, Err(VigilError::InvalidSelector { .. })),
                    "expected `{bad}` to be rejected"
                );
            }
        }

        #[test]
        fn test_escaped_quote_in_value() {
            let selector = Selector::parse(r#"[title="say \"hi\""]"#).unwrap();
            assert_eq!(selector.groups()[0].parts[0].1.attrs[0].value, "say \"hi\"");
        }

        #[test]
        fn test_from_str_and_display() {
            let selector: Selector = " #create ".parse().unwrap();
            assert_eq!(selector.to_string(), "#create");
        }
    }

    mod resolve_tests {
        use super::*;

        #[test]
        fn test_exact_attribute_match() {
            assert_eq!(ids(r#"button[data-test="create-endpoint"]"#), vec![4]);
        }

        #[test]
        fn test_open_prefix_matches_both_buttons() {
            assert_eq!(ids(r#"button[data-test="create-endpoint"#), vec![4, 6]);
        }

        #[test]
        fn test_attribute_operators() {
            assert_eq!(ids(r#"[data-test$="secondary"]"#), vec![6]);
            assert_eq!(ids(r#"[data-test*="endpoint"]"#), vec![4, 6]);
            assert_eq!(ids(r#"[title~="world"]"#), vec![7]);
            assert_eq!(ids(r#"[title~="wor"]"#), Vec::<NodeId>::new());
            assert_eq!(ids(r#"[lang|="en"]"#), vec![3]);
            assert_eq!(ids("[data-test]"), vec![4, 6]);
            assert_eq!(ids(r#"[data-test^=""]"#), Vec::<NodeId>::new());
        }

        #[test]
        fn test_id_class_and_universal() {
            assert_eq!(ids("#create"), vec![3]);
            assert_eq!(ids(".btn"), vec![4, 6]);
            assert_eq!(ids(".btn.btn-primary"), vec![4]);
            assert_eq!(ids("body > *").len(), 2);
        }

        #[test]
        fn test_descendant_vs_child() {
            assert_eq!(ids("body button"), vec![4, 6]);
            assert_eq!(ids("body > button"), Vec::<NodeId>::new());
            assert_eq!(ids("form > button"), vec![4]);
            assert_eq!(ids("body div span"), vec![7]);
        }

        #[test]
        fn test_group_results_in_document_order() {
            assert_eq!(ids("span, form"), vec![3, 7]);
        }

        #[test]
        fn test_scoped_lookup() {
            let snapshot = home_page();
            let selector = Selector::parse("button").unwrap();
            let found = resolve(&selector, Scope::Within(&[5]), &snapshot);
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].id, 6);
            // the scope root itself is excluded
            let found = resolve(&Selector::parse("div").unwrap(), Scope::Within(&[5]), &snapshot);
            assert!(found.is_empty());
        }

        #[test]
        fn test_resolution_is_repeatable() {
            let snapshot = home_page();
            let selector = Selector::parse("body *").unwrap();
            let first = resolve(&selector, Scope::Document, &snapshot);
            let second = resolve(&selector, Scope::Document, &snapshot);
            assert_eq!(first, second);
        }
    }
}
