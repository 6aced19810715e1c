//! Locators: re-runnable queries.
//!
//! A subject produced by a query keeps the query, so assertions and
//! actionability checks can re-run it against every fresh snapshot instead of
//! trusting stale handles.

use crate::dom::{DomSnapshot, ElementHandle, NodeId};
use crate::result::VigilResult;
use crate::selector::{self, OpenValueMode, Scope, Selector};
use std::fmt;

/// An element lookup, optionally scoped to the results of a parent lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementQuery {
    selector: Selector,
    contains: Option<String>,
    within: Option<Box<ElementQuery>>,
}

impl ElementQuery {
    /// Query the whole document
    #[must_use]
    pub const fn new(selector: Selector) -> Self {
        Self {
            selector,
            contains: None,
            within: None,
        }
    }

    /// Parse a selector into a document-wide query.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VigilError::InvalidSelector`] when malformed.
    pub fn parse(selector: &str, open_values: OpenValueMode) -> VigilResult<Self> {
        Ok(Self::new(Selector::parse_with(selector, open_values)?))
    }

    /// Keep only elements whose text contains `text`
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.contains = Some(text.into());
        self
    }

    /// Search only inside the results of `parent`
    #[must_use]
    pub fn within(mut self, parent: Self) -> Self {
        self.within = Some(Box::new(parent));
        self
    }

    /// The selector
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Run against a snapshot, returning matches in document order
    #[must_use]
    pub fn run(&self, snapshot: &DomSnapshot) -> Vec<ElementHandle> {
        let roots: Option<Vec<NodeId>> = self
            .within
            .as_ref()
            .map(|parent| parent.run(snapshot).iter().map(|h| h.id).collect());
        let scope = roots.as_deref().map_or(Scope::Document, Scope::Within);
        let mut found = selector::resolve(&self.selector, scope, snapshot);
        if let Some(text) = &self.contains {
            found.retain(|handle| handle.text_content.contains(text.as_str()));
        }
        found
    }
}

impl fmt::Display for ElementQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.within {
            write!(f, "{parent} >> ")?;
        }
        write!(f, "`{}`", self.selector)?;
        if let Some(text) = &self.contains {
            write!(f, " containing {text:?}")?;
        }
        Ok(())
    }
}

/// Something a subject can be re-derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Matching elements
    Elements(ElementQuery),
    /// Document title
    Title,
    /// Document URL
    Url,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elements(query) => query.fmt(f),
            Self::Title => f.write_str("title"),
            Self::Url => f.write_str("url"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::{ElementNode, ReadyState};

    fn page() -> DomSnapshot {
        DomSnapshot {
            url: "http://localhost:8080/".into(),
            title: "Home".into(),
            ready_state: ReadyState::Complete,
            elements: vec![
                ElementNode::new(1, "body"),
                ElementNode::new(2, "nav").with_parent(1),
                ElementNode::new(3, "a").with_parent(2).with_text("Home"),
                ElementNode::new(4, "a").with_parent(2).with_text("About"),
                ElementNode::new(5, "main").with_parent(1),
                ElementNode::new(6, "a").with_parent(5).with_text("About us"),
            ],
        }
    }

    #[test]
    fn test_document_query() {
        let query = ElementQuery::parse("a", OpenValueMode::Prefix).unwrap();
        assert_eq!(query.run(&page()).len(), 3);
    }

    #[test]
    fn test_text_filter() {
        let query = ElementQuery::parse("a", OpenValueMode::Prefix)
            .unwrap()
            .with_text("About");
        let ids: Vec<_> = query.run(&page()).iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![4, 6]);
    }

    #[test]
    fn test_scoped_query() {
        let nav = ElementQuery::parse("nav", OpenValueMode::Prefix).unwrap();
        let query = ElementQuery::parse("a", OpenValueMode::Prefix)
            .unwrap()
            .within(nav);
        let ids: Vec<_> = query.run(&page()).iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(query.to_string(), "`nav` >> `a`");
    }

    #[test]
    fn test_scope_with_no_roots_is_empty() {
        let missing = ElementQuery::parse("footer", OpenValueMode::Prefix).unwrap();
        let query = ElementQuery::parse("a", OpenValueMode::Prefix)
            .unwrap()
            .within(missing);
        assert!(query.run(&page()).is_empty());
    }

    #[test]
    fn test_display() {
        let query = ElementQuery::parse("button", OpenValueMode::Prefix)
            .unwrap()
            .with_text("Create");
        assert_eq!(query.to_string(), "`button` containing \"Create\"");
        assert_eq!(Query::Title.to_string(), "title");
    }
}
