//! The value threaded through a command chain.

use crate::dom::{DomSnapshot, ElementHandle};
use crate::locator::{ElementQuery, Query};
use std::fmt;

/// What a subject currently holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectValue {
    /// Nothing yielded yet, or a command that yields nothing
    Nothing,
    /// Matched elements in document order
    Elements(Vec<ElementHandle>),
    /// Text such as a title or URL
    Text(String),
    /// Boolean
    Bool(bool),
}

/// Immutable chain subject.
///
/// Each command yields a new subject; nothing mutates one in place. A subject
/// that came from a [`Query`] can be re-derived from a fresh snapshot with
/// [`Subject::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    value: SubjectValue,
    query: Option<Query>,
}

impl Default for Subject {
    fn default() -> Self {
        Self::nothing()
    }
}

impl Subject {
    /// Empty subject that starts every chain
    #[must_use]
    pub const fn nothing() -> Self {
        Self {
            value: SubjectValue::Nothing,
            query: None,
        }
    }

    /// Fixed text with no query behind it
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: SubjectValue::Text(value.into()),
            query: None,
        }
    }

    /// Fixed boolean
    #[must_use]
    pub const fn boolean(value: bool) -> Self {
        Self {
            value: SubjectValue::Bool(value),
            query: None,
        }
    }

    /// Elements found by `query`
    #[must_use]
    pub const fn elements(query: ElementQuery, handles: Vec<ElementHandle>) -> Self {
        Self {
            value: SubjectValue::Elements(handles),
            query: Some(Query::Elements(query)),
        }
    }

    /// Evaluate a query against a snapshot
    #[must_use]
    pub fn from_query(query: Query, snapshot: &DomSnapshot) -> Self {
        let value = match &query {
            Query::Elements(q) => SubjectValue::Elements(q.run(snapshot)),
            Query::Title => SubjectValue::Text(snapshot.title.clone()),
            Query::Url => SubjectValue::Text(snapshot.url.clone()),
        };
        Self {
            value,
            query: Some(query),
        }
    }

    /// Current value
    #[must_use]
    pub const fn value(&self) -> &SubjectValue {
        &self.value
    }

    /// Query this subject was derived from
    #[must_use]
    pub const fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    /// Element query, if this subject holds elements
    #[must_use]
    pub fn element_query(&self) -> Option<&ElementQuery> {
        match &self.query {
            Some(Query::Elements(query)) => Some(query),
            _ => None,
        }
    }

    /// Matched elements, empty for non-element subjects
    #[must_use]
    pub fn handles(&self) -> &[ElementHandle] {
        match &self.value {
            SubjectValue::Elements(handles) => handles,
            _ => &[],
        }
    }

    /// Whether re-running a query could change this subject
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.query.is_some()
    }

    /// Re-derive from a fresh snapshot. Subjects without a query are
    /// returned unchanged.
    #[must_use]
    pub fn refresh(&self, snapshot: &DomSnapshot) -> Self {
        match &self.query {
            Some(query) => Self::from_query(query.clone(), snapshot),
            None => self.clone(),
        }
    }

    /// Short label naming what the subject is, without its value
    #[must_use]
    pub fn label(&self) -> String {
        match (&self.query, &self.value) {
            (Some(query), _) => query.to_string(),
            (None, SubjectValue::Nothing) => "no subject".to_string(),
            (None, SubjectValue::Elements(_)) => "elements".to_string(),
            (None, SubjectValue::Text(_)) => "text".to_string(),
            (None, SubjectValue::Bool(_)) => "boolean".to_string(),
        }
    }
}

impl fmt::Display for SubjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => f.write_str("nothing"),
            Self::Elements(handles) => match handles.as_slice() {
                [] => f.write_str("0 elements"),
                [one] => write!(f, "1 element {one}"),
                many => write!(f, "{} elements", many.len()),
            },
            Self::Text(text) => write!(f, "{text:?}"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.query {
            Some(query) => write!(f, "{query} ({})", self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::{ElementNode, ReadyState};
    use crate::selector::OpenValueMode;

    fn snapshot(title: &str, buttons: u64) -> DomSnapshot {
        let mut elements = vec![ElementNode::new(1, "body")];
        for i in 0..buttons {
            elements.push(ElementNode::new(2 + i, "button").with_parent(1));
        }
        DomSnapshot {
            url: "http://localhost:8080/".into(),
            title: title.into(),
            ready_state: ReadyState::Complete,
            elements,
        }
    }

    #[test]
    fn test_refresh_reruns_query() {
        let subject = Subject::from_query(Query::Title, &snapshot("Loading", 0));
        assert_eq!(subject.value(), &SubjectValue::Text("Loading".into()));
        let refreshed = subject.refresh(&snapshot("Home", 0));
        assert_eq!(refreshed.value(), &SubjectValue::Text("Home".into()));
        assert_eq!(subject.value(), &SubjectValue::Text("Loading".into()));
    }

    #[test]
    fn test_refresh_elements() {
        let query = ElementQuery::parse("button", OpenValueMode::Prefix).unwrap();
        let subject = Subject::elements(query, Vec::new());
        assert!(subject.handles().is_empty());
        let refreshed = subject.refresh(&snapshot("", 2));
        assert_eq!(refreshed.handles().len(), 2);
        assert!(refreshed.element_query().is_some());
    }

    #[test]
    fn test_fixed_subject_is_not_live() {
        let subject = Subject::text("abc");
        assert!(!subject.is_live());
        assert_eq!(subject.refresh(&snapshot("x", 1)), subject);
        assert_eq!(subject.label(), "text");
    }

    #[test]
    fn test_display() {
        assert_eq!(Subject::nothing().to_string(), "nothing");
        let subject = Subject::from_query(Query::Url, &snapshot("", 0));
        assert_eq!(subject.to_string(), "url (\"http://localhost:8080/\")");
        let query = ElementQuery::parse("button", OpenValueMode::Prefix).unwrap();
        let subject = Subject::from_query(Query::Elements(query), &snapshot("", 3));
        assert_eq!(subject.to_string(), "`button` (3 elements)");
    }
}
