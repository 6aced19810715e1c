//! DOM snapshot model.
//!
//! Drivers report the document as a flat list of element nodes in document
//! order. Every query and assertion evaluates against one snapshot, so
//! resolution stays a pure function of the snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Driver-assigned element identity, stable for the lifetime of a document
pub type NodeId = u64;

/// Document loading state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    /// Document is still loading
    #[default]
    Loading,
    /// DOM parsed, subresources pending
    Interactive,
    /// Load event fired
    Complete,
}

const fn default_true() -> bool {
    true
}

/// One element in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementNode {
    /// Node identity
    pub id: NodeId,
    /// Parent element, `None` for the root
    #[serde(default)]
    pub parent: Option<NodeId>,
    /// Lowercase tag name
    pub tag: String,
    /// Attributes by name
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Text content
    #[serde(default)]
    pub text: String,
    /// Rendered with a non-empty box and not hidden by style
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Connected to the document
    #[serde(default = "default_true")]
    pub attached: bool,
    /// Disabled form control
    #[serde(default)]
    pub disabled: bool,
    /// Covered by another element at its center point
    #[serde(default)]
    pub obscured: bool,
}

impl ElementNode {
    /// Create a visible, attached element
    #[must_use]
    pub fn new(id: NodeId, tag: impl Into<String>) -> Self {
        Self {
            id,
            parent: None,
            tag: tag.into().to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            text: String::new(),
            visible: true,
            attached: true,
            disabled: false,
            obscured: false,
        }
    }

    /// Set the parent element
    #[must_use]
    pub const fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Mark as not visible
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Mark as disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Mark as covered by another element
    #[must_use]
    pub const fn obscured(mut self) -> Self {
        self.obscured = true;
        self
    }

    /// Attribute value by name
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The `id` attribute
    #[must_use]
    pub fn element_id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// Whitespace separated classes
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_ascii_whitespace()
    }

    /// Current interaction state
    #[must_use]
    pub const fn state(&self) -> ElementState {
        ElementState {
            visible: self.visible,
            attached: self.attached,
            disabled: self.disabled,
            obscured: self.obscured,
        }
    }
}

/// Interaction-relevant flags of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    /// Visible
    pub visible: bool,
    /// Attached
    pub attached: bool,
    /// Disabled
    pub disabled: bool,
    /// Obscured
    pub obscured: bool,
}

impl ElementState {
    /// Check actionability: attached, visible, enabled and unobstructed.
    ///
    /// # Errors
    ///
    /// Returns the first condition that does not hold.
    pub const fn check_actionable(&self) -> Result<(), &'static str> {
        if !self.attached {
            Err("element is detached from the document")
        } else if !self.visible {
            Err("element is not visible")
        } else if self.disabled {
            Err("element is disabled")
        } else if self.obscured {
            Err("element is covered by another element")
        } else {
            Ok(())
        }
    }
}

/// A located element, as observed in the snapshot that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Node identity
    pub id: NodeId,
    /// Tag name
    pub tag_name: String,
    /// Text content
    pub text_content: String,
    /// Attributes
    pub attributes: BTreeMap<String, String>,
    /// Interaction state
    pub state: ElementState,
}

impl ElementHandle {
    /// Whether the element was visible when observed
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.state.visible && self.state.attached
    }

    /// Attribute value by name
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

impl From<&ElementNode> for ElementHandle {
    fn from(node: &ElementNode) -> Self {
        Self {
            id: node.id,
            tag_name: node.tag.clone(),
            text_content: node.text.clone(),
            attributes: node.attributes.clone(),
            state: node.state(),
        }
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag_name)?;
        for (name, value) in &self.attributes {
            write!(f, " {name}=\"{value}\"")?;
        }
        write!(f, ">")
    }
}

/// A full document snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DomSnapshot {
    /// Document URL
    pub url: String,
    /// Document title
    #[serde(default)]
    pub title: String,
    /// Loading state
    #[serde(default)]
    pub ready_state: ReadyState,
    /// Elements in document order
    #[serde(default)]
    pub elements: Vec<ElementNode>,
}

impl DomSnapshot {
    /// An empty, fully loaded `about:blank` document
    #[must_use]
    pub fn blank() -> Self {
        Self {
            url: "about:blank".to_string(),
            title: String::new(),
            ready_state: ReadyState::Complete,
            elements: Vec::new(),
        }
    }

    /// Whether the load event has fired
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.ready_state == ReadyState::Complete
    }

    /// Element by id
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&ElementNode> {
        self.elements.iter().find(|node| node.id == id)
    }

    /// Parent element of a node
    #[must_use]
    pub fn parent_of(&self, node: &ElementNode) -> Option<&ElementNode> {
        node.parent.and_then(|parent| self.get(parent))
    }

    /// Whether `node` is a strict descendant of `ancestor`
    #[must_use]
    pub fn is_descendant_of(&self, node: &ElementNode, ancestor: NodeId) -> bool {
        let mut current = self.parent_of(node);
        // Bounded walk: a malformed snapshot with a parent cycle must not hang
        let mut remaining = self.elements.len();
        while let Some(parent) = current {
            if parent.id == ancestor {
                return true;
            }
            if remaining == 0 {
                return false;
            }
            remaining -= 1;
            current = self.parent_of(parent);
        }
        false
    }
}
