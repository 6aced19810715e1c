//! Scripted in-memory driver.
//!
//! A [`ScriptedSite`] describes pages by path. Elements can appear, become
//! enabled or change the page title after a delay measured from navigation,
//! and clicks can navigate or reveal hidden elements. Time is wall-clock, so polling behaves exactly as
//! it does against a real browser.

use super::{Driver, DriverFactory, InputEvent};
use crate::dom::{DomSnapshot, ElementNode, NodeId, ReadyState};
use crate::result::{VigilError, VigilResult};
use crate::selector::{resolve, Scope, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

const DEFAULT_ORIGIN: &str = "http://localhost:8080";
const NOT_FOUND_TITLE: &str = "Not Found";

/// Shared record of driver calls, in order
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// All calls so far
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Check if a call starting with `prefix` was made
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.count(prefix) > 0
    }

    /// Number of calls starting with `prefix`
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

/// What a click does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum ClickEffect {
    /// Navigate to a path or URL
    Navigate {
        /// Destination
        to: String,
    },
    /// Make hidden elements matching a selector visible
    Reveal {
        /// Selector of the elements to show
        selector: String,
    },
}

/// One element of a scripted page, with its subtree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementScript {
    /// Tag name
    pub tag: String,
    /// Attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Text content
    #[serde(default)]
    pub text: String,
    /// Milliseconds after navigation before the element is in the document
    #[serde(default)]
    pub appear_after_ms: u64,
    /// Never visible
    #[serde(default)]
    pub hidden: bool,
    /// Disabled until this many milliseconds after navigation
    #[serde(default)]
    pub enable_after_ms: Option<u64>,
    /// Permanently disabled
    #[serde(default)]
    pub disabled: bool,
    /// Covered by an overlay
    #[serde(default)]
    pub obscured: bool,
    /// Click behavior
    #[serde(default)]
    pub on_click: Option<ClickEffect>,
    /// Child elements
    #[serde(default)]
    pub children: Vec<ElementScript>,
}

impl ElementScript {
    /// Create an element that is present immediately
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            text: String::new(),
            appear_after_ms: 0,
            hidden: false,
            enable_after_ms: None,
            disabled: false,
            obscured: false,
            on_click: None,
            children: Vec::new(),
        }
    }

    /// Add an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set text content
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Insert into the document after a delay
    #[must_use]
    pub const fn appear_after(mut self, ms: u64) -> Self {
        self.appear_after_ms = ms;
        self
    }

    /// Stay disabled until a delay has passed
    #[must_use]
    pub const fn enable_after(mut self, ms: u64) -> Self {
        self.enable_after_ms = Some(ms);
        self
    }

    /// Never visible
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Permanently disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Covered by an overlay
    #[must_use]
    pub const fn obscured(mut self) -> Self {
        self.obscured = true;
        self
    }

    /// Navigate when clicked
    #[must_use]
    pub fn on_click_navigate(mut self, to: impl Into<String>) -> Self {
        self.on_click = Some(ClickEffect::Navigate { to: to.into() });
        self
    }

    /// Reveal hidden elements matching `selector` when clicked
    #[must_use]
    pub fn on_click_reveal(mut self, selector: impl Into<String>) -> Self {
        self.on_click = Some(ClickEffect::Reveal {
            selector: selector.into(),
        });
        self
    }

    /// Add a child element
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }
}

/// A scripted page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageScript {
    /// Document title
    #[serde(default)]
    pub title: String,
    /// Milliseconds after navigation before the title is set
    #[serde(default)]
    pub title_after_ms: u64,
    /// Body content
    #[serde(default)]
    pub elements: Vec<ElementScript>,
}

impl PageScript {
    /// Create a page with a title
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Delay the title
    #[must_use]
    pub const fn title_after(mut self, ms: u64) -> Self {
        self.title_after_ms = ms;
        self
    }

    /// Add a body element
    #[must_use]
    pub fn element(mut self, element: ElementScript) -> Self {
        self.elements.push(element);
        self
    }
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

/// A whole scripted site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedSite {
    /// Origin used to build absolute URLs
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Milliseconds from navigation until the load event
    #[serde(default)]
    pub load_delay_ms: u64,
    /// Pages by path
    #[serde(default)]
    pub pages: BTreeMap<String, PageScript>,
}

impl Default for ScriptedSite {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            load_delay_ms: 0,
            pages: BTreeMap::new(),
        }
    }
}

impl ScriptedSite {
    /// Create an empty site at the default origin
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the origin
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into().trim_end_matches('/').to_string();
        self
    }

    /// Delay the load event after every navigation
    #[must_use]
    pub const fn with_load_delay(mut self, ms: u64) -> Self {
        self.load_delay_ms = ms;
        self
    }

    /// Add a page
    #[must_use]
    pub fn page(mut self, path: impl Into<String>, page: PageScript) -> Self {
        let _ = self.pages.insert(path.into(), page);
        self
    }

    /// Parse a site from YAML.
    ///
    /// # Errors
    ///
    /// Returns error if the YAML is malformed.
    pub fn from_yaml(yaml: &str) -> VigilResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load a site from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> VigilResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Path component of a URL on this site; `None` for `about:blank`
    fn path_of(&self, url: &str) -> Option<String> {
        if url.starts_with("about:") {
            return None;
        }
        let rest = url.strip_prefix(self.origin.as_str()).unwrap_or_else(|| {
            url.split_once("://")
                .map_or(url, |(_, after)| after.find('/').map_or("", |i| &after[i..]))
        });
        let path = rest.split(['?', '#']).next().unwrap_or_default();
        Some(if path.is_empty() {
            "/".to_string()
        } else if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        })
    }
}

#[derive(Debug)]
struct Loaded {
    url: String,
    path: Option<String>,
    at: Instant,
}

/// Driver over a [`ScriptedSite`]
#[derive(Debug)]
pub struct ScriptedDriver {
    site: Arc<ScriptedSite>,
    log: CallLog,
    current: Loaded,
    values: HashMap<NodeId, String>,
    revealed: HashSet<NodeId>,
    closed: bool,
}

impl ScriptedDriver {
    /// Create a driver on a blank document
    #[must_use]
    pub fn new(site: ScriptedSite) -> Self {
        Self::shared(Arc::new(site), CallLog::new())
    }

    fn shared(site: Arc<ScriptedSite>, log: CallLog) -> Self {
        Self {
            site,
            log,
            current: Loaded {
                url: "about:blank".to_string(),
                path: None,
                at: Instant::now(),
            },
            values: HashMap::new(),
            revealed: HashSet::new(),
            closed: false,
        }
    }

    /// Calls made through this driver
    #[must_use]
    pub const fn calls(&self) -> &CallLog {
        &self.log
    }

    fn ensure_open(&self) -> VigilResult<()> {
        if self.closed {
            Err(VigilError::session("scripted session is closed"))
        } else {
            Ok(())
        }
    }

    fn absolute(&self, url: &str) -> String {
        if url.contains("://") || url.starts_with("about:") {
            url.to_string()
        } else {
            format!("{}/{}", self.site.origin, url.trim_start_matches('/'))
        }
    }

    fn load(&mut self, url: &str) {
        let url = self.absolute(url);
        self.current = Loaded {
            path: self.site.path_of(&url),
            url,
            at: Instant::now(),
        };
        self.values.clear();
        self.revealed.clear();
    }

    fn snapshot_at(&self, elapsed: Duration) -> DomSnapshot {
        let Some(path) = &self.current.path else {
            return DomSnapshot::blank();
        };
        let elapsed_ms = elapsed.as_millis() as u64;
        if elapsed_ms < self.site.load_delay_ms {
            return DomSnapshot {
                url: self.current.url.clone(),
                title: String::new(),
                ready_state: ReadyState::Loading,
                elements: Vec::new(),
            };
        }

        let mut elements = vec![
            ElementNode::new(1, "html"),
            ElementNode::new(2, "body").with_parent(1),
        ];
        let title = match self.site.pages.get(path) {
            Some(page) => {
                let mut next_id = 3;
                for script in &page.elements {
                    self.flatten(script, 2, elapsed_ms, &mut next_id, &mut elements);
                }
                if elapsed_ms >= page.title_after_ms {
                    page.title.clone()
                } else {
                    String::new()
                }
            }
            None => NOT_FOUND_TITLE.to_string(),
        };

        DomSnapshot {
            url: self.current.url.clone(),
            title,
            ready_state: ReadyState::Complete,
            elements,
        }
    }

    // Pre-order ids, assigned whether or not the element has appeared yet, so
    // ids stay stable while the page evolves.
    fn flatten(
        &self,
        script: &ElementScript,
        parent: NodeId,
        elapsed_ms: u64,
        next_id: &mut NodeId,
        out: &mut Vec<ElementNode>,
    ) {
        let id = *next_id;
        *next_id += 1;
        let present = elapsed_ms >= script.appear_after_ms;
        if present {
            let mut node = ElementNode::new(id, script.tag.as_str())
                .with_parent(parent)
                .with_text(script.text.as_str());
            node.attributes = script.attributes.clone();
            if let Some(value) = self.values.get(&id) {
                let _ = node.attributes.insert("value".to_string(), value.clone());
            }
            node.visible = !script.hidden || self.revealed.contains(&id);
            node.disabled =
                script.disabled || script.enable_after_ms.is_some_and(|ms| elapsed_ms < ms);
            node.obscured = script.obscured;
            out.push(node);
        }
        for child in &script.children {
            if present {
                self.flatten(child, id, elapsed_ms, next_id, out);
            } else {
                skip_ids(child, next_id);
            }
        }
    }

    fn script_for(&self, node: NodeId) -> Option<&ElementScript> {
        let page = self.site.pages.get(self.current.path.as_ref()?)?;
        let mut next_id = 3;
        page.elements
            .iter()
            .find_map(|script| find_script(script, node, &mut next_id))
    }
}

fn skip_ids(script: &ElementScript, next_id: &mut NodeId) {
    *next_id += 1;
    for child in &script.children {
        skip_ids(child, next_id);
    }
}

fn find_script<'a>(
    script: &'a ElementScript,
    target: NodeId,
    next_id: &mut NodeId,
) -> Option<&'a ElementScript> {
    let id = *next_id;
    *next_id += 1;
    if id == target {
        return Some(script);
    }
    script
        .children
        .iter()
        .find_map(|child| find_script(child, target, next_id))
}

impl Driver for ScriptedDriver {
    fn navigate(&mut self, url: &str) -> VigilResult<()> {
        self.ensure_open()?;
        self.log.push(format!("navigate:{url}"));
        self.load(url);
        Ok(())
    }

    fn query_dom(&mut self) -> VigilResult<DomSnapshot> {
        self.ensure_open()?;
        Ok(self.snapshot_at(self.current.at.elapsed()))
    }

    fn dispatch_input(&mut self, event: &InputEvent) -> VigilResult<()> {
        self.ensure_open()?;
        self.log.push(event.to_string());

        let snapshot = self.snapshot_at(self.current.at.elapsed());
        let node = event.target();
        if snapshot.get(node).is_none() {
            return Err(VigilError::ElementNotActionable {
                selector: format!("node {node}"),
                timeout_ms: 0,
                last_observed: "element left the document before dispatch".to_string(),
            });
        }

        match event {
            InputEvent::Click { .. } | InputEvent::DoubleClick { .. } => {
                match self.script_for(node).and_then(|s| s.on_click.clone()) {
                    Some(ClickEffect::Navigate { to }) => {
                        self.log.push(format!("navigate:{to}"));
                        self.load(&to);
                    }
                    Some(ClickEffect::Reveal { selector }) => {
                        let selector = Selector::parse(&selector)?;
                        self.revealed.extend(
                            resolve(&selector, Scope::Document, &snapshot)
                                .into_iter()
                                .map(|handle| handle.id),
                        );
                    }
                    None => {}
                }
            }
            InputEvent::Type { text, .. } => {
                self.values.entry(node).or_default().push_str(text);
            }
            InputEvent::Clear { .. } => {
                let _ = self.values.remove(&node);
            }
        }
        Ok(())
    }

    fn reset(&mut self) -> VigilResult<()> {
        self.ensure_open()?;
        self.log.push("reset".to_string());
        self.load("about:blank");
        Ok(())
    }

    fn close(&mut self) -> VigilResult<()> {
        if !self.closed {
            self.log.push("close".to_string());
            self.closed = true;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Launches [`ScriptedDriver`] sessions that share one site and one call log
#[derive(Debug, Clone)]
pub struct ScriptedFactory {
    site: Arc<ScriptedSite>,
    log: CallLog,
}

impl ScriptedFactory {
    /// Create a factory for a site
    #[must_use]
    pub fn new(site: ScriptedSite) -> Self {
        Self {
            site: Arc::new(site),
            log: CallLog::new(),
        }
    }

    /// Calls made by every session launched so far
    #[must_use]
    pub const fn calls(&self) -> &CallLog {
        &self.log
    }

    /// The site served by every session
    #[must_use]
    pub fn site(&self) -> &ScriptedSite {
        &self.site
    }
}

impl DriverFactory for ScriptedFactory {
    fn launch(&self) -> VigilResult<Box<dyn Driver>> {
        self.log.push("launch".to_string());
        Ok(Box::new(ScriptedDriver::shared(
            Arc::clone(&self.site),
            self.log.clone(),
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn site() -> ScriptedSite {
        ScriptedSite::new()
            .page(
                "/",
                PageScript::new("Home | go-project").element(
                    ElementScript::new("form")
                        .attr("method", "post")
                        .child(
                            ElementScript::new("button")
                                .attr("data-test", "create-endpoint")
                                .appear_after(60)
                                .on_click_navigate("/purple-sun-1234"),
                        )
                        .child(ElementScript::new("input").attr("name", "q")),
                ),
            )
            .page(
                "/purple-sun-1234",
                PageScript::new("Endpoint | go-project").element(
                    ElementScript::new("code").attr("data-test", "unique-endpoint-url-field"),
                ),
            )
    }

    mod site_tests {
        use super::*;

        #[test]
        fn test_path_of() {
            let site = site();
            assert_eq!(site.path_of("http://localhost:8080/"), Some("/".into()));
            assert_eq!(site.path_of("http://localhost:8080"), Some("/".into()));
            assert_eq!(
                site.path_of("http://localhost:8080/a?x=1#top"),
                Some("/a".into())
            );
            assert_eq!(site.path_of("https://other.test/b"), Some("/b".into()));
            assert_eq!(site.path_of("about:blank"), None);
        }

        #[test]
        fn test_from_yaml() {
            let yaml = r#"
origin: http://localhost:3000
pages:
  /:
    title: Home
    elements:
      - tag: button
        attributes: { data-test: go }
        on_click: { effect: navigate, to: /next }
"#;
            let site = ScriptedSite::from_yaml(yaml).unwrap();
            assert_eq!(site.origin, "http://localhost:3000");
            let button = &site.pages["/"].elements[0];
            assert_eq!(
                button.on_click,
                Some(ClickEffect::Navigate { to: "/next".into() })
            );
        }

        #[test]
        fn test_from_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("site.yaml");
            std::fs::write(&path, "pages:\n  /:\n    title: Home\n").unwrap();
            let site = ScriptedSite::from_file(&path).unwrap();
            assert_eq!(site.origin, DEFAULT_ORIGIN);
            assert_eq!(site.pages["/"].title, "Home");
        }
    }

    mod driver_tests {
        use super::*;

        #[test]
        fn test_starts_blank() {
            let mut driver = ScriptedDriver::new(site());
            let snapshot = driver.query_dom().unwrap();
            assert_eq!(snapshot, DomSnapshot::blank());
        }

        #[test]
        fn test_element_appears_after_delay() {
            let mut driver = ScriptedDriver::new(site());
            driver.navigate("/").unwrap();
            let early = driver.snapshot_at(Duration::from_millis(10));
            assert_eq!(early.title, "Home | go-project");
            assert!(early.elements.iter().all(|e| e.tag != "button"));
            let late = driver.snapshot_at(Duration::from_millis(100));
            let button = late.elements.iter().find(|e| e.tag == "button").unwrap();
            assert_eq!(button.parent, Some(3));
            // ids do not shift when the button appears
            let input_early = early.elements.iter().find(|e| e.tag == "input").unwrap();
            let input_late = late.elements.iter().find(|e| e.tag == "input").unwrap();
            assert_eq!(input_early.id, input_late.id);
        }

        #[test]
        fn test_click_navigates() {
            let mut driver = ScriptedDriver::new(site());
            driver.navigate("http://localhost:8080/").unwrap();
            std::thread::sleep(Duration::from_millis(70));
            let snapshot = driver.query_dom().unwrap();
            let button = snapshot.elements.iter().find(|e| e.tag == "button").unwrap();
            driver
                .dispatch_input(&InputEvent::Click { node: button.id })
                .unwrap();
            let after = driver.query_dom().unwrap();
            assert_eq!(after.url, "http://localhost:8080/purple-sun-1234");
            assert_eq!(after.title, "Endpoint | go-project");
            assert!(driver.calls().was_called("click:"));
        }

        #[test]
        fn test_click_reveals() {
            let site = ScriptedSite::new().page(
                "/",
                PageScript::new("Menu")
                    .element(ElementScript::new("button").on_click_reveal("ul.menu"))
                    .element(ElementScript::new("ul").attr("class", "menu").hidden()),
            );
            let mut driver = ScriptedDriver::new(site);
            driver.navigate("/").unwrap();
            let snapshot = driver.query_dom().unwrap();
            let menu = snapshot.elements.iter().find(|e| e.tag == "ul").unwrap().id;
            assert!(!snapshot.get(menu).unwrap().visible);

            let button = snapshot.elements.iter().find(|e| e.tag == "button").unwrap().id;
            driver.dispatch_input(&InputEvent::Click { node: button }).unwrap();
            assert!(driver.query_dom().unwrap().get(menu).unwrap().visible);

            driver.navigate("/").unwrap();
            assert!(!driver.query_dom().unwrap().get(menu).unwrap().visible);
        }

        #[test]
        fn test_unknown_path_is_not_found() {
            let mut driver = ScriptedDriver::new(site());
            driver.navigate("/missing").unwrap();
            let snapshot = driver.query_dom().unwrap();
            assert_eq!(snapshot.title, NOT_FOUND_TITLE);
            assert_eq!(snapshot.elements.len(), 2);
        }

        #[test]
        fn test_load_delay_reports_loading() {
            let mut driver = ScriptedDriver::new(site().with_load_delay(50));
            driver.navigate("/").unwrap();
            assert_eq!(
                driver.snapshot_at(Duration::from_millis(10)).ready_state,
                ReadyState::Loading
            );
            assert!(driver.snapshot_at(Duration::from_millis(60)).is_loaded());
        }

        #[test]
        fn test_typing_sets_value() {
            let mut driver = ScriptedDriver::new(site());
            driver.navigate("/").unwrap();
            let snapshot = driver.query_dom().unwrap();
            let input = snapshot.elements.iter().find(|e| e.tag == "input").unwrap().id;
            driver
                .dispatch_input(&InputEvent::Type {
                    node: input,
                    text: "abc".into(),
                })
                .unwrap();
            let snapshot = driver.query_dom().unwrap();
            assert_eq!(snapshot.get(input).unwrap().attr("value"), Some("abc"));
            driver.dispatch_input(&InputEvent::Clear { node: input }).unwrap();
            let snapshot = driver.query_dom().unwrap();
            assert_eq!(snapshot.get(input).unwrap().attr("value"), None);
        }

        #[test]
        fn test_dispatch_to_missing_node_fails() {
            let mut driver = ScriptedDriver::new(site());
            driver.navigate("/").unwrap();
            let err = driver
                .dispatch_input(&InputEvent::Click { node: 999 })
                .unwrap_err();
            assert!(matches!(err, VigilError::ElementNotActionable { .. }));
        }

        #[test]
        fn test_closed_session_errors() {
            let mut driver = ScriptedDriver::new(site());
            driver.close().unwrap();
            let err = driver.query_dom().unwrap_err();
            assert!(err.is_fatal());
        }

        #[test]
        fn test_reset_returns_to_blank() {
            let mut driver = ScriptedDriver::new(site());
            driver.navigate("/").unwrap();
            driver.reset().unwrap();
            assert_eq!(driver.query_dom().unwrap().url, "about:blank");
        }
    }

    mod factory_tests {
        use super::*;

        #[test]
        fn test_sessions_share_log() {
            let factory = ScriptedFactory::new(site());
            let mut first = factory.launch().unwrap();
            let mut second = factory.launch().unwrap();
            first.navigate("/").unwrap();
            second.navigate("/other").unwrap();
            first.close().unwrap();
            assert_eq!(factory.calls().count("launch"), 2);
            assert_eq!(factory.calls().count("navigate:"), 2);
            assert!(factory.calls().was_called("close"));
        }
    }
}
