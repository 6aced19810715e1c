//! Chrome DevTools Protocol driver.
//!
//! Bridges the async `chromiumoxide` client into the synchronous [`Driver`]
//! interface. Each [`CdpDriver`] owns a small tokio runtime, one browser
//! process and one page; every call blocks on that runtime.
//!
//! Snapshots are taken by evaluating a script that walks the document and
//! tags elements with ids kept in a page-side map, so ids stay stable for the
//! life of a document.

use super::{Driver, DriverFactory, InputEvent};
use crate::dom::{DomSnapshot, NodeId, ReadyState};
use crate::result::{VigilError, VigilResult};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Walks the document and reports every element.
const SNAPSHOT_JS: &str = r#"(() => {
  const w = window;
  if (!w.__vigil) { w.__vigil = { ids: new WeakMap(), nodes: new Map(), next: 1 }; }
  const reg = w.__vigil;
  const idOf = (el) => {
    let id = reg.ids.get(el);
    if (id === undefined) { id = reg.next++; reg.ids.set(el, id); reg.nodes.set(id, el); }
    return id;
  };
  const elements = [];
  for (const el of document.querySelectorAll('*')) {
    const rect = el.getBoundingClientRect();
    const style = w.getComputedStyle(el);
    const visible = rect.width > 0 && rect.height > 0
      && style.visibility !== 'hidden' && style.display !== 'none';
    let obscured = false;
    if (visible) {
      const cx = rect.left + rect.width / 2;
      const cy = rect.top + rect.height / 2;
      if (cx >= 0 && cy >= 0 && cx < w.innerWidth && cy < w.innerHeight) {
        const top = document.elementFromPoint(cx, cy);
        obscured = top !== null && top !== el && !el.contains(top);
      }
    }
    const attributes = {};
    for (const a of el.attributes) { attributes[a.name] = a.value; }
    elements.push({
      id: idOf(el),
      parent: el.parentElement ? idOf(el.parentElement) : null,
      tag: el.tagName.toLowerCase(),
      attributes,
      text: el.textContent || '',
      visible,
      attached: el.isConnected,
      disabled: el.matches(':disabled'),
      obscured,
    });
  }
  return { url: location.href, title: document.title, ready_state: document.readyState, elements };
})()"#;

/// Center of an element, scrolled into view first.
const CENTER_JS: &str = r#"((id) => {
  const el = window.__vigil && window.__vigil.nodes.get(id);
  if (!el || !el.isConnected) { return null; }
  el.scrollIntoView({ block: 'center', inline: 'center' });
  const r = el.getBoundingClientRect();
  return { x: r.left + r.width / 2, y: r.top + r.height / 2 };
})"#;

/// Focus an element, optionally clearing its value.
const FOCUS_JS: &str = r#"((id, clear) => {
  const el = window.__vigil && window.__vigil.nodes.get(id);
  if (!el || !el.isConnected) { return false; }
  el.focus();
  if (clear && 'value' in el) {
    el.value = '';
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
  }
  return true;
})"#;

#[derive(Debug, Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

/// Browser launch settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdpConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Chrome sandbox (disable inside containers)
    pub sandbox: bool,
    /// Explicit browser executable
    pub chrome_path: Option<PathBuf>,
    /// Window width
    pub window_width: u32,
    /// Window height
    pub window_height: u32,
    /// Per-request protocol timeout
    pub request_timeout: Duration,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            chrome_path: None,
            window_width: 1280,
            window_height: 720,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl CdpConfig {
    /// Default settings: headless, sandboxed, 1280x720
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Disable the Chrome sandbox
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Use a specific browser executable
    #[must_use]
    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    /// Set the window size
    #[must_use]
    pub const fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }

    /// Set the protocol request timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn browser_config(&self) -> VigilResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.window_width, self.window_height)
            .request_timeout(self.request_timeout);
        if !self.headless {
            builder = builder.with_head();
        }
        if !self.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(VigilError::session)
    }
}

fn session_err(context: &str, e: impl std::fmt::Display) -> VigilError {
    VigilError::session(format!("{context}: {e}"))
}

/// A browser session over CDP
#[derive(Debug)]
pub struct CdpDriver {
    runtime: tokio::runtime::Runtime,
    browser: Option<Browser>,
    page: Page,
    handler: tokio::task::JoinHandle<()>,
}

impl CdpDriver {
    /// Launch a browser and open a blank page.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::Session`] if the browser cannot be started.
    pub fn launch(config: &CdpConfig) -> VigilResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| session_err("runtime", e))?;
        let browser_config = config.browser_config()?;

        let (browser, mut handler) = runtime
            .block_on(Browser::launch(browser_config))
            .map_err(|e| session_err("launch", e))?;

        let handler = runtime.spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = runtime
            .block_on(browser.new_page("about:blank"))
            .map_err(|e| session_err("new page", e))?;

        info!(headless = config.headless, "browser launched");
        Ok(Self {
            runtime,
            browser: Some(browser),
            page,
            handler,
        })
    }

    fn eval<T: serde::de::DeserializeOwned>(&self, expr: &str) -> VigilResult<T> {
        let page = &self.page;
        self.runtime.block_on(async move {
            let result = page
                .evaluate(expr)
                .await
                .map_err(|e| session_err("evaluate", e))?;
            result
                .into_value::<T>()
                .map_err(|e| session_err("decode", e))
        })
    }

    fn center_of(&self, node: NodeId) -> VigilResult<Point> {
        let point: Option<Point> = self.eval(&format!("{CENTER_JS}({node})"))?;
        point.ok_or_else(|| VigilError::session(format!("node {node} is no longer in the page")))
    }

    fn focus(&self, node: NodeId, clear: bool) -> VigilResult<()> {
        let focused: bool = self.eval(&format!("{FOCUS_JS}({node}, {clear})"))?;
        if focused {
            Ok(())
        } else {
            Err(VigilError::session(format!(
                "node {node} is no longer in the page"
            )))
        }
    }

    fn mouse(&self, point: &Point, click_count: i64) -> VigilResult<()> {
        for kind in [
            DispatchMouseEventType::MousePressed,
            DispatchMouseEventType::MouseReleased,
        ] {
            let params = DispatchMouseEventParams::builder()
                .r#type(kind)
                .x(point.x)
                .y(point.y)
                .button(MouseButton::Left)
                .click_count(click_count)
                .build()
                .map_err(VigilError::session)?;
            self.runtime
                .block_on(self.page.execute(params))
                .map_err(|e| session_err("mouse", e))?;
        }
        Ok(())
    }
}

impl Driver for CdpDriver {
    fn navigate(&mut self, url: &str) -> VigilResult<()> {
        debug!(url, "navigate");
        let response = self
            .runtime
            .block_on(self.page.execute(NavigateParams::new(url)))
            .map_err(|e| session_err("navigate", e))?;
        match response.result.error_text {
            Some(ref text) if !text.is_empty() => Err(VigilError::Navigation {
                url: url.to_string(),
                message: text.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn query_dom(&mut self) -> VigilResult<DomSnapshot> {
        match self.eval::<DomSnapshot>(SNAPSHOT_JS) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                // The execution context disappears mid-navigation; report a
                // loading document as long as the page itself still answers.
                let url = self
                    .runtime
                    .block_on(self.page.url())
                    .map_err(|_| e)?
                    .unwrap_or_default();
                Ok(DomSnapshot {
                    url,
                    ready_state: ReadyState::Loading,
                    ..DomSnapshot::default()
                })
            }
        }
    }

    fn dispatch_input(&mut self, event: &InputEvent) -> VigilResult<()> {
        debug!(%event, "dispatch");
        match event {
            InputEvent::Click { node } => {
                let point = self.center_of(*node)?;
                self.mouse(&point, 1)
            }
            InputEvent::DoubleClick { node } => {
                let point = self.center_of(*node)?;
                self.mouse(&point, 1)?;
                self.mouse(&point, 2)
            }
            InputEvent::Type { node, text } => {
                self.focus(*node, false)?;
                self.runtime
                    .block_on(self.page.execute(InsertTextParams::new(text.clone())))
                    .map_err(|e| session_err("type", e))?;
                Ok(())
            }
            InputEvent::Clear { node } => self.focus(*node, true),
        }
    }

    fn close(&mut self) -> VigilResult<()> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        let result = self
            .runtime
            .block_on(browser.close())
            .map(|_| ())
            .map_err(|e| session_err("close", e));
        self.handler.abort();
        info!("browser closed");
        result
    }

    fn name(&self) -> &str {
        "cdp"
    }
}

/// Launches one browser per session
#[derive(Debug, Clone, Default)]
pub struct CdpFactory {
    config: CdpConfig,
}

impl CdpFactory {
    /// Create a factory with the given launch settings
    #[must_use]
    pub const fn new(config: CdpConfig) -> Self {
        Self { config }
    }

    /// Launch settings
    #[must_use]
    pub const fn config(&self) -> &CdpConfig {
        &self.config
    }
}

impl DriverFactory for CdpFactory {
    fn launch(&self) -> VigilResult<Box<dyn Driver>> {
        Ok(Box::new(CdpDriver::launch(&self.config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = CdpConfig::new()
            .with_headless(false)
            .with_no_sandbox()
            .with_window_size(800, 600)
            .with_chrome_path("/usr/bin/chromium");
        assert!(!config.headless);
        assert!(!config.sandbox);
        assert_eq!((config.window_width, config.window_height), (800, 600));
        assert_eq!(config.chrome_path, Some(PathBuf::from("/usr/bin/chromium")));
    }

    #[test]
    fn test_scripts_are_expressions() {
        assert!(SNAPSHOT_JS.starts_with("(() =>"));
        assert!(SNAPSHOT_JS.contains("ready_state: document.readyState"));
        assert!(CENTER_JS.starts_with("((id) =>"));
    }
}
