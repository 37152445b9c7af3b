//! Page access seam
//!
//! Every component of the engine talks to the hosted page through the
//! [`PageDriver`] trait. Two implementations ship with the crate: the CDP
//! driver over a live browser tab ([`crate::browser::PageHandle`]) and the
//! offline [`DocumentPage`] backed by a parsed HTML document.

pub mod document;

pub use document::{DocumentPage, EffectKind, PageEffect};

use crate::error::PageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome of a single selector query
#[derive(Debug, Clone)]
pub enum Probe<E> {
    /// First matching element in document order
    Found(E),
    /// Nothing matches right now
    Missing,
}

impl<E> Probe<E> {
    /// Convert into an `Option`
    pub fn found(self) -> Option<E> {
        match self {
            Probe::Found(el) => Some(el),
            Probe::Missing => None,
        }
    }
}

/// State-change notification understood by the hosted page's reactive layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Notification {
    /// The value is being edited
    Input,
    /// The value was committed
    Change,
}

impl Notification {
    /// DOM event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Notification::Input => "input",
            Notification::Change => "change",
        }
    }
}

/// Viewport-relative rectangle in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Viewport size and scroll offsets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    /// Inner width in CSS pixels
    pub width: u32,
    /// Inner height in CSS pixels
    pub height: u32,
    /// Horizontal scroll offset
    #[serde(default)]
    pub scroll_x: f64,
    /// Vertical scroll offset
    #[serde(default)]
    pub scroll_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }
}

/// One element of interest as reported by a driver, before any bounding
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawElement {
    /// Lowercase tag name
    pub tag: String,
    /// Attributes as written in the document
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Trimmed text content
    #[serde(default)]
    pub text: String,
    /// Live value for form controls
    #[serde(default)]
    pub value: Option<String>,
    /// Index of the owning `<form>` among the snapshot's forms
    #[serde(default)]
    pub form: Option<usize>,
}

impl RawElement {
    /// Attribute value, if present
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whether a boolean attribute is present
    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}

/// Owned, unbounded copy of the parts of a page the context extractor reads
///
/// `elements` lists every `form`, `a[href]`, `area[href]`, `button`, `input`,
/// `textarea` and `select` in document order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSnapshot {
    /// Document URL
    pub url: String,
    /// Document title
    pub title: String,
    /// Viewport at snapshot time
    #[serde(default)]
    pub viewport: Viewport,
    /// Elements of interest in document order
    #[serde(default)]
    pub elements: Vec<RawElement>,
    /// Visible text blocks in document order
    #[serde(default)]
    pub text_blocks: Vec<String>,
}

/// Access to a hosted page
///
/// Implementations must re-query live page state on every call; the engine
/// never caches an element across actions.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Handle to a resolved element
    type Element: Send + Sync;

    /// Current document URL
    async fn url(&self) -> Result<String, PageError>;

    /// First element matching `selector` in document order
    ///
    /// A malformed selector must return [`PageError::InvalidSelector`].
    async fn query(&self, selector: &str) -> Result<Probe<Self::Element>, PageError>;

    /// Assign the element's underlying value
    async fn set_value(&self, element: &Self::Element, value: &str) -> Result<(), PageError>;

    /// Emit a bubbling notification on the element
    async fn notify(
        &self,
        element: &Self::Element,
        notification: Notification,
    ) -> Result<(), PageError>;

    /// Invoke the element's native activation
    async fn activate(&self, element: &Self::Element) -> Result<(), PageError>;

    /// Scroll the window to absolute coordinates
    async fn scroll_to(&self, x: f64, y: f64) -> Result<(), PageError>;

    /// Scroll the element into view
    async fn scroll_into_view(&self, element: &Self::Element) -> Result<(), PageError>;

    /// Viewport-relative bounding rectangle of the element
    async fn bounds(&self, element: &Self::Element) -> Result<Rect, PageError>;

    /// Viewport size and scroll offsets
    async fn viewport(&self) -> Result<Viewport, PageError>;

    /// Owned copy of the page's interesting structure
    async fn snapshot(&self) -> Result<DomSnapshot, PageError>;

    /// Slot a macro holds for as long as it executes against this page
    ///
    /// Every handle to the same page returns the same slot, so executors
    /// built independently over one page still run one macro at a time.
    fn execution_slot(&self) -> Arc<Mutex<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_event_types() {
        assert_eq!(Notification::Input.event_type(), "input");
        assert_eq!(Notification::Change.event_type(), "change");
    }

    #[test]
    fn test_found_converts_to_option() {
        assert_eq!(Probe::Found(3).found(), Some(3));
        assert_eq!(Probe::<u8>::Missing.found(), None);
    }

    #[test]
    fn test_snapshot_deserializes_from_script_output() {
        let json = r##"{
            "url": "https://example.com/",
            "title": "Example",
            "viewport": {"width": 800, "height": 600, "scrollX": 0, "scrollY": 12.5},
            "elements": [
                {
                    "tag": "input",
                    "attributes": {"id": "q", "required": ""},
                    "text": "",
                    "value": "hi",
                    "form": 0
                }
            ],
            "textBlocks": []
        }"##;

        let snapshot: DomSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.viewport.scroll_y, 12.5);
        assert_eq!(snapshot.elements[0].attr("id"), Some("q"));
        assert!(snapshot.elements[0].has_attr("required"));
        assert_eq!(snapshot.elements[0].form, Some(0));
    }
}
