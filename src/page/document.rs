//! Offline page backed by an HTML document
//!
//! [`DocumentPage`] parses its HTML with `scraper` on every query, so it always
//! answers from the current document state. Form values, scroll position and
//! element layout live in overlays next to the source, and every side effect
//! the engine produces is appended to a journal that callers can inspect.

use super::{DomSnapshot, Notification, PageDriver, Probe, RawElement, Rect, Viewport};
use crate::error::PageError;
use async_trait::async_trait;
use parking_lot::RwLock;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Tags reported in a [`DomSnapshot`]
const SNAPSHOT_TAGS: &[&str] = &[
    "form", "a", "area", "button", "input", "textarea", "select",
];

/// Tags whose text never counts as visible page text
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Minimum trimmed length for a text node to count as a text block
const MIN_TEXT_BLOCK_CHARS: usize = 31;

/// Handle to an element of a [`DocumentPage`]
///
/// Handles are invalidated when the document is replaced with
/// [`DocumentPage::set_html`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    ordinal: usize,
    generation: u64,
}

impl NodeRef {
    /// Position of the element among all elements in document order
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// A side effect applied to the page
#[derive(Debug, Clone, PartialEq)]
pub struct PageEffect {
    /// Monotonic sequence number, strictly increasing across the journal
    pub seq: u64,
    /// Time the effect was applied
    pub at: Instant,
    /// Ordinal of the target element, `None` for window-level effects
    pub target: Option<usize>,
    /// What happened
    pub kind: EffectKind,
}

/// Kind of a journaled side effect
#[derive(Debug, Clone, PartialEq)]
pub enum EffectKind {
    /// Underlying value assigned
    ValueSet(String),
    /// Notification dispatched
    Notified {
        /// Which notification
        notification: Notification,
        /// Whether it bubbles to ancestors
        bubbles: bool,
    },
    /// Native activation invoked
    Activated,
    /// Window scrolled to coordinates
    Scrolled {
        /// Horizontal offset
        x: f64,
        /// Vertical offset
        y: f64,
    },
    /// Element scrolled into view
    ScrolledIntoView,
}

#[derive(Debug)]
struct DocumentState {
    url: String,
    html: String,
    generation: u64,
    values: HashMap<usize, String>,
    layout: HashMap<usize, Rect>,
    viewport: Viewport,
    journal: Vec<PageEffect>,
    next_seq: u64,
}

impl DocumentState {
    fn record(&mut self, target: Option<usize>, kind: EffectKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.journal.push(PageEffect {
            seq,
            at: Instant::now(),
            target,
            kind,
        });
    }
}

/// Parsed view of the document, alive only inside a synchronous call
struct Parsed {
    html: Html,
}

impl Parsed {
    fn new(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// Every element in document order, the document element first
    fn elements(&self) -> Vec<ElementRef<'_>> {
        self.html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .collect()
    }

    fn element(&self, ordinal: usize) -> Option<ElementRef<'_>> {
        self.html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .nth(ordinal)
    }

    fn ordinal_of(&self, el: &ElementRef<'_>) -> Option<usize> {
        self.html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .position(|candidate| candidate.id() == el.id())
    }

    fn first_match(&self, selector: &str) -> Result<Option<usize>, PageError> {
        let parsed = Selector::parse(selector).map_err(|e| PageError::InvalidSelector {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self
            .html
            .select(&parsed)
            .next()
            .and_then(|el| self.ordinal_of(&el)))
    }
}

/// HTML-backed page with a value overlay and an effect journal
#[derive(Debug)]
pub struct DocumentPage {
    state: RwLock<DocumentState>,
    slot: Arc<Mutex<()>>,
}

impl DocumentPage {
    /// Create a page from an HTML document
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(DocumentState {
                url: "about:blank".to_string(),
                html: html.into(),
                generation: 0,
                values: HashMap::new(),
                layout: HashMap::new(),
                viewport: Viewport::default(),
                journal: Vec::new(),
                next_seq: 0,
            }),
            slot: Arc::new(Mutex::new(())),
        }
    }

    /// Set the document URL
    pub fn with_url(self, url: impl Into<String>) -> Self {
        self.state.write().url = url.into();
        self
    }

    /// Set the viewport
    pub fn with_viewport(self, viewport: Viewport) -> Self {
        self.state.write().viewport = viewport;
        self
    }

    /// Insert markup at the end of `<body>`
    ///
    /// Elements already in the document keep their handles, values and
    /// layout. The source is normalized first so that stray markup after
    /// `</body>` sits inside the body and the fragment lands after it.
    pub fn append_html(&self, fragment: &str) {
        let mut state = self.state.write();
        let mut normalized = Html::parse_document(&state.html).html();
        let at = normalized.rfind("</body>").unwrap_or(normalized.len());
        normalized.insert_str(at, fragment);
        state.html = normalized;
        debug!("Appended {} bytes to document", fragment.len());
    }

    /// Replace the whole document
    ///
    /// Values, layout and previously resolved handles are discarded.
    pub fn set_html(&self, html: impl Into<String>) {
        let mut state = self.state.write();
        state.html = html.into();
        state.generation += 1;
        state.values.clear();
        state.layout.clear();
    }

    /// Assign a layout rectangle to the first element matching `selector`
    ///
    /// Returns `false` when nothing matches.
    pub fn set_layout(&self, selector: &str, rect: Rect) -> Result<bool, PageError> {
        let mut state = self.state.write();
        let ordinal = Parsed::new(&state.html).first_match(selector)?;
        match ordinal {
            Some(ordinal) => {
                state.layout.insert(ordinal, rect);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Current value of the first element matching `selector`
    pub fn value_of(&self, selector: &str) -> Option<String> {
        let state = self.state.read();
        let parsed = Parsed::new(&state.html);
        let ordinal = parsed.first_match(selector).ok()??;
        if let Some(value) = state.values.get(&ordinal) {
            return Some(value.clone());
        }
        parsed.element(ordinal).and_then(|el| initial_value(&el))
    }

    /// All journaled effects, oldest first
    pub fn effects(&self) -> Vec<PageEffect> {
        self.state.read().journal.clone()
    }

    /// Journaled effects targeting the first element matching `selector`
    pub fn effects_for(&self, selector: &str) -> Vec<PageEffect> {
        let state = self.state.read();
        let ordinal = match Parsed::new(&state.html).first_match(selector) {
            Ok(Some(ordinal)) => ordinal,
            _ => return Vec::new(),
        };
        state
            .journal
            .iter()
            .filter(|e| e.target == Some(ordinal))
            .cloned()
            .collect()
    }

    /// Drop the journal
    pub fn clear_effects(&self) {
        self.state.write().journal.clear();
    }

    fn query_sync(&self, selector: &str) -> Result<Probe<NodeRef>, PageError> {
        let state = self.state.read();
        let found = Parsed::new(&state.html).first_match(selector)?;
        Ok(match found {
            Some(ordinal) => Probe::Found(NodeRef {
                ordinal,
                generation: state.generation,
            }),
            None => Probe::Missing,
        })
    }

    /// Run `f` against a live element, journaling whatever it returns
    fn apply<F>(&self, node: &NodeRef, f: F) -> Result<(), PageError>
    where
        F: FnOnce(&ElementRef<'_>, &mut DocumentState) -> Result<Option<EffectKind>, PageError>,
    {
        let mut state = self.state.write();
        if node.generation != state.generation {
            return Err(PageError::Detached);
        }
        let parsed = Parsed::new(&state.html);
        let el = parsed.element(node.ordinal).ok_or(PageError::Detached)?;
        if let Some(kind) = f(&el, &mut state)? {
            state.record(Some(node.ordinal), kind);
        }
        Ok(())
    }

    fn bounds_sync(&self, node: &NodeRef) -> Result<Rect, PageError> {
        let state = self.state.read();
        if node.generation != state.generation {
            return Err(PageError::Detached);
        }
        if let Some(rect) = state.layout.get(&node.ordinal) {
            return Ok(*rect);
        }
        // The document element spans the viewport; anything without layout
        // reports an empty box, like an element that is not rendered.
        if node.ordinal == 0 {
            let vp = state.viewport;
            return Ok(Rect::new(0.0, 0.0, vp.width as f64, vp.height as f64));
        }
        Ok(Rect::default())
    }

    fn snapshot_sync(&self) -> DomSnapshot {
        let state = self.state.read();
        let parsed = Parsed::new(&state.html);
        let root = parsed.html.root_element();

        let title = root
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "title")
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default();

        let all = parsed.elements();
        let forms: Vec<ElementRef<'_>> = all
            .iter()
            .filter(|el| el.value().name() == "form")
            .copied()
            .collect();
        let form_ids: HashMap<&str, usize> = forms
            .iter()
            .enumerate()
            .filter_map(|(i, form)| form.value().attr("id").map(|id| (id, i)))
            .collect();

        let mut elements = Vec::new();
        for (ordinal, el) in all.iter().enumerate() {
            let tag = el.value().name();
            if !SNAPSHOT_TAGS.contains(&tag) {
                continue;
            }
            if matches!(tag, "a" | "area") && el.value().attr("href").is_none() {
                continue;
            }

            let attributes: BTreeMap<String, String> = el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();

            let form = if tag == "form" {
                None
            } else if let Some(owner) = el.value().attr("form") {
                form_ids.get(owner).copied()
            } else {
                el.ancestors()
                    .find(|n| n.value().as_element().map(|e| e.name()) == Some("form"))
                    .and_then(|n| forms.iter().position(|f| f.id() == n.id()))
            };

            let value = state
                .values
                .get(&ordinal)
                .cloned()
                .or_else(|| initial_value(el));

            elements.push(RawElement {
                tag: tag.to_string(),
                attributes,
                text: collapse_whitespace(&el.text().collect::<String>()),
                value,
                form,
            });
        }

        let text_blocks = root
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "body")
            .map(|body| {
                body.descendants()
                    .filter_map(|node| match node.value() {
                        Node::Text(text) => {
                            let visible = node.ancestors().all(|a| {
                                a.value().as_element().map_or(true, |e| {
                                    !INVISIBLE_TAGS.contains(&e.name())
                                        && e.attr("hidden").is_none()
                                })
                            });
                            let trimmed = text.trim();
                            (visible && trimmed.chars().count() >= MIN_TEXT_BLOCK_CHARS)
                                .then(|| trimmed.to_string())
                        }
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        DomSnapshot {
            url: state.url.clone(),
            title,
            viewport: state.viewport,
            elements,
            text_blocks,
        }
    }
}

/// Value an element carries before any assignment
fn initial_value(el: &ElementRef<'_>) -> Option<String> {
    match el.value().name() {
        "input" => Some(el.value().attr("value").unwrap_or_default().to_string()),
        "textarea" => Some(el.text().collect()),
        "select" => {
            let options: Vec<ElementRef<'_>> = el
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|o| o.value().name() == "option")
                .collect();
            let chosen = options
                .iter()
                .find(|o| o.value().attr("selected").is_some())
                .or_else(|| options.first());
            Some(chosen.map(option_value).unwrap_or_default())
        }
        _ => None,
    }
}

fn option_value(option: &ElementRef<'_>) -> String {
    option
        .value()
        .attr("value")
        .map(str::to_string)
        .unwrap_or_else(|| collapse_whitespace(&option.text().collect::<String>()))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl PageDriver for DocumentPage {
    type Element = NodeRef;

    async fn url(&self) -> Result<String, PageError> {
        Ok(self.state.read().url.clone())
    }

    async fn query(&self, selector: &str) -> Result<Probe<NodeRef>, PageError> {
        self.query_sync(selector)
    }

    async fn set_value(&self, element: &NodeRef, value: &str) -> Result<(), PageError> {
        self.apply(element, |el, state| {
            let stored = match el.value().name() {
                "input" | "textarea" => value.to_string(),
                // Unknown option values leave the select with no selection
                "select" => {
                    let known = el
                        .descendants()
                        .filter_map(ElementRef::wrap)
                        .filter(|o| o.value().name() == "option")
                        .any(|o| option_value(&o) == value);
                    if known {
                        value.to_string()
                    } else {
                        String::new()
                    }
                }
                other => {
                    return Err(PageError::NotEditable {
                        tag: other.to_string(),
                    })
                }
            };
            state.values.insert(element.ordinal, stored.clone());
            Ok(Some(EffectKind::ValueSet(stored)))
        })
    }

    async fn notify(&self, element: &NodeRef, notification: Notification) -> Result<(), PageError> {
        self.apply(element, |_, _| {
            Ok(Some(EffectKind::Notified {
                notification,
                bubbles: true,
            }))
        })
    }

    async fn activate(&self, element: &NodeRef) -> Result<(), PageError> {
        self.apply(element, |_, _| Ok(Some(EffectKind::Activated)))
    }

    async fn scroll_to(&self, x: f64, y: f64) -> Result<(), PageError> {
        let mut state = self.state.write();
        state.viewport.scroll_x = x.max(0.0);
        state.viewport.scroll_y = y.max(0.0);
        state.record(None, EffectKind::Scrolled { x, y });
        Ok(())
    }

    async fn scroll_into_view(&self, element: &NodeRef) -> Result<(), PageError> {
        self.apply(element, |_, state| {
            if let Some(rect) = state.layout.get(&element.ordinal).copied() {
                state.viewport.scroll_y = (state.viewport.scroll_y + rect.y).max(0.0);
            }
            Ok(Some(EffectKind::ScrolledIntoView))
        })
    }

    async fn bounds(&self, element: &NodeRef) -> Result<Rect, PageError> {
        self.bounds_sync(element)
    }

    async fn viewport(&self) -> Result<Viewport, PageError> {
        Ok(self.state.read().viewport)
    }

    async fn snapshot(&self) -> Result<DomSnapshot, PageError> {
        Ok(self.snapshot_sync())
    }

    fn execution_slot(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.slot)
    }
}
