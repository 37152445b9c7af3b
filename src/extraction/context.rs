//! Page context extraction
//!
//! This module turns a driver's raw [`DomSnapshot`] into a bounded
//! [`PageContext`]: forms, links, buttons and input fields in document order,
//! with every text field truncated and every list capped. The context holds
//! owned copies only and is what gets handed to the reasoning service.

use crate::config::ContextLimits;
use crate::error::{ExtractionError, Result};
use crate::page::{DomSnapshot, PageDriver, RawElement, Viewport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

/// Marker appended to truncated text
pub const ELLIPSIS: char = '…';

/// A field listed under a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Control type (`text`, `password`, `select-one`, `submit`, ...)
    #[serde(rename = "type")]
    pub field_type: String,
    /// Name attribute
    pub name: Option<String>,
    /// Id attribute
    pub id: Option<String>,
    /// Required flag
    pub required: bool,
    /// Current value (never set for password fields)
    pub value: Option<String>,
}

/// A `<form>` and its controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDescriptor {
    /// Id attribute
    pub id: Option<String>,
    /// Name attribute
    pub name: Option<String>,
    /// Action URL as written
    pub action: Option<String>,
    /// Submission method, lowercase (default `get`)
    pub method: String,
    /// Controls owned by the form, in document order
    pub fields: Vec<FieldDescriptor>,
}

/// A hyperlink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDescriptor {
    /// Target, resolved against the page URL when possible
    pub href: String,
    /// Link text
    pub text: String,
    /// Id attribute
    pub id: Option<String>,
    /// Class names
    pub classes: Vec<String>,
}

/// A `<button>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonDescriptor {
    /// Button text
    pub text: String,
    /// Id attribute
    pub id: Option<String>,
    /// Button type (default `submit`)
    #[serde(rename = "type")]
    pub button_type: String,
    /// Disabled flag
    pub disabled: bool,
    /// Class names
    pub classes: Vec<String>,
}

/// An `input`, `textarea` or `select`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    /// Control type
    #[serde(rename = "type")]
    pub input_type: String,
    /// Name attribute
    pub name: Option<String>,
    /// Id attribute
    pub id: Option<String>,
    /// Placeholder attribute
    pub placeholder: Option<String>,
    /// Current value (never set for password fields)
    pub value: Option<String>,
    /// Required flag
    pub required: bool,
    /// Disabled flag
    pub disabled: bool,
}

/// Bounded, serializable snapshot of a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    /// Document URL
    pub url: String,
    /// Document title
    pub title: String,
    /// Forms in document order
    pub forms: Vec<FormDescriptor>,
    /// Links in document order
    pub links: Vec<LinkDescriptor>,
    /// Buttons in document order
    pub buttons: Vec<ButtonDescriptor>,
    /// Inputs, textareas and selects in document order
    pub input_fields: Vec<InputDescriptor>,
    /// Viewport at capture time
    pub viewport: Viewport,
    /// Visible text blocks, joined and truncated
    pub text_excerpt: String,
    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

/// Builds [`PageContext`] values from a page
#[derive(Debug, Clone, Default)]
pub struct ContextExtractor {
    limits: ContextLimits,
}

impl ContextExtractor {
    /// Create an extractor with the given bounds
    pub fn new(limits: ContextLimits) -> Self {
        Self { limits }
    }

    /// Bounds in use
    pub fn limits(&self) -> &ContextLimits {
        &self.limits
    }

    /// Capture the current page
    ///
    /// Reads only; nothing on the page is changed.
    #[instrument(skip(self, page))]
    pub async fn capture<P: PageDriver + ?Sized>(&self, page: &P) -> Result<PageContext> {
        info!("Capturing page context");
        let snapshot = page
            .snapshot()
            .await
            .map_err(|e| ExtractionError::SnapshotFailed(e.to_string()))?;
        let context = self.build(snapshot, Utc::now());
        debug!(
            "Context: {} forms, {} links, {} buttons, {} inputs",
            context.forms.len(),
            context.links.len(),
            context.buttons.len(),
            context.input_fields.len()
        );
        Ok(context)
    }

    /// Build a context from a snapshot
    pub fn build(&self, snapshot: DomSnapshot, captured_at: DateTime<Utc>) -> PageContext {
        let limits = &self.limits;
        let base = Url::parse(&snapshot.url).ok();

        let form_elements: Vec<&RawElement> =
            snapshot.elements.iter().filter(|e| e.tag == "form").collect();
        let mut forms: Vec<FormDescriptor> = form_elements
            .iter()
            .map(|el| FormDescriptor {
                id: self.attr(el, "id"),
                name: self.attr(el, "name"),
                action: self.attr(el, "action"),
                method: el
                    .attr("method")
                    .map(|m| m.trim().to_ascii_lowercase())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "get".to_string()),
                fields: Vec::new(),
            })
            .collect();

        let mut links = Vec::new();
        let mut buttons = Vec::new();
        let mut input_fields = Vec::new();

        for el in &snapshot.elements {
            if let Some(form) = el.form.and_then(|i| forms.get_mut(i)) {
                if is_form_control(&el.tag) && form.fields.len() < limits.max_form_fields {
                    form.fields.push(FieldDescriptor {
                        field_type: control_type(el),
                        name: self.attr(el, "name"),
                        id: self.attr(el, "id"),
                        required: el.has_attr("required"),
                        value: self.value(el),
                    });
                }
            }

            match el.tag.as_str() {
                "a" | "area" if links.len() < limits.max_items => {
                    let Some(href) = el.attr("href") else { continue };
                    links.push(LinkDescriptor {
                        href: truncate(&resolve_href(base.as_ref(), href), limits.max_text_chars),
                        text: truncate(&el.text, limits.max_text_chars),
                        id: self.attr(el, "id"),
                        classes: self.classes(el),
                    });
                }
                "button" if buttons.len() < limits.max_items => {
                    buttons.push(ButtonDescriptor {
                        text: truncate(&el.text, limits.max_text_chars),
                        id: self.attr(el, "id"),
                        button_type: control_type(el),
                        disabled: el.has_attr("disabled"),
                        classes: self.classes(el),
                    });
                }
                "input" | "textarea" | "select" if input_fields.len() < limits.max_items => {
                    input_fields.push(InputDescriptor {
                        input_type: control_type(el),
                        name: self.attr(el, "name"),
                        id: self.attr(el, "id"),
                        placeholder: self.attr(el, "placeholder"),
                        value: self.value(el),
                        required: el.has_attr("required"),
                        disabled: el.has_attr("disabled"),
                    });
                }
                _ => {}
            }
        }

        forms.truncate(limits.max_items);

        PageContext {
            url: truncate(&snapshot.url, limits.max_text_chars),
            title: truncate(&snapshot.title, limits.max_text_chars),
            forms,
            links,
            buttons,
            input_fields,
            viewport: snapshot.viewport,
            text_excerpt: truncate(&snapshot.text_blocks.join("\n"), limits.max_excerpt_chars),
            captured_at,
        }
    }

    fn attr(&self, el: &RawElement, name: &str) -> Option<String> {
        el.attr(name)
            .filter(|v| !v.is_empty())
            .map(|v| truncate(v, self.limits.max_text_chars))
    }

    fn classes(&self, el: &RawElement) -> Vec<String> {
        el.attr("class")
            .map(|c| {
                c.split_whitespace()
                    .take(self.limits.max_items)
                    .map(|class| truncate(class, self.limits.max_text_chars))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn value(&self, el: &RawElement) -> Option<String> {
        if control_type(el) == "password" {
            return None;
        }
        el.value
            .as_deref()
            .map(|v| truncate(v, self.limits.max_text_chars))
    }
}

/// Truncate to at most `max` characters, marking the cut with [`ELLIPSIS`]
///
/// The result never exceeds `max` characters and never splits a character.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max - 1).collect();
    out.push(ELLIPSIS);
    out
}

fn is_form_control(tag: &str) -> bool {
    matches!(tag, "input" | "textarea" | "select" | "button")
}

/// DOM `type` property of a control
fn control_type(el: &RawElement) -> String {
    match el.tag.as_str() {
        "textarea" => "textarea".to_string(),
        "select" if el.has_attr("multiple") => "select-multiple".to_string(),
        "select" => "select-one".to_string(),
        "button" => match el.attr("type").map(str::to_ascii_lowercase).as_deref() {
            Some(t @ ("button" | "reset")) => t.to_string(),
            _ => "submit".to_string(),
        },
        _ => el
            .attr("type")
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "text".to_string()),
    }
}


fn resolve_href(base: Option<&Url>, href: &str) -> String {
    base.and_then(|b| b.join(href).ok())
        .map(String::from)
        .unwrap_or_else(|| href.to_string())
}
