//! CDP page driver
//!
//! [`PageDriver`] for a live Chromium tab. Element handles are remote objects;
//! every operation goes back to the page, so nothing is cached across actions.

use crate::browser::PageHandle;
use crate::error::PageError;
use crate::page::{DomSnapshot, Notification, PageDriver, Probe, Rect, Viewport};
use async_trait::async_trait;
use chromiumoxide::element::Element;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace};

/// Script building a [`DomSnapshot`] in the page
const SNAPSHOT_SCRIPT: &str = r#"
    (() => {
        const forms = Array.from(document.forms);
        const selector = 'form, a[href], area[href], button, input, textarea, select';
        const elements = Array.from(document.querySelectorAll(selector)).map(el => {
            const attributes = {};
            for (const attr of el.attributes) {
                attributes[attr.name] = attr.value;
            }
            const tag = el.tagName.toLowerCase();
            const hasValue = tag === 'input' || tag === 'textarea' || tag === 'select';
            const owner = tag === 'form' ? null : el.form;
            const form = owner ? forms.indexOf(owner) : -1;
            return {
                tag,
                attributes,
                text: (el.innerText || el.textContent || '').trim(),
                value: hasValue ? String(el.value) : null,
                form: form >= 0 ? form : null,
            };
        });

        const textBlocks = [];
        const root = document.body || document.documentElement;
        const walker = document.createTreeWalker(root, NodeFilter.SHOW_TEXT, {
            acceptNode(node) {
                const parent = node.parentElement;
                if (!parent) return NodeFilter.FILTER_REJECT;
                const style = window.getComputedStyle(parent);
                if (style.display === 'none' || style.visibility === 'hidden') {
                    return NodeFilter.FILTER_REJECT;
                }
                return NodeFilter.FILTER_ACCEPT;
            }
        });
        let node;
        while ((node = walker.nextNode())) {
            const text = node.textContent.replace(/\s+/g, ' ').trim();
            if (text.length > 30) textBlocks.push(text);
        }

        return JSON.stringify({
            url: location.href,
            title: document.title,
            viewport: {
                width: window.innerWidth,
                height: window.innerHeight,
                scrollX: window.scrollX,
                scrollY: window.scrollY,
            },
            elements,
            textBlocks,
        });
    })()
"#;

const VIEWPORT_SCRIPT: &str = r#"
    JSON.stringify({
        width: window.innerWidth,
        height: window.innerHeight,
        scrollX: window.scrollX,
        scrollY: window.scrollY,
    })
"#;

impl PageHandle {
    async fn eval_json<T: DeserializeOwned>(&self, script: &str) -> Result<T, PageError> {
        let raw: String = self
            .page
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|e| PageError::Script(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| PageError::Script(e.to_string()))
    }

    /// Run `body` as a function with `this` bound to the element
    async fn call_on(&self, element: &Element, body: &str) -> Result<Option<String>, PageError> {
        let returns = element
            .call_js_fn(format!("function() {{ {} }}", body), false)
            .await
            .map_err(|e| detached_or_script(e.to_string()))?;
        if let Some(details) = returns.exception_details {
            return Err(PageError::Script(details.text));
        }
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_str().map(str::to_string)))
    }
}

fn detached_or_script(message: String) -> PageError {
    if message.contains("No node") || message.contains("Could not find object") {
        PageError::Detached
    } else {
        PageError::Script(message)
    }
}

fn js_string(value: &str) -> String {
    // serde_json's string encoding is a valid JS string literal
    serde_json::Value::String(value.to_string()).to_string()
}

#[async_trait]
impl PageDriver for PageHandle {
    type Element = Element;

    async fn url(&self) -> Result<String, PageError> {
        match self.page.url().await? {
            Some(url) => Ok(url),
            None => Ok(self.last_url()),
        }
    }

    #[instrument(skip(self))]
    async fn query(&self, selector: &str) -> Result<Probe<Element>, PageError> {
        let probe = format!(
            r#"
            (() => {{
                try {{
                    return document.querySelector({}) ? 'found' : 'missing';
                }} catch (e) {{
                    return 'invalid:' + e.message;
                }}
            }})()
            "#,
            js_string(selector)
        );
        let status: String = self
            .page
            .evaluate(probe)
            .await?
            .into_value()
            .map_err(|e| PageError::Script(e.to_string()))?;

        if let Some(reason) = status.strip_prefix("invalid:") {
            return Err(PageError::InvalidSelector {
                selector: selector.to_string(),
                reason: reason.to_string(),
            });
        }
        if status != "found" {
            trace!("No match for {}", selector);
            return Ok(Probe::Missing);
        }

        // The element can vanish between the probe and the lookup
        match self.page.find_element(selector).await {
            Ok(element) => Ok(Probe::Found(element)),
            Err(e) => {
                debug!("Element {} disappeared before lookup: {}", selector, e);
                Ok(Probe::Missing)
            }
        }
    }

    async fn set_value(&self, element: &Element, value: &str) -> Result<(), PageError> {
        let body = format!(
            r#"
            const tag = this.tagName.toLowerCase();
            if (tag !== 'input' && tag !== 'textarea' && tag !== 'select') {{
                return 'not-editable:' + tag;
            }}
            this.value = {};
            return 'ok';
            "#,
            js_string(value)
        );
        match self.call_on(element, &body).await? {
            Some(status) => match status.strip_prefix("not-editable:") {
                Some(tag) => Err(PageError::NotEditable {
                    tag: tag.to_string(),
                }),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    async fn notify(&self, element: &Element, notification: Notification) -> Result<(), PageError> {
        let body = format!(
            "this.dispatchEvent(new Event({}, {{ bubbles: true }}));",
            js_string(notification.event_type())
        );
        self.call_on(element, &body).await?;
        Ok(())
    }

    async fn activate(&self, element: &Element) -> Result<(), PageError> {
        self.call_on(element, "this.click();").await?;
        Ok(())
    }

    async fn scroll_to(&self, x: f64, y: f64) -> Result<(), PageError> {
        let script = format!("window.scrollTo({{ left: {}, top: {} }});", x, y);
        self.page.evaluate(script).await?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: &Element) -> Result<(), PageError> {
        element
            .scroll_into_view()
            .await
            .map_err(|e| detached_or_script(e.to_string()))?;
        Ok(())
    }

    async fn bounds(&self, element: &Element) -> Result<Rect, PageError> {
        let raw = self
            .call_on(
                element,
                r#"
                const r = this.getBoundingClientRect();
                return JSON.stringify({ x: r.x, y: r.y, width: r.width, height: r.height });
                "#,
            )
            .await?
            .ok_or_else(|| PageError::Script("bounding rect unavailable".to_string()))?;
        serde_json::from_str(&raw).map_err(|e| PageError::Script(e.to_string()))
    }

    async fn viewport(&self) -> Result<Viewport, PageError> {
        self.eval_json(VIEWPORT_SCRIPT).await
    }

    #[instrument(skip(self))]
    async fn snapshot(&self) -> Result<DomSnapshot, PageError> {
        let snapshot: DomSnapshot = self.eval_json(SNAPSHOT_SCRIPT).await?;
        debug!(
            "Snapshot of {}: {} elements, {} text blocks",
            snapshot.url,
            snapshot.elements.len(),
            snapshot.text_blocks.len()
        );
        Ok(snapshot)
    }

    fn execution_slot(&self) -> Arc<Mutex<()>> {
        self.slot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("plain"), "\"plain\"");
        assert_eq!(js_string(r#"a"b\c"#), r#""a\"b\\c""#);
        assert_eq!(js_string("line\nbreak"), "\"line\\nbreak\"");
    }

    #[test]
    fn test_detached_classification() {
        assert_eq!(
            detached_or_script("No node with given id found".to_string()),
            PageError::Detached
        );
        assert!(matches!(
            detached_or_script("boom".to_string()),
            PageError::Script(_)
        ));
    }
}
