//! Selector resolution with delayed appearance
//!
//! The resolver checks for a match immediately and then re-checks on a fixed
//! interval until the element shows up or the timeout elapses. Each wait is a
//! tokio sleep raced against the cancellation token, so the task yields
//! instead of spinning.

use crate::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESOLVE_TIMEOUT_MS};
use crate::error::{PageError, ResolutionError};
use crate::page::{PageDriver, Probe};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Resolved element or the reason none was found
pub type ResolutionResult<E> = std::result::Result<E, ResolutionError>;

/// Turns selectors into element handles, tolerating late appearance
#[derive(Debug, Clone, Copy)]
pub struct ElementResolver {
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for ElementResolver {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_RESOLVE_TIMEOUT_MS),
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        )
    }
}

impl ElementResolver {
    /// Create a resolver with a timeout and polling interval
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Default timeout of this resolver
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Polling interval of this resolver
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Resolve with the resolver's default timeout
    pub async fn resolve<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        selector: &str,
        cancel: &CancellationToken,
    ) -> ResolutionResult<P::Element> {
        self.resolve_within(page, selector, self.timeout, cancel)
            .await
    }

    /// Resolve with an explicit timeout
    ///
    /// Fails with `Timeout` no earlier than `timeout` and no later than one
    /// polling interval after it. A malformed selector fails on the first
    /// check.
    #[instrument(skip(self, page, cancel), fields(timeout_ms = timeout.as_millis() as u64))]
    pub async fn resolve_within<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        selector: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ResolutionResult<P::Element> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(ResolutionError::Cancelled {
                    selector: selector.to_string(),
                });
            }

            attempts += 1;
            match page.query(selector).await {
                Ok(Probe::Found(element)) => {
                    debug!(
                        "Resolved '{}' after {} attempt(s), {}ms",
                        selector,
                        attempts,
                        start.elapsed().as_millis()
                    );
                    return Ok(element);
                }
                Ok(Probe::Missing) => {}
                Err(PageError::InvalidSelector { reason, .. }) => {
                    return Err(ResolutionError::InvalidSelector {
                        selector: selector.to_string(),
                        reason,
                    });
                }
                Err(source) => {
                    return Err(ResolutionError::Page {
                        selector: selector.to_string(),
                        source,
                    });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ResolutionError::Timeout {
                    selector: selector.to_string(),
                    waited_ms: now.duration_since(start).as_millis() as u64,
                });
            }

            let nap = self.poll_interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ResolutionError::Cancelled {
                        selector: selector.to_string(),
                    });
                }
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::DocumentPage;
    use std::sync::Arc;

    const PAGE: &str = r#"<html><body><ul>
        <li class="item">one</li><li class="item">two</li>
    </ul></body></html>"#;

    #[tokio::test(start_paused = true)]
    async fn test_immediate_match_does_not_wait() {
        let page = DocumentPage::new(PAGE);
        let start = Instant::now();
        let el = ElementResolver::default()
            .resolve(&page, ".item", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        // <html>, <head>, <body>, <ul>, first <li>
        assert_eq!(el.ordinal(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_window() {
        let page = DocumentPage::new(PAGE);
        let resolver = ElementResolver::new(Duration::from_millis(250), Duration::from_millis(100));
        let start = Instant::now();
        let err = resolver
            .resolve(&page, "#missing", &CancellationToken::new())
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed <= Duration::from_millis(350));
        match err {
            ResolutionError::Timeout {
                selector,
                waited_ms,
            } => {
                assert_eq!(selector, "#missing");
                assert!(waited_ms >= 250);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_selector_fails_fast() {
        let page = DocumentPage::new(PAGE);
        let start = Instant::now();
        let err = ElementResolver::default()
            .resolve(&page, "li[", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidSelector { .. }));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_element_is_found_on_next_tick() {
        let page = Arc::new(DocumentPage::new(PAGE));
        let writer = Arc::clone(&page);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            writer.append_html(r#"<button id="late">Go</button>"#);
        });

        let start = Instant::now();
        ElementResolver::default()
            .resolve(page.as_ref(), "#late", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_wait() {
        let page = DocumentPage::new(PAGE);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = ElementResolver::default()
            .resolve(&page, "#never", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Cancelled { .. }));
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
