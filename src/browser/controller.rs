//! Browser lifecycle
//!
//! Launches one Chromium instance for a live session and opens the pages
//! macros run against. Each [`PageHandle`] carries the execution slot that
//! admission control locks, so clones of a handle share it.

use crate::error::{BrowserError, Error, Result};
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::handler::viewport::Viewport as WindowViewport;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// How long `close` waits for the CDP event loop to drain
const HANDLER_DRAIN: Duration = Duration::from_secs(5);

/// Settings for the browser behind a live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Launch without a window
    pub headless: bool,
    /// Window width in CSS pixels, which is also the capture viewport width
    pub window_width: u32,
    /// Window height in CSS pixels
    pub window_height: u32,
    /// Keep Chromium's sandbox enabled
    pub sandbox: bool,
    /// Budget for each navigation attempt
    pub navigation_timeout_ms: u64,
    /// Chromium executable; auto-detected when unset
    pub chrome_path: Option<PathBuf>,
    /// Extra command-line switches passed through verbatim
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 720,
            sandbox: true,
            navigation_timeout_ms: 30_000,
            chrome_path: None,
            extra_args: Vec::new(),
        }
    }
}

impl BrowserConfig {
    fn launch_config(&self) -> Result<LaunchConfig> {
        let mut builder = LaunchConfig::builder().viewport(WindowViewport {
            width: self.window_width,
            height: self.window_height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: self.window_width >= self.window_height,
            has_touch: false,
        });
        if !self.headless {
            builder = builder.with_head();
        }
        if !self.sandbox {
            builder = builder.arg("--no-sandbox");
        }
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        builder = builder.args(self.extra_args.iter());

        builder
            .build()
            .map_err(|e| BrowserError::ConfigError(e).into())
    }
}

/// A browser tab macros can run against
///
/// This is the CDP implementation of [`PageDriver`](crate::page::PageDriver).
#[derive(Clone)]
pub struct PageHandle {
    pub(crate) page: Page,
    committed_url: Arc<parking_lot::Mutex<String>>,
    slot: Arc<Mutex<()>>,
}

impl PageHandle {
    fn new(page: Page) -> Self {
        Self {
            page,
            committed_url: Arc::new(parking_lot::Mutex::new("about:blank".to_string())),
            slot: Arc::new(Mutex::new(())),
        }
    }

    /// URL of the last navigation that committed on this tab
    pub fn last_url(&self) -> String {
        self.committed_url.lock().clone()
    }

    pub(crate) fn record_url(&self, url: String) {
        *self.committed_url.lock() = url;
    }

    pub(crate) fn slot(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.slot)
    }
}

/// Owns the launched browser and its CDP event loop
pub struct BrowserController {
    browser: Browser,
    events: JoinHandle<()>,
    navigation_timeout_ms: u64,
}

impl BrowserController {
    /// Launch Chromium with `config`
    #[instrument(skip(config), fields(headless = config.headless))]
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        let (browser, mut handler) = Browser::launch(config.launch_config()?)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP event loop stopped: {}", e);
                    break;
                }
            }
            debug!("CDP event loop finished");
        });

        info!(
            "Browser launched ({}x{})",
            config.window_width, config.window_height
        );
        Ok(Self {
            browser,
            events,
            navigation_timeout_ms: config.navigation_timeout_ms,
        })
    }

    /// Open a fresh tab and load `url` into it
    #[instrument(skip(self))]
    pub async fn open(&self, url: &str) -> Result<PageHandle> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;
        let handle = PageHandle::new(page);

        let options = super::navigation::NavigationOptions {
            timeout_ms: self.navigation_timeout_ms,
            ..Default::default()
        };
        super::navigation::PageNavigator::goto(&handle, url, Some(options)).await?;
        Ok(handle)
    }

    /// Shut the browser down and wait briefly for its event loop
    #[instrument(skip(self))]
    pub async fn close(mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;
        if tokio::time::timeout(HANDLER_DRAIN, self.events).await.is_err() {
            warn!("CDP event loop did not finish within {:?}", HANDLER_DRAIN);
        }
        info!("Browser closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_capture_viewport() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert!(config.sandbox);
        assert_eq!((config.window_width, config.window_height), (1280, 720));
        assert_eq!(config.navigation_timeout_ms, 30_000);
        assert!(config.chrome_path.is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: BrowserConfig = serde_json::from_str(
            r#"{"headless": false, "chromePath": "/opt/chromium", "extraArgs": ["--mute-audio"]}"#,
        )
        .unwrap();

        assert_eq!(
            config,
            BrowserConfig {
                headless: false,
                chrome_path: Some(PathBuf::from("/opt/chromium")),
                extra_args: vec!["--mute-audio".to_string()],
                ..BrowserConfig::default()
            }
        );
    }

    #[test]
    fn test_camel_case_wire_names() {
        let value = serde_json::to_value(BrowserConfig::default()).unwrap();
        assert_eq!(value["navigationTimeoutMs"], 30_000);
        assert_eq!(value["windowWidth"], 1280);
        assert!(value["chromePath"].is_null());
    }
}
