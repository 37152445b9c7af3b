//! Engine configuration
//!
//! [`EngineConfig`] gathers the timing, admission and bounding knobs of the
//! engine. It can be built in code, through [`EngineConfig::builder`], or
//! loaded from JSON.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default selector resolution timeout in milliseconds
pub const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 5000;

/// Default resolver polling interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// What to do when a macro arrives while another one is executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionPolicy {
    /// Wait for the in-flight macro, first come first served
    #[default]
    Queue,
    /// Fail immediately with `EngineError::Busy`
    Reject,
}

/// How skipped `Unrecognized` actions affect the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnrecognizedPolicy {
    /// Report `Completed`, listing the skipped indices
    #[default]
    Skip,
    /// Report `Partial` whenever an action was skipped
    Degrade,
}

/// Bounds applied to a page context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextLimits {
    /// Maximum characters in any text field
    pub max_text_chars: usize,
    /// Maximum entries in each descriptor list
    pub max_items: usize,
    /// Maximum fields listed per form
    pub max_form_fields: usize,
    /// Maximum characters in the page text excerpt
    pub max_excerpt_chars: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_text_chars: 200,
            max_items: 100,
            max_form_fields: 50,
            max_excerpt_chars: 2000,
        }
    }
}

/// Configuration for the macro engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Selector resolution timeout in milliseconds (default: 5000)
    pub resolve_timeout_ms: u64,
    /// Resolver polling interval in milliseconds (default: 100)
    pub poll_interval_ms: u64,
    /// Admission policy for concurrent macros (default: queue)
    pub admission: AdmissionPolicy,
    /// Outcome policy for unrecognized actions (default: skip)
    pub unrecognized: UnrecognizedPolicy,
    /// Context bounds
    pub limits: ContextLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: DEFAULT_RESOLVE_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            admission: AdmissionPolicy::default(),
            unrecognized: UnrecognizedPolicy::default(),
            limits: ContextLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new config builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load a config from a JSON file; missing keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Resolution timeout as a `Duration`
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    /// Polling interval as a `Duration`, never zero
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Builder for EngineConfig
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the resolution timeout
    pub fn resolve_timeout_ms(mut self, ms: u64) -> Self {
        self.config.resolve_timeout_ms = ms;
        self
    }

    /// Set the polling interval
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the admission policy
    pub fn admission(mut self, policy: AdmissionPolicy) -> Self {
        self.config.admission = policy;
        self
    }

    /// Set the unrecognized-action policy
    pub fn unrecognized(mut self, policy: UnrecognizedPolicy) -> Self {
        self.config.unrecognized = policy;
        self
    }

    /// Set the context limits
    pub fn limits(mut self, limits: ContextLimits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Build the config
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
