//! Macro execution
//!
//! [`ActionExecutor`] replays a [`Macro`] against one page, strictly in list
//! order. Each action is fully applied before the next one starts resolving
//! its target. The first fatal failure stops the run and is reported as
//! [`ExecutionOutcome::Aborted`]; effects of earlier actions stay in place.
//! Unrecognized actions are skipped with a warning.
//!
//! Only one macro runs against a page at a time. The admission gate is the
//! page's own [`execution_slot`](PageDriver::execution_slot), so every
//! executor over the same page contends for the same slot.

use super::action::{Action, Macro};
use super::events::EventSynthesizer;
use super::resolver::ElementResolver;
use crate::config::{AdmissionPolicy, EngineConfig, UnrecognizedPolicy};
use crate::error::{EngineError, PageError, ResolutionError, Result};
use crate::page::PageDriver;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Why a macro stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortCause {
    /// A selector found no match within the timeout
    ResolutionTimeout,
    /// A selector could not be parsed
    InvalidSelector,
    /// Applying the action to its resolved target failed
    HandlerFault,
    /// The run was cancelled from outside
    Cancelled,
}

impl AbortCause {
    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortCause::ResolutionTimeout => "ResolutionTimeout",
            AbortCause::InvalidSelector => "InvalidSelector",
            AbortCause::HandlerFault => "HandlerFault",
            AbortCause::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for AbortCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one macro run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionOutcome {
    /// Every action ran; `skipped` lists unrecognized actions
    Completed {
        /// Indices of skipped actions
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        skipped: Vec<usize>,
    },
    /// Every action ran but some were skipped, under `UnrecognizedPolicy::Degrade`
    Partial {
        /// Indices of skipped actions
        skipped: Vec<usize>,
    },
    /// Execution stopped at `at_index`; later actions were not attempted
    Aborted {
        /// Index of the failing action
        #[serde(rename = "atIndex")]
        at_index: usize,
        /// Selector involved in the failure
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Failure class
        cause: AbortCause,
        /// Human-readable detail
        #[serde(default)]
        message: String,
    },
}

impl ExecutionOutcome {
    /// Whether the run finished without aborting
    pub fn is_completed(&self) -> bool {
        !matches!(self, ExecutionOutcome::Aborted { .. })
    }

    /// Index of the aborting action, if any
    pub fn aborted_at(&self) -> Option<usize> {
        match self {
            ExecutionOutcome::Aborted { at_index, .. } => Some(*at_index),
            _ => None,
        }
    }
}

/// A fatal failure inside one action handler
#[derive(Debug)]
struct Fault {
    selector: Option<String>,
    cause: AbortCause,
    message: String,
}

impl Fault {
    fn cancelled() -> Self {
        Self {
            selector: None,
            cause: AbortCause::Cancelled,
            message: "execution cancelled".to_string(),
        }
    }

    fn handler(selector: &str, err: PageError) -> Self {
        Self {
            selector: Some(selector.to_string()),
            cause: AbortCause::HandlerFault,
            message: err.to_string(),
        }
    }

    fn into_outcome(self, at_index: usize) -> ExecutionOutcome {
        ExecutionOutcome::Aborted {
            at_index,
            selector: self.selector,
            cause: self.cause,
            message: self.message,
        }
    }
}

impl From<ResolutionError> for Fault {
    fn from(err: ResolutionError) -> Self {
        let cause = match &err {
            ResolutionError::Timeout { .. } => AbortCause::ResolutionTimeout,
            ResolutionError::InvalidSelector { .. } => AbortCause::InvalidSelector,
            ResolutionError::Cancelled { .. } => AbortCause::Cancelled,
            ResolutionError::Page { .. } => AbortCause::HandlerFault,
        };
        Self {
            selector: Some(err.selector().to_string()),
            cause,
            message: err.to_string(),
        }
    }
}

enum Step {
    Applied,
    Skipped,
}

/// Replays macros against a page
pub struct ActionExecutor<P: PageDriver> {
    page: Arc<P>,
    config: EngineConfig,
    resolver: ElementResolver,
    gate: Arc<Mutex<()>>,
}

impl<P: PageDriver> Clone for ActionExecutor<P> {
    fn clone(&self) -> Self {
        Self {
            page: Arc::clone(&self.page),
            config: self.config.clone(),
            resolver: self.resolver,
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<P: PageDriver> ActionExecutor<P> {
    /// Create an executor for a page
    pub fn new(page: Arc<P>, config: EngineConfig) -> Self {
        let resolver = ElementResolver::new(config.resolve_timeout(), config.poll_interval());
        let gate = page.execution_slot();
        Self {
            page,
            config,
            resolver,
            gate,
        }
    }

    /// The page this executor drives
    pub fn page(&self) -> &Arc<P> {
        &self.page
    }

    /// The engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether a macro is currently executing
    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Execute a macro to completion
    pub async fn execute(&self, actions: Macro) -> Result<ExecutionOutcome> {
        self.execute_with_cancel(actions, &CancellationToken::new())
            .await
    }

    /// Execute a macro, checking `cancel` before each action and at each
    /// resolver poll tick
    ///
    /// Returns `Err(EngineError::Busy)` only when another macro is in flight
    /// and the admission policy is `Reject`.
    #[instrument(
        skip(self, actions, cancel),
        fields(run_id = %Uuid::new_v4(), actions = actions.len())
    )]
    pub async fn execute_with_cancel(
        &self,
        actions: Macro,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        let _slot = match self.admit(cancel).await? {
            Some(slot) => slot,
            None => return Ok(Fault::cancelled().into_outcome(0)),
        };

        info!("Executing macro with {} action(s)", actions.len());
        let started = Instant::now();
        let mut skipped = Vec::new();

        for (index, action) in actions.into_iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Macro cancelled before action {}", index);
                return Ok(Fault::cancelled().into_outcome(index));
            }

            match self.dispatch(&action, cancel).await {
                Ok(Step::Applied) => {
                    debug!("Applied action {} ({})", index, action.kind());
                }
                Ok(Step::Skipped) => {
                    warn!(
                        "Skipping unrecognized action '{}' at index {}",
                        action.kind(),
                        index
                    );
                    skipped.push(index);
                }
                Err(fault) => {
                    warn!(
                        "Macro aborted at action {} ({}): {}",
                        index,
                        fault.cause,
                        fault.message
                    );
                    return Ok(fault.into_outcome(index));
                }
            }
        }

        info!(
            "Macro completed in {}ms ({} skipped)",
            started.elapsed().as_millis(),
            skipped.len()
        );

        Ok(match self.config.unrecognized {
            UnrecognizedPolicy::Degrade if !skipped.is_empty() => {
                ExecutionOutcome::Partial { skipped }
            }
            _ => ExecutionOutcome::Completed { skipped },
        })
    }

    /// Take the single execution slot; `None` means cancelled while queued
    async fn admit(&self, cancel: &CancellationToken) -> Result<Option<MutexGuard<'_, ()>>> {
        match self.config.admission {
            AdmissionPolicy::Reject => match self.gate.try_lock() {
                Ok(slot) => Ok(Some(slot)),
                Err(_) => {
                    warn!("Rejecting macro: another one is in flight");
                    Err(EngineError::Busy.into())
                }
            },
            AdmissionPolicy::Queue => {
                if let Ok(slot) = self.gate.try_lock() {
                    return Ok(Some(slot));
                }
                debug!("Queued behind in-flight macro");
                tokio::select! {
                    slot = self.gate.lock() => Ok(Some(slot)),
                    _ = cancel.cancelled() => Ok(None),
                }
            }
        }
    }

    async fn dispatch(
        &self,
        action: &Action,
        cancel: &CancellationToken,
    ) -> std::result::Result<Step, Fault> {
        let page = self.page.as_ref();
        match action {
            Action::Click { selector } => {
                let target = self.resolver.resolve(page, selector, cancel).await?;
                EventSynthesizer::click(page, &target)
                    .await
                    .map_err(|e| Fault::handler(selector, e))?;
            }
            Action::Type { selector, text } => {
                self.fill_one(selector, text, cancel).await?;
            }
            Action::Select { selector, value } => {
                self.fill_one(selector, value, cancel).await?;
            }
            Action::Fill { fields } => {
                for (selector, value) in fields {
                    if cancel.is_cancelled() {
                        return Err(Fault::cancelled());
                    }
                    self.fill_one(selector, value, cancel).await?;
                }
            }
            Action::Wait { duration_ms } => {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Fault::cancelled()),
                    _ = tokio::time::sleep(Duration::from_millis(*duration_ms)) => {}
                }
            }
            Action::Scroll { selector, x, y } => match selector {
                Some(selector) => {
                    let target = self.resolver.resolve(page, selector, cancel).await?;
                    page.scroll_into_view(&target)
                        .await
                        .map_err(|e| Fault::handler(selector, e))?;
                }
                None => {
                    page.scroll_to(x.unwrap_or(0.0), y.unwrap_or(0.0))
                        .await
                        .map_err(|e| Fault {
                            selector: None,
                            cause: AbortCause::HandlerFault,
                            message: e.to_string(),
                        })?;
                }
            },
            Action::Unrecognized { .. } => return Ok(Step::Skipped),
        }
        Ok(Step::Applied)
    }

    async fn fill_one(
        &self,
        selector: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), Fault> {
        let page = self.page.as_ref();
        let target = self.resolver.resolve(page, selector, cancel).await?;
        EventSynthesizer::apply_value(page, &target, value)
            .await
            .map_err(|e| Fault::handler(selector, e))
    }
}
