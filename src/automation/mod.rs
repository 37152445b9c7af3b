//! Macro automation module
//!
//! This module parses macros returned by the reasoning service and replays
//! them against a page: selector resolution, user-event emulation and
//! sequential execution with structured abort reporting.

pub mod action;
pub mod events;
pub mod executor;
pub mod resolver;

pub use action::{Action, Macro};
pub use events::{EventSynthesizer, VALUE_NOTIFICATIONS};
pub use executor::{AbortCause, ActionExecutor, ExecutionOutcome};
pub use resolver::{ElementResolver, ResolutionResult};
