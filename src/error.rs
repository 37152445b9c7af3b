//! Error types for ReasonKit Macro
//!
//! This module provides the error hierarchy used across the engine. Each
//! component owns a `thiserror` enum and [`Error`] wraps them all.

use thiserror::Error;

/// The main error type for ReasonKit Macro operations
#[derive(Error, Debug)]
pub enum Error {
    /// Browser-related errors
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Navigation errors
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// Page access errors
    #[error("Page error: {0}")]
    Page(#[from] PageError),

    /// Selector resolution errors
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Macro parsing errors
    #[error("Macro error: {0}")]
    Macro(#[from] MacroError),

    /// Context extraction errors
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Region capture errors
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Engine admission errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Browser lifecycle and control errors
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Failed to launch browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Browser configuration error
    #[error("Invalid browser configuration: {0}")]
    ConfigError(String),

    /// Failed to create new page/tab
    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),
}

/// Navigation errors
#[derive(Error, Debug)]
pub enum NavigationError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Navigation timeout
    #[error("Navigation timed out after {0}ms")]
    Timeout(u64),

    /// Page load failed
    #[error("Page load failed: {0}")]
    LoadFailed(String),
}

/// Errors raised by a [`PageDriver`](crate::page::PageDriver) while reading
/// or mutating the page
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PageError {
    /// The selector could not be parsed
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector {
        /// Selector as given
        selector: String,
        /// Parser message
        reason: String,
    },

    /// The element does not carry a value (not an input, textarea or select)
    #[error("<{tag}> does not accept a value")]
    NotEditable {
        /// Lowercase tag name of the target
        tag: String,
    },

    /// The element was removed from the page after it was resolved
    #[error("Element is no longer attached to the page")]
    Detached,

    /// Script evaluation or protocol failure
    #[error("Script failed: {0}")]
    Script(String),
}

/// Selector resolution failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    /// No match appeared within the timeout window
    #[error("Timed out after {waited_ms}ms waiting for '{selector}'")]
    Timeout {
        /// Selector that never matched
        selector: String,
        /// Time actually spent waiting
        waited_ms: u64,
    },

    /// Malformed selector, reported without waiting
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector {
        /// Selector as given
        selector: String,
        /// Parser message
        reason: String,
    },

    /// The cancellation token fired while waiting
    #[error("Resolution of '{selector}' cancelled")]
    Cancelled {
        /// Selector being resolved
        selector: String,
    },

    /// The page failed while being queried
    #[error("Query for '{selector}' failed: {source}")]
    Page {
        /// Selector being resolved
        selector: String,
        /// Underlying page failure
        source: PageError,
    },
}

impl ResolutionError {
    /// Selector involved in the failure
    pub fn selector(&self) -> &str {
        match self {
            ResolutionError::Timeout { selector, .. }
            | ResolutionError::InvalidSelector { selector, .. }
            | ResolutionError::Cancelled { selector }
            | ResolutionError::Page { selector, .. } => selector,
        }
    }
}

/// Macro parsing errors
#[derive(Error, Debug)]
pub enum MacroError {
    /// Input is not valid JSON
    #[error("Macro is not valid JSON: {0}")]
    Parse(String),

    /// Input is neither an array nor an object with an `actions` array
    #[error("Macro must be an array of actions or an object with an 'actions' array")]
    NotAList,

    /// A known action tag with missing or mistyped fields
    #[error("Action {index} is invalid: {reason}")]
    InvalidAction {
        /// Position of the action in the macro
        index: usize,
        /// What was wrong with it
        reason: String,
    },
}

/// Context extraction errors
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Snapshot of the page could not be taken
    #[error("Snapshot failed: {0}")]
    SnapshotFailed(String),
}

/// Region capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Requested rectangle is not usable
    #[error("Invalid capture region: {0}")]
    InvalidRegion(String),

    /// Target element could not be resolved
    #[error("Capture target not resolved: {0}")]
    Unresolved(#[from] ResolutionError),

    /// Bounds of the target could not be read
    #[error("Failed to read bounds: {0}")]
    Bounds(PageError),

    /// Pixel acquisition failed
    #[error("Screenshot capture failed: {0}")]
    ScreenshotFailed(String),
}

/// Engine admission errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Another macro is in flight and the admission policy rejects
    #[error("Another macro is already executing against this page")]
    Busy,
}

/// Result type alias for ReasonKit Macro operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }

    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for PageError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        PageError::Script(err.to_string())
    }
}
