//! ReasonKit Macro - Page Automation Engine
//!
//! This crate runs declarative action macros against a hosted web page,
//! summarizes that page for a reasoning service, and computes capture
//! regions for visual snapshots.
//!
//! # Features
//!
//! - **Macro Execution**: Ordered click/type/select/wait/scroll/fill actions
//!   with a structured outcome instead of a bare success flag
//! - **Element Resolution**: Bounded waits for elements that appear late
//! - **Context Extraction**: Forms, links, buttons and inputs as bounded JSON
//! - **Region Capture**: Bounds for selectors, rectangles or the full page
//! - **Two Drivers**: Live Chromium pages over CDP, or offline HTML documents
//!
//! # Architecture
//!
//! ```text
//! Macro JSON ──▶ ActionExecutor ──▶ ElementResolver ──▶ PageDriver
//!                     │                                   │    │
//!                     ▼                                   │    │
//!              EventSynthesizer ──────────────────────────┘    │
//!                                                              │
//!            ContextExtractor ──▶ DomSnapshot ◀────────────────┤
//!            RegionCapture    ──▶ Rect        ◀────────────────┘
//!                                                ┌─────────────┴──────────┐
//!                                                │ PageHandle (CDP)       │
//!                                                │ DocumentPage (offline) │
//!                                                └────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use reasonkit_macro::automation::{ActionExecutor, Macro};
//! use reasonkit_macro::config::EngineConfig;
//! use reasonkit_macro::page::DocumentPage;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let page = Arc::new(DocumentPage::new(
//!         r#"<form><input id="username"><button type="submit">Go</button></form>"#,
//!     ));
//!     let executor = ActionExecutor::new(page, EngineConfig::default());
//!
//!     let actions = Macro::from_json(
//!         r##"[{"type": "type", "selector": "#username", "text": "alice"},
//!             {"type": "click", "selector": "button[type=submit]"}]"##,
//!     )?;
//!     let outcome = executor.execute(actions).await?;
//!
//!     println!("{}", serde_json::to_string(&outcome)?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod automation;
pub mod browser;
pub mod capture;
pub mod config;
pub mod error;
pub mod extraction;
pub mod page;

// Re-exports for convenience
pub use automation::{ActionExecutor, ElementResolver, EventSynthesizer, ExecutionOutcome, Macro};
pub use browser::BrowserController;
pub use capture::RegionCapture;
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use extraction::{ContextExtractor, PageContext};
pub use page::{DocumentPage, PageDriver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
