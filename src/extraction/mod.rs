//! Context extraction module
//!
//! This module summarizes the current page into a bounded, serializable
//! [`PageContext`] for the reasoning service.

pub mod context;

pub use context::{
    truncate, ButtonDescriptor, ContextExtractor, FieldDescriptor, FormDescriptor,
    InputDescriptor, LinkDescriptor, PageContext,
};
