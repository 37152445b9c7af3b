//! User-event emulation
//!
//! Reactive layers on a hosted page listen for `input` and `change` to pick
//! up a new value. Value assignment is therefore always followed by exactly
//! one bubbling `input` and then exactly one bubbling `change`. Clicks go
//! through the element's native activation, which fires its own events.

use crate::error::PageError;
use crate::page::{Notification, PageDriver};
use tracing::trace;

/// Order in which notifications follow a value assignment
pub const VALUE_NOTIFICATIONS: [Notification; 2] = [Notification::Input, Notification::Change];

/// Applies values and activations the way a user would
pub struct EventSynthesizer;

impl EventSynthesizer {
    /// Set the target's value, then emit `input` and `change`
    pub async fn apply_value<P: PageDriver + ?Sized>(
        page: &P,
        target: &P::Element,
        value: &str,
    ) -> Result<(), PageError> {
        page.set_value(target, value).await?;
        for notification in VALUE_NOTIFICATIONS {
            page.notify(target, notification).await?;
            trace!("Dispatched {}", notification.event_type());
        }
        Ok(())
    }

    /// Invoke the target's native activation
    pub async fn click<P: PageDriver + ?Sized>(
        page: &P,
        target: &P::Element,
    ) -> Result<(), PageError> {
        page.activate(target).await
    }
}
