//! Notification pipeline for check status changes.
//!
//! - [`Notifier`]: delivery capability used by the dispatcher.
//! - [`delivery`]: external transports (webhook, email).
//! - [`ChannelNotifier`]: routes a channel to its transport by kind.
//! - [`Dispatcher`]: turns a flip into at most one notification per
//!   subscribed channel and records every delivery outcome.

pub mod delivery;
pub mod dispatcher;
pub mod notifier;

pub use delivery::email::{EmailConfig, EmailDelivery};
pub use delivery::webhook::WebhookDelivery;
pub use dispatcher::{DeliveryOutcome, Dispatcher};
pub use notifier::{AlertPayload, ChannelNotifier, DeliveryError, Notifier, RecordingNotifier};
