//! External delivery channels for check alerts.
//!
//! The [`ChannelNotifier`](crate::ChannelNotifier) picks one of these per
//! channel kind.

pub mod email;
pub mod webhook;
