//! Pure domain logic for the deadman monitoring core.
//!
//! Nothing in this crate performs I/O or reads the clock. Every operation
//! takes `now` explicitly.

pub mod channels;
pub mod error;
pub mod log_events;
pub mod schedule;
pub mod state_machine;
pub mod status;
pub mod types;
