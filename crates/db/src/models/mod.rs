//! Row types and input DTOs for the monitoring tables.

pub mod channel;
pub mod check;
pub mod flip;
pub mod notification;
pub mod ping;
