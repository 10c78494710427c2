//! Dead-man's-switch monitoring worker.
//!
//! Wires the store, the notifier and the state machine together:
//! [`PingIngestor`] applies incoming pings, [`SweepScheduler`] advances
//! checks that went quiet, [`LogQuery`] serves a check's event log and
//! [`CheckAdmin`] manages checks and channels.

pub mod admin;
pub mod config;
pub mod error;
pub mod ingest;
pub mod locks;
pub mod log_query;
pub mod sweep;

pub use admin::CheckAdmin;
pub use config::WorkerConfig;
pub use error::{MonitorError, MonitorResult};
pub use ingest::{IngestOutcome, NewPingInput, PingIngestor};
pub use locks::KeyedLocks;
pub use log_query::{LogEvent, LogParams, LogQuery};
pub use sweep::{SweepReport, SweepScheduler};
