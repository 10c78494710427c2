//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Methods that take part in an
//! atomic commit accept `&mut PgConnection` instead, so they can run on a
//! transaction.

pub mod channel_repo;
pub mod check_repo;
pub mod flip_repo;
pub mod notification_repo;
pub mod ping_repo;

pub use channel_repo::ChannelRepo;
pub use check_repo::CheckRepo;
pub use flip_repo::FlipRepo;
pub use notification_repo::NotificationRepo;
pub use ping_repo::PingRepo;
