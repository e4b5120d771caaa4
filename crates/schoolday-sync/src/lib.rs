//! `schoolday-sync`: polling change-notification bus.
//!
//! Writers publish `(channel, school, date)` events; clients poll with the
//! last timestamp they saw and get everything newer on the channels they
//! care about. Nothing is pushed and no request is held open.
//!
//! The log is an in-process ring buffer bounded by age and size. It does
//! not survive a restart; clients notice through the `resync` flag and
//! refetch instead of replaying.

pub mod bus;
pub mod types;

pub use bus::ChangeBus;
pub use types::{NotificationEvent, PollResult};
