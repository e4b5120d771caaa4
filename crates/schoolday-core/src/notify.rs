//! The seam between writers (schedule store, archival) and the change bus.

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::Channel;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification bus unavailable: {0}")]
    Unavailable(String),
}

/// Records that something changed. Implementations return the timestamp
/// minted for the event.
///
/// Callers must only publish after the underlying write is durable, and must
/// treat a failure as non-fatal: log it and keep the write.
pub trait ChangeNotifier: Send + Sync {
    fn publish(
        &self,
        channel: Channel,
        school_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<u64, NotifyError>;
}

/// Notifier that drops every event. Used by operator tooling that runs
/// without a live bus.
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn publish(
        &self,
        _channel: Channel,
        _school_id: &str,
        _date: Option<NaiveDate>,
    ) -> Result<u64, NotifyError> {
        Ok(0)
    }
}
