//! `schoolday-core`: configuration, shared vocabulary and the change
//! notification seam used by every other schoolday crate.

pub mod config;
pub mod error;
pub mod notify;
pub mod types;

pub use error::{Result, SchooldayError};
pub use notify::{ChangeNotifier, NotifyError, NullNotifier};
pub use types::{Channel, ColumnType};
