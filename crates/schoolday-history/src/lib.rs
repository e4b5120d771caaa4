//! `schoolday-history`: immutable schedule history and what is mined from it.
//!
//! # Overview
//!
//! The [`archive::ArchivalJob`] copies a date's live schedule into the
//! `history` table, resolving teacher, class and subject ids to names at
//! archive time. Rows for a `(school, date)` are replaced atomically, so a
//! date can be re-archived any number of times with the same result.
//!
//! | Mode      | Schools covered                         |
//! |-----------|-----------------------------------------|
//! | `Nightly` | Schools that published the target date  |
//! | `Force`   | Every school                            |
//!
//! [`nightly::NightlyArchiver`] runs the job for yesterday once per day and
//! [`recommend::Recommender`] ranks past substitutes per weekday and hour.

pub mod archive;
pub mod db;
pub mod error;
pub mod nightly;
pub mod recommend;
pub mod types;

pub use archive::{ArchivalJob, ArchiveMode};
pub use error::{HistoryError, Result};
pub use nightly::NightlyArchiver;
pub use recommend::Recommender;
pub use types::{ArchiveOutcome, ArchiveStats, HistoryRecord, RecommendationSlot, Recommendations};
