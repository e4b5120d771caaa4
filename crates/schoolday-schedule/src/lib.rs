//! `schoolday-schedule`: the live daily schedule.
//!
//! A school's day is a set of columns (one per missing teacher, available
//! teacher or event) spanning the school's configured hours. Columns are
//! ordered by sparse integer positions (see [`positions`]) so reordering
//! rarely touches more than one row.
//!
//! [`store::ScheduleStore`] is the only writer of these tables. Each write
//! is committed before a change is published to the notification bus.

pub mod cache;
pub mod db;
pub mod directory;
pub mod error;
pub mod positions;
pub mod store;
pub mod types;

pub use error::{Result, ScheduleError};
pub use store::ScheduleStore;
pub use types::{
    CellPayload, ColumnHeader, DaySchedule, EventSlot, ScheduleCell, ScheduleColumn, TeacherSlot,
};
