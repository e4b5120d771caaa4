pub mod archive;
pub mod health;
pub mod recommend;
pub mod schedule;
pub mod sync;
