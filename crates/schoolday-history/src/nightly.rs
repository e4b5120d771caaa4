use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use schoolday_core::config::ArchiveConfig;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::archive::{ArchivalJob, ArchiveMode};

/// Next HH:MM:00 UTC strictly after `from`.
pub fn next_daily_run(hour: u8, minute: u8, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let candidate = Utc
        .with_ymd_and_hms(
            from.year(),
            from.month(),
            from.day(),
            hour as u32,
            minute as u32,
            0,
        )
        .single()?;
    if candidate > from {
        Some(candidate)
    } else {
        Some(candidate + Duration::days(1))
    }
}

/// The business day a run firing at `at` archives.
pub fn archive_target(at: DateTime<Utc>) -> NaiveDate {
    (at - Duration::days(1)).date_naive()
}

/// Fires the archival job once per day for the previous date.
pub struct NightlyArchiver {
    job: Arc<ArchivalJob>,
    hour: u8,
    minute: u8,
}

impl NightlyArchiver {
    pub fn new(job: Arc<ArchivalJob>, cfg: &ArchiveConfig) -> Self {
        Self {
            job,
            hour: cfg.nightly_hour,
            minute: cfg.nightly_minute,
        }
    }

    /// Sleeps until the next trigger, archives yesterday, repeats. Returns
    /// once `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(hour = self.hour, minute = self.minute, "nightly archiver started");
        loop {
            let now = Utc::now();
            let Some(next) = next_daily_run(self.hour, self.minute, now) else {
                error!(hour = self.hour, minute = self.minute, "invalid nightly trigger time");
                return;
            };
            let wait = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let date = archive_target(next);
                    let outcome = self.job.archive_date(date, ArchiveMode::Nightly).await;
                    if outcome.success {
                        info!(%date, message = %outcome.message, "nightly archival done");
                    } else {
                        warn!(%date, message = %outcome.message, "nightly archival finished with failures");
                    }
                }
                changed = shutdown.changed() => {
                    // a dropped sender counts as shutdown
                    if changed.is_err() || *shutdown.borrow() {
                        info!("nightly archiver shutting down");
                        break;
                    }
                }
            }
        }
    }
}
