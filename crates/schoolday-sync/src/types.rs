use chrono::NaiveDate;
use schoolday_core::Channel;
use serde::{Deserialize, Serialize};

/// One recorded change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub ts: u64,
    pub channel: Channel,
    pub school_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

/// Answer to a poll.
///
/// `latest_ts` is the newest timestamp across *all* channels, so a client
/// filtering on quiet channels still advances its cursor. When `resync` is
/// set the log cannot prove it holds everything after the cursor (it was
/// pruned, or the cursor belongs to a previous process): the client must
/// refetch its data and restart from `latest_ts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub latest_ts: u64,
    pub count: usize,
    pub items: Vec<NotificationEvent>,
    pub resync: bool,
}
