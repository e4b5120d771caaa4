use std::collections::{BTreeSet, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use schoolday_core::config::SyncConfig;
use schoolday_core::{ChangeNotifier, Channel, NotifyError};
use tracing::{debug, trace};

use crate::types::{NotificationEvent, PollResult};

struct Stored {
    event: NotificationEvent,
    at: DateTime<Utc>,
}

struct BusState {
    events: VecDeque<Stored>,
    /// Last timestamp handed out. Seeded with the wall clock at startup.
    last_ts: u64,
    /// Every event with `ts <= horizon` may have been dropped (pruned, or
    /// published before this process started).
    horizon: u64,
}

/// In-memory, age- and size-bounded notification log.
///
/// Timestamps come from a hybrid clock: `max(last + 1, wall_ms)`. They are
/// strictly increasing within the process and normally larger than any
/// cursor minted by a previous process.
pub struct ChangeBus {
    state: Mutex<BusState>,
    retention: Duration,
    capacity: usize,
}

impl ChangeBus {
    pub fn new(cfg: &SyncConfig) -> Self {
        Self::starting_at(cfg, Utc::now())
    }

    fn starting_at(cfg: &SyncConfig, now: DateTime<Utc>) -> Self {
        let start = wall_ms(now);
        Self {
            state: Mutex::new(BusState {
                events: VecDeque::new(),
                last_ts: start,
                horizon: start,
            }),
            retention: Duration::seconds(cfg.retention_secs as i64),
            capacity: cfg.capacity.max(1),
        }
    }

    /// Append an event and return its freshly minted timestamp.
    pub fn publish(&self, channel: Channel, school_id: &str, date: Option<NaiveDate>) -> u64 {
        self.publish_at(channel, school_id, date, Utc::now())
    }

    fn publish_at(
        &self,
        channel: Channel,
        school_id: &str,
        date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> u64 {
        let mut state = self.state.lock().unwrap();
        let ts = (state.last_ts + 1).max(wall_ms(now));
        state.last_ts = ts;
        state.events.push_back(Stored {
            event: NotificationEvent {
                ts,
                channel,
                school_id: school_id.to_string(),
                date,
            },
            at: now,
        });
        self.prune(&mut state, now);
        debug!(ts, %channel, school_id, "change recorded");
        ts
    }

    /// Every retained event with `ts > since` on one of `channels`, oldest
    /// first, plus the newest timestamp on any channel.
    pub fn poll(&self, since: u64, channels: &BTreeSet<Channel>) -> PollResult {
        self.poll_at(since, channels, Utc::now())
    }

    fn poll_at(&self, since: u64, channels: &BTreeSet<Channel>, now: DateTime<Utc>) -> PollResult {
        let mut state = self.state.lock().unwrap();
        self.prune(&mut state, now);

        let items: Vec<NotificationEvent> = state
            .events
            .iter()
            .filter(|s| s.event.ts > since && channels.contains(&s.event.channel))
            .map(|s| s.event.clone())
            .collect();
        let resync = since < state.horizon || since > state.last_ts;
        trace!(since, count = items.len(), resync, "poll");

        PollResult {
            latest_ts: state.last_ts,
            count: items.len(),
            items,
            resync,
        }
    }

    /// Cursor a client should adopt right after a full data load.
    pub fn latest_ts(&self) -> u64 {
        self.state.lock().unwrap().last_ts
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, state: &mut BusState, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        while let Some(front) = state.events.front() {
            if front.at >= cutoff && state.events.len() <= self.capacity {
                break;
            }
            state.horizon = state.horizon.max(front.event.ts);
            state.events.pop_front();
        }
    }
}

impl ChangeNotifier for ChangeBus {
    fn publish(
        &self,
        channel: Channel,
        school_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<u64, NotifyError> {
        Ok(ChangeBus::publish(self, channel, school_id, date))
    }
}

fn wall_ms(now: DateTime<Utc>) -> u64 {
    now.timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SyncConfig {
        SyncConfig {
            retention_secs: 300,
            capacity: 100,
            poll_interval_secs: 30,
        }
    }

    fn all() -> BTreeSet<Channel> {
        Channel::ALL.into_iter().collect()
    }

    fn only(c: Channel) -> BTreeSet<Channel> {
        [c].into_iter().collect()
    }

    #[test]
    fn timestamps_strictly_increase_within_one_millisecond() {
        let bus = ChangeBus::new(&cfg());
        let now = Utc::now();
        let a = bus.publish_at(Channel::Teacher, "s1", None, now);
        let b = bus.publish_at(Channel::Teacher, "s1", None, now);
        let c = bus.publish_at(Channel::Event, "s2", None, now);
        assert!(a < b && b < c);
    }

    #[test]
    fn clock_going_backwards_still_increases() {
        let now = Utc::now();
        let bus = ChangeBus::starting_at(&cfg(), now);
        let a = bus.publish_at(Channel::Teacher, "s1", None, now);
        let b = bus.publish_at(Channel::Teacher, "s1", None, now - Duration::seconds(10));
        assert!(b > a);
    }

    #[test]
    fn poll_never_returns_cursor_or_older() {
        let bus = ChangeBus::new(&cfg());
        let start = bus.latest_ts();
        let ts: Vec<u64> = (0..5)
            .map(|_| bus.publish(Channel::Teacher, "s1", None))
            .collect();

        let res = bus.poll(ts[1], &all());
        assert!(res.items.iter().all(|e| e.ts > ts[1]));
        assert_eq!(res.count, 3);
        assert_eq!(res.latest_ts, ts[4]);

        // advancing the cursor never yields an event twice
        let mut seen = Vec::new();
        let mut cursor = start;
        for _ in 0..3 {
            let res = bus.poll(cursor, &all());
            seen.extend(res.items.iter().map(|e| e.ts));
            cursor = res.latest_ts;
        }
        assert_eq!(seen, ts);
    }

    #[test]
    fn channel_filter_still_advances_latest_ts() {
        let bus = ChangeBus::new(&cfg());
        let since = bus.latest_ts();
        let ts = bus.publish(Channel::Event, "s1", None);

        let res = bus.poll(since, &only(Channel::Teacher));
        assert_eq!(res.count, 0);
        assert!(res.items.is_empty());
        assert_eq!(res.latest_ts, ts);
        assert!(!res.resync);
    }

    #[test]
    fn items_within_channel_are_in_ts_order() {
        let bus = ChangeBus::new(&cfg());
        let since = bus.latest_ts();
        for i in 0..10 {
            let ch = if i % 2 == 0 { Channel::Teacher } else { Channel::Event };
            bus.publish(ch, "s1", None);
        }
        let res = bus.poll(since, &only(Channel::Teacher));
        assert_eq!(res.count, 5);
        assert!(res.items.windows(2).all(|w| w[0].ts < w[1].ts));
    }

    #[test]
    fn expired_events_are_pruned_and_flag_resync() {
        let t0 = Utc::now();
        let bus = ChangeBus::starting_at(&cfg(), t0);
        let cursor = bus.latest_ts();
        bus.publish_at(Channel::Teacher, "s1", None, t0);
        let later = bus.publish_at(Channel::Teacher, "s1", None, t0 + Duration::seconds(200));

        let res = bus.poll_at(cursor, &all(), t0 + Duration::seconds(400));
        assert_eq!(res.count, 1);
        assert_eq!(res.items[0].ts, later);
        assert!(res.resync, "cursor predates the retained window");

        let res = bus.poll_at(res.latest_ts, &all(), t0 + Duration::seconds(400));
        assert!(!res.resync);
        assert_eq!(res.count, 0);
    }

    #[test]
    fn capacity_bounds_the_log() {
        let bus = ChangeBus::new(&SyncConfig {
            capacity: 3,
            ..cfg()
        });
        let since = bus.latest_ts();
        for _ in 0..5 {
            bus.publish(Channel::Material, "s1", None);
        }
        assert_eq!(bus.len(), 3);
        assert!(bus.poll(since, &all()).resync);
    }

    #[test]
    fn cursor_from_the_future_requests_resync() {
        let bus = ChangeBus::new(&cfg());
        let res = bus.poll(bus.latest_ts() + 1_000_000, &all());
        assert!(res.resync);
        assert_eq!(res.count, 0);
    }

    #[test]
    fn fresh_cursor_after_load_does_not_resync() {
        let bus = ChangeBus::new(&cfg());
        let res = bus.poll(bus.latest_ts(), &all());
        assert!(!res.resync);
    }

    #[test]
    fn events_carry_school_and_date() {
        let bus = ChangeBus::new(&cfg());
        let since = bus.latest_ts();
        let date = NaiveDate::from_ymd_opt(2024, 9, 1);
        bus.publish(Channel::Publish, "s7", date);
        let res = bus.poll(since, &all());
        assert_eq!(res.items[0].school_id, "s7");
        assert_eq!(res.items[0].date, date);

        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["items"][0]["channel"], "publish");
        assert_eq!(json["items"][0]["schoolId"], "s7");
        assert!(json.get("latestTs").is_some());
    }
}
