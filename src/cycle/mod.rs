//! Recurring time windows and the nodes observed inside them.
//!
//! A [`Cycle`] is a window of fixed length (a day, a week, ...) that recurs
//! forever. Readings are anchored to their offset inside the window, so a
//! value seen at 07:00 on Monday and again at 07:00 on Tuesday lands on the
//! same node of a daily cycle.
//!
//! ## Timing
//!
//! The window start is derived from calendar rules in a chosen time zone:
//!
//! | Kind    | Start                          | Length            |
//! |---------|--------------------------------|-------------------|
//! | Daily   | local midnight today           | 24 h              |
//! | Weekly  | midnight of the latest Sunday  | 7 × 24 h          |
//! | Monthly | midnight on the 1st            | 30.436875 days    |
//! | Yearly  | midnight on January 1st        | 365.2425 days     |
//!
//! Only the start is calendar-aware. Rollover always moves it by whole
//! multiples of the fixed length.

mod node;
pub mod probability;
pub mod recognizer;

use core::fmt;

use alloc::vec::Vec;
use chrono::{DateTime, Datelike, Days, Local, TimeDelta, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fuzzy::FuzzyAllowance;
use crate::reading::{Reading, SensorId};
use crate::storage::record::{CycleRecord, NodeRecord};

pub use node::CycleNode;
pub use probability::CycleProbabilityModel;
pub use recognizer::CycleRecognizer;

pub const NANOS_PER_DAY: i64 = 86_400 * 1_000_000_000;

/// Length of a recurring window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CycleKind {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl CycleKind {
    pub const ALL: [CycleKind; 4] = [Self::Daily, Self::Weekly, Self::Monthly, Self::Yearly];

    /// Fixed window length in nanoseconds
    pub const fn duration_nanos(self) -> i64 {
        match self {
            Self::Daily => NANOS_PER_DAY,
            Self::Weekly => 7 * NANOS_PER_DAY,
            // 365.2425 / 12 days
            Self::Monthly => 2_629_746 * 1_000_000_000,
            // 365.2425 days
            Self::Yearly => 31_556_952 * 1_000_000_000,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Start of the calendar window that encloses `at`, in nanoseconds since
    /// the Unix epoch
    pub fn calendar_start<Tz: TimeZone>(self, at: &DateTime<Tz>) -> Result<i64> {
        let date = at.date_naive();
        let start_date = match self {
            Self::Daily => Some(date),
            Self::Weekly => {
                let back = u64::from(date.weekday().num_days_from_sunday());
                date.checked_sub_days(Days::new(back))
            }
            Self::Monthly => date.with_day(1),
            Self::Yearly => date.with_ordinal(1),
        }
        .ok_or(Error::invalid("cycle start", "date out of range"))?;

        let midnight = start_date
            .and_hms_opt(0, 0, 0)
            .ok_or(Error::invalid("cycle start", "date out of range"))?;

        let tz = at.timezone();
        // Zones that skip midnight on a DST change start an hour later
        let start = tz
            .from_local_datetime(&midnight)
            .earliest()
            .or_else(|| {
                midnight
                    .checked_add_signed(TimeDelta::hours(1))
                    .and_then(|later| tz.from_local_datetime(&later).earliest())
            })
            .ok_or(Error::invalid("cycle start", "local midnight does not exist"))?;

        start
            .timestamp_nanos_opt()
            .ok_or(Error::invalid("cycle start", "outside the representable range"))
    }
}

/// Registry key of a cycle: one cycle per sensor binding and kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CycleKey {
    pub sensor: SensorId,
    pub kind: CycleKind,
}

impl CycleKey {
    pub const fn new(sensor: SensorId, kind: CycleKind) -> Self {
        Self { sensor, kind }
    }
}

impl fmt::Display for CycleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.sensor, self.kind.label())
    }
}

/// Where [`Cycle::place`] put a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Dwell time was added to an existing, equal node
    Merged(usize),
    /// A new node was inserted at this index
    Inserted(usize),
}

impl Placement {
    pub const fn index(self) -> usize {
        match self {
            Self::Merged(index) | Self::Inserted(index) => index,
        }
    }
}

/// A recurring window bound to one sensor, holding its nodes ordered by offset
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    key: CycleKey,
    start_nanos: i64,
    allowance: FuzzyAllowance,
    nodes: Vec<CycleNode>,
    last_touched: Option<usize>,
}

impl Cycle {
    /// Build a cycle with an explicit window start
    pub fn with_start(key: CycleKey, start_nanos: i64, allowance: FuzzyAllowance) -> Self {
        Self {
            key,
            start_nanos,
            allowance,
            nodes: Vec::new(),
            last_touched: None,
        }
    }

    /// Build a cycle whose window encloses `at` by calendar rules
    pub fn starting_at<Tz: TimeZone>(
        key: CycleKey,
        allowance: FuzzyAllowance,
        at: &DateTime<Tz>,
    ) -> Result<Self> {
        let start_nanos = key.kind.calendar_start(at)?;
        Ok(Self::with_start(key, start_nanos, allowance))
    }

    /// Build a cycle for the current window in the system time zone
    pub fn current(key: CycleKey, allowance: FuzzyAllowance) -> Result<Self> {
        Self::starting_at(key, allowance, &Local::now())
    }

    /// Rebuild a persisted cycle.
    ///
    /// Only the allowance and the node list come from storage; the window
    /// start is supplied by the caller, usually from the calendar. Calendar
    /// starts are not whole periods apart, so every node offset is measured
    /// again from the new start.
    pub fn from_record(record: CycleRecord, start_nanos: i64) -> Result<Self> {
        let mut cycle = Self::with_start(record.key, start_nanos, record.allowance);
        let duration = cycle.duration_nanos();
        for node in record.nodes {
            // re-derive the reading key instead of trusting the stored one
            let reading = Reading::new(
                node.reading.sensor(),
                node.reading.values(),
                node.reading.timestamp_nanos(),
                node.reading.duration_nanos(),
            )?;
            let offset = reading
                .timestamp_nanos()
                .saturating_sub(start_nanos)
                .rem_euclid(duration);
            cycle.nodes.push(CycleNode::from_parts(
                record.key,
                reading,
                offset,
                node.duration_nanos,
                node.probability,
            )?);
        }
        cycle.nodes.sort_by_key(CycleNode::start_offset_nanos);
        Ok(cycle)
    }

    pub fn to_record(&self) -> CycleRecord {
        CycleRecord {
            key: self.key,
            allowance: self.allowance,
            nodes: self
                .nodes
                .iter()
                .map(|node| NodeRecord {
                    reading: node.reading().clone(),
                    start_offset_nanos: node.start_offset_nanos(),
                    duration_nanos: node.duration_nanos(),
                    probability: node.probability(),
                })
                .collect(),
        }
    }

    pub fn key(&self) -> CycleKey {
        self.key
    }

    pub fn kind(&self) -> CycleKind {
        self.key.kind
    }

    pub fn sensor(&self) -> SensorId {
        self.key.sensor
    }

    pub fn start_nanos(&self) -> i64 {
        self.start_nanos
    }

    pub fn duration_nanos(&self) -> i64 {
        self.key.kind.duration_nanos()
    }

    pub fn allowance(&self) -> FuzzyAllowance {
        self.allowance
    }

    pub fn nodes(&self) -> &[CycleNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&CycleNode> {
        self.nodes.get(index)
    }

    /// Index of the node most recently merged into or inserted
    pub fn last_touched(&self) -> Option<usize> {
        self.last_touched
    }

    /// True when `timestamp_nanos` falls inside the current window
    pub fn encloses(&self, timestamp_nanos: i64) -> bool {
        let elapsed = timestamp_nanos.saturating_sub(self.start_nanos);
        (0..self.duration_nanos()).contains(&elapsed)
    }

    /// Move the window by whole periods so that it encloses `timestamp_nanos`.
    ///
    /// Runs in constant time however many periods were skipped and returns
    /// the number of periods moved (negative for readings older than the
    /// window). Calling it again with the same timestamp is a no-op.
    pub fn adjust_rollover(&mut self, timestamp_nanos: i64) -> i64 {
        if self.encloses(timestamp_nanos) {
            return 0;
        }
        let duration = self.duration_nanos();
        let periods = timestamp_nanos
            .saturating_sub(self.start_nanos)
            .div_euclid(duration);
        self.start_nanos = self
            .start_nanos
            .saturating_add(periods.saturating_mul(duration));
        periods
    }

    /// First node whose reading `equal` considers the same as `reading`
    pub fn find_equal(
        &self,
        reading: &Reading,
        equal: impl Fn(&Reading, &Reading) -> bool,
    ) -> Option<usize> {
        self.nodes.iter().position(|node| equal(node.reading(), reading))
    }

    /// Merge `reading` into an equal node or insert it as a new one.
    ///
    /// The window must already enclose the reading. New nodes keep the list
    /// sorted by offset; readings at the same offset go after existing ones.
    pub fn place(
        &mut self,
        reading: &Reading,
        equal: impl Fn(&Reading, &Reading) -> bool,
    ) -> Result<Placement> {
        self.key.sensor.ensure_matches(reading.sensor())?;
        if !self.encloses(reading.timestamp_nanos()) {
            return Err(Error::invalid("reading", "outside the current cycle window"));
        }

        let placement = match self.find_equal(reading, equal) {
            Some(index) => {
                self.nodes[index].add_duration(reading.duration_nanos())?;
                Placement::Merged(index)
            }
            None => {
                let offset = reading.timestamp_nanos() - self.start_nanos;
                let node = CycleNode::new(self.key, reading.clone(), offset)?;
                let index = self
                    .nodes
                    .partition_point(|n| n.start_offset_nanos() <= offset);
                self.nodes.insert(index, node);
                Placement::Inserted(index)
            }
        };

        self.last_touched = Some(placement.index());
        Ok(placement)
    }

    /// Add dwell time to an existing node
    pub fn add_dwell(&mut self, index: usize, nanos: i64) -> Result<()> {
        let node = self
            .nodes
            .get_mut(index)
            .ok_or(Error::invalid("node index", "no such node"))?;
        node.add_duration(nanos)?;
        self.last_touched = Some(index);
        Ok(())
    }

    /// Set each node's probability to its share of the total dwell time
    pub fn refresh_node_probabilities(&mut self) -> Result<()> {
        let total: f64 = self.nodes.iter().map(|n| n.duration_nanos() as f64).sum();
        if total <= 0.0 {
            return Ok(());
        }
        for node in &mut self.nodes {
            let share = (node.duration_nanos() as f64 / total).clamp(0.0, 1.0);
            node.set_probability(share)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, Utc};

    fn key(kind: CycleKind) -> CycleKey {
        CycleKey::new(SensorId::new(1, 1).unwrap(), kind)
    }

    fn reading(value: f64, ts: i64, duration: i64) -> Reading {
        Reading::new(SensorId::new(1, 1).unwrap(), &[value], ts, duration).unwrap()
    }

    fn same_value(a: &Reading, b: &Reading) -> bool {
        a.values() == b.values()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 30, 0)
            .unwrap()
            .and_utc()
    }

    fn utc_midnight_nanos(y: i32, m: u32, d: u32) -> i64 {
        utc(y, m, d, 0).timestamp_nanos_opt().unwrap() - 30 * 60 * 1_000_000_000
    }

    #[test]
    fn test_durations() {
        assert_eq!(CycleKind::Daily.duration_nanos(), 86_400_000_000_000);
        assert_eq!(CycleKind::Weekly.duration_nanos(), 7 * 86_400_000_000_000);
        for kind in CycleKind::ALL {
            assert!(kind.duration_nanos() > 0);
        }
    }

    #[test]
    fn test_calendar_starts_in_utc() {
        // Wednesday 2025-06-18 14:30 UTC
        let at = utc(2025, 6, 18, 14);
        assert_eq!(CycleKind::Daily.calendar_start(&at).unwrap(), utc_midnight_nanos(2025, 6, 18));
        assert_eq!(CycleKind::Weekly.calendar_start(&at).unwrap(), utc_midnight_nanos(2025, 6, 15));
        assert_eq!(CycleKind::Monthly.calendar_start(&at).unwrap(), utc_midnight_nanos(2025, 6, 1));
        assert_eq!(CycleKind::Yearly.calendar_start(&at).unwrap(), utc_midnight_nanos(2025, 1, 1));
    }

    #[test]
    fn test_weekly_start_on_a_sunday_is_same_day() {
        let sunday = utc(2025, 6, 15, 9);
        assert_eq!(
            CycleKind::Weekly.calendar_start(&sunday).unwrap(),
            utc_midnight_nanos(2025, 6, 15)
        );
    }

    #[test]
    fn test_calendar_start_respects_time_zone() {
        // 01:30 on the 18th in UTC+02:00 is 23:30 on the 17th in UTC
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let at = utc(2025, 6, 17, 23).with_timezone(&tz);
        let expected = utc_midnight_nanos(2025, 6, 18) - 2 * 3600 * 1_000_000_000;
        assert_eq!(CycleKind::Daily.calendar_start(&at).unwrap(), expected);
    }

    #[test]
    fn test_multi_period_rollover() {
        let d = CycleKind::Daily.duration_nanos();
        let mut cycle = Cycle::with_start(key(CycleKind::Daily), 0, FuzzyAllowance::default());

        let event = 2 * d + d / 2;
        assert_eq!(cycle.adjust_rollover(event), 2);
        assert_eq!(cycle.start_nanos(), 2 * d);

        // already enclosed, nothing moves
        assert_eq!(cycle.adjust_rollover(event), 0);
        assert_eq!(cycle.start_nanos(), 2 * d);
        let elapsed = event - cycle.start_nanos();
        assert!((0..cycle.duration_nanos()).contains(&elapsed));
    }

    #[test]
    fn test_rollover_at_exact_boundary() {
        let d = CycleKind::Daily.duration_nanos();
        let mut cycle = Cycle::with_start(key(CycleKind::Daily), 0, FuzzyAllowance::default());
        assert_eq!(cycle.adjust_rollover(d), 1);
        assert_eq!(cycle.start_nanos(), d);
    }

    #[test]
    fn test_rollover_backwards_for_older_reading() {
        let d = CycleKind::Daily.duration_nanos();
        let mut cycle = Cycle::with_start(key(CycleKind::Daily), 3 * d, FuzzyAllowance::default());
        assert_eq!(cycle.adjust_rollover(d + 5), -2);
        assert_eq!(cycle.start_nanos(), d);
    }

    #[test]
    fn test_place_keeps_nodes_sorted_and_merges() {
        let mut cycle = Cycle::with_start(key(CycleKind::Daily), 0, FuzzyAllowance::default());
        assert_eq!(cycle.place(&reading(1.0, 500, 10), same_value).unwrap(), Placement::Inserted(0));
        assert_eq!(cycle.place(&reading(2.0, 100, 10), same_value).unwrap(), Placement::Inserted(0));
        assert_eq!(cycle.place(&reading(3.0, 900, 10), same_value).unwrap(), Placement::Inserted(2));
        assert_eq!(cycle.place(&reading(1.0, 950, 25), same_value).unwrap(), Placement::Merged(1));

        let offsets: Vec<i64> = cycle.nodes().iter().map(CycleNode::start_offset_nanos).collect();
        assert_eq!(offsets, [100, 500, 900]);
        assert_eq!(cycle.nodes()[1].duration_nanos(), 35);
        assert_eq!(cycle.last_touched(), Some(1));
    }

    #[test]
    fn test_place_rejects_reading_outside_window() {
        let d = CycleKind::Daily.duration_nanos();
        let mut cycle = Cycle::with_start(key(CycleKind::Daily), 0, FuzzyAllowance::default());
        assert!(cycle.place(&reading(1.0, d + 1, 10), same_value).is_err());
        assert!(cycle.nodes().is_empty());
    }

    #[test]
    fn test_node_probabilities_follow_dwell_share() {
        let mut cycle = Cycle::with_start(key(CycleKind::Daily), 0, FuzzyAllowance::default());
        cycle.place(&reading(1.0, 0, 30), same_value).unwrap();
        cycle.place(&reading(2.0, 10, 10), same_value).unwrap();
        cycle.refresh_node_probabilities().unwrap();
        assert_eq!(cycle.nodes()[0].probability(), 0.75);
        assert_eq!(cycle.nodes()[1].probability(), 0.25);
    }

    #[test]
    fn test_record_round_trip_recomputes_start() {
        let mut cycle = Cycle::with_start(key(CycleKind::Weekly), 0, FuzzyAllowance::new(0.2).unwrap());
        cycle.place(&reading(4.0, 1_000, 10), same_value).unwrap();
        cycle.place(&reading(8.0, 2_000, 20), same_value).unwrap();

        let d = CycleKind::Weekly.duration_nanos();
        let restored = Cycle::from_record(cycle.to_record(), d).unwrap();
        assert_eq!(restored.start_nanos(), d);
        assert_eq!(restored.allowance(), cycle.allowance());
        assert_eq!(restored.nodes(), cycle.nodes());
    }

    #[test]
    fn test_restored_monthly_offsets_follow_new_start() {
        let d = CycleKind::Monthly.duration_nanos();
        let jan = CycleKind::Monthly.calendar_start(&utc(2025, 1, 15, 12)).unwrap();
        let feb = CycleKind::Monthly.calendar_start(&utc(2025, 2, 10, 12)).unwrap();
        assert_eq!(feb - jan, 31 * NANOS_PER_DAY);
        // the calendar start is not a whole number of periods away
        assert_ne!((feb - jan).rem_euclid(d), 0);

        let mut cycle = Cycle::with_start(key(CycleKind::Monthly), jan, FuzzyAllowance::default());
        let early = reading(1.0, jan + NANOS_PER_DAY / 2, 10);
        let late = reading(2.0, jan + 30 * NANOS_PER_DAY, 10);
        cycle.place(&early, same_value).unwrap();
        cycle.place(&late, same_value).unwrap();

        let restored = Cycle::from_record(cycle.to_record(), feb).unwrap();
        let keys: Vec<_> = restored.nodes().iter().map(|n| n.reading().key()).collect();
        assert_eq!(keys, [late.key(), early.key()]);
        for node in restored.nodes() {
            let ts = node.reading().timestamp_nanos();
            assert_eq!(node.start_offset_nanos(), (ts - feb).rem_euclid(d));
        }
    }
}
