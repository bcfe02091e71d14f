//! Recurrence rules and next-occurrence computation.
//!
//! Everything here is pure: no clocks, no I/O. Instants are computed in a
//! fixed UTC offset carried by the rule, then converted back to UTC
//! [`Timestamp`]s.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use jiff::civil::{Date, DateTime, Time};
use jiff::tz::Offset;
use jiff::{SignedDuration, Span, Timestamp};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest accepted `interval`
pub const MAX_INTERVAL: u32 = 1000;

/// Largest accepted occurrence `count`
pub const MAX_COUNT: u32 = 100_000;

/// Fixed offsets are limited to what real time zones use
pub const MAX_OFFSET_MINUTES: i32 = 18 * 60;

/// Weekly search window, in multiples of the rule interval
const WEEKLY_WINDOW_WEEKS: i64 = 2;

/// Eligible months inspected before a monthly rule is declared exhausted
const MONTHLY_SEARCH_PERIODS: i64 = 48;

/// Eligible years inspected before a yearly rule is declared exhausted
const YEARLY_SEARCH_PERIODS: i64 = 16;

const SECONDS_PER_DAY: i64 = 86_400;

const EPOCH_DATE: Date = jiff::civil::date(1970, 1, 1);

static TIME_OF_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").expect("time-of-day pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Frequency::Minutely => "minutely",
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        };
        f.write_str(name)
    }
}

fn default_interval() -> u32 {
    1
}

fn default_time_of_day() -> String {
    "00:00".to_string()
}

/// A recurrence rule attached to a recurring job.
///
/// - `days_of_week` uses 1 (Monday) through 7 (Sunday); empty means Monday.
/// - `days_of_month` uses 1 through 31; days missing from a month are skipped
///   for that month. Empty means the start date's day, or the 1st.
/// - Minutely and hourly rules are aligned to `time_of_day` on the start
///   date, or on 1970-01-01 when there is no start date.
/// - Yearly rules recur on the anniversary of the start date (or of the
///   query date when unset).
/// - `count` is enforced here only when `start_date` fixes the first
///   occurrence; otherwise the executor caps it by run count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,

    #[serde(default = "default_interval")]
    pub interval: u32,

    #[serde(default)]
    pub days_of_week: Vec<u8>,

    #[serde(default)]
    pub days_of_month: Vec<u8>,

    /// 24h "HH:MM"
    #[serde(default = "default_time_of_day")]
    pub time_of_day: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Date>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Date>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,

    /// Dates on which no occurrence may fall
    #[serde(default)]
    pub exceptions: Vec<Date>,

    /// Fixed offset from UTC in which dates and `time_of_day` are interpreted
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self {
            frequency: Frequency::Daily,
            interval: default_interval(),
            days_of_week: Vec::new(),
            days_of_month: Vec::new(),
            time_of_day: default_time_of_day(),
            start_date: None,
            end_date: None,
            count: None,
            exceptions: Vec::new(),
            utc_offset_minutes: 0,
        }
    }
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency, time_of_day: impl Into<String>) -> Self {
        Self {
            frequency,
            time_of_day: time_of_day.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Vec<RuleIssue> {
        validate(self)
    }
}

/// One violated constraint of a recurrence rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleIssue {
    #[error("interval must be between 1 and {max}, got {value}")]
    IntervalOutOfRange { value: u32, max: u32 },

    #[error("days_of_week entries must be 1 (Monday) through 7 (Sunday), got {value}")]
    DayOfWeekOutOfRange { value: u8 },

    #[error("days_of_month entries must be 1 through 31, got {value}")]
    DayOfMonthOutOfRange { value: u8 },

    #[error("time_of_day must be a 24h HH:MM time, got '{value}'")]
    InvalidTimeOfDay { value: String },

    #[error("start_date {start} is after end_date {end}")]
    StartAfterEnd { start: Date, end: Date },

    #[error("count must be between 1 and {max}, got {value}")]
    CountOutOfRange { value: u32, max: u32 },

    #[error("utc_offset_minutes must be within +/-{max}, got {value}")]
    OffsetOutOfRange { value: i32, max: i32 },
}

/// Structural validation. Reports every problem; never repairs input.
pub fn validate(rule: &RecurrenceRule) -> Vec<RuleIssue> {
    let mut issues = Vec::new();

    if rule.interval == 0 || rule.interval > MAX_INTERVAL {
        issues.push(RuleIssue::IntervalOutOfRange {
            value: rule.interval,
            max: MAX_INTERVAL,
        });
    }

    for &value in &rule.days_of_week {
        if !(1..=7).contains(&value) {
            issues.push(RuleIssue::DayOfWeekOutOfRange { value });
        }
    }

    for &value in &rule.days_of_month {
        if !(1..=31).contains(&value) {
            issues.push(RuleIssue::DayOfMonthOutOfRange { value });
        }
    }

    if parse_time_of_day(&rule.time_of_day).is_none() {
        issues.push(RuleIssue::InvalidTimeOfDay {
            value: rule.time_of_day.clone(),
        });
    }

    if let (Some(start), Some(end)) = (rule.start_date, rule.end_date) {
        if start > end {
            issues.push(RuleIssue::StartAfterEnd { start, end });
        }
    }

    if let Some(count) = rule.count {
        if count == 0 || count > MAX_COUNT {
            issues.push(RuleIssue::CountOutOfRange {
                value: count,
                max: MAX_COUNT,
            });
        }
    }

    if rule.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
        issues.push(RuleIssue::OffsetOutOfRange {
            value: rule.utc_offset_minutes,
            max: MAX_OFFSET_MINUTES,
        });
    }

    issues
}

fn parse_time_of_day(value: &str) -> Option<Time> {
    let caps = TIME_OF_DAY.captures(value)?;
    let hour: i8 = caps[1].parse().ok()?;
    let minute: i8 = caps[2].parse().ok()?;
    Time::new(hour, minute, 0, 0).ok()
}

/// Earliest instant strictly after `after` satisfying `rule`.
///
/// Returns `None` once the end date or occurrence count is exhausted, or
/// when the rule is structurally invalid.
pub fn next_occurrence(rule: &RecurrenceRule, after: Timestamp) -> Option<Timestamp> {
    occurrences(rule, after).next()
}

/// Up to `n` consecutive occurrences after `after`; shorter when the rule ends.
pub fn next_n_occurrences(rule: &RecurrenceRule, n: usize, after: Timestamp) -> Vec<Timestamp> {
    occurrences(rule, after).take(n).collect()
}

/// Lazy walk over the occurrences of a rule strictly after some instant.
///
/// A counted series (`count` with `start_date`) is walked from its first
/// occurrence exactly once, however many items are taken.
pub struct Occurrences<'a> {
    plan: Option<Plan<'a>>,
    after: Timestamp,
    cursor: Timestamp,
    remaining: Option<u32>,
}

pub fn occurrences(rule: &RecurrenceRule, after: Timestamp) -> Occurrences<'_> {
    let plan = Plan::new(rule);
    let (cursor, remaining) = match (rule.count, rule.start_date, plan.as_ref()) {
        (Some(count), Some(start), Some(plan)) => match plan.series_origin(start) {
            Some(origin) => (origin, Some(count)),
            None => (after, Some(0)),
        },
        _ => (after, None),
    };

    Occurrences {
        plan,
        after,
        cursor,
        remaining,
    }
}

impl Iterator for Occurrences<'_> {
    type Item = Timestamp;

    fn next(&mut self) -> Option<Timestamp> {
        let plan = self.plan.as_ref()?;
        loop {
            if let Some(remaining) = self.remaining.as_mut() {
                if *remaining == 0 {
                    return None;
                }
                *remaining -= 1;
            }

            let occurrence = plan.next_within_bounds(self.cursor)?;
            self.cursor = occurrence;
            if occurrence > self.after {
                return Some(occurrence);
            }
        }
    }
}

/// Latest occurrence in `(after, until]`.
///
/// Open-ended rules are searched backwards from `until` in a doubling
/// window, so the cost follows the spacing of the rule rather than the
/// length of the gap.
pub fn latest_occurrence(
    rule: &RecurrenceRule,
    after: Timestamp,
    until: Timestamp,
) -> Option<Timestamp> {
    if until <= after {
        return None;
    }
    let last_from = |from: Timestamp| {
        occurrences(rule, from)
            .take_while(|t| *t <= until)
            .last()
    };

    if rule.count.is_some() && rule.start_date.is_some() {
        // a counted series has to be walked from its origin anyway
        return last_from(after);
    }

    let mut lookback = SignedDuration::from_mins(1);
    loop {
        let from = until
            .checked_sub(lookback)
            .ok()
            .filter(|from| *from > after)
            .unwrap_or(after);
        if let Some(latest) = last_from(from) {
            return Some(latest);
        }
        if from == after {
            return None;
        }
        lookback = lookback.checked_mul(2)?;
    }
}

/// Pins an open-ended calendar rule to the local date of `occurrence`.
///
/// Without a start date, daily, weekly, monthly and yearly rules anchor on
/// the date of whatever instant they are asked about; pinning keeps every
/// later search on the series `occurrence` belongs to. Minutely and hourly
/// rules already anchor on a fixed epoch and are left alone.
pub fn pin_start_date(rule: &mut RecurrenceRule, occurrence: Timestamp) {
    if rule.start_date.is_some()
        || matches!(rule.frequency, Frequency::Minutely | Frequency::Hourly)
    {
        return;
    }
    if let Ok(offset) = Offset::from_seconds(rule.utc_offset_minutes * 60) {
        rule.start_date = Some(offset.to_datetime(occurrence).date());
    }
}

/// A validated rule with its parsed pieces
struct Plan<'a> {
    rule: &'a RecurrenceRule,
    offset: Offset,
    time: Time,
    interval: i64,
    weekdays: BTreeSet<i8>,
    month_days: BTreeSet<i8>,
}

impl<'a> Plan<'a> {
    fn new(rule: &'a RecurrenceRule) -> Option<Self> {
        if !validate(rule).is_empty() {
            return None;
        }

        let offset = Offset::from_seconds(rule.utc_offset_minutes * 60).ok()?;
        let time = parse_time_of_day(&rule.time_of_day)?;

        let mut weekdays: BTreeSet<i8> = rule.days_of_week.iter().map(|&d| d as i8).collect();
        if weekdays.is_empty() {
            weekdays.insert(1);
        }

        let mut month_days: BTreeSet<i8> = rule.days_of_month.iter().map(|&d| d as i8).collect();
        if month_days.is_empty() {
            month_days.insert(rule.start_date.map(|d| d.day()).unwrap_or(1));
        }

        Some(Self {
            rule,
            offset,
            time,
            interval: i64::from(rule.interval),
            weekdays,
            month_days,
        })
    }

    /// The instant just before the start date begins, so that an occurrence
    /// at local midnight of the start date still counts.
    fn series_origin(&self, start: Date) -> Option<Timestamp> {
        let midnight = self.offset.to_timestamp(start.to_datetime(Time::midnight())).ok()?;
        midnight.checked_sub(SignedDuration::from_nanos(1)).ok()
    }

    /// Pattern match plus end date and exception handling
    fn next_within_bounds(&self, after: Timestamp) -> Option<Timestamp> {
        let mut cursor = self.offset.to_datetime(after);

        // each pass either returns or steps past one distinct excluded date
        for _ in 0..=self.rule.exceptions.len() {
            let candidate = self.next_local(cursor)?;
            let date = candidate.date();

            if self.rule.end_date.is_some_and(|end| date > end) {
                return None;
            }

            if self.rule.exceptions.contains(&date) {
                cursor = date.to_datetime(Time::MAX);
                continue;
            }

            return self.offset.to_timestamp(candidate).ok();
        }

        None
    }

    fn next_local(&self, after: DateTime) -> Option<DateTime> {
        match self.rule.frequency {
            Frequency::Minutely => self.next_fixed_period(after, 60),
            Frequency::Hourly => self.next_fixed_period(after, 3_600),
            Frequency::Daily => self.next_daily(after),
            Frequency::Weekly => self.next_weekly(after),
            Frequency::Monthly => self.next_monthly(after),
            Frequency::Yearly => self.next_yearly(after),
        }
    }

    fn next_fixed_period(&self, after: DateTime, unit_secs: i64) -> Option<DateTime> {
        let period = unit_secs * self.interval;
        let anchor = self.rule.start_date.unwrap_or(EPOCH_DATE).to_datetime(self.time);
        if after < anchor {
            return Some(anchor);
        }

        let elapsed = after.duration_since(anchor).as_secs();
        let steps = elapsed / period + 1;
        anchor
            .checked_add(SignedDuration::from_secs(steps.checked_mul(period)?))
            .ok()
    }

    fn next_daily(&self, after: DateTime) -> Option<DateTime> {
        let anchor = self.rule.start_date.unwrap_or(after.date());
        let first = anchor.to_datetime(self.time);
        if after < first {
            return Some(first);
        }

        let days = day_diff(after.date(), anchor);
        let base = add_days(anchor, days / self.interval * self.interval)?;
        let candidate = base.to_datetime(self.time);
        if candidate > after {
            return Some(candidate);
        }
        Some(add_days(base, self.interval)?.to_datetime(self.time))
    }

    fn next_weekly(&self, after: DateTime) -> Option<DateTime> {
        let anchor_monday = monday_of(self.rule.start_date.unwrap_or(after.date()))?;
        let from = match self.rule.start_date {
            Some(start) if start > after.date() => start,
            _ => after.date(),
        };

        let window_days = WEEKLY_WINDOW_WEEKS * 7 * self.interval;
        for offset in 0..=window_days {
            let date = add_days(from, offset)?;
            let week = day_diff(monday_of(date)?, anchor_monday) / 7;
            if week % self.interval != 0 {
                continue;
            }
            if !self.weekdays.contains(&date.weekday().to_monday_one_offset()) {
                continue;
            }
            let candidate = date.to_datetime(self.time);
            if candidate > after {
                return Some(candidate);
            }
        }

        None
    }

    fn next_monthly(&self, after: DateTime) -> Option<DateTime> {
        let start = self.rule.start_date;
        let anchor = start.unwrap_or(after.date()).first_of_month();
        let from = match start {
            Some(start) if start > after.date() => start,
            _ => after.date(),
        };

        let mut index = month_index(from) - month_index(anchor);
        let remainder = index % self.interval;
        if remainder != 0 {
            index += self.interval - remainder;
        }

        for _ in 0..MONTHLY_SEARCH_PERIODS {
            let (year, month) = month_from_index(month_index(anchor) + index)?;
            for &day in &self.month_days {
                // a day this month does not have is skipped, not clamped
                let Ok(date) = Date::new(year, month, day) else {
                    continue;
                };
                if start.is_some_and(|s| date < s) {
                    continue;
                }
                let candidate = date.to_datetime(self.time);
                if candidate > after {
                    return Some(candidate);
                }
            }
            index += self.interval;
        }

        None
    }

    fn next_yearly(&self, after: DateTime) -> Option<DateTime> {
        let anchor = self.rule.start_date.unwrap_or(after.date());
        let anchor_year = i64::from(anchor.year());

        let mut index = (i64::from(after.date().year()) - anchor_year).max(0);
        let remainder = index % self.interval;
        if remainder != 0 {
            index += self.interval - remainder;
        }

        for _ in 0..YEARLY_SEARCH_PERIODS {
            let year = i16::try_from(anchor_year + index).ok()?;
            if let Ok(date) = Date::new(year, anchor.month(), anchor.day()) {
                let candidate = date.to_datetime(self.time);
                if candidate > after {
                    return Some(candidate);
                }
            }
            index += self.interval;
        }

        None
    }
}

fn day_diff(later: Date, earlier: Date) -> i64 {
    later.duration_since(earlier).as_secs() / SECONDS_PER_DAY
}

fn add_days(date: Date, days: i64) -> Option<Date> {
    let span = Span::new().try_days(days).ok()?;
    date.checked_add(span).ok()
}

fn monday_of(date: Date) -> Option<Date> {
    let since_monday = i64::from(date.weekday().to_monday_one_offset() - 1);
    add_days(date, -since_monday)
}

fn month_index(date: Date) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month() - 1)
}

fn month_from_index(index: i64) -> Option<(i16, i8)> {
    let year = i16::try_from(index.div_euclid(12)).ok()?;
    let month = i8::try_from(index.rem_euclid(12) + 1).ok()?;
    Some((year, month))
}
