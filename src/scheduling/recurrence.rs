//! Recurring schedules

use super::ScheduleError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on generated occurrences for one recurrence
pub const MAX_OCCURRENCES: usize = 1_000;

/// Largest accepted `interval`, in frequency units
pub const MAX_INTERVAL: u32 = 3_650;

/// Window used when a recurrence has no end
pub const DEFAULT_HORIZON_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    /// Fixed 30-day step, not calendar months
    Monthly,
}

impl Frequency {
    pub fn unit_days(self) -> i64 {
        match self {
            Frequency::Daily => 1,
            Frequency::Weekly => 7,
            Frequency::Monthly => 30,
        }
    }
}

fn default_interval() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recurrence {
    pub frequency: Frequency,
    /// Units between occurrences; 0 is treated as 1
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Defaults to "now"
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive; defaults to 30 days after "now"
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl Recurrence {
    pub fn new(frequency: Frequency, interval: u32) -> Self {
        Self {
            frequency,
            interval,
            start_time: None,
            end_time: None,
        }
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// Reject intervals too large to describe a publishing cadence
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.interval > MAX_INTERVAL {
            return Err(ScheduleError::InvalidRequest(format!(
                "recurrence interval {} exceeds {}",
                self.interval, MAX_INTERVAL
            )));
        }
        Ok(())
    }

    /// Distance between two occurrences
    pub fn step(&self) -> Duration {
        // u32 interval times at most 30 days stays far inside TimeDelta's range
        Duration::days(self.frequency.unit_days() * i64::from(self.interval.max(1)))
    }

    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.start_time.unwrap_or(now)
    }

    /// Full ordered occurrence sequence from start until past the end.
    /// Stops early where the next step would leave the representable range.
    pub fn occurrences(&self, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let start = self.start(now);
        let end = self
            .end_time
            .or_else(|| now.checked_add_signed(Duration::days(DEFAULT_HORIZON_DAYS)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let step = self.step();

        let mut occurrences = Vec::new();
        let mut next = Some(start);
        while let Some(current) = next {
            if current > end || occurrences.len() >= MAX_OCCURRENCES {
                break;
            }
            occurrences.push(current);
            next = current.checked_add_signed(step);
        }
        occurrences
    }

    /// The occurrence a schedule entry is created for; the start time when
    /// the window is empty
    pub fn first_occurrence(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.occurrences(now)
            .first()
            .copied()
            .unwrap_or_else(|| self.start(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()
    }

    #[test]
    fn daily_sequence_includes_end() {
        let recurrence = Recurrence::new(Frequency::Daily, 1).between(at(1), at(4));
        assert_eq!(recurrence.occurrences(at(1)), vec![at(1), at(2), at(3), at(4)]);
    }

    #[test]
    fn weekly_interval_two() {
        let recurrence = Recurrence::new(Frequency::Weekly, 2).between(at(1), at(31));
        assert_eq!(recurrence.occurrences(at(1)), vec![at(1), at(15), at(29)]);
    }

    #[test]
    fn monthly_is_thirty_days() {
        let start = at(1);
        let recurrence = Recurrence::new(Frequency::Monthly, 1).between(start, start + Duration::days(65));
        let occurrences = recurrence.occurrences(start);
        assert_eq!(occurrences.len(), 3);
        assert_eq!(occurrences[1] - occurrences[0], Duration::days(30));
    }

    #[test]
    fn zero_interval_does_not_loop() {
        let recurrence = Recurrence::new(Frequency::Daily, 0).between(at(1), at(3));
        assert_eq!(recurrence.occurrences(at(1)).len(), 3);
    }

    #[test]
    fn huge_interval_yields_only_the_start() {
        let recurrence = Recurrence::new(Frequency::Daily, 100_000_000).between(at(1), at(1) + Duration::days(366));
        assert_eq!(recurrence.occurrences(at(1)), vec![at(1)]);

        let open_ended = Recurrence::new(Frequency::Monthly, u32::MAX).between(at(1), DateTime::<Utc>::MAX_UTC);
        assert_eq!(open_ended.occurrences(at(1)), vec![at(1)]);
        assert_eq!(open_ended.first_occurrence(at(1)), at(1));
    }

    #[test]
    fn validate_bounds_interval() {
        assert!(Recurrence::new(Frequency::Weekly, MAX_INTERVAL).validate().is_ok());
        assert!(matches!(
            Recurrence::new(Frequency::Daily, 3_000_000_000).validate(),
            Err(ScheduleError::InvalidRequest(_))
        ));
    }

    #[test]
    fn empty_window_falls_back_to_start() {
        let recurrence = Recurrence::new(Frequency::Daily, 1).between(at(5), at(2));
        assert!(recurrence.occurrences(at(1)).is_empty());
        assert_eq!(recurrence.first_occurrence(at(1)), at(5));
    }

    #[test]
    fn defaults_span_thirty_days_from_now() {
        let recurrence: Recurrence = serde_json::from_value(serde_json::json!({ "frequency": "daily" })).unwrap();
        assert_eq!(recurrence.interval, 1);
        assert_eq!(recurrence.occurrences(at(1)).len(), 31);
    }
}
