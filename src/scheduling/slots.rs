//! Per-channel preferred posting slots

use super::ScheduleError;
use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Preferred local times of day, split by day type, in preference order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTable {
    pub weekday: Vec<NaiveTime>,
    pub weekend: Vec<NaiveTime>,
}

impl SlotTable {
    /// Build from "HH:MM" strings
    pub fn parse(weekday: &[&str], weekend: &[&str]) -> Result<Self, ScheduleError> {
        Ok(Self {
            weekday: parse_slots(weekday)?,
            weekend: parse_slots(weekend)?,
        })
    }

    /// Slots that apply on `date`
    pub fn slots_for(&self, date: NaiveDate) -> &[NaiveTime] {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            &self.weekend
        } else {
            &self.weekday
        }
    }
}

fn parse_slots(raw: &[&str]) -> Result<Vec<NaiveTime>, ScheduleError> {
    raw.iter()
        .map(|slot| {
            NaiveTime::parse_from_str(slot, "%H:%M")
                .map_err(|e| ScheduleError::InvalidRequest(format!("invalid slot '{}': {}", slot, e)))
        })
        .collect()
}

fn on_the_hour(hours: &[u32]) -> Vec<NaiveTime> {
    hours
        .iter()
        .filter_map(|h| NaiveTime::from_hms_opt(*h, 0, 0))
        .collect()
}

/// Built-in engagement slots for the channels the pipelines publish to
pub fn default_slot_tables() -> HashMap<String, SlotTable> {
    HashMap::from([
        (
            "instagram".to_string(),
            SlotTable {
                weekday: on_the_hour(&[8, 12, 17, 20]),
                weekend: on_the_hour(&[10, 14, 19]),
            },
        ),
        (
            "tiktok".to_string(),
            SlotTable {
                weekday: on_the_hour(&[6, 10, 19, 23]),
                weekend: on_the_hour(&[9, 16, 20]),
            },
        ),
        (
            "youtube".to_string(),
            SlotTable {
                weekday: on_the_hour(&[14, 17, 20]),
                weekend: on_the_hour(&[10, 15, 20]),
            },
        ),
    ])
}
