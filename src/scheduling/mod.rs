//! Content dispatch scheduling
//!
//! Computes, per destination channel, when a piece of content should go out:
//! - immediate: now
//! - optimal: next preferred slot from the channel's slot table
//! - specific: a caller-supplied timestamp
//! - recurring: first occurrence of a daily/weekly/monthly series
//!
//! Pure computation apart from the optional collision hook.

pub mod availability;

pub mod recurrence;

pub mod slots;

use crate::config::SchedulerConfig;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use uuid::Uuid;

pub use availability::{AlwaysAvailable, SlotAvailability, SlotBook};
pub use recurrence::{Frequency, Recurrence};
pub use slots::{default_slot_tables, SlotTable};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid schedule request: {0}")]
    InvalidRequest(String),
}

/// How dispatch times are chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScheduleMode {
    Immediate,
    Optimal,
    Specific { at: DateTime<Utc> },
    Recurring(Recurrence),
}

impl ScheduleMode {
    /// Build a mode from its loose parts, as found in node configuration
    pub fn from_parts(
        mode: &str,
        specific_time: Option<DateTime<Utc>>,
        recurrence: Option<Recurrence>,
    ) -> Result<Self, ScheduleError> {
        match mode {
            "immediate" => Ok(ScheduleMode::Immediate),
            "optimal" => Ok(ScheduleMode::Optimal),
            "specific" => specific_time
                .map(|at| ScheduleMode::Specific { at })
                .ok_or_else(|| ScheduleError::InvalidRequest("specific mode requires a time".into())),
            "recurring" => {
                let recurrence = recurrence
                    .ok_or_else(|| ScheduleError::InvalidRequest("recurring mode requires a recurrence".into()))?;
                recurrence.validate()?;
                Ok(ScheduleMode::Recurring(recurrence))
            }
            other => Err(ScheduleError::InvalidRequest(format!("unknown schedule mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
}

/// Dispatch time for one piece of content on one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: String,
    pub content_id: String,
    pub channel: String,
    pub scheduled_time: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
}

pub struct ContentScheduler {
    slot_tables: HashMap<String, SlotTable>,
    offset: FixedOffset,
    fallback_delay: Duration,
    availability: Arc<dyn SlotAvailability>,
}

impl std::fmt::Debug for ContentScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentScheduler")
            .field("channels", &self.slot_tables.keys().collect::<Vec<_>>())
            .field("offset", &self.offset)
            .field("fallback_delay", &self.fallback_delay)
            .finish()
    }
}

impl Default for ContentScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentScheduler {
    /// Built-in slot tables, UTC, one-hour fallback, no collision checks
    pub fn new() -> Self {
        Self {
            slot_tables: default_slot_tables(),
            offset: Utc.fix(),
            fallback_delay: Duration::hours(1),
            availability: Arc::new(AlwaysAvailable),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self, ScheduleError> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            ScheduleError::InvalidRequest(format!("UTC offset out of range: {} minutes", config.utc_offset_minutes))
        })?;

        let mut scheduler = Self::new().with_utc_offset(offset);
        scheduler.fallback_delay = Duration::minutes(config.fallback_delay_minutes.max(0));
        if config.min_slot_spacing_minutes > 0 {
            scheduler.availability = Arc::new(SlotBook::new(Duration::minutes(config.min_slot_spacing_minutes)));
        }
        Ok(scheduler)
    }

    pub fn with_slot_table(mut self, channel: impl Into<String>, table: SlotTable) -> Self {
        self.slot_tables.insert(channel.into(), table);
        self
    }

    pub fn with_availability(mut self, availability: Arc<dyn SlotAvailability>) -> Self {
        self.availability = availability;
        self
    }

    /// Offset in which slot tables are interpreted
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.slot_tables.keys().map(String::as_str)
    }

    /// Schedule `content_id` on every channel, relative to the current time
    pub async fn schedule_content(
        &self,
        content_id: &str,
        channels: &[String],
        mode: &ScheduleMode,
    ) -> Vec<ScheduleEntry> {
        self.schedule_content_at(Utc::now(), content_id, channels, mode).await
    }

    /// Same as `schedule_content` with an explicit "now"
    pub async fn schedule_content_at(
        &self,
        now: DateTime<Utc>,
        content_id: &str,
        channels: &[String],
        mode: &ScheduleMode,
    ) -> Vec<ScheduleEntry> {
        let mut entries = Vec::with_capacity(channels.len());

        for channel in channels {
            let scheduled_time = match mode {
                ScheduleMode::Immediate => now,
                ScheduleMode::Optimal => self.optimal_time(channel, now).await,
                ScheduleMode::Specific { at } => *at,
                ScheduleMode::Recurring(recurrence) => recurrence.first_occurrence(now),
            };

            self.availability.reserve(channel, scheduled_time, now).await;
            tracing::debug!("🗓️ Scheduled '{}' on {} at {}", content_id, channel, scheduled_time);

            entries.push(ScheduleEntry {
                id: Uuid::new_v4().to_string(),
                content_id: content_id.to_string(),
                channel: channel.clone(),
                scheduled_time,
                status: ScheduleStatus::Pending,
                created_at: now,
            });
        }

        tracing::info!("🗓️ Scheduled content '{}' on {} channel(s) ({:?})", content_id, entries.len(), mode_name(mode));
        entries
    }

    /// Next available preferred slot strictly after `now`, looking at the rest
    /// of today and then all of tomorrow; `now + fallback` otherwise.
    pub async fn optimal_time(&self, channel: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let Some(table) = self.slot_tables.get(channel) else {
            tracing::warn!("⏭️ No slot table for channel '{}', applying +{} min fallback", channel, self.fallback_delay.num_minutes());
            return now + self.fallback_delay;
        };

        let local_now = now.with_timezone(&self.offset);
        let today = local_now.date_naive();
        let remaining_today = table
            .slots_for(today)
            .iter()
            .filter(|slot| **slot > local_now.time())
            .map(|slot| today.and_time(*slot));

        let tomorrow_slots: Vec<_> = today
            .succ_opt()
            .map(|tomorrow: NaiveDate| {
                table
                    .slots_for(tomorrow)
                    .iter()
                    .map(|slot| tomorrow.and_time(*slot))
                    .collect()
            })
            .unwrap_or_default();

        for candidate in remaining_today.chain(tomorrow_slots) {
            let Some(at) = self.offset.from_local_datetime(&candidate).single() else {
                continue;
            };
            let at = at.with_timezone(&Utc);
            if self.availability.is_slot_available(channel, at).await {
                return at;
            }
            tracing::debug!("⛔ Slot {} on {} is taken", at, channel);
        }

        tracing::warn!("⏭️ No free slot for channel '{}' today or tomorrow, applying +{} min fallback", channel, self.fallback_delay.num_minutes());
        now + self.fallback_delay
    }

    /// Full occurrence sequence of a recurrence (entries only carry the first)
    pub fn occurrences(&self, recurrence: &Recurrence, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        recurrence.occurrences(now)
    }
}

fn mode_name(mode: &ScheduleMode) -> &'static str {
    match mode {
        ScheduleMode::Immediate => "immediate",
        ScheduleMode::Optimal => "optimal",
        ScheduleMode::Specific { .. } => "specific",
        ScheduleMode::Recurring(_) => "recurring",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    fn channels(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    // 2024-03-05 is a Tuesday, 2024-03-08 a Friday, 2024-03-09 a Saturday.

    #[tokio::test]
    async fn optimal_picks_next_slot_today() {
        let scheduler = ContentScheduler::new();
        assert_eq!(scheduler.optimal_time("instagram", at(5, 9, 30)).await, at(5, 12, 0));
    }

    #[tokio::test]
    async fn optimal_slot_must_be_strictly_after_now() {
        let scheduler = ContentScheduler::new();
        assert_eq!(scheduler.optimal_time("instagram", at(5, 12, 0)).await, at(5, 17, 0));
    }

    #[tokio::test]
    async fn optimal_rolls_over_to_tomorrow() {
        let scheduler = ContentScheduler::new();
        assert_eq!(scheduler.optimal_time("instagram", at(5, 21, 0)).await, at(6, 8, 0));
    }

    #[tokio::test]
    async fn rollover_into_weekend_uses_weekend_table() {
        let scheduler = ContentScheduler::new();
        assert_eq!(scheduler.optimal_time("instagram", at(8, 21, 0)).await, at(9, 10, 0));
    }

    #[tokio::test]
    async fn unknown_channel_falls_back_one_hour() {
        let scheduler = ContentScheduler::new();
        assert_eq!(scheduler.optimal_time("mastodon", at(5, 9, 30)).await, at(5, 10, 30));
    }

    #[tokio::test]
    async fn slot_tables_follow_utc_offset() {
        let scheduler = ContentScheduler::new().with_utc_offset(FixedOffset::east_opt(2 * 3600).unwrap());
        // 09:30 UTC is 11:30 local; next local slot 12:00 is 10:00 UTC
        assert_eq!(scheduler.optimal_time("instagram", at(5, 9, 30)).await, at(5, 10, 0));
    }

    #[tokio::test]
    async fn collision_hook_skips_taken_slots() {
        let book = Arc::new(SlotBook::new(Duration::minutes(60)));
        let scheduler = ContentScheduler::new().with_availability(book.clone());
        let now = at(5, 9, 30);

        let first = scheduler.schedule_content_at(now, "c1", &channels(&["instagram"]), &ScheduleMode::Optimal).await;
        let second = scheduler.schedule_content_at(now, "c2", &channels(&["instagram"]), &ScheduleMode::Optimal).await;

        assert_eq!(first[0].scheduled_time, at(5, 12, 0));
        assert_eq!(second[0].scheduled_time, at(5, 17, 0));
        assert_eq!(book.reserved("instagram").len(), 2);
    }

    #[tokio::test]
    async fn one_entry_per_channel_with_fresh_ids() {
        let scheduler = ContentScheduler::new();
        let when = at(20, 18, 0);
        let entries = scheduler
            .schedule_content_at(at(5, 9, 0), "content-1", &channels(&["instagram", "tiktok"]), &ScheduleMode::Specific { at: when })
            .await;

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.scheduled_time == when && e.status == ScheduleStatus::Pending));
        assert!(entries.iter().all(|e| e.content_id == "content-1"));
        assert_ne!(entries[0].id, entries[1].id);
    }

    #[tokio::test]
    async fn recurring_returns_first_occurrence() {
        let scheduler = ContentScheduler::new();
        let recurrence = Recurrence::new(Frequency::Daily, 1).between(at(10, 8, 0), at(15, 8, 0));
        let entries = scheduler
            .schedule_content_at(at(5, 9, 0), "c", &channels(&["youtube"]), &ScheduleMode::Recurring(recurrence.clone()))
            .await;

        assert_eq!(entries[0].scheduled_time, at(10, 8, 0));
        assert_eq!(scheduler.occurrences(&recurrence, at(5, 9, 0)).len(), 6);
    }

    #[tokio::test]
    async fn immediate_uses_now() {
        let scheduler = ContentScheduler::new();
        let now = at(5, 9, 0);
        let entries = scheduler.schedule_content_at(now, "c", &channels(&["tiktok"]), &ScheduleMode::Immediate).await;
        assert_eq!(entries[0].scheduled_time, now);
    }

    #[test]
    fn mode_from_parts_validates() {
        assert_eq!(ScheduleMode::from_parts("optimal", None, None).unwrap(), ScheduleMode::Optimal);
        assert!(ScheduleMode::from_parts("specific", None, None).is_err());
        assert!(ScheduleMode::from_parts("recurring", None, None).is_err());
        assert!(ScheduleMode::from_parts("sometimes", None, None).is_err());

        let oversized = Recurrence::new(Frequency::Daily, 100_000_000);
        assert!(matches!(
            ScheduleMode::from_parts("recurring", None, Some(oversized)),
            Err(ScheduleError::InvalidRequest(msg)) if msg.contains("100000000")
        ));
    }

    #[test]
    fn entry_wire_shape_is_camel_case() {
        let entry = ScheduleEntry {
            id: "e".into(),
            content_id: "c".into(),
            channel: "instagram".into(),
            scheduled_time: at(5, 12, 0),
            status: ScheduleStatus::Pending,
            created_at: at(5, 9, 0),
        };
        let wire = serde_json::to_value(&entry).unwrap();
        assert_eq!(wire["contentId"], "c");
        assert_eq!(wire["status"], "pending");
        assert_eq!(wire["scheduledTime"], "2024-03-05T12:00:00Z");
    }

    #[test]
    fn mode_deserializes_from_tagged_json() {
        let mode: ScheduleMode = serde_json::from_value(serde_json::json!({
            "mode": "recurring", "frequency": "weekly", "interval": 2
        }))
        .unwrap();
        assert_eq!(mode, ScheduleMode::Recurring(Recurrence::new(Frequency::Weekly, 2)));
    }
}
