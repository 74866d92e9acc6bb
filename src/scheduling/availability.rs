//! Slot collision hooks
//!
//! The scheduler asks the hook before committing to a candidate slot and
//! reports every slot it hands out. Implementations may call out over the
//! network, so the hook is async and may take arbitrarily long.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[async_trait]
pub trait SlotAvailability: Send + Sync {
    async fn is_slot_available(&self, channel: &str, at: DateTime<Utc>) -> bool;

    /// Called once per produced schedule entry, with the scheduler's "now"
    async fn reserve(&self, _channel: &str, _at: DateTime<Utc>, _now: DateTime<Utc>) {}
}

/// Every slot is free
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAvailable;

#[async_trait]
impl SlotAvailability for AlwaysAvailable {
    async fn is_slot_available(&self, _channel: &str, _at: DateTime<Utc>) -> bool {
        true
    }
}

/// Keeps posts on one channel at least `min_spacing` apart
#[derive(Debug)]
pub struct SlotBook {
    min_spacing: Duration,
    bookings: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl SlotBook {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            bookings: RwLock::new(HashMap::new()),
        }
    }

    pub fn reserved(&self, channel: &str) -> Vec<DateTime<Utc>> {
        self.bookings.read().get(channel).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SlotAvailability for SlotBook {
    async fn is_slot_available(&self, channel: &str, at: DateTime<Utc>) -> bool {
        self.bookings.read().get(channel).map_or(true, |slots| {
            slots.iter().all(|booked| {
                let gap = if *booked > at { *booked - at } else { at - *booked };
                gap >= self.min_spacing
            })
        })
    }

    /// Also forgets bookings that can no longer collide with anything at or
    /// after `now`
    async fn reserve(&self, channel: &str, at: DateTime<Utc>, now: DateTime<Utc>) {
        let horizon = now - self.min_spacing;
        let mut bookings = self.bookings.write();
        bookings.entry(channel.to_string()).or_default().push(at);
        bookings.retain(|_, slots| {
            slots.retain(|booked| *booked > horizon);
            !slots.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn slot_book_enforces_spacing_per_channel() {
        let book = SlotBook::new(Duration::minutes(30));
        let noon = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        book.reserve("instagram", noon, noon - Duration::hours(3)).await;

        assert!(!book.is_slot_available("instagram", noon + Duration::minutes(29)).await);
        assert!(!book.is_slot_available("instagram", noon - Duration::minutes(29)).await);
        assert!(book.is_slot_available("instagram", noon + Duration::minutes(30)).await);
        assert!(book.is_slot_available("tiktok", noon).await);
    }

    #[tokio::test]
    async fn reserving_prunes_bookings_behind_now() {
        let book = SlotBook::new(Duration::minutes(30));
        let morning = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();
        book.reserve("instagram", morning, morning - Duration::hours(1)).await;
        book.reserve("tiktok", morning, morning - Duration::hours(1)).await;

        // Next day: the 08:00 bookings are far behind
        let next_day = morning + Duration::days(1);
        book.reserve("instagram", next_day + Duration::hours(4), next_day).await;

        assert_eq!(book.reserved("instagram"), vec![next_day + Duration::hours(4)]);
        assert!(book.reserved("tiktok").is_empty());

        // A booking still within spacing of now survives
        let edge = next_day + Duration::hours(5);
        book.reserve("instagram", edge, next_day + Duration::hours(4) + Duration::minutes(20)).await;
        assert_eq!(book.reserved("instagram").len(), 2);
    }
}
