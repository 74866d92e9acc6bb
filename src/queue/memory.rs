//! In-memory sorted-set backend
//!
//! Same ordering contract as the Redis backend (score ascending, ties by
//! arrival). All operations take one mutex, so pop-minimum is atomic within
//! the process.

use super::{QueueBackend, QueueResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy)]
struct Rank {
    score: f64,
    seq: u64,
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Rank {}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Default)]
struct Sets {
    next_seq: u64,
    sets: HashMap<String, BTreeMap<Rank, String>>,
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    inner: Mutex<Sets>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Resolve Redis-style inclusive rank bounds against `len`
fn rank_window(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl QueueBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn add_with_score(&self, key: &str, member: String, score: f64) -> QueueResult<()> {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(Rank { score, seq }, member);
        Ok(())
    }

    async fn pop_min(&self, key: &str, count: usize) -> QueueResult<Vec<(String, f64)>> {
        let mut inner = self.inner.lock();
        let Some(set) = inner.sets.get_mut(key) else {
            return Ok(Vec::new());
        };

        let mut popped = Vec::with_capacity(count.min(set.len()));
        while popped.len() < count {
            match set.pop_first() {
                Some((rank, member)) => popped.push((member, rank.score)),
                None => break,
            }
        }
        if set.is_empty() {
            inner.sets.remove(key);
        }
        Ok(popped)
    }

    async fn cardinality(&self, key: &str) -> QueueResult<u64> {
        Ok(self.inner.lock().sets.get(key).map_or(0, |set| set.len() as u64))
    }

    async fn range_by_rank(&self, key: &str, start: isize, stop: isize) -> QueueResult<Vec<String>> {
        let inner = self.inner.lock();
        let Some(set) = inner.sets.get(key) else {
            return Ok(Vec::new());
        };
        let Some((start, stop)) = rank_window(set.len(), start, stop) else {
            return Ok(Vec::new());
        };
        Ok(set
            .values()
            .skip(start)
            .take(stop - start + 1)
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> QueueResult<()> {
        self.inner.lock().sets.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn equal_scores_pop_in_arrival_order() {
        let backend = InMemoryBackend::new();
        for member in ["first", "second", "third"] {
            backend.add_with_score("k", member.into(), 5.0).await.unwrap();
        }
        let popped: Vec<String> = backend
            .pop_min("k", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        assert_eq!(popped, vec!["first", "second", "third"]);
        assert_eq!(backend.cardinality("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn range_supports_negative_ranks() {
        let backend = InMemoryBackend::new();
        backend.add_with_score("k", "b".into(), 2.0).await.unwrap();
        backend.add_with_score("k", "a".into(), 1.0).await.unwrap();
        backend.add_with_score("k", "c".into(), 3.0).await.unwrap();

        assert_eq!(backend.range_by_rank("k", 0, 0).await.unwrap(), vec!["a"]);
        assert_eq!(backend.range_by_rank("k", -1, -1).await.unwrap(), vec!["c"]);
        assert_eq!(backend.range_by_rank("k", 0, -1).await.unwrap(), vec!["a", "b", "c"]);
        assert!(backend.range_by_rank("k", 5, 9).await.unwrap().is_empty());
        assert!(backend.range_by_rank("missing", 0, -1).await.unwrap().is_empty());
    }

    #[test]
    fn rank_window_edges() {
        assert_eq!(rank_window(0, 0, -1), None);
        assert_eq!(rank_window(3, -5, 1), Some((0, 1)));
        assert_eq!(rank_window(3, 1, 10), Some((1, 2)));
        assert_eq!(rank_window(3, 2, 1), None);
    }
}
