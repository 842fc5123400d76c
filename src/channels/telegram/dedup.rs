//! Webhook update de-duplication
//!
//! Telegram re-delivers an update when the webhook answers slowly or fails.
//! Update IDs seen within the TTL are reported as duplicates.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Default dedup TTL (5 minutes)
const DEDUP_TTL_SECS: u64 = 300;

/// Maximum remembered update IDs
const DEDUP_MAX_ENTRIES: usize = 2000;

/// Recently seen update IDs, oldest first
#[derive(Debug)]
pub struct UpdateDedup {
    seen: HashMap<i64, Instant>,
    order: VecDeque<i64>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for UpdateDedup {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEDUP_TTL_SECS), DEDUP_MAX_ENTRIES)
    }
}

impl UpdateDedup {
    /// Create a cache with an explicit TTL and capacity
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            seen: HashMap::new(),
            order: VecDeque::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Record `update_id`; returns `true` if it was already seen within the TTL
    pub fn is_duplicate(&mut self, update_id: i64) -> bool {
        self.is_duplicate_at(update_id, Instant::now())
    }

    fn is_duplicate_at(&mut self, update_id: i64, now: Instant) -> bool {
        // Expire from the front; insertion order is time order
        while let Some(&oldest) = self.order.front() {
            let expired = self
                .seen
                .get(&oldest)
                .is_none_or(|ts| now.duration_since(*ts) >= self.ttl);
            if !expired && self.order.len() < self.max_entries {
                break;
            }
            self.order.pop_front();
            self.seen.remove(&oldest);
        }

        if self.seen.contains_key(&update_id) {
            return true;
        }

        self.seen.insert(update_id, now);
        self.order.push_back(update_id);
        false
    }

    /// Number of remembered update IDs
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing is remembered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
