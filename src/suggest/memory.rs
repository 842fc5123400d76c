//! Per-conversation record of recently suggested items

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

/// Item ids remembered per conversation
const DEFAULT_CAPACITY: usize = 32;

/// Bounded map of item id to the time it was last suggested
#[derive(Debug)]
pub struct SuggestionMemory {
    recent: LruCache<String, Instant>,
}

impl Default for SuggestionMemory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SuggestionMemory {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            recent: LruCache::new(capacity),
        }
    }

    /// Whether `id` was suggested less than `cooldown` before `now`
    #[must_use]
    pub fn is_cooling(&self, id: &str, cooldown: Duration, now: Instant) -> bool {
        self.recent
            .peek(id)
            .is_some_and(|at| now.saturating_duration_since(*at) < cooldown)
    }

    /// Remember that `id` was suggested at `now`
    pub fn record(&mut self, id: &str, now: Instant) {
        self.recent.put(id.to_string(), now);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}
