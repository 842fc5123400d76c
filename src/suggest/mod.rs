//! Contextual suggestions appended to completed replies
//!
//! Two paths share one ranking:
//! - [`SuggestionMatcher::select`] runs after a reply completes and honors the
//!   per-conversation cooldown
//! - [`SuggestionMatcher::lookup`] serves explicit keyword requests and
//!   ignores the cooldown entirely

mod catalog;
mod memory;

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use catalog::{Catalog, CatalogItem, Preset};
pub use memory::SuggestionMemory;

/// Hard cap on items per selection
pub const MAX_SUGGESTIONS: usize = 3;

/// Header of the trailing block appended to a reply
pub const BLOCK_HEADER: &str = "🛒 Helpful gear for this topic:";

/// Header of an explicit lookup reply
pub const LOOKUP_HEADER: &str = "Suggested items:";

/// Selects catalog items for replies and keyword lookups
#[derive(Debug, Clone)]
pub struct SuggestionMatcher {
    catalog: Arc<Catalog>,
    max_items: usize,
    cooldown: Duration,
}

impl SuggestionMatcher {
    /// `max_items` is clamped to `1..=3`
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, max_items: usize, cooldown: Duration) -> Self {
        Self {
            catalog,
            max_items: max_items.clamp(1, MAX_SUGGESTIONS),
            cooldown,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub const fn max_items(&self) -> usize {
        self.max_items
    }

    /// Pick items for a completed reply and record them in `memory`
    ///
    /// Ranked tag matches come first, then the scenario preset for the query,
    /// de-duplicated by link. The whole selection is withheld when any chosen
    /// item was already suggested to this conversation within the cooldown.
    pub fn select(
        &self,
        memory: &mut SuggestionMemory,
        query: &str,
        reply: &str,
    ) -> Vec<CatalogItem> {
        self.select_at(memory, query, reply, Instant::now())
    }

    fn select_at(
        &self,
        memory: &mut SuggestionMemory,
        query: &str,
        reply: &str,
        now: Instant,
    ) -> Vec<CatalogItem> {
        let text = format!("{query}\n{reply}");
        let ranked = self.catalog.rank(&text);
        let presets = self.catalog.preset_for(query);

        let mut links = HashSet::new();
        let chosen: Vec<&CatalogItem> = ranked
            .into_iter()
            .map(|(item, _)| item)
            .chain(presets)
            .filter(|item| links.insert(item.url.as_str()))
            .take(self.max_items)
            .collect();

        if let Some(cooling) = chosen
            .iter()
            .find(|item| memory.is_cooling(&item.id, self.cooldown, now))
        {
            tracing::debug!(item = %cooling.id, "suggestions suppressed by cooldown");
            return Vec::new();
        }

        for item in &chosen {
            memory.record(&item.id, now);
        }

        chosen.into_iter().cloned().collect()
    }

    /// Top matches for explicit keywords, ranked like [`Self::select`]
    ///
    /// Never consults or updates any cooldown memory.
    #[must_use]
    pub fn lookup(&self, keywords: &str) -> Vec<CatalogItem> {
        self.catalog
            .rank(keywords)
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(item, _)| item.clone())
            .collect()
    }
}

/// Trailing block for a reply; empty when there are no items
#[must_use]
pub fn format_block(items: &[CatalogItem]) -> String {
    if items.is_empty() {
        return String::new();
    }

    let mut block = format!("\n\n{BLOCK_HEADER}");
    push_lines(&mut block, items);
    block
}

/// Standalone reply listing lookup results
#[must_use]
pub fn format_lookup(items: &[CatalogItem]) -> String {
    let mut text = LOOKUP_HEADER.to_string();
    push_lines(&mut text, items);
    text
}

fn push_lines(out: &mut String, items: &[CatalogItem]) {
    for item in items {
        let _ = write!(out, "\n• {}\n  {}", item.title, item.url);
    }
}
