//! Static suggestion catalog
//!
//! Loaded once at startup from TOML and shared read-only afterwards.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

/// Catalog compiled into the binary
const EMBEDDED_CATALOG: &str = include_str!("../../assets/catalog.toml");

/// One suggestible item
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogItem {
    /// Stable identifier used for cooldown tracking
    pub id: String,
    pub title: String,
    /// External link
    pub url: String,
    /// Lowercase matching tags; multi-word tags match as phrases
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Curated bundle offered when the user's message mentions a scenario
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Preset {
    /// Words or phrases that select this bundle
    pub triggers: Vec<String>,
    /// Item ids, in the order they are offered
    pub items: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: Vec<CatalogItem>,
    #[serde(default)]
    presets: Vec<Preset>,
}

/// Ordered, immutable list of catalog items and scenario presets
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<CatalogItem>,
    presets: Vec<Preset>,
}

impl Catalog {
    /// Build a catalog from items, validating ids and normalizing tags
    ///
    /// # Errors
    ///
    /// Returns `Error::Catalog` on duplicate ids or items without a title or URL
    pub fn new(items: Vec<CatalogItem>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(items.len());

        for mut item in items {
            if item.id.trim().is_empty() || item.title.trim().is_empty() || item.url.trim().is_empty() {
                return Err(Error::Catalog(format!(
                    "item {:?} needs an id, a title and a url",
                    item.id
                )));
            }
            if !seen.insert(item.id.clone()) {
                return Err(Error::Catalog(format!("duplicate item id: {}", item.id)));
            }

            item.tags = item
                .tags
                .iter()
                .map(|t| normalize_phrase(t))
                .filter(|t| !t.is_empty())
                .collect();
            normalized.push(item);
        }

        Ok(Self {
            items: normalized,
            presets: Vec::new(),
        })
    }

    /// Attach scenario presets
    ///
    /// # Errors
    ///
    /// Returns `Error::Catalog` when a preset names an unknown item or has no
    /// triggers
    pub fn with_presets(mut self, presets: Vec<Preset>) -> Result<Self> {
        for mut preset in presets {
            preset.triggers = preset
                .triggers
                .iter()
                .map(|t| normalize_phrase(t))
                .filter(|t| !t.is_empty())
                .collect();
            if preset.triggers.is_empty() {
                return Err(Error::Catalog("preset without triggers".to_string()));
            }
            if let Some(missing) = preset.items.iter().find(|id| self.get(id).is_none()) {
                return Err(Error::Catalog(format!("preset names unknown item: {missing}")));
            }
            self.presets.push(preset);
        }
        Ok(self)
    }

    /// Parse a TOML catalog document (`[[items]]` tables)
    ///
    /// # Errors
    ///
    /// Returns error if the document is not valid TOML or fails validation
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::new(file.items)?.with_presets(file.presets)
    }

    /// The catalog shipped with the binary
    ///
    /// # Errors
    ///
    /// Returns error if the embedded document is malformed
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(EMBEDDED_CATALOG)
    }

    /// Load from `path`, or fall back to the embedded catalog
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::embedded();
        };

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Catalog(format!("failed to read {}: {e}", path.display()))
        })?;
        let catalog = Self::from_toml_str(&content)?;

        tracing::info!(path = %path.display(), items = catalog.len(), "loaded suggestion catalog");
        Ok(catalog)
    }

    /// Items in insertion order
    #[must_use]
    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    #[must_use]
    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    /// Item by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items with at least one matching tag, best first
    ///
    /// Score is the number of distinct matching tags. Equal scores keep
    /// catalog order.
    #[must_use]
    pub fn rank(&self, text: &str) -> Vec<(&CatalogItem, usize)> {
        let tokens = Tokens::new(text);

        let mut scored: Vec<(&CatalogItem, usize)> = self
            .items
            .iter()
            .map(|item| (item, item.tags.iter().filter(|t| tokens.matches(t)).count()))
            .filter(|(_, score)| *score > 0)
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored
    }

    /// Items of the first preset with a trigger in `text`
    #[must_use]
    pub fn preset_for(&self, text: &str) -> Vec<&CatalogItem> {
        let tokens = Tokens::new(text);

        self.presets
            .iter()
            .find(|preset| preset.triggers.iter().any(|t| tokens.matches(t)))
            .map(|preset| preset.items.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }
}

/// Lowercased word tokens of a text
#[derive(Debug)]
pub(crate) struct Tokens {
    words: BTreeSet<String>,
    /// Words joined by single spaces, padded, for phrase lookups
    joined: String,
}

impl Tokens {
    pub(crate) fn new(text: &str) -> Self {
        let list: Vec<String> = split_words(text).collect();
        let joined = format!(" {} ", list.join(" "));

        Self {
            words: list.into_iter().collect(),
            joined,
        }
    }

    /// Whether a normalized tag occurs in the text
    ///
    /// Single-word tags also accept a plain `s`/`es` plural.
    pub(crate) fn matches(&self, tag: &str) -> bool {
        if tag.contains(' ') {
            return self.joined.contains(&format!(" {tag} "));
        }

        self.words.contains(tag)
            || self.words.contains(&format!("{tag}s"))
            || self.words.contains(&format!("{tag}es"))
    }
}

fn split_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn normalize_phrase(tag: &str) -> String {
    split_words(tag).collect::<Vec<_>>().join(" ")
}
