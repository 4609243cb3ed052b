//! Source catalog built from a completion event.
//!
//! Each record is reachable two ways: by its ordinal (`"Source 3"`) and by its
//! cleaned display name. Ordinal keys live apart from name keys, so a source
//! literally titled `Source 1` can never shadow ordinal 1.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument, warn};

use citeflow_shared::{CitationMarker, CitationsConfig, SourceRecord};

static ORDINAL_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*sources?\s+(\d+)\s*$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Name cleaning
// ---------------------------------------------------------------------------

/// Turns upstream titles and file names into display names.
#[derive(Debug, Clone)]
pub struct NameCleaner {
    prefixes: Vec<String>,
}

impl NameCleaner {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &CitationsConfig) -> Self {
        Self::new(config.noise_prefixes.iter().cloned())
    }

    /// Clean a raw title.
    ///
    /// Keeps the last path segment, strips noise prefixes (case-insensitive,
    /// repeatedly), replaces `:` with `-`, drops square brackets and collapses
    /// whitespace. The result never contains `:`, so it is safe inside a
    /// citation marker.
    pub fn clean(&self, raw: &str) -> String {
        let trimmed = raw.trim().trim_end_matches(['/', '\\']);
        let mut name = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed).trim();

        while let Some(rest) = self.strip_prefix(name) {
            name = rest.trim_start();
        }

        name.replace(':', "-")
            .replace(['[', ']'], "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn strip_prefix<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.prefixes.iter().find_map(|prefix| {
            let head = name.get(..prefix.len())?;
            head.eq_ignore_ascii_case(prefix).then(|| &name[prefix.len()..])
        })
    }
}

impl Default for NameCleaner {
    fn default() -> Self {
        Self::from_config(&CitationsConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// One catalog entry: the upstream record and the marker it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub record: SourceRecord,
    pub marker: CitationMarker,
}

/// Reference key → citation entry for one assistant turn. Immutable once built.
#[derive(Debug, Clone)]
pub struct SourceCatalog {
    entries: Vec<CatalogEntry>,
    ordinals: BTreeMap<u32, usize>,
    names: HashMap<String, usize>,
    cleaner: NameCleaner,
}

impl SourceCatalog {
    /// Build the catalog from a completion event's records.
    #[instrument(skip_all, fields(records = records.len()))]
    pub fn build(records: &[SourceRecord], cleaner: &NameCleaner) -> Self {
        let mut entries = Vec::with_capacity(records.len());
        let mut ordinals = BTreeMap::new();
        let mut names: HashMap<String, usize> = HashMap::new();

        for record in records {
            let index = entries.len();
            let name = display_name(record, cleaner);

            if ordinals.insert(record.ordinal, index).is_some() {
                warn!(ordinal = record.ordinal, "duplicate source ordinal, later record wins");
            }
            if let Some(previous) = names.insert(name.to_lowercase(), index) {
                let earlier: &CatalogEntry = &entries[previous];
                warn!(
                    name = %name,
                    earlier = earlier.record.ordinal,
                    later = record.ordinal,
                    "sources share a display name, name lookups resolve to the later one"
                );
            }

            entries.push(CatalogEntry {
                marker: CitationMarker {
                    name,
                    doc_id: record.doc_id.clone(),
                    source_url: record.source_url.clone().unwrap_or_default(),
                },
                record: record.clone(),
            });
        }

        debug!(
            entries = entries.len(),
            names = names.len(),
            "source catalog built"
        );

        Self {
            entries,
            ordinals,
            names,
            cleaner: cleaner.clone(),
        }
    }

    /// Look up by ordinal.
    pub fn by_ordinal(&self, ordinal: u32) -> Option<&CatalogEntry> {
        self.ordinals.get(&ordinal).map(|&i| &self.entries[i])
    }

    /// Look up by display name. The input is cleaned first, and matching
    /// ignores case.
    pub fn by_name(&self, name: &str) -> Option<&CatalogEntry> {
        let key = self.cleaner.clean(name).to_lowercase();
        if key.is_empty() {
            return None;
        }
        self.names.get(&key).map(|&i| &self.entries[i])
    }

    /// Look up by either key form: `"Source N"` or a display name.
    pub fn get(&self, key: &str) -> Option<&CatalogEntry> {
        match ORDINAL_KEY_RE
            .captures(key)
            .and_then(|c| c[1].parse::<u32>().ok())
        {
            Some(ordinal) => self.by_ordinal(ordinal),
            None => self.by_name(key),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

}

/// Explicit title first; an empty title or one that is just the raw document
/// id falls back to `Source N`.
fn display_name(record: &SourceRecord, cleaner: &NameCleaner) -> String {
    let cleaned = cleaner.clean(&record.title);
    let is_raw_id = !record.doc_id.is_empty() && cleaned == cleaner.clean(&record.doc_id);
    if cleaned.is_empty() || is_raw_id {
        record.ordinal_key()
    } else {
        cleaned
    }
}
