//! Technical-regulation reference table.
//!
//! The dictionary is fetched once (and cached forever), indexed by id, and
//! narrowed to the regulations the operator asked for. A display name looks
//! like `ТР ТС 017/2011 "О безопасности ..."`: the marker, then the code
//! token whose first three characters (`017`) are matched against the
//! requested prefixes.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::{json, Value};

use crate::cache::DiskCache;
use crate::config::{TECH_REG_CACHE_KEY, TECH_REG_MARKER};
use crate::error::{HarvesterError, Result};
use crate::http::{HttpMethod, RetryClient, Transport};
use crate::types::ReferenceEntry;

/// Names of one regulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegulationNames {
    pub display_name: String,
    pub name: String,
}

/// Regulation id → names. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceTable {
    entries: BTreeMap<u64, RegulationNames>,
}

impl ReferenceTable {
    /// Build the full table. On a repeated id the first entry wins.
    pub fn from_entries(entries: impl IntoIterator<Item = ReferenceEntry>) -> Self {
        let mut table = BTreeMap::new();
        for entry in entries {
            if table.contains_key(&entry.id) {
                tracing::warn!(id = entry.id, "Duplicate regulation id in reference table");
                continue;
            }
            table.insert(
                entry.id,
                RegulationNames {
                    display_name: entry.display_name.unwrap_or_default(),
                    name: entry.name.unwrap_or_default(),
                },
            );
        }
        Self { entries: table }
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<&RegulationNames> {
        self.entries.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &RegulationNames)> {
        self.entries.iter().map(|(id, names)| (*id, names))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries carrying the registry marker whose code starts with one of `prefixes`.
    #[must_use]
    pub fn filtered(&self, prefixes: &BTreeSet<String>) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(_, names)| matches_prefixes(&names.display_name, prefixes))
            .map(|(id, names)| (*id, names.clone()))
            .collect();
        Self { entries }
    }

    /// Display names of `regulation_ids`, in order.
    ///
    /// An id missing from the table is an error: a blank name in the export
    /// is indistinguishable from a regulation without a name.
    pub fn display_names(&self, record_id: u64, regulation_ids: &[u64]) -> Result<Vec<&str>> {
        regulation_ids
            .iter()
            .map(|id| {
                self.get(*id)
                    .map(|names| names.display_name.as_str())
                    .ok_or(HarvesterError::UnknownRegulation {
                        record_id,
                        regulation_id: *id,
                    })
            })
            .collect()
    }
}

/// Regulation code prefix of a display name: first three characters of the third word.
///
/// # Examples
/// ```
/// use fsa_harvester::reference::regulation_code;
///
/// assert_eq!(
///     regulation_code("ТР ТС 017/2011 \"О безопасности продукции\""),
///     Some("017".to_string())
/// );
/// assert_eq!(regulation_code("ТР ТС"), None);
/// ```
#[must_use]
pub fn regulation_code(display_name: &str) -> Option<String> {
    display_name
        .split_whitespace()
        .nth(2)
        .map(|token| token.chars().take(3).collect())
}

/// Whether a display name carries the marker and a requested code.
#[must_use]
pub fn matches_prefixes(display_name: &str, prefixes: &BTreeSet<String>) -> bool {
    if !display_name.starts_with(TECH_REG_MARKER) {
        return false;
    }
    regulation_code(display_name).is_some_and(|code| prefixes.contains(&code))
}

/// Accepted shapes of the dictionary document.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReferenceDocument {
    List(Vec<ReferenceEntry>),
    Wrapped { items: Vec<ReferenceEntry> },
}

/// Decode the dictionary document, rejecting one without entries.
pub fn parse_reference_document(value: &Value) -> Result<Vec<ReferenceEntry>> {
    if value.is_null() {
        return Err(HarvesterError::DataRetrieval(
            "technical-regulation dictionary is empty".into(),
        ));
    }

    let entries = match ReferenceDocument::deserialize(value) {
        Ok(ReferenceDocument::List(entries) | ReferenceDocument::Wrapped { items: entries }) => {
            entries
        }
        Err(e) => {
            return Err(HarvesterError::DataRetrieval(format!(
                "unrecognized technical-regulation dictionary: {e}"
            )))
        }
    };

    if entries.is_empty() {
        return Err(HarvesterError::DataRetrieval(
            "technical-regulation dictionary has no entries".into(),
        ));
    }
    Ok(entries)
}

/// Fetch the dictionary (through the cache) and derive the filtered subset.
///
/// # Returns
/// `(full_table, filtered_subset)`; the subset's ids are the listing filter.
pub fn resolve<T: Transport>(
    client: &RetryClient<T>,
    cache: &DiskCache,
    url: &str,
    prefixes: &BTreeSet<String>,
) -> Result<(ReferenceTable, ReferenceTable)> {
    let document = cache.get_or_fetch(TECH_REG_CACHE_KEY, || {
        let value = client.request(url, HttpMethod::Get, &json!({}))?;
        // Validate before the document is cached
        parse_reference_document(&value)?;
        Ok(value)
    })?;

    let full = ReferenceTable::from_entries(parse_reference_document(&document)?);
    let filtered = full.filtered(prefixes);

    tracing::info!(
        regulations = full.len(),
        selected = filtered.len(),
        "Technical regulations resolved"
    );
    if filtered.is_empty() {
        tracing::warn!(?prefixes, "No technical regulation matches the requested prefixes");
    }

    Ok((full, filtered))
}
