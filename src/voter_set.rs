//! Ordered set of voter identifiers
//!
//! A feedback row carries the identifiers of everyone currently voting for it.
//! Insertion order is kept so listings stay stable, and each identifier
//! appears at most once. The vote count is always `len()` of this set.
//!
//! ## Encoding
//!
//! The canonical on-disk form is a JSON array of strings:
//!
//! ```text
//! ["a1f3...", "b77c..."]
//! ```
//!
//! Older databases used other encodings in the `upvoter_data` column.
//! [`VoterSet::decode_legacy`] reads all of them:
//!
//! - JSON array of strings
//! - JSON array of `{"id": ..., "name": ...}` objects
//! - comma-joined raw ids (`a1,b2`)
//! - comma-joined `id:name` pairs (`a1:Alice,b2:Bob`)

use serde::{Deserialize, Serialize};

use crate::error::BoardError;

/// Insertion-ordered, duplicate-free set of voter identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct VoterSet {
    ids: Vec<String>,
}

/// Result of decoding a legacy voter column
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyVoters {
    pub voters: VoterSet,
    /// `(voter_id, name)` pairs carried inline by the old encoding
    pub names: Vec<(String, String)>,
}

impl VoterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from identifiers, dropping repeats after the first
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for id in ids {
            set.insert(id);
        }
        set
    }

    pub fn contains(&self, voter_id: &str) -> bool {
        self.ids.iter().any(|id| id == voter_id)
    }

    /// Append a voter. Returns false if already present.
    pub fn insert(&mut self, voter_id: impl Into<String>) -> bool {
        let voter_id = voter_id.into();
        if self.contains(&voter_id) {
            return false;
        }
        self.ids.push(voter_id);
        true
    }

    /// Remove a voter. Returns false if absent.
    pub fn remove(&mut self, voter_id: &str) -> bool {
        let before = self.ids.len();
        self.ids.retain(|id| id != voter_id);
        self.ids.len() < before
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    /// Canonical JSON encoding
    pub fn encode(&self) -> String {
        serde_json::to_string(&self.ids).unwrap_or_else(|_| "[]".to_string())
    }

    /// Decode the canonical encoding. NULL/blank values are the empty set.
    pub fn decode(raw: Option<&str>) -> Result<Self, BoardError> {
        let raw = raw.map(str::trim).unwrap_or("");
        if raw.is_empty() {
            return Ok(Self::new());
        }

        let ids: Vec<String> = serde_json::from_str(raw)
            .map_err(|e| BoardError::Persistence(format!("Malformed voter set {:?}: {}", raw, e)))?;
        Ok(Self::from_ids(ids))
    }

    /// Decode any of the historical voter column encodings
    pub fn decode_legacy(raw: Option<&str>) -> Result<LegacyVoters, BoardError> {
        let raw = raw.map(str::trim).unwrap_or("");
        if raw.is_empty() {
            return Ok(LegacyVoters::default());
        }

        if raw.starts_with('[') {
            return decode_legacy_json(raw);
        }

        let mut legacy = LegacyVoters::default();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once(':') {
                Some((id, name)) => {
                    let id = id.trim();
                    if id.is_empty() {
                        continue;
                    }
                    if legacy.voters.insert(id) && !name.trim().is_empty() {
                        legacy.names.push((id.to_string(), name.trim().to_string()));
                    }
                }
                None => {
                    legacy.voters.insert(part);
                }
            }
        }
        Ok(legacy)
    }
}

fn decode_legacy_json(raw: &str) -> Result<LegacyVoters, BoardError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| BoardError::Persistence(format!("Malformed legacy voter list: {}", e)))?;

    let entries = value
        .as_array()
        .ok_or_else(|| BoardError::Persistence("Legacy voter list is not an array".to_string()))?;

    let mut legacy = LegacyVoters::default();
    for entry in entries {
        match entry {
            serde_json::Value::String(id) if !id.is_empty() => {
                legacy.voters.insert(id.as_str());
            }
            serde_json::Value::Object(obj) => {
                // Entries without an id never counted as votes
                let Some(id) = obj.get("id").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) else {
                    continue;
                };
                let name = obj.get("name").and_then(|v| v.as_str()).map(str::trim).unwrap_or("");
                if legacy.voters.insert(id) && !name.is_empty() {
                    legacy.names.push((id.to_string(), name.to_string()));
                }
            }
            _ => {}
        }
    }
    Ok(legacy)
}

impl From<Vec<String>> for VoterSet {
    fn from(ids: Vec<String>) -> Self {
        Self::from_ids(ids)
    }
}

impl From<VoterSet> for Vec<String> {
    fn from(set: VoterSet) -> Self {
        set.ids
    }
}
