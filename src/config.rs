//! Import and matching settings
//!
//! Every field has a default, so an empty JSON object (or no file at all) is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::columns::{AliasTable, Field, DEFAULT_SOFT_MATCH_MIN_LEN};
use crate::error::Result;
use crate::records::{DEFAULT_ACCEPTED_STATUSES, DEFAULT_HEADER_LITERALS};

/// Quotes older than this are refetched
pub const DEFAULT_QUOTE_TTL_SECS: u64 = 15 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconcileConfig {
    /// Minimum length of the contained side of a soft column match
    pub soft_match_min_len: usize,
    /// Additional header names per field, tried after the built-in ones
    pub extra_aliases: BTreeMap<Field, Vec<String>>,
    /// Ticker values that mean "this row is a repeated header"
    pub header_literals: Vec<String>,
    /// Statuses that count as executed, compared after normalization
    pub accepted_statuses: Vec<String>,
    /// Collapse identical trades (merging overlapping exports)
    pub dedupe_identical_records: bool,
    pub quote_ttl_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            soft_match_min_len: DEFAULT_SOFT_MATCH_MIN_LEN,
            extra_aliases: BTreeMap::new(),
            header_literals: DEFAULT_HEADER_LITERALS.iter().map(|s| s.to_string()).collect(),
            accepted_statuses: DEFAULT_ACCEPTED_STATUSES.iter().map(|s| s.to_string()).collect(),
            dedupe_identical_records: false,
            quote_ttl_secs: DEFAULT_QUOTE_TTL_SECS,
        }
    }
}

impl ReconcileConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&content)?;
        log::info!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn alias_table(&self) -> AliasTable {
        AliasTable::new(&self.extra_aliases, self.soft_match_min_len)
    }

    pub fn quote_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.quote_ttl_secs.min(i64::MAX as u64 / 1_000) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = ReconcileConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ReconcileConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config = ReconcileConfig::from_json_str(
            r#"{
                "dedupeIdenticalRecords": true,
                "acceptedStatuses": ["executada", "parcial"],
                "extraAliases": { "ticker": ["Cód. Negociação"] }
            }"#,
        )
        .unwrap();
        assert!(config.dedupe_identical_records);
        assert_eq!(config.accepted_statuses.len(), 2);
        assert_eq!(config.extra_aliases[&Field::Ticker], vec!["Cód. Negociação".to_string()]);
        assert_eq!(config.soft_match_min_len, DEFAULT_SOFT_MATCH_MIN_LEN);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(ReconcileConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"quoteTtlSecs": 60}"#).unwrap();
        let config = ReconcileConfig::from_path(&path).unwrap();
        assert_eq!(config.quote_ttl(), chrono::Duration::seconds(60));
    }
}
