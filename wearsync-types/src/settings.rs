//! The singleton settings record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// UI preferences shared with the peer.
///
/// Exactly one row exists in the store. Unlike tasks, settings are never
/// merged: the peer's copy is applied wholesale, and only when the local
/// row has no unsent changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Show hidden tasks.
    pub show_hidden: bool,
    /// Show completed tasks.
    pub show_completed: bool,
    /// Free-text list filter.
    pub filter: String,
    /// Collapsed group ids.
    #[serde(
        serialize_with = "serialize_groups",
        deserialize_with = "deserialize_groups"
    )]
    pub collapsed_groups: BTreeSet<i64>,
    /// Whether the record carries unsent local changes.
    #[serde(skip)]
    pub dirty: bool,
    /// Last time the record was acknowledged by the peer.
    #[serde(skip)]
    pub synced_at: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_hidden: false,
            show_completed: true,
            filter: String::new(),
            collapsed_groups: BTreeSet::new(),
            dirty: false,
            synced_at: 0,
        }
    }
}

/// A partial settings update from the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsDelta {
    /// New show-hidden flag.
    pub show_hidden: Option<bool>,
    /// New show-completed flag.
    pub show_completed: Option<bool>,
    /// New filter string.
    pub filter: Option<String>,
    /// New collapsed-group set.
    pub collapsed_groups: Option<BTreeSet<i64>>,
}

/// Encode a group set as comma-delimited decimal ids, e.g. `"1,3,9"`.
pub fn encode_groups(groups: &BTreeSet<i64>) -> String {
    groups
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a comma-delimited group set; malformed entries are skipped.
pub fn decode_groups(encoded: &str) -> BTreeSet<i64> {
    encoded
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

fn serialize_groups<S: serde::Serializer>(
    groups: &BTreeSet<i64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&encode_groups(groups))
}

fn deserialize_groups<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeSet<i64>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    Ok(decode_groups(&encoded))
}
