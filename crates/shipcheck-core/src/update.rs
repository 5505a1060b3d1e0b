//! Release cursors and pending update descriptors.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Opaque upstream pointer into a channel's release stream.
///
/// Cursors that parse as unsigned integers compare numerically (`"9" < "10"`)
/// and sort before every other cursor; the rest compare as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Parse a non-empty cursor.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidCursor(raw));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    fn sort_key(&self) -> (bool, Option<u64>, &str) {
        let numeric = self.numeric();
        (numeric.is_none(), numeric, self.0.as_str())
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One pending upstream release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDescriptor {
    /// Cursor of the release.
    pub cursor: String,

    /// Channel the release was published on.
    pub channel_id: String,

    /// Opaque release metadata (version label, release notes, ...).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl UpdateDescriptor {
    pub fn new(cursor: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            cursor: cursor.into(),
            channel_id: channel_id.into(),
            metadata: HashMap::new(),
        }
    }

    /// Builder method to add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The only value an update check returns to its caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheckResult {
    pub available_updates: u64,
}

impl UpdateCheckResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_count(count: usize) -> Self {
        Self {
            available_updates: count as u64,
        }
    }
}

/// Releases strictly after `current`, oldest first, one per cursor.
///
/// An empty `current` means nothing is installed from the channel yet, so
/// every release is pending. Descriptors with an empty cursor are dropped.
pub fn pending_after(
    current: &str,
    available: impl IntoIterator<Item = UpdateDescriptor>,
) -> Vec<UpdateDescriptor> {
    let current = Cursor::parse(current).ok();

    let mut pending: Vec<(Cursor, UpdateDescriptor)> = available
        .into_iter()
        .filter_map(|d| Cursor::parse(d.cursor.clone()).ok().map(|c| (c, d)))
        .filter(|(c, _)| current.as_ref().map_or(true, |cur| c > cur))
        .collect();

    pending.sort_by(|a, b| a.0.cmp(&b.0));
    pending.dedup_by(|a, b| a.0 == b.0);
    pending.into_iter().map(|(_, d)| d).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursors(updates: &[UpdateDescriptor]) -> Vec<&str> {
        updates.iter().map(|u| u.cursor.as_str()).collect()
    }

    #[test]
    fn test_numeric_cursors_compare_numerically() {
        let nine = Cursor::parse("9").unwrap();
        let ten = Cursor::parse("10").unwrap();
        assert!(nine < ten);
    }

    #[test]
    fn test_mixed_cursors_compare_lexically() {
        let a = Cursor::parse("2024.01").unwrap();
        let b = Cursor::parse("2024.02").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_numeric_cursors_sort_before_others() {
        let ten = Cursor::parse("10").unwrap();
        let nine = Cursor::parse("9").unwrap();
        let mixed = Cursor::parse("1a").unwrap();
        assert!(nine < ten);
        assert!(ten < mixed);
        assert!(nine < mixed);
    }

    #[test]
    fn test_pending_after_mixed_cursors_is_order_independent() {
        let forward = vec![
            UpdateDescriptor::new("10", "stable"),
            UpdateDescriptor::new("1a", "stable"),
            UpdateDescriptor::new("9", "stable"),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(cursors(&pending_after("", forward.clone())), vec!["9", "10", "1a"]);
        assert_eq!(cursors(&pending_after("", reversed)), vec!["9", "10", "1a"]);
        assert_eq!(cursors(&pending_after("9", forward.clone())), vec!["10", "1a"]);
        assert!(pending_after("1a", forward).is_empty());
    }

    #[test]
    fn test_empty_cursor_rejected() {
        assert!(matches!(
            Cursor::parse("  "),
            Err(CoreError::InvalidCursor(_))
        ));
    }

    #[test]
    fn test_pending_after_orders_and_filters() {
        let available = vec![
            UpdateDescriptor::new("7", "stable"),
            UpdateDescriptor::new("4", "stable"),
            UpdateDescriptor::new("5", "stable"),
            UpdateDescriptor::new("6", "stable"),
        ];
        let pending = pending_after("5", available);
        assert_eq!(cursors(&pending), vec!["6", "7"]);
    }

    #[test]
    fn test_pending_after_empty_current_takes_everything() {
        let available = vec![
            UpdateDescriptor::new("10", "stable"),
            UpdateDescriptor::new("2", "stable"),
        ];
        let pending = pending_after("", available);
        assert_eq!(cursors(&pending), vec!["2", "10"]);
    }

    #[test]
    fn test_pending_after_drops_duplicates_and_blank_cursors() {
        let available = vec![
            UpdateDescriptor::new("8", "stable"),
            UpdateDescriptor::new("", "stable"),
            UpdateDescriptor::new("8", "stable"),
        ];
        let pending = pending_after("1", available);
        assert_eq!(cursors(&pending), vec!["8"]);
    }

    #[test]
    fn test_check_result_serializes_camel_case() {
        let json = serde_json::to_string(&UpdateCheckResult::with_count(2)).unwrap();
        assert_eq!(json, r#"{"availableUpdates":2}"#);
    }
}
