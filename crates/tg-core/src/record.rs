//! Per-tab usage records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TabId;

/// Accumulated foreground time for one tab.
///
/// Field names and the epoch-millisecond timestamp match the extension's
/// `tabTimeData` layout so existing blobs load unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Last known URL of the tab.
    #[serde(default)]
    pub url: String,

    /// When the current active interval began.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,

    /// Total active-foreground time in milliseconds.
    #[serde(default)]
    pub total_time: i64,
}

impl UsageRecord {
    /// Creates an empty record starting at `now`.
    pub fn new(url: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            start_time: now,
            total_time: 0,
        }
    }

    /// Adds active time, ignoring negative spans.
    pub(crate) fn credit(&mut self, elapsed_ms: i64) {
        if elapsed_ms > 0 {
            self.total_time = self.total_time.saturating_add(elapsed_ms);
        }
    }
}

/// All usage records, keyed by tab.
pub type UsageMap = BTreeMap<TabId, UsageRecord>;

/// Total time across every record, in milliseconds.
pub fn total_time_ms(usage: &UsageMap) -> i64 {
    usage.values().map(|r| r.total_time).sum()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn record_uses_extension_field_names() {
        let start = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let mut record = UsageRecord::new("https://example.com/", start);
        record.credit(1500);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "url": "https://example.com/",
                "startTime": 1_700_000_000_000_i64,
                "totalTime": 1500
            })
        );
    }

    #[test]
    fn credit_ignores_negative_spans() {
        let mut record = UsageRecord::new("", Utc::now());
        record.credit(200);
        record.credit(-50);
        record.credit(0);
        assert_eq!(record.total_time, 200);
    }

    #[test]
    fn usage_map_parses_extension_blob() {
        let blob = r#"{
            "17": {"url": "https://a.test/", "startTime": 1700000000000, "totalTime": 42},
            "5": {"startTime": 1700000001000}
        }"#;
        let usage: UsageMap = serde_json::from_str(blob).unwrap();

        assert_eq!(usage.len(), 2);
        assert_eq!(usage[&TabId::new(17)].total_time, 42);
        assert_eq!(usage[&TabId::new(5)].url, "");
        assert_eq!(total_time_ms(&usage), 42);
    }
}
