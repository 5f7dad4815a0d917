//! Report command: recorded time per tab.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tg_core::{TabId, UsageMap, total_time_ms};
use tg_db::{Store, USAGE_KEY};

/// One row of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRow {
    pub tab_id: TabId,
    pub url: String,
    pub total_time_ms: i64,
}

/// Computed report data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    pub saved_at: Option<DateTime<Utc>>,
    pub total_time_ms: i64,
    /// Sorted by time, longest first.
    pub tabs: Vec<TabRow>,
}

impl ReportData {
    pub fn new(usage: &UsageMap, saved_at: Option<DateTime<Utc>>) -> Self {
        let mut tabs: Vec<TabRow> = usage
            .iter()
            .map(|(tab_id, record)| TabRow {
                tab_id: *tab_id,
                url: record.url.clone(),
                total_time_ms: record.total_time,
            })
            .collect();
        tabs.sort_by_key(|row| (std::cmp::Reverse(row.total_time_ms), row.tab_id));
        Self {
            saved_at,
            total_time_ms: total_time_ms(usage),
            tabs,
        }
    }
}

pub fn run<W: Write>(writer: &mut W, store: &Store, json: bool) -> Result<()> {
    let usage = store.load_usage()?;
    let data = ReportData::new(&usage, store.updated_at(USAGE_KEY)?);
    if json {
        serde_json::to_writer_pretty(&mut *writer, &data)?;
        writeln!(writer)?;
    } else {
        write_report(writer, &data)?;
    }
    Ok(())
}

/// Writes the human-readable report.
pub fn write_report<W: Write>(writer: &mut W, data: &ReportData) -> Result<()> {
    writeln!(writer, "TAB USAGE")?;
    if data.tabs.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "No usage recorded.")?;
        return Ok(());
    }

    if let Some(saved_at) = data.saved_at {
        writeln!(
            writer,
            "Last saved: {}",
            saved_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
    }
    writeln!(writer)?;

    for row in &data.tabs {
        let url = if row.url.is_empty() {
            "(unknown)"
        } else {
            row.url.as_str()
        };
        writeln!(
            writer,
            "{:>8}  {:>10}  {url}",
            row.tab_id.get(),
            format_duration(row.total_time_ms)
        )?;
    }

    writeln!(writer)?;
    writeln!(
        writer,
        "Total: {} across {} tabs",
        format_duration(data.total_time_ms),
        data.tabs.len()
    )?;
    Ok(())
}

/// Formats milliseconds as `Xh Ym Zs`, dropping leading zero units.
pub fn format_duration(ms: i64) -> String {
    if ms <= 0 {
        return "0s".to_string();
    }
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes >= 1 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
