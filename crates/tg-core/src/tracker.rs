//! Active tab time accounting.
//!
//! # State Machine
//!
//! The tracker is either `Idle` (no window holds focus) or `Tracking` one tab
//! since some instant. Time is credited to the tracked tab on every flush:
//! periodic ticks, tab switches, focus loss, minimize, and navigation of the
//! tracked tab. While the owning window is minimized the tab stays tracked but
//! nothing is credited, and restoring restarts the interval at the restore
//! instant, so minimized time is never backdated.
//!
//! Every transition flushes the previous tab *before* switching, which keeps
//! one tab's foreground time from leaking into another.

use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};

use crate::effect::Effect;
use crate::record::{UsageMap, UsageRecord};
use crate::types::TabId;

/// Current focus state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    /// No window holds focus.
    Idle,
    /// A tab is foregrounded.
    Tracking {
        tab: TabId,
        /// Start of the interval not yet credited.
        since: DateTime<Utc>,
    },
}

/// Tracks the foreground tab and accumulates its active time.
#[derive(Debug)]
pub struct ActiveTabTracker {
    usage: UsageMap,
    focus: Focus,
    minimized: bool,
}

impl ActiveTabTracker {
    /// Creates an idle tracker over previously persisted records.
    pub const fn new(usage: UsageMap) -> Self {
        Self {
            usage,
            focus: Focus::Idle,
            minimized: false,
        }
    }

    pub const fn usage(&self) -> &UsageMap {
        &self.usage
    }

    pub const fn active_tab(&self) -> Option<TabId> {
        match self.focus {
            Focus::Tracking { tab, .. } => Some(tab),
            Focus::Idle => None,
        }
    }

    /// Credits the time since the last flush to the tracked tab.
    ///
    /// Idempotent: a second flush at the same instant adds nothing and
    /// requests no write.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        persist_if(self.credit_active(now))
    }

    /// A tab became the active tab of the focused window.
    ///
    /// `url` is the tab's current URL when the shim knows it.
    pub fn activate(&mut self, tab: TabId, url: Option<&str>, now: DateTime<Utc>) -> Vec<Effect> {
        let credited = self.credit_active(now);

        // An activated tab is on screen, so its window cannot be minimized.
        self.minimized = false;
        self.focus = Focus::Tracking { tab, since: now };
        let touched = self.restart_record(tab, url, now);

        tracing::debug!(%tab, "tracking activated tab");
        persist_if(credited || touched)
    }

    /// Focus left every browser window.
    pub fn focus_lost(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let credited = self.credit_active(now);
        if let Focus::Tracking { tab, .. } = self.focus {
            tracing::debug!(%tab, "focus lost, tracker idle");
        }
        self.focus = Focus::Idle;
        persist_if(credited)
    }

    /// A window gained focus; `active_tab` is that window's active tab.
    ///
    /// While minimized the tab is tracked but credits nothing until the
    /// restore event, which may arrive after this one.
    pub fn focus_gained(&mut self, active_tab: Option<TabId>, now: DateTime<Utc>) -> Vec<Effect> {
        let Some(tab) = active_tab else {
            return Vec::new();
        };
        if self.minimized {
            tracing::debug!(%tab, "focus gained while minimized, waiting for restore");
        }

        let credited = self.credit_active(now);
        self.focus = Focus::Tracking { tab, since: now };
        let touched = self.restart_record(tab, None, now);
        persist_if(credited || touched)
    }

    /// The owning window was minimized. Accounting pauses, the tab is kept.
    pub fn minimize(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        if self.minimized {
            return Vec::new();
        }
        let credited = self.credit_active(now);
        self.minimized = true;
        tracing::debug!("window minimized, accounting paused");
        persist_if(credited)
    }

    /// The owning window left the minimized state.
    pub fn restore(&mut self, now: DateTime<Utc>) {
        if !self.minimized {
            return;
        }
        self.minimized = false;
        if let Focus::Tracking { since, .. } = &mut self.focus {
            *since = now;
        }
        tracing::debug!("window restored, accounting resumed");
    }

    /// A tab finished navigating to `url`.
    pub fn navigate(&mut self, tab: TabId, url: &str, now: DateTime<Utc>) -> Vec<Effect> {
        let credited = self.active_tab() == Some(tab) && self.credit_active(now);

        let touched = match self.usage.entry(tab) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if record.url == url {
                    false
                } else {
                    record.url = url.to_string();
                    record.start_time = now;
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(UsageRecord::new(url, now));
                true
            }
        };

        persist_if(credited || touched)
    }

    /// Adds `now - since` to the tracked tab and restarts the interval.
    fn credit_active(&mut self, now: DateTime<Utc>) -> bool {
        if self.minimized {
            return false;
        }
        let Focus::Tracking { tab, since } = &mut self.focus else {
            return false;
        };

        let elapsed_ms = (now - *since).num_milliseconds();
        *since = now;
        if elapsed_ms <= 0 {
            return false;
        }

        self.usage
            .entry(*tab)
            .or_insert_with(|| UsageRecord::new("", now))
            .credit(elapsed_ms);
        tracing::trace!(tab = %tab, elapsed_ms, "credited active time");
        true
    }

    /// Resets the record's start time for a newly active tab, creating the
    /// record when the URL is known.
    fn restart_record(&mut self, tab: TabId, url: Option<&str>, now: DateTime<Utc>) -> bool {
        if let Some(record) = self.usage.get_mut(&tab) {
            if let Some(url) = url {
                url.clone_into(&mut record.url);
            }
            record.start_time = now;
            return true;
        }
        let Some(url) = url else {
            return false;
        };
        self.usage.insert(tab, UsageRecord::new(url, now));
        true
    }
}

fn persist_if(changed: bool) -> Vec<Effect> {
    if changed {
        vec![Effect::PersistUsage]
    } else {
        Vec::new()
    }
}
