//! Focus mode: close tabs on blacklisted domains during a timed session.
//!
//! # Session numbers
//!
//! Every call to [`FocusGuard::start`] bumps a session number. End-of-session
//! timers, the delayed "ended" notice, and pending warning popups all carry
//! the number they were issued for. A timer or host completion whose number no
//! longer matches is stale and is dropped (or, for a popup that finished
//! opening too late, closed on arrival).

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::effect::{Effect, HostCommand, TimerKey, UiMessage};
use crate::types::{TabId, WindowId};

/// How a blacklist entry is compared with a hostname.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// `h == d` or `h` ends with `"." + d`.
    #[default]
    Suffix,
    /// Legacy: `h` contains `d` anywhere. Over-matches (`notexample.com`).
    Substring,
}

/// Returns whether `host` is covered by blacklist entry `domain`.
pub fn domain_matches(host: &str, domain: &str, policy: MatchPolicy) -> bool {
    match policy {
        MatchPolicy::Suffix => {
            host == domain
                || host
                    .strip_suffix(domain)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        MatchPolicy::Substring => host.contains(domain),
    }
}

/// Extracts the lowercased hostname of `url`, without a trailing root dot.
pub fn hostname(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_end_matches('.');
    if host.is_empty() {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

/// Normalizes a user-entered blacklist entry.
///
/// Accepts bare domains, wildcard forms (`*.example.com`), and full URLs.
pub fn normalize_domain(entry: &str) -> Option<String> {
    let entry = entry.trim();
    if entry.contains("://") {
        return hostname(entry);
    }
    let domain = entry
        .trim_start_matches("*.")
        .trim_start_matches('.')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    (!domain.is_empty()).then_some(domain)
}

/// A normalized set of blocked domains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Blacklist(BTreeSet<String>);

impl Blacklist {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            entries
                .into_iter()
                .filter_map(|e| normalize_domain(e.as_ref()))
                .collect(),
        )
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.0.contains(domain)
    }

    /// Returns the first entry covering `host`.
    pub fn matching(&self, host: &str, policy: MatchPolicy) -> Option<&str> {
        self.0
            .iter()
            .find(|d| domain_matches(host, d, policy))
            .map(String::as_str)
    }
}

/// Popup and notification settings for blocked navigations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    pub warning_page: String,
    pub warning_width: u32,
    pub warning_height: u32,
    /// Auto-close delay for the warning popup.
    pub warning_close_ms: i64,
    /// Delay between reopening the UI and telling it the session ended.
    pub ui_settle_ms: i64,
    pub notification_title: String,
    pub notification_message: String,
    pub notification_icon: String,
    pub match_policy: MatchPolicy,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            warning_page: "warning.html".to_string(),
            warning_width: 400,
            warning_height: 200,
            warning_close_ms: 5_000,
            ui_settle_ms: 2_000,
            notification_title: "Focus mode".to_string(),
            notification_message: "You are visiting a blocked site. Stay focused!".to_string(),
            notification_icon: "icon.png".to_string(),
            match_policy: MatchPolicy::Suffix,
        }
    }
}

/// State of the warning popup. At most one exists at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WarningPopup {
    Closed,
    /// A create call is in flight for this session.
    Opening { session: u64 },
    Open { window: WindowId },
}

/// The focus-mode session and its blacklist.
#[derive(Debug)]
pub struct FocusGuard {
    config: GuardConfig,
    active: bool,
    duration_minutes: Option<f64>,
    blacklist: Blacklist,
    warning: WarningPopup,
    timer: Option<TimerKey>,
    session: u64,
}

impl FocusGuard {
    pub const fn new(config: GuardConfig) -> Self {
        Self {
            config,
            active: false,
            duration_minutes: None,
            blacklist: Blacklist(BTreeSet::new()),
            warning: WarningPopup::Closed,
            timer: None,
            session: 0,
        }
    }

    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// The open warning popup, if any.
    pub const fn warning_window(&self) -> Option<WindowId> {
        match self.warning {
            WarningPopup::Open { window } => Some(window),
            WarningPopup::Closed | WarningPopup::Opening { .. } => None,
        }
    }

    /// Replaces the blacklist without touching the session.
    pub fn update_blacklist(&mut self, entries: &[String]) {
        self.blacklist = Blacklist::from_entries(entries);
        tracing::info!(domains = self.blacklist.len(), "blacklist updated");
    }

    /// Starts a session, replacing any running one and its end timer.
    ///
    /// Without a positive duration the session runs until ended explicitly.
    pub fn start(
        &mut self,
        duration_minutes: Option<f64>,
        blacklist: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(old) = self.timer.take() {
            effects.push(Effect::CancelTimer(old));
        }

        if let Some(entries) = blacklist {
            self.blacklist = Blacklist::from_entries(entries);
        }
        // A popup still opening belongs to the old session; its completion
        // is closed on arrival.
        if matches!(self.warning, WarningPopup::Opening { .. }) {
            self.warning = WarningPopup::Closed;
        }
        self.session += 1;
        self.active = true;
        self.duration_minutes = duration_minutes;

        if let Some(at) = duration_minutes.and_then(|m| session_deadline(now, m)) {
            let key = TimerKey::FocusEnd {
                session: self.session,
            };
            self.timer = Some(key);
            effects.push(Effect::ScheduleTimer { key, at });
        }

        tracing::info!(
            session = self.session,
            duration_minutes,
            domains = self.blacklist.len(),
            "focus mode started"
        );
        effects
    }

    /// Ends the session (timer expiry or explicit request).
    pub fn end(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.active = false;
        self.duration_minutes = None;

        if let Some(key) = self.timer.take() {
            effects.push(Effect::CancelTimer(key));
        }
        effects.extend(self.close_warning());

        effects.push(HostCommand::OpenUi.into());
        effects.push(
            HostCommand::SendToUi {
                message: UiMessage::SwitchToFocus,
            }
            .into(),
        );
        effects.push(Effect::ScheduleTimer {
            key: TimerKey::FocusEndedNotice {
                session: self.session,
            },
            at: now + Duration::milliseconds(self.config.ui_settle_ms),
        });

        tracing::info!(session = self.session, "focus mode ended");
        effects
    }

    /// Checks a completed navigation against the blacklist.
    pub fn on_navigation(&mut self, tab: TabId, url: &str) -> Vec<Effect> {
        if !self.active {
            return Vec::new();
        }
        let Some(host) = hostname(url) else {
            return Vec::new();
        };
        let Some(domain) = self.blacklist.matching(&host, self.config.match_policy) else {
            return Vec::new();
        };
        tracing::info!(%tab, %host, %domain, "blocked navigation");

        let mut effects = vec![HostCommand::CloseTab { tab_id: tab }.into()];
        if self.warning == WarningPopup::Closed {
            self.warning = WarningPopup::Opening {
                session: self.session,
            };
            effects.push(
                HostCommand::OpenWarningWindow {
                    url: self.config.warning_page.clone(),
                    width: self.config.warning_width,
                    height: self.config.warning_height,
                    session: self.session,
                }
                .into(),
            );
        }
        effects.push(
            HostCommand::Notify {
                title: self.config.notification_title.clone(),
                message: self.config.notification_message.clone(),
                icon_url: self.config.notification_icon.clone(),
            }
            .into(),
        );
        effects
    }

    /// The shim created the warning popup requested for `session`.
    pub fn warning_opened(
        &mut self,
        window: WindowId,
        session: u64,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        let current = self.active && self.warning == WarningPopup::Opening { session }
            && session == self.session;
        if !current {
            tracing::debug!(%window, session, "stale warning popup, closing");
            if self.warning == (WarningPopup::Opening { session }) {
                self.warning = WarningPopup::Closed;
            }
            return vec![HostCommand::CloseWindow { window_id: window }.into()];
        }

        self.warning = WarningPopup::Open { window };
        vec![Effect::ScheduleTimer {
            key: TimerKey::WarningAutoClose { window },
            at: now + Duration::milliseconds(self.config.warning_close_ms),
        }]
    }

    /// The shim failed to create the warning popup for `session`.
    pub fn warning_failed(&mut self, session: u64) {
        if self.warning == (WarningPopup::Opening { session }) {
            self.warning = WarningPopup::Closed;
        }
    }

    /// A window was closed out-of-band.
    pub fn window_removed(&mut self, window: WindowId) -> Vec<Effect> {
        if self.warning != (WarningPopup::Open { window }) {
            return Vec::new();
        }
        self.warning = WarningPopup::Closed;
        tracing::debug!(%window, "warning popup closed by user");
        vec![Effect::CancelTimer(TimerKey::WarningAutoClose { window })]
    }

    /// Handles one of this guard's timers.
    pub fn timer_fired(&mut self, key: TimerKey, now: DateTime<Utc>) -> Vec<Effect> {
        match key {
            TimerKey::FocusEnd { session } => {
                if self.active && session == self.session {
                    self.timer = None;
                    self.end(now)
                } else {
                    tracing::debug!(session, "stale focus end timer");
                    Vec::new()
                }
            }
            TimerKey::WarningAutoClose { window } => {
                if self.warning == (WarningPopup::Open { window }) {
                    self.warning = WarningPopup::Closed;
                    vec![HostCommand::CloseWindow { window_id: window }.into()]
                } else {
                    Vec::new()
                }
            }
            TimerKey::FocusEndedNotice { session } => {
                if !self.active && session == self.session {
                    vec![
                        HostCommand::SendToUi {
                            message: UiMessage::FocusModeEnded,
                        }
                        .into(),
                    ]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn close_warning(&mut self) -> Vec<Effect> {
        match std::mem::replace(&mut self.warning, WarningPopup::Closed) {
            WarningPopup::Open { window } => vec![
                Effect::CancelTimer(TimerKey::WarningAutoClose { window }),
                HostCommand::CloseWindow { window_id: window }.into(),
            ],
            // A popup still opening is closed when its creation is reported.
            WarningPopup::Opening { .. } | WarningPopup::Closed => Vec::new(),
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "minutes are checked finite and bounded before conversion"
)]
fn session_deadline(now: DateTime<Utc>, minutes: f64) -> Option<DateTime<Utc>> {
    // Anything beyond a year is treated as "until ended".
    const MAX_MINUTES: f64 = 366.0 * 24.0 * 60.0;
    if !minutes.is_finite() || minutes <= 0.0 || minutes > MAX_MINUTES {
        return None;
    }
    let ms = (minutes * 60_000.0).round() as i64;
    now.checked_add_signed(Duration::milliseconds(ms))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap() + Duration::milliseconds(ms)
    }

    fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn guard() -> FocusGuard {
        FocusGuard::new(GuardConfig::default())
    }

    fn host_commands(effects: &[Effect]) -> Vec<&HostCommand> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Host(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn suffix_policy_matches_on_label_boundary() {
        let policy = MatchPolicy::Suffix;
        assert!(domain_matches("example.com", "example.com", policy));
        assert!(domain_matches("sub.example.com", "example.com", policy));
        assert!(domain_matches("a.b.example.com", "example.com", policy));
        assert!(!domain_matches("notexample.com", "example.com", policy));
        assert!(!domain_matches("example.com.evil.test", "example.com", policy));
        assert!(!domain_matches("com", "example.com", policy));
    }

    #[test]
    fn substring_policy_over_matches() {
        assert!(domain_matches(
            "notexample.com",
            "example.com",
            MatchPolicy::Substring
        ));
    }

    #[test]
    fn hostname_extraction() {
        assert_eq!(
            hostname("https://WWW.Example.com./path?q=1").as_deref(),
            Some("www.example.com")
        );
        assert_eq!(hostname("http://localhost:8080/").as_deref(), Some("localhost"));
        assert_eq!(hostname("about:blank"), None);
        assert_eq!(hostname("not a url"), None);
    }

    #[test]
    fn blacklist_normalizes_entries() {
        let list = Blacklist::from_entries([
            " Example.COM ",
            "*.news.test",
            ".video.test",
            "https://social.test/feed",
            "",
            "   ",
        ]);
        assert_eq!(list.len(), 4);
        assert!(list.contains("example.com"));
        assert!(list.contains("news.test"));
        assert!(list.contains("video.test"));
        assert!(list.contains("social.test"));
    }

    #[test]
    fn start_schedules_end_timer() {
        let mut guard = guard();
        let effects = guard.start(Some(10.0), Some(&domains(&["example.com"])), t(0));

        assert!(guard.is_active());
        assert_eq!(guard.session, 1);
        assert_eq!(
            effects,
            vec![Effect::ScheduleTimer {
                key: TimerKey::FocusEnd { session: 1 },
                at: t(600_000),
            }]
        );
    }

    #[test]
    fn restart_cancels_previous_end_timer() {
        let mut guard = guard();
        guard.start(Some(10.0), Some(&domains(&["example.com"])), t(0));
        let effects = guard.start(Some(5.0), None, t(60_000));

        assert_eq!(
            effects,
            vec![
                Effect::CancelTimer(TimerKey::FocusEnd { session: 1 }),
                Effect::ScheduleTimer {
                    key: TimerKey::FocusEnd { session: 2 },
                    at: t(60_000 + 300_000),
                },
            ]
        );
        // Blacklist survives a restart without one.
        assert!(guard.blacklist.contains("example.com"));

        // The first session's timer is stale even if it fires.
        assert!(guard
            .timer_fired(TimerKey::FocusEnd { session: 1 }, t(600_000))
            .is_empty());
        assert!(guard.is_active());
    }

    #[test]
    fn session_without_duration_has_no_timer() {
        let mut guard = guard();
        assert!(guard.start(None, Some(&domains(&["a.test"])), t(0)).is_empty());
        assert!(guard.start(Some(0.0), None, t(0)).iter().all(
            |e| !matches!(e, Effect::ScheduleTimer { .. })
        ));
        assert!(guard.start(Some(f64::NAN), None, t(0)).is_empty());
        assert!(guard.is_active());
    }

    #[test]
    fn blocked_navigation_closes_tab_and_warns_once() {
        let mut guard = guard();
        guard.start(Some(25.0), Some(&domains(&["example.com"])), t(0));

        let first = guard.on_navigation(TabId::new(4), "https://www.example.com/");
        let commands = host_commands(&first);
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0], &HostCommand::CloseTab { tab_id: TabId::new(4) });
        assert!(matches!(
            commands[1],
            HostCommand::OpenWarningWindow { width: 400, height: 200, session: 1, .. }
        ));
        assert!(matches!(commands[2], HostCommand::Notify { .. }));

        // Popup still opening: close and notify, but no second popup.
        let second = guard.on_navigation(TabId::new(5), "https://example.com/x");
        let commands = host_commands(&second);
        assert_eq!(commands.len(), 2);
        assert!(!commands
            .iter()
            .any(|c| matches!(c, HostCommand::OpenWarningWindow { .. })));
    }

    #[test]
    fn allowed_or_inactive_navigation_is_ignored() {
        let mut guard = guard();
        guard.update_blacklist(&domains(&["example.com"]));
        assert!(guard.on_navigation(TabId::new(1), "https://example.com/").is_empty());

        guard.start(Some(1.0), None, t(0));
        assert!(guard
            .on_navigation(TabId::new(1), "https://notexample.com/")
            .is_empty());
        assert!(guard.on_navigation(TabId::new(1), "chrome://newtab/").is_empty());
    }

    #[test]
    fn warning_popup_auto_closes() {
        let mut guard = guard();
        guard.start(Some(25.0), Some(&domains(&["example.com"])), t(0));
        guard.on_navigation(TabId::new(4), "https://example.com/");

        let window = WindowId::new(77);
        let effects = guard.warning_opened(window, 1, t(100));
        assert_eq!(
            effects,
            vec![Effect::ScheduleTimer {
                key: TimerKey::WarningAutoClose { window },
                at: t(5_100),
            }]
        );
        assert_eq!(guard.warning_window(), Some(window));

        let effects = guard.timer_fired(TimerKey::WarningAutoClose { window }, t(5_100));
        assert_eq!(
            effects,
            vec![Effect::Host(HostCommand::CloseWindow { window_id: window })]
        );
        assert_eq!(guard.warning_window(), None);
    }

    #[test]
    fn user_closing_the_popup_cancels_auto_close() {
        let mut guard = guard();
        guard.start(None, Some(&domains(&["example.com"])), t(0));
        guard.on_navigation(TabId::new(4), "https://example.com/");
        let window = WindowId::new(77);
        guard.warning_opened(window, 1, t(0));

        let effects = guard.window_removed(window);
        assert_eq!(
            effects,
            vec![Effect::CancelTimer(TimerKey::WarningAutoClose { window })]
        );
        assert!(guard.window_removed(WindowId::new(78)).is_empty());

        // A later block may open a fresh popup.
        let effects = guard.on_navigation(TabId::new(5), "https://example.com/");
        assert!(host_commands(&effects)
            .iter()
            .any(|c| matches!(c, HostCommand::OpenWarningWindow { .. })));
    }

    #[test]
    fn end_closes_open_popup_and_notifies_ui() {
        let mut guard = guard();
        guard.start(Some(30.0), Some(&domains(&["example.com"])), t(0));
        for tab in 1..=3 {
            guard.on_navigation(TabId::new(tab), "https://example.com/");
        }
        let window = WindowId::new(9);
        guard.warning_opened(window, 1, t(10));

        let effects = guard.end(t(1000));
        assert_eq!(
            effects,
            vec![
                Effect::CancelTimer(TimerKey::FocusEnd { session: 1 }),
                Effect::CancelTimer(TimerKey::WarningAutoClose { window }),
                Effect::Host(HostCommand::CloseWindow { window_id: window }),
                Effect::Host(HostCommand::OpenUi),
                Effect::Host(HostCommand::SendToUi {
                    message: UiMessage::SwitchToFocus
                }),
                Effect::ScheduleTimer {
                    key: TimerKey::FocusEndedNotice { session: 1 },
                    at: t(3000),
                },
            ]
        );
        assert!(!guard.is_active());
        assert_eq!(guard.duration_minutes, None);
        assert_eq!(guard.warning_window(), None);

        let notice = guard.timer_fired(TimerKey::FocusEndedNotice { session: 1 }, t(3000));
        assert_eq!(
            notice,
            vec![Effect::Host(HostCommand::SendToUi {
                message: UiMessage::FocusModeEnded
            })]
        );
    }

    #[test]
    fn popup_arriving_after_session_end_is_closed() {
        let mut guard = guard();
        guard.start(Some(30.0), Some(&domains(&["example.com"])), t(0));
        guard.on_navigation(TabId::new(1), "https://example.com/");
        guard.end(t(50));

        let window = WindowId::new(12);
        let effects = guard.warning_opened(window, 1, t(60));
        assert_eq!(
            effects,
            vec![Effect::Host(HostCommand::CloseWindow { window_id: window })]
        );
        assert_eq!(guard.warning_window(), None);
    }

    #[test]
    fn restart_while_popup_opening_allows_a_new_popup() {
        let mut guard = guard();
        guard.start(Some(30.0), Some(&domains(&["example.com"])), t(0));
        guard.on_navigation(TabId::new(1), "https://example.com/");
        guard.start(Some(30.0), None, t(100));

        let stale = guard.warning_opened(WindowId::new(9), 1, t(200));
        assert_eq!(
            stale,
            vec![Effect::Host(HostCommand::CloseWindow {
                window_id: WindowId::new(9)
            })]
        );
        assert_eq!(guard.warning_window(), None);

        let effects = guard.on_navigation(TabId::new(2), "https://example.com/");
        let opened: Vec<_> = host_commands(&effects)
            .into_iter()
            .filter(|c| matches!(c, HostCommand::OpenWarningWindow { .. }))
            .collect();
        assert_eq!(opened.len(), 1);
        assert!(matches!(
            opened[0],
            HostCommand::OpenWarningWindow { session: 2, .. }
        ));
    }

    #[test]
    fn stale_completion_leaves_current_popup_request_alone() {
        let mut guard = guard();
        guard.start(None, Some(&domains(&["example.com"])), t(0));
        guard.on_navigation(TabId::new(1), "https://example.com/");
        guard.start(None, None, t(100));
        guard.on_navigation(TabId::new(2), "https://example.com/");

        // Session 1's popup arrives while session 2's is still opening.
        guard.warning_opened(WindowId::new(9), 1, t(200));
        let effects = guard.warning_opened(WindowId::new(10), 2, t(300));
        assert_eq!(
            effects,
            vec![Effect::ScheduleTimer {
                key: TimerKey::WarningAutoClose {
                    window: WindowId::new(10)
                },
                at: t(5_300),
            }]
        );
        assert_eq!(guard.warning_window(), Some(WindowId::new(10)));
    }

    #[test]
    fn ended_notice_is_dropped_after_restart() {
        let mut guard = guard();
        guard.start(Some(30.0), Some(&domains(&["example.com"])), t(0));
        guard.end(t(100));
        guard.start(Some(30.0), None, t(500));

        assert!(guard
            .timer_fired(TimerKey::FocusEndedNotice { session: 1 }, t(2100))
            .is_empty());
    }

    #[test]
    fn failed_popup_allows_a_retry() {
        let mut guard = guard();
        guard.start(None, Some(&domains(&["example.com"])), t(0));
        guard.on_navigation(TabId::new(1), "https://example.com/");
        guard.warning_failed(1);

        let effects = guard.on_navigation(TabId::new(2), "https://example.com/");
        assert!(host_commands(&effects)
            .iter()
            .any(|c| matches!(c, HostCommand::OpenWarningWindow { .. })));
    }
}
