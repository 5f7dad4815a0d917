//! The coordinating service.
//!
//! One [`Service`] owns every piece of mutable state: the tracker, the alarm
//! list, the focus guard and the timer queue. Handlers are synchronous; they
//! return the effects the host runtime must carry out before it processes the
//! next event. Timer effects never leave the service: they are applied to its
//! own [`TimerQueue`], and the runtime only asks for [`Service::next_deadline`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alarm::AlarmRegistry;
use crate::effect::{Effect, HostCommand};
use crate::event::{BrowserEvent, WindowState};
use crate::focus::{FocusGuard, GuardConfig};
use crate::message::{ControlMessage, MessageError};
use crate::record::UsageMap;
use crate::timer::TimerQueue;
use crate::tracker::ActiveTabTracker;

/// Owns all state and dispatches events to components.
#[derive(Debug)]
pub struct Service {
    tracker: ActiveTabTracker,
    alarms: AlarmRegistry,
    focus: FocusGuard,
    timers: TimerQueue,
}

impl Service {
    /// Creates a service over the usage records loaded from the store.
    pub fn new(config: GuardConfig, usage: UsageMap) -> Self {
        Self {
            tracker: ActiveTabTracker::new(usage),
            alarms: AlarmRegistry::new(),
            focus: FocusGuard::new(config),
            timers: TimerQueue::new(),
        }
    }

    pub const fn usage(&self) -> &UsageMap {
        self.tracker.usage()
    }

    /// When the runtime must next call [`Service::fire_due`].
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    /// Handles one inbound event.
    pub fn handle(&mut self, event: BrowserEvent, now: DateTime<Utc>) -> Vec<Effect> {
        let effects = match event {
            BrowserEvent::TabActivated { tab_id, url, .. } => {
                self.tracker.activate(tab_id, url.as_deref(), now)
            }
            BrowserEvent::TabUpdated {
                tab_id,
                change_info,
                url,
            } => {
                let mut effects = Vec::new();
                if let Some(recorded) = change_info.recorded_url(url.as_deref()) {
                    effects.extend(self.tracker.navigate(tab_id, recorded, now));
                }
                if let Some(completed) = change_info.completed_url(url.as_deref()) {
                    effects.extend(self.focus.on_navigation(tab_id, completed));
                }
                effects
            }
            BrowserEvent::WindowFocusChanged {
                window_id,
                active_tab_id,
            } => {
                if window_id.is_none() {
                    self.tracker.focus_lost(now)
                } else {
                    self.tracker.focus_gained(active_tab_id, now)
                }
            }
            BrowserEvent::WindowBoundsChanged { state, .. } => {
                if state == WindowState::Minimized {
                    self.tracker.minimize(now)
                } else {
                    self.tracker.restore(now);
                    Vec::new()
                }
            }
            BrowserEvent::WindowRemoved { window_id } => self.focus.window_removed(window_id),
            BrowserEvent::Message { request_id, body } => {
                self.handle_message(request_id, &body, now)
            }
            BrowserEvent::WarningWindowCreated { window_id, session } => {
                self.focus.warning_opened(window_id, session, now)
            }
            BrowserEvent::WarningWindowFailed { session, message } => {
                tracing::warn!(session, reason = message.as_deref(), "warning popup failed to open");
                self.focus.warning_failed(session);
                Vec::new()
            }
            BrowserEvent::HostError { operation, message } => {
                tracing::warn!(%operation, error = %message, "host command failed");
                Vec::new()
            }
        };
        self.absorb(effects)
    }

    /// Periodic accounting tick.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let effects = self.tracker.flush(now);
        self.absorb(effects)
    }

    /// Periodic alarm check.
    pub fn check_alarms(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let effects = self.alarms.check(now);
        self.absorb(effects)
    }

    /// Runs every timer due at `now`.
    pub fn fire_due(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let mut effects = Vec::new();
        for key in self.timers.pop_due(now) {
            tracing::debug!(?key, "timer fired");
            effects.extend(self.focus.timer_fired(key, now));
        }
        self.absorb(effects)
    }

    /// Final flush before the host exits.
    pub fn shutdown(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        self.tick(now)
    }

    fn handle_message(
        &mut self,
        request_id: Option<u64>,
        body: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        let message = match ControlMessage::parse(body) {
            Ok(message) => message,
            Err(MessageError::Unknown(name)) => {
                tracing::trace!(%name, "ignoring message for other listeners");
                return Vec::new();
            }
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed control message");
                return Vec::new();
            }
        };

        match message {
            ControlMessage::UpdateBlacklist(entries) => {
                self.focus.update_blacklist(&entries);
                Vec::new()
            }
            ControlMessage::StartFocusMode {
                duration_minutes,
                blacklist,
            } => self.focus.start(duration_minutes, blacklist.as_deref(), now),
            ControlMessage::EndFocusMode => self.focus.end(now),
            ControlMessage::GetTabTimeData => {
                // Answer with time credited up to this instant.
                let mut effects = self.tracker.flush(now);
                effects.extend(respond(request_id, self.tracker.usage()));
                effects
            }
            ControlMessage::SetAlarms(alarms) => {
                self.alarms.set_alarms(alarms);
                Vec::new()
            }
            ControlMessage::GetAlarms => respond(request_id, self.alarms.alarms()),
        }
    }

    /// Applies timer effects to the queue and returns the rest.
    fn absorb(&mut self, effects: Vec<Effect>) -> Vec<Effect> {
        effects
            .into_iter()
            .filter_map(|effect| match effect {
                Effect::ScheduleTimer { key, at } => {
                    self.timers.schedule(key, at);
                    None
                }
                Effect::CancelTimer(key) => {
                    self.timers.cancel(key);
                    None
                }
                other => Some(other),
            })
            .collect()
    }
}

fn respond<T: Serialize + ?Sized>(request_id: Option<u64>, payload: &T) -> Vec<Effect> {
    let Some(request_id) = request_id else {
        tracing::debug!("request without id, dropping response");
        return Vec::new();
    };
    match serde_json::to_value(payload) {
        Ok(payload) => vec![
            HostCommand::Respond {
                request_id,
                payload,
            }
            .into(),
        ],
        Err(e) => {
            tracing::warn!(error = %e, request_id, "failed to encode response");
            Vec::new()
        }
    }
}
