//! Core logic for the tab guard host.
//!
//! This crate contains the browser-independent state machines:
//! - Tracker: per-tab active time accounting
//! - Alarms: one-shot countdown alarms set from the UI
//! - Focus guard: closing tabs on blacklisted domains during a session
//! - Service: the single owner of all state, dispatching inbound events
//!
//! Nothing here performs I/O. Handlers return [`Effect`]s that the host
//! runtime carries out.

mod alarm;
mod effect;
pub mod event;
pub mod focus;
pub mod message;
mod record;
mod service;
mod timer;
mod tracker;
mod types;

pub use alarm::{Alarm, AlarmRegistry};
pub use effect::{Effect, HostCommand, TimerKey, UiMessage};
pub use event::{BrowserEvent, TabChangeInfo, WindowState};
pub use focus::{Blacklist, FocusGuard, GuardConfig, MatchPolicy};
pub use message::{ControlMessage, MessageError};
pub use record::{UsageMap, UsageRecord, total_time_ms};
pub use service::Service;
pub use timer::TimerQueue;
pub use tracker::ActiveTabTracker;
pub use types::{TabId, WindowId};
