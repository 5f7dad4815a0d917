//! Side effects produced by state transitions.
//!
//! Components never touch the browser or the store directly. They return a
//! list of [`Effect`]s; the service absorbs the timer effects and hands the
//! rest to the host runtime.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::types::{TabId, WindowId};

/// Identifies a one-shot timer. Scheduling a key that is already pending
/// replaces its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKey {
    /// End of the focus session with this number.
    FocusEnd { session: u64 },
    /// Auto-close of the warning popup.
    WarningAutoClose { window: WindowId },
    /// Delayed "focus mode ended" notice for the session with this number.
    FocusEndedNotice { session: u64 },
}

/// Asynchronous notifications pushed to the extension UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiMessage {
    /// Route the popup to the timer view.
    SwitchToTimer,
    /// Route the popup to the focus view.
    SwitchToFocus,
    /// Tell the focus view that the session is over.
    FocusModeEnded,
}

// The UI listens on two discriminators: routing messages use `type`,
// focus-mode messages use `action`.
impl Serialize for UiMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let (key, value) = match self {
            Self::SwitchToTimer => ("type", "SWITCH_TO_TIMER"),
            Self::SwitchToFocus => ("type", "SWITCH_TO_FOCUS"),
            Self::FocusModeEnded => ("action", "focusModeEnded"),
        };
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(key, value)?;
        map.end()
    }
}

/// A command for the extension shim to perform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostCommand {
    /// Close a tab. Fire-and-forget.
    CloseTab { tab_id: TabId },
    /// Open the focus-mode warning popup. The shim answers with
    /// `warningWindowCreated` or `warningWindowFailed` echoing `session`.
    OpenWarningWindow {
        url: String,
        width: u32,
        height: u32,
        session: u64,
    },
    /// Close a window. Fire-and-forget.
    CloseWindow { window_id: WindowId },
    /// Show a system notification.
    Notify {
        title: String,
        message: String,
        icon_url: String,
    },
    /// Open the extension popup.
    OpenUi,
    /// Send a runtime message to the extension UI.
    SendToUi { message: UiMessage },
    /// Answer a UI request.
    Respond {
        request_id: u64,
        payload: serde_json::Value,
    },
}

/// Something a handler wants done after it returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write the full usage map to the time store.
    PersistUsage,
    /// Arm (or re-arm) a timer.
    ScheduleTimer { key: TimerKey, at: DateTime<Utc> },
    /// Disarm a timer if pending.
    CancelTimer(TimerKey),
    /// Forward a command to the extension shim.
    Host(HostCommand),
}

impl From<HostCommand> for Effect {
    fn from(command: HostCommand) -> Self {
        Self::Host(command)
    }
}
