//! Events forwarded by the extension shim.

use serde::Deserialize;

use crate::types::{TabId, WindowId};

/// An inbound event: a browser lifecycle callback, a UI message, or the
/// completion of a host command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BrowserEvent {
    /// `tabs.onActivated`. The shim includes the tab URL when it has it.
    TabActivated {
        tab_id: TabId,
        window_id: WindowId,
        #[serde(default)]
        url: Option<String>,
    },
    /// `tabs.onUpdated`. `url` is the tab's URL after the change.
    TabUpdated {
        tab_id: TabId,
        #[serde(default)]
        change_info: TabChangeInfo,
        #[serde(default)]
        url: Option<String>,
    },
    /// `windows.onFocusChanged`. `window_id == -1` means no window has focus;
    /// otherwise `active_tab_id` is that window's active tab.
    WindowFocusChanged {
        window_id: WindowId,
        #[serde(default)]
        active_tab_id: Option<TabId>,
    },
    /// `windows.onBoundsChanged`, with the window's current state.
    WindowBoundsChanged {
        window_id: WindowId,
        #[serde(default)]
        state: WindowState,
    },
    /// `windows.onRemoved`.
    WindowRemoved { window_id: WindowId },
    /// `runtime.onMessage` from the UI. Requests that expect an answer carry
    /// a `request_id` the shim uses to route the response.
    Message {
        #[serde(default)]
        request_id: Option<u64>,
        body: serde_json::Value,
    },
    /// The warning popup requested for `session` was created.
    WarningWindowCreated { window_id: WindowId, session: u64 },
    /// The warning popup requested for `session` could not be created.
    WarningWindowFailed {
        session: u64,
        #[serde(default)]
        message: Option<String>,
    },
    /// A fire-and-forget command failed.
    HostError { operation: String, message: String },
}

/// The `changeInfo` object of `tabs.onUpdated`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TabChangeInfo {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl TabChangeInfo {
    fn is_complete(&self) -> bool {
        self.status.as_deref() == Some("complete")
    }

    /// The URL the usage record should take: on a URL change, or on load
    /// completion when the tab URL is known.
    pub fn recorded_url<'a>(&'a self, tab_url: Option<&'a str>) -> Option<&'a str> {
        if self.url.is_some() {
            tab_url.or(self.url.as_deref())
        } else if self.is_complete() {
            tab_url
        } else {
            None
        }
    }

    /// The URL a finished load landed on, for blacklist checks.
    pub fn completed_url<'a>(&self, tab_url: Option<&'a str>) -> Option<&'a str> {
        if self.is_complete() { tab_url } else { None }
    }
}

/// `windows.WindowState`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowState {
    #[default]
    Normal,
    Minimized,
    Maximized,
    Fullscreen,
    LockedFullscreen,
    #[serde(other)]
    Unknown,
}
