//! Identifier newtypes for browser handles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generates an integer handle newtype with common trait implementations.
///
/// Handles serialize as bare integers, and as decimal strings when used as
/// JSON object keys (`serde_json` handles the conversion).
macro_rules! define_handle {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw browser handle.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw handle.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_handle!(
    /// A browser tab handle, stable for the lifetime of the tab.
    TabId
);

define_handle!(
    /// A browser window handle.
    ///
    /// The browser reports `-1` when focus leaves every window; see [`WindowId::NONE`].
    WindowId
);

impl WindowId {
    /// Sentinel the browser uses for "no window has focus".
    pub const NONE: Self = Self(-1);

    /// Returns `true` for the no-window sentinel.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }
}
