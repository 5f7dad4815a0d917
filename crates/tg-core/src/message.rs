//! Control messages sent by the extension UI.
//!
//! The UI uses two discriminators: focus-mode and usage requests carry an
//! `action` field, alarm requests carry a `type` field.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::alarm::Alarm;

/// Errors from decoding a control message.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Neither discriminator is present.
    #[error("message has no `action` or `type` field")]
    Untagged,
    /// The discriminator names a message this host does not handle.
    #[error("unknown message `{0}`")]
    Unknown(String),
    /// A known message with missing or mistyped fields.
    #[error("malformed `{name}` message: {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A decoded UI request.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    UpdateBlacklist(Vec<String>),
    StartFocusMode {
        duration_minutes: Option<f64>,
        /// `None` keeps the current blacklist.
        blacklist: Option<Vec<String>>,
    },
    EndFocusMode,
    GetTabTimeData,
    SetAlarms(Vec<Alarm>),
    GetAlarms,
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum ActionMessage {
    UpdateBlacklist {
        blacklist: Vec<String>,
    },
    StartFocusMode {
        #[serde(default, deserialize_with = "lenient_minutes")]
        focus_duration: Option<f64>,
        #[serde(default)]
        blacklist: Option<Vec<String>>,
    },
    EndFocusMode,
    GetTabTimeData,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum TypedMessage {
    #[serde(rename = "SET_ALARMS")]
    SetAlarms { alarms: Vec<Value> },
    #[serde(rename = "GET_ALARMS")]
    GetAlarms,
}

const ACTIONS: &[&str] = &[
    "updateBlacklist",
    "startFocusMode",
    "endFocusMode",
    "getTabTimeData",
];
const TYPES: &[&str] = &["SET_ALARMS", "GET_ALARMS"];

impl ControlMessage {
    /// Decodes a message body.
    pub fn parse(body: &Value) -> Result<Self, MessageError> {
        let malformed = |name: &str| {
            let name = name.to_string();
            move |source: serde_json::Error| MessageError::Malformed { name, source }
        };

        if let Some(action) = body.get("action").and_then(Value::as_str) {
            if !ACTIONS.contains(&action) {
                return Err(MessageError::Unknown(action.to_string()));
            }
            let message = ActionMessage::deserialize(body).map_err(malformed(action))?;
            return Ok(match message {
                ActionMessage::UpdateBlacklist { blacklist } => Self::UpdateBlacklist(blacklist),
                ActionMessage::StartFocusMode {
                    focus_duration,
                    blacklist,
                } => Self::StartFocusMode {
                    duration_minutes: focus_duration,
                    blacklist,
                },
                ActionMessage::EndFocusMode => Self::EndFocusMode,
                ActionMessage::GetTabTimeData => Self::GetTabTimeData,
            });
        }

        if let Some(kind) = body.get("type").and_then(Value::as_str) {
            if !TYPES.contains(&kind) {
                return Err(MessageError::Unknown(kind.to_string()));
            }
            let message = TypedMessage::deserialize(body).map_err(malformed(kind))?;
            return Ok(match message {
                TypedMessage::SetAlarms { alarms } => Self::SetAlarms(decode_alarms(alarms)),
                TypedMessage::GetAlarms => Self::GetAlarms,
            });
        }

        Err(MessageError::Untagged)
    }
}

/// Entries are decoded one by one; an unreadable entry is dropped so the
/// rest of the list still arrives.
fn decode_alarms(raw: Vec<Value>) -> Vec<Alarm> {
    raw.into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(alarm) => Some(alarm),
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping unreadable alarm");
                None
            }
        })
        .collect()
}

/// Durations come from form inputs, so numeric strings are accepted. Anything
/// unparseable means "no duration".
fn lenient_minutes<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Other(Value),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Some(n),
        Raw::Text(s) => s.trim().parse().ok(),
        Raw::Other(_) => None,
    })
}
