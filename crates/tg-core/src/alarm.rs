//! Countdown alarms set from the UI.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::effect::{Effect, HostCommand, UiMessage};

/// A one-shot alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    /// UI-assigned identifier.
    #[serde(deserialize_with = "alarm_id")]
    pub id: i64,

    /// When the alarm is due.
    #[serde(with = "alarm_time")]
    pub time: DateTime<Utc>,

    /// Set once fired; an alarm never fires twice.
    #[serde(default)]
    pub triggered: bool,

    /// Fields the UI attaches (labels, durations) that are handed back as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The in-memory alarm list.
#[derive(Debug, Default)]
pub struct AlarmRegistry {
    alarms: Vec<Alarm>,
}

impl AlarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole list. No merge with existing alarms.
    pub fn set_alarms(&mut self, alarms: Vec<Alarm>) {
        tracing::debug!(count = alarms.len(), "alarms replaced");
        self.alarms = alarms;
    }

    pub fn alarms(&self) -> &[Alarm] {
        &self.alarms
    }

    /// Fires every due, untriggered alarm in list order.
    ///
    /// Each firing opens the popup and routes it to the timer view.
    pub fn check(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let mut effects = Vec::new();
        for alarm in self
            .alarms
            .iter_mut()
            .filter(|alarm| !alarm.triggered && alarm.time <= now)
        {
            alarm.triggered = true;
            tracing::info!(id = alarm.id, due = %alarm.time, "alarm fired");
            effects.push(HostCommand::OpenUi.into());
            effects.push(
                HostCommand::SendToUi {
                    message: UiMessage::SwitchToTimer,
                }
                .into(),
            );
        }
        effects
    }
}

/// Ids are `Date.now()` values; a float with no fractional part is accepted.
fn alarm_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
    }

    // 2^53, the largest integer a JS number holds exactly.
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    match Raw::deserialize(deserializer)? {
        Raw::Int(id) => Ok(id),
        Raw::Float(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT => {
            #[expect(clippy::cast_possible_truncation, reason = "integral and within 2^53")]
            let id = f as i64;
            Ok(id)
        }
        Raw::Float(f) => Err(D::Error::custom(format!("invalid alarm id: {f}"))),
    }
}

/// Alarm times travel as ISO 8601 strings. Epoch milliseconds, RFC 2822,
/// `Date.toString()` output and offset-less local times are accepted too.
mod alarm_time {
    use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    const JS_DATE_STRING: &str = "%a %b %d %Y %H:%M:%S GMT%z";
    const LOCAL_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| D::Error::custom(format!("alarm time out of range: {ms}"))),
            Raw::Text(text) => parse_text(&text)
                .ok_or_else(|| D::Error::custom(format!("invalid alarm time {text:?}"))),
        }
    }

    pub(super) fn parse_text(text: &str) -> Option<DateTime<Utc>> {
        let text = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
            return Some(dt.with_timezone(&Utc));
        }
        // "Tue Nov 14 2023 22:13:20 GMT+0000 (Coordinated Universal Time)"
        let head = text.split_once(" (").map_or(text, |(head, _)| head);
        if let Ok(dt) = DateTime::parse_from_str(head, JS_DATE_STRING) {
            return Some(dt.with_timezone(&Utc));
        }
        // `datetime-local` inputs carry no offset.
        LOCAL_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local, NaiveDate, TimeZone};

    use super::*;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap() + Duration::milliseconds(ms)
    }

    fn alarm(id: i64, at: DateTime<Utc>) -> Alarm {
        Alarm {
            id,
            time: at,
            triggered: false,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn due_alarm_fires_exactly_once() {
        let mut registry = AlarmRegistry::new();
        registry.set_alarms(vec![alarm(1, t(1000))]);

        assert!(registry.check(t(999)).is_empty());

        let effects = registry.check(t(1000));
        assert_eq!(
            effects,
            vec![
                Effect::Host(HostCommand::OpenUi),
                Effect::Host(HostCommand::SendToUi {
                    message: UiMessage::SwitchToTimer
                }),
            ]
        );
        assert!(registry.alarms()[0].triggered);

        assert!(registry.check(t(2000)).is_empty());
        assert!(registry.check(t(60_000)).is_empty());
    }

    #[test]
    fn set_alarms_replaces_wholesale() {
        let mut registry = AlarmRegistry::new();
        registry.set_alarms(vec![alarm(1, t(0)), alarm(2, t(0))]);
        registry.set_alarms(vec![alarm(3, t(5000))]);

        let ids: Vec<i64> = registry.alarms().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn already_triggered_alarms_stay_silent() {
        let mut registry = AlarmRegistry::new();
        let mut fired = alarm(1, t(0));
        fired.triggered = true;
        registry.set_alarms(vec![fired, alarm(2, t(0)), alarm(3, t(10_000))]);

        let effects = registry.check(t(1));
        assert_eq!(effects.len(), 2);
        let triggered: Vec<bool> = registry.alarms().iter().map(|a| a.triggered).collect();
        assert_eq!(triggered, vec![true, true, false]);
    }

    #[test]
    fn alarm_wire_format_round_trips_ui_fields() {
        let json = r#"{"id": 1700000000123, "time": "2023-11-14T22:13:20.000Z", "label": "tea"}"#;
        let parsed: Alarm = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.time, t(0));
        assert!(!parsed.triggered);
        assert_eq!(parsed.extra["label"], "tea");

        let value = serde_json::to_value(&parsed).unwrap();
        assert_eq!(value["time"], "2023-11-14T22:13:20.000Z");
        assert_eq!(value["triggered"], false);
        assert_eq!(value["label"], "tea");
    }

    #[test]
    fn alarm_time_accepts_epoch_millis() {
        let parsed: Alarm = serde_json::from_str(r#"{"id": 1, "time": 1700000000000}"#).unwrap();
        assert_eq!(parsed.time, t(0));
    }

    #[test]
    fn alarm_time_accepts_browser_date_strings() {
        for text in [
            "Tue, 14 Nov 2023 22:13:20 GMT",
            "Tue Nov 14 2023 23:13:20 GMT+0100 (Central European Standard Time)",
            "Tue Nov 14 2023 22:13:20 GMT+0000",
        ] {
            assert_eq!(alarm_time::parse_text(text), Some(t(0)), "{text}");
        }
    }

    #[test]
    fn alarm_time_without_offset_is_local() {
        let naive = NaiveDate::from_ymd_opt(2030, 6, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let expected = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(alarm_time::parse_text("2030-06-01T09:30"), Some(expected));
        assert_eq!(alarm_time::parse_text("2030-06-01T09:30:00"), Some(expected));
    }

    #[test]
    fn alarm_id_accepts_integral_floats_only() {
        let parsed: Alarm = serde_json::from_str(r#"{"id": 1700000000123.0, "time": 0}"#).unwrap();
        assert_eq!(parsed.id, 1_700_000_000_123);

        let parsed: Result<Alarm, _> = serde_json::from_str(r#"{"id": 1.5, "time": 0}"#);
        assert!(parsed.is_err());
        let parsed: Result<Alarm, _> = serde_json::from_str(r#"{"id": "one", "time": 0}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn alarm_time_rejects_garbage() {
        let parsed: Result<Alarm, _> = serde_json::from_str(r#"{"id": 1, "time": "soon"}"#);
        assert!(parsed.is_err());
    }
}
