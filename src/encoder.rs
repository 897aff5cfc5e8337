//! Activity event encoder
//!
//! Builds the wire envelope around a payload mapping. The envelope fields
//! (`action`, `timestamp`, `url`) are stamped at send time; a payload key with
//! the same name takes precedence, matching object-spread semantics on the
//! receiving side. Envelope fields are strings on the wire, so a non-string
//! payload value for one of them wins in its JSON text form.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::ObserverError;
use crate::types::{ActivityAction, ActivityEvent, ActivityPayload};

/// Stateless envelope builder
pub struct ActivityEncoder;

impl ActivityEncoder {
    /// ISO-8601 with millisecond precision and a `Z` suffix
    pub fn format_timestamp(at: DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Wrap a payload mapping in the event envelope
    pub fn envelope(
        action: ActivityAction,
        mut data: Map<String, Value>,
        page_url: &str,
        at: DateTime<Utc>,
    ) -> ActivityEvent {
        let action = match data.remove("action") {
            Some(Value::String(tag)) => ActivityAction::from_tag(&tag),
            Some(other) => ActivityAction::from_tag(&other.to_string()),
            None => action,
        };
        let timestamp = match data.remove("timestamp") {
            Some(Value::String(ts)) => ts,
            Some(other) => other.to_string(),
            None => Self::format_timestamp(at),
        };
        let url = match data.remove("url") {
            Some(Value::String(url)) => url,
            Some(other) => other.to_string(),
            None => page_url.to_string(),
        };

        ActivityEvent {
            action,
            timestamp,
            url,
            data,
        }
    }

    /// Envelope a typed payload
    pub fn encode<P: ActivityPayload>(
        payload: &P,
        page_url: &str,
        at: DateTime<Utc>,
    ) -> Result<ActivityEvent, ObserverError> {
        Ok(Self::envelope(P::action(), payload.to_data()?, page_url, at))
    }

    pub fn encode_to_json(event: &ActivityEvent) -> Result<String, ObserverError> {
        event.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AjaxRequest, FormSubmitted};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 5).unwrap()
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(
            ActivityEncoder::format_timestamp(fixed_time()),
            "2024-01-15T14:00:05.000Z"
        );
    }

    #[test]
    fn test_envelope_uses_page_url() {
        let payload = FormSubmitted {
            form_id: "login".to_string(),
            form_action: "https://shop.test/login/".to_string(),
            field_count: 3,
        };

        let event = ActivityEncoder::encode(&payload, "https://shop.test/login/", fixed_time())
            .unwrap();

        assert_eq!(event.action, ActivityAction::FormSubmitted);
        assert_eq!(event.url, "https://shop.test/login/");
        assert_eq!(event.timestamp, "2024-01-15T14:00:05.000Z");
        assert_eq!(event.field("form_id"), Some(&Value::from("login")));
        assert_eq!(event.field("field_count"), Some(&Value::from(3)));
    }

    #[test]
    fn test_payload_url_overrides_page_url() {
        let payload = AjaxRequest {
            url: "/search/?q=x".to_string(),
            method: "GET".to_string(),
            response_time: 12,
            status: 200,
        };

        let event =
            ActivityEncoder::encode(&payload, "https://shop.test/catalog/", fixed_time()).unwrap();

        assert_eq!(event.url, "/search/?q=x");
        assert!(event.field("url").is_none());

        let body: Value =
            serde_json::from_str(&ActivityEncoder::encode_to_json(&event).unwrap()).unwrap();
        assert_eq!(body["url"], "/search/?q=x");
        assert_eq!(body["status"], 200);
        assert_eq!(body.as_object().unwrap().len(), 6);
    }

    #[test]
    fn test_generic_payload_can_override_action() {
        let mut data = Map::new();
        data.insert("action".to_string(), Value::from("video_play"));
        data.insert("position".to_string(), Value::from(12));

        let event = ActivityEncoder::envelope(
            ActivityAction::PageView,
            data,
            "https://shop.test/",
            fixed_time(),
        );

        assert_eq!(event.action, ActivityAction::Other("video_play".to_string()));
        assert_eq!(event.data.len(), 1);
    }

    #[test]
    fn test_non_string_envelope_keys_still_override() {
        let mut data = Map::new();
        data.insert("action".to_string(), Value::from(7));
        data.insert("timestamp".to_string(), Value::from(1700000000));
        data.insert("position".to_string(), Value::from(12));

        let event = ActivityEncoder::envelope(
            ActivityAction::PageView,
            data,
            "https://shop.test/",
            fixed_time(),
        );

        assert_eq!(event.action, ActivityAction::Other("7".to_string()));
        assert_eq!(event.timestamp, "1700000000");
        assert_eq!(event.data.len(), 1);
        assert_eq!(event.field("position"), Some(&Value::from(12)));
    }
}
