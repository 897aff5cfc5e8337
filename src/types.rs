//! Activity event types
//!
//! This module defines the records that flow from the observer to the
//! collection endpoint: the action tags, the typed per-action payloads, and
//! the wire envelope that carries them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ObserverError;

/// Action tag carried by every activity event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    PageView,
    ButtonClick,
    FormSubmitted,
    SearchInput,
    SessionEnd,
    AjaxRequest,
    AjaxError,
    /// Tags sent through `send_activity` that the observer does not produce itself
    #[serde(untagged)]
    Other(String),
}

impl ActivityAction {
    pub fn as_str(&self) -> &str {
        match self {
            ActivityAction::PageView => "page_view",
            ActivityAction::ButtonClick => "button_click",
            ActivityAction::FormSubmitted => "form_submitted",
            ActivityAction::SearchInput => "search_input",
            ActivityAction::SessionEnd => "session_end",
            ActivityAction::AjaxRequest => "ajax_request",
            ActivityAction::AjaxError => "ajax_error",
            ActivityAction::Other(tag) => tag.as_str(),
        }
    }

    /// Resolve a wire tag, keeping unknown tags as [`ActivityAction::Other`]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "page_view" => ActivityAction::PageView,
            "button_click" => ActivityAction::ButtonClick,
            "form_submitted" => ActivityAction::FormSubmitted,
            "search_input" => ActivityAction::SearchInput,
            "session_end" => ActivityAction::SessionEnd,
            "ajax_request" => ActivityAction::AjaxRequest,
            "ajax_error" => ActivityAction::AjaxError,
            other => ActivityAction::Other(other.to_string()),
        }
    }

    /// All tags the observer emits on its own
    pub fn known() -> [ActivityAction; 7] {
        [
            ActivityAction::PageView,
            ActivityAction::ButtonClick,
            ActivityAction::FormSubmitted,
            ActivityAction::SearchInput,
            ActivityAction::SessionEnd,
            ActivityAction::AjaxRequest,
            ActivityAction::AjaxError,
        ]
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an event leaves the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Non-blocking POST; failures are logged and dropped
    BestEffort,
    /// Beacon primitive usable during teardown; dropped when unavailable
    Beacon,
}

/// Typed payload for one action tag
pub trait ActivityPayload: Serialize {
    /// Tag the payload is sent under
    fn action() -> ActivityAction;

    /// Flatten the payload into the key/value mapping merged into the envelope
    fn to_data(&self) -> Result<Map<String, Value>, ObserverError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(ObserverError::InvalidSignal(format!(
                "payload for {} serialized to a non-object: {}",
                Self::action(),
                other
            ))),
        }
    }
}

/// `page_view`: sent once when the observer starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageView {
    pub page_title: String,
    pub page_url: String,
    pub referrer: String,
    /// Screen size as `WxH`
    pub screen_resolution: String,
    /// Viewport size as `WxH`
    pub viewport: String,
}

/// `button_click`: a click on a recognised control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonClick {
    /// Human-readable label such as `Button: Save`
    pub element: String,
    /// Deepest scroll point reached so far (0-100)
    pub scroll_depth: u8,
}

/// `form_submitted`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSubmitted {
    pub form_id: String,
    pub form_action: String,
    pub field_count: usize,
}

/// `search_input`: a settled query typed into a search field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchInput {
    pub query: String,
    pub partial: bool,
}

/// `session_end`: sent from `beforeunload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnd {
    /// Whole seconds since the observer started
    pub time_on_page: u64,
    pub max_scroll_depth: u8,
}

/// `ajax_request`: a tracked outbound request that settled with a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AjaxRequest {
    pub url: String,
    pub method: String,
    /// Milliseconds between dispatch and response
    pub response_time: u64,
    pub status: u16,
}

/// `ajax_error`: a tracked outbound request that failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AjaxError {
    pub url: String,
    pub error: String,
}

impl ActivityPayload for PageView {
    fn action() -> ActivityAction {
        ActivityAction::PageView
    }
}

impl ActivityPayload for ButtonClick {
    fn action() -> ActivityAction {
        ActivityAction::ButtonClick
    }
}

impl ActivityPayload for FormSubmitted {
    fn action() -> ActivityAction {
        ActivityAction::FormSubmitted
    }
}

impl ActivityPayload for SearchInput {
    fn action() -> ActivityAction {
        ActivityAction::SearchInput
    }
}

impl ActivityPayload for SessionEnd {
    fn action() -> ActivityAction {
        ActivityAction::SessionEnd
    }
}

impl ActivityPayload for AjaxRequest {
    fn action() -> ActivityAction {
        ActivityAction::AjaxRequest
    }
}

impl ActivityPayload for AjaxError {
    fn action() -> ActivityAction {
        ActivityAction::AjaxError
    }
}

/// The JSON body POSTed to the collection endpoint
///
/// `data` is flattened next to the envelope fields. Envelope construction in
/// [`crate::encoder::ActivityEncoder`] lifts colliding payload keys into the
/// envelope, so the serialized object never repeats a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub action: ActivityAction,
    /// ISO-8601 UTC, millisecond precision
    pub timestamp: String,
    pub url: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ActivityEvent {
    /// Look up a payload field
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn to_json(&self) -> Result<String, ObserverError> {
        serde_json::to_string(self).map_err(ObserverError::JsonError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_action_tags_match_wire_names() {
        for action in ActivityAction::known() {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
            assert_eq!(ActivityAction::from_tag(action.as_str()), action);
        }
    }

    #[test]
    fn test_unknown_action_round_trips_as_other() {
        let action: ActivityAction = serde_json::from_str("\"video_play\"").unwrap();
        assert_eq!(action, ActivityAction::Other("video_play".to_string()));
        assert_eq!(serde_json::to_string(&action).unwrap(), "\"video_play\"");
    }

    #[test]
    fn test_payload_to_data() {
        let data = ButtonClick {
            element: "Button: Save".to_string(),
            scroll_depth: 40,
        }
        .to_data()
        .unwrap();

        assert_eq!(data["element"], "Button: Save");
        assert_eq!(data["scroll_depth"], 40);
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_event_serializes_flat() {
        let mut data = Map::new();
        data.insert("query".to_string(), Value::from("shoes"));
        data.insert("partial".to_string(), Value::from(true));

        let event = ActivityEvent {
            action: ActivityAction::SearchInput,
            timestamp: "2024-01-15T14:00:00.000Z".to_string(),
            url: "https://shop.test/catalog/".to_string(),
            data,
        };

        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "action": "search_input",
                "timestamp": "2024-01-15T14:00:00.000Z",
                "url": "https://shop.test/catalog/",
                "query": "shoes",
                "partial": true
            })
        );

        let parsed: ActivityEvent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
    }
}
