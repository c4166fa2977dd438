use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
    Refresh,
}

/// A mutation notice for one component; exists only in flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataChangeEvent {
    pub component_id: String,
    pub action: ChangeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl DataChangeEvent {
    #[must_use]
    pub fn new(component_id: impl Into<String>, action: ChangeAction) -> Self {
        Self {
            component_id: component_id.into(),
            action,
            data: None,
            id: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Control {
    #[serde(rename_all = "camelCase")]
    Connected { client_id: String },
}

/// One message received over the push channel
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    Connected { client_id: String },
    Change(DataChangeEvent),
}

impl PushMessage {
    /// Decodes a message payload; `None` for anything unrecognized.
    #[must_use]
    pub fn parse(payload: &str) -> Option<Self> {
        if let Ok(Control::Connected { client_id }) = serde_json::from_str(payload) {
            return Some(Self::Connected { client_id });
        }
        serde_json::from_str(payload).ok().map(Self::Change)
    }

    /// The handshake a push endpoint sends first.
    #[must_use]
    pub fn connected_payload(client_id: &str) -> String {
        serde_json::json!({"type": "connected", "clientId": client_id}).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = DataChangeEvent::new("UserData", ChangeAction::Delete).with_id(7);
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded, json!({"componentId": "UserData", "action": "delete", "id": 7}));
    }

    #[test]
    fn test_push_message_parsing() {
        assert_eq!(
            PushMessage::parse(&PushMessage::connected_payload("abc")),
            Some(PushMessage::Connected { client_id: "abc".to_string() })
        );

        let change = PushMessage::parse(r#"{"componentId":"UserData","action":"update","data":{"id":1}}"#);
        assert!(matches!(
            change,
            Some(PushMessage::Change(DataChangeEvent { action: ChangeAction::Update, .. }))
        ));

        assert!(PushMessage::parse("ping").is_none());
        assert!(PushMessage::parse(r#"{"componentId":"X","action":"explode"}"#).is_none());
    }
}
