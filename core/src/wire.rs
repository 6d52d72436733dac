use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{Frame, FrameDecodeError};

/// Close code reported when a peer ends the session deliberately.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Message types exchanged with the training service.
pub mod message_kinds {
    /// Progress report of a running training session.
    pub const TRAINING_PROGRESS: &str = "training_progress";
    /// Status change of a training session.
    pub const TRAINING_STATUS: &str = "training_status";
    /// Failure reported by the training service.
    pub const TRAINING_ERROR: &str = "training_error";
    /// New environment frame.
    pub const ENVIRONMENT_UPDATE: &str = "environment_update";
    /// Acknowledgement sent after the subscription is accepted.
    pub const CONNECTION_ACK: &str = "connection_ack";
    /// Reply to a ping.
    pub const PONG: &str = "pong";
    /// Metrics batch, either streamed or synthesized by fallback polling.
    pub const METRICS: &str = "metrics";
    /// Outbound keep-alive ping.
    pub const PING: &str = "ping";
}

/// Envelope shared by inbound and outbound messages: `{type, ...payload}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Message type used to pick a handler.
    #[serde(rename = "type")]
    pub kind: String,
    /// Remaining fields of the message.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl WireMessage {
    /// Creates a message without payload.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.payload.insert(key.into(), value);
        self
    }

    /// Outbound keep-alive ping.
    #[must_use]
    pub fn ping() -> Self {
        Self::new(message_kinds::PING)
    }

    /// Metrics message carrying `data`.
    #[must_use]
    pub fn metrics(data: Value) -> Self {
        Self::new(message_kinds::METRICS).with("data", data)
    }

    /// The `data` field of the message, if present.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.payload.get("data")
    }

    /// Decodes the environment frame carried by the message.
    ///
    /// The frame is read from `data` when it holds an object, otherwise from
    /// the payload itself.
    pub fn to_frame(&self) -> Result<Frame, FrameDecodeError> {
        match self.data() {
            Some(data @ Value::Object(_)) => Frame::from_value(data),
            _ => Frame::from_value(&Value::Object(self.payload.clone())),
        }
    }

    /// Full JSON representation of the message.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = self.payload.clone();
        let _ = object.insert("type".to_owned(), json!(self.kind));
        Value::Object(object)
    }
}

/// Session record returned by the status endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identifier.
    pub id: String,
    /// Lifecycle status such as `running` or `completed`.
    #[serde(default)]
    pub status: Option<String>,
    /// Fields the viewer does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One metrics sample of a training session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Episode the sample belongs to.
    #[serde(default)]
    pub episode: Option<u64>,
    /// Timestep the sample was taken at.
    #[serde(default)]
    pub timestep: Option<u64>,
    /// Metric values keyed by name.
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_flattens_payload_next_to_type() {
        let message: WireMessage = serde_json::from_str(
            r#"{"type":"training_progress","episode":3,"data":{"reward":1.5}}"#,
        )
        .expect("message decodes");

        assert_eq!(message.kind, message_kinds::TRAINING_PROGRESS);
        assert_eq!(message.payload.get("episode"), Some(&json!(3)));
        assert_eq!(message.data(), Some(&json!({"reward": 1.5})));
    }

    #[test]
    fn ping_serializes_to_bare_type() {
        let text = serde_json::to_string(&WireMessage::ping()).expect("ping encodes");
        assert_eq!(text, r#"{"type":"ping"}"#);
    }

    #[test]
    fn metrics_message_wraps_data() {
        let message = WireMessage::metrics(json!({"metrics": []}));
        assert_eq!(
            message.to_value(),
            json!({"type": "metrics", "data": {"metrics": []}})
        );
    }

    #[test]
    fn environment_updates_decode_from_data_or_payload() {
        let nested = WireMessage::new(message_kinds::ENVIRONMENT_UPDATE)
            .with("data", json!({"timestep": 4, "agent_position": [1, 1]}));
        assert_eq!(nested.to_frame().expect("frame decodes").timestep, 4);

        let inline = WireMessage::new(message_kinds::ENVIRONMENT_UPDATE)
            .with("timestep", json!(9))
            .with("agents", json!([{"id": 2, "position": [0, 0]}]));
        let frame = inline.to_frame().expect("frame decodes");
        assert_eq!(frame.timestep, 9);
        assert_eq!(frame.agents.len(), 1);
    }

    #[test]
    fn session_records_keep_unknown_fields() {
        let record: SessionRecord =
            serde_json::from_value(json!({"id": "abc", "status": "running", "episodes": 10}))
                .expect("record decodes");

        assert_eq!(record.status.as_deref(), Some("running"));
        assert_eq!(record.extra.get("episodes"), Some(&json!(10)));
    }
}
