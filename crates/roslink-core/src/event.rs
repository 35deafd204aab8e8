//! Events a session emits to its consumer.

use roslink_transport::CloseInfo;
use serde_json::Value;
use tokio::sync::mpsc;

/// Something emitted by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// A decoded message on a subscribed topic.
    Message { topic: String, msg: Value },
    /// The result of a `call_service`, addressed by the caller's id.
    ServiceResponse {
        id: Option<String>,
        service: String,
        values: Option<Value>,
        result: bool,
    },
    /// The transport connected.
    Connection,
    /// The transport closed.
    Close(CloseInfo),
    /// The transport reported an error.
    Error(String),
}

impl BridgeEvent {
    pub(crate) fn success(id: Option<String>, service: &str, values: Option<Value>) -> Self {
        BridgeEvent::ServiceResponse {
            id,
            service: service.to_string(),
            values,
            result: true,
        }
    }

    pub(crate) fn failure(id: Option<String>, service: &str, message: impl Into<String>) -> Self {
        BridgeEvent::ServiceResponse {
            id,
            service: service.to_string(),
            values: Some(Value::String(message.into())),
            result: false,
        }
    }
}

/// Consumer of session events.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: BridgeEvent);
}

impl EventSink for mpsc::UnboundedSender<BridgeEvent> {
    fn emit(&self, event: BridgeEvent) {
        // A consumer that went away just stops receiving.
        let _ = self.send(event);
    }
}
