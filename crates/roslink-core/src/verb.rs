//! Rosbridge-style verbs accepted by a session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `op` values a session understands.
pub const VERBS: [&str; 6] = [
    "advertise",
    "unadvertise",
    "publish",
    "subscribe",
    "unsubscribe",
    "call_service",
];

/// A high-level operation, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Verb {
    Advertise {
        topic: String,
        #[serde(rename = "type")]
        msg_type: String,
    },
    Unadvertise {
        topic: String,
    },
    Publish {
        topic: String,
        #[serde(default)]
        msg: Value,
    },
    Subscribe {
        topic: String,
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        msg_type: Option<String>,
    },
    Unsubscribe {
        topic: String,
    },
    CallService {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        service: String,
        #[serde(rename = "type", default)]
        service_type: String,
        #[serde(default)]
        args: Value,
    },
}

impl Verb {
    /// Parse a JSON verb.
    ///
    /// Returns `Ok(None)` when `op` is missing or not a known verb, and an
    /// error when a known verb has a malformed payload.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error for malformed known verbs.
    pub fn from_json(value: Value) -> Result<Option<Self>, serde_json::Error> {
        let known = value
            .get("op")
            .and_then(Value::as_str)
            .is_some_and(|op| VERBS.contains(&op));
        if !known {
            return Ok(None);
        }
        serde_json::from_value(value).map(Some)
    }

    /// The verb's `op` value.
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Verb::Advertise { .. } => "advertise",
            Verb::Unadvertise { .. } => "unadvertise",
            Verb::Publish { .. } => "publish",
            Verb::Subscribe { .. } => "subscribe",
            Verb::Unsubscribe { .. } => "unsubscribe",
            Verb::CallService { .. } => "call_service",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_verbs() {
        let verb = Verb::from_json(json!({"op": "advertise", "topic": "/t", "type": "pkg/Msg"}))
            .unwrap()
            .unwrap();
        assert_eq!(
            verb,
            Verb::Advertise {
                topic: "/t".to_string(),
                msg_type: "pkg/Msg".to_string(),
            }
        );

        let verb = Verb::from_json(json!({
            "op": "call_service",
            "id": "call:1",
            "service": "/rosapi/topics",
            "type": "rosapi/Topics"
        }))
        .unwrap()
        .unwrap();
        assert_eq!(verb.op(), "call_service");
        match verb {
            Verb::CallService { id, args, .. } => {
                assert_eq!(id.as_deref(), Some("call:1"));
                assert!(args.is_null());
            }
            other => panic!("unexpected verb {other:?}"),
        }
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let verb = Verb::from_json(json!({"op": "unsubscribe", "id": "x", "topic": "/t"}))
            .unwrap()
            .unwrap();
        assert_eq!(verb.op(), "unsubscribe");
    }

    #[test]
    fn test_unknown_op() {
        assert!(Verb::from_json(json!({"op": "set_level", "level": "debug"})).unwrap().is_none());
        assert!(Verb::from_json(json!({"topic": "/t"})).unwrap().is_none());
    }

    #[test]
    fn test_malformed_known_op() {
        assert!(Verb::from_json(json!({"op": "publish"})).is_err());
    }
}
