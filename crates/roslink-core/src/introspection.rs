//! Built-in `rosapi` pseudo-services answered from session state.

use roslink_protocol::Parameter;
use roslink_schema::definition::normalize_type_name;
use roslink_schema::MessageDefinition;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::correlator::{CorrelationKey, Response};
use crate::event::BridgeEvent;
use crate::session::{Inner, SessionError, Unanswered};

const PACKAGES: [&str; 2] = ["rosapi", "rosapi_msgs"];

/// Introspection services handled locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    GetParam,
    SetParam,
    Topics,
    Services,
    TopicType,
    ServiceType,
}

/// How a `call_service` type relates to `rosapi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Introspection {
    Builtin(Builtin),
    /// A `rosapi` type with no local handler.
    Unimplemented,
}

/// Classify a service type. `None` for anything outside `rosapi`.
#[must_use]
pub fn classify(service_type: &str) -> Option<Introspection> {
    let normalized = normalize_type_name(service_type);
    let (package, name) = normalized.split_once('/')?;
    if !PACKAGES.contains(&package) {
        return None;
    }

    let builtin = match name {
        "GetParam" => Builtin::GetParam,
        "SetParam" => Builtin::SetParam,
        "Topics" => Builtin::Topics,
        "Services" => Builtin::Services,
        "TopicType" => Builtin::TopicType,
        "ServiceType" => Builtin::ServiceType,
        _ => return Some(Introspection::Unimplemented),
    };
    Some(Introspection::Builtin(builtin))
}

/// ROS 1 style `node:param` names become `node.param`.
#[must_use]
pub fn parameter_name(name: &str) -> String {
    name.replacen(':', ".", 1)
}

/// Parameter values arrive as JSON text; anything unparsable is kept as a
/// plain string.
#[must_use]
pub fn parse_param_value(value: &Value) -> Value {
    match value {
        Value::String(text) => serde_json::from_str(text).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

/// Normalize call arguments for encoding. Positional arguments are mapped
/// onto the request's fields in order.
#[must_use]
pub fn call_args(definition: &MessageDefinition, args: &Value) -> Value {
    match args {
        Value::Array(items) => {
            let fields = &definition.root().fields;
            let object: Map<String, Value> = fields
                .iter()
                .zip(items)
                .map(|(field, item)| (field.name.clone(), item.clone()))
                .collect();
            Value::Object(object)
        }
        other => other.clone(),
    }
}

/// A named argument, or its positional equivalent.
fn arg<'a>(args: &'a Value, key: &str, index: usize) -> Option<&'a Value> {
    match args {
        Value::Array(items) => items.get(index),
        other => other.get(key),
    }
}

fn string_arg(args: &Value, key: &str, index: usize) -> String {
    arg(args, key, index)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl Inner {
    /// Answer a built-in introspection call.
    pub(crate) fn handle_builtin(
        self: &Arc<Self>,
        builtin: Builtin,
        id: Option<String>,
        service: &str,
        args: &Value,
    ) -> Result<(), SessionError> {
        debug!(?builtin, service = %service, "Introspection call");
        match builtin {
            Builtin::GetParam => self.get_param(id, service, args),
            Builtin::SetParam => self.set_param(id, service, args),
            Builtin::Topics => {
                let channels = self.directory.channels();
                let topics: Vec<&str> = channels.iter().map(|c| c.topic.as_str()).collect();
                let types: Vec<&str> = channels.iter().map(|c| c.schema_name.as_str()).collect();
                self.sink.emit(BridgeEvent::success(
                    id,
                    service,
                    Some(json!({"topics": topics, "types": types})),
                ));
                Ok(())
            }
            Builtin::Services => self.list_services(id, service),
            Builtin::TopicType => {
                let topic = string_arg(args, "topic", 0);
                let event = match self.directory.channel_by_topic(&topic) {
                    Some(channel) => {
                        BridgeEvent::success(id, service, Some(json!({"type": channel.schema_name})))
                    }
                    None => BridgeEvent::failure(id, service, format!("unknown topic {topic}")),
                };
                self.sink.emit(event);
                Ok(())
            }
            Builtin::ServiceType => {
                let name = string_arg(args, "service", 0);
                let event = match self.directory.service_by_name(&name) {
                    Some(remote) => BridgeEvent::success(
                        id,
                        service,
                        Some(json!({"type": remote.service_type})),
                    ),
                    None => BridgeEvent::failure(id, service, format!("unknown service {name}")),
                };
                self.sink.emit(event);
                Ok(())
            }
        }
    }

    fn get_param(
        self: &Arc<Self>,
        id: Option<String>,
        service: &str,
        args: &Value,
    ) -> Result<(), SessionError> {
        let name = parameter_name(&string_arg(args, "name", 0));
        let request_id = self.request_id("get_param");
        let key = CorrelationKey::Parameters(request_id.clone());
        let (rx, _) = self.correlator.register(key.clone());

        if let Err(e) = self.client.get_parameters(vec![name.clone()], Some(request_id)) {
            drop(rx);
            self.correlator.prune(&key);
            return Err(e.into());
        }

        let inner = Arc::clone(self);
        let service = service.to_string();
        self.spawn_tracked(async move {
            let event = match inner.await_response(&key, rx).await {
                Ok(Response::Parameters(parameters)) => {
                    match parameters.into_iter().find(|p| p.name == name) {
                        Some(parameter) => {
                            let text = serde_json::to_string(&parameter.value)
                                .unwrap_or_else(|_| parameter.value.to_string());
                            BridgeEvent::success(id, &service, Some(json!({"value": text})))
                        }
                        None => {
                            BridgeEvent::failure(id, &service, format!("parameter {name} not set"))
                        }
                    }
                }
                Ok(other) => {
                    warn!(response = ?other, "Unexpected response to get_param");
                    return;
                }
                Err(Unanswered::TimedOut) => BridgeEvent::failure(id, &service, "timed out"),
                Err(Unanswered::Cancelled) => return,
            };
            inner.sink.emit(event);
        });
        Ok(())
    }

    fn set_param(
        self: &Arc<Self>,
        id: Option<String>,
        service: &str,
        args: &Value,
    ) -> Result<(), SessionError> {
        let parameter = Parameter {
            name: parameter_name(&string_arg(args, "name", 0)),
            value: arg(args, "value", 1).map(parse_param_value).unwrap_or_default(),
            param_type: None,
        };
        let request_id = self.request_id("set_param");
        let key = CorrelationKey::Parameters(request_id.clone());
        let (rx, _) = self.correlator.register(key.clone());

        if let Err(e) = self.client.set_parameters(vec![parameter], Some(request_id)) {
            drop(rx);
            self.correlator.prune(&key);
            return Err(e.into());
        }

        let inner = Arc::clone(self);
        let service = service.to_string();
        self.spawn_tracked(async move {
            let event = match inner.await_response(&key, rx).await {
                Ok(_) => BridgeEvent::success(id, &service, None),
                Err(Unanswered::TimedOut) => BridgeEvent::failure(id, &service, "timed out"),
                Err(Unanswered::Cancelled) => return,
            };
            inner.sink.emit(event);
        });
        Ok(())
    }

    fn list_services(self: &Arc<Self>, id: Option<String>, service: &str) -> Result<(), SessionError> {
        let key = CorrelationKey::ConnectionGraph;
        let (rx, first) = self.correlator.register(key.clone());
        if first {
            if let Err(e) = self.client.subscribe_connection_graph() {
                drop(rx);
                self.correlator.prune(&key);
                return Err(e.into());
            }
        }

        let inner = Arc::clone(self);
        let service = service.to_string();
        self.spawn_tracked(async move {
            let event = match inner.await_response(&key, rx).await {
                Ok(Response::ConnectionGraph(update)) => {
                    let services: Vec<String> = update
                        .advertised_services
                        .into_iter()
                        .map(|s| s.name)
                        .collect();
                    BridgeEvent::success(id, &service, Some(json!({"services": services})))
                }
                Ok(other) => {
                    warn!(response = ?other, "Unexpected response to services");
                    return;
                }
                Err(Unanswered::TimedOut) => {
                    if !inner.correlator.is_pending(&key) {
                        if let Err(e) = inner.client.unsubscribe_connection_graph() {
                            warn!(error = %e, "Failed to unsubscribe from connection graph");
                        }
                    }
                    BridgeEvent::failure(id, &service, "timed out")
                }
                Err(Unanswered::Cancelled) => return,
            };
            inner.sink.emit(event);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roslink_schema::{msgdef, Dialect};

    #[test]
    fn test_classify() {
        assert_eq!(
            classify("rosapi/GetParam"),
            Some(Introspection::Builtin(Builtin::GetParam))
        );
        assert_eq!(
            classify("rosapi_msgs/srv/Topics"),
            Some(Introspection::Builtin(Builtin::Topics))
        );
        assert_eq!(classify("rosapi/Nodes"), Some(Introspection::Unimplemented));
        assert_eq!(classify("std_srvs/srv/Trigger"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn test_parameter_name() {
        assert_eq!(parameter_name("node:use_sim_time"), "node.use_sim_time");
        assert_eq!(parameter_name("a:b:c"), "a.b:c");
        assert_eq!(parameter_name("plain"), "plain");
    }

    #[test]
    fn test_parse_param_value() {
        assert_eq!(parse_param_value(&json!("3")), json!(3));
        assert_eq!(parse_param_value(&json!("[1, 2]")), json!([1, 2]));
        assert_eq!(parse_param_value(&json!("hello")), json!("hello"));
        assert_eq!(parse_param_value(&json!(false)), json!(false));
    }

    #[test]
    fn test_call_args() {
        let definition = msgdef::parse("pkg/Add_Request", "int32 a\nint32 b", Dialect::Ros2).unwrap();
        assert_eq!(call_args(&definition, &json!([1, 2])), json!({"a": 1, "b": 2}));
        assert_eq!(call_args(&definition, &json!([1])), json!({"a": 1}));
        assert_eq!(call_args(&definition, &json!({"b": 4})), json!({"b": 4}));
        assert!(call_args(&definition, &Value::Null).is_null());
    }
}
