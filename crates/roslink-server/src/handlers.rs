//! Connection handlers for the roslink server.
//!
//! Every accepted WebSocket gets its own upstream [`Session`]. Text frames
//! from the client are rosbridge verbs; session events are written back as
//! rosbridge JSON.

use crate::config::Config;
use crate::metrics::{self, SessionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use roslink_core::{BridgeEvent, Session, SessionConfig};
use roslink_transport::WebSocketConnector;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Settings every session starts with.
    pub session_config: SessionConfig,
    /// Upstream connector.
    pub connector: WebSocketConnector,
    active: AtomicUsize,
    next_connection: AtomicU64,
}

impl AppState {
    /// Create new app state.
    ///
    /// # Errors
    ///
    /// Returns an error if the session settings are invalid.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            session_config: config.session_config()?,
            connector: WebSocketConnector::new(config.websocket_config()),
            config,
            active: AtomicUsize::new(0),
            next_connection: AtomicU64::new(1),
        })
    }

    /// Claim a session slot, if one is free.
    fn acquire(self: &Arc<Self>) -> Option<SessionSlot> {
        let limit = self.config.limits.max_sessions;
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
            .ok()
            .map(|_| SessionSlot(Arc::clone(self)))
    }
}

/// Releases a session slot on drop.
struct SessionSlot(Arc<AppState>);

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone())?);

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = Router::new()
        .route(&config.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("roslink listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, config.websocket_path);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "upstream": state.config.upstream.url,
        "sessions": state.active.load(Ordering::Relaxed),
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let Some(slot) = state.acquire() else {
        warn!(limit = state.config.limits.max_sessions, "Session limit reached");
        metrics::record_error("session_limit");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    ws.on_upgrade(move |socket| handle_websocket(socket, state, slot))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, _slot: SessionSlot) {
    let _metrics_guard = SessionMetricsGuard::new();
    let connection = state.next_connection.fetch_add(1, Ordering::Relaxed);
    debug!(connection, "Client connected");

    let (mut sender, mut receiver) = socket.split();
    let (sink, mut events) = mpsc::unbounded_channel::<BridgeEvent>();

    let session = match Session::connect_with(
        &state.connector,
        &state.config.upstream.url,
        state.session_config.clone(),
        Arc::new(sink),
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            warn!(connection, error = %e, "Upstream connection failed");
            metrics::record_error("upstream");
            let reply = status("error", format!("upstream unavailable: {e}"), None);
            let _ = send_json(&mut sender, &reply).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            biased;

            Some(event) = events.recv() => {
                let closing = matches!(event, BridgeEvent::Close(_));
                record_event(&event);
                if send_json(&mut sender, &event_message(&event)).await.is_err() {
                    break;
                }
                if closing {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_verb(&session, &text, state.config.limits.max_verb_size) {
                            if send_json(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(connection, len = data.len(), "Ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = session.close() {
        debug!(connection, error = %e, "Session close failed");
    }
    debug!(connection, stats = ?session.stats(), "Client disconnected");
}

/// Execute one client verb. Returns a status reply on failure.
fn handle_verb(session: &Session, text: &str, max_size: usize) -> Option<Value> {
    if text.len() > max_size {
        metrics::record_error("verb_too_large");
        return Some(status(
            "error",
            format!("message of {} bytes exceeds limit {max_size}", text.len()),
            None,
        ));
    }

    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            metrics::record_error("invalid_json");
            return Some(status("error", format!("invalid JSON: {e}"), None));
        }
    };

    let op = value.get("op").and_then(Value::as_str).unwrap_or("").to_string();
    let id = value.get("id").cloned();
    metrics::record_verb(&op);

    match session.send_json(value) {
        Ok(()) => None,
        Err(e) => {
            debug!(op = %op, error = %e, "Verb failed");
            metrics::record_error("verb");
            Some(status("error", format!("{op}: {e}"), id.as_ref()))
        }
    }
}

fn record_event(event: &BridgeEvent) {
    match event {
        BridgeEvent::Message { .. } => metrics::record_message(),
        BridgeEvent::ServiceResponse { result, .. } => metrics::record_service_response(*result),
        BridgeEvent::Error(_) => metrics::record_error("upstream"),
        BridgeEvent::Connection | BridgeEvent::Close(_) => {}
    }
}

/// Render a session event as a rosbridge message.
fn event_message(event: &BridgeEvent) -> Value {
    match event {
        BridgeEvent::Message { topic, msg } => json!({
            "op": "publish",
            "topic": topic,
            "msg": msg,
        }),
        BridgeEvent::ServiceResponse {
            id,
            service,
            values,
            result,
        } => {
            let mut reply = Map::new();
            reply.insert("op".to_string(), json!("service_response"));
            if let Some(id) = id {
                reply.insert("id".to_string(), json!(id));
            }
            reply.insert("service".to_string(), json!(service));
            if let Some(values) = values {
                reply.insert("values".to_string(), values.clone());
            }
            reply.insert("result".to_string(), json!(result));
            Value::Object(reply)
        }
        BridgeEvent::Connection => status("info", "connected to upstream", None),
        BridgeEvent::Close(info) => status("warning", format!("upstream closed: {info}"), None),
        BridgeEvent::Error(message) => status("error", format!("upstream error: {message}"), None),
    }
}

fn status(level: &str, msg: impl Into<String>, id: Option<&Value>) -> Value {
    let mut reply = json!({
        "op": "status",
        "level": level,
        "msg": msg.into(),
    });
    if let (Some(id), Value::Object(fields)) = (id, &mut reply) {
        fields.insert("id".to_string(), id.clone());
    }
    reply
}

async fn send_json(sender: &mut SplitSink<WebSocket, Message>, value: &Value) -> Result<()> {
    sender.send(Message::Text(value.to_string())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roslink_transport::CloseInfo;

    #[test]
    fn test_publish_message() {
        let event = BridgeEvent::Message {
            topic: "/chatter".to_string(),
            msg: json!({"data": "hi"}),
        };
        assert_eq!(
            event_message(&event),
            json!({"op": "publish", "topic": "/chatter", "msg": {"data": "hi"}})
        );
    }

    #[test]
    fn test_service_response_message() {
        let event = BridgeEvent::ServiceResponse {
            id: Some("call:1".to_string()),
            service: "/add".to_string(),
            values: Some(json!({"sum": 3})),
            result: true,
        };
        assert_eq!(
            event_message(&event),
            json!({
                "op": "service_response",
                "id": "call:1",
                "service": "/add",
                "values": {"sum": 3},
                "result": true
            })
        );

        let bare = BridgeEvent::ServiceResponse {
            id: None,
            service: "/set".to_string(),
            values: None,
            result: true,
        };
        let reply = event_message(&bare);
        assert!(reply.get("id").is_none());
        assert!(reply.get("values").is_none());
    }

    #[test]
    fn test_lifecycle_messages() {
        let close = BridgeEvent::Close(CloseInfo {
            code: 1001,
            reason: "going away".to_string(),
        });
        let reply = event_message(&close);
        assert_eq!(reply["op"], "status");
        assert_eq!(reply["level"], "warning");

        assert_eq!(event_message(&BridgeEvent::Connection)["level"], "info");
        assert_eq!(
            event_message(&BridgeEvent::Error("reset".to_string()))["msg"],
            "upstream error: reset"
        );
    }

    #[test]
    fn test_status_echoes_id() {
        let reply = status("error", "bad", Some(&json!("req-7")));
        assert_eq!(reply["id"], "req-7");
        assert!(status("info", "ok", None).get("id").is_none());
    }
}
