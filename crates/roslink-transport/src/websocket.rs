//! WebSocket transport implementation.
//!
//! This module provides a Foxglove WebSocket client using tokio-tungstenite.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use roslink_protocol::codec::{self, MAX_MESSAGE_SIZE};
use roslink_protocol::{
    ClientBinary, ClientChannel, ClientMessage, Parameter, ServerBinary, ServerMessage,
    Subscription, Version, SUBPROTOCOL,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig as WsConfig};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use crate::traits::{
    CloseInfo, Connector, EventStream, ServiceCallRequest, TransportClient, TransportError,
    TransportEvent,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum message size in bytes.
    pub max_message_size: usize,
    /// Time allowed for the TCP connect and opening handshake.
    pub connect_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Opens Foxglove WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    /// Create a connector with the given config.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn TransportClient>, EventStream), TransportError> {
        let (client, events) = WebSocketClient::connect(url, &self.config).await?;
        Ok((Arc::new(client), events))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A connected Foxglove WebSocket client.
pub struct WebSocketClient {
    outbound: mpsc::UnboundedSender<Message>,
    is_open: Arc<AtomicBool>,
    next_channel_id: AtomicU32,
    next_subscription_id: AtomicU32,
}

impl WebSocketClient {
    /// Connect to a Foxglove WebSocket server.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails or times out.
    pub async fn connect(
        url: &str,
        config: &WebSocketConfig,
    ) -> Result<(Self, EventStream), TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

        let mut ws_config = WsConfig::default();
        ws_config.max_message_size = Some(config.max_message_size);

        let (stream, response) = tokio::time::timeout(
            config.connect_timeout,
            connect_async_with_config(request, Some(ws_config), true),
        )
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| {
            error!("WebSocket handshake with {} failed: {}", url, e);
            TransportError::Handshake(e.to_string())
        })?;

        match response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .and_then(Version::from_subprotocol)
        {
            Some(version) => debug!("Negotiated protocol {}", version),
            None => warn!("Server at {} did not confirm {}", url, SUBPROTOCOL),
        }
        info!("Connected to {}", url);

        let (sink, stream) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let is_open = Arc::new(AtomicBool::new(true));

        let _ = events_tx.send(TransportEvent::Open);
        tokio::spawn(write_loop(sink, outbound_rx));
        tokio::spawn(read_loop(
            stream,
            events_tx,
            outbound_tx.clone(),
            Arc::clone(&is_open),
        ));

        Ok((Self::new(outbound_tx, is_open), events_rx))
    }

    fn new(outbound: mpsc::UnboundedSender<Message>, is_open: Arc<AtomicBool>) -> Self {
        Self {
            outbound,
            is_open,
            next_channel_id: AtomicU32::new(1),
            next_subscription_id: AtomicU32::new(1),
        }
    }

    fn send(&self, message: Message) -> Result<(), TransportError> {
        if !self.is_open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound
            .send(message)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn send_json(&self, msg: &ClientMessage) -> Result<(), TransportError> {
        let text = codec::encode_client_json(msg)?;
        self.send(Message::Text(text))
    }

    fn send_binary(&self, msg: &ClientBinary) -> Result<(), TransportError> {
        let data = codec::encode_client_binary(msg);
        self.send(Message::Binary(data.to_vec()))
    }
}

impl TransportClient for WebSocketClient {
    fn advertise(
        &self,
        topic: &str,
        encoding: &str,
        schema_name: &str,
    ) -> Result<u32, TransportError> {
        let id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        self.send_json(&ClientMessage::Advertise {
            channels: vec![ClientChannel {
                id,
                topic: topic.to_string(),
                encoding: encoding.to_string(),
                schema_name: schema_name.to_string(),
            }],
        })?;
        Ok(id)
    }

    fn unadvertise(&self, channel_id: u32) -> Result<(), TransportError> {
        self.send_json(&ClientMessage::Unadvertise {
            channel_ids: vec![channel_id],
        })
    }

    fn send_message(&self, channel_id: u32, data: Bytes) -> Result<(), TransportError> {
        self.send_binary(&ClientBinary::MessageData {
            channel_id,
            payload: data,
        })
    }

    fn subscribe(&self, channel_id: u32) -> Result<u32, TransportError> {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        self.send_json(&ClientMessage::Subscribe {
            subscriptions: vec![Subscription { id, channel_id }],
        })?;
        Ok(id)
    }

    fn unsubscribe(&self, subscription_id: u32) -> Result<(), TransportError> {
        self.send_json(&ClientMessage::Unsubscribe {
            subscription_ids: vec![subscription_id],
        })
    }

    fn send_service_call_request(&self, request: ServiceCallRequest) -> Result<(), TransportError> {
        self.send_binary(&ClientBinary::ServiceCallRequest {
            service_id: request.service_id,
            call_id: request.call_id,
            encoding: request.encoding,
            payload: request.data,
        })
    }

    fn get_parameters(&self, names: Vec<String>, id: Option<String>) -> Result<(), TransportError> {
        self.send_json(&ClientMessage::GetParameters {
            parameter_names: names,
            id,
        })
    }

    fn set_parameters(
        &self,
        parameters: Vec<Parameter>,
        id: Option<String>,
    ) -> Result<(), TransportError> {
        self.send_json(&ClientMessage::SetParameters { parameters, id })
    }

    fn subscribe_connection_graph(&self) -> Result<(), TransportError> {
        self.send_json(&ClientMessage::SubscribeConnectionGraph)
    }

    fn unsubscribe_connection_graph(&self) -> Result<(), TransportError> {
        self.send_json(&ClientMessage::UnsubscribeConnectionGraph)
    }

    fn close(&self) -> Result<(), TransportError> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(()); // Already closed
        }
        self.outbound
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            })))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!("WebSocket write failed: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedSender<Message>,
    is_open: Arc<AtomicBool>,
) {
    let close = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match codec::decode_server_json(&text) {
                Ok(msg) => {
                    if let Some(event) = server_message_event(msg) {
                        let _ = events.send(event);
                    }
                }
                Err(e) => warn!("Ignoring server message: {}", e),
            },
            Some(Ok(Message::Binary(data))) => match codec::decode_server_binary(Bytes::from(data)) {
                Ok(msg) => {
                    if let Some(event) = server_binary_event(msg) {
                        let _ = events.send(event);
                    }
                }
                Err(e) => warn!("Ignoring binary server message: {}", e),
            },
            Some(Ok(Message::Ping(data))) => {
                // Respond to ping with pong
                let _ = outbound.send(Message::Pong(data));
            }
            Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                debug!("Received close frame");
                break frame.map_or_else(
                    || CloseInfo {
                        code: 1005,
                        reason: String::new(),
                    },
                    |f| CloseInfo {
                        code: f.code.into(),
                        reason: f.reason.to_string(),
                    },
                );
            }
            Some(Err(WsError::ConnectionClosed)) | None => {
                debug!("WebSocket stream ended");
                break CloseInfo::abnormal("connection ended");
            }
            Some(Err(e)) => {
                error!("WebSocket error: {}", e);
                let _ = events.send(TransportEvent::Error(e.to_string()));
                break CloseInfo::abnormal(e.to_string());
            }
        }
    };

    is_open.store(false, Ordering::SeqCst);
    let _ = events.send(TransportEvent::Close(close));
}

/// Translate a decoded JSON server message into a transport event.
fn server_message_event(msg: ServerMessage) -> Option<TransportEvent> {
    let event = match msg {
        ServerMessage::ServerInfo {
            name,
            capabilities,
            supported_encodings,
            ..
        } => TransportEvent::ServerInfo {
            name,
            capabilities,
            supported_encodings,
        },
        ServerMessage::Status { level, message, .. } => TransportEvent::Status { level, message },
        ServerMessage::RemoveStatus { .. } => return None,
        ServerMessage::Advertise { channels } => TransportEvent::Advertise(channels),
        ServerMessage::Unadvertise { channel_ids } => TransportEvent::Unadvertise(channel_ids),
        ServerMessage::AdvertiseServices { services } => TransportEvent::AdvertiseServices(services),
        ServerMessage::UnadvertiseServices { service_ids } => {
            TransportEvent::UnadvertiseServices(service_ids)
        }
        ServerMessage::ParameterValues { parameters, id } => {
            TransportEvent::ParameterValues { id, parameters }
        }
        ServerMessage::ConnectionGraphUpdate(update) => TransportEvent::ConnectionGraphUpdate(update),
        ServerMessage::ServiceCallFailure {
            service_id,
            call_id,
            message,
        } => TransportEvent::ServiceCallFailure {
            service_id,
            call_id,
            message,
        },
    };
    Some(event)
}

/// Translate a decoded binary server message into a transport event.
fn server_binary_event(msg: ServerBinary) -> Option<TransportEvent> {
    match msg {
        ServerBinary::MessageData {
            subscription_id,
            timestamp,
            payload,
        } => Some(TransportEvent::Message {
            subscription_id,
            timestamp,
            data: payload,
        }),
        ServerBinary::Time { timestamp } => {
            trace!(timestamp, "Server time");
            None
        }
        ServerBinary::ServiceCallResponse {
            service_id,
            call_id,
            encoding,
            payload,
        } => Some(TransportEvent::ServiceCallResponse {
            service_id,
            call_id,
            encoding,
            data: payload,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roslink_protocol::Channel;
    use serde_json::Value;

    fn client() -> (WebSocketClient, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WebSocketClient::new(tx, Arc::new(AtomicBool::new(true))), rx)
    }

    fn json(message: Message) -> Value {
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_websocket_config_default() {
        let config = WebSocketConfig::default();
        assert_eq!(config.max_message_size, MAX_MESSAGE_SIZE);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_advertise_assigns_increasing_ids() {
        let (client, mut rx) = client();
        assert_eq!(client.advertise("/a", "cdr", "pkg/A").unwrap(), 1);
        assert_eq!(client.advertise("/b", "cdr", "pkg/B").unwrap(), 2);

        let first = json(rx.try_recv().unwrap());
        assert_eq!(first["op"], "advertise");
        assert_eq!(first["channels"][0]["topic"], "/a");
        assert_eq!(first["channels"][0]["schemaName"], "pkg/A");
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let (client, mut rx) = client();
        let id = client.subscribe(42).unwrap();
        client.unsubscribe(id).unwrap();

        let sub = json(rx.try_recv().unwrap());
        assert_eq!(sub["subscriptions"][0]["channelId"], 42);
        let unsub = json(rx.try_recv().unwrap());
        assert_eq!(unsub["op"], "unsubscribe");
        assert_eq!(unsub["subscriptionIds"][0], id);
    }

    #[test]
    fn test_send_message_is_binary() {
        let (client, mut rx) = client();
        client.send_message(5, Bytes::from_static(b"abc")).unwrap();

        match rx.try_recv().unwrap() {
            Message::Binary(data) => {
                assert_eq!(data[0], 0x01);
                assert_eq!(&data[1..5], &5u32.to_le_bytes());
                assert_eq!(&data[5..], b"abc");
            }
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[test]
    fn test_closed_client_rejects_commands() {
        let (client, mut rx) = client();
        client.close().unwrap();
        assert!(!client.is_open());
        assert!(matches!(rx.try_recv().unwrap(), Message::Close(_)));

        assert!(matches!(
            client.subscribe_connection_graph(),
            Err(TransportError::ConnectionClosed)
        ));
        // Closing twice is fine
        client.close().unwrap();
    }

    #[test]
    fn test_server_message_events() {
        let channel = Channel {
            id: 1,
            topic: "/a".to_string(),
            encoding: "cdr".to_string(),
            schema_name: "pkg/A".to_string(),
            schema: "int32 x".to_string(),
            schema_encoding: Some("ros2msg".to_string()),
        };
        assert_eq!(
            server_message_event(ServerMessage::Advertise {
                channels: vec![channel.clone()]
            }),
            Some(TransportEvent::Advertise(vec![channel]))
        );
        assert_eq!(
            server_message_event(ServerMessage::RemoveStatus {
                status_ids: vec!["x".to_string()]
            }),
            None
        );
    }

    #[test]
    fn test_server_binary_events() {
        assert_eq!(server_binary_event(ServerBinary::Time { timestamp: 3 }), None);
        assert_eq!(
            server_binary_event(ServerBinary::MessageData {
                subscription_id: 2,
                timestamp: 9,
                payload: Bytes::from_static(b"x"),
            }),
            Some(TransportEvent::Message {
                subscription_id: 2,
                timestamp: 9,
                data: Bytes::from_static(b"x"),
            })
        );
    }
}
