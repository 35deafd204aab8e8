//! Transport abstraction traits for roslink.
//!
//! A transport client is the outbound half of a Foxglove connection: command
//! methods queue frames for the socket, and everything the server says comes
//! back as a stream of [`TransportEvent`]s.

use async_trait::async_trait;
use bytes::Bytes;
use roslink_protocol::{Channel, ConnectionGraphUpdate, Parameter, Service, StatusLevel};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Stream of events produced by a connected transport.
pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    /// Close caused by the connection dropping without a close frame.
    #[must_use]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: 1006,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

/// Events emitted by a transport, in arrival order.
///
/// `Open` is always the first event and `Close` the last.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    ServerInfo {
        name: String,
        capabilities: Vec<String>,
        supported_encodings: Vec<String>,
    },
    Status {
        level: StatusLevel,
        message: String,
    },
    Advertise(Vec<Channel>),
    Unadvertise(Vec<u32>),
    AdvertiseServices(Vec<Service>),
    UnadvertiseServices(Vec<u32>),
    Message {
        subscription_id: u32,
        timestamp: u64,
        data: Bytes,
    },
    ServiceCallResponse {
        service_id: u32,
        call_id: u32,
        encoding: String,
        data: Bytes,
    },
    ServiceCallFailure {
        service_id: u32,
        call_id: u32,
        message: String,
    },
    ParameterValues {
        id: Option<String>,
        parameters: Vec<Parameter>,
    },
    ConnectionGraphUpdate(ConnectionGraphUpdate),
    Close(CloseInfo),
    Error(String),
}

/// An outbound service call.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCallRequest {
    pub service_id: u32,
    pub call_id: u32,
    pub encoding: String,
    pub data: Bytes,
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection timed out.
    #[error("Connection timed out")]
    Timeout,

    /// Opening handshake failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] roslink_protocol::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Command side of a connected transport.
///
/// Commands never block: they are queued and written by the transport in
/// call order. Identifiers for client channels and subscriptions are
/// assigned by the client.
pub trait TransportClient: Send + Sync {
    /// Advertise a client channel, returning its id.
    fn advertise(&self, topic: &str, encoding: &str, schema_name: &str)
        -> Result<u32, TransportError>;

    /// Withdraw a client channel.
    fn unadvertise(&self, channel_id: u32) -> Result<(), TransportError>;

    /// Publish an encoded message on a client channel.
    fn send_message(&self, channel_id: u32, data: Bytes) -> Result<(), TransportError>;

    /// Subscribe to a server channel, returning the subscription id.
    fn subscribe(&self, channel_id: u32) -> Result<u32, TransportError>;

    /// Cancel a subscription.
    fn unsubscribe(&self, subscription_id: u32) -> Result<(), TransportError>;

    /// Send a service call request.
    fn send_service_call_request(&self, request: ServiceCallRequest) -> Result<(), TransportError>;

    /// Request parameter values.
    fn get_parameters(&self, names: Vec<String>, id: Option<String>) -> Result<(), TransportError>;

    /// Set parameter values.
    fn set_parameters(
        &self,
        parameters: Vec<Parameter>,
        id: Option<String>,
    ) -> Result<(), TransportError>;

    /// Start receiving connection graph updates.
    fn subscribe_connection_graph(&self) -> Result<(), TransportError>;

    /// Stop receiving connection graph updates.
    fn unsubscribe_connection_graph(&self) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    fn close(&self) -> Result<(), TransportError>;

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}

/// Something that can open transport connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `url`.
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn TransportClient>, EventStream), TransportError>;

    /// Get the transport name (e.g., "websocket").
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_info_display() {
        let info = CloseInfo {
            code: 1000,
            reason: String::new(),
        };
        assert_eq!(info.to_string(), "1000");
        assert_eq!(CloseInfo::abnormal("reset").to_string(), "1006 (reset)");
    }

    #[test]
    fn test_error_from_protocol() {
        let err: TransportError = roslink_protocol::ProtocolError::Empty.into();
        assert!(matches!(err, TransportError::Protocol(_)));
    }
}
