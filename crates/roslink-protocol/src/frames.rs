//! Frame types for the Foxglove WebSocket protocol.
//!
//! JSON messages are modelled as serde enums tagged by `op`. Binary messages
//! are plain enums encoded by [`crate::codec`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opcodes of binary messages sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerOpcode {
    MessageData = 0x01,
    Time = 0x02,
    ServiceCallResponse = 0x03,
}

impl From<ServerOpcode> for u8 {
    fn from(op: ServerOpcode) -> u8 {
        op as u8
    }
}

impl TryFrom<u8> for ServerOpcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(ServerOpcode::MessageData),
            0x02 => Ok(ServerOpcode::Time),
            0x03 => Ok(ServerOpcode::ServiceCallResponse),
            other => Err(other),
        }
    }
}

/// Opcodes of binary messages sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientOpcode {
    MessageData = 0x01,
    ServiceCallRequest = 0x02,
}

impl From<ClientOpcode> for u8 {
    fn from(op: ClientOpcode) -> u8 {
        op as u8
    }
}

/// Severity of a server `status` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum StatusLevel {
    Info = 0,
    Warning = 1,
    Error = 2,
}

impl From<StatusLevel> for u8 {
    fn from(level: StatusLevel) -> u8 {
        level as u8
    }
}

impl TryFrom<u8> for StatusLevel {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0 => Ok(StatusLevel::Info),
            1 => Ok(StatusLevel::Warning),
            2 => Ok(StatusLevel::Error),
            _ => Err("Invalid status level"),
        }
    }
}

/// A channel advertised by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: u32,
    pub topic: String,
    /// Message encoding, e.g. `cdr` or `ros1`.
    pub encoding: String,
    pub schema_name: String,
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_encoding: Option<String>,
}

/// Request or response schema of an advertised service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSchema {
    pub encoding: String,
    pub schema_name: String,
    pub schema_encoding: String,
    pub schema: String,
}

/// A service advertised by the server.
///
/// Older servers send `requestSchema`/`responseSchema` strings instead of the
/// `request`/`response` objects; both shapes are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ServiceSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ServiceSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<String>,
}

/// A parameter name/value pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,
}

/// A service entry of a connection graph update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisedService {
    pub name: String,
    #[serde(default)]
    pub provider_ids: Vec<String>,
}

/// A topic entry of a connection graph update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphTopic {
    pub name: String,
    #[serde(default, alias = "subscriberIds")]
    pub publisher_ids: Vec<String>,
}

/// Contents of a `connectionGraphUpdate` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionGraphUpdate {
    #[serde(default)]
    pub published_topics: Vec<GraphTopic>,
    #[serde(default)]
    pub subscribed_topics: Vec<GraphTopic>,
    #[serde(default)]
    pub advertised_services: Vec<AdvertisedService>,
    #[serde(default)]
    pub removed_topics: Vec<String>,
    #[serde(default)]
    pub removed_services: Vec<String>,
}

/// JSON messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    ServerInfo {
        name: String,
        #[serde(default)]
        capabilities: Vec<String>,
        #[serde(default)]
        supported_encodings: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    Status {
        level: StatusLevel,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    RemoveStatus { status_ids: Vec<String> },

    Advertise { channels: Vec<Channel> },

    #[serde(rename_all = "camelCase")]
    Unadvertise { channel_ids: Vec<u32> },

    AdvertiseServices { services: Vec<Service> },

    #[serde(rename_all = "camelCase")]
    UnadvertiseServices { service_ids: Vec<u32> },

    ParameterValues {
        parameters: Vec<Parameter>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    ConnectionGraphUpdate(ConnectionGraphUpdate),

    #[serde(rename_all = "camelCase")]
    ServiceCallFailure {
        service_id: u32,
        call_id: u32,
        message: String,
    },
}

/// One entry of a client `subscribe` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: u32,
    pub channel_id: u32,
}

/// A channel advertised by the client for publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientChannel {
    pub id: u32,
    pub topic: String,
    pub encoding: String,
    pub schema_name: String,
}

/// JSON messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ClientMessage {
    Subscribe {
        subscriptions: Vec<Subscription>,
    },

    #[serde(rename_all = "camelCase")]
    Unsubscribe {
        subscription_ids: Vec<u32>,
    },

    Advertise {
        channels: Vec<ClientChannel>,
    },

    #[serde(rename_all = "camelCase")]
    Unadvertise {
        channel_ids: Vec<u32>,
    },

    #[serde(rename_all = "camelCase")]
    GetParameters {
        parameter_names: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    SetParameters {
        parameters: Vec<Parameter>,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    SubscribeConnectionGraph,

    UnsubscribeConnectionGraph,
}

/// Binary messages sent by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerBinary {
    MessageData {
        subscription_id: u32,
        /// Receive timestamp in nanoseconds.
        timestamp: u64,
        payload: Bytes,
    },
    Time {
        timestamp: u64,
    },
    ServiceCallResponse {
        service_id: u32,
        call_id: u32,
        encoding: String,
        payload: Bytes,
    },
}

/// Binary messages sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientBinary {
    MessageData {
        channel_id: u32,
        payload: Bytes,
    },
    ServiceCallRequest {
        service_id: u32,
        call_id: u32,
        encoding: String,
        payload: Bytes,
    },
}

impl ClientBinary {
    /// Get the opcode of this message.
    #[must_use]
    pub fn opcode(&self) -> ClientOpcode {
        match self {
            ClientBinary::MessageData { .. } => ClientOpcode::MessageData,
            ClientBinary::ServiceCallRequest { .. } => ClientOpcode::ServiceCallRequest,
        }
    }
}

impl ServerBinary {
    /// Get the opcode of this message.
    #[must_use]
    pub fn opcode(&self) -> ServerOpcode {
        match self {
            ServerBinary::MessageData { .. } => ServerOpcode::MessageData,
            ServerBinary::Time { .. } => ServerOpcode::Time,
            ServerBinary::ServiceCallResponse { .. } => ServerOpcode::ServiceCallResponse,
        }
    }
}
