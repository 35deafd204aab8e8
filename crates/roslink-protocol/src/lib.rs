//! # roslink-protocol
//!
//! Wire protocol definitions for the Foxglove WebSocket protocol, as spoken
//! by a roslink client.
//!
//! The protocol mixes two kinds of WebSocket messages:
//!
//! - **Text** messages carry JSON objects tagged by an `op` field
//!   ([`ServerMessage`], [`ClientMessage`]).
//! - **Binary** messages start with a one-byte opcode followed by
//!   little-endian fields ([`ServerBinary`], [`ClientBinary`]).
//!
//! ## Example
//!
//! ```rust
//! use roslink_protocol::{codec, ClientBinary};
//!
//! let frame = ClientBinary::MessageData {
//!     channel_id: 3,
//!     payload: b"\x00\x01\x00\x00".to_vec().into(),
//! };
//!
//! let encoded = codec::encode_client_binary(&frame);
//! assert_eq!(encoded[0], 0x01);
//! ```

pub mod codec;
pub mod frames;
pub mod version;

pub use codec::ProtocolError;
pub use frames::{
    AdvertisedService, Channel, ClientBinary, ClientChannel, ClientMessage, ConnectionGraphUpdate,
    Parameter, ServerBinary, ServerMessage, Service, ServiceSchema, StatusLevel, Subscription,
};
pub use version::{Version, SUBPROTOCOL};
