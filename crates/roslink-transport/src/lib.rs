//! # roslink-transport
//!
//! Client transport layer for roslink.
//!
//! A transport connects to a Foxglove WebSocket server and exposes two
//! halves:
//!
//! - a [`TransportClient`] with non-blocking command methods
//!   (advertise, subscribe, service calls, parameters, ...)
//! - an [`EventStream`] of [`TransportEvent`]s decoded from the socket
//!
//! ```rust,ignore
//! use roslink_transport::{Connector, TransportEvent, WebSocketConnector};
//!
//! let (client, mut events) = WebSocketConnector::default()
//!     .connect("ws://localhost:8765")
//!     .await?;
//! while let Some(event) = events.recv().await {
//!     if let TransportEvent::Advertise(channels) = event {
//!         // ...
//!     }
//! }
//! ```

pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{
    CloseInfo, Connector, EventStream, ServiceCallRequest, TransportClient, TransportError,
    TransportEvent,
};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketClient, WebSocketConfig, WebSocketConnector};
