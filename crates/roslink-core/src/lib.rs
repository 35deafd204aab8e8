//! # roslink-core
//!
//! Rosbridge-style pub/sub sessions over the Foxglove WebSocket protocol.
//!
//! This crate provides the session layer:
//!
//! - **Directory** - Live index of server channels and services
//! - **Codecs** - Schema compiler cache (ROS 1 serialization or CDR)
//! - **Verb** - The `advertise`/`publish`/`subscribe`/`call_service` surface
//! - **Correlator** - Matches responses to in-flight requests
//! - **Session** - Ties a transport to an event sink
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    Verb     │────▶│   Session   │────▶│  Transport  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                       │    ▲                   │
//!              ┌────────┘    │ dispatcher        │ events
//!              ▼             └───────────────────┘
//!       ┌─────────────┐     ┌─────────────┐
//!       │  Directory  │     │ Correlator  │
//!       └─────────────┘     └─────────────┘
//!              │
//!              ▼
//!       ┌─────────────┐     ┌─────────────┐
//!       │   Codecs    │     │  EventSink  │
//!       └─────────────┘     └─────────────┘
//! ```

pub mod codecs;
pub mod correlator;
pub mod directory;
pub mod event;
pub mod introspection;
pub mod session;
pub mod verb;

#[cfg(test)]
mod testing;

pub use codecs::{CodecCache, CodecError, Descriptor, Generation, Reader, Writer};
pub use correlator::{CorrelationKey, Correlator, Response};
pub use directory::{Directory, DirectoryStats, Lookup, SchemaText, Service};
pub use event::{BridgeEvent, EventSink};
pub use session::{Session, SessionConfig, SessionError, SessionStats};
pub use verb::Verb;
