//! # roslink-schema
//!
//! Runtime ROS message schemas for roslink.
//!
//! Schemas arrive as text over the wire and are only known at runtime. This
//! crate turns that text into a structural [`MessageDefinition`] and compiles
//! it, together with a [`WireFormat`], into a [`MessageCodec`] that converts
//! between binary payloads and `serde_json::Value`s.
//!
//! ```text
//! schema text ──▶ msgdef / idl parser ──▶ MessageDefinition
//!                                              │
//!                                   WireFormat │ (ros1 | cdr)
//!                                              ▼
//!                         bytes ◀──▶ MessageCodec ◀──▶ serde_json::Value
//! ```
//!
//! ## Example
//!
//! ```rust
//! use roslink_schema::{msgdef, Dialect, MessageCodec, WireFormat};
//! use serde_json::json;
//!
//! let definition = msgdef::parse("pkg/Point", "float64 x\nfloat64 y", Dialect::Ros2).unwrap();
//! let codec = MessageCodec::new(definition, WireFormat::Cdr);
//!
//! let bytes = codec.encode(&json!({"x": 1.0, "y": 2.0})).unwrap();
//! assert_eq!(codec.decode(&bytes).unwrap(), json!({"x": 1.0, "y": 2.0}));
//! ```

pub mod codec;
pub mod definition;
pub mod error;
pub mod idl;
pub mod msgdef;

pub use codec::{MessageCodec, WireFormat};
pub use definition::{ArrayKind, Field, FieldType, MessageDefinition, MessageSpec, Primitive};
pub use error::SchemaError;
pub use msgdef::Dialect;
