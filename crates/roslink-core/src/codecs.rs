//! Lazily compiled message codecs, memoized by schema name.

use bytes::Bytes;
use dashmap::DashMap;
use roslink_protocol::Channel;
use roslink_schema::{idl, msgdef, Dialect, MessageCodec, MessageDefinition, SchemaError, WireFormat};
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::directory::{SchemaText, Service};

/// Codec compilation errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The descriptor carries no schema text for the requested direction.
    #[error("Schema missing for {0}")]
    SchemaMissing(String),

    /// The schema text could not be parsed.
    #[error("Invalid schema: {0}")]
    Schema(#[from] SchemaError),
}

/// ROS generation spoken by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    /// ROS 1 serialization.
    Ros1,
    /// CDR.
    Ros2,
}

impl Generation {
    /// Infer the generation from the server's supported encodings.
    #[must_use]
    pub fn from_encodings(encodings: &[String]) -> Option<Self> {
        if encodings.iter().any(|e| e == "cdr") {
            Some(Generation::Ros2)
        } else if encodings.iter().any(|e| e == "ros1") {
            Some(Generation::Ros1)
        } else {
            None
        }
    }

    #[must_use]
    pub fn wire_format(self) -> WireFormat {
        match self {
            Generation::Ros1 => WireFormat::Ros1,
            Generation::Ros2 => WireFormat::Cdr,
        }
    }

    #[must_use]
    pub fn dialect(self) -> Dialect {
        match self {
            Generation::Ros1 => Dialect::Ros1,
            Generation::Ros2 => Dialect::Ros2,
        }
    }

    /// Message encoding tag used on the wire (`ros1` or `cdr`).
    #[must_use]
    pub fn message_encoding(self) -> &'static str {
        self.wire_format().encoding()
    }

    fn from_u8(value: u8) -> Self {
        if value == 1 {
            Generation::Ros1
        } else {
            Generation::Ros2
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Generation::Ros1 => 1,
            Generation::Ros2 => 2,
        }
    }
}

/// Something a codec can be compiled for.
#[derive(Debug, Clone, Copy)]
pub enum Descriptor<'a> {
    /// A channel; its schema serves both directions.
    Channel(&'a Channel),
    /// A service; requests are written and responses are read.
    Service(&'a Service),
}

impl Descriptor<'_> {
    /// The name codecs are memoized under.
    #[must_use]
    pub fn schema_name(&self) -> &str {
        match self {
            Descriptor::Channel(channel) => &channel.schema_name,
            Descriptor::Service(service) => &service.service_type,
        }
    }

    fn reader_schema(&self) -> Option<(&str, Option<&str>)> {
        match self {
            Descriptor::Channel(channel) => Some(channel_schema(channel)),
            Descriptor::Service(service) => service.response.as_ref().map(schema_text),
        }
    }

    fn writer_schema(&self) -> Option<(&str, Option<&str>)> {
        match self {
            Descriptor::Channel(channel) => Some(channel_schema(channel)),
            Descriptor::Service(service) => service.request.as_ref().map(schema_text),
        }
    }
}

fn channel_schema(channel: &Channel) -> (&str, Option<&str>) {
    (&channel.schema, channel.schema_encoding.as_deref())
}

fn schema_text(schema: &SchemaText) -> (&str, Option<&str>) {
    (&schema.text, schema.encoding.as_deref())
}

/// Compiled decoder: bytes to structured value.
#[derive(Clone)]
pub struct Reader(Arc<MessageCodec>);

impl Reader {
    /// Decode a payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match the schema.
    pub fn read(&self, data: &[u8]) -> Result<Value, SchemaError> {
        self.0.decode(data)
    }

    /// Whether both readers share one compiled codec.
    #[must_use]
    pub fn ptr_eq(&self, other: &Reader) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Compiled encoder: structured value to bytes.
#[derive(Clone)]
pub struct Writer(Arc<MessageCodec>);

impl Writer {
    /// Encode a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not fit the schema.
    pub fn write(&self, value: &Value) -> Result<Bytes, SchemaError> {
        self.0.encode(value)
    }

    /// The definition this writer encodes.
    #[must_use]
    pub fn definition(&self) -> &MessageDefinition {
        self.0.definition()
    }

    /// Whether both writers share one compiled codec.
    #[must_use]
    pub fn ptr_eq(&self, other: &Writer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Memoized readers and writers for one session.
///
/// Codecs are compiled on first use and never evicted.
pub struct CodecCache {
    generation: AtomicU8,
    readers: DashMap<String, Reader>,
    writers: DashMap<String, Writer>,
}

impl CodecCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(generation: Generation) -> Self {
        Self {
            generation: AtomicU8::new(generation.as_u8()),
            readers: DashMap::new(),
            writers: DashMap::new(),
        }
    }

    /// Generation used for codecs compiled from now on.
    #[must_use]
    pub fn generation(&self) -> Generation {
        Generation::from_u8(self.generation.load(Ordering::Relaxed))
    }

    pub fn set_generation(&self, generation: Generation) {
        self.generation.store(generation.as_u8(), Ordering::Relaxed);
    }

    /// Get or compile the reader for a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaMissing`] if there is no schema text to
    /// compile, or a parse error.
    pub fn reader(&self, descriptor: Descriptor<'_>) -> Result<Reader, CodecError> {
        let name = descriptor.schema_name();
        if let Some(reader) = self.readers.get(name) {
            return Ok(reader.clone());
        }

        let codec = self.compile(name, descriptor.reader_schema())?;
        let reader = self
            .readers
            .entry(name.to_string())
            .or_insert_with(|| Reader(Arc::new(codec)));
        Ok(reader.clone())
    }

    /// Get or compile the writer for a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaMissing`] if there is no schema text to
    /// compile, or a parse error.
    pub fn writer(&self, descriptor: Descriptor<'_>) -> Result<Writer, CodecError> {
        let name = descriptor.schema_name();
        if let Some(writer) = self.writers.get(name) {
            return Ok(writer.clone());
        }

        let codec = self.compile(name, descriptor.writer_schema())?;
        let writer = self
            .writers
            .entry(name.to_string())
            .or_insert_with(|| Writer(Arc::new(codec)));
        Ok(writer.clone())
    }

    /// Number of compiled readers and writers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.readers.len() + self.writers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn compile(
        &self,
        name: &str,
        schema: Option<(&str, Option<&str>)>,
    ) -> Result<MessageCodec, CodecError> {
        let Some((text, encoding)) = schema.filter(|(text, _)| !text.trim().is_empty()) else {
            return Err(CodecError::SchemaMissing(name.to_string()));
        };

        let generation = self.generation();
        let definition = match encoding {
            Some("ros2idl") => idl::parse(name, text)?,
            _ => msgdef::parse(name, text, generation.dialect())?,
        };
        debug!(schema = %name, ?generation, types = definition.len(), "Compiled codec");

        Ok(MessageCodec::new(definition, generation.wire_format()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::tests::{channel, service};
    use serde_json::json;

    #[test]
    fn test_generation_from_encodings() {
        let encodings = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(Generation::from_encodings(&encodings(&["json", "cdr"])), Some(Generation::Ros2));
        assert_eq!(Generation::from_encodings(&encodings(&["ros1"])), Some(Generation::Ros1));
        assert_eq!(Generation::from_encodings(&encodings(&["json"])), None);
        assert_eq!(Generation::Ros1.message_encoding(), "ros1");
        assert_eq!(Generation::Ros2.message_encoding(), "cdr");
    }

    #[test]
    fn test_reader_and_writer_are_memoized() {
        let cache = CodecCache::new(Generation::Ros2);
        let channel = channel(1, "/a", "pkg/A");

        let first = cache.reader(Descriptor::Channel(&channel)).unwrap();
        let second = cache.reader(Descriptor::Channel(&channel)).unwrap();
        assert!(first.ptr_eq(&second));

        let writer = cache.writer(Descriptor::Channel(&channel)).unwrap();
        assert!(writer.ptr_eq(&cache.writer(Descriptor::Channel(&channel)).unwrap()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_same_schema_name_shares_codec() {
        let cache = CodecCache::new(Generation::Ros2);
        let a = channel(1, "/a", "pkg/A");
        let b = channel(2, "/b", "pkg/A");

        let first = cache.reader(Descriptor::Channel(&a)).unwrap();
        let second = cache.reader(Descriptor::Channel(&b)).unwrap();
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn test_schema_missing_is_not_cached() {
        let cache = CodecCache::new(Generation::Ros2);
        let mut empty = channel(1, "/a", "pkg/A");
        empty.schema = String::new();

        assert!(matches!(
            cache.reader(Descriptor::Channel(&empty)),
            Err(CodecError::SchemaMissing(name)) if name == "pkg/A"
        ));
        assert!(cache.is_empty());

        let mut no_response = service(1, "/add", "pkg/Add");
        no_response.response = None;
        assert!(matches!(
            cache.reader(Descriptor::Service(&no_response)),
            Err(CodecError::SchemaMissing(_))
        ));
        assert!(cache.writer(Descriptor::Service(&no_response)).is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_service_directions() {
        let cache = CodecCache::new(Generation::Ros2);
        let service = service(1, "/add", "pkg/Add");

        let writer = cache.writer(Descriptor::Service(&service)).unwrap();
        let reader = cache.reader(Descriptor::Service(&service)).unwrap();

        let request = writer.write(&json!({"a": 3})).unwrap();
        assert_eq!(writer.definition().root().fields[0].name, "a");

        let response = reader.read(&request).unwrap();
        assert_eq!(response, json!({"sum": 3}));
    }

    #[test]
    fn test_generation_selects_wire_format() {
        let cache = CodecCache::new(Generation::Ros1);
        let mut channel = channel(1, "/a", "pkg/A");
        channel.schema_encoding = Some("ros1msg".to_string());

        let writer = cache.writer(Descriptor::Channel(&channel)).unwrap();
        // ROS 1 serialization has no encapsulation header.
        assert_eq!(&writer.write(&json!({"x": 1})).unwrap()[..], &1i32.to_le_bytes());

        cache.set_generation(Generation::Ros2);
        assert_eq!(cache.generation(), Generation::Ros2);
    }

    #[test]
    fn test_idl_schema() {
        let cache = CodecCache::new(Generation::Ros2);
        let mut channel = channel(1, "/a", "pkg/msg/A");
        channel.schema_encoding = Some("ros2idl".to_string());
        channel.schema = "module pkg { module msg { struct A { int32 x; }; }; };".to_string();

        let writer = cache.writer(Descriptor::Channel(&channel)).unwrap();
        let bytes = writer.write(&json!({"x": 2})).unwrap();
        let reader = cache.reader(Descriptor::Channel(&channel)).unwrap();
        assert_eq!(reader.read(&bytes).unwrap(), json!({"x": 2}));
    }
}
