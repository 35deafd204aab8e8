//! Binary codecs for ROS messages.
//!
//! Two wire formats are supported:
//!
//! - **ROS 1**: packed little-endian fields, `u32` length prefixes for
//!   strings and variable-length arrays, no padding.
//! - **CDR** (ROS 2): a 4-byte encapsulation header followed by fields at
//!   their natural alignment (relative to the end of the header). Strings
//!   carry a trailing NUL counted in their length prefix.
//!
//! Values are `serde_json::Value` objects keyed by field name. Fields missing
//! from a value being encoded take their default (zero, `false`, empty).

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::{Map, Number, Value};

use crate::definition::{ArrayKind, Field, FieldType, MessageDefinition, MessageSpec, Primitive};
use crate::error::SchemaError;

/// CDR little-endian encapsulation header.
const CDR_LE_HEADER: [u8; 4] = [0x00, 0x01, 0x00, 0x00];

/// Binary serialization format of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    Ros1,
    Cdr,
}

impl WireFormat {
    /// Message encoding name used on the wire.
    #[must_use]
    pub fn encoding(self) -> &'static str {
        match self {
            WireFormat::Ros1 => "ros1",
            WireFormat::Cdr => "cdr",
        }
    }

    /// Parse a wire encoding name.
    #[must_use]
    pub fn from_encoding(encoding: &str) -> Option<Self> {
        match encoding {
            "ros1" => Some(WireFormat::Ros1),
            "cdr" => Some(WireFormat::Cdr),
            _ => None,
        }
    }
}

/// A compiled reader/writer for one message type.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    definition: MessageDefinition,
    format: WireFormat,
}

impl MessageCodec {
    /// Compile a codec for a definition.
    #[must_use]
    pub fn new(definition: MessageDefinition, format: WireFormat) -> Self {
        Self { definition, format }
    }

    /// The message definition.
    #[must_use]
    pub fn definition(&self) -> &MessageDefinition {
        &self.definition
    }

    /// The wire format.
    #[must_use]
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Decode a payload into a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is truncated or malformed.
    pub fn decode(&self, data: &[u8]) -> Result<Value, SchemaError> {
        let mut reader = match self.format {
            WireFormat::Ros1 => Reader {
                data,
                pos: 0,
                aligned: false,
                little_endian: true,
            },
            WireFormat::Cdr => {
                if data.len() < 4 {
                    return Err(SchemaError::Truncated {
                        needed: 4,
                        offset: 0,
                    });
                }
                let little_endian = match u16::from_be_bytes([data[0], data[1]]) {
                    0x0000 => false,
                    0x0001 => true,
                    other => return Err(SchemaError::Encapsulation(other)),
                };
                Reader {
                    data: &data[4..],
                    pos: 0,
                    aligned: true,
                    little_endian,
                }
            }
        };
        reader.message(&self.definition, self.definition.root())
    }

    /// Encode a value into a payload.
    ///
    /// # Errors
    ///
    /// Returns an error if a field value does not match its type or bounds.
    pub fn encode(&self, value: &Value) -> Result<Bytes, SchemaError> {
        let mut writer = Writer {
            buf: BytesMut::with_capacity(64),
            origin: 0,
            aligned: false,
        };
        if self.format == WireFormat::Cdr {
            writer.buf.extend_from_slice(&CDR_LE_HEADER);
            writer.origin = CDR_LE_HEADER.len();
            writer.aligned = true;
        }
        writer.message(&self.definition, self.definition.root(), Some(value), "")?;
        Ok(writer.buf.freeze())
    }
}

fn child_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn lookup<'d>(definition: &'d MessageDefinition, name: &str) -> Result<&'d MessageSpec, SchemaError> {
    definition
        .get(name)
        .ok_or_else(|| SchemaError::UnknownType(name.to_string()))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    aligned: bool,
    little_endian: bool,
}

macro_rules! read_num {
    ($reader:expr, $ty:ty) => {{
        const SIZE: usize = std::mem::size_of::<$ty>();
        $reader.align(SIZE);
        let bytes: [u8; SIZE] = $reader.take(SIZE)?.try_into().map_err(|_| SchemaError::Truncated {
            needed: SIZE,
            offset: $reader.pos,
        })?;
        if $reader.little_endian {
            <$ty>::from_le_bytes(bytes)
        } else {
            <$ty>::from_be_bytes(bytes)
        }
    }};
}

impl<'a> Reader<'a> {
    fn align(&mut self, size: usize) {
        if self.aligned && size > 1 {
            let rem = self.pos % size;
            if rem != 0 {
                self.pos += size - rem;
            }
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SchemaError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(SchemaError::Truncated {
                needed: len,
                offset: self.pos,
            });
        };
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn message(&mut self, definition: &MessageDefinition, spec: &MessageSpec) -> Result<Value, SchemaError> {
        let mut object = Map::with_capacity(spec.fields.len());
        if spec.fields.is_empty() && self.aligned && self.pos < self.data.len() {
            // CDR represents empty structs with a single placeholder byte.
            self.take(1)?;
        }
        for field in &spec.fields {
            let value = self.field(definition, field)?;
            object.insert(field.name.clone(), value);
        }
        Ok(Value::Object(object))
    }

    fn field(&mut self, definition: &MessageDefinition, field: &Field) -> Result<Value, SchemaError> {
        let count = match field.array {
            None => return self.element(definition, field),
            Some(ArrayKind::Fixed(n)) => n,
            Some(ArrayKind::Unbounded | ArrayKind::Bounded(_)) => {
                let count = read_num!(self, u32) as usize;
                // Reject counts that cannot fit at one byte per element.
                let remaining = self.data.len().saturating_sub(self.pos);
                if count > remaining {
                    return Err(SchemaError::Truncated {
                        needed: count,
                        offset: self.pos,
                    });
                }
                count
            }
        };
        let mut items = Vec::with_capacity(count.min(self.data.len().saturating_sub(self.pos)));
        for _ in 0..count {
            items.push(self.element(definition, field)?);
        }
        Ok(Value::Array(items))
    }

    fn element(&mut self, definition: &MessageDefinition, field: &Field) -> Result<Value, SchemaError> {
        match &field.field_type {
            FieldType::Primitive(p) => self.primitive(*p, field),
            FieldType::Complex(name) => {
                let spec = lookup(definition, name)?;
                self.message(definition, spec)
            }
        }
    }

    fn primitive(&mut self, primitive: Primitive, field: &Field) -> Result<Value, SchemaError> {
        let value = match primitive {
            Primitive::Bool => Value::Bool(self.take(1)?[0] != 0),
            Primitive::Byte | Primitive::Char | Primitive::UInt8 => Value::from(self.take(1)?[0]),
            Primitive::Int8 => Value::from(self.take(1)?[0] as i8),
            Primitive::Int16 => Value::from(read_num!(self, i16)),
            Primitive::UInt16 => Value::from(read_num!(self, u16)),
            Primitive::Int32 => Value::from(read_num!(self, i32)),
            Primitive::UInt32 => Value::from(read_num!(self, u32)),
            Primitive::Int64 => Value::from(read_num!(self, i64)),
            Primitive::UInt64 => Value::from(read_num!(self, u64)),
            Primitive::Float32 => float(f64::from(read_num!(self, f32))),
            Primitive::Float64 => float(read_num!(self, f64)),
            Primitive::String => Value::String(self.string(field)?),
            Primitive::WString => return Err(SchemaError::Unsupported("wstring".to_string())),
            Primitive::Time => {
                let secs = read_num!(self, u32);
                let nsecs = read_num!(self, u32);
                serde_json::json!({"secs": secs, "nsecs": nsecs})
            }
            Primitive::Duration => {
                let secs = read_num!(self, i32);
                let nsecs = read_num!(self, i32);
                serde_json::json!({"secs": secs, "nsecs": nsecs})
            }
        };
        Ok(value)
    }

    fn string(&mut self, field: &Field) -> Result<String, SchemaError> {
        let len = read_num!(self, u32) as usize;
        let bytes = self.take(len)?;
        let text = if self.aligned {
            // CDR strings include their NUL terminator.
            bytes.strip_suffix(&[0]).unwrap_or(bytes)
        } else {
            bytes
        };
        std::str::from_utf8(text)
            .map(str::to_string)
            .map_err(|_| SchemaError::Utf8(field.name.clone()))
    }
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

struct Writer {
    buf: BytesMut,
    origin: usize,
    aligned: bool,
}

impl Writer {
    fn align(&mut self, size: usize) {
        if self.aligned && size > 1 {
            let rem = (self.buf.len() - self.origin) % size;
            if rem != 0 {
                self.buf.put_bytes(0, size - rem);
            }
        }
    }

    fn message(
        &mut self,
        definition: &MessageDefinition,
        spec: &MessageSpec,
        value: Option<&Value>,
        path: &str,
    ) -> Result<(), SchemaError> {
        let object = match value {
            None | Some(Value::Null) => None,
            Some(Value::Object(object)) => Some(object),
            Some(_) => {
                return Err(SchemaError::InvalidValue {
                    field: path.to_string(),
                    expected: "object",
                })
            }
        };
        if spec.fields.is_empty() && self.aligned {
            self.buf.put_u8(0);
        }
        for field in &spec.fields {
            let field_value = object.and_then(|o| o.get(&field.name));
            self.field(definition, field, field_value, &child_path(path, &field.name))?;
        }
        Ok(())
    }

    fn field(
        &mut self,
        definition: &MessageDefinition,
        field: &Field,
        value: Option<&Value>,
        path: &str,
    ) -> Result<(), SchemaError> {
        let Some(array) = field.array else {
            return self.element(definition, field, value, path);
        };

        let items: &[Value] = match value {
            None | Some(Value::Null) => &[],
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(SchemaError::InvalidValue {
                    field: path.to_string(),
                    expected: "array",
                })
            }
        };

        match array {
            ArrayKind::Fixed(n) => {
                if !items.is_empty() && items.len() != n {
                    return Err(SchemaError::Length {
                        field: path.to_string(),
                        limit: n,
                        actual: items.len(),
                    });
                }
                for i in 0..n {
                    self.element(definition, field, items.get(i), path)?;
                }
            }
            ArrayKind::Unbounded | ArrayKind::Bounded(_) => {
                if let ArrayKind::Bounded(limit) = array {
                    if items.len() > limit {
                        return Err(SchemaError::Length {
                            field: path.to_string(),
                            limit,
                            actual: items.len(),
                        });
                    }
                }
                self.u32(items.len() as u32);
                for item in items {
                    self.element(definition, field, Some(item), path)?;
                }
            }
        }
        Ok(())
    }

    fn element(
        &mut self,
        definition: &MessageDefinition,
        field: &Field,
        value: Option<&Value>,
        path: &str,
    ) -> Result<(), SchemaError> {
        match &field.field_type {
            FieldType::Primitive(p) => self.primitive(*p, field, value, path),
            FieldType::Complex(name) => {
                let spec = lookup(definition, name)?;
                self.message(definition, spec, value, path)
            }
        }
    }

    fn u32(&mut self, value: u32) {
        self.align(4);
        self.buf.put_u32_le(value);
    }

    fn primitive(
        &mut self,
        primitive: Primitive,
        field: &Field,
        value: Option<&Value>,
        path: &str,
    ) -> Result<(), SchemaError> {
        let invalid = |expected: &'static str| SchemaError::InvalidValue {
            field: path.to_string(),
            expected,
        };

        match primitive {
            Primitive::Bool => {
                let b = match value {
                    None | Some(Value::Null) => false,
                    Some(Value::Bool(b)) => *b,
                    Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
                    Some(_) => return Err(invalid("bool")),
                };
                self.buf.put_u8(u8::from(b));
            }
            Primitive::Byte | Primitive::Char | Primitive::UInt8 => {
                let n = u8::try_from(unsigned(value, path)?).map_err(|_| invalid("uint8"))?;
                self.buf.put_u8(n);
            }
            Primitive::Int8 => {
                let n = i8::try_from(signed(value, path)?).map_err(|_| invalid("int8"))?;
                self.buf.put_i8(n);
            }
            Primitive::Int16 => {
                let n = i16::try_from(signed(value, path)?).map_err(|_| invalid("int16"))?;
                self.align(2);
                self.buf.put_i16_le(n);
            }
            Primitive::UInt16 => {
                let n = u16::try_from(unsigned(value, path)?).map_err(|_| invalid("uint16"))?;
                self.align(2);
                self.buf.put_u16_le(n);
            }
            Primitive::Int32 => {
                let n = i32::try_from(signed(value, path)?).map_err(|_| invalid("int32"))?;
                self.align(4);
                self.buf.put_i32_le(n);
            }
            Primitive::UInt32 => {
                let n = u32::try_from(unsigned(value, path)?).map_err(|_| invalid("uint32"))?;
                self.u32(n);
            }
            Primitive::Int64 => {
                let n = signed(value, path)?;
                self.align(8);
                self.buf.put_i64_le(n);
            }
            Primitive::UInt64 => {
                let n = unsigned(value, path)?;
                self.align(8);
                self.buf.put_u64_le(n);
            }
            Primitive::Float32 => {
                let n = floating(value, path)?;
                self.align(4);
                self.buf.put_f32_le(n as f32);
            }
            Primitive::Float64 => {
                let n = floating(value, path)?;
                self.align(8);
                self.buf.put_f64_le(n);
            }
            Primitive::String => {
                let text = match value {
                    None | Some(Value::Null) => "",
                    Some(Value::String(s)) => s.as_str(),
                    Some(_) => return Err(invalid("string")),
                };
                if let Some(limit) = field.string_bound {
                    if text.len() > limit {
                        return Err(SchemaError::Length {
                            field: path.to_string(),
                            limit,
                            actual: text.len(),
                        });
                    }
                }
                if self.aligned {
                    self.u32(text.len() as u32 + 1);
                    self.buf.extend_from_slice(text.as_bytes());
                    self.buf.put_u8(0);
                } else {
                    self.u32(text.len() as u32);
                    self.buf.extend_from_slice(text.as_bytes());
                }
            }
            Primitive::WString => return Err(SchemaError::Unsupported("wstring".to_string())),
            Primitive::Time | Primitive::Duration => {
                let object = value.and_then(Value::as_object);
                let part = |long: &str, short: &str| {
                    object.and_then(|o| o.get(long).or_else(|| o.get(short)))
                };
                let secs = signed(part("secs", "sec"), path)?;
                let nsecs = signed(part("nsecs", "nanosec"), path)?;
                if primitive == Primitive::Time {
                    let secs = u32::try_from(secs).map_err(|_| invalid("time"))?;
                    let nsecs = u32::try_from(nsecs).map_err(|_| invalid("time"))?;
                    self.buf.put_u32_le(secs);
                    self.buf.put_u32_le(nsecs);
                } else {
                    let secs = i32::try_from(secs).map_err(|_| invalid("duration"))?;
                    let nsecs = i32::try_from(nsecs).map_err(|_| invalid("duration"))?;
                    self.buf.put_i32_le(secs);
                    self.buf.put_i32_le(nsecs);
                }
            }
        }
        Ok(())
    }
}

fn signed(value: Option<&Value>, path: &str) -> Result<i64, SchemaError> {
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Bool(b)) => Ok(i64::from(*b)),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| SchemaError::InvalidValue {
                field: path.to_string(),
                expected: "integer",
            }),
        Some(_) => Err(SchemaError::InvalidValue {
            field: path.to_string(),
            expected: "integer",
        }),
    }
}

fn unsigned(value: Option<&Value>, path: &str) -> Result<u64, SchemaError> {
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Bool(b)) => Ok(u64::from(*b)),
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .map(|f| f as u64)
            })
            .ok_or_else(|| SchemaError::InvalidValue {
                field: path.to_string(),
                expected: "unsigned integer",
            }),
        Some(_) => Err(SchemaError::InvalidValue {
            field: path.to_string(),
            expected: "unsigned integer",
        }),
    }
}

fn floating(value: Option<&Value>, path: &str) -> Result<f64, SchemaError> {
    match value {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| SchemaError::InvalidValue {
            field: path.to_string(),
            expected: "number",
        }),
        Some(_) => Err(SchemaError::InvalidValue {
            field: path.to_string(),
            expected: "number",
        }),
    }
}
