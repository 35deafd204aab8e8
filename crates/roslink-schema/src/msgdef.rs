//! ROS message definition parser (`.msg` syntax).
//!
//! Handles the concatenated form servers advertise: the root definition
//! followed by dependencies, each introduced by a line of `=` characters and
//! a `MSG: pkg/Type` header.

use crate::definition::{ArrayKind, Field, FieldType, MessageDefinition, MessageSpec, Primitive};
use crate::error::SchemaError;

/// Message definition dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Ros1,
    Ros2,
}

/// Parse a message definition.
///
/// # Errors
///
/// Returns an error on malformed lines or unresolved type references.
pub fn parse(type_name: &str, text: &str, dialect: Dialect) -> Result<MessageDefinition, SchemaError> {
    let mut specs = Vec::new();
    let mut current = MessageSpec {
        name: type_name.to_string(),
        fields: Vec::new(),
    };
    let mut expect_header = false;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();

        if line.len() >= 3 && line.chars().all(|c| c == '=') {
            specs.push(std::mem::replace(
                &mut current,
                MessageSpec {
                    name: String::new(),
                    fields: Vec::new(),
                },
            ));
            expect_header = true;
            continue;
        }

        if expect_header {
            if let Some(name) = line.strip_prefix("MSG:") {
                current.name = name.trim().to_string();
                expect_header = false;
                continue;
            }
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            return Err(parse_error(type_name, line_no, "missing MSG: header"));
        }

        if let Some(field) = parse_line(line, dialect).map_err(|m| parse_error(&current.name, line_no, m))? {
            current.fields.push(field);
        }
    }

    if expect_header {
        return Err(parse_error(type_name, text.lines().count(), "missing MSG: header"));
    }
    specs.push(current);

    MessageDefinition::new(type_name, specs)
}

fn parse_error(type_name: &str, line: usize, message: impl Into<String>) -> SchemaError {
    SchemaError::Parse {
        type_name: type_name.to_string(),
        line,
        message: message.into(),
    }
}

/// Parse one line; `Ok(None)` for blanks, comments and constants.
fn parse_line(line: &str, dialect: Dialect) -> Result<Option<Field>, String> {
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (type_token, rest) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| format!("expected `type name`, got `{line}`"))?;
    let rest = rest.trim_start();

    let name_end = rest
        .find(|c: char| c.is_whitespace() || c == '=' || c == '#')
        .unwrap_or(rest.len());
    let name = &rest[..name_end];
    if name.is_empty() {
        return Err(format!("missing field name in `{line}`"));
    }

    // Constants: `TYPE NAME=value`
    if rest[name_end..].trim_start().starts_with('=') {
        return Ok(None);
    }

    let (field_type, string_bound, array) = parse_type(type_token, dialect)?;
    Ok(Some(Field {
        name: name.to_string(),
        field_type,
        array,
        string_bound,
    }))
}

type ParsedType = (FieldType, Option<usize>, Option<ArrayKind>);

fn parse_type(token: &str, dialect: Dialect) -> Result<ParsedType, String> {
    let (base, array) = match token.find('[') {
        Some(open) => {
            let inner = token[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| format!("unterminated array in `{token}`"))?;
            let array = if inner.is_empty() {
                ArrayKind::Unbounded
            } else if let Some(bound) = inner.strip_prefix("<=") {
                ArrayKind::Bounded(parse_usize(bound, token)?)
            } else {
                ArrayKind::Fixed(parse_usize(inner, token)?)
            };
            (&token[..open], Some(array))
        }
        None => (token, None),
    };

    let (base, string_bound) = match base.split_once("<=") {
        Some((base, bound)) => (base, Some(parse_usize(bound, token)?)),
        None => (base, None),
    };

    let field_type = match primitive(base, dialect) {
        Some(p) => FieldType::Primitive(p),
        None if base == "Header" => FieldType::Complex("std_msgs/Header".to_string()),
        None => FieldType::Complex(base.to_string()),
    };

    Ok((field_type, string_bound, array))
}

fn parse_usize(text: &str, token: &str) -> Result<usize, String> {
    text.trim()
        .parse()
        .map_err(|_| format!("invalid size in `{token}`"))
}

fn primitive(name: &str, dialect: Dialect) -> Option<Primitive> {
    let p = match name {
        "bool" => Primitive::Bool,
        "byte" => Primitive::Byte,
        "char" => Primitive::Char,
        "int8" => Primitive::Int8,
        "uint8" => Primitive::UInt8,
        "int16" => Primitive::Int16,
        "uint16" => Primitive::UInt16,
        "int32" => Primitive::Int32,
        "uint32" => Primitive::UInt32,
        "int64" => Primitive::Int64,
        "uint64" => Primitive::UInt64,
        "float32" => Primitive::Float32,
        "float64" => Primitive::Float64,
        "string" => Primitive::String,
        "wstring" if dialect == Dialect::Ros2 => Primitive::WString,
        "time" if dialect == Dialect::Ros1 => Primitive::Time,
        "duration" if dialect == Dialect::Ros1 => Primitive::Duration,
        _ => return None,
    };
    Some(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields_and_constants() {
        let text = "\
# comment line
int32 FOO=1
string BAR = hello # not a comment
float64 x  # trailing comment
uint8[] data
int16[3] triple
string<=10 short_name
int32[<=5] few 0
";
        let def = parse("pkg/Thing", text, Dialect::Ros2).unwrap();
        let fields = &def.root().fields;
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0].name, "x");
        assert_eq!(fields[1].array, Some(ArrayKind::Unbounded));
        assert_eq!(fields[2].array, Some(ArrayKind::Fixed(3)));
        assert_eq!(fields[3].string_bound, Some(10));
        assert_eq!(fields[4].array, Some(ArrayKind::Bounded(5)));
    }

    #[test]
    fn test_parse_dependencies() {
        let text = "\
Header header
geometry_msgs/Point position
================================================================================
MSG: std_msgs/Header
uint32 seq
time stamp
string frame_id
================================================================================
MSG: geometry_msgs/Point
float64 x
float64 y
float64 z
";
        let def = parse("pkg/Stamped", text, Dialect::Ros1).unwrap();
        assert_eq!(def.len(), 3);
        let header = def.get("std_msgs/Header").unwrap();
        assert_eq!(
            header.fields[1].field_type,
            FieldType::Primitive(Primitive::Time)
        );
        assert_eq!(
            def.root().fields[1].field_type,
            FieldType::Complex("geometry_msgs/Point".to_string())
        );
    }

    #[test]
    fn test_parse_ros2_builtin_time() {
        let text = "\
builtin_interfaces/Time stamp
================================================================================
MSG: builtin_interfaces/Time
int32 sec
uint32 nanosec
";
        let def = parse("pkg/msg/Stamp", text, Dialect::Ros2).unwrap();
        assert_eq!(
            def.root().fields[0].field_type,
            FieldType::Complex("builtin_interfaces/Time".to_string())
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse("pkg/Bad", "int32", Dialect::Ros1),
            Err(SchemaError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse("pkg/Bad", "int32[x] a", Dialect::Ros1),
            Err(SchemaError::Parse { .. })
        ));
        assert!(matches!(
            parse("pkg/Bad", "Missing a", Dialect::Ros1),
            Err(SchemaError::UnknownType(_))
        ));
    }
}
