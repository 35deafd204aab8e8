//! Parser for the subset of OMG IDL used by ROS 2 (`ros2idl` schemas).
//!
//! Supports modules, structs, typedefs, constants (skipped), annotations
//! (skipped), sequences, fixed arrays and bounded strings. Section separator
//! lines and `IDL: pkg/msg/Type` headers between concatenated files are
//! ignored.

use std::collections::HashMap;

use crate::definition::{
    normalize_type_name, ArrayKind, Field, FieldType, MessageDefinition, MessageSpec, Primitive,
};
use crate::error::SchemaError;

/// Parse IDL text into a definition rooted at `type_name`.
///
/// # Errors
///
/// Returns an error on malformed IDL or unresolved references.
pub fn parse(type_name: &str, text: &str) -> Result<MessageDefinition, SchemaError> {
    let filtered: String = text
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !(trimmed.starts_with("IDL:")
                || trimmed.starts_with('#')
                || (trimmed.len() >= 3 && trimmed.chars().all(|c| c == '=')))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let tokens = tokenize(&filtered)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        modules: Vec::new(),
        typedefs: HashMap::new(),
        specs: Vec::new(),
    };
    parser.parse_definitions(false)?;

    let mut specs = parser.specs;
    let wanted = normalize_type_name(type_name);
    if let Some(index) = specs
        .iter()
        .position(|spec| normalize_type_name(&spec.name) == wanted)
    {
        let root = specs.remove(index);
        specs.insert(0, root);
    }

    MessageDefinition::new(type_name, specs)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    Punct(char),
    Scope,
}

fn tokenize(text: &str) -> Result<Vec<Token>, SchemaError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            i += 2;
        } else if c == ':' && chars.get(i + 1) == Some(&':') {
            tokens.push(Token::Scope);
            i += 2;
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
        } else if c == '"' {
            let start = i + 1;
            i += 1;
            while i < chars.len() && chars[i] != '"' {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            if i >= chars.len() {
                return Err(SchemaError::Idl("unterminated string literal".to_string()));
            }
            tokens.push(Token::Str(chars[start..i].iter().collect()));
            i += 1;
        } else {
            tokens.push(Token::Punct(c));
            i += 1;
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    modules: Vec<String>,
    typedefs: HashMap<String, (FieldType, Option<usize>, Option<ArrayKind>)>,
    specs: Vec<MessageSpec>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, SchemaError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| SchemaError::Idl("unexpected end of input".to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect_punct(&mut self, expected: char) -> Result<(), SchemaError> {
        match self.next()? {
            Token::Punct(c) if c == expected => Ok(()),
            other => Err(SchemaError::Idl(format!(
                "expected `{expected}`, found {other:?}"
            ))),
        }
    }

    fn eat_punct(&mut self, expected: char) -> bool {
        if self.peek() == Some(&Token::Punct(expected)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String, SchemaError> {
        match self.next()? {
            Token::Ident(name) => Ok(name),
            other => Err(SchemaError::Idl(format!("expected identifier, found {other:?}"))),
        }
    }

    fn number(&mut self) -> Result<usize, SchemaError> {
        match self.next()? {
            Token::Number(n) => n
                .parse()
                .map_err(|_| SchemaError::Idl(format!("invalid size `{n}`"))),
            other => Err(SchemaError::Idl(format!("expected number, found {other:?}"))),
        }
    }

    fn skip_annotations(&mut self) -> Result<(), SchemaError> {
        while self.eat_punct('@') {
            self.scoped_name()?;
            if self.eat_punct('(') {
                let mut depth = 1;
                while depth > 0 {
                    match self.next()? {
                        Token::Punct('(') => depth += 1,
                        Token::Punct(')') => depth -= 1,
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }

    fn skip_to_semicolon(&mut self) -> Result<(), SchemaError> {
        while self.next()? != Token::Punct(';') {}
        Ok(())
    }

    fn parse_definitions(&mut self, nested: bool) -> Result<(), SchemaError> {
        loop {
            self.skip_annotations()?;
            match self.peek() {
                None if !nested => return Ok(()),
                None => return Err(SchemaError::Idl("unclosed module".to_string())),
                Some(Token::Punct('}')) if nested => return Ok(()),
                Some(Token::Punct(';')) => {
                    self.pos += 1;
                }
                Some(Token::Ident(keyword)) => match keyword.clone().as_str() {
                    "module" => {
                        self.pos += 1;
                        let name = self.ident()?;
                        self.expect_punct('{')?;
                        self.modules.push(name);
                        self.parse_definitions(true)?;
                        self.modules.pop();
                        self.expect_punct('}')?;
                        self.eat_punct(';');
                    }
                    "struct" => {
                        self.pos += 1;
                        self.parse_struct()?;
                    }
                    "typedef" => {
                        self.pos += 1;
                        self.parse_typedef()?;
                    }
                    keyword @ ("const" | "enum" | "union") => {
                        if keyword == "const" {
                            self.skip_to_semicolon()?;
                        } else {
                            while self.next()? != Token::Punct('}') {}
                            self.eat_punct(';');
                        }
                    }
                    other => {
                        return Err(SchemaError::Idl(format!("unexpected `{other}`")));
                    }
                },
                Some(other) => {
                    return Err(SchemaError::Idl(format!("unexpected token {other:?}")));
                }
            }
        }
    }

    fn qualified(&self, name: &str) -> String {
        let mut parts = self.modules.clone();
        parts.push(name.to_string());
        parts.join("/")
    }

    fn parse_struct(&mut self) -> Result<(), SchemaError> {
        let name = self.ident()?;
        if self.eat_punct(';') {
            // Forward declaration.
            return Ok(());
        }
        self.expect_punct('{')?;

        let mut fields = Vec::new();
        loop {
            self.skip_annotations()?;
            if self.eat_punct('}') {
                break;
            }
            let (field_type, string_bound, array) = self.type_spec()?;
            loop {
                let member = self.ident()?;
                let member_array = if self.eat_punct('[') {
                    let size = self.number()?;
                    self.expect_punct(']')?;
                    Some(ArrayKind::Fixed(size))
                } else {
                    array
                };
                fields.push(Field {
                    name: member,
                    field_type: field_type.clone(),
                    array: member_array,
                    string_bound,
                });
                if !self.eat_punct(',') {
                    break;
                }
            }
            self.expect_punct(';')?;
        }
        self.eat_punct(';');

        self.specs.push(MessageSpec {
            name: self.qualified(&name),
            fields,
        });
        Ok(())
    }

    fn parse_typedef(&mut self) -> Result<(), SchemaError> {
        let (field_type, string_bound, mut array) = self.type_spec()?;
        let name = self.ident()?;
        if self.eat_punct('[') {
            let size = self.number()?;
            self.expect_punct(']')?;
            array = Some(ArrayKind::Fixed(size));
        }
        self.expect_punct(';')?;
        self.typedefs.insert(name, (field_type, string_bound, array));
        Ok(())
    }

    fn scoped_name(&mut self) -> Result<String, SchemaError> {
        let mut parts = Vec::new();
        if self.peek() == Some(&Token::Scope) {
            self.pos += 1;
        }
        parts.push(self.ident()?);
        while self.peek() == Some(&Token::Scope) {
            self.pos += 1;
            parts.push(self.ident()?);
        }
        Ok(parts.join("/"))
    }

    fn type_spec(&mut self) -> Result<(FieldType, Option<usize>, Option<ArrayKind>), SchemaError> {
        let name = self.scoped_name()?;
        let primitive = match name.as_str() {
            "sequence" => {
                self.expect_punct('<')?;
                let (element, string_bound, _) = self.type_spec()?;
                let array = if self.eat_punct(',') {
                    ArrayKind::Bounded(self.number()?)
                } else {
                    ArrayKind::Unbounded
                };
                self.expect_punct('>')?;
                return Ok((element, string_bound, Some(array)));
            }
            "string" | "wstring" => {
                let bound = if self.eat_punct('<') {
                    let bound = self.number()?;
                    self.expect_punct('>')?;
                    Some(bound)
                } else {
                    None
                };
                let p = if name == "string" {
                    Primitive::String
                } else {
                    Primitive::WString
                };
                return Ok((FieldType::Primitive(p), bound, None));
            }
            "unsigned" => match self.ident()?.as_str() {
                "short" => Primitive::UInt16,
                "long" => {
                    if self.peek() == Some(&Token::Ident("long".to_string())) {
                        self.pos += 1;
                        Primitive::UInt64
                    } else {
                        Primitive::UInt32
                    }
                }
                other => return Err(SchemaError::Idl(format!("invalid type `unsigned {other}`"))),
            },
            "long" => {
                let next = match self.peek() {
                    Some(Token::Ident(next)) => next.clone(),
                    _ => String::new(),
                };
                match next.as_str() {
                    "long" => {
                        self.pos += 1;
                        Primitive::Int64
                    }
                    "double" => return Err(SchemaError::Unsupported("long double".to_string())),
                    _ => Primitive::Int32,
                }
            }
            "short" | "int16" => Primitive::Int16,
            "uint16" => Primitive::UInt16,
            "int32" => Primitive::Int32,
            "uint32" => Primitive::UInt32,
            "int64" => Primitive::Int64,
            "uint64" => Primitive::UInt64,
            "int8" => Primitive::Int8,
            "uint8" => Primitive::UInt8,
            "octet" => Primitive::Byte,
            "char" => Primitive::Char,
            "wchar" => return Err(SchemaError::Unsupported("wchar".to_string())),
            "boolean" => Primitive::Bool,
            "float" => Primitive::Float32,
            "double" => Primitive::Float64,
            _ => {
                if let Some(alias) = self.typedefs.get(&name) {
                    return Ok(alias.clone());
                }
                return Ok((FieldType::Complex(name), None, None));
            }
        };
        Ok((FieldType::Primitive(primitive), None, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSE_IDL: &str = r#"
================================================================================
IDL: geometry_msgs/msg/PoseWithCovariance
// generated from rosidl_adapter
#include "geometry_msgs/msg/Pose.idl"

module geometry_msgs {
  module msg {
    typedef double double__36[36];
    @verbatim (language="comment", text=
      "Row-major covariance")
    struct PoseWithCovariance {
      geometry_msgs::msg::Point position;
      double__36 covariance;
      sequence<int32, 4> ids;
      string<8> label;
      unsigned long long stamp, other;
    };
  };
};
================================================================================
IDL: geometry_msgs/msg/Point
module geometry_msgs {
  module msg {
    module Point_Constants {
      const double ORIGIN = 0.0;
    };
    struct Point {
      double x;
      double y;
      double z;
    };
  };
};
"#;

    #[test]
    fn test_parse_idl() {
        let def = parse("geometry_msgs/msg/PoseWithCovariance", POSE_IDL).unwrap();
        let root = def.root();
        assert_eq!(root.name, "geometry_msgs/PoseWithCovariance");
        assert_eq!(root.fields.len(), 6);
        assert_eq!(
            root.fields[0].field_type,
            FieldType::Complex("geometry_msgs/Point".to_string())
        );
        assert_eq!(root.fields[1].array, Some(ArrayKind::Fixed(36)));
        assert_eq!(root.fields[2].array, Some(ArrayKind::Bounded(4)));
        assert_eq!(root.fields[3].string_bound, Some(8));
        assert_eq!(
            root.fields[5].field_type,
            FieldType::Primitive(Primitive::UInt64)
        );
        assert_eq!(def.get("geometry_msgs/msg/Point").unwrap().fields.len(), 3);
    }

    #[test]
    fn test_root_selected_by_name() {
        let text = "module pkg { module msg { struct A { int32 x; }; struct B { pkg::msg::A a; }; }; };";
        let def = parse("pkg/msg/B", text).unwrap();
        assert_eq!(def.root().name, "pkg/B");
    }

    #[test]
    fn test_parse_idl_errors() {
        assert!(parse("pkg/msg/A", "module pkg { struct A { int32 x; };").is_err());
        assert!(matches!(
            parse("pkg/msg/A", "struct A { long double x; };"),
            Err(SchemaError::Unsupported(_))
        ));
    }
}
