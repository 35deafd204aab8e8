//! Structural message descriptors.
//!
//! A [`MessageDefinition`] is the root message type plus every complex type
//! it depends on, already resolved so that each [`FieldType::Complex`] names
//! a spec present in the definition.

use std::collections::HashMap;

use crate::error::SchemaError;

/// Primitive field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Byte,
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    WString,
    /// ROS 1 `time`: `{secs: u32, nsecs: u32}`.
    Time,
    /// ROS 1 `duration`: `{secs: i32, nsecs: i32}`.
    Duration,
}

impl Primitive {
    /// Size in bytes of fixed-width primitives, `None` for strings.
    #[must_use]
    pub fn size(self) -> Option<usize> {
        match self {
            Primitive::Bool
            | Primitive::Byte
            | Primitive::Char
            | Primitive::Int8
            | Primitive::UInt8 => Some(1),
            Primitive::Int16 | Primitive::UInt16 => Some(2),
            Primitive::Int32 | Primitive::UInt32 | Primitive::Float32 => Some(4),
            Primitive::Int64 | Primitive::UInt64 | Primitive::Float64 => Some(8),
            Primitive::Time | Primitive::Duration => Some(8),
            Primitive::String | Primitive::WString => None,
        }
    }
}

/// Element type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Primitive(Primitive),
    /// Normalized name of another spec in the same definition.
    Complex(String),
}

/// Array shape of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    Fixed(usize),
    Unbounded,
    Bounded(usize),
}

/// A single message field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub array: Option<ArrayKind>,
    /// Upper bound of bounded strings.
    pub string_bound: Option<usize>,
}

impl Field {
    /// Create a scalar field.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            array: None,
            string_bound: None,
        }
    }

    /// Turn the field into an array.
    #[must_use]
    pub fn with_array(mut self, array: ArrayKind) -> Self {
        self.array = Some(array);
        self
    }
}

/// One message type: a name and its ordered fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSpec {
    pub name: String,
    pub fields: Vec<Field>,
}

/// A root message type together with all of its dependencies.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    root: String,
    specs: HashMap<String, MessageSpec>,
}

impl MessageDefinition {
    /// Build a definition, resolving every complex field reference.
    ///
    /// The first spec is the root. Unqualified type names are resolved
    /// against the package of the spec that uses them, then against any
    /// spec with the same short name.
    ///
    /// # Errors
    ///
    /// Returns an error if `specs` is empty or a referenced type is missing.
    pub fn new(root_name: &str, specs: Vec<MessageSpec>) -> Result<Self, SchemaError> {
        let Some(first) = specs.first() else {
            return Err(SchemaError::Empty(root_name.to_string()));
        };
        let root = normalize_type_name(&first.name);

        let mut by_name: HashMap<String, MessageSpec> = HashMap::with_capacity(specs.len());
        for mut spec in specs {
            spec.name = normalize_type_name(&spec.name);
            by_name.entry(spec.name.clone()).or_insert(spec);
        }

        let names: Vec<String> = by_name.keys().cloned().collect();
        for spec in by_name.values_mut() {
            let package = package_of(&spec.name).to_string();
            for field in &mut spec.fields {
                if let FieldType::Complex(reference) = &field.field_type {
                    let resolved = resolve_reference(reference, &package, &names)
                        .ok_or_else(|| SchemaError::UnknownType(reference.clone()))?;
                    field.field_type = FieldType::Complex(resolved);
                }
            }
        }

        Ok(Self {
            root,
            specs: by_name,
        })
    }

    /// The root message spec.
    #[must_use]
    pub fn root(&self) -> &MessageSpec {
        &self.specs[&self.root]
    }

    /// Look up a spec by type name (`pkg/Type` or `pkg/msg/Type`).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MessageSpec> {
        self.specs.get(&normalize_type_name(name))
    }

    /// Number of message types in the definition.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the definition is empty (never true for a built definition).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Normalize a type name: `pkg/msg/Type` and `pkg::msg::Type` become `pkg/Type`.
#[must_use]
pub fn normalize_type_name(name: &str) -> String {
    let name = name.trim().replace("::", "/");
    let parts: Vec<&str> = name.split('/').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [package, "msg" | "srv" | "action", rest @ ..] if !rest.is_empty() => {
            format!("{}/{}", package, rest.join("/"))
        }
        _ => parts.join("/"),
    }
}

fn package_of(name: &str) -> &str {
    name.rsplit_once('/').map(|(package, _)| package).unwrap_or("")
}

fn resolve_reference(reference: &str, package: &str, names: &[String]) -> Option<String> {
    let normalized = normalize_type_name(reference);
    if names.contains(&normalized) {
        return Some(normalized);
    }
    if !normalized.contains('/') && !package.is_empty() {
        let local = format!("{package}/{normalized}");
        if names.contains(&local) {
            return Some(local);
        }
    }
    let short = normalized.rsplit('/').next().unwrap_or(&normalized);
    let suffix = format!("/{short}");
    let mut candidates = names.iter().filter(|n| n.ends_with(&suffix) || *n == short);
    match (candidates.next(), candidates.next()) {
        (Some(found), None) => Some(found.clone()),
        _ => None,
    }
}
