//! The loosely-typed value model shared by the codec and the dispatch engine.
//!
//! Wire values are strings (or comma-separated strings for arrays); dispatch
//! targets declare concrete parameter types.  [`TypeDesc`] describes such a
//! concrete type, [`Value`] is the runtime value an invocation closure
//! receives after coercion, and [`EnumRegistry`] maps enum variant names to
//! their ordinals so enum-typed parameters can be looked up by name.

use std::collections::HashMap;
use std::fmt;

use crate::is_valid_identifier;

/// Descriptor of the concrete type a dispatch target expects for a parameter,
/// field, or return value.
///
/// The wire carries these as short readable names (`Int32`, `Double`,
/// `String`, `MyEnum`, `Int32[]`) in the `Type` attribute of a parameter or
/// return element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDesc {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
    /// A named enum.  Variant names are resolved through an [`EnumRegistry`].
    Enum(String),
    /// An array whose elements all share one scalar element type.
    Array(Box<TypeDesc>),
}

impl TypeDesc {
    /// The name used on the wire in `Type="…"` attributes.
    pub fn wire_name(&self) -> String {
        match self {
            TypeDesc::Bool => "Boolean".to_string(),
            TypeDesc::I8 => "Int8".to_string(),
            TypeDesc::I16 => "Int16".to_string(),
            TypeDesc::I32 => "Int32".to_string(),
            TypeDesc::I64 => "Int64".to_string(),
            TypeDesc::U8 => "UInt8".to_string(),
            TypeDesc::U16 => "UInt16".to_string(),
            TypeDesc::U32 => "UInt32".to_string(),
            TypeDesc::U64 => "UInt64".to_string(),
            TypeDesc::F32 => "Single".to_string(),
            TypeDesc::F64 => "Double".to_string(),
            TypeDesc::Str => "String".to_string(),
            TypeDesc::Enum(name) => name.clone(),
            TypeDesc::Array(elem) => format!("{}[]", elem.wire_name()),
        }
    }

    /// Parses a wire type name back into a descriptor.
    ///
    /// Unknown names that are valid identifiers are treated as enum names,
    /// mirroring how the dispatch side registers enums by name.  Returns
    /// `None` for names that are neither built-in nor identifier-shaped.
    pub fn parse(name: &str) -> Option<TypeDesc> {
        if let Some(elem) = name.strip_suffix("[]") {
            return TypeDesc::parse(elem).map(|e| TypeDesc::Array(Box::new(e)));
        }
        let desc = match name {
            "Boolean" => TypeDesc::Bool,
            "Int8" => TypeDesc::I8,
            "Int16" => TypeDesc::I16,
            "Int32" => TypeDesc::I32,
            "Int64" => TypeDesc::I64,
            "UInt8" => TypeDesc::U8,
            "UInt16" => TypeDesc::U16,
            "UInt32" => TypeDesc::U32,
            "UInt64" => TypeDesc::U64,
            "Single" => TypeDesc::F32,
            "Double" => TypeDesc::F64,
            "String" => TypeDesc::Str,
            other if is_valid_identifier(other) => TypeDesc::Enum(other.to_string()),
            _ => return None,
        };
        Some(desc)
    }

    /// `true` for numeric, boolean, and enum types.
    ///
    /// Used by overload narrowing: a scalar-value-type parameter only accepts
    /// a scalar value or a raw string argument, never an array.
    pub fn is_scalar_value_type(&self) -> bool {
        !matches!(self, TypeDesc::Str | TypeDesc::Array(_))
    }

    /// `true` when this describes an array type.
    pub fn is_array(&self) -> bool {
        matches!(self, TypeDesc::Array(_))
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_name())
    }
}

/// A runtime value passed to (or returned from) an invocation closure.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
}

impl Value {
    /// Encodes the value as the string form used inside CDATA payloads.
    ///
    /// Arrays join their elements with `,`, matching the comma-separated
    /// scalar representation of array-typed parameters.
    pub fn encode_wire(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::UInt(n) => n.to_string(),
            Value::Float(x) => x.to_string(),
            Value::Str(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(Value::encode_wire)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// The zero value for a target type, used when the wire carries
    /// null/empty input.
    pub fn zero_of(target: &TypeDesc) -> Value {
        match target {
            TypeDesc::Bool => Value::Bool(false),
            TypeDesc::I8 | TypeDesc::I16 | TypeDesc::I32 | TypeDesc::I64 => Value::Int(0),
            TypeDesc::U8 | TypeDesc::U16 | TypeDesc::U32 | TypeDesc::U64 => Value::UInt(0),
            TypeDesc::F32 | TypeDesc::F64 => Value::Float(0.0),
            TypeDesc::Str => Value::Str(String::new()),
            TypeDesc::Enum(_) => Value::Int(0),
            TypeDesc::Array(_) => Value::Array(Vec::new()),
        }
    }
}

/// Registry of named enums for coercion by variant name.
///
/// Populated at server configuration time alongside object registration;
/// read-only afterwards.  Lookups are case-insensitive, so `"red"`, `"Red"`,
/// and `"RED"` all resolve the same variant.
#[derive(Debug, Default)]
pub struct EnumRegistry {
    // enum name (lowercased) -> variant name (lowercased) -> ordinal
    enums: HashMap<String, HashMap<String, i64>>,
}

impl EnumRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an enum with its `(variant name, ordinal)` pairs.
    ///
    /// Re-registering the same enum name replaces the previous variant set.
    pub fn register<I, S>(&mut self, enum_name: &str, variants: I)
    where
        I: IntoIterator<Item = (S, i64)>,
        S: AsRef<str>,
    {
        let table = variants
            .into_iter()
            .map(|(name, ord)| (name.as_ref().to_ascii_lowercase(), ord))
            .collect();
        self.enums.insert(enum_name.to_ascii_lowercase(), table);
    }

    /// `true` when an enum with this name has been registered.
    pub fn contains(&self, enum_name: &str) -> bool {
        self.enums.contains_key(&enum_name.to_ascii_lowercase())
    }

    /// Case-insensitive variant-name lookup.
    pub fn lookup(&self, enum_name: &str, variant: &str) -> Option<i64> {
        self.enums
            .get(&enum_name.to_ascii_lowercase())?
            .get(&variant.to_ascii_lowercase())
            .copied()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_name_round_trips_for_builtins() {
        let types = [
            TypeDesc::Bool,
            TypeDesc::I8,
            TypeDesc::I16,
            TypeDesc::I32,
            TypeDesc::I64,
            TypeDesc::U8,
            TypeDesc::U16,
            TypeDesc::U32,
            TypeDesc::U64,
            TypeDesc::F32,
            TypeDesc::F64,
            TypeDesc::Str,
        ];
        for ty in types {
            let name = ty.wire_name();
            assert_eq!(TypeDesc::parse(&name), Some(ty), "failed for {name}");
        }
    }

    #[test]
    fn test_array_wire_name_round_trips() {
        let ty = TypeDesc::Array(Box::new(TypeDesc::I32));
        assert_eq!(ty.wire_name(), "Int32[]");
        assert_eq!(TypeDesc::parse("Int32[]"), Some(ty));
    }

    #[test]
    fn test_unknown_identifier_parses_as_enum() {
        assert_eq!(
            TypeDesc::parse("TrafficLight"),
            Some(TypeDesc::Enum("TrafficLight".to_string()))
        );
    }

    #[test]
    fn test_non_identifier_type_name_is_rejected() {
        assert_eq!(TypeDesc::parse("Not A Type"), None);
        assert_eq!(TypeDesc::parse(""), None);
    }

    #[test]
    fn test_scalar_value_type_classification() {
        assert!(TypeDesc::I32.is_scalar_value_type());
        assert!(TypeDesc::Bool.is_scalar_value_type());
        assert!(TypeDesc::Enum("E".into()).is_scalar_value_type());
        assert!(!TypeDesc::Str.is_scalar_value_type());
        assert!(!TypeDesc::Array(Box::new(TypeDesc::I32)).is_scalar_value_type());
    }

    #[test]
    fn test_value_encode_wire_joins_arrays_with_commas() {
        let v = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(v.encode_wire(), "1,2,3");
    }

    #[test]
    fn test_zero_of_each_target() {
        assert_eq!(Value::zero_of(&TypeDesc::Bool), Value::Bool(false));
        assert_eq!(Value::zero_of(&TypeDesc::I32), Value::Int(0));
        assert_eq!(Value::zero_of(&TypeDesc::U8), Value::UInt(0));
        assert_eq!(Value::zero_of(&TypeDesc::F64), Value::Float(0.0));
        assert_eq!(Value::zero_of(&TypeDesc::Str), Value::Str(String::new()));
        assert_eq!(
            Value::zero_of(&TypeDesc::Array(Box::new(TypeDesc::I32))),
            Value::Array(vec![])
        );
    }

    #[test]
    fn test_enum_registry_lookup_is_case_insensitive() {
        let mut reg = EnumRegistry::new();
        reg.register("TrafficLight", [("Red", 0), ("Yellow", 1), ("Green", 2)]);
        assert_eq!(reg.lookup("trafficlight", "GREEN"), Some(2));
        assert_eq!(reg.lookup("TrafficLight", "red"), Some(0));
        assert_eq!(reg.lookup("TrafficLight", "blue"), None);
        assert!(reg.contains("TRAFFICLIGHT"));
        assert!(!reg.contains("Nope"));
    }
}
