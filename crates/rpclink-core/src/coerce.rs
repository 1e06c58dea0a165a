//! Type coercion engine: converts raw wire strings into typed [`Value`]s.
//!
//! Conversion rules, in priority order:
//!
//! 1. Null / empty / `"null"` input converts to the target's zero value.
//! 2. A `String` target takes the raw text as-is.
//! 3. A boolean target tries a strict `true`/`false` parse, then falls back
//!    to a truthy check where `"1"` and case-insensitive `"T"` (after
//!    stripping spaces) count as true and everything else as false.
//! 4. An enum target resolves the variant by case-insensitive name through
//!    the [`EnumRegistry`].
//! 5. A numeric target strips separators (spaces, `_`), detects a base
//!    prefix (`0B` binary, `O` octal, `0D` decimal, `0X` hex; decimal
//!    otherwise), and parses in that base.  A literal `.` forces a floating
//!    parse and is rejected against integer targets.
//! 6. An array target splits the text on `,` and converts each element
//!    recursively, preserving length.
//! 7. Anything still unconverted is offered to the pluggable last-resort
//!    converter hook; if that declines, conversion fails with a typed error.
//!
//! Failure is always a [`CoerceError`] result.  Nothing in this module
//! panics across the dispatch boundary.

use thiserror::Error;

use crate::value::{EnumRegistry, TypeDesc, Value};

/// Extension point consulted when every built-in rule has failed.
pub type LastResortConverter = dyn Fn(&str, &TypeDesc) -> Option<Value> + Send + Sync;

/// Conversion context: the enum tables and the optional last-resort hook.
#[derive(Clone, Copy)]
pub struct CoerceEnv<'a> {
    pub enums: &'a EnumRegistry,
    pub last_resort: Option<&'a LastResortConverter>,
}

impl<'a> CoerceEnv<'a> {
    pub fn new(enums: &'a EnumRegistry) -> Self {
        Self {
            enums,
            last_resort: None,
        }
    }

    pub fn with_last_resort(mut self, hook: &'a LastResortConverter) -> Self {
        self.last_resort = Some(hook);
        self
    }
}

/// Errors produced when a wire value cannot be converted to a target type.
#[derive(Debug, Error, PartialEq)]
pub enum CoerceError {
    /// The target names an enum that was never registered.
    #[error("unknown enum type: {name}")]
    UnknownEnum { name: String },

    /// The enum is known but has no variant with this name.
    #[error("enum {enum_name} has no variant named {variant:?}")]
    UnknownVariant { enum_name: String, variant: String },

    /// The text could not be parsed as the target numeric type.
    #[error("cannot parse {text:?} as {target}: {reason}")]
    Numeric {
        text: String,
        target: String,
        reason: String,
    },

    /// One element of an array failed to convert.
    #[error("array element {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: Box<CoerceError>,
    },

    /// No rule (including the last-resort hook) could convert the value.
    #[error("cannot convert {text:?} to {target}")]
    Unconvertible { text: String, target: String },
}

/// Converts a raw wire value into the target type.
///
/// `raw` is `None` when the wire carried no value for the parameter.
pub fn coerce(
    raw: Option<&str>,
    target: &TypeDesc,
    env: &CoerceEnv<'_>,
) -> Result<Value, CoerceError> {
    // Rule 1: null / empty / literal "null" yields the zero value.
    let text = match raw {
        None => return Ok(Value::zero_of(target)),
        Some(t) => t,
    };
    if text.trim().is_empty() || text.trim().eq_ignore_ascii_case("null") {
        return Ok(Value::zero_of(target));
    }

    let result = match target {
        // Rule 2: identical type, passthrough.
        TypeDesc::Str => Ok(Value::Str(text.to_string())),
        // Rule 3: booleans never fail; the truthy fallback absorbs everything.
        TypeDesc::Bool => Ok(Value::Bool(parse_bool(text))),
        // Rule 4: enum variant by name.
        TypeDesc::Enum(name) => coerce_enum(text, name, env.enums),
        // Rule 5: base-prefixed numerics.
        TypeDesc::I8
        | TypeDesc::I16
        | TypeDesc::I32
        | TypeDesc::I64
        | TypeDesc::U8
        | TypeDesc::U16
        | TypeDesc::U32
        | TypeDesc::U64
        | TypeDesc::F32
        | TypeDesc::F64 => parse_numeric(text, target),
        // Rule 6: element-wise array conversion.
        TypeDesc::Array(elem) => coerce_array(text, elem, env),
    };

    // Rule 7: offer failures to the last-resort hook before giving up.
    match result {
        Ok(v) => Ok(v),
        Err(e) => {
            if let Some(hook) = env.last_resort {
                if let Some(v) = hook(text, target) {
                    return Ok(v);
                }
            }
            Err(e)
        }
    }
}

// ── Rule implementations ──────────────────────────────────────────────────────

fn parse_bool(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return true;
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return false;
    }
    let stripped: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    stripped == "1" || stripped.eq_ignore_ascii_case("t")
}

fn coerce_enum(text: &str, enum_name: &str, enums: &EnumRegistry) -> Result<Value, CoerceError> {
    if !enums.contains(enum_name) {
        return Err(CoerceError::UnknownEnum {
            name: enum_name.to_string(),
        });
    }
    let variant = text.trim();
    enums
        .lookup(enum_name, variant)
        .map(Value::Int)
        .ok_or_else(|| CoerceError::UnknownVariant {
            enum_name: enum_name.to_string(),
            variant: variant.to_string(),
        })
}

fn coerce_array(
    text: &str,
    elem: &TypeDesc,
    env: &CoerceEnv<'_>,
) -> Result<Value, CoerceError> {
    let mut items = Vec::new();
    for (index, part) in text.split(',').enumerate() {
        let item = coerce(Some(part.trim()), elem, env).map_err(|e| CoerceError::Element {
            index,
            source: Box::new(e),
        })?;
        items.push(item);
    }
    Ok(Value::Array(items))
}

/// Integer width and signedness bounds for range checking.
fn int_bounds(target: &TypeDesc) -> Option<(i128, i128)> {
    let bounds = match target {
        TypeDesc::I8 => (i8::MIN as i128, i8::MAX as i128),
        TypeDesc::I16 => (i16::MIN as i128, i16::MAX as i128),
        TypeDesc::I32 => (i32::MIN as i128, i32::MAX as i128),
        TypeDesc::I64 => (i64::MIN as i128, i64::MAX as i128),
        TypeDesc::U8 => (0, u8::MAX as i128),
        TypeDesc::U16 => (0, u16::MAX as i128),
        TypeDesc::U32 => (0, u32::MAX as i128),
        TypeDesc::U64 => (0, u64::MAX as i128),
        _ => return None,
    };
    Some(bounds)
}

fn numeric_error(text: &str, target: &TypeDesc, reason: impl Into<String>) -> CoerceError {
    CoerceError::Numeric {
        text: text.to_string(),
        target: target.wire_name(),
        reason: reason.into(),
    }
}

fn parse_numeric(text: &str, target: &TypeDesc) -> Result<Value, CoerceError> {
    // Strip digit separators: spaces and underscores.
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect();
    if cleaned.is_empty() {
        return Err(numeric_error(text, target, "empty after stripping separators"));
    }

    let (negative, unsigned) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };

    // Base prefix detection.  `0X`/`0B`/`0D` are two-character prefixes, `O`
    // is the single-letter octal marker.  All are case-insensitive.
    let upper = unsigned.to_ascii_uppercase();
    let (base, digits) = if let Some(rest) = upper.strip_prefix("0X") {
        (16, rest.to_string())
    } else if let Some(rest) = upper.strip_prefix("0B") {
        (2, rest.to_string())
    } else if let Some(rest) = upper.strip_prefix("0D") {
        (10, rest.to_string())
    } else if let Some(rest) = upper.strip_prefix('O') {
        (8, rest.to_string())
    } else {
        (10, upper)
    };
    if digits.is_empty() {
        return Err(numeric_error(text, target, "no digits after base prefix"));
    }

    let is_float_target = matches!(target, TypeDesc::F32 | TypeDesc::F64);
    let has_point = base == 10 && digits.contains('.');

    // A literal `.` forces a floating parse, which only a floating target
    // can accept.
    if has_point && !is_float_target {
        return Err(numeric_error(
            text,
            target,
            "fractional literal against an integer target",
        ));
    }

    if is_float_target {
        let magnitude = if base == 10 {
            digits
                .parse::<f64>()
                .map_err(|e| numeric_error(text, target, e.to_string()))?
        } else {
            u64::from_str_radix(&digits, base)
                .map_err(|e| numeric_error(text, target, e.to_string()))? as f64
        };
        let signed = if negative { -magnitude } else { magnitude };
        if matches!(target, TypeDesc::F32) && signed.is_finite() && signed.abs() > f32::MAX as f64 {
            return Err(numeric_error(text, target, "out of range for Single"));
        }
        return Ok(Value::Float(signed));
    }

    let magnitude = u64::from_str_radix(&digits, base)
        .map_err(|e| numeric_error(text, target, e.to_string()))?;
    let value: i128 = if negative {
        -(magnitude as i128)
    } else {
        magnitude as i128
    };

    let (min, max) = int_bounds(target).expect("integer target");
    if value < min || value > max {
        return Err(numeric_error(text, target, "out of range"));
    }

    match target {
        TypeDesc::U8 | TypeDesc::U16 | TypeDesc::U32 | TypeDesc::U64 => {
            Ok(Value::UInt(value as u64))
        }
        _ => Ok(Value::Int(value as i64)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
