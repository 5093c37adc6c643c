//! Primitive value encoding
//!
//! Primitives and primitive arrays cross the wire as string payloads
//! tagged with their declared type name. Scalars encode as their
//! string form; arrays encode as comma-joined element payloads with
//! `\` and `,` escaped inside elements. Decoding is the exact inverse,
//! driven by the declared type name.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Kind of a primitive payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Char,
    String,
}

impl PrimitiveKind {
    /// Canonical managed type name used on the wire
    pub fn type_name(&self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "System.Boolean",
            PrimitiveKind::I8 => "System.SByte",
            PrimitiveKind::U8 => "System.Byte",
            PrimitiveKind::I16 => "System.Int16",
            PrimitiveKind::U16 => "System.UInt16",
            PrimitiveKind::I32 => "System.Int32",
            PrimitiveKind::U32 => "System.UInt32",
            PrimitiveKind::I64 => "System.Int64",
            PrimitiveKind::U64 => "System.UInt64",
            PrimitiveKind::F32 => "System.Single",
            PrimitiveKind::F64 => "System.Double",
            PrimitiveKind::Char => "System.Char",
            PrimitiveKind::String => "System.String",
        }
    }

    /// Look up a kind from a declared type name.
    ///
    /// Accepts both managed names and native spellings; returns the
    /// kind and whether the name declares an array.
    pub fn from_type_name(name: &str) -> Option<(PrimitiveKind, bool)> {
        let (base, is_array) = match name.strip_suffix("[]") {
            Some(base) => (base.trim(), true),
            None => (name.trim(), false),
        };

        let kind = match base {
            "System.Boolean" | "bool" => PrimitiveKind::Bool,
            "System.SByte" | "sbyte" | "signed char" | "char8_t" => PrimitiveKind::I8,
            "System.Byte" | "byte" | "unsigned char" => PrimitiveKind::U8,
            "System.Int16" | "short" | "__int16" => PrimitiveKind::I16,
            "System.UInt16" | "ushort" | "unsigned short" | "unsigned __int16" => {
                PrimitiveKind::U16
            }
            "System.Int32" | "int" | "long" | "__int32" => PrimitiveKind::I32,
            "System.UInt32" | "uint" | "unsigned int" | "unsigned long" | "unsigned __int32" => {
                PrimitiveKind::U32
            }
            "System.Int64" | "long long" | "__int64" => PrimitiveKind::I64,
            "System.UInt64" | "ulong" | "unsigned long long" | "unsigned __int64" => {
                PrimitiveKind::U64
            }
            "System.Single" | "float" => PrimitiveKind::F32,
            "System.Double" | "double" => PrimitiveKind::F64,
            "System.Char" | "wchar_t" | "char16_t" => PrimitiveKind::Char,
            "System.String" | "string" => PrimitiveKind::String,
            _ => return None,
        };

        Some((kind, is_array))
    }
}

/// A primitive value or homogeneous primitive array
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(char),
    Str(String),
    Array(PrimitiveKind, Vec<PrimitiveValue>),
}

impl PrimitiveValue {
    /// Element kind of this value
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveValue::Bool(_) => PrimitiveKind::Bool,
            PrimitiveValue::I8(_) => PrimitiveKind::I8,
            PrimitiveValue::U8(_) => PrimitiveKind::U8,
            PrimitiveValue::I16(_) => PrimitiveKind::I16,
            PrimitiveValue::U16(_) => PrimitiveKind::U16,
            PrimitiveValue::I32(_) => PrimitiveKind::I32,
            PrimitiveValue::U32(_) => PrimitiveKind::U32,
            PrimitiveValue::I64(_) => PrimitiveKind::I64,
            PrimitiveValue::U64(_) => PrimitiveKind::U64,
            PrimitiveValue::F32(_) => PrimitiveKind::F32,
            PrimitiveValue::F64(_) => PrimitiveKind::F64,
            PrimitiveValue::Char(_) => PrimitiveKind::Char,
            PrimitiveValue::Str(_) => PrimitiveKind::String,
            PrimitiveValue::Array(kind, _) => *kind,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, PrimitiveValue::Array(_, _))
    }

    /// Declared type name for the wire, `[]`-suffixed for arrays
    pub fn type_name(&self) -> String {
        if self.is_array() {
            format!("{}[]", self.kind().type_name())
        } else {
            self.kind().type_name().to_string()
        }
    }

    /// Encode into the string payload form
    pub fn encode(&self) -> String {
        match self {
            PrimitiveValue::Bool(v) => v.to_string(),
            PrimitiveValue::I8(v) => v.to_string(),
            PrimitiveValue::U8(v) => v.to_string(),
            PrimitiveValue::I16(v) => v.to_string(),
            PrimitiveValue::U16(v) => v.to_string(),
            PrimitiveValue::I32(v) => v.to_string(),
            PrimitiveValue::U32(v) => v.to_string(),
            PrimitiveValue::I64(v) => v.to_string(),
            PrimitiveValue::U64(v) => v.to_string(),
            PrimitiveValue::F32(v) => v.to_string(),
            PrimitiveValue::F64(v) => v.to_string(),
            PrimitiveValue::Char(v) => v.to_string(),
            PrimitiveValue::Str(v) => v.clone(),
            PrimitiveValue::Array(_, items) => items
                .iter()
                .map(|item| escape_element(&item.encode()))
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Decode a payload against its declared type name
    pub fn decode(type_name: &str, payload: &str) -> Result<PrimitiveValue> {
        let (kind, is_array) = PrimitiveKind::from_type_name(type_name).ok_or_else(|| {
            Error::Marshal(format!("'{}' is not a primitive type name", type_name))
        })?;

        if is_array {
            // An empty payload is an empty array; a single empty string
            // element is indistinguishable and decodes the same way.
            if payload.is_empty() {
                return Ok(PrimitiveValue::Array(kind, Vec::new()));
            }
            let items = split_elements(payload)
                .iter()
                .map(|element| decode_scalar(kind, element))
                .collect::<Result<Vec<_>>>()?;
            Ok(PrimitiveValue::Array(kind, items))
        } else {
            decode_scalar(kind, payload)
        }
    }
}

fn decode_scalar(kind: PrimitiveKind, payload: &str) -> Result<PrimitiveValue> {
    let parse_err = |e: &dyn std::fmt::Display| {
        Error::Marshal(format!(
            "cannot decode '{}' as {}: {}",
            payload,
            kind.type_name(),
            e
        ))
    };

    Ok(match kind {
        PrimitiveKind::Bool => PrimitiveValue::Bool(payload.parse().map_err(|e| parse_err(&e))?),
        PrimitiveKind::I8 => PrimitiveValue::I8(payload.parse().map_err(|e| parse_err(&e))?),
        PrimitiveKind::U8 => PrimitiveValue::U8(payload.parse().map_err(|e| parse_err(&e))?),
        PrimitiveKind::I16 => PrimitiveValue::I16(payload.parse().map_err(|e| parse_err(&e))?),
        PrimitiveKind::U16 => PrimitiveValue::U16(payload.parse().map_err(|e| parse_err(&e))?),
        PrimitiveKind::I32 => PrimitiveValue::I32(payload.parse().map_err(|e| parse_err(&e))?),
        PrimitiveKind::U32 => PrimitiveValue::U32(payload.parse().map_err(|e| parse_err(&e))?),
        PrimitiveKind::I64 => PrimitiveValue::I64(payload.parse().map_err(|e| parse_err(&e))?),
        PrimitiveKind::U64 => PrimitiveValue::U64(payload.parse().map_err(|e| parse_err(&e))?),
        PrimitiveKind::F32 => PrimitiveValue::F32(payload.parse().map_err(|e| parse_err(&e))?),
        PrimitiveKind::F64 => PrimitiveValue::F64(payload.parse().map_err(|e| parse_err(&e))?),
        PrimitiveKind::Char => {
            let mut chars = payload.chars();
            let c = chars
                .next()
                .ok_or_else(|| parse_err(&"empty char payload"))?;
            if chars.next().is_some() {
                return Err(parse_err(&"more than one character"));
            }
            PrimitiveValue::Char(c)
        }
        PrimitiveKind::String => PrimitiveValue::Str(payload.to_string()),
    })
}

/// Escape `\` and `,` inside an array element payload
fn escape_element(element: &str) -> String {
    let mut out = String::with_capacity(element.len());
    for c in element.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            _ => out.push(c),
        }
    }
    out
}

/// Split an array payload on unescaped commas, unescaping elements
fn split_elements(payload: &str) -> Vec<String> {
    let mut elements = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in payload.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else {
            match c {
                '\\' => escaped = true,
                ',' => elements.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
    }
    elements.push(current);
    elements
}
