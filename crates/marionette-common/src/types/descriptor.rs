//! Type descriptor wire messages
//!
//! A [`TypeDescriptor`] describes one remote type's shape: its identity,
//! base type and member lists. Descriptors are immutable once received
//! and are consumed exactly once to build one type node. Both metadata
//! backends produce the same shape; native (RTTI) dumps simply leave the
//! member lists they cannot observe empty.

use serde::{Deserialize, Serialize};

/// Which runtime flavor a module or type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// Managed, garbage-collected runtime with reflection metadata
    Managed,
    /// Native module exposing only vtable/RTTI information
    Native,
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeKind::Managed => write!(f, "managed"),
            RuntimeKind::Native => write!(f, "native"),
        }
    }
}

/// Reference to a type by name, before its node exists locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    /// Owning module, when the dumper knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Full name including namespace
    pub full_name: String,
}

impl TypeRef {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            module: None,
            full_name: full_name.into(),
        }
    }

    pub fn with_module(full_name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            full_name: full_name.into(),
        }
    }

    /// Short name after the last namespace separator
    pub fn short_name(&self) -> &str {
        short_name_of(&self.full_name)
    }
}

/// Short name of a full type name, tolerating both `.` and `::` separators
pub fn short_name_of(full_name: &str) -> &str {
    let after_dots = full_name.rsplit('.').next().unwrap_or(full_name);
    after_dots.rsplit("::").next().unwrap_or(after_dots)
}

/// Namespace portion of a full type name (empty when global)
pub fn namespace_of(full_name: &str) -> &str {
    match full_name.rfind('.') {
        Some(idx) => &full_name[..idx],
        None => match full_name.rfind("::") {
            Some(idx) => &full_name[..idx],
            None => "",
        },
    }
}

/// One method or constructor in a type dump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Display name
    pub name: String,
    /// Mangled/binary name; the wire invocation key when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_name: Option<String>,
    /// Names of generic parameter placeholders (`T`, `TKey`, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generic_params: Vec<String>,
    /// Return type, absent for constructors and void natives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<TypeRef>,
    /// Parameters in declaration order
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
    /// Entry address for native functions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<u64>,
}

/// One parameter of a function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
}

/// One field, property or event in a type dump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
}

/// A named virtual-table entry of a native type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VtableEntry {
    /// Demangled display name
    pub name: String,
    /// Mangled name used as the invocation key
    pub binary_name: String,
    /// Slot index in the vtable
    pub slot: u32,
    /// Function entry address
    pub address: u64,
}

/// Full dump of one remote type's shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Which backend produced this dump
    pub runtime: RuntimeKind,
    /// Owning module name
    pub module: String,
    /// Full name including namespace
    pub full_name: String,
    /// Base type, when the type has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<TypeRef>,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub methods: Vec<FunctionDescriptor>,
    #[serde(default)]
    pub constructors: Vec<FunctionDescriptor>,
    #[serde(default)]
    pub fields: Vec<MemberDescriptor>,
    #[serde(default)]
    pub properties: Vec<MemberDescriptor>,
    #[serde(default)]
    pub events: Vec<MemberDescriptor>,
    /// Virtual-table address of a native type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vtable_address: Option<u64>,
    /// Named vtable entry points of a native type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vtable_entries: Vec<VtableEntry>,
}
