//! Reconstructed metadata nodes
//!
//! Stand-ins for remote types and their members. A [`TypeNode`] is
//! allocated empty, registered for cycle breaking, populated through
//! append-only member lists, then published; once published it is never
//! replaced, so two cache lookups for the same key always return the
//! identical `Arc` instance.

pub mod lazy;
pub mod members;

pub use lazy::{DependentTypeResolver, LazyTypeBinding, TypeHint};
pub use members::{EventNode, FieldNode, MethodNode, ParameterNode, PropertyNode};

use marionette_common::types::{namespace_of, short_name_of, RuntimeKind, VtableEntry};
use std::sync::Arc;

/// What a type node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeNodeKind {
    /// An ordinary reconstructed type
    Regular,
    /// An open generic parameter that could not be resolved
    GenericPlaceholder,
}

/// Where the node's metadata came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOrigin {
    /// Dumped from the target process
    Remote,
    /// A locally-known type wrapped as a stand-in so calls still route
    /// through remote dispatch
    Local,
}

/// Reconstructed stand-in for one remote type
pub struct TypeNode {
    pub module: String,
    pub namespace: String,
    /// Short name
    pub name: String,
    pub full_name: String,
    pub runtime: RuntimeKind,
    pub kind: TypeNodeKind,
    pub origin: TypeOrigin,
    pub is_array: bool,
    /// Lazily-bound base type
    pub base: Option<LazyTypeBinding>,
    /// Generic arguments, appended during construction
    pub generic_args: boxcar::Vec<Arc<TypeNode>>,
    pub methods: boxcar::Vec<Arc<MethodNode>>,
    pub constructors: boxcar::Vec<Arc<MethodNode>>,
    pub fields: boxcar::Vec<Arc<FieldNode>>,
    pub properties: boxcar::Vec<Arc<PropertyNode>>,
    pub events: boxcar::Vec<Arc<EventNode>>,
    /// Virtual-table address of a native type
    pub vtable_address: Option<u64>,
    /// Named vtable entry points of a native type
    pub vtable_entries: Vec<VtableEntry>,
}

impl TypeNode {
    /// Empty node for a remote type, ready for member population
    pub fn remote(
        module: &str,
        full_name: &str,
        runtime: RuntimeKind,
        is_array: bool,
        base: Option<LazyTypeBinding>,
    ) -> Self {
        Self {
            module: module.to_string(),
            namespace: namespace_of(full_name).to_string(),
            name: short_name_of(full_name).to_string(),
            full_name: full_name.to_string(),
            runtime,
            kind: TypeNodeKind::Regular,
            origin: TypeOrigin::Remote,
            is_array,
            base,
            generic_args: boxcar::Vec::new(),
            methods: boxcar::Vec::new(),
            constructors: boxcar::Vec::new(),
            fields: boxcar::Vec::new(),
            properties: boxcar::Vec::new(),
            events: boxcar::Vec::new(),
            vtable_address: None,
            vtable_entries: Vec::new(),
        }
    }

    /// Attach native vtable identity before publication
    pub fn with_vtable(mut self, address: Option<u64>, entries: Vec<VtableEntry>) -> Self {
        self.vtable_address = address;
        self.vtable_entries = entries;
        self
    }

    /// Placeholder for an open generic parameter
    pub fn placeholder(name: &str) -> Self {
        Self {
            module: String::new(),
            namespace: String::new(),
            name: name.to_string(),
            full_name: name.to_string(),
            runtime: RuntimeKind::Managed,
            kind: TypeNodeKind::GenericPlaceholder,
            origin: TypeOrigin::Remote,
            is_array: false,
            base: None,
            generic_args: boxcar::Vec::new(),
            methods: boxcar::Vec::new(),
            constructors: boxcar::Vec::new(),
            fields: boxcar::Vec::new(),
            properties: boxcar::Vec::new(),
            events: boxcar::Vec::new(),
            vtable_address: None,
            vtable_entries: Vec::new(),
        }
    }

    /// Stand-in for a locally-known type, so later invocations on it
    /// still route through remote dispatch
    pub fn local_stand_in(full_name: &str) -> Self {
        Self {
            module: String::new(),
            namespace: namespace_of(full_name).to_string(),
            name: short_name_of(full_name).to_string(),
            full_name: full_name.to_string(),
            runtime: RuntimeKind::Managed,
            kind: TypeNodeKind::Regular,
            origin: TypeOrigin::Local,
            is_array: false,
            base: None,
            generic_args: boxcar::Vec::new(),
            methods: boxcar::Vec::new(),
            constructors: boxcar::Vec::new(),
            fields: boxcar::Vec::new(),
            properties: boxcar::Vec::new(),
            events: boxcar::Vec::new(),
            vtable_address: None,
            vtable_entries: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == TypeNodeKind::GenericPlaceholder
    }

    /// Methods with the given display name, in declaration order
    pub fn methods_named(&self, name: &str) -> Vec<Arc<MethodNode>> {
        self.methods
            .iter()
            .filter(|(_, m)| m.name == name)
            .map(|(_, m)| Arc::clone(m))
            .collect()
    }

    pub fn field(&self, name: &str) -> Option<Arc<FieldNode>> {
        self.fields
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(_, f)| Arc::clone(f))
    }

    pub fn property(&self, name: &str) -> Option<Arc<PropertyNode>> {
        self.properties
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(_, p)| Arc::clone(p))
    }

    pub fn event(&self, name: &str) -> Option<Arc<EventNode>> {
        self.events
            .iter()
            .find(|(_, e)| e.name == name)
            .map(|(_, e)| Arc::clone(e))
    }

    /// Named vtable entry of a native type
    pub fn vtable_entry(&self, name: &str) -> Option<&VtableEntry> {
        self.vtable_entries.iter().find(|e| e.name == name)
    }
}

impl std::fmt::Debug for TypeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeNode")
            .field("full_name", &self.full_name)
            .field("module", &self.module)
            .field("runtime", &self.runtime)
            .field("kind", &self.kind)
            .field("methods", &self.methods.count())
            .field("fields", &self.fields.count())
            .finish()
    }
}
