//! Member stand-ins
//!
//! Methods, constructors, fields, properties and events of a
//! reconstructed type. Members carry enough identity to be listed and
//! matched by name before any of their dependent types resolve.

use crate::metadata::lazy::LazyTypeBinding;
use crate::metadata::TypeNode;
use once_cell::sync::OnceCell;
use std::sync::{Arc, Weak};

/// One parameter of a method or constructor
#[derive(Debug)]
pub struct ParameterNode {
    pub name: String,
    pub binding: LazyTypeBinding,
}

/// A method or constructor stand-in
pub struct MethodNode {
    /// Display name
    pub name: String,
    /// Mangled/binary name; the wire key when present
    pub binary_name: Option<String>,
    /// Open generic parameter names
    pub generic_params: Vec<String>,
    /// Return type; absent for constructors and void natives
    pub return_type: Option<LazyTypeBinding>,
    pub parameters: Vec<ParameterNode>,
    /// Signature still contains open generic parameters; excluded from
    /// arity dispatch until explicit instantiation arguments are given
    pub contains_open_generics: bool,
    /// Entry address of a native function
    pub address: Option<u64>,
    declaring: OnceCell<Weak<TypeNode>>,
}

impl MethodNode {
    pub fn new(
        name: impl Into<String>,
        binary_name: Option<String>,
        generic_params: Vec<String>,
        return_type: Option<LazyTypeBinding>,
        parameters: Vec<ParameterNode>,
        address: Option<u64>,
    ) -> Self {
        let contains_open_generics = parameters
            .iter()
            .any(|p| p.binding.hint().is_generic_param)
            || return_type
                .as_ref()
                .map(|r| r.hint().is_generic_param)
                .unwrap_or(false);

        Self {
            name: name.into(),
            binary_name,
            generic_params,
            return_type,
            parameters,
            contains_open_generics,
            address,
            declaring: OnceCell::new(),
        }
    }

    /// The key put on the wire to invoke this method.
    ///
    /// Native members use their mangled name; the display name would be
    /// ambiguous across overloads and vtable slots.
    pub fn invocation_key(&self) -> &str {
        self.binary_name.as_deref().unwrap_or(&self.name)
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    pub(crate) fn set_declaring(&self, node: &Arc<TypeNode>) {
        let _ = self.declaring.set(Arc::downgrade(node));
    }

    pub fn declaring_type(&self) -> Option<Arc<TypeNode>> {
        self.declaring.get().and_then(Weak::upgrade)
    }
}

impl std::fmt::Debug for MethodNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodNode")
            .field("name", &self.name)
            .field("arity", &self.arity())
            .field("open_generics", &self.contains_open_generics)
            .finish()
    }
}

/// A field stand-in
pub struct FieldNode {
    pub name: String,
    pub binding: LazyTypeBinding,
    declaring: OnceCell<Weak<TypeNode>>,
}

impl FieldNode {
    pub fn new(name: impl Into<String>, binding: LazyTypeBinding) -> Self {
        Self {
            name: name.into(),
            binding,
            declaring: OnceCell::new(),
        }
    }

    pub(crate) fn set_declaring(&self, node: &Arc<TypeNode>) {
        let _ = self.declaring.set(Arc::downgrade(node));
    }

    pub fn declaring_type(&self) -> Option<Arc<TypeNode>> {
        self.declaring.get().and_then(Weak::upgrade)
    }
}

impl std::fmt::Debug for FieldNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldNode").field("name", &self.name).finish()
    }
}

/// A property stand-in; accessor links are attached by the managed
/// backend after all methods exist
pub struct PropertyNode {
    pub name: String,
    pub binding: LazyTypeBinding,
    getter: OnceCell<Arc<MethodNode>>,
    setter: OnceCell<Arc<MethodNode>>,
}

impl PropertyNode {
    pub fn new(name: impl Into<String>, binding: LazyTypeBinding) -> Self {
        Self {
            name: name.into(),
            binding,
            getter: OnceCell::new(),
            setter: OnceCell::new(),
        }
    }

    pub(crate) fn link_getter(&self, method: Arc<MethodNode>) {
        let _ = self.getter.set(method);
    }

    pub(crate) fn link_setter(&self, method: Arc<MethodNode>) {
        let _ = self.setter.set(method);
    }

    pub fn getter(&self) -> Option<&Arc<MethodNode>> {
        self.getter.get()
    }

    pub fn setter(&self) -> Option<&Arc<MethodNode>> {
        self.setter.get()
    }
}

impl std::fmt::Debug for PropertyNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyNode")
            .field("name", &self.name)
            .field("has_getter", &self.getter.get().is_some())
            .field("has_setter", &self.setter.get().is_some())
            .finish()
    }
}

/// An event stand-in; add/remove links are attached by the managed
/// backend after all methods exist
pub struct EventNode {
    pub name: String,
    pub binding: LazyTypeBinding,
    add_method: OnceCell<Arc<MethodNode>>,
    remove_method: OnceCell<Arc<MethodNode>>,
}

impl EventNode {
    pub fn new(name: impl Into<String>, binding: LazyTypeBinding) -> Self {
        Self {
            name: name.into(),
            binding,
            add_method: OnceCell::new(),
            remove_method: OnceCell::new(),
        }
    }

    pub(crate) fn link_add(&self, method: Arc<MethodNode>) {
        let _ = self.add_method.set(method);
    }

    pub(crate) fn link_remove(&self, method: Arc<MethodNode>) {
        let _ = self.remove_method.set(method);
    }

    pub fn add_method(&self) -> Option<&Arc<MethodNode>> {
        self.add_method.get()
    }

    pub fn remove_method(&self) -> Option<&Arc<MethodNode>> {
        self.remove_method.get()
    }
}

impl std::fmt::Debug for EventNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNode").field("name", &self.name).finish()
    }
}
