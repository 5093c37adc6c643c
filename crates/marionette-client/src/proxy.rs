//! Dynamic proxy dispatch
//!
//! A [`RemoteObject`] pairs a reconstructed type node with an optional
//! object handle (absent for static access) and resolves get/set/invoke
//! by name against the node's member lists. Overloads are picked by
//! argument count only; a tie is a hard [`Error::AmbiguousOverload`].
//! Methods whose signature still contains open generic parameters are
//! excluded from normal dispatch and reachable only through
//! [`RemoteObject::invoke_generic`] with explicit instantiation
//! arguments.

use crate::graph::TypeGraphBuilder;
use crate::handle::ObjectHandle;
use crate::metadata::{EventNode, FieldNode, MethodNode, PropertyNode, TypeNode};
use crate::providers::AgentConnection;
use marionette_common::error::{Error, Result};
use marionette_common::primitives::PrimitiveValue;
use marionette_common::types::RemoteValue;
use std::sync::Arc;
use tracing::trace;

/// An argument as supplied by the caller, before marshaling
#[derive(Debug, Clone)]
pub enum Arg {
    Null,
    Primitive(PrimitiveValue),
    /// A named member of a remote enum type; resolved to a remote
    /// token through a side call, never sent as an encoded primitive
    Enum { type_name: String, member: String },
    /// An already-held remote object
    Object(Arc<ObjectHandle>),
    /// A bare type reference
    Type {
        module: Option<String>,
        full_name: String,
    },
}

impl Arg {
    pub fn i32(value: i32) -> Self {
        Arg::Primitive(PrimitiveValue::I32(value))
    }

    pub fn str(value: &str) -> Self {
        Arg::Primitive(PrimitiveValue::Str(value.to_string()))
    }

    pub fn bool(value: bool) -> Self {
        Arg::Primitive(PrimitiveValue::Bool(value))
    }
}

/// An unmarshaled operation result
pub enum Returned {
    Void,
    Null,
    Primitive(PrimitiveValue),
    Object(RemoteObject),
}

impl Returned {
    pub fn is_void(&self) -> bool {
        matches!(self, Returned::Void)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Returned::Null)
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Returned::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<RemoteObject> {
        match self {
            Returned::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Returned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Returned::Void => write!(f, "Void"),
            Returned::Null => write!(f, "Null"),
            Returned::Primitive(p) => f.debug_tuple("Primitive").field(p).finish(),
            Returned::Object(o) => f
                .debug_tuple("Object")
                .field(&o.type_node().full_name)
                .finish(),
        }
    }
}

/// Outcome of a member lookup by name
pub enum Member {
    Methods(Vec<Arc<MethodNode>>),
    Constructors(Vec<Arc<MethodNode>>),
    Field(Arc<FieldNode>),
    Property(Arc<PropertyNode>),
    Event(Arc<EventNode>),
    NotFound,
}

/// Live proxy over a remote instance, or over a type for static access
pub struct RemoteObject {
    agent: Arc<dyn AgentConnection>,
    builder: Arc<TypeGraphBuilder>,
    node: Arc<TypeNode>,
    handle: Option<Arc<ObjectHandle>>,
}

impl RemoteObject {
    pub(crate) fn new(
        agent: Arc<dyn AgentConnection>,
        builder: Arc<TypeGraphBuilder>,
        node: Arc<TypeNode>,
        handle: Option<Arc<ObjectHandle>>,
    ) -> Self {
        Self {
            agent,
            builder,
            node,
            handle,
        }
    }

    pub fn type_node(&self) -> &Arc<TypeNode> {
        &self.node
    }

    pub fn handle(&self) -> Option<&Arc<ObjectHandle>> {
        self.handle.as_ref()
    }

    pub fn address(&self) -> u64 {
        self.handle.as_ref().map(|h| h.address()).unwrap_or(0)
    }

    /// This object as an argument to another call
    pub fn as_arg(&self) -> Result<Arg> {
        match &self.handle {
            Some(handle) => Ok(Arg::Object(Arc::clone(handle))),
            None => Ok(Arg::Type {
                module: Some(self.node.module.clone()),
                full_name: self.node.full_name.clone(),
            }),
        }
    }

    /// Release the underlying handle, if any
    pub fn release(&self) -> Result<()> {
        match &self.handle {
            Some(handle) => handle.release(),
            None => Ok(()),
        }
    }

    /// Look a member up by name across all member lists
    pub fn member(&self, name: &str) -> Member {
        if name == ".ctor" && self.node.constructors.count() > 0 {
            let ctors = self
                .node
                .constructors
                .iter()
                .map(|(_, c)| Arc::clone(c))
                .collect();
            return Member::Constructors(ctors);
        }
        let methods = self.node.methods_named(name);
        if !methods.is_empty() {
            return Member::Methods(methods);
        }
        if let Some(field) = self.node.field(name) {
            return Member::Field(field);
        }
        if let Some(property) = self.node.property(name) {
            return Member::Property(property);
        }
        if let Some(event) = self.node.event(name) {
            return Member::Event(event);
        }
        Member::NotFound
    }

    /// Read a field or property
    pub fn get(&self, name: &str) -> Result<Returned> {
        match self.member(name) {
            Member::Field(_) => {
                let value = match &self.handle {
                    Some(handle) => handle.get_field(name)?,
                    None => self.agent.get_field(0, &self.node.full_name, name)?,
                };
                self.unmarshal(Some(value))
            }
            Member::Property(property) => {
                let key = property
                    .getter()
                    .map(|g| g.invocation_key().to_string())
                    .unwrap_or_else(|| format!("get_{name}"));
                let result = self.invoke_raw(&key, &[], &[])?;
                self.unmarshal(result)
            }
            Member::Methods(_) | Member::Constructors(_) | Member::Event(_) => {
                Err(Error::Marshal(format!(
                    "member '{name}' of {} is not readable",
                    self.node.full_name
                )))
            }
            Member::NotFound => Err(Error::MemberNotFound {
                type_name: self.node.full_name.clone(),
                member: name.to_string(),
            }),
        }
    }

    /// Write a field or property
    pub fn set(&self, name: &str, value: &Arg) -> Result<()> {
        match self.member(name) {
            Member::Field(_) => {
                let wire = self.marshal(value)?;
                match &self.handle {
                    Some(handle) => handle.set_field(name, &wire),
                    None => self.agent.set_field(0, &self.node.full_name, name, &wire),
                }
            }
            Member::Property(property) => {
                let key = property
                    .setter()
                    .map(|s| s.invocation_key().to_string())
                    .unwrap_or_else(|| format!("set_{name}"));
                self.invoke_raw(&key, &[], &[self.marshal(value)?])?;
                Ok(())
            }
            Member::Methods(_) | Member::Constructors(_) | Member::Event(_) => {
                Err(Error::Marshal(format!(
                    "member '{name}' of {} is not writable",
                    self.node.full_name
                )))
            }
            Member::NotFound => Err(Error::MemberNotFound {
                type_name: self.node.full_name.clone(),
                member: name.to_string(),
            }),
        }
    }

    /// Invoke a method, resolving overloads by argument count
    pub fn invoke(&self, name: &str, args: &[Arg]) -> Result<Returned> {
        let candidates = self.node.methods_named(name);
        if candidates.is_empty() {
            return Err(Error::MemberNotFound {
                type_name: self.node.full_name.clone(),
                member: name.to_string(),
            });
        }

        let closed: Vec<_> = candidates
            .iter()
            .filter(|m| !m.contains_open_generics)
            .collect();
        if closed.is_empty() {
            return Err(Error::OpenGenerics {
                type_name: self.node.full_name.clone(),
                method: name.to_string(),
            });
        }

        let matching: Vec<_> = closed.iter().filter(|m| m.arity() == args.len()).collect();
        let method = match matching.as_slice() {
            [] => {
                return Err(Error::MemberNotFound {
                    type_name: self.node.full_name.clone(),
                    member: format!("{name} taking {} argument(s)", args.len()),
                })
            }
            [one] => *one,
            many => {
                return Err(Error::AmbiguousOverload {
                    type_name: self.node.full_name.clone(),
                    method: name.to_string(),
                    arity: args.len(),
                    candidates: many.len(),
                })
            }
        };

        let wire_args = self.marshal_all(args)?;
        let result = self.invoke_raw(method.invocation_key(), &[], &wire_args)?;
        self.unmarshal(result)
    }

    /// Invoke an open generic method with explicit instantiation
    /// arguments.
    pub fn invoke_generic(
        &self,
        name: &str,
        generic_args: &[String],
        args: &[Arg],
    ) -> Result<Returned> {
        let candidates = self.node.methods_named(name);
        if candidates.is_empty() {
            return Err(Error::MemberNotFound {
                type_name: self.node.full_name.clone(),
                member: name.to_string(),
            });
        }

        let matching: Vec<_> = candidates
            .iter()
            .filter(|m| m.generic_params.len() == generic_args.len() && m.arity() == args.len())
            .collect();
        let method = match matching.as_slice() {
            [] => {
                return Err(Error::MemberNotFound {
                    type_name: self.node.full_name.clone(),
                    member: format!(
                        "{name}<{}> taking {} argument(s)",
                        generic_args.join(", "),
                        args.len()
                    ),
                })
            }
            [one] => *one,
            many => {
                return Err(Error::AmbiguousOverload {
                    type_name: self.node.full_name.clone(),
                    method: name.to_string(),
                    arity: args.len(),
                    candidates: many.len(),
                })
            }
        };

        let wire_args = self.marshal_all(args)?;
        let result = self.invoke_raw(method.invocation_key(), generic_args, &wire_args)?;
        self.unmarshal(result)
    }

    fn invoke_raw(
        &self,
        method_key: &str,
        generic_args: &[String],
        args: &[RemoteValue],
    ) -> Result<Option<RemoteValue>> {
        trace!(
            target: "marionette::proxy",
            type_full_name = %self.node.full_name,
            method_key = method_key,
            args = args.len(),
            "Dispatching invocation"
        );
        match &self.handle {
            Some(handle) => handle.invoke(method_key, generic_args, args),
            None => self
                .agent
                .invoke(0, &self.node.full_name, method_key, generic_args, args),
        }
    }

    pub(crate) fn marshal_all(&self, args: &[Arg]) -> Result<Vec<RemoteValue>> {
        args.iter().map(|a| self.marshal(a)).collect()
    }

    /// Marshal one argument for the wire
    fn marshal(&self, arg: &Arg) -> Result<RemoteValue> {
        match arg {
            Arg::Null => Ok(RemoteValue::Null),
            Arg::Enum { type_name, member } => {
                // Resolved to a remote token through a static read of
                // the named enum member; an enum is never encoded as a
                // raw primitive.
                let value = self.agent.get_field(0, type_name, member)?;
                match value {
                    token @ RemoteValue::Remote { .. } => Ok(token),
                    other => Err(Error::Marshal(format!(
                        "enum member {type_name}.{member} resolved to a non-remote value: {other:?}"
                    ))),
                }
            }
            Arg::Primitive(value) => Ok(RemoteValue::primitive(value)),
            Arg::Object(handle) => {
                if handle.is_released() {
                    return Err(Error::UseAfterRelease(handle.address()));
                }
                Ok(RemoteValue::Remote {
                    address: handle.address(),
                    type_name: handle.type_full_name().to_string(),
                })
            }
            Arg::Type { module, full_name } => Ok(RemoteValue::TypeRef {
                module: module.clone(),
                full_name: full_name.clone(),
            }),
        }
    }

    /// Unmarshal an invocation result
    pub(crate) fn unmarshal(&self, value: Option<RemoteValue>) -> Result<Returned> {
        let Some(value) = value else {
            return Ok(Returned::Void);
        };
        if value.is_null() {
            return Ok(Returned::Null);
        }
        match value {
            RemoteValue::Primitive { type_name, payload } => Ok(Returned::Primitive(
                PrimitiveValue::decode(&type_name, &payload)?,
            )),
            RemoteValue::Remote { address, type_name } => {
                let node = self.builder.get_or_build(None, &type_name)?;
                let handle = Arc::new(ObjectHandle::new(
                    Arc::clone(&self.agent),
                    address,
                    &type_name,
                ));
                Ok(Returned::Object(RemoteObject::new(
                    Arc::clone(&self.agent),
                    Arc::clone(&self.builder),
                    node,
                    Some(handle),
                )))
            }
            RemoteValue::TypeRef { module, full_name } => {
                let node = self.builder.get_or_build(module.as_deref(), &full_name)?;
                Ok(Returned::Object(RemoteObject::new(
                    Arc::clone(&self.agent),
                    Arc::clone(&self.builder),
                    node,
                    None,
                )))
            }
            RemoteValue::Null => Ok(Returned::Null),
        }
    }
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject")
            .field("type", &self.node.full_name)
            .field("address", &format_args!("{:#x}", self.address()))
            .finish()
    }
}
