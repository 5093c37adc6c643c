//! Native RTTI backend
//!
//! Native metadata is reconstructed from virtual tables and export
//! scans, so only constructors, methods and named vtable entry points
//! exist. Fields, properties and events in a native descriptor are
//! scanner noise and dropped. Every function keeps its mangled name as
//! the invocation key; display names are ambiguous across overloads
//! and vtable slots.

use crate::metadata::{LazyTypeBinding, MethodNode, ParameterNode, TypeHint, TypeNode};
use marionette_common::types::{FunctionDescriptor, TypeDescriptor};
use std::sync::Arc;
use tracing::warn;

pub(super) fn attach_members(node: &Arc<TypeNode>, descriptor: &TypeDescriptor) {
    for function in &descriptor.methods {
        let method = Arc::new(build_function(function));
        method.set_declaring(node);
        node.methods.push(method);
    }
    for function in &descriptor.constructors {
        let ctor = Arc::new(build_function(function));
        ctor.set_declaring(node);
        node.constructors.push(ctor);
    }

    if !descriptor.fields.is_empty()
        || !descriptor.properties.is_empty()
        || !descriptor.events.is_empty()
    {
        warn!(
            target: "marionette::graph",
            full_name = %descriptor.full_name,
            "Native descriptor carried field/property/event entries; dropped"
        );
    }
}

fn build_function(function: &FunctionDescriptor) -> MethodNode {
    if function.binary_name.is_none() {
        warn!(
            target: "marionette::graph",
            name = %function.name,
            "Native function without a mangled name; falling back to display name"
        );
    }
    let parameters = function
        .parameters
        .iter()
        .map(|p| ParameterNode {
            name: p.name.clone(),
            binding: LazyTypeBinding::new(TypeHint::from_ref(&p.type_ref, &[])),
        })
        .collect();
    let return_type = function
        .return_type
        .as_ref()
        .map(|r| LazyTypeBinding::new(TypeHint::from_ref(r, &[])));

    MethodNode::new(
        &function.name,
        function.binary_name.clone(),
        Vec::new(),
        return_type,
        parameters,
        function.address,
    )
}
