//! Managed metadata backend
//!
//! Managed descriptors carry the full member surface. Property
//! accessors and event add/remove pairs arrive as ordinary methods and
//! are linked to their member by the `get_X`/`set_X`/`add_X`/`remove_X`
//! name convention, after all methods have been attached.

use crate::metadata::{
    EventNode, FieldNode, LazyTypeBinding, MethodNode, ParameterNode, PropertyNode, TypeHint,
    TypeNode,
};
use marionette_common::types::{FunctionDescriptor, TypeDescriptor};
use std::sync::Arc;

pub(super) fn attach_members(node: &Arc<TypeNode>, descriptor: &TypeDescriptor) {
    for function in &descriptor.methods {
        let method = Arc::new(build_method(function));
        method.set_declaring(node);
        node.methods.push(method);
    }
    for function in &descriptor.constructors {
        let ctor = Arc::new(build_method(function));
        ctor.set_declaring(node);
        node.constructors.push(ctor);
    }
    for field in &descriptor.fields {
        let field_node = Arc::new(FieldNode::new(
            &field.name,
            LazyTypeBinding::new(TypeHint::from_ref(&field.type_ref, &[])),
        ));
        field_node.set_declaring(node);
        node.fields.push(field_node);
    }
    for property in &descriptor.properties {
        node.properties.push(Arc::new(PropertyNode::new(
            &property.name,
            LazyTypeBinding::new(TypeHint::from_ref(&property.type_ref, &[])),
        )));
    }
    for event in &descriptor.events {
        node.events.push(Arc::new(EventNode::new(
            &event.name,
            LazyTypeBinding::new(TypeHint::from_ref(&event.type_ref, &[])),
        )));
    }

    link_accessors(node);
}

fn build_method(function: &FunctionDescriptor) -> MethodNode {
    let parameters = function
        .parameters
        .iter()
        .map(|p| ParameterNode {
            name: p.name.clone(),
            binding: LazyTypeBinding::new(TypeHint::from_ref(
                &p.type_ref,
                &function.generic_params,
            )),
        })
        .collect();
    let return_type = function
        .return_type
        .as_ref()
        .map(|r| LazyTypeBinding::new(TypeHint::from_ref(r, &function.generic_params)));

    MethodNode::new(
        &function.name,
        function.binary_name.clone(),
        function.generic_params.clone(),
        return_type,
        parameters,
        function.address,
    )
}

/// Wire properties and events to their accessor methods by name
/// convention. Runs after every method is attached so ordering inside
/// the descriptor does not matter.
fn link_accessors(node: &Arc<TypeNode>) {
    for (_, property) in node.properties.iter() {
        for method in node.methods_named(&format!("get_{}", property.name)) {
            property.link_getter(method);
        }
        for method in node.methods_named(&format!("set_{}", property.name)) {
            property.link_setter(method);
        }
    }
    for (_, event) in node.events.iter() {
        for method in node.methods_named(&format!("add_{}", event.name)) {
            event.link_add(method);
        }
        for method in node.methods_named(&format!("remove_{}", event.name)) {
            event.link_remove(method);
        }
    }
}
