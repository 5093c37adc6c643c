//! Type graph builder
//!
//! Turns incremental type descriptor messages into published
//! [`TypeNode`]s. Nodes are allocated empty and parked in an
//! in-progress map before members are attached, so a cyclic reference
//! back into a type under construction finds the same instance instead
//! of recursing. Everything a member depends on is bound lazily; a
//! dependent type is only fetched when a caller actually dereferences
//! the binding, and a failure on one member never poisons its siblings.
//!
//! Two backends share the algorithm: the managed backend links property
//! accessors and event add/remove pairs by name convention after all
//! methods exist, and the native backend keys every function by its
//! mangled name and registers the type under its vtable address.

mod managed;
mod native;

use crate::cache::ResolverCache;
use crate::metadata::{DependentTypeResolver, LazyTypeBinding, TypeHint, TypeNode};
use crate::providers::TypeDumpProvider;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use marionette_common::error::{Error, Result};
use marionette_common::screening::screen_type_name;
use marionette_common::types::{RuntimeKind, TypeDescriptor};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cycle-safe builder of the reconstructed type graph
pub struct TypeGraphBuilder {
    cache: Arc<ResolverCache>,
    provider: Arc<dyn TypeDumpProvider>,
    /// Nodes allocated but not yet published, keyed by (module,
    /// full-name). Only dependent resolution during member attachment
    /// ever sees these; the cache and `get_or_build` never hand out a
    /// partially-built node.
    in_progress: DashMap<(String, String), Arc<TypeNode>>,
    /// Placeholder nodes for open generic parameters, one per name
    placeholders: DashMap<String, Arc<TypeNode>>,
}

impl TypeGraphBuilder {
    pub fn new(cache: Arc<ResolverCache>, provider: Arc<dyn TypeDumpProvider>) -> Self {
        Self {
            cache,
            provider,
            in_progress: DashMap::new(),
            placeholders: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &Arc<ResolverCache> {
        &self.cache
    }

    /// Resolve a (module, full-name) pair to a published node, fetching
    /// a descriptor from the agent on a cache miss.
    pub fn get_or_build(&self, module: Option<&str>, full_name: &str) -> Result<Arc<TypeNode>> {
        if let Some(node) = self.cache.resolve(module, full_name) {
            return Ok(node);
        }

        // Screen before spending a network round-trip
        screen_type_name(full_name)?;

        let descriptor = self.provider.dump_type(module, full_name)?;
        self.build_from_descriptor(&descriptor)
    }

    /// Build and publish a node from a descriptor already in hand
    pub fn build_from_descriptor(&self, descriptor: &TypeDescriptor) -> Result<Arc<TypeNode>> {
        if let Some(node) = self
            .cache
            .resolve(Some(&descriptor.module), &descriptor.full_name)
        {
            return Ok(node);
        }
        screen_type_name(&descriptor.full_name)?;

        let base = descriptor
            .base
            .as_ref()
            .map(|b| LazyTypeBinding::new(TypeHint::from_ref(b, &[])));

        let node = Arc::new(
            TypeNode::remote(
                &descriptor.module,
                &descriptor.full_name,
                descriptor.runtime,
                descriptor.is_array,
                base,
            )
            .with_vtable(
                descriptor.vtable_address,
                descriptor.vtable_entries.clone(),
            ),
        );

        // Claim the in-progress slot before member attachment, so
        // cyclic back-references during attachment land on this same
        // instance. A loser of a concurrent build for the same type
        // waits for the winner's published node instead of circulating
        // a second instance.
        let key = (descriptor.module.clone(), descriptor.full_name.clone());
        match self.in_progress.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&node));
            }
            Entry::Occupied(_) => {
                return self.wait_for_publication(&descriptor.module, &descriptor.full_name);
            }
        }

        match descriptor.runtime {
            RuntimeKind::Managed => managed::attach_members(&node, descriptor),
            RuntimeKind::Native => native::attach_members(&node, descriptor),
        }

        // Published before the in-progress entry is dropped, so a
        // waiter never observes both maps empty
        self.cache
            .register(&descriptor.module, &descriptor.full_name, Arc::clone(&node));

        if descriptor.runtime == RuntimeKind::Native {
            if let Some(vtable) = descriptor.vtable_address {
                self.cache.register_vtable(vtable, Arc::clone(&node));
            }
        }
        self.in_progress.remove(&key);

        debug!(
            target: "marionette::graph",
            module = %descriptor.module,
            full_name = %descriptor.full_name,
            runtime = %descriptor.runtime,
            methods = node.methods.count(),
            fields = node.fields.count(),
            "Published type node"
        );
        Ok(node)
    }

    /// Spin until a concurrent builder publishes the node this thread
    /// lost the claim for
    fn wait_for_publication(&self, module: &str, full_name: &str) -> Result<Arc<TypeNode>> {
        let key = (module.to_string(), full_name.to_string());
        loop {
            if let Some(node) = self.cache.resolve(Some(module), full_name) {
                return Ok(node);
            }
            if !self.in_progress.contains_key(&key) {
                return Err(Error::TypeResolution {
                    name: full_name.to_string(),
                    reason: "concurrent build abandoned without publishing".to_string(),
                });
            }
            std::thread::yield_now();
        }
    }

    fn lookup_in_progress(&self, module: Option<&str>, full_name: &str) -> Option<Arc<TypeNode>> {
        match module {
            Some(module) => self
                .in_progress
                .get(&(module.to_string(), full_name.to_string()))
                .map(|node| Arc::clone(&node)),
            None => self
                .in_progress
                .iter()
                .find(|entry| entry.key().1 == full_name)
                .map(|entry| Arc::clone(entry.value())),
        }
    }

    /// Placeholder node for an open generic parameter, one instance
    /// per parameter name
    fn placeholder(&self, name: &str) -> Arc<TypeNode> {
        let entry = self
            .placeholders
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TypeNode::placeholder(name)));
        Arc::clone(&entry)
    }
}

impl DependentTypeResolver for TypeGraphBuilder {
    fn resolve_dependent(&self, hint: &TypeHint) -> Result<Arc<TypeNode>> {
        if hint.is_generic_param {
            return Ok(self.placeholder(&hint.full_name));
        }

        screen_type_name(&hint.full_name)?;

        if let Some(node) = self.cache.resolve(hint.module.as_deref(), &hint.full_name) {
            return Ok(node);
        }
        if let Some(node) = self.lookup_in_progress(hint.module.as_deref(), &hint.full_name) {
            return Ok(node);
        }

        let descriptor = self
            .provider
            .dump_type(hint.module.as_deref(), &hint.full_name)
            .map_err(|e| {
                warn!(
                    target: "marionette::graph",
                    full_name = %hint.full_name,
                    error = %e,
                    "Dependent type dump failed"
                );
                match e {
                    e @ (Error::PathologicalType { .. } | Error::TypeResolution { .. }) => e,
                    other => Error::TypeResolution {
                        name: hint.full_name.clone(),
                        reason: other.to_string(),
                    },
                }
            })?;
        self.build_from_descriptor(&descriptor)
    }
}
