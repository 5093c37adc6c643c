//! Resolver cache
//!
//! Memoized store mapping (module, full-name) to published type nodes,
//! with a secondary index keyed by virtual-table address for native
//! type identification. Entries are only ever added or looked up,
//! never mutated after publication; registration is idempotent and
//! order-insensitive. Partially-constructed nodes never appear here;
//! they live only in the builder's internal in-progress map.

use crate::metadata::TypeNode;
use dashmap::DashMap;
use marionette_common::primitives::PrimitiveKind;
use std::sync::Arc;
use tracing::debug;

/// Core library types the controller knows locally. Requests for these
/// names are answered with a Local-origin stand-in instead of a network
/// fetch, so later operations on them still route through remote
/// dispatch rather than being treated as ordinary local objects.
const WELL_KNOWN_LOCAL_TYPES: &[&str] = &[
    "System.Object",
    "System.Type",
    "System.Enum",
    "System.Array",
    "System.Exception",
    "System.Delegate",
    "System.MulticastDelegate",
    "System.EventArgs",
    "System.EventHandler",
    "System.Action",
    "System.DateTime",
    "System.TimeSpan",
    "System.Guid",
    "System.Text.StringBuilder",
    "System.IO.Stream",
    "System.Collections.ArrayList",
    "System.Collections.Hashtable",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TypeKey {
    module: String,
    full_name: String,
}

/// Process-shareable memoized type store
pub struct ResolverCache {
    by_key: DashMap<TypeKey, Arc<TypeNode>>,
    by_name: DashMap<String, Arc<TypeNode>>,
    by_vtable: DashMap<u64, Arc<TypeNode>>,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self {
            by_key: DashMap::new(),
            by_name: DashMap::new(),
            by_vtable: DashMap::new(),
        }
    }

    /// Store (overwrite) the mapping for a published node
    pub fn register(&self, module: &str, full_name: &str, node: Arc<TypeNode>) {
        debug!(
            target: "marionette::cache",
            module = module,
            full_name = full_name,
            "Registering type node"
        );
        self.by_key.insert(
            TypeKey {
                module: module.to_string(),
                full_name: full_name.to_string(),
            },
            Arc::clone(&node),
        );
        self.by_name.insert(full_name.to_string(), node);
    }

    /// Look up a published node.
    ///
    /// A miss for a locally-known non-primitive name is answered by
    /// wrapping the local knowledge into a stand-in node and
    /// registering it, so the answer is the same instance next time.
    pub fn resolve(&self, module: Option<&str>, full_name: &str) -> Option<Arc<TypeNode>> {
        if let Some(module) = module {
            let key = TypeKey {
                module: module.to_string(),
                full_name: full_name.to_string(),
            };
            if let Some(node) = self.by_key.get(&key) {
                return Some(Arc::clone(&node));
            }
        }
        if let Some(node) = self.by_name.get(full_name) {
            return Some(Arc::clone(&node));
        }

        self.wrap_local(full_name)
    }

    /// Wrap a locally-known type as a Local-origin stand-in.
    ///
    /// Only non-primitive well-known names qualify; primitives marshal
    /// as encoded payloads and never need a node.
    fn wrap_local(&self, full_name: &str) -> Option<Arc<TypeNode>> {
        if PrimitiveKind::from_type_name(full_name).is_some() {
            return None;
        }
        if !WELL_KNOWN_LOCAL_TYPES.contains(&full_name) {
            return None;
        }

        // entry() keeps concurrent wrappers agreeing on one instance
        let node = self
            .by_name
            .entry(full_name.to_string())
            .or_insert_with(|| {
                debug!(
                    target: "marionette::cache",
                    full_name = full_name,
                    "Wrapping locally-known type as remote stand-in"
                );
                Arc::new(TypeNode::local_stand_in(full_name))
            });
        Some(Arc::clone(&node))
    }

    /// Register a native node under its vtable address
    pub fn register_vtable(&self, address: u64, node: Arc<TypeNode>) {
        self.by_vtable.insert(address, node);
    }

    /// Identify a native type by vtable address
    pub fn resolve_vtable(&self, address: u64) -> Option<Arc<TypeNode>> {
        self.by_vtable.get(&address).map(|n| Arc::clone(&n))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for ResolverCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TypeOrigin;
    use marionette_common::types::RuntimeKind;

    fn node(module: &str, full_name: &str) -> Arc<TypeNode> {
        Arc::new(TypeNode::remote(
            module,
            full_name,
            RuntimeKind::Managed,
            false,
            None,
        ))
    }

    #[test]
    fn test_register_and_resolve() {
        let cache = ResolverCache::new();
        let player = node("Game.dll", "Game.Player");
        cache.register("Game.dll", "Game.Player", Arc::clone(&player));

        let found = cache.resolve(Some("Game.dll"), "Game.Player").unwrap();
        assert!(Arc::ptr_eq(&found, &player));
    }

    #[test]
    fn test_resolve_twice_returns_same_instance() {
        let cache = ResolverCache::new();
        cache.register("Game.dll", "Game.Foo", node("Game.dll", "Game.Foo"));

        let first = cache.resolve(Some("Game.dll"), "Game.Foo").unwrap();
        let second = cache.resolve(Some("Game.dll"), "Game.Foo").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_resolve_without_module() {
        let cache = ResolverCache::new();
        let player = node("Game.dll", "Game.Player");
        cache.register("Game.dll", "Game.Player", Arc::clone(&player));

        let found = cache.resolve(None, "Game.Player").unwrap();
        assert!(Arc::ptr_eq(&found, &player));
    }

    #[test]
    fn test_unknown_type_is_absent() {
        let cache = ResolverCache::new();
        assert!(cache.resolve(Some("Game.dll"), "Game.Missing").is_none());
    }

    #[test]
    fn test_local_type_wrapped_once() {
        let cache = ResolverCache::new();
        let first = cache.resolve(None, "System.Text.StringBuilder").unwrap();
        assert_eq!(first.origin, TypeOrigin::Local);

        let second = cache.resolve(None, "System.Text.StringBuilder").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_primitive_never_wrapped() {
        let cache = ResolverCache::new();
        assert!(cache.resolve(None, "System.Int32").is_none());
        assert!(cache.resolve(None, "System.String").is_none());
    }

    #[test]
    fn test_registration_overwrites() {
        let cache = ResolverCache::new();
        let first = node("Game.dll", "Game.Player");
        let second = node("Game.dll", "Game.Player");
        cache.register("Game.dll", "Game.Player", first);
        cache.register("Game.dll", "Game.Player", Arc::clone(&second));

        let found = cache.resolve(Some("Game.dll"), "Game.Player").unwrap();
        assert!(Arc::ptr_eq(&found, &second));
    }

    #[test]
    fn test_vtable_index() {
        let cache = ResolverCache::new();
        let renderer = Arc::new(TypeNode::remote(
            "engine.dll",
            "engine::Renderer",
            RuntimeKind::Native,
            false,
            None,
        ));
        cache.register_vtable(0x1400A0000, Arc::clone(&renderer));

        let found = cache.resolve_vtable(0x1400A0000).unwrap();
        assert!(Arc::ptr_eq(&found, &renderer));
        assert!(cache.resolve_vtable(0xDEAD).is_none());
    }
}
