//! Deferred type bindings
//!
//! A [`LazyTypeBinding`] pairs a name triple with an eventually-resolved
//! type node. It is an explicit state machine: Unresolved, Resolving,
//! Resolved or Failed, with resolution triggered on first access and
//! memoized. Failures are sticky so a broken dependent type fails every
//! touch the same way instead of refetching.

use crate::metadata::TypeNode;
use marionette_common::error::{Error, Result};
use marionette_common::types::{short_name_of, TypeRef};
use parking_lot::Mutex;
use std::sync::Arc;

/// Name triple identifying a not-yet-resolved type
#[derive(Debug, Clone)]
pub struct TypeHint {
    pub module: Option<String>,
    pub full_name: String,
    pub short_name: String,
    /// True when the name is an open generic parameter of the
    /// declaring member (`T`, `TKey`, ...)
    pub is_generic_param: bool,
}

impl TypeHint {
    pub fn from_ref(type_ref: &TypeRef, generic_params: &[String]) -> Self {
        let is_generic_param = generic_params.iter().any(|p| p == &type_ref.full_name);
        Self {
            module: type_ref.module.clone(),
            short_name: short_name_of(&type_ref.full_name).to_string(),
            full_name: type_ref.full_name.clone(),
            is_generic_param,
        }
    }
}

/// Resolves a hint into a published type node.
///
/// Implemented by the type graph builder; bindings stay free of any
/// direct builder dependency so metadata nodes can be built and tested
/// in isolation.
pub trait DependentTypeResolver {
    fn resolve_dependent(&self, hint: &TypeHint) -> Result<Arc<TypeNode>>;
}

#[derive(Debug)]
enum BindingState {
    Unresolved,
    Resolving,
    Resolved(Arc<TypeNode>),
    Failed(String),
}

/// Deferred, memoized pairing of a name triple with a type node
pub struct LazyTypeBinding {
    hint: TypeHint,
    state: Mutex<BindingState>,
}

impl LazyTypeBinding {
    pub fn new(hint: TypeHint) -> Self {
        Self {
            hint,
            state: Mutex::new(BindingState::Unresolved),
        }
    }

    /// Binding that is already resolved to a known node
    pub fn bound(node: Arc<TypeNode>) -> Self {
        let hint = TypeHint {
            module: Some(node.module.clone()),
            full_name: node.full_name.clone(),
            short_name: node.name.clone(),
            is_generic_param: false,
        };
        Self {
            hint,
            state: Mutex::new(BindingState::Resolved(node)),
        }
    }

    pub fn hint(&self) -> &TypeHint {
        &self.hint
    }

    /// Full name, from the resolved node when available
    pub fn full_name(&self) -> String {
        match &*self.state.lock() {
            BindingState::Resolved(node) => node.full_name.clone(),
            _ => self.hint.full_name.clone(),
        }
    }

    /// Short name, from the resolved node when available
    pub fn short_name(&self) -> String {
        match &*self.state.lock() {
            BindingState::Resolved(node) => node.name.clone(),
            _ => self.hint.short_name.clone(),
        }
    }

    /// Owning module, from the resolved node when available
    pub fn module(&self) -> Option<String> {
        match &*self.state.lock() {
            BindingState::Resolved(node) => Some(node.module.clone()),
            _ => self.hint.module.clone(),
        }
    }

    /// The node, if resolution already succeeded
    pub fn try_resolved(&self) -> Option<Arc<TypeNode>> {
        match &*self.state.lock() {
            BindingState::Resolved(node) => Some(Arc::clone(node)),
            _ => None,
        }
    }

    /// True once resolution has failed (failures are sticky)
    pub fn is_failed(&self) -> bool {
        matches!(&*self.state.lock(), BindingState::Failed(_))
    }

    /// Resolve the binding, running the resolver at most once.
    ///
    /// A re-entrant call that observes `Resolving` fails instead of
    /// deadlocking; the in-progress map makes genuine cycles resolve
    /// through the builder rather than through binding re-entry.
    pub fn resolve(&self, resolver: &dyn DependentTypeResolver) -> Result<Arc<TypeNode>> {
        {
            let mut state = self.state.lock();
            match &*state {
                BindingState::Resolved(node) => return Ok(Arc::clone(node)),
                BindingState::Failed(reason) => {
                    return Err(Error::TypeResolution {
                        name: self.hint.full_name.clone(),
                        reason: reason.clone(),
                    })
                }
                BindingState::Resolving => {
                    return Err(Error::TypeResolution {
                        name: self.hint.full_name.clone(),
                        reason: "re-entrant resolution".to_string(),
                    })
                }
                BindingState::Unresolved => *state = BindingState::Resolving,
            }
        }

        // Lock released during the (possibly recursive) resolution
        let outcome = resolver.resolve_dependent(&self.hint);

        let mut state = self.state.lock();
        match outcome {
            Ok(node) => {
                *state = BindingState::Resolved(Arc::clone(&node));
                Ok(node)
            }
            Err(e) => {
                let reason = e.to_string();
                *state = BindingState::Failed(reason.clone());
                Err(Error::TypeResolution {
                    name: self.hint.full_name.clone(),
                    reason,
                })
            }
        }
    }
}

impl std::fmt::Debug for LazyTypeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyTypeBinding")
            .field("full_name", &self.hint.full_name)
            .field("state", &*self.state.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TypeNode;
    use marionette_common::types::RuntimeKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingResolver {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    impl DependentTypeResolver for CountingResolver {
        fn resolve_dependent(&self, hint: &TypeHint) -> Result<Arc<TypeNode>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Transport("agent unavailable".to_string()));
            }
            Ok(Arc::new(TypeNode::remote(
                "Game.dll",
                &hint.full_name,
                RuntimeKind::Managed,
                false,
                None,
            )))
        }
    }

    fn hint(full_name: &str) -> TypeHint {
        TypeHint {
            module: None,
            full_name: full_name.to_string(),
            short_name: short_name_of(full_name).to_string(),
            is_generic_param: false,
        }
    }

    #[test]
    fn test_identity_before_resolution() {
        let binding = LazyTypeBinding::new(hint("Game.World.Player"));
        assert_eq!(binding.full_name(), "Game.World.Player");
        assert_eq!(binding.short_name(), "Player");
        assert!(binding.module().is_none());
        assert!(binding.try_resolved().is_none());
    }

    #[test]
    fn test_resolution_runs_once() {
        let binding = LazyTypeBinding::new(hint("Game.Player"));
        let resolver = CountingResolver::new(false);

        let first = binding.resolve(&resolver).unwrap();
        let second = binding.resolve(&resolver).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_identity_after_resolution_comes_from_node() {
        let binding = LazyTypeBinding::new(hint("Game.Player"));
        let resolver = CountingResolver::new(false);
        binding.resolve(&resolver).unwrap();

        assert_eq!(binding.module().as_deref(), Some("Game.dll"));
        assert_eq!(binding.full_name(), "Game.Player");
    }

    #[test]
    fn test_failure_is_sticky() {
        let binding = LazyTypeBinding::new(hint("Game.Broken"));
        let resolver = CountingResolver::new(true);

        assert!(binding.resolve(&resolver).is_err());
        assert!(binding.is_failed());

        // Second attempt does not re-run the resolver
        let err = binding.resolve(&resolver).unwrap_err();
        assert!(matches!(err, Error::TypeResolution { .. }));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bound_binding_is_already_resolved() {
        let node = Arc::new(TypeNode::remote(
            "Game.dll",
            "Game.Player",
            RuntimeKind::Managed,
            false,
            None,
        ));
        let binding = LazyTypeBinding::bound(Arc::clone(&node));
        assert!(Arc::ptr_eq(&binding.try_resolved().unwrap(), &node));
    }

    #[test]
    fn test_generic_param_hint_detection() {
        let hint = TypeHint::from_ref(&TypeRef::new("T"), &["T".to_string()]);
        assert!(hint.is_generic_param);

        let hint = TypeHint::from_ref(&TypeRef::new("System.Int32"), &["T".to_string()]);
        assert!(!hint.is_generic_param);
    }
}
