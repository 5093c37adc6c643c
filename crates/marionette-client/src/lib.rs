//! Marionette Client
//!
//! Controller-side remote reflection engine. Reconstructs a stand-in
//! type system from incremental type-descriptor dumps produced by an
//! agent inside the target process, and turns reconstructed types plus
//! opaque remote handles into live operations: field/property access,
//! method and constructor invocation, event subscriptions and method
//! hooks.
//!
//! Entry point is [`session::RemoteSession`].

pub mod cache;
pub mod config;
pub mod graph;
pub mod handle;
pub mod metadata;
pub mod providers;
pub mod proxy;
pub mod reverse;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::ResolverCache;
pub use config::{RetryConfig, SessionConfig};
pub use graph::TypeGraphBuilder;
pub use handle::ObjectHandle;
pub use metadata::TypeNode;
pub use proxy::{Arg, RemoteObject, Returned};
pub use session::{EventSubscription, MethodHook, RemoteSession};
pub use transport::WireClient;

pub use marionette_common::{Error, Result};
