//! Dependency resolution primitive
//!
//! A small resolve-by-type container: registrations with lifetimes, scoped
//! providers, and disposal of what each provider created. Named lifetimes
//! delegate to the owning [`crate::scope::ScopeNode`].

mod collection;
mod error;
mod provider;

pub use collection::{
    downcast_instance, instance_of, Dispose, Instance, Lifetime, ServiceCollection, ServiceKey,
};
pub use error::{DisposeError, ResolveError};
pub(crate) use provider::ProviderInner;
pub use provider::ServiceProvider;
