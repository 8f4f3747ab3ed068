//! Service registrations
//!
//! A list of service descriptors, built into a [`ServiceProvider`].

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::provider::ServiceProvider;
use crate::scope::ScopeLevel;

/// A type-erased service instance. The concrete value is always an `Arc<T>`.
pub type Instance = Arc<dyn Any + Send + Sync>;

pub(crate) type Factory = Arc<dyn Fn(&ServiceProvider) -> anyhow::Result<Instance> + Send + Sync>;
pub(crate) type Disposer = Arc<dyn Fn(&Instance) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a shared value as an [`Instance`].
pub fn instance_of<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Instance {
    Arc::new(value)
}

/// Recover the shared value from an [`Instance`] created for `T`.
pub fn downcast_instance<T>(instance: &Instance) -> Option<Arc<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    instance.downcast_ref::<Arc<T>>().cloned()
}

/// Identity of a service: its type id plus the type name for messages.
#[derive(Clone, Copy)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({})", self.name)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// How long a resolved instance lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// One instance for the root provider.
    Singleton,
    /// One instance per provider scope.
    Scoped,
    /// A new instance per resolution.
    Transient,
    /// One instance per instance of the named ancestor scope.
    Named(ScopeLevel),
}

/// Services that release resources when their owning scope closes.
pub trait Dispose: Send + Sync {
    fn dispose(&self) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub(crate) struct ServiceDescriptor {
    pub(crate) key: ServiceKey,
    pub(crate) lifetime: Lifetime,
    pub(crate) factory: Factory,
    pub(crate) disposer: Option<Disposer>,
}

/// Ordered service registrations.
#[derive(Clone, Default)]
pub struct ServiceCollection {
    descriptors: Vec<ServiceDescriptor>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `T` with the given lifetime.
    pub fn add<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.push::<T, F>(lifetime, factory, None)
    }

    pub fn add_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.add(Lifetime::Singleton, factory)
    }

    pub fn add_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.add(Lifetime::Scoped, factory)
    }

    pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.add(Lifetime::Transient, factory)
    }

    /// Register `T` as owned by the nearest ancestor scope of `level`.
    pub fn add_lifetime_scoped<T, F>(&mut self, level: ScopeLevel, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.add(Lifetime::Named(level), factory)
    }

    /// Register an existing value as a singleton.
    pub fn add_instance<T>(&mut self, value: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.add(Lifetime::Singleton, move |_| Ok(value.clone()))
    }

    /// Register a factory whose instances are disposed with their owning scope.
    pub fn add_disposable<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: ?Sized + Dispose + 'static,
        F: Fn(&ServiceProvider) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        let disposer: Disposer = Arc::new(|instance: &Instance| {
            match downcast_instance::<T>(instance) {
                Some(service) => service.dispose(),
                None => Ok(()),
            }
        });
        self.push::<T, F>(lifetime, factory, Some(disposer))
    }

    /// Drop every registration for `T`.
    pub fn remove_all<T: ?Sized + 'static>(&mut self) -> &mut Self {
        let key = ServiceKey::of::<T>();
        self.descriptors.retain(|d| d.key != key);
        self
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        let key = ServiceKey::of::<T>();
        self.descriptors.iter().any(|d| d.key == key)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Freeze the registrations into a root provider.
    pub fn build(self) -> ServiceProvider {
        let mut registry: HashMap<ServiceKey, Vec<ServiceDescriptor>> = HashMap::new();
        for descriptor in self.descriptors {
            registry.entry(descriptor.key).or_default().push(descriptor);
        }
        ServiceProvider::root(registry)
    }

    fn push<T, F>(
        &mut self,
        lifetime: Lifetime,
        factory: F,
        disposer: Option<Disposer>,
    ) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        let factory: Factory =
            Arc::new(move |provider: &ServiceProvider| -> anyhow::Result<Instance> {
                Ok(instance_of(factory(provider)?))
            });
        self.descriptors.push(ServiceDescriptor {
            key: ServiceKey::of::<T>(),
            lifetime,
            factory,
            disposer,
        });
        self
    }
}

impl fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.descriptors.iter().map(|d| (d.key, d.lifetime)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[test]
    fn test_instance_round_trip_for_trait_objects() {
        let greeter: Arc<dyn Greeter> = Arc::new(English);
        let instance = instance_of(greeter);

        let back = downcast_instance::<dyn Greeter>(&instance).unwrap();
        assert_eq!(back.greet(), "hello");
        assert!(downcast_instance::<String>(&instance).is_none());
    }

    #[test]
    fn test_remove_all_and_contains() {
        let mut services = ServiceCollection::new();
        services
            .add_singleton::<String, _>(|_| Ok(Arc::new("a".to_string())))
            .add_transient::<u32, _>(|_| Ok(Arc::new(1)))
            .add_singleton::<String, _>(|_| Ok(Arc::new("b".to_string())));

        assert_eq!(services.len(), 3);
        assert!(services.contains::<String>());

        services.remove_all::<String>();
        assert_eq!(services.len(), 1);
        assert!(!services.contains::<String>());
        assert!(services.contains::<u32>());
    }

    #[test]
    fn test_service_key_equality_uses_type() {
        assert_eq!(ServiceKey::of::<String>(), ServiceKey::of::<String>());
        assert_ne!(ServiceKey::of::<String>(), ServiceKey::of::<u32>());
        assert_eq!(ServiceKey::of::<u32>().to_string(), "u32");
    }
}
