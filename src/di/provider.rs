//! Service provider
//!
//! Resolves registrations by type, caching per lifetime, and disposes
//! what it created.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::collection::{
    downcast_instance, Disposer, Instance, Lifetime, ServiceDescriptor, ServiceKey,
};
use super::error::{DisposeError, ResolveError};
use crate::scope::{ScopeLevel, ScopeNode};

type Slot = Arc<Mutex<Option<Instance>>>;

pub(crate) struct ProviderInner {
    registry: Arc<HashMap<ServiceKey, Vec<ServiceDescriptor>>>,
    root: Option<ServiceProvider>,
    node: Option<Arc<ScopeNode>>,
    slots: Mutex<HashMap<(ServiceKey, usize), Slot>>,
    disposables: Mutex<Vec<(ServiceKey, Instance, Disposer)>>,
    disposed: AtomicBool,
}

impl ProviderInner {
    fn dispose(&self) -> Result<(), DisposeError> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let created = std::mem::take(&mut *self.disposables.lock());
        let mut failures = Vec::new();

        for (key, instance, disposer) in created.into_iter().rev() {
            if let Err(err) = disposer(&instance) {
                failures.push(format!("{key}: {err:#}"));
            }
        }
        self.slots.lock().clear();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DisposeError {
                scope: self.node.as_ref().map(|n| n.level()),
                failures,
            })
        }
    }
}

impl Drop for ProviderInner {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!("Disposal on drop failed: {}", err);
        }
    }
}

/// Resolves services. Cloning is cheap and yields a handle to the same scope.
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

impl ServiceProvider {
    pub(crate) fn root(registry: HashMap<ServiceKey, Vec<ServiceDescriptor>>) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                registry: Arc::new(registry),
                root: None,
                node: None,
                slots: Mutex::new(HashMap::new()),
                disposables: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Child provider carrying a scope node that points back at it.
    pub(crate) fn child_with_node(
        &self,
        level: ScopeLevel,
        parent: Option<Arc<ScopeNode>>,
    ) -> Self {
        let root = self.root_provider();
        let registry = self.inner.registry.clone();
        let inner = Arc::new_cyclic(|weak: &Weak<ProviderInner>| ProviderInner {
            registry,
            root: Some(root),
            node: Some(Arc::new(ScopeNode::new(level, parent, weak.clone()))),
            slots: Mutex::new(HashMap::new()),
            disposables: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        });
        Self { inner }
    }

    pub(crate) fn from_weak(weak: &Weak<ProviderInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Plain child scope without a scope node.
    pub fn create_scope(&self) -> ServiceProvider {
        let inner = Arc::new(ProviderInner {
            registry: self.inner.registry.clone(),
            root: Some(self.root_provider()),
            node: None,
            slots: Mutex::new(HashMap::new()),
            disposables: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        });
        Self { inner }
    }

    pub fn is_root(&self) -> bool {
        self.inner.root.is_none()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// The scope node this provider was opened for, if any.
    pub fn scope_node(&self) -> Option<&Arc<ScopeNode>> {
        self.inner.node.as_ref()
    }

    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.inner.registry.contains_key(&ServiceKey::of::<T>())
    }

    /// Resolve the last registration for `T`, or `None` when unregistered.
    pub fn get<T>(&self) -> Result<Option<Arc<T>>, ResolveError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<T>();
        match self.get_instance(key)? {
            Some(instance) => downcast_instance::<T>(&instance)
                .map(Some)
                .ok_or(ResolveError::NotRegistered(key.type_name())),
            None => Ok(None),
        }
    }

    /// Resolve `T`, failing when it is not registered.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        self.get::<T>()?
            .ok_or_else(|| ResolveError::NotRegistered(ServiceKey::of::<T>().type_name()))
    }

    /// Resolve every registration for `T` in registration order.
    pub fn get_all<T>(&self) -> Result<Vec<Arc<T>>, ResolveError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<T>();
        let count = self.inner.registry.get(&key).map_or(0, Vec::len);
        let mut services = Vec::with_capacity(count);
        for index in 0..count {
            let instance = self.resolve_descriptor(key, index)?;
            if let Some(service) = downcast_instance::<T>(&instance) {
                services.push(service);
            }
        }
        Ok(services)
    }

    /// Type-erased resolution of the last registration for `key`.
    pub fn get_instance(&self, key: ServiceKey) -> Result<Option<Instance>, ResolveError> {
        match self.inner.registry.get(&key).map(Vec::len) {
            Some(count) if count > 0 => self.resolve_descriptor(key, count - 1).map(Some),
            _ => Ok(None),
        }
    }

    /// Dispose every instance this provider created, newest first.
    /// Calling it again is a no-op.
    pub fn dispose(&self) -> Result<(), DisposeError> {
        self.inner.dispose()
    }

    fn root_provider(&self) -> ServiceProvider {
        match &self.inner.root {
            Some(root) => root.clone(),
            None => self.clone(),
        }
    }

    fn descriptor(
        &self,
        key: ServiceKey,
        index: usize,
    ) -> Result<&ServiceDescriptor, ResolveError> {
        self.inner
            .registry
            .get(&key)
            .and_then(|descriptors| descriptors.get(index))
            .ok_or(ResolveError::NotRegistered(key.type_name()))
    }

    fn resolve_descriptor(&self, key: ServiceKey, index: usize) -> Result<Instance, ResolveError> {
        if self.is_disposed() {
            return Err(ResolveError::Disposed);
        }

        match self.descriptor(key, index)?.lifetime {
            Lifetime::Transient => self.create(key, index),
            Lifetime::Singleton => self.root_provider().cached(key, index),
            Lifetime::Scoped if self.is_root() => {
                Err(ResolveError::ScopedFromRoot(key.type_name()))
            }
            Lifetime::Scoped => self.cached(key, index),
            Lifetime::Named(level) => self.resolve_named(key, index, level),
        }
    }

    fn resolve_named(
        &self,
        key: ServiceKey,
        index: usize,
        level: ScopeLevel,
    ) -> Result<Instance, ResolveError> {
        let start = self.scope_node().ok_or(ResolveError::MissingLifetime {
            service: key.type_name(),
            wanted: level,
            from: None,
        })?;

        let owner = start.find(level).ok_or(ResolveError::MissingLifetime {
            service: key.type_name(),
            wanted: level,
            from: Some(start.level()),
        })?;

        if Arc::ptr_eq(&owner, start) {
            return self.cached(key, index);
        }

        debug!("Delegating {} to owning {} scope", key, level);
        let provider = owner.provider().ok_or(ResolveError::OwnerDisposed(level))?;
        provider.resolve_descriptor(key, index)
    }

    fn cached(&self, key: ServiceKey, index: usize) -> Result<Instance, ResolveError> {
        let slot = self.inner.slots.lock().entry((key, index)).or_default().clone();

        // Held across the factory call so concurrent callers see one instance.
        let mut value = slot.lock();
        if let Some(instance) = value.as_ref() {
            return Ok(instance.clone());
        }

        let instance = self.create(key, index)?;
        *value = Some(instance.clone());
        Ok(instance)
    }

    fn create(&self, key: ServiceKey, index: usize) -> Result<Instance, ResolveError> {
        let descriptor = self.descriptor(key, index)?;
        let instance = (descriptor.factory)(self).map_err(|err| ResolveError::Factory {
            service: key.type_name(),
            message: format!("{err:#}"),
        })?;

        if let Some(disposer) = &descriptor.disposer {
            self.inner
                .disposables
                .lock()
                .push((key, instance.clone(), disposer.clone()));
        }
        Ok(instance)
    }
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("root", &self.is_root())
            .field("scope", &self.scope_node().map(|n| n.level()))
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
