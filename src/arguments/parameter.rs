//! Parameter descriptors
//!
//! What a constructor declares about each of its parameters.

use std::fmt;
use std::sync::Arc;

use crate::di::{instance_of, Instance, ServiceKey};

/// How a parameter may be satisfied when DI resolution finds nothing.
#[derive(Clone)]
pub enum ParameterKind {
    /// No fallback; the parameter stays unresolved.
    Required,
    /// Declared default value.
    Default(Instance),
    /// Optional; falls back to the type's zero value.
    Optional(Instance),
    /// Trailing variadic parameter; falls back to an empty list.
    Variadic(Instance),
}

/// A constructor parameter: name, declared type and fallback.
#[derive(Clone)]
pub struct ParameterInfo {
    name: String,
    service: ServiceKey,
    kind: ParameterKind,
}

impl ParameterInfo {
    /// A parameter that must be resolved or supplied.
    pub fn required<T: ?Sized + Send + Sync + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: ServiceKey::of::<T>(),
            kind: ParameterKind::Required,
        }
    }

    /// A parameter with a declared default.
    pub fn with_default<T: Send + Sync + 'static>(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            service: ServiceKey::of::<T>(),
            kind: ParameterKind::Default(instance_of(Arc::new(value))),
        }
    }

    /// An optional parameter, falling back to `T::default()`.
    pub fn optional<T: Default + Send + Sync + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: ServiceKey::of::<T>(),
            kind: ParameterKind::Optional(instance_of(Arc::new(T::default()))),
        }
    }

    /// A trailing variadic parameter of `T`s.
    ///
    /// Declared as `Vec<Arc<T>>`; resolves a registered `Vec<Arc<T>>` or
    /// falls back to an empty one.
    pub fn variadic<T: ?Sized + Send + Sync + 'static>(name: impl Into<String>) -> Self {
        let empty: Vec<Arc<T>> = Vec::new();
        Self {
            name: name.into(),
            service: ServiceKey::of::<Vec<Arc<T>>>(),
            kind: ParameterKind::Variadic(instance_of(Arc::new(empty))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service(&self) -> ServiceKey {
        self.service
    }

    pub fn kind(&self) -> &ParameterKind {
        &self.kind
    }

    /// Whether the declared type is `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.service == ServiceKey::of::<T>()
    }

    /// The value used when DI resolution finds nothing.
    pub(crate) fn fallback(&self) -> Option<Instance> {
        match &self.kind {
            ParameterKind::Required => None,
            ParameterKind::Default(value)
            | ParameterKind::Optional(value)
            | ParameterKind::Variadic(value) => Some(value.clone()),
        }
    }
}

impl fmt::Display for ParameterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.service, self.name)
    }
}

impl fmt::Debug for ParameterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ParameterKind::Required => "required",
            ParameterKind::Default(_) => "default",
            ParameterKind::Optional(_) => "optional",
            ParameterKind::Variadic(_) => "variadic",
        };
        f.debug_struct("ParameterInfo")
            .field("name", &self.name)
            .field("service", &self.service)
            .field("kind", &kind)
            .finish()
    }
}
