//! Deferred constructor arguments
//!
//! Built once per class from whatever is known up front, then resolved per
//! case against that case's own scope.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::parameter::ParameterInfo;
use crate::di::{downcast_instance, Instance, ServiceProvider};
use crate::models::ExceptionAggregator;

/// Every parameter of a constructor that could not be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot construct {class}: no value for {}", .parameters.join(", "))]
pub struct MissingConstructorArguments {
    pub class: String,
    pub parameters: Vec<String>,
}

/// One resolved constructor argument.
#[derive(Clone)]
pub enum Argument {
    Value(Instance),
    /// Resolution raised an error; the error is in the aggregator.
    Failed,
    Unresolved,
}

impl Argument {
    pub fn value(&self) -> Option<&Instance> {
        match self {
            Argument::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(_) => f.write_str("Value"),
            Argument::Failed => f.write_str("Failed"),
            Argument::Unresolved => f.write_str("Unresolved"),
        }
    }
}

struct Pending {
    class: String,
    parameters: Vec<ParameterInfo>,
    supplied: Vec<Option<Instance>>,
}

/// Constructor arguments with build-time values filled in and the rest left
/// to DI resolution. Cloning shares the same pending set.
#[derive(Clone)]
pub struct DeferredConstructorArguments {
    pending: Arc<Pending>,
}

impl DeferredConstructorArguments {
    /// Arguments for a class without a constructor.
    pub fn empty(class: impl Into<String>) -> Self {
        Self::build(class, Vec::new(), |_| None)
    }

    /// Record `parameters`, asking `supply` for a value known up front.
    pub fn build<F>(class: impl Into<String>, parameters: Vec<ParameterInfo>, supply: F) -> Self
    where
        F: Fn(&ParameterInfo) -> Option<Instance>,
    {
        let supplied = parameters.iter().map(&supply).collect();
        Self {
            pending: Arc::new(Pending {
                class: class.into(),
                parameters,
                supplied,
            }),
        }
    }

    pub fn class(&self) -> &str {
        &self.pending.class
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.pending.parameters
    }

    pub fn is_empty(&self) -> bool {
        self.pending.parameters.is_empty()
    }

    /// Resolve every argument against `services`.
    ///
    /// Resolution errors go to `aggregator` and mark the argument as failed.
    /// Parameters with no value and no fallback are reported together as a
    /// single [`MissingConstructorArguments`].
    pub fn resolve(
        &self,
        services: &ServiceProvider,
        aggregator: &ExceptionAggregator,
    ) -> ConstructorArguments {
        let pending = &self.pending;
        let mut values = Vec::with_capacity(pending.parameters.len());

        for (parameter, supplied) in pending.parameters.iter().zip(&pending.supplied) {
            if let Some(value) = supplied {
                values.push(Argument::Value(value.clone()));
                continue;
            }

            let argument = match services.get_instance(parameter.service()) {
                Ok(Some(value)) => Argument::Value(value),
                Ok(None) => match parameter.fallback() {
                    Some(value) => Argument::Value(value),
                    None => Argument::Unresolved,
                },
                Err(err) => {
                    debug!("Resolving {} for {} failed: {}", parameter, pending.class, err);
                    aggregator.add(err);
                    Argument::Failed
                }
            };
            values.push(argument);
        }

        let arguments = ConstructorArguments {
            class: pending.class.clone(),
            parameters: pending.parameters.clone(),
            values,
        };

        if let Some(missing) = arguments.missing() {
            aggregator.add(missing);
        }
        arguments
    }
}

impl fmt::Debug for DeferredConstructorArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredConstructorArguments")
            .field("class", &self.pending.class)
            .field("parameters", &self.pending.parameters)
            .finish()
    }
}

/// Constructor arguments resolved for one case.
#[derive(Clone, Debug)]
pub struct ConstructorArguments {
    class: String,
    parameters: Vec<ParameterInfo>,
    values: Vec<Argument>,
}

impl ConstructorArguments {
    pub fn empty(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            parameters: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Argument `index` as a `T`, if it resolved to one.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Option<Arc<T>> {
        self.values
            .get(index)
            .and_then(Argument::value)
            .and_then(downcast_instance::<T>)
    }

    /// The argument for the parameter called `name`.
    pub fn named<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let index = self.parameters.iter().position(|p| p.name() == name)?;
        self.get::<T>(index)
    }

    pub fn argument(&self, index: usize) -> Option<&Argument> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether every argument holds a value.
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(|v| matches!(v, Argument::Value(_)))
    }

    pub fn unresolved(&self) -> Vec<&ParameterInfo> {
        self.parameters
            .iter()
            .zip(&self.values)
            .filter(|(_, v)| matches!(v, Argument::Unresolved))
            .map(|(p, _)| p)
            .collect()
    }

    fn missing(&self) -> Option<MissingConstructorArguments> {
        let unresolved = self.unresolved();
        if unresolved.is_empty() {
            return None;
        }
        Some(MissingConstructorArguments {
            class: self.class.clone(),
            parameters: unresolved.iter().map(|p| p.to_string()).collect(),
        })
    }
}
