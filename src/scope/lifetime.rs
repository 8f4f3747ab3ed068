//! Lifetime scopes
//!
//! `open` / `resolve` / `close` over the scope tree.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::node::{ScopeLevel, ScopeNode};
use crate::di::{DisposeError, ResolveError, ServiceProvider};

/// Errors raised while opening a scope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("Cannot open a {level} scope under '{path}': {level} already appears in the ancestor chain")]
    DuplicateLevel { level: ScopeLevel, path: String },

    #[error("Cannot open a {0} scope from a disposed provider")]
    ParentDisposed(ScopeLevel),
}

/// A scope node together with the provider opened for it.
///
/// Closing disposes everything the scope created, newest first. A scope that
/// is never closed is disposed when its last provider handle is dropped.
#[derive(Debug)]
pub struct LifetimeScope {
    node: Arc<ScopeNode>,
    services: ServiceProvider,
}

impl LifetimeScope {
    /// Open a child scope named `level` under `parent`.
    ///
    /// The new node's parent is `parent`'s node, if it has one; opening from
    /// the root provider starts a fresh chain.
    pub fn open(parent: &ServiceProvider, level: ScopeLevel) -> Result<Self, ScopeError> {
        if parent.is_disposed() {
            return Err(ScopeError::ParentDisposed(level));
        }

        let parent_node = parent.scope_node().cloned();
        if let Some(node) = &parent_node {
            if node.find(level).is_some() {
                return Err(ScopeError::DuplicateLevel {
                    level,
                    path: node.path(),
                });
            }
        }

        let services = parent.child_with_node(level, parent_node);
        let node = services
            .scope_node()
            .cloned()
            .ok_or(ScopeError::ParentDisposed(level))?;
        debug!("Opened {} scope", node.path());
        Ok(Self { node, services })
    }

    pub fn level(&self) -> ScopeLevel {
        self.node.level()
    }

    pub fn node(&self) -> &Arc<ScopeNode> {
        &self.node
    }

    pub fn services(&self) -> &ServiceProvider {
        &self.services
    }

    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        self.services.resolve::<T>()
    }

    pub fn is_closed(&self) -> bool {
        self.services.is_disposed()
    }

    /// Dispose the scope. Safe to call more than once.
    pub fn close(&self) -> Result<(), DisposeError> {
        debug!("Closing {} scope", self.node.path());
        self.services.dispose()
    }
}
