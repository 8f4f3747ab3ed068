//! Runtime capability interface
//!
//! What the host test-runtime hands to the framework: its message bus and
//! case orderer, behind a versioned trait.

use std::sync::Arc;

use crate::models::{MessageBus, TestCase, TracingMessageBus};

/// Version of the [`TestRuntime`] contract this crate implements.
pub const CAPABILITY_VERSION: u32 = 1;

/// Orders the cases of a class before they are grouped into methods.
pub trait TestCaseOrderer: Send + Sync {
    fn order(&self, cases: Vec<Arc<dyn TestCase>>) -> anyhow::Result<Vec<Arc<dyn TestCase>>>;
}

/// Keeps the order cases were discovered in.
#[derive(Clone, Copy, Debug, Default)]
pub struct NaturalOrderer;

impl TestCaseOrderer for NaturalOrderer {
    fn order(&self, cases: Vec<Arc<dyn TestCase>>) -> anyhow::Result<Vec<Arc<dyn TestCase>>> {
        Ok(cases)
    }
}

/// Sorts cases by unique id.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniqueIdOrderer;

impl TestCaseOrderer for UniqueIdOrderer {
    fn order(
        &self,
        mut cases: Vec<Arc<dyn TestCase>>,
    ) -> anyhow::Result<Vec<Arc<dyn TestCase>>> {
        cases.sort_by(|a, b| a.unique_id().cmp(b.unique_id()));
        Ok(cases)
    }
}

/// Capabilities the host test-runtime provides.
pub trait TestRuntime: Send + Sync {
    fn capability_version(&self) -> u32 {
        CAPABILITY_VERSION
    }

    fn message_bus(&self) -> Arc<dyn MessageBus>;

    fn orderer(&self) -> Arc<dyn TestCaseOrderer> {
        Arc::new(NaturalOrderer)
    }
}

/// A runtime built from a bus and an orderer.
#[derive(Clone)]
pub struct InProcessRuntime {
    bus: Arc<dyn MessageBus>,
    orderer: Arc<dyn TestCaseOrderer>,
}

impl InProcessRuntime {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
            orderer: Arc::new(NaturalOrderer),
        }
    }

    pub fn with_orderer(mut self, orderer: Arc<dyn TestCaseOrderer>) -> Self {
        self.orderer = orderer;
        self
    }
}

impl Default for InProcessRuntime {
    fn default() -> Self {
        Self::new(Arc::new(TracingMessageBus))
    }
}

impl TestRuntime for InProcessRuntime {
    fn message_bus(&self) -> Arc<dyn MessageBus> {
        self.bus.clone()
    }

    fn orderer(&self) -> Arc<dyn TestCaseOrderer> {
        self.orderer.clone()
    }
}
