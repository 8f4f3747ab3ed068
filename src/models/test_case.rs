//! Test hierarchy model
//!
//! Collections, classes, methods and the work-unit abstraction supplied by
//! the host test-runtime.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::aggregator::ExceptionAggregator;
use super::message::MessageBus;
use super::summary::RunSummary;
use crate::arguments::{ConstructorArguments, ParameterInfo};
use crate::di::{instance_of, Instance, ServiceKey, ServiceProvider};

/// A named group of classes that never run alongside each other.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TestCollection {
    pub name: String,
}

impl TestCollection {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into() })
    }
}

/// A test class: constructor shape, grouping and shared fixtures.
#[derive(Clone)]
pub struct TestClass {
    pub name: String,
    pub collection: Arc<TestCollection>,
    /// `None` for classes without a constructor.
    pub constructor: Option<Vec<ParameterInfo>>,
    /// Explicitly grouped for non-parallel execution.
    pub grouped: bool,
    fixtures: HashMap<ServiceKey, Instance>,
}

impl TestClass {
    pub fn new(name: impl Into<String>, collection: Arc<TestCollection>) -> Self {
        Self {
            name: name.into(),
            collection,
            constructor: None,
            grouped: false,
            fixtures: HashMap::new(),
        }
    }

    pub fn with_constructor(mut self, parameters: Vec<ParameterInfo>) -> Self {
        self.constructor = Some(parameters);
        self
    }

    pub fn grouped(mut self) -> Self {
        self.grouped = true;
        self
    }

    /// Declare a shared fixture handed to the constructor for `T` parameters.
    pub fn with_fixture<T: ?Sized + Send + Sync + 'static>(mut self, fixture: Arc<T>) -> Self {
        self.fixtures.insert(ServiceKey::of::<T>(), instance_of(fixture));
        self
    }

    pub fn fixture(&self, key: ServiceKey) -> Option<&Instance> {
        self.fixtures.get(&key)
    }

    pub fn has_fixtures(&self) -> bool {
        !self.fixtures.is_empty()
    }

    /// A fixture is shared mutable state, so classes declaring one run their
    /// methods sequentially, as do explicitly grouped classes.
    pub fn is_parallelizable(&self) -> bool {
        !self.grouped && self.fixtures.is_empty()
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl fmt::Debug for TestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestClass")
            .field("name", &self.name)
            .field("collection", &self.collection.name)
            .field("constructor", &self.constructor)
            .field("grouped", &self.grouped)
            .field("fixtures", &self.fixtures.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct TestMethod {
    pub class: Arc<TestClass>,
    pub name: String,
}

impl TestMethod {
    pub fn new(class: Arc<TestClass>, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            class,
            name: name.into(),
        })
    }

    /// `Class.method`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.class.name, self.name)
    }
}

/// One row of a parameterized case.
#[derive(Clone)]
pub struct DataRow {
    pub arguments: Vec<Instance>,
    pub label: String,
    pub skip_reason: Option<String>,
}

impl DataRow {
    pub fn new(label: impl Into<String>, arguments: Vec<Instance>) -> Self {
        Self {
            arguments,
            label: label.into(),
            skip_reason: None,
        }
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }
}

impl fmt::Debug for DataRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataRow")
            .field("label", &self.label)
            .field("arguments", &self.arguments.len())
            .field("skip_reason", &self.skip_reason)
            .finish()
    }
}

/// Supplies the rows of a parameterized case at run time.
pub trait DataSource: Send + Sync {
    fn rows(&self) -> anyhow::Result<Vec<DataRow>>;
}

impl<F> DataSource for F
where
    F: Fn() -> anyhow::Result<Vec<DataRow>> + Send + Sync,
{
    fn rows(&self) -> anyhow::Result<Vec<DataRow>> {
        self()
    }
}

/// Everything one execution of a case needs.
#[derive(Clone)]
pub struct Invocation {
    pub display_name: String,
    pub constructor_arguments: ConstructorArguments,
    pub method_arguments: Vec<Instance>,
    pub skip_reason: Option<String>,
    /// The innermost scope opened for this execution.
    pub services: ServiceProvider,
    pub bus: Arc<dyn MessageBus>,
    pub aggregator: ExceptionAggregator,
    pub cancellation: CancellationToken,
}

/// A schedulable, independently reported unit of test execution.
///
/// Implementations own their result reporting: they emit the start, result
/// and finish messages and return the summary for what they ran.
pub trait TestCase: Send + Sync + 'static {
    fn unique_id(&self) -> &str;

    fn display_name(&self) -> &str;

    fn skip_reason(&self) -> Option<&str> {
        None
    }

    fn method(&self) -> &Arc<TestMethod>;

    /// Rows for parameterized cases.
    fn data_source(&self) -> Option<&dyn DataSource> {
        None
    }

    fn run(&self, invocation: Invocation) -> BoxFuture<'_, RunSummary>;

    fn class(&self) -> &Arc<TestClass> {
        &self.method().class
    }

    fn collection(&self) -> &Arc<TestCollection> {
        &self.method().class.collection
    }
}

impl fmt::Debug for dyn TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.unique_id())
            .field("name", &self.display_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SharedDatabase;

    #[test]
    fn test_class_parallelizable_unless_grouped_or_fixtured() {
        let collection = TestCollection::new("default");

        let plain = TestClass::new("Plain", collection.clone());
        assert!(plain.is_parallelizable());
        assert!(!TestClass::new("Grouped", collection.clone()).grouped().is_parallelizable());

        let fixtured = TestClass::new("Fixtured", collection)
            .with_fixture(Arc::new(SharedDatabase));
        assert!(!fixtured.is_parallelizable());
        assert!(fixtured.fixture(ServiceKey::of::<SharedDatabase>()).is_some());
    }

    #[test]
    fn test_closure_data_source() {
        let source = || -> anyhow::Result<Vec<DataRow>> {
            Ok(vec![DataRow::new("1", vec![]), DataRow::new("2", vec![]).skip("flaky")])
        };
        let rows = source.rows().unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].skip_reason.as_deref(), Some("flaky"));
    }

    #[test]
    fn test_method_full_name() {
        let class = TestClass::new("MathTests", TestCollection::new("c")).into_shared();
        assert_eq!(TestMethod::new(class, "adds").full_name(), "MathTests.adds");
    }
}
