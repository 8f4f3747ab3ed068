//! testhost - lifetime-scoped dependency injection for hierarchical test runs
//!
//! Runs a tree of test cases (assembly, collection, class, method, case)
//! with a dependency container scoped to each level, and decides per batch
//! whether siblings run concurrently or in order.
//!
//! ## Features
//!
//! - Services owned by a named level (`Collection`, `Class`, `Method`, `Case`),
//!   created once per level instance and shared by its descendants
//! - Constructor arguments resolved per case, with every missing parameter
//!   reported in one failure
//! - Parallel or sequential batches with matching summary semantics
//! - Pluggable test case adapters; parameterized cases out of the box
//! - A host with layered configuration, startups and a middleware pipeline
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use testhost::models::{DelegateTestCase, MessageLog, TestClass, TestCollection, TestMethod};
//! use testhost::runner::{InProcessRuntime, TestFrameworkExecutor};
//!
//! # async fn demo() -> Result<(), testhost::runner::RuntimeError> {
//! let log = Arc::new(MessageLog::new());
//! let executor = TestFrameworkExecutor::new(Arc::new(InProcessRuntime::new(log.clone())))?;
//!
//! let class = TestClass::new("MathTests", TestCollection::new("default")).into_shared();
//! let case = DelegateTestCase::new(TestMethod::new(class, "adds"), |_| async {
//!     anyhow::ensure!(2 + 2 == 4);
//!     Ok(())
//! });
//!
//! let summary = executor.run(vec![case.into_shared()]).await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod arguments;
pub mod config;
pub mod di;
pub mod executor;
pub mod host;
pub mod models;
pub mod runner;
pub mod scope;
pub mod utils;

pub use adapters::{AdapterRegistry, TestCaseAdapter, TheoryTestCaseAdapter};
pub use arguments::{DeferredConstructorArguments, ParameterInfo};
pub use di::{Lifetime, ServiceCollection, ServiceProvider};
pub use executor::ParallelExecutor;
pub use host::{Host, HostBuilder, HostOptions, Middleware, Startup};
pub use models::{ExecutionMessage, MessageBus, RunSummary, TestCase};
pub use runner::{TestFrameworkExecutor, TestRuntime};
pub use scope::{LifetimeScope, ScopeLevel};
