//! Data models shared with the host test-runtime
//!
//! Run summaries, error aggregation, execution messages and the test
//! hierarchy (collection, class, method, case).

mod aggregator;
mod delegate;
mod message;
mod output;
mod summary;
mod test_case;

pub use aggregator::{AggregateError, ExceptionAggregator};
pub use delegate::{DelegateTestCase, TestContext};
pub use message::{ExecutionMessage, MessageBus, MessageLog, TracingMessageBus};
pub use output::TestOutput;
pub use summary::RunSummary;
pub use test_case::{
    DataRow, DataSource, Invocation, TestCase, TestClass, TestCollection, TestMethod,
};
