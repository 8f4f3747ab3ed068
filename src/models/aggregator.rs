//! Error aggregation
//!
//! Collects failures from a level or unit of work instead of propagating them.

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Shared, cloneable collector of errors.
///
/// Clones share the same storage, so sibling tasks of a concurrent batch can
/// append without lost updates. Use [`ExceptionAggregator::child`] for an
/// independent aggregator seeded with the current errors.
#[derive(Clone, Default)]
pub struct ExceptionAggregator {
    errors: Arc<Mutex<Vec<Arc<anyhow::Error>>>>,
}

impl ExceptionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Independent aggregator starting with a copy of this one's errors.
    pub fn child(&self) -> Self {
        let seeded = self.errors.lock().clone();
        Self {
            errors: Arc::new(Mutex::new(seeded)),
        }
    }

    pub fn add(&self, error: impl Into<anyhow::Error>) {
        self.errors.lock().push(Arc::new(error.into()));
    }

    /// Run `action`, capturing its error instead of propagating it.
    pub fn run<F>(&self, action: F)
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        if let Err(err) = action() {
            self.add(err);
        }
    }

    pub async fn run_async<F>(&self, action: F)
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        if let Err(err) = action.await {
            self.add(err);
        }
    }

    /// Append every error recorded by `other`.
    pub fn aggregate(&self, other: &ExceptionAggregator) {
        if Arc::ptr_eq(&self.errors, &other.errors) {
            return;
        }
        let incoming = other.errors.lock().clone();
        self.errors.lock().extend(incoming);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_errors()
    }

    pub fn errors(&self) -> Vec<Arc<anyhow::Error>> {
        self.errors.lock().clone()
    }

    pub fn clear(&self) {
        self.errors.lock().clear();
    }

    /// All recorded errors as a single error, or `None` when empty.
    pub fn to_error(&self) -> Option<AggregateError> {
        let errors = self.errors();
        if errors.is_empty() {
            None
        } else {
            Some(AggregateError { errors })
        }
    }
}

impl fmt::Debug for ExceptionAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionAggregator")
            .field("errors", &self.len())
            .finish()
    }
}

/// One or more errors reported together.
#[derive(Error, Debug, Clone)]
#[error("{}", render(.errors))]
pub struct AggregateError {
    pub errors: Vec<Arc<anyhow::Error>>,
}

fn render(errors: &[Arc<anyhow::Error>]) -> String {
    match errors {
        [single] => format!("{single:#}"),
        _ => {
            let mut out = format!("{} errors occurred:", errors.len());
            for (i, err) in errors.iter().enumerate() {
                out.push_str(&format!("\n  [{}] {:#}", i + 1, err));
            }
            out
        }
    }
}
