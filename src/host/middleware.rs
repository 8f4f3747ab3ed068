//! Middleware pipeline
//!
//! Wrap-before/after steps around a run. The first registered middleware is
//! the outermost; the terminal delegate runs last.

use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use super::{Host, HostError};
use crate::di::{ResolveError, ServiceProvider};

pub type ExecutionFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A step of the pipeline, or the terminal delegate it ends in.
pub type ExecutionDelegate = Arc<dyn Fn(Arc<Host>) -> ExecutionFuture + Send + Sync>;

type MiddlewareFn = Arc<dyn Fn(Arc<Host>, ExecutionDelegate) -> ExecutionFuture + Send + Sync>;

type ComponentFactory = Arc<
    dyn Fn(&ServiceProvider, ExecutionDelegate) -> Result<ExecutionDelegate, ResolveError>
        + Send
        + Sync,
>;

/// Wrap an async closure as an [`ExecutionDelegate`].
pub fn delegate<F, Fut>(f: F) -> ExecutionDelegate
where
    F: Fn(Arc<Host>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |host: Arc<Host>| -> ExecutionFuture { f(host).boxed() })
}

/// Services a middleware component needs, resolved from the root provider
/// when the pipeline is built.
pub trait FromServices: Sized + Send + Sync + 'static {
    fn from_services(services: &ServiceProvider) -> Result<Self, ResolveError>;
}

impl FromServices for () {
    fn from_services(_services: &ServiceProvider) -> Result<Self, ResolveError> {
        Ok(())
    }
}

impl<T: ?Sized + Send + Sync + 'static> FromServices for Arc<T> {
    fn from_services(services: &ServiceProvider) -> Result<Self, ResolveError> {
        services.resolve::<T>()
    }
}

impl<T: ?Sized + Send + Sync + 'static> FromServices for Option<Arc<T>> {
    fn from_services(services: &ServiceProvider) -> Result<Self, ResolveError> {
        services.get::<T>()
    }
}

macro_rules! tuple_from_services {
    ($($name:ident),+) => {
        impl<$($name: FromServices),+> FromServices for ($($name,)+) {
            fn from_services(services: &ServiceProvider) -> Result<Self, ResolveError> {
                Ok(($($name::from_services(services)?,)+))
            }
        }
    };
}

tuple_from_services!(A);
tuple_from_services!(A, B);
tuple_from_services!(A, B, C);
tuple_from_services!(A, B, C, D);

/// A middleware type constructed once per pipeline build.
pub trait ExecutionMiddleware: Send + Sync + Sized + 'static {
    type Dependencies: FromServices;

    fn new(next: ExecutionDelegate) -> Self;

    fn invoke<'a>(
        &'a self,
        host: Arc<Host>,
        dependencies: &'a Self::Dependencies,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// One link of the pipeline.
#[derive(Clone)]
pub enum Middleware {
    /// `(host, next)` closure.
    Closure(MiddlewareFn),
    /// A typed [`ExecutionMiddleware`].
    Component {
        name: &'static str,
        factory: ComponentFactory,
    },
}

impl Middleware {
    pub fn closure<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Host>, ExecutionDelegate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Middleware::Closure(Arc::new(
            move |host: Arc<Host>, next: ExecutionDelegate| -> ExecutionFuture {
                f(host, next).boxed()
            },
        ))
    }

    pub fn component<M: ExecutionMiddleware>() -> Self {
        let factory = |services: &ServiceProvider,
                       next: ExecutionDelegate|
         -> Result<ExecutionDelegate, ResolveError> {
            let dependencies = <M::Dependencies as FromServices>::from_services(services)?;
            let dependencies = Arc::new(dependencies);
            let component = Arc::new(M::new(next));
            Ok(Arc::new(move |host: Arc<Host>| -> ExecutionFuture {
                let component = component.clone();
                let dependencies = dependencies.clone();
                async move { component.invoke(host, &dependencies).await }.boxed()
            }))
        };
        Middleware::Component {
            name: std::any::type_name::<M>(),
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Middleware::Closure(_) => "closure",
            Middleware::Component { name, .. } => *name,
        }
    }

    fn wrap(
        &self,
        services: &ServiceProvider,
        next: ExecutionDelegate,
    ) -> Result<ExecutionDelegate, HostError> {
        match self {
            Middleware::Closure(f) => {
                let f = f.clone();
                Ok(Arc::new(move |host: Arc<Host>| -> ExecutionFuture {
                    f(host, next.clone())
                }))
            }
            Middleware::Component { name, factory } => {
                factory(services, next).map_err(|source| HostError::Middleware {
                    name: *name,
                    source,
                })
            }
        }
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Middleware({})", self.name())
    }
}

/// Compose `middleware` around `terminal`, right to left.
pub(crate) fn build_pipeline(
    middleware: &[Middleware],
    services: &ServiceProvider,
    terminal: ExecutionDelegate,
) -> Result<ExecutionDelegate, HostError> {
    debug!("Building pipeline with {} middleware", middleware.len());
    middleware
        .iter()
        .rev()
        .try_fold(terminal, |next, m| m.wrap(services, next))
}
