//! Constructor arguments
//!
//! Resolution order per parameter: a value supplied up front, then DI, then
//! the declared default, the zero value for optional parameters and an empty
//! list for a trailing variadic one.

mod deferred;
mod parameter;

pub use deferred::{
    Argument, ConstructorArguments, DeferredConstructorArguments, MissingConstructorArguments,
};
pub use parameter::{ParameterInfo, ParameterKind};
