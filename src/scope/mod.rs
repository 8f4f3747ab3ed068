//! Scope tree
//!
//! Named lifetime nodes, one per hierarchy level instance. A service
//! registered as owned by a level is created once per instance of that
//! level and shared by every descendant scope:
//!
//! ```text
//! root provider
//!   +-- Collection
//!         +-- Class        <- owns services registered for Class
//!               +-- Method
//!                     +-- Case
//! ```

mod lifetime;
mod node;

pub use lifetime::{LifetimeScope, ScopeError};
pub use node::{ScopeLevel, ScopeNode};
