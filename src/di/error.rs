//! Resolution and disposal errors

use thiserror::Error;

use crate::scope::ScopeLevel;

/// Errors raised while resolving a service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No service registered for type '{0}'")]
    NotRegistered(&'static str),

    #[error("Scoped service '{0}' cannot be resolved from the root provider")]
    ScopedFromRoot(&'static str),

    #[error("Unable to resolve lifetime '{wanted}' for '{service}' from initial lifetime '{}'", lifetime_name(.from))]
    MissingLifetime {
        service: &'static str,
        wanted: ScopeLevel,
        from: Option<ScopeLevel>,
    },

    #[error("Lifetime '{0}' owning the service has already been disposed")]
    OwnerDisposed(ScopeLevel),

    #[error("Service provider has been disposed")]
    Disposed,

    #[error("Failed to construct '{service}': {message}")]
    Factory {
        service: &'static str,
        message: String,
    },
}

/// Errors raised by disposable services while a provider was disposed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} disposal failure(s) in {}: {}", .failures.len(), scope_name(.scope), .failures.join("; "))]
pub struct DisposeError {
    pub scope: Option<ScopeLevel>,
    pub failures: Vec<String>,
}

fn lifetime_name(level: &Option<ScopeLevel>) -> String {
    match level {
        Some(level) => level.to_string(),
        None => "<root>".to_string(),
    }
}

fn scope_name(scope: &Option<ScopeLevel>) -> String {
    match scope {
        Some(level) => format!("{level} scope"),
        None => "root provider".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_lifetime_message() {
        let err = ResolveError::MissingLifetime {
            service: "Db",
            wanted: ScopeLevel::Collection,
            from: Some(ScopeLevel::Method),
        };
        assert_eq!(
            err.to_string(),
            "Unable to resolve lifetime 'Collection' for 'Db' from initial lifetime 'Method'"
        );
    }

    #[test]
    fn test_dispose_error_message() {
        let err = DisposeError {
            scope: Some(ScopeLevel::Case),
            failures: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "2 disposal failure(s) in Case scope: a; b");
    }
}
