use thiserror::Error;

/// Errors returned by `IdentityWeakMap` and its views.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The operation is deliberately not provided for identity-keyed maps.
    #[error("unsupported operation: {operation}")]
    Unsupported { operation: &'static str },
}
