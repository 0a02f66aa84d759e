use thiserror::Error;

/// Errors surfaced by the engine.
///
/// `E` is the error type of the `Store` adapter in use; it is folded into
/// this enum via `#[from]` so callers only ever see one error type per
/// concrete `Store` implementation.
#[derive(Debug, Error)]
pub enum Error<E>
where
    E: std::error::Error + 'static,
{
    #[error("namespace is already initialized")]
    AlreadyInitialized,

    #[error("namespace has not been initialized")]
    NotInitialized,

    #[error("key already exists in this namespace")]
    DuplicateKey,

    #[error("key does not exist in this namespace")]
    MissingKey,

    #[error("maxNodeSize must be an even integer >= 4, got {0}")]
    InvalidFanout(u32),

    #[error("cursor could not be decoded into a key")]
    InvalidCursor,

    #[error("pagination limit must be greater than zero")]
    InvalidLimit,

    #[error("tree invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Store(#[from] E),
}

pub type Result<T, E> = std::result::Result<T, Error<E>>;
