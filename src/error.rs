use thiserror::Error;

/// Crate-internal failures that keep the facade from attempting an
/// evaluation at all. Distinct from [`crate::resolver::ErrorCode`], which is
/// the flag-domain error taxonomy carried as *data* inside an
/// [`crate::resolver::EvaluationResult`] — evaluation itself never fails.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration JSON: {0}")]
    InvalidConfig(String),

    #[error("configuration has no top-level \"flags\" object")]
    MissingFlags,

    #[error("lock poisoned")]
    Poisoned,

    #[error("sandbox buffer overflow: {0} bytes exceeds the {1}-byte pre-allocated buffer")]
    BufferOverflow(usize, usize),

    #[error("sandbox memory access out of bounds")]
    OutOfBounds,

    #[error("invalid utf-8 crossing the sandbox boundary: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}
