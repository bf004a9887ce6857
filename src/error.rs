//! Error types for the scene graph store.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors raised by the scene graph core and its codecs.
///
/// A single error type keeps handling consistent across containers,
/// the registry, the event bus, and the collaborator codecs.
#[derive(Debug, Error)]
pub enum Error {
    /// A path, field name, or argument was null, empty, or otherwise malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An array or reference-array index fell outside `[0, length)`.
    #[error("index {index} out of range (length {length})")]
    IndexOutOfRange { index: usize, length: usize },

    /// A read or write used a type incompatible with the stored field and
    /// `allow_reschema` was false (or no implicit conversion exists).
    #[error("type mismatch on field '{field}': {reason}")]
    TypeMismatch { field: String, reason: String },

    /// The view's (id, generation) no longer resolves to a live container.
    #[error("object disposed")]
    ObjectDisposed,

    /// A query, codec, or container operation was invoked in a state where
    /// it has no valid meaning (failed query chain, non-object JSON root,
    /// corrupt blob, a container that already has a parent, ...).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// I/O failure from the binary snapshot codec.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Decode failure from a collaborator codec (JSON syntax, base64, ...).
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    pub fn type_mismatch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::TypeMismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn index_out_of_range(index: usize, length: usize) -> Self {
        Error::IndexOutOfRange { index, length }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(format!("json: {err}"))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Decode(format!("base64: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ObjectDisposed;
        assert_eq!(format!("{}", err), "object disposed");

        let err = Error::index_out_of_range(5, 3);
        assert_eq!(format!("{}", err), "index 5 out of range (length 3)");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        matches!(err, Error::Io(_));
    }

    #[test]
    fn test_result_type_alias() {
        fn might_fail() -> Result<u32> {
            Ok(42)
        }
        assert_eq!(might_fail().unwrap(), 42);
    }
}
