//! Error types for the reference generator.
//!
//! Every failure mode is fatal for the run that triggers it: a generation
//! batch either completes and writes one complete document, or it produces
//! nothing and reports the failing case by name. Errors carry enough context
//! (shapes, tags, case names) to diagnose without rerunning.

use thiserror::Error;

/// Main error type for sdpa-refgen.
///
/// All library functions return `Result<T, RefgenError>`.
/// No panics in library code; every failure goes through this type.
#[derive(Error, Debug)]
pub enum RefgenError {
    /// A shape contained a zero dimension or had rank 0.
    ///
    /// Tensors are rejected at construction time; no downstream operation
    /// ever observes a degenerate shape.
    #[error("Invalid shape {shape:?}: every dimension must be at least 1")]
    InvalidShape {
        /// The offending shape, as given.
        shape: Vec<usize>,
    },

    /// Two tensors (or a tensor and its data buffer) disagree on shape.
    ///
    /// Example: matrix multiplication with mismatched inner dimensions, or
    /// a mask that cannot broadcast against the attention scores.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Shape the operation required.
        expected: Vec<usize>,
        /// Shape it actually received.
        got: Vec<usize>,
    },

    /// A dimension index exceeded the tensor's rank.
    #[error("Dimension out of range: {dim} for tensor with {ndim} dimensions")]
    DimOutOfRange {
        /// Dimension index that was accessed.
        dim: usize,
        /// Number of dimensions in the tensor.
        ndim: usize,
    },

    /// An embedding model-family tag was not in the supported set.
    #[error("Unknown model family tag: '{0}'")]
    UnknownModelFamily(String),

    /// A test case failed while the catalog was being computed.
    ///
    /// Wraps the underlying error with the case name so a failing batch can
    /// be diagnosed directly from the message.
    #[error("case '{name}' failed: {source}")]
    Case {
        /// Name of the failing case.
        name: String,
        /// What went wrong inside it.
        #[source]
        source: Box<RefgenError>,
    },

    /// The output document could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A filesystem operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message.
    ///
    /// Used when no specific variant applies. Prefer specific variants for
    /// better error context.
    #[error("{0}")]
    Msg(String),
}

/// Result type alias for sdpa-refgen.
///
/// Equivalent to `std::result::Result<T, RefgenError>`.
pub type Result<T> = std::result::Result<T, RefgenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_shape_display() {
        let err = RefgenError::InvalidShape {
            shape: vec![2, 0, 3],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("[2, 0, 3]"));
        assert!(msg.contains("at least 1"));
    }

    #[test]
    fn test_shape_mismatch_display() {
        let err = RefgenError::ShapeMismatch {
            expected: vec![2, 3],
            got: vec![2, 4],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("[2, 3]"));
        assert!(msg.contains("[2, 4]"));
    }

    #[test]
    fn test_unknown_model_family_display() {
        let err = RefgenError::UnknownModelFamily("gpt-17".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("gpt-17"));
    }

    #[test]
    fn test_case_error_carries_name_and_source() {
        let inner = RefgenError::ShapeMismatch {
            expected: vec![4, 4],
            got: vec![3, 3],
        };
        let err = RefgenError::Case {
            name: "with_mask".to_string(),
            source: Box::new(inner),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("with_mask"));
        assert!(msg.contains("[3, 3]"));
    }

    #[test]
    fn test_io_error_conversion() {
        fn read_missing() -> Result<String> {
            let contents = std::fs::read_to_string("/nonexistent/path/refgen.json")?;
            Ok(contents)
        }

        match read_missing() {
            Err(RefgenError::Io(_)) => (),
            other => panic!("Expected IO error, got: {:?}", other),
        }
    }

    #[test]
    fn test_json_error_conversion() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json");
        let err: RefgenError = bad.unwrap_err().into();
        let msg = format!("{}", err);
        assert!(msg.contains("Serialization error"));
    }
}
