//! Model Errors

use thiserror::Error;

use crate::expr::ExprError;
use crate::validate::ParseIssue;

/// Errors raised while building or using a signature
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// A type outside the supported C subset
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// A value does not conform to the declared type of its parameter
    #[error("Value for `{name}` does not conform to {expected}")]
    TypeMismatch {
        /// Parameter name
        name: String,
        /// Declared C type
        expected: String,
    },

    /// A size expression produced something unusable
    #[error("Invalid size for `{array}`: {message}")]
    InvalidSize {
        /// Array parameter whose size was being resolved
        array: String,
        /// What went wrong
        message: String,
    },

    /// A variable referenced by a size or constraint has no binding
    #[error("Unbound variable: {0}")]
    Unbound(String),

    /// Constraints on a parameter leave an empty range
    #[error("Unsatisfiable constraints on `{name}`: min {min} > max {max}")]
    Constraint {
        /// Parameter name
        name: String,
        /// Effective lower bound
        min: f64,
        /// Effective upper bound
        max: f64,
    },

    /// The parameter name is not part of the signature
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// Expression evaluation failed
    #[error(transparent)]
    Expr(#[from] ExprError),
}

/// Errors raised while reading reference directories or example files
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Filesystem failure
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being read or written
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// The `props` file is malformed
    #[error("{path}:{line}: {message}")]
    Props {
        /// File path
        path: String,
        /// 1-based line number
        line: usize,
        /// Description
        message: String,
    },

    /// A C prototype could not be parsed
    #[error("Invalid prototype `{0}`")]
    Prototype(String),

    /// The reference is unusable under the strict load policy
    #[error("Reference {name} has issues: {issues:?}")]
    Issues {
        /// Reference directory name
        name: String,
        /// Issues found
        issues: Vec<ParseIssue>,
    },

    /// The example file is malformed
    #[error("Malformed example file: {0}")]
    Examples(String),

    /// Model error during loading
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl ParseError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        ParseError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
