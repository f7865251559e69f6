//! Error types for the IQ-TREE boundary.

use thiserror::Error;

/// Result type alias for boundary operations
pub type Result<T> = std::result::Result<T, IqTreeError>;

/// Everything that can go wrong on either side of the boundary.
#[derive(Debug, Error)]
pub enum IqTreeError {
    /// Caller input has the wrong shape or element type.
    ///
    /// Always raised before the native engine is entered.
    #[error("cannot convert argument `{arg}`: {reason}")]
    Conversion {
        /// Name of the offending argument
        arg: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// Input converts fine but is rejected before calling the engine.
    #[error("invalid argument `{arg}`: {reason}")]
    InvalidArgument {
        /// Name of the offending argument
        arg: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// Error string reported by the native engine, carried verbatim.
    #[error("{0}")]
    Engine(String),

    /// Text could not be parsed (model strings, tree files, FASTA).
    #[error("failed to parse {what}: {reason}")]
    Parse {
        /// What was being parsed
        what: &'static str,
        /// Parser message
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IqTreeError {
    pub(crate) fn conversion(arg: &'static str, reason: impl Into<String>) -> Self {
        IqTreeError::Conversion { arg, reason: reason.into() }
    }

    pub(crate) fn invalid(arg: &'static str, reason: impl Into<String>) -> Self {
        IqTreeError::InvalidArgument { arg, reason: reason.into() }
    }

    pub(crate) fn parse(what: &'static str, reason: impl Into<String>) -> Self {
        IqTreeError::Parse { what, reason: reason.into() }
    }
}
