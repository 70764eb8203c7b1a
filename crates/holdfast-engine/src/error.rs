//! Error types for the engine binary.

/// Startup failures that are not already covered by a library error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The configured world cannot be generated.
    #[error("world generation error: {message}")]
    Generation {
        /// What was wrong with the request.
        message: String,
    },

    /// An existing event stream failed verification and will not be resumed.
    #[error("event log at {path} is corrupt: {detail}")]
    CorruptLog {
        /// Log location.
        path: String,
        /// First broken link.
        detail: String,
    },
}
