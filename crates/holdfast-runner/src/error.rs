//! Error types for reasoning providers and response parsing.
//!
//! Both enums are `Clone` because a single provider result is shared by
//! every waiter coalesced onto the same cache fingerprint.

/// Errors returned by a [`ReasoningProvider`](crate::ReasoningProvider).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The request never produced an HTTP response.
    #[error("{provider} request failed: {message}")]
    Transport {
        /// Provider id.
        provider: String,
        /// Underlying error text.
        message: String,
    },

    /// The API answered with a non-success status.
    #[error("{provider} returned {status}: {body}")]
    Status {
        /// Provider id.
        provider: String,
        /// HTTP status code.
        status: u16,
        /// Response body, if readable.
        body: String,
    },

    /// The API answered but the payload lacked the expected fields.
    #[error("{provider} response malformed: {detail}")]
    MalformedResponse {
        /// Provider id.
        provider: String,
        /// What was missing.
        detail: String,
    },

    /// The caller-enforced deadline passed.
    #[error("{provider} timed out after {after_ms}ms")]
    Timeout {
        /// Provider id.
        provider: String,
        /// Deadline in milliseconds.
        after_ms: u64,
    },

    /// A scripted provider ran out of replies.
    #[error("{provider} has no scripted replies left")]
    Exhausted {
        /// Provider id.
        provider: String,
    },

    /// A scripted failure.
    #[error("{provider} scripted failure: {message}")]
    Scripted {
        /// Provider id.
        provider: String,
        /// Failure text.
        message: String,
        /// Whether the failure should be treated as transient.
        transient: bool,
    },

    /// The provider does not support the requested operation.
    #[error("{provider} does not support {operation}")]
    Unsupported {
        /// Provider id.
        provider: String,
        /// Operation name.
        operation: &'static str,
    },

    /// Provider configuration is invalid or incomplete.
    #[error("provider config error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    ///
    /// Connection failures, HTTP 429, and HTTP 5xx are transient.
    /// Timeouts and malformed output are not.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status == 429 || (*status >= 500 && *status <= 599),
            Self::Scripted { transient, .. } => *transient,
            Self::MalformedResponse { .. }
            | Self::Timeout { .. }
            | Self::Exhausted { .. }
            | Self::Unsupported { .. }
            | Self::Config(_) => false,
        }
    }

    /// Short label for telemetry and event payloads.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Status { .. } => "status",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Timeout { .. } => "timeout",
            Self::Exhausted { .. } => "exhausted",
            Self::Scripted { .. } => "scripted",
            Self::Unsupported { .. } => "unsupported",
            Self::Config(_) => "config",
        }
    }
}

/// Errors from validating provider text against the decision schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// No JSON object could be recovered from the text.
    #[error("response is not a JSON object: {detail}")]
    NotJson {
        /// Parser message.
        detail: String,
    },

    /// The `action` field is missing or names no known action.
    #[error("unknown action: {action}")]
    UnknownAction {
        /// The offending value.
        action: String,
    },

    /// A required parameter is absent.
    #[error("{action} requires parameter {parameter}")]
    MissingParameter {
        /// Action being parsed.
        action: &'static str,
        /// Missing parameter name.
        parameter: &'static str,
    },

    /// A numeric parameter is outside its allowed range.
    #[error("{parameter} out of range: {value}")]
    OutOfRange {
        /// Parameter name.
        parameter: &'static str,
        /// The offending value.
        value: String,
    },

    /// Parameters are present but have the wrong shape.
    #[error("invalid parameters: {detail}")]
    InvalidParameters {
        /// Parser message.
        detail: String,
    },
}
