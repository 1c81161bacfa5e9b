use thiserror::Error;

#[derive(Debug, Error)]
pub enum PilotError {
    /// The scope never became visible. Extraction turns this into an empty
    /// element list.
    #[error("{scope} did not become visible within {timeout_ms}ms")]
    ExtractionTimeout { scope: String, timeout_ms: u64 },

    #[error("agent reply failed JSON parse: {reason} (reply: {excerpt})")]
    MalformedAgentResponse { reason: String, excerpt: String },

    #[error("agent reply has an unexpected shape: {0}")]
    ResponseShapeError(String),

    #[error("target {selector} not found on the page: {reason}")]
    MissingTarget { selector: String, reason: String },

    #[error("{service} unavailable: {reason}")]
    UpstreamUnavailable {
        service: &'static str,
        reason: String,
    },

    #[error("modal recursion exceeded {limit} levels")]
    RecursionLimitExceeded { limit: usize },

    #[error("browser error: {0}")]
    Browser(String),
}

pub type Result<T> = std::result::Result<T, PilotError>;

impl PilotError {
    pub(crate) fn upstream(service: &'static str, reason: impl ToString) -> Self {
        PilotError::UpstreamUnavailable {
            service,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn browser(reason: impl ToString) -> Self {
        PilotError::Browser(reason.to_string())
    }
}
