use crate::{TestId, TestStatus, ValidationId};

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy of the orchestration pipeline. Input and not-found
/// variants are surfaced immediately; upstream variants leave the affected
/// test in `Failed` and are eligible for a user-driven retry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation {0} not found")]
    ValidationNotFound(ValidationId),

    #[error("Test {0} not found")]
    TestNotFound(TestId),

    #[error("Test {0} already has a transition in flight")]
    TestBusy(TestId),

    #[error("Cannot move test from {from} to {to}")]
    InvalidTransition { from: TestStatus, to: TestStatus },

    #[error("Unknown prompt template: {0}")]
    TemplateNotFound(String),

    #[error("Missing template variable: {0}")]
    MissingVariable(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Provider rate limited the request")]
    RateLimited,

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Response contains no fenced code block")]
    NoCodeBlockFound,

    #[error("Response contains more than one fenced code block")]
    MultipleCodeBlocksFound,

    #[error("Response contains an unterminated fenced code block")]
    UnterminatedCodeBlock,

    #[error("Execution timed out")]
    ExecutionTimeout,

    #[error("Execution service unavailable: {0}")]
    ExecutionServiceUnavailable(String),

    #[error("Execution crashed: {0}")]
    ExecutionCrashed(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] uuid::Error),
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Storage(error.to_string())
    }
}

/// Coarse classification used at the API boundary to pick a response class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed caller input; never retried.
    Input,
    /// Unknown validation or test id.
    NotFound,
    /// A transition was attempted while another one was in flight.
    Conflict,
    /// LLM or execution-service failure, including contract violations such
    /// as a response without exactly one code block.
    Upstream,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_)
            | Error::InvalidTransition { .. }
            | Error::TemplateNotFound(_)
            | Error::MissingVariable(_)
            | Error::InvalidId(_) => ErrorKind::Input,
            Error::ValidationNotFound(_) | Error::TestNotFound(_) => ErrorKind::NotFound,
            Error::TestBusy(_) => ErrorKind::Conflict,
            Error::ProviderUnavailable(_)
            | Error::RateLimited
            | Error::MalformedResponse(_)
            | Error::NoCodeBlockFound
            | Error::MultipleCodeBlocksFound
            | Error::UnterminatedCodeBlock
            | Error::ExecutionTimeout
            | Error::ExecutionServiceUnavailable(_)
            | Error::ExecutionCrashed(_)
            | Error::Storage(_) => ErrorKind::Upstream,
        }
    }
}
