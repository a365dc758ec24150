#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider rate limited the request")]
    RateLimited,

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl Error {
    /// Only rate limiting is worth an automatic transport-level retry; auth
    /// and availability failures surface immediately.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::RateLimited)
    }

    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Error::RateLimited
        } else {
            Error::Unavailable(format!("{status}: {body}"))
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Unavailable(error.to_string())
    }
}

impl From<Error> for valor_domain::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Unavailable(message) => valor_domain::Error::ProviderUnavailable(message),
            Error::RateLimited => valor_domain::Error::RateLimited,
            Error::MalformedResponse(message) => valor_domain::Error::MalformedResponse(message),
        }
    }
}
