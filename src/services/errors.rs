use thiserror::Error;

/// Failures surfaced by providers and the analysis pipeline.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{provider} unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{provider} returned an unreadable response: {message}")]
    MalformedProviderResponse { provider: String, message: String },

    #[error("invalid input: {0}")]
    Validation(String),
}

/// Errors returned across the provider-client boundary.
pub type ProviderError = AnalysisError;

impl AnalysisError {
    pub fn unavailable(provider: &str, message: impl Into<String>) -> Self {
        AnalysisError::ProviderUnavailable {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn malformed(provider: &str, message: impl Into<String>) -> Self {
        AnalysisError::MalformedProviderResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Network, timeout and transport errors from reqwest all mean "unavailable".
    pub fn from_http(provider: &str, err: reqwest::Error) -> Self {
        Self::unavailable(provider, err.to_string())
    }
}
