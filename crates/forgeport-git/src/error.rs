//! Error taxonomy for provider and transport operations

use thiserror::Error;

/// Errors surfaced by provider adapters, the factory, and the content
/// retriever.
///
/// No variant is retried internally; `ProviderClient` and `Transport` carry
/// enough detail for an upper layer to decide on retry by itself.
#[derive(Error, Debug)]
pub enum GitProviderError {
    /// Malformed or missing provider type, base URL, pointer, or an
    /// operation a provider cannot express. Detected before any I/O.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Credential missing, malformed, or rejected by the provider.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Non-success provider API response, with status and raw body.
    #[error("Provider API error (HTTP {status}): {body}")]
    ProviderClient { status: u16, body: String },

    /// Clone or checkout failure, wrapping the underlying git error.
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<git2::Error>,
    },
}

impl GitProviderError {
    pub fn transport(message: impl Into<String>, source: git2::Error) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn transport_msg(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }
}

impl From<reqwest::Error> for GitProviderError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16()).unwrap_or(0);
        GitProviderError::ProviderClient {
            status,
            body: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GitProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_client_error_carries_status_and_body() {
        let err = GitProviderError::ProviderClient {
            status: 422,
            body: "name already exists".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("422"));
        assert!(rendered.contains("name already exists"));
    }

    #[test]
    fn test_transport_error_preserves_source() {
        let cause = git2::Error::from_str("reference 'doesnotexist123' not found");
        let err = GitProviderError::transport("checkout failed", cause);
        assert!(err.to_string().contains("checkout failed"));
        let source = std::error::Error::source(&err).expect("source retained");
        assert!(source.to_string().contains("doesnotexist123"));
    }
}
