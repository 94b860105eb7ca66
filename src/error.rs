//! Error types for cache operations
//!
//! Most failures inside the cache are absorbed and surface to callers as a
//! cache miss. The variants here cover what does reach the public API:
//! precondition violations, expansion failures and fetch failures.

use thiserror::Error;

/// Main error type for the entity cache
#[derive(Error, Debug)]
pub enum CacheError {
    /// The URI could not be parsed as an absolute IRI
    #[error("Invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// Page URIs are always the non-fragment root
    #[error("Page URI must not carry a fragment: {0}")]
    FragmentInPageUri(String),

    /// The compacted document could not be expanded into triples
    #[error("Expansion error: {0}")]
    Expansion(String),

    /// The page fetcher failed to return a document
    #[error("Fetch error for {uri}: {reason}")]
    Fetch { uri: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The cache was shut down
    #[error("Cache has been disposed")]
    Disposed,

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}

impl From<url::ParseError> for CacheError {
    fn from(e: url::ParseError) -> Self {
        CacheError::InvalidUri {
            uri: String::new(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::FragmentInPageUri("http://x/#a".to_string());
        assert_eq!(
            error.to_string(),
            "Page URI must not carry a fragment: http://x/#a"
        );

        let fetch_error = CacheError::Fetch {
            uri: "http://x/".to_string(),
            reason: "404".to_string(),
        };
        assert!(fetch_error.to_string().contains("http://x/"));
        assert!(fetch_error.to_string().contains("404"));
    }

    #[test]
    fn test_error_conversion() {
        let error: CacheError = "test error".into();
        assert!(matches!(error, CacheError::Other(_)));

        let error: CacheError = "test error".to_string().into();
        assert!(matches!(error, CacheError::Other(_)));

        let parse = url::Url::parse("not a uri").unwrap_err();
        let error: CacheError = parse.into();
        assert!(matches!(error, CacheError::InvalidUri { .. }));

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: CacheError = json.into();
        assert!(matches!(error, CacheError::SerializationError(_)));
    }
}
