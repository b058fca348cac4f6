use thiserror::Error;

/// Result type for speaker operations
pub type Result<T> = std::result::Result<T, KefError>;

/// Errors that can occur when talking to KEF speakers
#[derive(Error, Debug)]
pub enum KefError {
    /// Transport-level failure (connection refused, reset, bad status)
    #[error("Network error: {0}")]
    Network(String),

    /// Body missing, not text, or not the expected envelope
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Body present but not decodable
    #[error("Parsing error: {0}")]
    Parsing(#[from] serde_json::Error),

    /// The device should have answered but did not
    #[error("Speaker not responding")]
    NotResponding,

    /// Malformed target address
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No usable IPv4 interface to derive a scan range from
    #[error("No usable subnet found")]
    NoSubnetFound,

    /// The service announcement mechanism itself is unavailable
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// A single-shot poll was cancelled by the caller
    #[error("Cancelled")]
    Cancelled,
}

impl KefError {
    /// Whether this error means the device itself is gone.
    ///
    /// Live sync retries every other error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KefError::NotResponding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_not_responding_is_fatal() {
        assert!(KefError::NotResponding.is_fatal());
        assert!(!KefError::Network("refused".into()).is_fatal());
        assert!(!KefError::InvalidResponse("empty".into()).is_fatal());
        assert!(!KefError::Cancelled.is_fatal());
    }

    #[test]
    fn parsing_error_converts_from_serde() {
        let err: KefError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, KefError::Parsing(_)));
    }
}
