use thiserror::Error;

/// Failures of a single refresh cycle.
///
/// The coordinator maps each variant to a display state; none of them is
/// fatal to the process.
#[derive(Error, Debug)]
pub enum UsageError {
    #[error("Codex credentials missing: {0}")]
    CredentialsMissing(String),
    #[error("Usage request to {url} failed with HTTP {status}")]
    RequestFailed { status: u16, url: String },
    #[error("Usage request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Usage response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Refusing to send credentials to non-HTTPS endpoint: {0}")]
    InsecureEndpoint(String),
}

impl UsageError {
    /// Credentials-missing failures hide the indicator instead of degrading it.
    pub fn is_credentials_missing(&self) -> bool {
        matches!(self, Self::CredentialsMissing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_failed_message_carries_status_and_url() {
        let err = UsageError::RequestFailed {
            status: 503,
            url: "https://chatgpt.com/backend-api/wham/usage".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("wham/usage"));
        assert!(!err.is_credentials_missing());
    }

    #[test]
    fn credentials_missing_is_classified() {
        let err = UsageError::CredentialsMissing("no openai entry".into());
        assert!(err.is_credentials_missing());
    }
}
