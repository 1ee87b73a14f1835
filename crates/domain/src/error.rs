use chrono::{DateTime, Utc};

/// Shared error type used across all Colloquy crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("auth: {0}")]
    Auth(String),

    #[error("transient: {0}")]
    Transient(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a caller may reasonably retry the failed operation.
    /// Rate limits are retryable too, but only after their reset instant.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ProviderUnavailable(_) | Error::Transient(_) | Error::RateLimited { .. }
        )
    }

    /// Fatal errors abort a run before deliberation starts.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::Transient("x".into()).is_retryable());
        assert!(Error::ProviderUnavailable("down".into()).is_retryable());
        assert!(Error::RateLimited { reset_at: Utc::now() }.is_retryable());
        assert!(!Error::Auth("bad key".into()).is_retryable());
        assert!(!Error::Storage("lost".into()).is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(Error::Auth("bad key".into()).is_fatal());
        assert!(Error::Config("missing".into()).is_fatal());
        assert!(!Error::Transient("x".into()).is_fatal());
    }

    #[test]
    fn display_includes_reset_instant() {
        let reset = Utc::now();
        let msg = Error::RateLimited { reset_at: reset }.to_string();
        assert!(msg.contains("rate limited until"));
    }
}
