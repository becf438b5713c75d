use thiserror::Error;

use crate::models::ConfigError;

/// Main error type for SiteForge
#[derive(Error, Debug)]
pub enum SiteForgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Edit rejected: {0}")]
    EditRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SiteForgeError {
    /// Whether this error came from the create path without side effects.
    /// Used by callers that must distinguish "nothing happened" from a
    /// failure that consumed a reservation.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            SiteForgeError::InvalidRequest(_)
                | SiteForgeError::Ledger(LedgerError::CreditLimitExceeded { .. })
        )
    }
}

/// Errors from balance reservation and refund
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(
        "Credit limit exceeded for team {team}: balance {balance_cents}c, \
         limit {limit_cents}c, requested {requested_cents}c"
    )]
    CreditLimitExceeded {
        team: String,
        balance_cents: i64,
        limit_cents: i64,
        requested_cents: i64,
    },

    #[error("Unknown team: {0}")]
    UnknownTeam(String),

    #[error("Balance update for team {0} kept losing the compare-and-swap race")]
    Contention(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the text-generation backend
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider rate limited the request")]
    RateLimited,

    #[error("Provider rejected the request: payment required")]
    PaymentRequired,

    #[error("Provider call timed out after {0} seconds")]
    Timeout(u64),

    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("No model configured for tier {0}")]
    UnknownTier(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(0)
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                429 => ProviderError::RateLimited,
                402 => ProviderError::PaymentRequired,
                code => ProviderError::Http {
                    status: code,
                    message: err.to_string(),
                },
            }
        } else {
            ProviderError::RequestFailed(err.to_string())
        }
    }
}

/// Errors from parsing provider output into a file set
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("No file blocks found in provider output")]
    NoFilesParsed,
}

/// Errors from building the output archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to write archive entry {path}: {source}")]
    Entry {
        path: String,
        source: std::io::Error,
    },

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Errors from the persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read state file {0}: {1}")]
    ReadError(std::path::PathBuf, std::io::Error),

    #[error("Failed to write state file {0}: {1}")]
    WriteError(std::path::PathBuf, std::io::Error),

    #[error("Failed to parse state file {0}: {1}")]
    ParseError(std::path::PathBuf, String),

    #[error("Failed to lock state file {0}: {1}")]
    LockError(std::path::PathBuf, std::io::Error),

    #[error("Job not found in store: {0}")]
    JobNotFound(String),

    #[error("Team not found in store: {0}")]
    TeamNotFound(String),
}

pub type Result<T> = std::result::Result<T, SiteForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_limit_message_carries_amounts() {
        let err = LedgerError::CreditLimitExceeded {
            team: "team-1".to_string(),
            balance_cents: 200,
            limit_cents: 0,
            requested_cents: 700,
        };
        let msg = err.to_string();
        assert!(msg.contains("team-1"));
        assert!(msg.contains("200c"));
        assert!(msg.contains("700c"));
    }

    #[test]
    fn test_preflight_classification() {
        let invalid = SiteForgeError::InvalidRequest("prompt missing".to_string());
        assert!(invalid.is_preflight());

        let limit = SiteForgeError::Ledger(LedgerError::CreditLimitExceeded {
            team: "t".to_string(),
            balance_cents: 0,
            limit_cents: 0,
            requested_cents: 1,
        });
        assert!(limit.is_preflight());

        let provider = SiteForgeError::Provider(ProviderError::RateLimited);
        assert!(!provider.is_preflight());
    }

    #[test]
    fn test_no_files_parsed_message() {
        let err = SiteForgeError::Codec(CodecError::NoFilesParsed);
        assert!(err.to_string().contains("No file blocks"));
    }
}
