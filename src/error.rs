//! Error types shared by the ingestion core.
//!
//! Mailbox and store failures are fatal to a run; generation failures are
//! absorbed by the classifier and never leave it.

use thiserror::Error;

/// Failures talking to the mail server.
#[derive(Error, Debug)]
pub enum MailboxError {
    /// TCP connection could not be established.
    #[error("IMAP connection failed: {0}")]
    Connection(String),

    /// TLS handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server rejected the credentials.
    #[error("IMAP authentication failed: {0}")]
    Auth(String),

    /// A command was rejected or returned something unexpected.
    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    /// An operation exceeded the configured timeout.
    #[error("IMAP operation timed out after {0}s: {1}")]
    Timeout(u64, String),

    /// The server did not return a message that was requested.
    #[error("message with UID {0} missing from fetch response")]
    MissingMessage(u32),
}

impl From<async_native_tls::Error> for MailboxError {
    fn from(err: async_native_tls::Error) -> Self {
        MailboxError::Tls(err.to_string())
    }
}

impl MailboxError {
    /// Connection-level failures that mean the mailbox is unreachable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MailboxError::Connection(_) | MailboxError::Tls(_) | MailboxError::Timeout(..)
        )
    }
}

/// Failures of the external text-generation service.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("request to text-generation service failed: {0}")]
    Request(String),

    #[error("text-generation service returned status {0}")]
    Status(u16),

    #[error("text-generation service timed out")]
    Timeout,

    #[error("malformed response from text-generation service: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout
        } else if err.is_decode() {
            GenerationError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            GenerationError::Status(status.as_u16())
        } else {
            GenerationError::Request(err.to_string())
        }
    }
}

/// Failures of the summary store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row holds a value this version cannot represent.
    #[error("invalid stored record: {0}")]
    InvalidRecord(String),
}

/// Failures reading or writing the watermark file.
#[derive(Error, Debug)]
pub enum WatermarkError {
    #[error("watermark IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watermark file {path} does not hold a UID: {content:?}")]
    Corrupt { path: String, content: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors() {
        assert!(MailboxError::Connection("refused".into()).is_transport());
        assert!(MailboxError::Timeout(60, "login".into()).is_transport());
        assert!(!MailboxError::Auth("bad password".into()).is_transport());
        assert!(!MailboxError::MissingMessage(7).is_transport());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            MailboxError::MissingMessage(42).to_string(),
            "message with UID 42 missing from fetch response"
        );
        assert_eq!(
            GenerationError::Status(503).to_string(),
            "text-generation service returned status 503"
        );
    }
}
