use thiserror::Error;

use crate::email::model::EmailId;

pub type Result<T> = std::result::Result<T, MailError>;

/// Normalized failure taxonomy surfaced to callers of the repository.
///
/// Backend adapters translate their own transport and payload errors into
/// one of these variants; nothing backend-specific leaks past the adapter.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("{0} was not found")]
    NotFound(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl MailError {
    pub fn email_not_found(id: EmailId) -> Self {
        MailError::NotFound(format!("Email {}", id))
    }

    pub fn folder_not_found(key: impl std::fmt::Display) -> Self {
        MailError::NotFound(format!("Folder {}", key))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MailError::NotFound(_))
    }
}

impl From<reqwest::Error> for MailError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            MailError::Unknown(format!("Malformed backend response: {}", err))
        } else if err.status().map(|s| s.as_u16()) == Some(404) {
            MailError::NotFound("Remote record".to_string())
        } else if let Some(status) = err.status().filter(|s| s.is_client_error()) {
            MailError::Validation(format!("Backend rejected request ({})", status))
        } else {
            MailError::BackendUnavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MailError {
    fn from(err: serde_json::Error) -> Self {
        MailError::Unknown(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_plain_language() {
        assert_eq!(
            MailError::email_not_found(7).to_string(),
            "Email 7 was not found"
        );
        assert_eq!(
            MailError::folder_not_found("archive").to_string(),
            "Folder archive was not found"
        );
        assert!(MailError::email_not_found(1).is_not_found());
        assert!(!MailError::Validation("x".into()).is_not_found());
    }
}
