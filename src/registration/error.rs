//! Error types for user registration

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Failed to read credentials file: {0}")]
    CredentialsFileError(#[from] std::io::Error),

    #[error("Failed to parse credentials: {0}")]
    CredentialsParseError(#[from] serde_json::Error),

    #[error("HTTP transport error: {0}")]
    TransportError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Failure code reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderErrorCode {
    EmailAlreadyInUse,
    InvalidEmail,
    PasswordDoesNotMeetRequirements,
    Other(String),
}

impl ProviderErrorCode {
    /// Maps a raw provider code onto the codes the workflow distinguishes.
    ///
    /// Accepts the Identity Toolkit REST spelling (`EMAIL_EXISTS`,
    /// `WEAK_PASSWORD : Password should be ...`) as well as the client SDK
    /// spelling (`auth/email-already-in-use`).
    pub fn from_provider(raw: &str) -> Self {
        let raw = raw.trim();
        let raw = raw.strip_prefix("auth/").unwrap_or(raw);
        let token = raw
            .split(|c: char| c == ':' || c.is_whitespace())
            .next()
            .unwrap_or_default()
            .replace('-', "_")
            .to_uppercase();

        match token.as_str() {
            "EMAIL_EXISTS" | "EMAIL_ALREADY_IN_USE" => Self::EmailAlreadyInUse,
            "INVALID_EMAIL" | "MISSING_EMAIL" => Self::InvalidEmail,
            "WEAK_PASSWORD" | "PASSWORD_DOES_NOT_MEET_REQUIREMENTS" => {
                Self::PasswordDoesNotMeetRequirements
            }
            "" => Self::Other("unknown".to_string()),
            other => Self::Other(other.to_lowercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::EmailAlreadyInUse => "email_already_in_use",
            Self::InvalidEmail => "invalid_email",
            Self::PasswordDoesNotMeetRequirements => "password_does_not_meet_requirements",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed identity provider call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The request never produced a provider answer (connect failure, garbled body).
    pub fn network(err: impl fmt::Display) -> Self {
        Self::new(
            ProviderErrorCode::Other("network_request_failed".to_string()),
            err.to_string(),
        )
    }
}

/// A failed document store call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct StoreError {
    pub code: String,
    pub message: String,
}

impl StoreError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn network(err: impl fmt::Display) -> Self {
        Self::new("network_request_failed", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rest_api_codes() {
        assert_eq!(
            ProviderErrorCode::from_provider("EMAIL_EXISTS"),
            ProviderErrorCode::EmailAlreadyInUse
        );
        assert_eq!(
            ProviderErrorCode::from_provider("INVALID_EMAIL"),
            ProviderErrorCode::InvalidEmail
        );
        assert_eq!(
            ProviderErrorCode::from_provider(
                "WEAK_PASSWORD : Password should be at least 6 characters"
            ),
            ProviderErrorCode::PasswordDoesNotMeetRequirements
        );
        assert_eq!(
            ProviderErrorCode::from_provider(
                "PASSWORD_DOES_NOT_MEET_REQUIREMENTS:Missing password requirements: [Password must contain an upper case character]"
            ),
            ProviderErrorCode::PasswordDoesNotMeetRequirements
        );
    }

    #[test]
    fn maps_sdk_codes() {
        assert_eq!(
            ProviderErrorCode::from_provider("auth/email-already-in-use"),
            ProviderErrorCode::EmailAlreadyInUse
        );
        assert_eq!(
            ProviderErrorCode::from_provider("auth/password-does-not-meet-requirements"),
            ProviderErrorCode::PasswordDoesNotMeetRequirements
        );
    }

    #[test]
    fn unknown_codes_are_kept_lowercased() {
        let code = ProviderErrorCode::from_provider("TOO_MANY_ATTEMPTS_TRY_LATER : slow down");
        assert_eq!(code, ProviderErrorCode::Other("too_many_attempts_try_later".to_string()));
        assert_eq!(code.as_str(), "too_many_attempts_try_later");

        assert_eq!(
            ProviderErrorCode::from_provider("   "),
            ProviderErrorCode::Other("unknown".to_string())
        );
    }
}
