//! Terminal results of a registration attempt and how they are presented

use crate::registration::error::ProviderErrorCode;
use crate::registration::profile::ProfileRecord;
use serde::Serialize;
use std::time::Duration;

pub const SUCCESS_MESSAGE: &str =
    "Registration successful! Please check your email to verify your account.";
pub const WEAK_PASSWORD_MESSAGE: &str = "Weak password (minimum 6 characters, at least one uppercase letter, one lowercase letter, one special character, and one number)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    CreateAccount,
    SendVerification,
    WriteProfile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    MissingField(&'static str),
    PasswordsDoNotMatch,
}

impl ValidationFailure {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationFailure::MissingField(_) => "missing_field",
            ValidationFailure::PasswordsDoNotMatch => "passwords_do_not_match",
        }
    }

    pub fn message(&self) -> String {
        match self {
            ValidationFailure::MissingField(field) => format!("{} is required", capitalize(field)),
            ValidationFailure::PasswordsDoNotMatch => "Passwords do not match".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Success {
        profile: ProfileRecord,
    },
    ValidationFailure(ValidationFailure),
    ProviderFailure {
        step: WorkflowStep,
        code: ProviderErrorCode,
        message: String,
        /// The identity account created in this attempt was deleted again
        account_rolled_back: bool,
    },
}

impl WorkflowOutcome {
    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        matches!(self, WorkflowOutcome::Success { .. })
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            WorkflowOutcome::Success { .. } => None,
            WorkflowOutcome::ValidationFailure(failure) => Some(failure.code()),
            WorkflowOutcome::ProviderFailure { code, .. } => Some(code.as_str()),
        }
    }

    pub fn notification(&self) -> Notification {
        match self {
            WorkflowOutcome::Success { .. } => Notification::success(SUCCESS_MESSAGE),
            WorkflowOutcome::ValidationFailure(failure) => Notification::error(failure.message()),
            WorkflowOutcome::ProviderFailure { code, message, .. } => {
                Notification::error(provider_message(code, message))
            }
        }
    }
}

/// User-facing text for a provider failure.
pub fn provider_message(code: &ProviderErrorCode, message: &str) -> String {
    match code {
        ProviderErrorCode::EmailAlreadyInUse => "Email already in use".to_string(),
        ProviderErrorCode::InvalidEmail => "Invalid email".to_string(),
        ProviderErrorCode::PasswordDoesNotMeetRequirements => WEAK_PASSWORD_MESSAGE.to_string(),
        ProviderErrorCode::Other(_) => format!("Error signing up: {}", message),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
        }
    }
}

/// Navigation the caller performs once `after` has elapsed following a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    pub after: Duration,
}

impl Redirect {
    pub fn new(to: impl Into<String>, after: Duration) -> Self {
        Self {
            to: to.into(),
            after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: ProviderErrorCode, message: &str) -> WorkflowOutcome {
        WorkflowOutcome::ProviderFailure {
            step: WorkflowStep::CreateAccount,
            code,
            message: message.to_string(),
            account_rolled_back: false,
        }
    }

    #[test]
    fn known_codes_have_fixed_messages() {
        assert_eq!(
            failure(ProviderErrorCode::EmailAlreadyInUse, "EMAIL_EXISTS")
                .notification()
                .message,
            "Email already in use"
        );
        assert_eq!(
            failure(ProviderErrorCode::InvalidEmail, "INVALID_EMAIL")
                .notification()
                .message,
            "Invalid email"
        );
        assert_eq!(
            failure(ProviderErrorCode::PasswordDoesNotMeetRequirements, "WEAK_PASSWORD")
                .notification()
                .message,
            WEAK_PASSWORD_MESSAGE
        );
    }

    #[test]
    fn other_codes_include_provider_text() {
        let outcome = failure(
            ProviderErrorCode::Other("operation_not_allowed".to_string()),
            "OPERATION_NOT_ALLOWED",
        );
        let note = outcome.notification();
        assert_eq!(note.kind, NotificationKind::Error);
        assert_eq!(note.message, "Error signing up: OPERATION_NOT_ALLOWED");
        assert_eq!(outcome.code(), Some("operation_not_allowed"));
    }

    #[test]
    fn validation_messages() {
        let mismatch = WorkflowOutcome::ValidationFailure(ValidationFailure::PasswordsDoNotMatch);
        assert_eq!(mismatch.notification().message, "Passwords do not match");
        assert_eq!(mismatch.code(), Some("passwords_do_not_match"));

        let missing = WorkflowOutcome::ValidationFailure(ValidationFailure::MissingField("username"));
        assert_eq!(missing.notification().message, "Username is required");
    }
}
