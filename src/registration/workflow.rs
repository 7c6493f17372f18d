//! Registration workflow: create account, send verification, write profile.

use crate::registration::config::RegistrationConfig;
use crate::registration::error::{ProviderError, ProviderErrorCode};
use crate::registration::identity::{IdentityAccount, IdentityProvider};
use crate::registration::outcome::{ValidationFailure, WorkflowOutcome, WorkflowStep};
use crate::registration::profile::ProfileRecord;
use crate::registration::user_directory::DocumentStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// What to do with an identity account when a later step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Delete the account so the email can be registered again.
    #[default]
    Rollback,
    /// Leave the account in place without a profile.
    Keep,
}

/// Absent fields deserialize as empty strings and fail validation as missing.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(alias = "passwordConfirmation")]
    pub password_confirmation: String,
}

impl RegistrationRequest {
    pub fn new(
        email: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        password_confirmation: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            password: password.into(),
            password_confirmation: password_confirmation.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationFailure> {
        let required = [
            ("username", self.username.trim()),
            ("email", self.email.trim()),
            ("password", self.password.as_str()),
            ("password confirmation", self.password_confirmation.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(ValidationFailure::MissingField(*field));
        }
        if self.password != self.password_confirmation {
            return Err(ValidationFailure::PasswordsDoNotMatch);
        }
        Ok(())
    }
}

impl fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("email", &self.email)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

pub struct RegistrationWorkflow {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    collection: String,
    orphan_policy: OrphanPolicy,
}

impl RegistrationWorkflow {
    pub fn new(identity: Arc<dyn IdentityProvider>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            identity,
            store,
            collection: "users".to_string(),
            orphan_policy: OrphanPolicy::default(),
        }
    }

    pub fn from_config(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        config: &RegistrationConfig,
    ) -> Self {
        Self::new(identity, store)
            .with_collection(config.users_collection.clone())
            .with_orphan_policy(config.orphan_policy)
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }

    /// Runs one registration attempt to completion.
    ///
    /// Steps run strictly in order and the first failure ends the attempt.
    /// Nothing is retried.
    #[instrument(skip_all, fields(email = %request.email))]
    pub async fn submit(&self, request: RegistrationRequest) -> WorkflowOutcome {
        if let Err(failure) = request.validate() {
            warn!("Rejected registration: {}", failure.code());
            return WorkflowOutcome::ValidationFailure(failure);
        }

        let email = request.email.trim();
        let username = request.username.trim();

        let account = match self.identity.create_account(email, &request.password).await {
            Ok(account) => account,
            Err(e) => {
                warn!("Account creation failed: {}", e);
                return failure(WorkflowStep::CreateAccount, e, false);
            }
        };
        info!("Created account {}", account.uid);

        if let Err(e) = self.identity.send_verification_email(&account).await {
            warn!("Sending verification email failed: {}", e);
            let rolled_back = self.release_orphan(&account).await;
            return failure(WorkflowStep::SendVerification, e, rolled_back);
        }

        let profile = ProfileRecord::new(&account, username);
        let written = match profile.to_document() {
            Ok(document) => self
                .store
                .write(&self.collection, &profile.uid, &document)
                .await
                .map_err(|e| ProviderError::new(ProviderErrorCode::Other(e.code), e.message)),
            Err(e) => Err(ProviderError::new(
                ProviderErrorCode::Other("serialization".to_string()),
                e.to_string(),
            )),
        };
        if let Err(e) = written {
            warn!("Profile write failed: {}", e);
            let rolled_back = self.release_orphan(&account).await;
            return failure(WorkflowStep::WriteProfile, e, rolled_back);
        }

        info!(
            "Registered '{}' as {}/{}",
            profile.username, self.collection, profile.uid
        );
        WorkflowOutcome::Success { profile }
    }

    /// Applies the orphan policy; returns whether the account is gone.
    async fn release_orphan(&self, account: &IdentityAccount) -> bool {
        match self.orphan_policy {
            OrphanPolicy::Keep => {
                warn!("Keeping orphaned account {}", account.uid);
                false
            }
            OrphanPolicy::Rollback => match self.identity.delete_account(account).await {
                Ok(()) => {
                    info!("Rolled back account {}", account.uid);
                    true
                }
                Err(e) => {
                    error!("Rollback of account {} failed: {}", account.uid, e);
                    false
                }
            },
        }
    }
}

fn failure(step: WorkflowStep, error: ProviderError, account_rolled_back: bool) -> WorkflowOutcome {
    WorkflowOutcome::ProviderFailure {
        step,
        code: error.code,
        message: error.message,
        account_rolled_back,
    }
}
