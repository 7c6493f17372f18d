//! Configuration for user registration

use crate::registration::error::RegistrationError;
use crate::registration::outcome::Redirect;
use crate::registration::workflow::OrphanPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_IDENTITY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com/v1";

/// Which adapters back the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Firebase,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub backend: Backend,
    /// Web API key of the Firebase project
    pub api_key: String,
    pub project_id: String,
    /// Service account JSON used to authorize Firestore writes
    pub credentials_path: Option<PathBuf>,
    /// Fixed bearer token for Firestore, e.g. "owner" against the emulator
    pub static_token: Option<String>,
    pub identity_endpoint: String,
    pub firestore_endpoint: String,
    pub users_collection: String,
    pub orphan_policy: OrphanPolicy,
    pub sign_in_path: String,
    pub redirect_delay_secs: u64,
}

impl RegistrationConfig {
    pub fn redirect(&self) -> Redirect {
        Redirect::new(
            self.sign_in_path.clone(),
            Duration::from_secs(self.redirect_delay_secs),
        )
    }

    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.users_collection.trim().is_empty() {
            return Err(RegistrationError::ConfigError(
                "users_collection cannot be empty".to_string(),
            ));
        }
        if self.backend == Backend::Memory {
            return Ok(());
        }
        if self.api_key.trim().is_empty() {
            return Err(RegistrationError::ConfigError(
                "api_key is required for the firebase backend".to_string(),
            ));
        }
        if self.project_id.trim().is_empty() {
            return Err(RegistrationError::ConfigError(
                "project_id is required for the firebase backend".to_string(),
            ));
        }
        if self.credentials_path.is_none() && self.static_token.is_none() {
            return Err(RegistrationError::ConfigError(
                "either credentials_path or static_token must be set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
impl RegistrationConfig {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory,
            ..Self::default()
        }
    }

    pub fn with_static_token(mut self, token: impl Into<String>) -> Self {
        self.static_token = Some(token.into());
        self
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Firebase,
            api_key: String::new(),
            project_id: String::new(),
            credentials_path: None,
            static_token: None,
            identity_endpoint: DEFAULT_IDENTITY_ENDPOINT.to_string(),
            firestore_endpoint: DEFAULT_FIRESTORE_ENDPOINT.to_string(),
            users_collection: "users".to_string(),
            orphan_policy: OrphanPolicy::default(),
            sign_in_path: "/sign-in".to_string(),
            redirect_delay_secs: 10,
        }
    }
}
