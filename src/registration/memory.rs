//! In-process identity provider and document store
//!
//! Used by the `memory` backend for local development and by the tests.

use crate::registration::error::{ProviderError, ProviderErrorCode, StoreError};
use crate::registration::identity::{IdentityAccount, IdentityProvider};
use crate::registration::user_directory::DocumentStore;
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

const UID_LEN: usize = 28;

pub struct InMemoryIdentity {
    /// Accounts by lowercased email
    accounts: RwLock<HashMap<String, IdentityAccount>>,
    verifications_sent: RwLock<Vec<String>>,
    deleted: RwLock<Vec<String>>,
    verification_failure: Option<ProviderError>,
    calls: AtomicUsize,
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            verifications_sent: RwLock::new(Vec::new()),
            deleted: RwLock::new(Vec::new()),
            verification_failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn generate_uid() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(UID_LEN)
            .map(char::from)
            .collect()
    }
}

#[cfg(test)]
impl InMemoryIdentity {
    /// Every `send_verification_email` call fails with `error`.
    pub fn with_verification_failure(mut self, error: ProviderError) -> Self {
        self.verification_failure = Some(error);
        self
    }

    /// Total number of provider calls, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn find(&self, email: &str) -> Option<IdentityAccount> {
        self.accounts.read().await.get(&email.to_lowercase()).cloned()
    }

    pub async fn verifications_sent(&self) -> Vec<String> {
        self.verifications_sent.read().await.clone()
    }

    pub async fn deleted_accounts(&self) -> Vec<String> {
        self.deleted.read().await.clone()
    }
}

impl Default for InMemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimum 6 characters with upper, lower, digit and special character.
pub fn meets_password_policy(password: &str) -> bool {
    password.chars().count() >= 6
        && password.chars().any(|c| c.is_uppercase())
        && password.chars().any(|c| c.is_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace())
}

fn plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentity {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityAccount, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !plausible_email(email) {
            return Err(ProviderError::new(ProviderErrorCode::InvalidEmail, "INVALID_EMAIL"));
        }
        if !meets_password_policy(password) {
            return Err(ProviderError::new(
                ProviderErrorCode::PasswordDoesNotMeetRequirements,
                "PASSWORD_DOES_NOT_MEET_REQUIREMENTS",
            ));
        }

        let mut accounts = self.accounts.write().await;
        let key = email.to_lowercase();
        if accounts.contains_key(&key) {
            return Err(ProviderError::new(
                ProviderErrorCode::EmailAlreadyInUse,
                "EMAIL_EXISTS",
            ));
        }

        let account = IdentityAccount::new(
            Self::generate_uid(),
            email,
            format!("memory-{}", Uuid::new_v4()),
        );
        accounts.insert(key, account.clone());
        Ok(account)
    }

    async fn send_verification_email(&self, account: &IdentityAccount) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.verification_failure {
            return Err(error.clone());
        }
        self.verifications_sent.write().await.push(account.uid.clone());
        Ok(())
    }

    async fn delete_account(&self, account: &IdentityAccount) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut accounts = self.accounts.write().await;
        let key = account.email.to_lowercase();
        match accounts.get(&key) {
            Some(existing) if existing.uid == account.uid => {
                accounts.remove(&key);
                self.deleted.write().await.push(account.uid.clone());
                Ok(())
            }
            _ => Err(ProviderError::new(
                ProviderErrorCode::Other("user_not_found".to_string()),
                "USER_NOT_FOUND",
            )),
        }
    }
}

pub struct InMemoryStore {
    documents: RwLock<HashMap<(String, String), Value>>,
    write_log: RwLock<Vec<(String, String)>>,
    failure: Option<StoreError>,
    calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            write_log: RwLock::new(Vec::new()),
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
impl InMemoryStore {
    /// Every write fails with `error`.
    pub fn with_failure(mut self, error: StoreError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Successful writes in order, as `(collection, key)`.
    pub async fn writes(&self) -> Vec<(String, String)> {
        self.write_log.read().await.clone()
    }

    pub async fn get(&self, collection: &str, key: &str) -> Option<Value> {
        self.documents
            .read()
            .await
            .get(&(collection.to_string(), key.to_string()))
            .cloned()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn write(&self, collection: &str, key: &str, document: &Value) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let path = (collection.to_string(), key.to_string());
        self.documents
            .write()
            .await
            .insert(path.clone(), document.clone());
        self.write_log.write().await.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn password_policy() {
        assert!(meets_password_policy("Abc123!"));
        assert!(!meets_password_policy("Ab1!"));
        assert!(!meets_password_policy("abc123!"));
        assert!(!meets_password_policy("ABC123!"));
        assert!(!meets_password_policy("Abcdef!"));
        assert!(!meets_password_policy("Abc1234"));
    }

    #[tokio::test]
    async fn creates_unique_accounts() {
        let identity = InMemoryIdentity::new();
        let account = identity.create_account("a@b.com", "Abc123!").await.unwrap();

        assert_eq!(account.uid.len(), UID_LEN);
        assert!(account.uid.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(account.email, "a@b.com");

        let err = identity
            .create_account("A@B.com", "Abc123!")
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::EmailAlreadyInUse);
        assert_eq!(identity.account_count().await, 1);
    }

    #[tokio::test]
    async fn rejects_bad_email_and_weak_password() {
        let identity = InMemoryIdentity::new();

        let err = identity.create_account("not-an-email", "Abc123!").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::InvalidEmail);

        let err = identity.create_account("a@b.com", "password").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::PasswordDoesNotMeetRequirements);

        assert_eq!(identity.account_count().await, 0);
        assert_eq!(identity.calls(), 2);
    }

    #[tokio::test]
    async fn delete_frees_the_email() {
        let identity = InMemoryIdentity::new();
        let account = identity.create_account("a@b.com", "Abc123!").await.unwrap();

        identity.delete_account(&account).await.unwrap();
        assert!(identity.find("a@b.com").await.is_none());
        assert_eq!(identity.deleted_accounts().await, vec![account.uid.clone()]);

        let err = identity.delete_account(&account).await.unwrap_err();
        assert_eq!(err.code.as_str(), "user_not_found");

        assert!(identity.create_account("a@b.com", "Abc123!").await.is_ok());
    }

    #[tokio::test]
    async fn store_overwrites_by_key() {
        let store = InMemoryStore::new();
        store.write("users", "u1", &json!({ "v": 1 })).await.unwrap();
        store.write("users", "u1", &json!({ "v": 2 })).await.unwrap();

        assert_eq!(store.get("users", "u1").await, Some(json!({ "v": 2 })));
        assert_eq!(store.writes().await.len(), 2);
    }

    #[tokio::test]
    async fn failing_store_records_attempts_only() {
        let store = InMemoryStore::new().with_failure(StoreError::new("unavailable", "down"));
        assert!(store.write("users", "u1", &json!({})).await.is_err());

        assert_eq!(store.calls(), 1);
        assert!(store.writes().await.is_empty());
        assert!(store.get("users", "u1").await.is_none());
    }
}
