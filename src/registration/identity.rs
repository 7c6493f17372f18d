//! Identity provider port and the Firebase Authentication adapter
//!
//! Accounts are created through the Identity Toolkit REST API:
//! `accounts:signUp`, `accounts:sendOobCode` and `accounts:delete`.

use crate::registration::auth::{send_json, HttpsClient};
use crate::registration::config::RegistrationConfig;
use crate::registration::error::{ProviderError, ProviderErrorCode};
use async_trait::async_trait;
use hyper::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, info};

/// Account handle returned by the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityAccount {
    pub uid: String,
    pub email: String,
    /// Session token authorizing follow-up calls for this account
    pub id_token: String,
}

impl IdentityAccount {
    pub fn new(
        uid: impl Into<String>,
        email: impl Into<String>,
        id_token: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            id_token: id_token.into(),
        }
    }
}

impl fmt::Debug for IdentityAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityAccount")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("id_token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityAccount, ProviderError>;

    async fn send_verification_email(&self, account: &IdentityAccount) -> Result<(), ProviderError>;

    /// Removes an account, used to undo a registration that failed halfway.
    async fn delete_account(&self, account: &IdentityAccount) -> Result<(), ProviderError>;
}

pub struct FirebaseIdentity {
    client: HttpsClient,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    local_id: String,
    email: Option<String>,
    id_token: String,
}

impl FirebaseIdentity {
    pub fn new(client: HttpsClient, config: &RegistrationConfig) -> Self {
        info!("FirebaseIdentity using endpoint: {}", config.identity_endpoint);
        Self {
            client,
            endpoint: config.identity_endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/accounts:{}?key={}", self.endpoint, method, self.api_key)
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value, ProviderError> {
        let response = send_json(&self.client, Method::POST, &self.url(method), None, &body)
            .await
            .map_err(ProviderError::network)?;

        if response.status.is_success() {
            Ok(response.body)
        } else {
            Err(provider_error(response.status, &response.body))
        }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityAccount, ProviderError> {
        let body = self
            .call(
                "signUp",
                json!({ "email": email, "password": password, "returnSecureToken": true }),
            )
            .await?;
        let account = account_from_sign_up(body, email)?;
        info!("Created Firebase account {} for {}", account.uid, account.email);
        Ok(account)
    }

    async fn send_verification_email(&self, account: &IdentityAccount) -> Result<(), ProviderError> {
        self.call(
            "sendOobCode",
            json!({ "requestType": "VERIFY_EMAIL", "idToken": account.id_token }),
        )
        .await?;
        debug!("Verification email queued for {}", account.email);
        Ok(())
    }

    async fn delete_account(&self, account: &IdentityAccount) -> Result<(), ProviderError> {
        self.call("delete", json!({ "idToken": account.id_token }))
            .await?;
        info!("Deleted Firebase account {}", account.uid);
        Ok(())
    }
}

fn account_from_sign_up(body: Value, email: &str) -> Result<IdentityAccount, ProviderError> {
    let response: SignUpResponse = serde_json::from_value(body).map_err(|e| {
        ProviderError::new(
            ProviderErrorCode::Other("invalid_response".to_string()),
            format!("Unexpected signUp response: {}", e),
        )
    })?;

    Ok(IdentityAccount {
        uid: response.local_id,
        email: response.email.unwrap_or_else(|| email.to_string()),
        id_token: response.id_token,
    })
}

/// Turns an Identity Toolkit error body into a provider error.
///
/// The body looks like `{"error": {"code": 400, "message": "EMAIL_EXISTS"}}`.
fn provider_error(status: StatusCode, body: &Value) -> ProviderError {
    match body.pointer("/error/message").and_then(Value::as_str) {
        Some(message) => ProviderError::new(ProviderErrorCode::from_provider(message), message),
        None => ProviderError::new(
            ProviderErrorCode::Other(format!("http_{}", status.as_u16())),
            format!("Identity provider returned HTTP {}", status),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sign_up_response() {
        let account = account_from_sign_up(
            json!({
                "kind": "identitytoolkit#SignupNewUserResponse",
                "localId": "tRcfmLH7o2XrNELi9mN6nHZ1kw23",
                "email": "a@b.com",
                "idToken": "eyJ...",
                "refreshToken": "AMf...",
                "expiresIn": "3600"
            }),
            "ignored@b.com",
        )
        .unwrap();

        assert_eq!(account.uid, "tRcfmLH7o2XrNELi9mN6nHZ1kw23");
        assert_eq!(account.email, "a@b.com");
        assert_eq!(account.id_token, "eyJ...");
    }

    #[test]
    fn sign_up_without_token_is_an_invalid_response() {
        let err = account_from_sign_up(json!({ "localId": "x" }), "a@b.com").unwrap_err();
        assert_eq!(
            err.code,
            ProviderErrorCode::Other("invalid_response".to_string())
        );
    }

    #[test]
    fn maps_error_bodies() {
        let err = provider_error(
            StatusCode::BAD_REQUEST,
            &json!({ "error": { "code": 400, "message": "EMAIL_EXISTS", "errors": [] } }),
        );
        assert_eq!(err.code, ProviderErrorCode::EmailAlreadyInUse);
        assert_eq!(err.message, "EMAIL_EXISTS");

        let err = provider_error(StatusCode::BAD_GATEWAY, &json!("<html>oops</html>"));
        assert_eq!(err.code, ProviderErrorCode::Other("http_502".to_string()));
    }

    #[test]
    fn debug_output_hides_token() {
        let account = IdentityAccount::new("uid", "a@b.com", "secret-token");
        let printed = format!("{:?}", account);
        assert!(printed.contains("uid"));
        assert!(!printed.contains("secret-token"));
    }
}
