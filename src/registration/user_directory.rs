//! User directory backed by Cloud Firestore
//! Structure: {collection}/{uid}

use crate::registration::auth::{send_json, FirebaseAuth, HttpsClient, TokenSource};
use crate::registration::config::RegistrationConfig;
use crate::registration::error::{RegistrationError, StoreError};
use async_trait::async_trait;
use hyper::{Method, StatusCode};
use serde_json::{json, Map, Value};
use tracing::info;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create-or-replace the document at `collection/key`.
    async fn write(&self, collection: &str, key: &str, document: &Value) -> Result<(), StoreError>;
}

pub struct UserDirectory {
    client: HttpsClient,
    tokens: TokenSource,
    endpoint: String,
    project_id: String,
}

impl UserDirectory {
    pub async fn new(
        client: HttpsClient,
        config: &RegistrationConfig,
    ) -> Result<Self, RegistrationError> {
        let tokens = match (&config.credentials_path, &config.static_token) {
            (Some(path), _) => TokenSource::ServiceAccount(FirebaseAuth::service_account(path).await?),
            (None, Some(token)) => TokenSource::Static(token.clone()),
            (None, None) => {
                return Err(RegistrationError::ConfigError(
                    "Firestore needs credentials_path or static_token".to_string(),
                ))
            }
        };

        info!("UserDirectory initialized for project: {}", config.project_id);

        Ok(Self {
            client,
            tokens,
            endpoint: config.firestore_endpoint.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
        })
    }

    fn document_url(&self, collection: &str, key: &str) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}/{}",
            self.endpoint, self.project_id, collection, key
        )
    }
}

#[async_trait]
impl DocumentStore for UserDirectory {
    async fn write(&self, collection: &str, key: &str, document: &Value) -> Result<(), StoreError> {
        validate_path(collection, key)?;
        let body = json!({ "fields": to_firestore_fields(document)? });

        let token = self
            .tokens
            .bearer()
            .await
            .map_err(|e| StoreError::new("unauthenticated", e.to_string()))?;

        // PATCH without an update mask replaces the whole document or creates it.
        let response = send_json(
            &self.client,
            Method::PATCH,
            &self.document_url(collection, key),
            Some(&token),
            &body,
        )
        .await
        .map_err(StoreError::network)?;

        if !response.status.is_success() {
            return Err(store_error(response.status, &response.body));
        }

        info!("Wrote document {}/{}", collection, key);
        Ok(())
    }
}

fn validate_path(collection: &str, key: &str) -> Result<(), StoreError> {
    for (name, segment) in [("collection", collection), ("key", key)] {
        if segment.is_empty() || segment.contains('/') {
            return Err(StoreError::new(
                "invalid_argument",
                format!("Invalid document {}: '{}'", name, segment),
            ));
        }
    }
    Ok(())
}

/// Encodes a JSON object as a Firestore `fields` map.
pub fn to_firestore_fields(document: &Value) -> Result<Value, StoreError> {
    match document {
        Value::Object(map) => Ok(encode_map(map)),
        _ => Err(StoreError::new(
            "invalid_argument",
            "Documents must be JSON objects",
        )),
    }
}

fn encode_map(map: &Map<String, Value>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), to_firestore_value(v)))
            .collect(),
    )
}

fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(to_firestore_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_map(map) } }),
    }
}

/// Firestore errors look like
/// `{"error": {"code": 403, "message": "...", "status": "PERMISSION_DENIED"}}`.
fn store_error(status: StatusCode, body: &Value) -> StoreError {
    let code = body
        .pointer("/error/status")
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .unwrap_or_else(|| format!("http_{}", status.as_u16()));
    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Firestore returned HTTP {}", status));
    StoreError::new(code, message)
}
