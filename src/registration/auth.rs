//! Google / Firebase authentication and the shared HTTPS client

use crate::registration::error::RegistrationError;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{header, Method, Request, StatusCode};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use std::path::Path;
use tracing::debug;
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::{ServiceAccountAuthenticator, ServiceAccountKey};

pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

pub struct FirebaseAuth;

impl FirebaseAuth {
    pub fn create_client() -> Result<HttpsClient, RegistrationError> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| {
                RegistrationError::TransportError(format!(
                    "Failed to load native root certificates: {}",
                    e
                ))
            })?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        Ok(Client::builder(TokioExecutor::new()).build(connector))
    }

    pub async fn service_account(
        credentials_path: impl AsRef<Path>,
    ) -> Result<DefaultAuthenticator, RegistrationError> {
        let credentials_path = credentials_path.as_ref();

        let key_data = std::fs::read_to_string(credentials_path).map_err(|e| {
            RegistrationError::CredentialsFileError(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to read credentials file '{}': {}",
                    credentials_path.display(),
                    e
                ),
            ))
        })?;

        let service_account_key: ServiceAccountKey = serde_json::from_str(&key_data)?;

        ServiceAccountAuthenticator::builder(service_account_key)
            .build()
            .await
            .map_err(|e| {
                RegistrationError::AuthError(format!("Failed to build authenticator: {}", e))
            })
    }
}

/// Where Firestore bearer tokens come from.
pub enum TokenSource {
    ServiceAccount(DefaultAuthenticator),
    Static(String),
}

impl TokenSource {
    pub async fn bearer(&self) -> Result<String, RegistrationError> {
        match self {
            TokenSource::ServiceAccount(auth) => {
                let token = auth.token(&[DATASTORE_SCOPE]).await.map_err(|e| {
                    RegistrationError::AuthError(format!("Failed to obtain access token: {}", e))
                })?;
                token.token().map(str::to_string).ok_or_else(|| {
                    RegistrationError::AuthError("Token response had no access token".to_string())
                })
            }
            TokenSource::Static(token) => Ok(token.clone()),
        }
    }
}

#[derive(Debug)]
pub struct JsonResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Sends a JSON request and reads the whole response.
///
/// Bodies that are not JSON come back as a `Value::String` so error paths
/// can still report what the server said.
pub async fn send_json(
    client: &HttpsClient,
    method: Method,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
) -> Result<JsonResponse, RegistrationError> {
    let mut builder = Request::builder()
        .method(method)
        .uri(url)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let payload = serde_json::to_vec(body)
        .map_err(|e| RegistrationError::TransportError(format!("Invalid JSON body: {}", e)))?;
    let request = builder
        .body(Full::new(Bytes::from(payload)))
        .map_err(|e| RegistrationError::TransportError(format!("Invalid request: {}", e)))?;

    let response = client
        .request(request)
        .await
        .map_err(|e| RegistrationError::TransportError(format!("Request failed: {}", e)))?;

    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .map_err(|e| RegistrationError::TransportError(format!("Failed to read body: {}", e)))?
        .to_bytes();

    debug!("{} answered HTTP {} ({} bytes)", url_without_query(url), status, bytes.len());

    Ok(JsonResponse {
        status,
        body: parse_body(&bytes),
    })
}

fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

// Identity Toolkit URLs carry the API key in the query string.
fn url_without_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
