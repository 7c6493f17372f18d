//! HTTP API for user registration

use crate::registration::error::ProviderErrorCode;
use crate::registration::outcome::Redirect;
use crate::registration::{RegistrationRequest, RegistrationWorkflow, WorkflowOutcome};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<RegistrationWorkflow>,
    pub redirect: Redirect,
    /// Lowercased emails with a registration currently running
    pub in_flight: Arc<Mutex<HashSet<String>>>,
}

impl AppState {
    pub fn new(workflow: Arc<RegistrationWorkflow>, redirect: Redirect) -> Self {
        Self {
            workflow,
            redirect,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectBody {
    pub to: String,
    pub after_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<RedirectBody>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub service: String,
}

// Configure routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/register", post(register_user))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(StatusResponse {
        status: "ok".to_string(),
        service: "signup-service".to_string(),
    })
}

/// Marks an email as busy until dropped.
struct InFlightClaim {
    set: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlightClaim {
    fn acquire(set: &Arc<Mutex<HashSet<String>>>, key: String) -> Option<Self> {
        let mut guard = set.lock().unwrap_or_else(|e| e.into_inner());
        if !guard.insert(key.clone()) {
            return None;
        }
        Some(Self {
            set: set.clone(),
            key,
        })
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        let mut guard = self.set.lock().unwrap_or_else(|e| e.into_inner());
        guard.remove(&self.key);
    }
}

async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegistrationRequest>,
) -> impl IntoResponse {
    let key = payload.email.trim().to_lowercase();
    let Some(claim) = InFlightClaim::acquire(&state.in_flight, key) else {
        info!("Registration for {} rejected: already in progress", payload.email);
        return (
            StatusCode::CONFLICT,
            Json(RegisterResponse {
                status: "error".to_string(),
                code: Some("registration_in_progress".to_string()),
                message: "A registration for this email is already in progress".to_string(),
                uid: None,
                redirect: None,
            }),
        );
    };

    info!("Registration request for username: {}", payload.username);

    // Runs detached so a dropped connection cannot cancel a half-done registration.
    let workflow = state.workflow.clone();
    let task = tokio::spawn(async move {
        let _claim = claim;
        workflow.submit(payload).await
    });

    match task.await {
        Ok(outcome) => respond(&state.redirect, outcome),
        Err(e) => {
            error!("Registration task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RegisterResponse {
                    status: "error".to_string(),
                    code: Some("internal".to_string()),
                    message: "Registration failed unexpectedly".to_string(),
                    uid: None,
                    redirect: None,
                }),
            )
        }
    }
}

fn respond(redirect: &Redirect, outcome: WorkflowOutcome) -> (StatusCode, Json<RegisterResponse>) {
    let status = status_for(&outcome);
    let notification = outcome.notification();
    let code = outcome.code().map(str::to_string);

    let response = match outcome {
        WorkflowOutcome::Success { profile } => RegisterResponse {
            status: "success".to_string(),
            code,
            message: notification.message,
            uid: Some(profile.uid),
            redirect: Some(RedirectBody {
                to: redirect.to.clone(),
                after_ms: u64::try_from(redirect.after.as_millis()).unwrap_or(u64::MAX),
            }),
        },
        _ => RegisterResponse {
            status: "error".to_string(),
            code,
            message: notification.message,
            uid: None,
            redirect: None,
        },
    };

    (status, Json(response))
}

fn status_for(outcome: &WorkflowOutcome) -> StatusCode {
    match outcome {
        WorkflowOutcome::Success { .. } => StatusCode::CREATED,
        WorkflowOutcome::ValidationFailure(_) => StatusCode::BAD_REQUEST,
        WorkflowOutcome::ProviderFailure { code, .. } => match code {
            ProviderErrorCode::EmailAlreadyInUse => StatusCode::CONFLICT,
            ProviderErrorCode::InvalidEmail
            | ProviderErrorCode::PasswordDoesNotMeetRequirements => StatusCode::BAD_REQUEST,
            ProviderErrorCode::Other(_) => StatusCode::BAD_GATEWAY,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::memory::{InMemoryIdentity, InMemoryStore};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn create_test_state() -> (AppState, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let workflow = RegistrationWorkflow::new(Arc::new(InMemoryIdentity::new()), store.clone());
        let state = AppState::new(
            Arc::new(workflow),
            Redirect::new("/sign-in", Duration::from_secs(10)),
        );
        (state, store)
    }

    fn register_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/register")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn alice() -> serde_json::Value {
        serde_json::json!({
            "email": "a@b.com",
            "username": "alice",
            "password": "Abc123!",
            "passwordConfirmation": "Abc123!"
        })
    }

    async fn read_json(resp: axum::response::Response) -> RegisterResponse {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (state, _) = create_test_state();
        let resp = create_router(state)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_new_user() {
        let (state, store) = create_test_state();
        let resp = create_router(state)
            .oneshot(register_request(alice()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = read_json(resp).await;
        assert_eq!(body.status, "success");
        assert_eq!(
            body.message,
            "Registration successful! Please check your email to verify your account."
        );
        let redirect = body.redirect.unwrap();
        assert_eq!(redirect.to, "/sign-in");
        assert_eq!(redirect.after_ms, 10_000);
        assert_eq!(store.writes().await.len(), 1);
        assert_eq!(store.writes().await[0].1, body.uid.unwrap());
    }

    #[tokio::test]
    async fn test_register_duplicate_user() {
        let (state, store) = create_test_state();
        let app = create_router(state);

        let first = app.clone().oneshot(register_request(alice())).await.unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app.oneshot(register_request(alice())).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let body = read_json(second).await;
        assert_eq!(body.code.as_deref(), Some("email_already_in_use"));
        assert_eq!(body.message, "Email already in use");
        assert_eq!(store.writes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_password_mismatch() {
        let (state, store) = create_test_state();
        let mut payload = alice();
        payload["passwordConfirmation"] = "nope".into();

        let resp = create_router(state)
            .oneshot(register_request(payload))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = read_json(resp).await;
        assert_eq!(body.code.as_deref(), Some("passwords_do_not_match"));
        assert_eq!(body.message, "Passwords do not match");
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_register_missing_confirmation_field() {
        let (state, store) = create_test_state();
        let payload = serde_json::json!({
            "email": "a@b.com",
            "username": "alice",
            "password": "Abc123!"
        });

        let resp = create_router(state)
            .oneshot(register_request(payload))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = read_json(resp).await;
        assert_eq!(body.status, "error");
        assert_eq!(body.code.as_deref(), Some("missing_field"));
        assert_eq!(body.message, "Password confirmation is required");
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_register_rejected_while_same_email_in_flight() {
        let (state, store) = create_test_state();
        state
            .in_flight
            .lock()
            .unwrap()
            .insert("a@b.com".to_string());

        let resp = create_router(state.clone())
            .oneshot(register_request(alice()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = read_json(resp).await;
        assert_eq!(body.code.as_deref(), Some("registration_in_progress"));
        assert_eq!(store.calls(), 0);
        // the rejected request must not release someone else's claim
        assert!(state.in_flight.lock().unwrap().contains("a@b.com"));
    }

    #[tokio::test]
    async fn test_claim_released_after_completion() {
        let (state, _) = create_test_state();
        let resp = create_router(state.clone())
            .oneshot(register_request(alice()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert!(state.in_flight.lock().unwrap().is_empty());
    }

    #[test]
    fn provider_failures_map_to_statuses() {
        let failure = |code: ProviderErrorCode| WorkflowOutcome::ProviderFailure {
            step: crate::registration::outcome::WorkflowStep::CreateAccount,
            code,
            message: String::new(),
            account_rolled_back: false,
        };
        assert_eq!(
            status_for(&failure(ProviderErrorCode::InvalidEmail)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&failure(ProviderErrorCode::Other("internal".to_string()))),
            StatusCode::BAD_GATEWAY
        );
    }
}
