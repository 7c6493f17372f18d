//! Registration form state at the UI boundary
//!
//! Holds the four required fields, the password visibility toggles and the
//! loading flag that keeps a form to one in-flight submission.

use crate::registration::outcome::WorkflowOutcome;
use crate::registration::workflow::{RegistrationRequest, RegistrationWorkflow};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormError {
    #[error("A registration is already in progress")]
    SubmissionInFlight,
}

pub struct RegistrationForm {
    workflow: Arc<RegistrationWorkflow>,
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    show_password: bool,
    show_confirm_password: bool,
    is_loading: AtomicBool,
}

impl RegistrationForm {
    pub fn new(workflow: Arc<RegistrationWorkflow>) -> Self {
        Self {
            workflow,
            username: String::new(),
            email: String::new(),
            password: String::new(),
            confirm_password: String::new(),
            show_password: false,
            show_confirm_password: false,
            is_loading: AtomicBool::new(false),
        }
    }

    pub fn request(&self) -> RegistrationRequest {
        RegistrationRequest::new(
            self.email.clone(),
            self.username.clone(),
            self.password.clone(),
            self.confirm_password.clone(),
        )
    }

    /// Submits the current field values.
    ///
    /// Fields are left untouched whatever the outcome, so a failed attempt
    /// can be corrected and resubmitted.
    pub async fn submit(&self) -> Result<WorkflowOutcome, FormError> {
        let _loading = LoadingGuard::acquire(&self.is_loading).ok_or(FormError::SubmissionInFlight)?;
        Ok(self.workflow.submit(self.request()).await)
    }
}

// Read by a rendering front end; the CLI only fills and submits the form.
#[allow(dead_code)]
impl RegistrationForm {
    pub fn is_loading(&self) -> bool {
        self.is_loading.load(Ordering::SeqCst)
    }

    pub fn toggle_password_visibility(&mut self) {
        self.show_password = !self.show_password;
    }

    pub fn toggle_confirm_password_visibility(&mut self) {
        self.show_confirm_password = !self.show_confirm_password;
    }

    /// HTML input type for the password field.
    pub fn password_input_type(&self) -> &'static str {
        input_type(self.show_password)
    }

    pub fn confirm_password_input_type(&self) -> &'static str {
        input_type(self.show_confirm_password)
    }
}

fn input_type(visible: bool) -> &'static str {
    if visible {
        "text"
    } else {
        "password"
    }
}

/// Clears the loading flag when dropped, including on cancellation.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoadingGuard(flag))
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
