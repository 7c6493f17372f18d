//! User registration against Firebase Authentication and Cloud Firestore

pub mod auth;
pub mod config;
pub mod error;
pub mod form;
pub mod identity;
pub mod memory;
pub mod outcome;
pub mod profile;
pub mod user_directory;
pub mod workflow;

pub use auth::FirebaseAuth;
pub use config::{Backend, RegistrationConfig};
pub use form::RegistrationForm;
pub use identity::{FirebaseIdentity, IdentityProvider};
pub use memory::{InMemoryIdentity, InMemoryStore};
pub use outcome::{NotificationKind, Redirect, WorkflowOutcome};
pub use user_directory::{DocumentStore, UserDirectory};
pub use workflow::{RegistrationRequest, RegistrationWorkflow};
