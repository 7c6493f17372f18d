mod api;
mod registration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use registration::{
    Backend, DocumentStore, FirebaseAuth, FirebaseIdentity, IdentityProvider, InMemoryIdentity,
    InMemoryStore, NotificationKind, Redirect, RegistrationConfig, RegistrationForm,
    RegistrationWorkflow, UserDirectory, WorkflowOutcome,
};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "signup-service", about = "Account registration backed by Firebase")]
struct Args {
    #[clap(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the registration HTTP API
    Serve {
        #[clap(long)]
        bind: Option<String>,
    },
    /// Register one account; passwords come from SIGNUP_PASSWORD and SIGNUP_PASSWORD_CONFIRMATION
    Register {
        #[clap(long)]
        email: String,
        #[clap(long)]
        username: String,
    },
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
struct AppConfig {
    server: ServerConfig,
    logging: LoggingConfig,
    registration: RegistrationConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
struct ServerConfig {
    bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
struct LoggingConfig {
    level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn init_tracing(cfg: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn build_workflow(cfg: &RegistrationConfig) -> anyhow::Result<RegistrationWorkflow> {
    cfg.validate().context("invalid registration config")?;

    let identity: Arc<dyn IdentityProvider>;
    let store: Arc<dyn DocumentStore>;
    match cfg.backend {
        Backend::Memory => {
            warn!("Using the in-memory registration backend, nothing is persisted");
            identity = Arc::new(InMemoryIdentity::new());
            store = Arc::new(InMemoryStore::new());
        }
        Backend::Firebase => {
            let client = FirebaseAuth::create_client().context("create https client")?;
            store = Arc::new(
                UserDirectory::new(client.clone(), cfg)
                    .await
                    .context("initialize user directory")?,
            );
            identity = Arc::new(FirebaseIdentity::new(client, cfg));
        }
    }

    Ok(RegistrationWorkflow::from_config(identity, store, cfg))
}

async fn serve(cfg: AppConfig, bind: Option<String>) -> anyhow::Result<()> {
    let bind = bind.unwrap_or(cfg.server.bind);
    let addr: SocketAddr = bind.parse().context("parse bind address")?;

    let workflow = Arc::new(build_workflow(&cfg.registration).await?);
    let state = api::AppState::new(workflow, cfg.registration.redirect());
    let app = api::create_router(state);

    let listener = TcpListener::bind(addr).await.context("bind listener")?;
    info!("Registration API listening on {}", addr);
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}

async fn register_once(cfg: AppConfig, email: String, username: String) -> anyhow::Result<()> {
    let password = std::env::var("SIGNUP_PASSWORD").context("SIGNUP_PASSWORD is not set")?;
    let confirmation = std::env::var("SIGNUP_PASSWORD_CONFIRMATION")
        .context("SIGNUP_PASSWORD_CONFIRMATION is not set")?;

    let workflow = Arc::new(build_workflow(&cfg.registration).await?);
    let mut form = RegistrationForm::new(workflow);
    form.email = email;
    form.username = username;
    form.password = password;
    form.confirm_password = confirmation;

    let outcome = form.submit().await?;
    report_outcome(&outcome, &cfg.registration.redirect())
}

fn report_outcome(outcome: &WorkflowOutcome, redirect: &Redirect) -> anyhow::Result<()> {
    let notification = outcome.notification();
    match notification.kind {
        NotificationKind::Success => {
            info!("{}", notification.message);
            if let WorkflowOutcome::Success { profile } = outcome {
                info!("Profile stored for uid {}", profile.uid);
            }
            info!(
                "Continue at {} (the web form redirects after {}s)",
                redirect.to,
                redirect.after.as_secs()
            );
            Ok(())
        }
        NotificationKind::Error => {
            error!("{}", notification.message);
            anyhow::bail!(notification.message)
        }
    }
}

fn load_config(path: &str) -> anyhow::Result<AppConfig> {
    let cfg_text = fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&cfg_text).context("parse config")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = load_config(&args.config)?;
    init_tracing(&cfg.logging);

    match args.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(cfg, bind).await,
        Command::Register { email, username } => register_once(cfg, email, username).await,
    }
}
