use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::ai::{AiService, LogAiService};
use crate::config::Config;
use crate::error::AuthError;
use crate::security::audit_log::AuditLogger;
use crate::security::credentials::{CredentialStore, InMemoryCredentialStore};
use crate::security::gate::{require_auth, require_roles, Gate, RoleGuard};
use crate::security::otp::{spawn_sweeper, LogNotifier, OtpManager, OtpNotifier};
use crate::security::{FieldCipher, Role, TokenIssuer};

pub mod auth;
pub mod records;

pub type SharedState = Arc<AppState>;

#[derive(Debug, Clone)]
pub struct AppState {
    pub issuer: Arc<TokenIssuer>,
    pub gate: Gate,
    pub otp: OtpManager,
    pub credentials: Arc<dyn CredentialStore>,
    pub ai: Arc<dyn AiService>,
    pub cipher: FieldCipher,
    pub expose_otp: bool,
    pub collaborator_timeout: Duration,
    pub audit: AuditLogger,
}

impl AppState {
    /// Wires the core from a validated configuration.
    pub fn new(
        config: &Config,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn OtpNotifier>,
    ) -> Result<Self, AuthError> {
        let issuer = Arc::new(TokenIssuer::new(&config.auth)?);
        let otp = OtpManager::new(
            Arc::clone(&credentials),
            notifier,
            &config.otp,
            config.collaborator_timeout,
        );
        Ok(Self {
            gate: Gate::new(Arc::clone(&issuer)),
            issuer,
            otp,
            credentials,
            ai: Arc::new(LogAiService),
            cipher: FieldCipher::from_key(&config.field_key),
            expose_otp: config.otp.expose_code,
            collaborator_timeout: config.collaborator_timeout,
            audit: AuditLogger::new(),
        })
    }

    /// Replaces the disconnected default with a live AI service client.
    pub fn with_ai_service(mut self, ai: Arc<dyn AiService>) -> Self {
        self.ai = ai;
        self
    }
}

async fn index() -> impl IntoResponse {
    Json(json!({
        "message": "MediBridge API is running",
        "version": crate::VERSION,
        "endpoints": {
            "health": "GET /health",
            "status": "GET /v1/status",
            "auth": {
                "login": "POST /v1/auth/login",
                "otp_request": "POST /v1/auth/otp/request",
                "otp_verify": "POST /v1/auth/otp/verify",
            },
        },
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "MediBridge API is running",
        "version": crate::VERSION,
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

fn guarded(router: Router<SharedState>, allowed: &[Role]) -> Router<SharedState> {
    router.route_layer(from_fn_with_state(RoleGuard::new(allowed), require_roles))
}

pub fn create_router(state: SharedState) -> Router {
    let public = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/v1/status", get(status))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/otp/request", post(auth::request_otp))
        .route("/v1/auth/otp/verify", post(auth::verify_otp));

    let patient = guarded(
        Router::new()
            .route("/prescriptions", get(records::patient_prescriptions))
            .route("/adherence", post(records::log_adherence))
            .route("/reports", get(records::patient_reports)),
        &[Role::Patient],
    );
    let chatbot = guarded(
        Router::new().route("/query", post(records::chatbot_query)),
        &[Role::Patient],
    );
    let clinic = guarded(
        Router::new()
            .route("/prescriptions/new", post(records::create_prescription))
            .route("/patients/search", get(records::search_patients))
            .route("/patients/{id}/full", get(records::patient_full_record))
            .route("/drugs", get(records::list_drugs))
            .route("/drugs/search", get(records::search_drugs)),
        &[Role::Clinic],
    );
    let scanning = guarded(
        Router::new()
            .route("/reports/upload", post(records::upload_report))
            .route("/reports/{id}/finalize", post(records::finalize_report)),
        &[Role::Scanning],
    );
    let admin = guarded(
        Router::new().route("/drugs/upload", post(records::upload_drugs)),
        &[Role::Admin, Role::Clinic],
    );

    // Authentication wraps every protected route, outside the role guards.
    let protected = Router::new()
        .nest("/v1/patient", patient)
        .nest("/v1/chatbot", chatbot)
        .nest("/v1/clinic", clinic)
        .nest("/v1/scanning", scanning)
        .nest("/v1/admin", admin)
        .route_layer(from_fn_with_state(state.gate.clone(), require_auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Builds the application from the environment and serves it until shutdown.
pub async fn serve(config: Config, port: u16) -> Result<()> {
    let credentials: Arc<dyn CredentialStore> = match &config.users_file {
        Some(path) => Arc::new(
            InMemoryCredentialStore::from_file(path)
                .with_context(|| format!("loading user directory from {path}"))?,
        ),
        None => {
            tracing::warn!("USERS_FILE not set; no principals can log in");
            Arc::new(InMemoryCredentialStore::default())
        }
    };
    let state = Arc::new(
        AppState::new(&config, credentials, Arc::new(LogNotifier))
            .context("initialising authentication core")?,
    );
    if state.expose_otp {
        tracing::warn!("EXPOSE_OTP is enabled; codes are echoed to requesters");
    }

    spawn_sweeper(state.otp.clone(), config.otp.sweep_interval);

    let app = create_router(state).into_make_service_with_connect_info::<SocketAddr>();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("MediBridge API listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
    info!("shutdown signal received");
}
