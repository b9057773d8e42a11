use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::SharedState;
use crate::error::AuthError;
use crate::security::credentials::bounded;
use crate::security::roles::Role;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub mobile: String,
    pub password: String,
    /// Needed only when one mobile holds several accounts with the same password.
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub phone: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OtpRequestResponse {
    pub message: String,
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerifyRequest {
    pub phone: String,
    pub role: String,
    pub otp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OtpVerifyResponse {
    pub token: String,
    pub role: Role,
    pub name: String,
}

pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload
        .map(|Json(v)| v)
        .map_err(|_| AuthError::InvalidInput("invalid request format".to_string()))
}

fn require(field: &str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::InvalidInput(format!("{field} is required")));
    }
    Ok(())
}

// POST /v1/auth/login
pub async fn login(
    State(state): State<SharedState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AuthError> {
    let req = body(payload)?;
    require("mobile", &req.mobile)?;
    require("password", &req.password)?;
    let role = req.role.as_deref().map(str::parse::<Role>).transpose()?;

    let principal = match bounded(
        state.collaborator_timeout,
        "credential store",
        state
            .credentials
            .lookup_by_mobile_and_password(&req.mobile, &req.password, role),
    )
    .await
    {
        Ok(p) => p,
        Err(AuthError::NotFound) => {
            state.audit.login_failure(&req.mobile, "password", "invalid credentials");
            return Err(AuthError::Unauthenticated("invalid mobile number or password"));
        }
        Err(e) => return Err(e),
    };

    let issued = state.issuer.issue(&principal.id, principal.role)?;
    state.audit.login_success(&principal.id, principal.role, "password");
    Ok(Json(LoginResponse {
        token: issued.token,
        role: principal.role,
    }))
}

// POST /v1/auth/otp/request
pub async fn request_otp(
    State(state): State<SharedState>,
    payload: Result<Json<OtpRequest>, JsonRejection>,
) -> Result<Json<OtpRequestResponse>, AuthError> {
    let req = body(payload)?;
    require("phone", &req.phone)?;
    let role: Role = req.role.parse()?;

    let issued = state.otp.request(&req.phone, role).await?;
    Ok(Json(OtpRequestResponse {
        message: "OTP sent successfully".to_string(),
        expires_at: issued.expires_at.timestamp(),
        otp: state.expose_otp.then_some(issued.code),
    }))
}

// POST /v1/auth/otp/verify
pub async fn verify_otp(
    State(state): State<SharedState>,
    payload: Result<Json<OtpVerifyRequest>, JsonRejection>,
) -> Result<Json<OtpVerifyResponse>, AuthError> {
    let req = body(payload)?;
    require("phone", &req.phone)?;
    require("otp", &req.otp)?;
    let role: Role = req.role.parse()?;

    let principal = match state.otp.verify(&req.phone, role, &req.otp).await {
        Ok(p) => p,
        Err(e @ (AuthError::NotFound | AuthError::Expired | AuthError::Mismatch)) => {
            state.audit.login_failure(&req.phone, "otp", &e.to_string());
            return Err(AuthError::Unauthenticated(match e {
                AuthError::NotFound => "no OTP found for this number",
                AuthError::Expired => "OTP expired",
                _ => "invalid OTP",
            }));
        }
        Err(e) => return Err(e),
    };

    let issued = state.issuer.issue(&principal.id, principal.role)?;
    state.audit.login_success(&principal.id, principal.role, "otp");
    Ok(Json(OtpVerifyResponse {
        token: issued.token,
        role: principal.role,
        name: principal.name,
    }))
}
