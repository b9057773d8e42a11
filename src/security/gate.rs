//! Authentication and role authorization for protected routes.
//!
//! Two independent middleware stages. Authentication resolves the bearer
//! token into an [`AuthContext`]; authorization checks that context against
//! a route's allow-list. Authentication is always layered outside
//! authorization so a failed token never reaches the role check.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::error::AuthError;
use crate::security::audit_log::AuditLogger;
use crate::security::roles::Role;
use crate::security::token::TokenIssuer;

/// Identity attached to the request once the token checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub subject: String,
    pub role: Role,
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::Unauthenticated("authorization header required"))?
        .to_str()
        .map_err(|_| AuthError::Unauthenticated("invalid authorization format"))?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None)
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() =>
        {
            Ok(token)
        }
        _ => Err(AuthError::Unauthenticated(
            "invalid authorization format, expected 'Bearer <token>'",
        )),
    }
}

/// Exact-match role check. No role implies another.
pub fn authorize(ctx: &AuthContext, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&ctx.role) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

#[derive(Debug, Clone)]
pub struct Gate {
    issuer: Arc<TokenIssuer>,
    audit: AuditLogger,
}

impl Gate {
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        Self {
            issuer,
            audit: AuditLogger::new(),
        }
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let token = bearer_token(headers)?;
        let claims = self.issuer.validate(token).map_err(|e| {
            AuthError::Unauthenticated(match e {
                AuthError::Expired => "token expired",
                _ => "invalid token",
            })
        })?;
        Ok(AuthContext {
            subject: claims.sub,
            role: claims.role,
        })
    }
}

/// Route allow-list for [`require_roles`].
#[derive(Debug, Clone)]
pub struct RoleGuard {
    allowed: Arc<[Role]>,
    audit: AuditLogger,
}

impl RoleGuard {
    pub fn new(allowed: &[Role]) -> Self {
        Self {
            allowed: allowed.into(),
            audit: AuditLogger::new(),
        }
    }
}

pub async fn require_auth(
    State(gate): State<Gate>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    match gate.authenticate(req.headers()) {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            Ok(next.run(req).await)
        }
        Err(e) => {
            let reason = match &e {
                AuthError::Unauthenticated(reason) => *reason,
                _ => "rejected",
            };
            gate.audit.token_rejected(req.uri().path(), reason);
            Err(e)
        }
    }
}

pub async fn require_roles(
    State(guard): State<RoleGuard>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    // Runs inside require_auth; a missing context means the layers were misordered.
    let ctx = req
        .extensions()
        .get::<AuthContext>()
        .ok_or(AuthError::Unauthenticated("authentication required"))?;

    if let Err(e) = authorize(ctx, &guard.allowed) {
        guard.audit.role_denied(&ctx.subject, ctx.role, req.uri().path());
        return Err(e);
    }
    Ok(next.run(req).await)
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::Unauthenticated("authentication required"))
    }
}
