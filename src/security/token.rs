//! Signed, time-bound identity assertions.
//!
//! Tokens are compact JWS strings: `base64url(header).base64url(claims).base64url(mac)`
//! where the MAC is HMAC-SHA256 over the first two segments. Only `HS256` is
//! accepted; anything else in the header is treated as a forgery attempt.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::{AuthConfig, SigningSecret, MAX_TOKEN_TTL_SECS};
use crate::error::AuthError;
use crate::security::roles::Role;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Claim set carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Mints and verifies tokens with a single process-wide secret.
///
/// Holds no mutable state; share it behind an `Arc` freely.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    secret: SigningSecret,
    ttl: TimeDelta,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        if config.signing_secret.is_empty() {
            return Err(AuthError::ConfigMissing("JWT_SECRET"));
        }
        if config.token_ttl <= TimeDelta::zero()
            || config.token_ttl > TimeDelta::seconds(MAX_TOKEN_TTL_SECS)
        {
            return Err(AuthError::ConfigMissing("TOKEN_TTL_SECS"));
        }
        Ok(Self {
            secret: config.signing_secret.clone(),
            ttl: config.token_ttl,
        })
    }

    pub fn issue(&self, subject: &str, role: Role) -> Result<IssuedToken, AuthError> {
        self.issue_at(subject, role, Utc::now())
    }

    pub fn issue_at(
        &self,
        subject: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::ConfigMissing("JWT_SECRET"));
        }
        if subject.is_empty() {
            return Err(AuthError::InvalidInput("empty subject".to_string()));
        }

        let claims = Claims {
            sub: subject.to_string(),
            role,
            iat: now.timestamp(),
            exp: now
                .checked_add_signed(self.ttl)
                .ok_or_else(|| AuthError::InvalidInput("issue time out of range".to_string()))?
                .timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };

        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(signing_input.as_bytes())?);
        Ok(IssuedToken {
            token: format!("{signing_input}.{signature}"),
            claims,
        })
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed);
        };
        if header_b64.is_empty() || claims_b64.is_empty() || sig_b64.is_empty() {
            return Err(AuthError::Malformed);
        }

        let header: Header = decode_segment(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(AuthError::SignatureMismatch);
        }

        // MAC first; claims are untrusted bytes until it verifies.
        let provided = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| AuthError::Malformed)?;
        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        let expected = self.mac(signing_input.as_bytes())?;
        if provided.ct_eq(expected.as_slice()).unwrap_u8() != 1 {
            return Err(AuthError::SignatureMismatch);
        }

        let claims: Claims = decode_segment(claims_b64)?;
        if claims.exp <= now.timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    fn mac(&self, input: &[u8]) -> Result<Vec<u8>, AuthError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| AuthError::ConfigMissing("JWT_SECRET"))?;
        mac.update(input);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, AuthError> {
    let json = serde_json::to_vec(value).map_err(|e| AuthError::InvalidInput(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed)
}
