use chrono::TimeDelta;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::security::cipher::KEY_LEN;

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
pub const DEFAULT_OTP_TTL_SECS: i64 = 5 * 60;
pub const DEFAULT_OTP_REQUESTS_PER_MIN: usize = 5;
pub const DEFAULT_OTP_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 3000;
pub const MAX_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;
pub const MAX_OTP_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// HMAC secret used to sign assertions.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningSecret")
            .field("len", &self.0.len())
            .finish()
    }
}

/// 256-bit key for field-level encryption.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FieldKey([u8; KEY_LEN]);

impl FieldKey {
    /// Accepts either 32 raw bytes or 64 hex characters.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let bytes = if raw.len() == KEY_LEN * 2 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            hex::decode(raw).map_err(|e| ConfigError::Invalid {
                var: "AES_256_KEY",
                reason: e.to_string(),
            })?
        } else {
            raw.as_bytes().to_vec()
        };
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| ConfigError::Invalid {
            var: "AES_256_KEY",
            reason: format!("must be exactly {KEY_LEN} bytes, got {}", bytes.len()),
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldKey(..)")
    }
}

/// Token issuance settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub signing_secret: SigningSecret,
    pub token_ttl: TimeDelta,
}

/// OTP challenge settings.
#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub ttl: TimeDelta,
    pub requests_per_minute: usize,
    pub sweep_interval: Duration,
    /// Echo issued codes back to the requester. Never enable in production.
    pub expose_code: bool,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl: TimeDelta::seconds(DEFAULT_OTP_TTL_SECS),
            requests_per_minute: DEFAULT_OTP_REQUESTS_PER_MIN,
            sweep_interval: Duration::from_secs(DEFAULT_OTP_SWEEP_INTERVAL_SECS),
            expose_code: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub auth: AuthConfig,
    pub field_key: FieldKey,
    pub otp: OtpConfig,
    pub collaborator_timeout: Duration,
    pub users_file: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds and validates the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let key_raw = lookup("AES_256_KEY").ok_or(ConfigError::Missing("AES_256_KEY"))?;
        let field_key = FieldKey::parse(&key_raw)?;

        let token_ttl_secs = parse_or(&lookup, "TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;
        let otp_ttl_secs = parse_or(&lookup, "OTP_TTL_SECS", DEFAULT_OTP_TTL_SECS)?;
        let token_ttl = bounded_ttl("TOKEN_TTL_SECS", token_ttl_secs, MAX_TOKEN_TTL_SECS)?;
        let otp_ttl = bounded_ttl("OTP_TTL_SECS", otp_ttl_secs, MAX_OTP_TTL_SECS)?;
        let requests_per_minute =
            parse_or(&lookup, "OTP_REQUESTS_PER_MIN", DEFAULT_OTP_REQUESTS_PER_MIN)?;
        let sweep_secs = parse_or(
            &lookup,
            "OTP_SWEEP_INTERVAL_SECS",
            DEFAULT_OTP_SWEEP_INTERVAL_SECS,
        )?;
        let timeout_ms = parse_or(
            &lookup,
            "COLLABORATOR_TIMEOUT_MS",
            DEFAULT_COLLABORATOR_TIMEOUT_MS,
        )?;
        let expose_code = parse_or(&lookup, "EXPOSE_OTP", false)?;

        Ok(Self {
            auth: AuthConfig {
                signing_secret: SigningSecret::new(secret),
                token_ttl,
            },
            field_key,
            otp: OtpConfig {
                ttl: otp_ttl,
                requests_per_minute,
                sweep_interval: Duration::from_secs(sweep_secs.max(1)),
                expose_code,
            },
            collaborator_timeout: Duration::from_millis(timeout_ms),
            users_file: lookup("USERS_FILE").filter(|s| !s.is_empty()),
        })
    }
}

fn invalid(var: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.to_string(),
    }
}

fn bounded_ttl(var: &'static str, secs: i64, max: i64) -> Result<TimeDelta, ConfigError> {
    if secs <= 0 {
        return Err(invalid(var, "must be positive"));
    }
    if secs > max {
        return Err(invalid(var, &format!("must not exceed {max} seconds")));
    }
    TimeDelta::try_seconds(secs).ok_or_else(|| invalid(var, "out of range"))
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}
