//! One-time password challenges.
//!
//! Each owner key (phone + role) moves `NoChallenge -> Pending -> {Consumed, Expired}`.
//! Any verification attempt consumes the pending challenge, matched or not.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rand::{rngs::OsRng, Rng};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::OtpConfig;
use crate::error::AuthError;
use crate::security::audit_log::{mask_phone, AuditLogger};
use crate::security::credentials::{bounded, CredentialStore};
use crate::security::rate_limit::RateLimiter;
use crate::security::roles::{Principal, Role};

pub const CODE_LEN: usize = 6;

/// One-way delivery sink for issued codes (SMS gateway and the like).
#[async_trait]
pub trait OtpNotifier: Send + Sync {
    async fn notify(&self, phone: &str, code: &str) -> anyhow::Result<()>;
}

/// Records the dispatch without the code itself.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl OtpNotifier for LogNotifier {
    async fn notify(&self, phone: &str, _code: &str) -> anyhow::Result<()> {
        info!(phone = %mask_phone(phone), "OTP dispatched");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerKey {
    pub phone: String,
    pub role: Role,
}

impl OwnerKey {
    pub fn new(phone: &str, role: Role) -> Self {
        Self {
            phone: phone.to_string(),
            role,
        }
    }
}

struct Challenge {
    code: Zeroizing<String>,
    expires_at: DateTime<Utc>,
}

/// Result of a successful challenge request.
///
/// `code` is for delivery and non-production echo only.
#[derive(Debug, Clone)]
pub struct OtpIssued {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OtpManager {
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn OtpNotifier>,
    challenges: Arc<Mutex<HashMap<OwnerKey, Challenge>>>,
    limiter: RateLimiter,
    ttl: TimeDelta,
    timeout: Duration,
    audit: AuditLogger,
}

impl fmt::Debug for OtpManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpManager")
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OtpManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn OtpNotifier>,
        config: &OtpConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            challenges: Arc::new(Mutex::new(HashMap::new())),
            limiter: RateLimiter::new_per_minute(config.requests_per_minute),
            ttl: config.ttl,
            timeout,
            audit: AuditLogger::new(),
        }
    }

    pub async fn request(&self, phone: &str, role: Role) -> Result<OtpIssued, AuthError> {
        self.request_at(phone, role, Utc::now()).await
    }

    pub async fn request_at(
        &self,
        phone: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<OtpIssued, AuthError> {
        if phone.trim().is_empty() {
            return Err(AuthError::InvalidInput("phone is required".to_string()));
        }
        if !self.limiter.allow(phone).await {
            self.audit.rate_limited(phone);
            return Err(AuthError::RateLimited);
        }

        // Never issue a code for an unknown phone/role pair.
        if let Err(e) = bounded(
            self.timeout,
            "credential store",
            self.store.lookup_by_mobile_and_role(phone, role),
        )
        .await
        {
            if e == AuthError::NotFound {
                self.audit.otp_rejected(phone, role, "unknown owner");
            }
            return Err(e);
        }

        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AuthError::InvalidInput("request time out of range".to_string()))?;
        let code = generate_code();
        {
            let mut challenges = self.challenges.lock().await;
            let replaced = challenges
                .insert(
                    OwnerKey::new(phone, role),
                    Challenge {
                        code: Zeroizing::new(code.clone()),
                        expires_at,
                    },
                )
                .is_some();
            if replaced {
                debug!(phone = %mask_phone(phone), "pending OTP replaced");
            }
        }
        self.audit.otp_issued(phone, role);
        self.dispatch(phone, &code);

        Ok(OtpIssued { code, expires_at })
    }

    /// Checks `supplied` against the pending challenge and resolves the owner.
    pub async fn verify(
        &self,
        phone: &str,
        role: Role,
        supplied: &str,
    ) -> Result<Principal, AuthError> {
        self.verify_at(phone, role, supplied, Utc::now()).await
    }

    pub async fn verify_at(
        &self,
        phone: &str,
        role: Role,
        supplied: &str,
        now: DateTime<Utc>,
    ) -> Result<Principal, AuthError> {
        let key = OwnerKey::new(phone, role);
        let outcome = {
            let mut challenges = self.challenges.lock().await;
            match challenges.remove(&key) {
                None => Err(AuthError::NotFound),
                Some(challenge) if now > challenge.expires_at => Err(AuthError::Expired),
                Some(challenge) => {
                    if challenge.code.as_bytes().ct_eq(supplied.as_bytes()).unwrap_u8() == 1 {
                        Ok(())
                    } else {
                        Err(AuthError::Mismatch)
                    }
                }
            }
        };

        if let Err(e) = outcome {
            let reason = match e {
                AuthError::NotFound => "no pending code",
                AuthError::Expired => "code expired",
                _ => "code mismatch",
            };
            self.audit.otp_rejected(phone, role, reason);
            return Err(e);
        }

        bounded(
            self.timeout,
            "credential store",
            self.store.lookup_by_mobile_and_role(phone, role),
        )
        .await
    }

    /// Removes every expired challenge; returns how many were reclaimed.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let removed = {
            let mut challenges = self.challenges.lock().await;
            let before = challenges.len();
            challenges.retain(|_, c| now <= c.expires_at);
            before - challenges.len()
        };
        self.limiter.purge().await;
        removed
    }

    pub async fn pending(&self) -> usize {
        self.challenges.lock().await.len()
    }

    // Delivery is fire-and-forget: the challenge is already stored.
    fn dispatch(&self, phone: &str, code: &str) {
        let notifier = Arc::clone(&self.notifier);
        let timeout = self.timeout;
        let phone = phone.to_string();
        let code = Zeroizing::new(code.to_string());
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, notifier.notify(&phone, &code)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(phone = %mask_phone(&phone), error = %e, "OTP delivery failed")
                }
                Err(_) => warn!(phone = %mask_phone(&phone), "OTP delivery timed out"),
            }
        });
    }
}

/// Uniform 6-digit code from the OS CSPRNG, zero padded.
pub fn generate_code() -> String {
    let n: u32 = OsRng.gen_range(0..1_000_000);
    format!("{n:0width$}", width = CODE_LEN)
}

/// Periodically reclaims abandoned challenges.
pub fn spawn_sweeper(manager: OtpManager, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            let removed = manager.sweep().await;
            if removed > 0 {
                debug!(removed, "swept expired OTP challenges");
            }
        }
    })
}
