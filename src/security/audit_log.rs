use tracing::{info, warn};

use crate::security::roles::Role;

/// Structured security events under the `audit` target.
///
/// Codes, passwords and tokens never reach these events; phone numbers are masked.
#[derive(Debug, Clone, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn login_success(&self, subject: &str, role: Role, method: &str) {
        info!(target: "audit", event = "login_success", subject, role = role.as_str(), method);
    }

    pub fn login_failure(&self, mobile: &str, method: &str, reason: &str) {
        warn!(target: "audit", event = "login_failure", mobile = %mask_phone(mobile), method, reason);
    }

    pub fn otp_issued(&self, phone: &str, role: Role) {
        info!(target: "audit", event = "otp_issued", phone = %mask_phone(phone), role = role.as_str());
    }

    pub fn otp_rejected(&self, phone: &str, role: Role, reason: &str) {
        warn!(target: "audit", event = "otp_rejected", phone = %mask_phone(phone), role = role.as_str(), reason);
    }

    pub fn rate_limited(&self, phone: &str) {
        warn!(target: "audit", event = "rate_limited", phone = %mask_phone(phone));
    }

    pub fn token_rejected(&self, path: &str, reason: &str) {
        warn!(target: "audit", event = "token_rejected", path, reason);
    }

    pub fn role_denied(&self, subject: &str, role: Role, path: &str) {
        warn!(target: "audit", event = "role_denied", subject, role = role.as_str(), path);
    }
}

/// Keeps the last four digits.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    let keep = chars.len().min(4);
    let hidden = chars.len() - keep;
    let tail: String = chars[hidden..].iter().collect();
    format!("{}{}", "*".repeat(hidden), tail)
}
