use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::AuthError;
use crate::security::roles::{Principal, Role};

/// Source of truth for registered principals.
///
/// Both lookups return `NotFound` for any miss, including a wrong password,
/// so callers cannot tell the two apart.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn lookup_by_mobile_and_role(
        &self,
        mobile: &str,
        role: Role,
    ) -> Result<Principal, AuthError>;

    /// `role` narrows the candidates when one mobile holds several accounts.
    /// Without it, a password that opens more than one account is rejected
    /// with `InvalidInput` rather than picking one.
    async fn lookup_by_mobile_and_password(
        &self,
        mobile: &str,
        password: &str,
        role: Option<Role>,
    ) -> Result<Principal, AuthError>;
}

impl std::fmt::Debug for dyn CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialStore")
    }
}

/// A registered user as stored in the directory file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub mobile: String,
    pub name: String,
    pub role: Role,
    /// Argon2 PHC string.
    pub password_hash: String,
}

impl UserRecord {
    fn principal(&self) -> Principal {
        Principal {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }
}

/// Immutable in-process user directory keyed by mobile number.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    by_mobile: Arc<HashMap<String, Vec<UserRecord>>>,
}

impl InMemoryCredentialStore {
    pub fn new(records: Vec<UserRecord>) -> Self {
        let mut by_mobile: HashMap<String, Vec<UserRecord>> = HashMap::new();
        for record in records {
            by_mobile.entry(record.mobile.clone()).or_default().push(record);
        }
        Self {
            by_mobile: Arc::new(by_mobile),
        }
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path).context("reading users file")?;
        let records: Vec<UserRecord> = serde_json::from_str(&raw).context("parsing users JSON")?;
        for record in &records {
            PasswordHash::new(&record.password_hash)
                .map_err(|e| anyhow::anyhow!("user {}: invalid password hash: {e}", record.id))?;
        }
        debug!(count = records.len(), "loaded user directory");
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.by_mobile.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mobile.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn lookup_by_mobile_and_role(
        &self,
        mobile: &str,
        role: Role,
    ) -> Result<Principal, AuthError> {
        self.by_mobile
            .get(mobile)
            .and_then(|records| records.iter().find(|r| r.role == role))
            .map(UserRecord::principal)
            .ok_or(AuthError::NotFound)
    }

    async fn lookup_by_mobile_and_password(
        &self,
        mobile: &str,
        password: &str,
        role: Option<Role>,
    ) -> Result<Principal, AuthError> {
        let candidates: Vec<UserRecord> = self
            .by_mobile
            .get(mobile)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| role.is_none_or(|wanted| r.role == wanted))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let password = Zeroizing::new(password.to_string());

        tokio::task::spawn_blocking(move || {
            if candidates.is_empty() {
                // Burn the same work as a real check so misses are not faster.
                let _ = verify_password(&password, dummy_hash());
                return Err(AuthError::NotFound);
            }
            // Every candidate is checked; no early exit on the first match.
            let matched: Vec<&UserRecord> = candidates
                .iter()
                .filter(|r| verify_password(&password, &r.password_hash))
                .collect();
            match matched.as_slice() {
                [] => Err(AuthError::NotFound),
                [only] => Ok(only.principal()),
                _ => Err(AuthError::InvalidInput(
                    "role is required for this mobile number".to_string(),
                )),
            }
        })
        .await
        .map_err(|e| AuthError::Unavailable(format!("password check aborted: {e}")))?
    }
}

/// Hashes a password into an Argon2id PHC string with a random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::InvalidInput(format!("password hashing failed: {e}")))
}

/// Constant-time verification against a stored PHC string.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "stored password hash is unparseable");
            false
        }
    }
}

fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password("medibridge-timing-pad").unwrap_or_default())
}

/// Runs a collaborator call under a deadline. A timeout is reported, not hidden.
pub async fn bounded<T, F>(limit: Duration, what: &'static str, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, AuthError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(collaborator = what, timeout_ms = limit.as_millis() as u64, "collaborator timed out");
            Err(AuthError::Unavailable(format!("{what} timed out")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn record(id: &str, mobile: &str, role: Role, password: &str) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            mobile: mobile.to_string(),
            name: format!("User {id}"),
            role,
            password_hash: hash_password(password).unwrap(),
        }
    }

    #[test]
    fn test_hash_is_salted_and_verifiable() {
        let a = hash_password("pw").unwrap();
        let b = hash_password("pw").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(verify_password("pw", &a));
        assert!(!verify_password("PW", &a));
        assert!(!verify_password("pw", "plaintext-password"));
    }

    #[tokio::test]
    async fn test_lookup_by_mobile_and_role() {
        let store = InMemoryCredentialStore::new(vec![
            record("PAT-1", "9876543210", Role::Patient, "pw"),
            record("CLN-1", "9876543210", Role::Clinic, "pw2"),
        ]);
        let p = store
            .lookup_by_mobile_and_role("9876543210", Role::Clinic)
            .await
            .unwrap();
        assert_eq!(p.id, "CLN-1");
        assert_eq!(
            store.lookup_by_mobile_and_role("9876543210", Role::Admin).await,
            Err(AuthError::NotFound)
        );
        assert_eq!(
            store.lookup_by_mobile_and_role("0000000000", Role::Patient).await,
            Err(AuthError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_lookup_by_mobile_and_password() {
        let store = InMemoryCredentialStore::new(vec![record("PAT-1", "111", Role::Patient, "pw")]);
        let p = store.lookup_by_mobile_and_password("111", "pw", None).await.unwrap();
        assert_eq!(p.role, Role::Patient);
        assert_eq!(
            store.lookup_by_mobile_and_password("111", "nope", None).await,
            Err(AuthError::NotFound)
        );
        assert_eq!(
            store.lookup_by_mobile_and_password("222", "pw", None).await,
            Err(AuthError::NotFound)
        );
        assert_eq!(
            store
                .lookup_by_mobile_and_password("111", "pw", Some(Role::Clinic))
                .await,
            Err(AuthError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_shared_mobile_with_same_password_needs_role() {
        let store = InMemoryCredentialStore::new(vec![
            record("PAT-1", "555", Role::Patient, "shared"),
            record("CLN-1", "555", Role::Clinic, "shared"),
        ]);
        assert!(matches!(
            store.lookup_by_mobile_and_password("555", "shared", None).await,
            Err(AuthError::InvalidInput(_))
        ));
        let p = store
            .lookup_by_mobile_and_password("555", "shared", Some(Role::Clinic))
            .await
            .unwrap();
        assert_eq!(p.id, "CLN-1");
    }

    #[tokio::test]
    async fn test_shared_mobile_with_distinct_passwords_resolves() {
        let store = InMemoryCredentialStore::new(vec![
            record("PAT-1", "555", Role::Patient, "patient-pw"),
            record("CLN-1", "555", Role::Clinic, "clinic-pw"),
        ]);
        let p = store
            .lookup_by_mobile_and_password("555", "clinic-pw", None)
            .await
            .unwrap();
        assert_eq!(p.role, Role::Clinic);
    }

    #[test]
    fn test_from_file() {
        let rec = record("ADM-1", "999", Role::Admin, "root");
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&vec![rec]).unwrap()).unwrap();

        let store = InMemoryCredentialStore::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_from_file_rejects_plaintext_passwords() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"[{{"id":"u","mobile":"1","name":"n","role":"Patient","password_hash":"secret"}}]"#
        )
        .unwrap();
        assert!(InMemoryCredentialStore::from_file(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_from_file_missing() {
        assert!(InMemoryCredentialStore::from_file("/nonexistent/users.json").is_err());
    }

    #[tokio::test]
    async fn test_bounded_reports_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, AuthError>(1)
        };
        let res = bounded(Duration::from_millis(10), "credential store", slow).await;
        assert!(matches!(res, Err(AuthError::Unavailable(_))));

        let fast = async { Ok::<_, AuthError>(2) };
        assert_eq!(bounded(Duration::from_secs(1), "credential store", fast).await, Ok(2));
    }
}
