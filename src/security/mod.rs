pub mod audit_log;
pub mod cipher;
pub mod credentials;
pub mod gate;
pub mod otp;
pub mod rate_limit;
pub mod roles;
pub mod token;

pub use cipher::FieldCipher;
pub use credentials::{CredentialStore, InMemoryCredentialStore};
pub use gate::{AuthContext, Gate, RoleGuard};
pub use otp::{OtpManager, OtpNotifier};
pub use roles::{Principal, Role};
pub use token::{Claims, TokenIssuer};
