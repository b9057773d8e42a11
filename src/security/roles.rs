use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;

/// Tenant role attached to every principal and token.
///
/// Roles are flat: there is no inheritance between them, Admin included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Patient,
    Clinic,
    Scanning,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Patient, Role::Clinic, Role::Scanning, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "Patient",
            Role::Clinic => "Clinic",
            Role::Scanning => "Scanning",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    // Exact match only; "patient" is not a role.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| AuthError::InvalidInput(format!("unknown role: {s}")))
    }
}

/// An identity established by the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_role_parse_is_case_sensitive() {
        assert!("patient".parse::<Role>().is_err());
        assert!("ADMIN".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_uses_display_names() {
        let json = serde_json::to_string(&Role::Scanning).unwrap();
        assert_eq!(json, "\"Scanning\"");
        let back: Role = serde_json::from_str("\"Clinic\"").unwrap();
        assert_eq!(back, Role::Clinic);
    }
}
