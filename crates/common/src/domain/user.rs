//! Users of the conference system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role assigned to an account
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Participant,
    ConferenceManager,
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Participant => "participant",
            Role::ConferenceManager => "conference_manager",
            Role::Administrator => "administrator",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "participant" => Some(Role::Participant),
            "conference_manager" => Some(Role::ConferenceManager),
            "administrator" => Some(Role::Administrator),
            _ => None,
        }
    }

    /// Review papers and change their status
    pub fn can_manage_papers(&self) -> bool {
        matches!(self, Role::ConferenceManager | Role::Administrator)
    }

    /// Edit conference settings
    pub fn can_configure(&self) -> bool {
        matches!(self, Role::Administrator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile fields collected at registration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub phone: String,
    pub organization: String,
    pub address: String,
    pub postcode: String,
    pub country: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub profile: Profile,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub password_hash: String,
    pub profile: Profile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_capabilities() {
        assert!(!Role::Participant.can_manage_papers());
        assert!(Role::ConferenceManager.can_manage_papers());
        assert!(Role::Administrator.can_manage_papers());

        assert!(!Role::ConferenceManager.can_configure());
        assert!(Role::Administrator.can_configure());
    }

    #[test]
    fn test_role_parse() {
        for role in [Role::Participant, Role::ConferenceManager, Role::Administrator] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("editor"), None);
    }
}
