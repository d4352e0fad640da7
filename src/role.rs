//! Project membership and authority levels.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Authority level of a user inside one project.
///
/// Ordering follows privilege: `Member < ViceLeader < Leader`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Member,
    ViceLeader,
    Leader,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "MEMBER",
            Role::ViceLeader => "VICE_LEADER",
            Role::Leader => "LEADER",
        }
    }

    /// LEADER or VICE_LEADER.
    pub fn is_manager(self) -> bool {
        self >= Role::ViceLeader
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "MEMBER" => Ok(Role::Member),
            "VICE_LEADER" => Ok(Role::ViceLeader),
            "LEADER" => Ok(Role::Leader),
            other => Err(Error::InvalidArgument(format!(
                "unknown role '{other}' (expected LEADER, VICE_LEADER or MEMBER)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectMember {
    pub project_id: String,
    pub user_id: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

impl ProjectMember {
    pub fn new(project_id: impl Into<String>, user_id: impl Into<String>, role: Role) -> Self {
        Self {
            project_id: project_id.into(),
            user_id: user_id.into(),
            role,
            joined_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_is_leader_over_vice_over_member() {
        assert!(Role::Leader > Role::ViceLeader);
        assert!(Role::ViceLeader > Role::Member);
        assert!(Role::ViceLeader.is_manager());
        assert!(!Role::Member.is_manager());
    }

    #[test]
    fn parses_role_names() {
        assert_eq!("vice-leader".parse::<Role>().expect("parse role"), Role::ViceLeader);
        assert_eq!("leader".parse::<Role>().expect("parse role"), Role::Leader);
        assert!("owner".parse::<Role>().is_err());
    }
}
