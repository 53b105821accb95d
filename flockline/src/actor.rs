//! Who is performing a command, and what they may do.

use crate::errors::{CommandError, CommandResult};
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrator: manages inventory, fulfilment and returns
    Admin,
    /// Sales agent: places orders and requests returns
    Agent,
}

impl Role {
    /// Lower-case wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "admin" => Ok(Self::Admin),
            "agent" => Ok(Self::Agent),
            other => Err(CommandError::validation(
                "role",
                format!("unknown role '{other}'"),
            )),
        }
    }
}

/// The authenticated user on whose behalf a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// Authenticated user
    pub user_id: UserId,
    /// Role carried by the user's token
    pub role: Role,
}

impl Actor {
    /// Creates an actor.
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Whether the actor is an administrator.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails with `Forbidden` unless the actor is an administrator.
    pub fn require_admin(&self) -> CommandResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(CommandError::Forbidden(
                "administrator role required".to_string(),
            ))
        }
    }

    /// Fails with `Forbidden` unless the actor owns the resource or is an administrator.
    pub fn require_owner_or_admin(&self, owner: UserId, resource: &str) -> CommandResult<()> {
        if self.is_admin() || self.user_id == owner {
            Ok(())
        } else {
            Err(CommandError::Forbidden(format!(
                "not authorized to access this {resource}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admins_pass_every_check() {
        let admin = Actor::new(UserId::new(), Role::Admin);
        assert!(admin.require_admin().is_ok());
        assert!(admin.require_owner_or_admin(UserId::new(), "order").is_ok());
    }

    #[test]
    fn agents_only_reach_their_own_resources() {
        let agent = Actor::new(UserId::new(), Role::Agent);
        assert!(agent.require_admin().is_err());
        assert!(agent.require_owner_or_admin(agent.user_id, "order").is_ok());
        assert!(matches!(
            agent.require_owner_or_admin(UserId::new(), "order"),
            Err(CommandError::Forbidden(_))
        ));
    }

    #[test]
    fn roles_parse_from_wire_names() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("agent".parse::<Role>().unwrap(), Role::Agent);
        assert!("owner".parse::<Role>().is_err());
    }
}
