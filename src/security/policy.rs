//! Role-based access decisions for catalog operations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Principal;

/// Roles a principal may carry. They are disjoint: `Administrator` does not
/// include `Moderator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Moderator,
    Administrator,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Moderator => "Moderator",
            Role::Administrator => "Administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Moderator" => Ok(Role::Moderator),
            "Administrator" => Ok(Role::Administrator),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

/// Catalog operations that need a role. Reads are open to anyone and never
/// reach the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    UpdateEntry,
    DeleteEntry,
}

impl Operation {
    pub const fn required_role(self) -> Role {
        match self {
            Operation::UpdateEntry => Role::Moderator,
            Operation::DeleteEntry => Role::Administrator,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { required: Role },
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Stateless; every decision is a pure function of the principal's roles.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn authorize(&self, principal: &Principal, operation: Operation) -> Decision {
        let required = operation.required_role();
        if principal.has_role(required) {
            return Decision::Allow;
        }
        tracing::debug!(
            user = %principal.username,
            ?operation,
            %required,
            "access denied"
        );
        Decision::Deny { required }
    }
}
