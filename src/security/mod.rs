//! Authentication and authorization.
//!
//! - [`TokenService`]: issues and verifies signed, expiring bearer tokens.
//! - [`AccessPolicy`]: maps a [`Principal`] and an [`Operation`] to a [`Decision`].
//! - [`PasswordPolicy`]: strength rules applied at registration.
//! - [`BearerAuthentication`]: middleware that verifies `Authorization: Bearer`
//!   and records the outcome in the request [`Context`](crate::context::Context).

pub mod middleware;
pub mod password;
pub mod policy;
pub mod token;

use std::collections::BTreeSet;

pub use middleware::{Authentication, BearerAuthentication};
pub use password::PasswordPolicy;
pub use policy::{AccessPolicy, Decision, Operation, Role};
pub use token::{AuthError, MIN_SECRET_BYTES, Token, TokenService};

/// An authenticated caller and the roles it held when its token was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub roles: BTreeSet<String>,
}

impl Principal {
    pub fn new<I, R>(username: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            username: username.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact membership; no role implies another.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(role.as_str())
    }
}
