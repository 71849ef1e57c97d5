//! Password strength rules checked before an account is created.

use crate::error::ValidationErrors;

pub const MIN_PASSWORD_LENGTH: usize = 12;

#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    min_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: MIN_PASSWORD_LENGTH,
        }
    }
}

impl PasswordPolicy {
    /// Records every rule `password` breaks under the `password` field.
    pub fn check(&self, password: &str, errors: &mut ValidationErrors) {
        if password.chars().count() < self.min_length {
            errors.add(
                "password",
                format!("Passwords must be at least {} characters.", self.min_length),
            );
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            errors.add("password", "Passwords must have at least one digit ('0'-'9').");
        }
        if !password.chars().any(char::is_lowercase) {
            errors.add("password", "Passwords must have at least one lowercase ('a'-'z').");
        }
        if !password.chars().any(char::is_uppercase) {
            errors.add("password", "Passwords must have at least one uppercase ('A'-'Z').");
        }
        if password.chars().all(char::is_alphanumeric) {
            errors.add(
                "password",
                "Passwords must have at least one non alphanumeric character.",
            );
        }
    }
}
