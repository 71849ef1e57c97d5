//! Registration and login.
//!
//! Credentials live behind [`CredentialStore`]. Login failures all surface as
//! the same authentication error, so callers cannot tell an unknown user from
//! a wrong password.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::error::{ServiceError, ServiceResult, ValidationErrors};
use crate::security::{PasswordPolicy, Principal, Role, Token, TokenService};

/// The only detail a failed login ever reports.
pub const LOGIN_FAILED: &str = "Invalid login attempt.";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    #[serde(alias = "userName", alias = "UserName")]
    pub username: Option<String>,
    #[serde(alias = "Email")]
    pub email: Option<String>,
    #[serde(alias = "Password")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    #[serde(alias = "userName", alias = "UserName")]
    pub username: Option<String>,
    #[serde(alias = "Password")]
    pub password: Option<String>,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("username `{0}` is already taken")]
    DuplicateUsername(String),

    #[error("unknown user `{0}`")]
    UnknownUser(String),

    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// A validated registration handed to the credential store.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create(&self, account: NewAccount) -> Result<(), CredentialError>;

    /// The account as stored (canonical username, current roles) if
    /// `password` is correct, `None` otherwise, including when the user does
    /// not exist.
    async fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Principal>, CredentialError>;
}

#[derive(Debug)]
struct StoredAccount {
    username: String,
    email: String,
    salt: String,
    digest: Vec<u8>,
    roles: BTreeSet<String>,
}

/// Credential store kept in memory. Usernames are unique regardless of case.
#[derive(Debug, Default)]
pub struct InMemoryCredentials {
    accounts: RwLock<HashMap<String, StoredAccount>>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant_role(&self, username: &str, role: Role) -> Result<(), CredentialError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&normalize(username))
            .ok_or_else(|| CredentialError::UnknownUser(username.to_owned()))?;
        account.roles.insert(role.as_str().to_owned());
        tracing::debug!(user = %account.username, %role, "role granted");
        Ok(())
    }

    pub async fn email_of(&self, username: &str) -> Option<String> {
        self.accounts
            .read()
            .await
            .get(&normalize(username))
            .map(|a| a.email.clone())
    }
}

fn normalize(username: &str) -> String {
    username.trim().to_uppercase()
}

fn digest(salt: &str, password: &str) -> Vec<u8> {
    Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize()
        .to_vec()
}

#[async_trait]
impl CredentialStore for InMemoryCredentials {
    async fn create(&self, account: NewAccount) -> Result<(), CredentialError> {
        let key = normalize(&account.username);
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&key) {
            return Err(CredentialError::DuplicateUsername(account.username));
        }

        let salt = uuid::Uuid::new_v4().to_string();
        let digest = digest(&salt, &account.password);
        accounts.insert(
            key,
            StoredAccount {
                username: account.username,
                email: account.email,
                salt,
                digest,
                roles: BTreeSet::new(),
            },
        );
        Ok(())
    }

    async fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Principal>, CredentialError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .get(&normalize(username))
            .filter(|a| digest(&a.salt, password) == a.digest)
            .map(|a| Principal {
                username: a.username.clone(),
                roles: a.roles.clone(),
            }))
    }
}

pub struct AccountService {
    credentials: Arc<dyn CredentialStore>,
    tokens: Arc<TokenService>,
    passwords: PasswordPolicy,
}

impl AccountService {
    pub fn new(credentials: Arc<dyn CredentialStore>, tokens: Arc<TokenService>) -> Self {
        Self {
            credentials,
            tokens,
            passwords: PasswordPolicy::default(),
        }
    }

    /// Creates an account and returns the confirmation message.
    pub async fn register(&self, request: &RegisterRequest) -> ServiceResult<String> {
        let account = self.validate_registration(request)?;
        let username = account.username.clone();
        let email = account.email.clone();

        match self.credentials.create(account).await {
            Ok(()) => {}
            Err(CredentialError::DuplicateUsername(name)) => {
                return Err(ValidationErrors::single(
                    "username",
                    format!("Username '{name}' is already taken."),
                )
                .into());
            }
            Err(e) => return Err(ServiceError::internal(e)),
        }

        tracing::info!(user = %username, %email, "user has been created");
        Ok(format!("User '{username}' has been created."))
    }

    /// Checks credentials and issues a token for the stored account, carrying
    /// its current roles.
    pub async fn login(&self, request: &LoginRequest) -> ServiceResult<Token> {
        let (username, password) = login_credentials(request)?;

        let principal = self
            .credentials
            .verify(username, password)
            .await
            .map_err(ServiceError::internal)?;
        let Some(principal) = principal else {
            tracing::warn!(user = %username, "invalid login attempt");
            return Err(ServiceError::authentication(LOGIN_FAILED));
        };

        let token = self.tokens.issue(&principal).map_err(ServiceError::internal)?;
        tracing::info!(user = %principal.username, "user logged in");
        Ok(token)
    }

    fn validate_registration(
        &self,
        request: &RegisterRequest,
    ) -> Result<NewAccount, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let username = required(&mut errors, "username", "UserName", &request.username);
        let email = required(&mut errors, "email", "Email", &request.email);
        if email.is_some_and(|e| !is_email(e)) {
            errors.add("email", "The Email field is not a valid e-mail address.");
        }
        let password = password(&mut errors, &request.password);
        if let Some(password) = password {
            self.passwords.check(password, &mut errors);
        }

        match (username, email, password) {
            (Some(username), Some(email), Some(password)) if errors.is_empty() => {
                Ok(NewAccount {
                    username: username.to_owned(),
                    email: email.to_owned(),
                    password: password.to_owned(),
                })
            }
            _ => Err(errors),
        }
    }
}

fn login_credentials(request: &LoginRequest) -> Result<(&str, &str), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let username = required(&mut errors, "username", "UserName", &request.username);
    let password = password(&mut errors, &request.password);
    match (username, password) {
        (Some(username), Some(password)) => Ok((username, password)),
        _ => Err(errors),
    }
}

/// Passwords are taken verbatim; only an empty one is rejected.
fn password<'a>(errors: &mut ValidationErrors, value: &'a Option<String>) -> Option<&'a str> {
    let value = value.as_deref().filter(|p| !p.is_empty());
    if value.is_none() {
        errors.add("password", "The Password field is required.");
    }
    value
}

fn required<'a>(
    errors: &mut ValidationErrors,
    field: &str,
    label: &str,
    value: &'a Option<String>,
) -> Option<&'a str> {
    let value = value.as_deref().map(str::trim).filter(|v| !v.is_empty());
    if value.is_none() {
        errors.add(field, format!("The {label} field is required."));
    }
    value
}

fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
}
