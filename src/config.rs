//! Runtime configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. an optional file (`--config boardshelf.toml`; TOML, YAML or JSON)
//! 3. environment variables prefixed `BOARDSHELF__`, e.g.
//!    `BOARDSHELF__SERVER__LISTEN=0.0.0.0:8080` or `BOARDSHELF__CACHE__TTL_SECS=10`
//!
//! There is no default signing key; one must come from the file or the
//! environment.

use std::path::Path;
use std::time::Duration;

use ::config::builder::DefaultState;
use ::config::{ConfigBuilder, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::query::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::security::{MIN_SECRET_BYTES, Role};
use crate::server::DEFAULT_MAX_REQUEST_BYTES;

const ENV_PREFIX: &str = "BOARDSHELF";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub query: QuerySettings,
    pub auth: AuthSettings,
    pub seed: SeedSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen: String,
    /// Runtime worker threads; `None` uses one per core.
    pub worker_threads: Option<usize>,
    pub max_request_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_owned(),
            worker_threads: None,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// An `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub ansi: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            ansi: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    /// Interval of the expired-entry sweep; `0` disables it.
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            sweep_interval_secs: 60,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub issuer: String,
    pub audience: String,
    pub signing_key: String,
    pub token_lifetime_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            issuer: "boardshelf".to_owned(),
            audience: "boardshelf-clients".to_owned(),
            signing_key: String::new(),
            token_lifetime_secs: 300,
        }
    }
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("signing_key", &"<redacted>")
            .field("token_lifetime_secs", &self.token_lifetime_secs)
            .finish()
    }
}

impl AuthSettings {
    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.token_lifetime_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeedSettings {
    /// Load the three-game demo catalog at startup.
    pub demo_games: bool,
    pub accounts: Vec<SeedAccount>,
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            demo_games: true,
            accounts: Vec::new(),
        }
    }
}

/// An account registered at startup, then granted `roles`.
#[derive(Clone, Deserialize)]
pub struct SeedAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl std::fmt::Debug for SeedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedAccount")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Loads and validates settings from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        Self::from_builder(builder.add_source(environment()))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.server.listen.trim().is_empty() {
            return invalid("server.listen must not be empty".into());
        }
        if self.server.worker_threads == Some(0) {
            return invalid("server.worker_threads must be at least 1".into());
        }
        if self.server.max_request_bytes < 1024 {
            return invalid(format!(
                "server.max_request_bytes must be at least 1024, got {}",
                self.server.max_request_bytes
            ));
        }
        if self.cache.ttl_secs == 0 {
            return invalid("cache.ttl_secs must be greater than 0".into());
        }
        if self.query.max_page_size < 1 {
            return invalid("query.max_page_size must be at least 1".into());
        }
        if !(1..=self.query.max_page_size).contains(&self.query.default_page_size) {
            return invalid(format!(
                "query.default_page_size must be between 1 and {}",
                self.query.max_page_size
            ));
        }
        if self.auth.issuer.is_empty() || self.auth.audience.is_empty() {
            return invalid("auth.issuer and auth.audience must be set".into());
        }
        if self.auth.signing_key.len() < MIN_SECRET_BYTES {
            return invalid(format!(
                "auth.signing_key must be at least {MIN_SECRET_BYTES} bytes"
            ));
        }
        if self.auth.token_lifetime_secs == 0 {
            return invalid("auth.token_lifetime_secs must be greater than 0".into());
        }
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::FileFormat;
    use std::collections::HashMap;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn from_toml(toml: &str) -> Result<Settings, ConfigError> {
        Settings::from_builder(
            ::config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    #[test]
    fn defaults_need_only_a_signing_key() {
        let settings = from_toml(&format!("[auth]\nsigning_key = \"{KEY}\"\n")).unwrap();
        assert_eq!(settings.server.listen, "127.0.0.1:8080");
        assert_eq!(settings.cache.ttl(), Duration::from_secs(30));
        assert_eq!(settings.cache.sweep_interval(), Some(Duration::from_secs(60)));
        assert_eq!(settings.query.default_page_size, 10);
        assert_eq!(settings.query.max_page_size, 100);
        assert_eq!(settings.auth.token_lifetime(), Duration::from_secs(300));
        assert!(settings.seed.demo_games);
    }

    #[test]
    fn missing_or_short_key_is_rejected() {
        assert!(matches!(from_toml(""), Err(ConfigError::Invalid(_))));
        assert!(matches!(
            from_toml("[auth]\nsigning_key = \"short\"\n"),
            Err(ConfigError::Invalid(msg)) if msg.contains("signing_key")
        ));
    }

    #[test]
    fn file_values_and_seed_accounts() {
        let toml = format!(
            r#"
[server]
listen = "0.0.0.0:9000"
worker_threads = 2

[cache]
ttl_secs = 5
sweep_interval_secs = 0

[auth]
signing_key = "{KEY}"

[[seed.accounts]]
username = "mod"
email = "mod@example.com"
password = "Abc123!@#xyz"
roles = ["Moderator"]
"#
        );
        let settings = from_toml(&toml).unwrap();
        assert_eq!(settings.server.worker_threads, Some(2));
        assert_eq!(settings.cache.sweep_interval(), None);
        assert_eq!(settings.seed.accounts[0].roles, vec![Role::Moderator]);
        assert!(!format!("{:?}", settings.seed.accounts[0]).contains("Abc123"));
        assert!(!format!("{:?}", settings.auth).contains(KEY));
    }

    #[test]
    fn environment_overrides_file() {
        let env: HashMap<String, String> = [
            ("BOARDSHELF__CACHE__TTL_SECS", "12"),
            ("BOARDSHELF__AUTH__SIGNING_KEY", KEY),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();

        let builder = ::config::Config::builder()
            .add_source(File::from_str("[cache]\nttl_secs = 7\n", FileFormat::Toml))
            .add_source(environment().source(Some(env)));
        let settings = Settings::from_builder(builder).unwrap();
        assert_eq!(settings.cache.ttl_secs, 12);
    }

    #[test]
    fn page_size_bounds_are_checked() {
        let toml = format!("[query]\ndefault_page_size = 200\n[auth]\nsigning_key = \"{KEY}\"\n");
        assert!(matches!(from_toml(&toml), Err(ConfigError::Invalid(_))));
    }
}
