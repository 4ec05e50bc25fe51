//! Process configuration, read once at startup from the environment.

use crate::error::ConfigError;

pub const DEFAULT_REPO: &str = "lorsgordors/dados.prontuario";
pub const DEFAULT_BRANCH: &str = "main";

/// Configuration for the blob host and the field cipher.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer credential for the blob host. Required.
    pub token: String,
    /// `owner/name` of the repository that backs the store.
    pub repo: String,
    /// Branch all reads and writes target.
    pub branch: String,
    /// Passphrase the field encryption key is derived from. Required:
    /// there is no embedded fallback key, a missing value is fatal.
    pub encryption_key: String,
}

impl Config {
    /// Reads configuration from the environment (`.env` files honored).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `GITHUB_TOKEN` or `ENCRYPTION_KEY` is
    /// missing or empty. Callers are expected to treat this as fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let token = non_empty_var("GITHUB_TOKEN").ok_or(ConfigError::MissingToken)?;
        let encryption_key =
            non_empty_var("ENCRYPTION_KEY").ok_or(ConfigError::MissingEncryptionKey)?;

        Ok(Self {
            token,
            repo: non_empty_var("GITHUB_REPO").unwrap_or_else(|| DEFAULT_REPO.to_string()),
            branch: non_empty_var("GITHUB_BRANCH").unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            encryption_key,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}
