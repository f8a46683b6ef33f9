//! TOML configuration loaded at startup, with env override for the token.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub admin_ids: Vec<i64>,
    #[serde(default)]
    pub required_chats: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_pool_max")]
    pub db_pool_max: u32,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_admit_timeout_secs")]
    pub admit_timeout_secs: u64,
    #[serde(default = "default_telegram_timeout_secs")]
    pub telegram_timeout_secs: u64,
    #[serde(default = "default_telegram_max_retries")]
    pub telegram_max_retries: u32,
    #[serde(default = "default_dedupe_capacity")]
    pub dedupe_capacity: usize,
}

fn default_port() -> u16 {
    10000
}

fn default_db_pool_max() -> u32 {
    5
}

fn default_db_acquire_timeout_secs() -> u64 {
    5
}

fn default_max_concurrent() -> usize {
    30
}

fn default_admit_timeout_secs() -> u64 {
    2
}

fn default_telegram_timeout_secs() -> u64 {
    15
}

fn default_telegram_max_retries() -> u32 {
    2
}

fn default_dedupe_capacity() -> usize {
    5000
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// The BOT_TOKEN env var wins over the config file.
    pub fn bot_token(&self) -> Result<String, anyhow::Error> {
        if let Ok(token) = std::env::var("BOT_TOKEN")
            && !token.trim().is_empty()
        {
            return Ok(token);
        }
        self.bot_token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("bot_token is not set (config or BOT_TOKEN env)"))
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: Config = toml::from_str(r#"db_path = "/tmp/manhaj.db""#).unwrap();
        assert!(config.db_path.is_some());
        assert_eq!(config.port, 10000);
        assert_eq!(config.db_pool_max, 5);
        assert_eq!(config.max_concurrent, 30);
        assert_eq!(config.admit_timeout_secs, 2);
        assert_eq!(config.dedupe_capacity, 5000);
        assert!(config.admin_ids.is_empty());
        assert!(config.required_chats.is_empty());
        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(
            r#"
            bot_token = "123:abc"
            webhook_url = "https://bot.example.com"
            webhook_secret = "s3cret"
            db_path = "/var/lib/manhaj/bot.db"
            admin_ids = [7427206899, 42]
            required_chats = ["@chan1", "-1001234567890"]
            port = 8443
            max_concurrent = 5
            "#,
        )
        .unwrap();
        assert!(config.is_admin(42));
        assert!(!config.is_admin(7));
        assert_eq!(config.required_chats.len(), 2);
        assert_eq!(config.port, 8443);
        assert_eq!(config.max_concurrent, 5);
    }
}
