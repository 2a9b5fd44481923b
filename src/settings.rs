use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_API_VERSION: &str = "2024-07";
pub const DEFAULT_NAMESPACE: &str = "custom";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] ConfigError),
    #[error("missing {0} (set SHOPIFY_{1} or pass --{2})")]
    Missing(&'static str, &'static str, &'static str),
}

/// Store credentials and API defaults, read from `SHOPIFY_*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub shop: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    pub api_version: String,
    pub namespace: String,
}

impl Settings {
    pub fn load() -> Result<Self, SettingsError> {
        Self::from_environment(Environment::with_prefix("SHOPIFY"))
    }

    fn from_environment(env: Environment) -> Result<Self, SettingsError> {
        let settings = Config::builder()
            .set_default("api_version", DEFAULT_API_VERSION)?
            .set_default("namespace", DEFAULT_NAMESPACE)?
            .add_source(env)
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Command-line flags win over the environment.
    pub fn with_overrides(mut self, shop: Option<String>, access_token: Option<String>) -> Self {
        if shop.is_some() {
            self.shop = shop;
        }
        if access_token.is_some() {
            self.access_token = access_token;
        }
        self
    }

    pub fn shop(&self) -> Result<&str, SettingsError> {
        self.shop
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(SettingsError::Missing("shop", "SHOP", "shop"))
    }

    pub fn access_token(&self) -> Result<&str, SettingsError> {
        self.access_token
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(SettingsError::Missing("access token", "ACCESS_TOKEN", "token"))
    }
}

// ── Tests ──
