//! Provider configuration
//!
//! Configuration is loaded in this order of precedence:
//! 1. Environment variables
//! 2. `twilio-gateway.toml`
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the TOML file is expanded from the environment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};

/// Default config file looked up by [`ProviderConfig::load`]
pub const DEFAULT_CONFIG_FILE: &str = "twilio-gateway.toml";

/// Twilio provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Twilio account SID
    pub account_sid: String,

    /// Twilio auth token
    pub auth_token: String,

    /// Number messages are sent from
    pub vendor_number: String,

    /// Bot name shown to the host framework
    #[serde(default = "default_name")]
    pub name: String,

    /// Port for the webhook server
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL of this server, used for local media.
    /// Falls back to `http://localhost:<port>`.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Twilio REST API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            vendor_number: String::new(),
            name: default_name(),
            port: default_port(),
            public_url: None,
            api_base_url: default_api_base_url(),
        }
    }
}

fn default_name() -> String {
    "bot".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_api_base_url() -> String {
    "https://api.twilio.com".to_string()
}

impl ProviderConfig {
    /// Create a config with credentials and defaults for everything else
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        vendor_number: impl Into<String>,
    ) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            vendor_number: vendor_number.into(),
            ..Self::default()
        }
    }

    /// Base URL that local media is served from
    pub fn entry_point_url(&self) -> String {
        match &self.public_url {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("http://localhost:{}", self.port),
        }
    }

    /// Check that the Twilio credentials are present
    pub fn validate(&self) -> Result<()> {
        if self.account_sid.is_empty() {
            return Err(ProviderError::CredentialsNotSet("account_sid"));
        }
        if self.auth_token.is_empty() {
            return Err(ProviderError::CredentialsNotSet("auth_token"));
        }
        if self.vendor_number.is_empty() {
            return Err(ProviderError::CredentialsNotSet("vendor_number"));
        }
        Ok(())
    }

    /// Load from `twilio-gateway.toml` if present, otherwise from the environment
    pub fn load() -> Result<Self> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Load from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ProviderError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse TOML content, expanding `${VAR}` references
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let file: TomlFile = toml::from_str(&expanded)
            .map_err(|e| ProviderError::Config(format!("Failed to parse TOML: {}", e)))?;

        Ok(file.twilio)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(sid) = non_empty_env("TWILIO_ACCOUNT_SID") {
            self.account_sid = sid;
        }
        if let Some(token) = non_empty_env("TWILIO_AUTH_TOKEN") {
            self.auth_token = token;
        }
        if let Some(number) = non_empty_env("TWILIO_VENDOR_NUMBER") {
            self.vendor_number = number;
        }
        if let Some(name) = non_empty_env("BOT_NAME") {
            self.name = name;
        }
        if let Some(port) = non_empty_env("PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(url) = non_empty_env("PUBLIC_URL") {
            self.public_url = Some(url);
        }
        if let Some(url) = non_empty_env("TWILIO_API_BASE_URL") {
            self.api_base_url = url;
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Replace `${VAR_NAME}` with the variable's value (empty if unset)
fn expand_env_vars(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }

            if let Ok(env_value) = std::env::var(&var_name) {
                result.push_str(&env_value);
            }
        } else {
            result.push(c);
        }
    }

    result
}

#[derive(Debug, Deserialize)]
struct TomlFile {
    twilio: ProviderConfig,
}
