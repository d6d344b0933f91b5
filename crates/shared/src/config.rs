//! Configuration management for the hianime workspace.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings and environment overrides for
//! container deployments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upstream site settings
    pub site: SiteConfig,

    /// HTTP transport settings
    pub transport: TransportConfig,

    /// Remote decryption key sources
    pub keys: KeysConfig,

    /// Stream resolution settings
    pub resolver: ResolverConfig,

    /// REST API settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Upstream site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Base URL of the scraped site (no trailing slash)
    pub base_url: String,

    /// User agent sent with every request
    pub user_agent: String,
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Additional attempts after the first failed one
    pub max_retries: u32,

    /// Linear backoff step in milliseconds
    pub retry_delay_ms: u64,
}

/// Key registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Plaintext key file used by the primary strategy
    pub primary_url: String,

    /// JSON key registry keyed by provider name
    pub registry_url: String,

    /// Registry field holding the megacloud key
    pub registry_field: String,
}

/// Stream resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Deadline for one complete resolution (all strategies)
    pub resolve_timeout_secs: u64,

    /// Politeness delay before server-list and token-page fetches
    pub rate_limit_ms: u64,

    /// Key derivation used by the primary strategy ("pbkdf2" or "evp")
    pub primary_derivation: String,

    /// Base URL of the megacloud v3 sources API
    pub megacloud_base_url: String,

    /// Fallback mirrors, tried in order after the primary strategy
    pub mirrors: Vec<MirrorConfig>,
}

/// Fallback video-hosting mirror
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Name used in logs
    pub name: String,

    /// Base URL of the mirror (no trailing slash)
    pub base_url: String,

    /// Registry field holding this mirror's key, when its sources are encrypted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
}

/// REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Allow cross-origin requests from any origin
    pub enable_cors: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log directory path
    pub log_dir: String,

    /// Default log level (trace, debug, info, warn, error)
    pub default_level: String,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3030,
            enable_cors: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: SiteConfig {
                base_url: "https://hianime.to".to_string(),
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36".to_string(),
            },
            transport: TransportConfig {
                timeout_secs: 30,
                max_retries: 3,
                retry_delay_ms: 500,
            },
            keys: KeysConfig {
                primary_url: "https://raw.githubusercontent.com/itzzzme/megacloud-keys/refs/heads/main/key.txt".to_string(),
                registry_url: "https://raw.githubusercontent.com/yogesh-hacker/MegacloudKeys/refs/heads/main/keys.json".to_string(),
                registry_field: "mega".to_string(),
            },
            resolver: ResolverConfig {
                resolve_timeout_secs: 60,
                rate_limit_ms: 500,
                primary_derivation: "pbkdf2".to_string(),
                megacloud_base_url: "https://megacloud.blog".to_string(),
                mirrors: vec![
                    MirrorConfig {
                        name: "megaplay".to_string(),
                        base_url: "https://megaplay.buzz".to_string(),
                        key_name: None,
                    },
                    MirrorConfig {
                        name: "vidwish".to_string(),
                        base_url: "https://vidwish.live".to_string(),
                        key_name: None,
                    },
                ],
            },
            server: ServerConfig::default(),
            logging: LoggingConfig {
                log_dir: "logs".to_string(),
                default_level: "info".to_string(),
                console: true,
                file: false,
                json_format: false,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// If the file doesn't exist, returns the default configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }

    /// Apply overrides from process environment variables
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Unparseable values are ignored with a warning, leaving the previous
    /// setting in place.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(base_url) = get("BASE_URL") {
            self.site.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(user_agent) = get("USER_AGENT") {
            self.site.user_agent = user_agent;
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            parse_into(&port, "PORT", &mut self.server.port);
        }
        if let Some(retries) = get("MAX_RETRIES") {
            parse_into(&retries, "MAX_RETRIES", &mut self.transport.max_retries);
        }
        if let Some(timeout) = get("TIMEOUT_SECS") {
            parse_into(&timeout, "TIMEOUT_SECS", &mut self.transport.timeout_secs);
        }
        if let Some(rate_limit) = get("RATE_LIMIT_MS") {
            parse_into(&rate_limit, "RATE_LIMIT_MS", &mut self.resolver.rate_limit_ms);
        }
        if let Some(cors) = get("ENABLE_CORS") {
            parse_into(&cors, "ENABLE_CORS", &mut self.server.enable_cors);
        }
    }

    /// Get the path for the log directory
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.logging.log_dir)
    }
}

fn parse_into<T: std::str::FromStr>(raw: &str, name: &str, slot: &mut T) {
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(variable = name, value = raw, "Ignoring invalid override"),
    }
}
