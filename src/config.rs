use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::email::gmail;
use crate::email::model::Identity;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Records,
    Gmail,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mock" => Ok(BackendKind::Memory),
            "records" => Ok(BackendKind::Records),
            "gmail" => Ok(BackendKind::Gmail),
            other => bail!("unknown backend '{}' (expected memory, records or gmail)", other),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub memory: MemoryConfig,
    pub records: RecordsConfig,
    pub gmail: GmailConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Replaces the built-in demo mailbox.
    pub seed_file: Option<PathBuf>,
    /// Simulated round-trip delay per operation.
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    pub base_url: String,
    pub project_id: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GmailConfig {
    pub base_url: String,
    pub access_token: String,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            base_url: gmail::DEFAULT_BASE_URL.to_string(),
            access_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub address: String,
    pub name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        let identity = Identity::default();
        Self {
            address: identity.address,
            name: identity.name,
        }
    }
}

impl From<IdentityConfig> for Identity {
    fn from(value: IdentityConfig) -> Self {
        Identity {
            address: value.address,
            name: value.name,
        }
    }
}

fn parse_var<T>(name: &str, raw: String) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value for {}: {}", name, e))
}

impl AppConfig {
    /// `.env`, then the optional TOML file named by `MAILFLOW_CONFIG`, then
    /// environment variables, each overriding the previous.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match std::env::var("MAILFLOW_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Overlay values from `var`, which looks up one environment variable.
    pub fn apply_env<F>(&mut self, var: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = var("SERVER_PORT") {
            self.server.port = parse_var("SERVER_PORT", v)?;
        }
        if let Some(v) = var("MAILFLOW_BACKEND") {
            self.backend.kind = parse_var("MAILFLOW_BACKEND", v)?;
        }
        if let Some(v) = var("MAILFLOW_SEED_FILE") {
            self.backend.memory.seed_file = Some(PathBuf::from(v));
        }
        if let Some(v) = var("MAILFLOW_MEMORY_LATENCY_MS") {
            self.backend.memory.latency_ms = parse_var("MAILFLOW_MEMORY_LATENCY_MS", v)?;
        }
        if let Some(v) = var("RECORDS_BASE_URL") {
            self.backend.records.base_url = v;
        }
        if let Some(v) = var("RECORDS_PROJECT_ID") {
            self.backend.records.project_id = v;
        }
        if let Some(v) = var("RECORDS_PUBLIC_KEY") {
            self.backend.records.public_key = v;
        }
        if let Some(v) = var("GMAIL_BASE_URL") {
            self.backend.gmail.base_url = v;
        }
        if let Some(v) = var("GMAIL_ACCESS_TOKEN") {
            self.backend.gmail.access_token = v;
        }
        if let Some(v) = var("MAILFLOW_USER_ADDRESS") {
            self.identity.address = v;
        }
        if let Some(v) = var("MAILFLOW_USER_NAME") {
            self.identity.name = v;
        }
        Ok(())
    }

    /// Reject settings the selected backend cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.backend.kind {
            BackendKind::Memory => {}
            BackendKind::Records => {
                let records = &self.backend.records;
                url::Url::parse(&records.base_url).with_context(|| {
                    format!("RECORDS_BASE_URL '{}' is not a valid URL", records.base_url)
                })?;
                if records.project_id.is_empty() || records.public_key.is_empty() {
                    bail!("records backend needs RECORDS_PROJECT_ID and RECORDS_PUBLIC_KEY");
                }
            }
            BackendKind::Gmail => {
                let gmail = &self.backend.gmail;
                url::Url::parse(&gmail.base_url).with_context(|| {
                    format!("GMAIL_BASE_URL '{}' is not a valid URL", gmail.base_url)
                })?;
                if gmail.access_token.is_empty() {
                    bail!("gmail backend needs GMAIL_ACCESS_TOKEN");
                }
            }
        }
        if self.identity.address.trim().is_empty() {
            bail!("MAILFLOW_USER_ADDRESS must not be empty");
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
