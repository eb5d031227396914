use std::{fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

// Re-export all submodules
pub mod cache;
pub mod chat;
pub mod logging;
pub mod server;
pub mod upstreams;

#[cfg(test)]
mod tests;

// Re-export types from submodules for convenience
pub use cache::CacheConfig;
pub use chat::ChatConfig;
pub use logging::LoggingConfig;
pub use server::ServerConfig;
pub use upstreams::{MirrorConfig, ModuleProxyConfig, RegistryConfig};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub goproxy: ModuleProxyConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let candidate = path.unwrap_or_else(|| PathBuf::from("edgeway.toml"));
        let mut config = if candidate.exists() {
            let raw = fs::read_to_string(&candidate)
                .with_context(|| format!("failed to read config {}", candidate.display()))?;
            toml::from_str::<Config>(&raw)
                .with_context(|| format!("invalid config {}", candidate.display()))?
        } else {
            if let Some(path) = candidate.to_str() {
                tracing::warn!("configuration file {path} not found, using defaults");
            } else {
                tracing::warn!("configuration file not found, using defaults");
            }
            Config::default()
        };
        config.chat.resolve_api_key();
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let origins = [
            ("registry", &self.registry.url),
            ("goproxy mirror", &self.goproxy.mirror_url),
            ("cdn mirror", &self.mirror.cdn_url),
            ("cnb mirror", &self.mirror.cnb_url),
            ("chat", &self.chat.url),
        ];
        for (label, url) in origins {
            match url.scheme_str() {
                Some("http") | Some("https") => {}
                _ => bail!("unsupported {label} upstream scheme {url}"),
            }
        }
        if self.cache.max_entries == 0 {
            bail!("cache.max_entries must be at least 1");
        }
        Ok(())
    }
}

pub(crate) mod serde_url {
    use rama::http::Uri;
    use serde::{Deserialize, Deserializer};
    use std::str::FromStr;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Uri, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Uri::from_str(&s).map_err(serde::de::Error::custom)
    }
}
