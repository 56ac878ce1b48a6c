//! Proxy configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::Deserialize;

use crate::types::RcpError;

/// Configuration shared by every session of one proxy process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Address to listen on.
    pub bind: IpAddr,
    /// Port to listen on.
    pub port: u16,
    /// Seed cluster node (`host:port`) every new session starts from.
    pub backend: String,
    /// Redirects followed for a single request before giving up.
    pub max_redirects: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 6380,
            backend: "127.0.0.1:6379".to_string(),
            max_redirects: 16,
        }
    }
}

impl ProxyConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self, RcpError> {
        let config: Self = toml::from_str(content).map_err(|e| RcpError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RcpError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RcpError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), RcpError> {
        if self.max_redirects == 0 {
            return Err(RcpError::Config("max_redirects must be at least 1".into()));
        }
        if self.backend.trim().is_empty() {
            return Err(RcpError::Config("backend address is empty".into()));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}
