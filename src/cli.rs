use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::ProxyConfig;
use crate::types::RcpError;

/// Redis Cluster proxy for cluster-unaware clients.
///
/// Listens for ordinary Redis connections and forwards every request to the
/// cluster, following MOVED redirects to whichever node owns the key.
#[derive(Parser, Debug, Clone)]
#[command(name = "rcproxy", author, version, about)]
pub struct Cli {
    /// TOML config file; flags given on the command line override it.
    #[arg(short, long, env = "RCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// IP address to bind to.
    #[arg(short, long, env = "RCP_BIND")]
    pub bind: Option<IpAddr>,

    /// Port to listen on.
    #[arg(short, long, env = "RCP_PORT")]
    pub port: Option<u16>,

    /// Seed cluster node (host:port) new sessions connect to first.
    #[arg(long, env = "RCP_BACKEND")]
    pub backend: Option<String>,

    /// Redirects followed for a single request before giving up.
    #[arg(long, env = "RCP_MAX_REDIRECTS")]
    pub max_redirects: Option<usize>,
}

impl Cli {
    /// Resolve the effective configuration: defaults, then file, then flags.
    pub fn into_config(self) -> Result<ProxyConfig, RcpError> {
        let mut config = match &self.config {
            Some(path) => ProxyConfig::load(path)?,
            None => ProxyConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(max_redirects) = self.max_redirects {
            config.max_redirects = max_redirects;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "rcproxy",
            "-b",
            "0.0.0.0",
            "-p",
            "7000",
            "--backend",
            "10.1.1.1:30001",
        ])
        .unwrap();
        let config = cli.into_config().unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:7000".parse().unwrap());
        assert_eq!(config.backend, "10.1.1.1:30001");
        assert_eq!(config.max_redirects, ProxyConfig::default().max_redirects);
    }

    #[test]
    fn zero_redirects_rejected() {
        let cli = Cli::try_parse_from(["rcproxy", "--max-redirects", "0"]).unwrap();
        assert!(matches!(cli.into_config(), Err(RcpError::Config(_))));
    }

    #[test]
    fn bad_port_is_a_parse_error() {
        assert!(Cli::try_parse_from(["rcproxy", "--port", "70000"]).is_err());
    }
}
