//! Engine connection configuration.
//!
//! ```toml
//! [engine]
//! host = "unix:///var/run/docker.sock"
//! api_version = "v1.43"
//! timeout = "30s"
//! ```

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default engine socket.
pub const DEFAULT_HOST: &str = "unix:///var/run/docker.sock";

/// Default API version prefix.
pub const DEFAULT_API_VERSION: &str = "v1.43";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: &str = "30s";

/// Engine connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine address: `unix:///path`, `tcp://host:port` or `http://host:port`.
    pub host: String,
    /// API version path prefix.
    pub api_version: String,
    /// Per-request timeout, in humantime syntax.
    pub timeout: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parses the configured host.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is unsupported or the address is empty.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.host)
    }

    /// Parses the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is not a valid duration.
    pub fn request_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.timeout)
            .map_err(|e| EngineError::Config(format!("invalid timeout {:?}: {e}", self.timeout)))
    }
}

/// Where the engine listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket.
    Unix(PathBuf),
    /// Plain TCP `host:port`.
    Tcp(String),
}

impl Endpoint {
    /// Parses an engine address.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is unsupported or the address is empty.
    pub fn parse(host: &str) -> Result<Self> {
        let endpoint = if let Some(path) = host.strip_prefix("unix://") {
            Self::Unix(PathBuf::from(path))
        } else if let Some(addr) = host
            .strip_prefix("tcp://")
            .or_else(|| host.strip_prefix("http://"))
        {
            Self::Tcp(addr.trim_end_matches('/').to_string())
        } else {
            return Err(EngineError::Config(format!(
                "unsupported engine host {host:?}, expected unix://, tcp:// or http://"
            )));
        };

        let empty = match &endpoint {
            Self::Unix(path) => path.as_os_str().is_empty(),
            Self::Tcp(addr) => addr.is_empty(),
        };
        if empty {
            return Err(EngineError::Config(format!("empty engine address in {host:?}")));
        }
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(
            config.endpoint().unwrap(),
            Endpoint::Unix(PathBuf::from("/var/run/docker.sock"))
        );
        assert_eq!(config.request_timeout().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_endpoint_parse() {
        assert_eq!(
            Endpoint::parse("tcp://10.0.0.5:2375").unwrap(),
            Endpoint::Tcp("10.0.0.5:2375".to_string())
        );
        assert_eq!(
            Endpoint::parse("http://localhost:2375/").unwrap(),
            Endpoint::Tcp("localhost:2375".to_string())
        );
        assert!(Endpoint::parse("ssh://host").is_err());
        assert!(Endpoint::parse("unix://").is_err());
    }

    #[test]
    fn test_invalid_timeout() {
        let config = EngineConfig {
            timeout: "soon".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.request_timeout(),
            Err(EngineError::Config(_))
        ));
    }
}
