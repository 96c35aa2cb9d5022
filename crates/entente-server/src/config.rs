//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so a host can start with zero
//! configuration for local development.

use std::net::SocketAddr;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// The `host[:port]` peers use to reach this instance.  Sent inside
    /// outbound payloads so peers know where to call back.
    /// Env: `PUBLIC_HOST`
    /// Default: `localhost:8080`
    pub public_host: String,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Entente Node"`
    pub instance_name: String,

    /// Timeout in seconds for a single outbound peer call.  A timed-out
    /// peer is treated like any other unreachable peer.
    /// Env: `PEER_TIMEOUT_SECS`
    /// Default: `10`
    pub peer_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            public_host: "localhost:8080".to_string(),
            instance_name: "Entente Node".to_string(),
            peer_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(host) = std::env::var("PUBLIC_HOST") {
            config.public_host = host;
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Ok(val) = std::env::var("PEER_TIMEOUT_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.peer_timeout_secs = n;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

/// Scheme used to reach a peer host.  Local addresses get plain HTTP so
/// two development instances on one machine can talk to each other.
pub fn scheme_for(host: &str) -> &'static str {
    if host.starts_with("localhost") || host.starts_with("127.") {
        "http"
    } else {
        "https"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.public_host, "localhost:8080");
    }

    #[test]
    fn test_scheme_selection() {
        assert_eq!(scheme_for("localhost:8080"), "http");
        assert_eq!(scheme_for("127.0.0.1:9000"), "http");
        assert_eq!(scheme_for("social.example.org"), "https");
    }
}
