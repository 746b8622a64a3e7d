use serde::Deserialize;

/// Main configuration structure for Goftar
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream API endpoints and timeouts
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Session cookie configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Retry and backoff configuration for the streaming relay
    #[serde(default)]
    pub retry: RetryConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8799")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8799".to_string()
}

/// Upstream API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the completion API (hosts /process-text-stream)
    #[serde(default)]
    pub base_api_url: String,
    /// Base URL of the auth API (hosts /login and /refresh-token)
    #[serde(default)]
    pub auth_api_url: String,
    /// Timeout for simple (non-streaming) upstream calls, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Hard timeout for a single streaming attempt, in seconds
    #[serde(default = "default_stream_timeout_secs")]
    pub stream_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_api_url: String::new(),
            auth_api_url: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            stream_timeout_secs: default_stream_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_stream_timeout_secs() -> u64 {
    120
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// HS256 signing secret for the session cookie
    #[serde(default)]
    pub secret: String,
    /// Name of the session cookie
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Lifetime of the session cookie itself, in seconds
    #[serde(default = "default_cookie_ttl_secs")]
    pub cookie_ttl_secs: u64,
    /// Access-token lifetime assumed when a passthrough sign-in omits expiry
    #[serde(default = "default_access_ttl_secs")]
    pub default_access_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            cookie_name: default_cookie_name(),
            cookie_ttl_secs: default_cookie_ttl_secs(),
            default_access_ttl_secs: default_access_ttl_secs(),
        }
    }
}

fn default_cookie_name() -> String {
    "goftar_session".to_string()
}

fn default_cookie_ttl_secs() -> u64 {
    30 * 24 * 3600
}

fn default_access_ttl_secs() -> u64 {
    3600
}

/// Retry and backoff configuration for the streaming relay
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Connection-establishment attempts before giving up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Linear backoff unit between connection attempts, in milliseconds
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
    /// Mid-stream reconnection attempts before giving up
    #[serde(default = "default_stream_attempts")]
    pub stream_attempts: u32,
    /// Exponential backoff base for mid-stream reconnects, in milliseconds
    #[serde(default = "default_stream_base_delay_ms")]
    pub stream_base_delay_ms: u64,
    /// Extra fixed delay applied after a socket reset, in milliseconds
    #[serde(default = "default_socket_reset_extra_delay_ms")]
    pub socket_reset_extra_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            connect_attempts: default_connect_attempts(),
            connect_backoff_ms: default_connect_backoff_ms(),
            stream_attempts: default_stream_attempts(),
            stream_base_delay_ms: default_stream_base_delay_ms(),
            socket_reset_extra_delay_ms: default_socket_reset_extra_delay_ms(),
        }
    }
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_connect_backoff_ms() -> u64 {
    1000
}

fn default_stream_attempts() -> u32 {
    5
}

fn default_stream_base_delay_ms() -> u64 {
    1000
}

fn default_socket_reset_extra_delay_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:8799");
        assert!(config.upstream.base_api_url.is_empty());
        assert!(config.upstream.auth_api_url.is_empty());
        assert_eq!(config.upstream.request_timeout_secs, 30);
        assert_eq!(config.upstream.stream_timeout_secs, 120);
        assert_eq!(config.session.cookie_name, "goftar_session");
        assert_eq!(config.session.cookie_ttl_secs, 30 * 24 * 3600);
        assert_eq!(config.session.default_access_ttl_secs, 3600);
        assert_eq!(config.retry.connect_attempts, 3);
        assert_eq!(config.retry.connect_backoff_ms, 1000);
        assert_eq!(config.retry.stream_attempts, 5);
        assert_eq!(config.retry.stream_base_delay_ms, 1000);
        assert_eq!(config.retry.socket_reset_extra_delay_ms, 2000);
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[server]
listen_addr = "0.0.0.0:8080"

[upstream]
base_api_url = "https://api.example.ir"
auth_api_url = "https://auth.example.ir"
request_timeout_secs = 15
stream_timeout_secs = 180

[session]
secret = "a-very-long-signing-secret"
cookie_name = "session"
cookie_ttl_secs = 86400
default_access_ttl_secs = 1800

[retry]
connect_attempts = 5
connect_backoff_ms = 250
stream_attempts = 2
stream_base_delay_ms = 100
socket_reset_extra_delay_ms = 500
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.upstream.base_api_url, "https://api.example.ir");
        assert_eq!(config.upstream.auth_api_url, "https://auth.example.ir");
        assert_eq!(config.upstream.request_timeout_secs, 15);
        assert_eq!(config.upstream.stream_timeout_secs, 180);
        assert_eq!(config.session.secret, "a-very-long-signing-secret");
        assert_eq!(config.session.cookie_name, "session");
        assert_eq!(config.session.cookie_ttl_secs, 86400);
        assert_eq!(config.session.default_access_ttl_secs, 1800);
        assert_eq!(config.retry.connect_attempts, 5);
        assert_eq!(config.retry.connect_backoff_ms, 250);
        assert_eq!(config.retry.stream_attempts, 2);
        assert_eq!(config.retry.stream_base_delay_ms, 100);
        assert_eq!(config.retry.socket_reset_extra_delay_ms, 500);
    }

    #[test]
    fn test_toml_partial_deserialization() {
        // Only the upstream section provided; everything else defaults
        let toml_str = r#"
[upstream]
base_api_url = "https://api.example.ir"
auth_api_url = "https://auth.example.ir"
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse partial TOML");

        assert_eq!(config.server.listen_addr, "127.0.0.1:8799");
        assert_eq!(config.upstream.base_api_url, "https://api.example.ir");
        assert_eq!(config.upstream.request_timeout_secs, 30);
        assert_eq!(config.upstream.stream_timeout_secs, 120);
        assert_eq!(config.retry.connect_attempts, 3);
        assert_eq!(config.retry.stream_attempts, 5);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").expect("Failed to parse empty TOML");
        assert_eq!(config.server.listen_addr, "127.0.0.1:8799");
        assert_eq!(config.session.cookie_name, "goftar_session");
        assert_eq!(config.retry.stream_attempts, 5);
    }
}
