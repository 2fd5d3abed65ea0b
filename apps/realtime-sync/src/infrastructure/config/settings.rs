//! Sync Configuration Settings
//!
//! Configuration types for the realtime sync service, loaded from
//! environment variables. Every setting has a default, so an empty
//! environment yields a service that talks to `http://localhost:3000`.

use std::time::Duration;

use url::Url;

/// Default origin used when no backend URL is configured.
pub const DEFAULT_FALLBACK_ORIGIN: &str = "http://localhost:3000";

/// Default QX API base URL.
pub const DEFAULT_QX_API_URL: &str = "https://api.qubic.org/v1/qx";

/// HTTP fetch settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Backend REST base (`BACKEND_API_URL`). Empty means "same origin";
    /// a value starting with `/` is a path on the fallback origin.
    pub backend_api_url: String,
    /// QX API base (`QX_API_URL`).
    pub qx_api_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            backend_api_url: String::new(),
            qx_api_url: DEFAULT_QX_API_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Socket.IO connection settings.
#[derive(Debug, Clone)]
pub struct SocketSettings {
    /// Connect as soon as the client starts.
    pub auto_connect: bool,
    /// Time allowed for the WebSocket upgrade plus namespace handshake.
    pub connect_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            auto_connect: true,
            connect_timeout: Duration::from_secs(20),
            reconnect_delay_initial: Duration::from_millis(1_000),
            reconnect_delay_max: Duration::from_secs(5),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0,
        }
    }
}

/// Status server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Port for `/health`, `/healthz`, `/readyz` and `/metrics`.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8090 }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Origin standing in for "the current page" when no backend URL is set.
    pub fallback_origin: String,
    /// HTTP fetch settings.
    pub http: HttpSettings,
    /// Socket.IO connection settings.
    pub socket: SocketSettings,
    /// Status server settings.
    pub server: ServerSettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fallback_origin: DEFAULT_FALLBACK_ORIGIN.to_string(),
            http: HttpSettings::default(),
            socket: SocketSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl SyncConfig {
    /// Create configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL setting does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL setting does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let env = Env(&lookup);

        let fallback_origin = env
            .string("SYNC_FALLBACK_ORIGIN")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(defaults.fallback_origin);

        let http = HttpSettings {
            backend_api_url: env
                .string("BACKEND_API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.http.backend_api_url),
            qx_api_url: env
                .string("QX_API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.http.qx_api_url),
            timeout: env.duration_secs("SYNC_HTTP_TIMEOUT_SECS", defaults.http.timeout),
        };

        let socket = SocketSettings {
            auto_connect: env.bool("SYNC_AUTO_CONNECT", defaults.socket.auto_connect),
            connect_timeout: env
                .duration_secs("SYNC_CONNECT_TIMEOUT_SECS", defaults.socket.connect_timeout),
            reconnect_delay_initial: env.duration_millis(
                "SYNC_RECONNECT_DELAY_INITIAL_MS",
                defaults.socket.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_secs(
                "SYNC_RECONNECT_DELAY_MAX_SECS",
                defaults.socket.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse(
                "SYNC_RECONNECT_DELAY_MULTIPLIER",
                defaults.socket.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: env.parse(
                "SYNC_MAX_RECONNECT_ATTEMPTS",
                defaults.socket.max_reconnect_attempts,
            ),
        };

        let server = ServerSettings {
            health_port: env.parse("SYNC_HEALTH_PORT", defaults.server.health_port),
        };

        let config = Self {
            fallback_origin,
            http,
            socket,
            server,
        };
        config.validate()?;
        Ok(config)
    }

    /// Base for backend REST calls.
    ///
    /// An unset backend URL means the fallback origin itself; a path such
    /// as `/api` is resolved against it.
    #[must_use]
    pub fn backend_api_base(&self) -> String {
        self.resolve(&self.http.backend_api_url)
    }

    /// URL of the push endpoint: the backend URL with its first `/api`
    /// removed, or the fallback origin when that leaves nothing.
    #[must_use]
    pub fn socket_url(&self) -> String {
        self.resolve(&self.http.backend_api_url.replacen("/api", "", 1))
    }

    fn resolve(&self, url: &str) -> String {
        if url.is_empty() {
            self.fallback_origin.clone()
        } else if url.starts_with('/') {
            format!("{}{url}", self.fallback_origin)
        } else {
            url.to_string()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_url("SYNC_FALLBACK_ORIGIN", &self.fallback_origin)?;
        check_url("QX_API_URL", &self.http.qx_api_url)?;
        if !self.http.backend_api_url.is_empty() {
            check_url("BACKEND_API_URL", &self.backend_api_base())?;
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A URL setting did not parse.
    #[error("{key} is not a valid URL ({value:?}): {reason}")]
    InvalidUrl {
        /// Environment variable name.
        key: String,
        /// Offending value.
        value: String,
        /// Parser message.
        reason: String,
    },
    /// A URL setting uses a scheme the service cannot talk to.
    #[error("{key} must use http, https, ws or wss, got {scheme:?}")]
    UnsupportedScheme {
        /// Environment variable name.
        key: String,
        /// Scheme found.
        scheme: String,
    },
}

fn check_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" | "ws" | "wss" => Ok(()),
        other => Err(ConfigError::UnsupportedScheme {
            key: key.to_string(),
            scheme: other.to_string(),
        }),
    }
}

// =============================================================================
// Environment Parsing
// =============================================================================

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.string(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        self.string(key)
            .and_then(|v| match v.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            })
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<SyncConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        SyncConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.fallback_origin, DEFAULT_FALLBACK_ORIGIN);
        assert_eq!(config.http.qx_api_url, DEFAULT_QX_API_URL);
        assert!(config.socket.auto_connect);
        assert_eq!(config.socket.reconnect_delay_initial, Duration::from_secs(1));
        assert_eq!(config.socket.reconnect_delay_max, Duration::from_secs(5));
        assert_eq!(config.socket.max_reconnect_attempts, 0);
        assert_eq!(config.server.health_port, 8090);
    }

    #[test_case("https://host.example/api", "https://host.example" ; "api suffix")]
    #[test_case("https://host.example/api/v1", "https://host.example/v1" ; "api in the middle")]
    #[test_case("https://api.example/api", "https:/.example/api" ; "first occurrence only")]
    #[test_case("http://localhost:4000", "http://localhost:4000" ; "no api segment")]
    #[test_case("/api", "https://qx.example" ; "relative api path is the origin")]
    #[test_case("/api/", "https://qx.example" ; "relative api path with slash")]
    #[test_case("/api/v1", "https://qx.example/v1" ; "relative path keeps namespace")]
    fn socket_url_strips_first_api(backend: &str, expected: &str) {
        let config = config(&[
            ("BACKEND_API_URL", backend),
            ("SYNC_FALLBACK_ORIGIN", "https://qx.example"),
        ])
        .unwrap();
        assert_eq!(config.socket_url(), expected);
    }

    #[test]
    fn relative_backend_url_resolves_against_origin() {
        let config = config(&[
            ("BACKEND_API_URL", "/api"),
            ("SYNC_FALLBACK_ORIGIN", "https://qx.example/"),
        ])
        .unwrap();
        assert_eq!(config.backend_api_base(), "https://qx.example/api");
        assert_eq!(config.socket_url(), "https://qx.example");
    }

    #[test]
    fn socket_url_falls_back_to_origin() {
        let config = config(&[("SYNC_FALLBACK_ORIGIN", "https://qx.example")]).unwrap();
        assert_eq!(config.socket_url(), "https://qx.example");
        assert_eq!(config.backend_api_base(), "https://qx.example");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config(&[
            ("BACKEND_API_URL", "https://backend.example/api/"),
            ("SYNC_AUTO_CONNECT", "false"),
            ("SYNC_RECONNECT_DELAY_INITIAL_MS", "250"),
            ("SYNC_RECONNECT_DELAY_MAX_SECS", "30"),
            ("SYNC_RECONNECT_DELAY_MULTIPLIER", "1.5"),
            ("SYNC_MAX_RECONNECT_ATTEMPTS", "7"),
            ("SYNC_CONNECT_TIMEOUT_SECS", "3"),
            ("SYNC_HTTP_TIMEOUT_SECS", "4"),
            ("SYNC_HEALTH_PORT", "9000"),
        ])
        .unwrap();

        assert_eq!(config.backend_api_base(), "https://backend.example/api");
        assert!(!config.socket.auto_connect);
        assert_eq!(config.socket.reconnect_delay_initial, Duration::from_millis(250));
        assert_eq!(config.socket.reconnect_delay_max, Duration::from_secs(30));
        assert!((config.socket.reconnect_delay_multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.socket.max_reconnect_attempts, 7);
        assert_eq!(config.socket.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.http.timeout, Duration::from_secs(4));
        assert_eq!(config.server.health_port, 9000);
    }

    #[test]
    fn unparseable_numbers_keep_defaults() {
        let config = config(&[
            ("SYNC_HEALTH_PORT", "not-a-port"),
            ("SYNC_AUTO_CONNECT", "maybe"),
        ])
        .unwrap();
        assert_eq!(config.server.health_port, 8090);
        assert!(config.socket.auto_connect);
    }

    #[test]
    fn invalid_urls_are_rejected() {
        assert!(matches!(
            config(&[("BACKEND_API_URL", "not a url")]),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            config(&[("QX_API_URL", "ftp://qx.example")]),
            Err(ConfigError::UnsupportedScheme { .. })
        ));
    }
}
