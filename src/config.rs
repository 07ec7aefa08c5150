//! Configuration management for Windowgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, WindowgateError};
use crate::ratelimit::{Admission, RateLimiterConfig, WindowMode};
use crate::store::MAX_TTL;

/// Prefix of environment variables read by [`AppConfig::load`].
pub const ENV_PREFIX: &str = "WINDOWGATE";

/// Main configuration for the Windowgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiter configuration
    #[serde(default)]
    pub limiter: LimiterSettings,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Which counter store backs the limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared Redis server
    #[default]
    Redis,
    /// Process-local memory; counters are not shared between instances
    Memory,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend selection
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Prefix prepended to every bucket key in Redis
    #[serde(default)]
    pub key_prefix: String,

    /// Deadline for a single store command
    #[serde(with = "duration_str", default = "default_command_timeout")]
    pub command_timeout: Duration,

    /// Deadline for establishing the initial connection
    #[serde(with = "duration_str", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// How often the in-memory store drops expired counters
    #[serde(with = "duration_str", default = "default_purge_interval")]
    pub purge_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_redis_url(),
            key_prefix: String::new(),
            command_timeout: default_command_timeout(),
            connect_timeout: default_connect_timeout(),
            purge_interval: default_purge_interval(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_purge_interval() -> Duration {
    Duration::from_secs(30)
}

/// Rate limiter settings as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Key items for the construction-time bucket
    #[serde(default)]
    pub key_items: Vec<String>,

    /// Requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Window length
    #[serde(with = "duration_str", default = "default_refresh_interval")]
    pub refresh_interval: Duration,

    /// Counter expiry behavior
    #[serde(default)]
    pub window_mode: WindowMode,

    /// Read/increment ordering
    #[serde(default)]
    pub admission: Admission,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            key_items: Vec::new(),
            max_requests: default_max_requests(),
            refresh_interval: default_refresh_interval(),
            window_mode: WindowMode::default(),
            admission: Admission::default(),
        }
    }
}

fn default_max_requests() -> u64 {
    crate::ratelimit::DEFAULT_MAX_REQUESTS
}

fn default_refresh_interval() -> Duration {
    crate::ratelimit::DEFAULT_REFRESH_INTERVAL
}

impl LimiterSettings {
    /// Build the limiter configuration these settings describe.
    pub fn to_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::new(self.key_items.clone(), self.max_requests, self.refresh_interval)
            .with_window_mode(self.window_mode)
            .with_admission(self.admission)
    }
}

impl AppConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(yaml).map_err(|e| WindowgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file overlaid with
    /// `WINDOWGATE__<SECTION>__<FIELD>` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("limiter.key_items"),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.refresh_interval.is_zero() {
            return Err(WindowgateError::Config(
                "limiter.refresh_interval must be greater than zero".to_string(),
            ));
        }
        if self.limiter.refresh_interval > MAX_TTL {
            return Err(WindowgateError::Config(format!(
                "limiter.refresh_interval must be at most {}",
                format_duration(MAX_TTL)
            )));
        }
        if self.store.command_timeout.is_zero() {
            return Err(WindowgateError::Config(
                "store.command_timeout must be greater than zero".to_string(),
            ));
        }
        if self.store.purge_interval.is_zero() {
            return Err(WindowgateError::Config(
                "store.purge_interval must be greater than zero".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Redis && self.store.url.trim().is_empty() {
            return Err(WindowgateError::Config(
                "store.url is required for the redis backend".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings supplied on the command line or through the legacy
/// `SERVER_PORT`, `REDIS_URI`, `RATE_LIMITER_MAX_REQUESTS` and
/// `RATE_LIMITER_REFRESH_INTERVAL` variables. Unset fields leave the loaded
/// configuration untouched.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// HTTP port, keeping the configured host
    pub port: Option<u16>,
    /// Redis URL or `host:port` address
    pub redis_uri: Option<String>,
    /// Requests allowed per window, unparsed
    pub max_requests: Option<String>,
    /// Window length, unparsed
    pub refresh_interval: Option<String>,
}

impl Overrides {
    /// Apply the set fields to `config` and re-validate it.
    pub fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(port) = self.port {
            config.server.http_addr.set_port(port);
        }
        if let Some(uri) = &self.redis_uri {
            config.store.url = normalize_redis_url(uri);
        }
        if let Some(max_requests) = &self.max_requests {
            config.limiter.max_requests = max_requests.trim().parse().map_err(|e| {
                WindowgateError::Config(format!("invalid max requests {:?}: {}", max_requests, e))
            })?;
        }
        if let Some(interval) = &self.refresh_interval {
            config.limiter.refresh_interval = parse_duration(interval)?;
        }
        config.validate()
    }
}

/// Accept either a full `redis://` URL or a bare `host:port` address.
pub fn normalize_redis_url(uri: &str) -> String {
    let uri = uri.trim();
    if uri.contains("://") {
        uri.to_string()
    } else {
        format!("redis://{}", uri)
    }
}

/// Parse a duration such as `1m`, `30s`, `1m30s`, `1.5h` or `250ms`.
///
/// Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`; every number
/// needs one except a bare `0`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = |reason: &str| WindowgateError::Config(format!("invalid duration {:?}: {}", input, reason));

    let text = input.trim();
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if text.is_empty() {
        return Err(invalid("empty"));
    }

    let mut rest = text;
    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid("expected a number"));
        }
        let (number, tail) = rest.split_at(number_len);

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid("unknown unit")),
        };

        let nanos = scale_number(number, unit_nanos).ok_or_else(|| invalid("bad number"))?;
        total_nanos = total_nanos
            .checked_add(nanos)
            .ok_or_else(|| invalid("overflow"))?;
        rest = tail;
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000).map_err(|_| invalid("overflow"))?;
    Ok(Duration::new(secs, (total_nanos % 1_000_000_000) as u32))
}

fn scale_number(number: &str, unit_nanos: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(unit_nanos)?;

    if !fraction.is_empty() {
        // Digits past nanosecond precision cannot change the result.
        let digits = &fraction[..fraction.len().min(18)];
        let value: u128 = digits.parse().ok()?;
        nanos = nanos.checked_add(value * unit_nanos / 10u128.pow(digits.len() as u32))?;
    }
    Some(nanos)
}

/// Render a duration in the form accepted by [`parse_duration`].
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }
    if duration.subsec_nanos() != 0 {
        if duration.as_nanos() % 1_000_000 == 0 {
            return format!("{}ms", duration.as_millis());
        }
        return format!("{}ns", duration.as_nanos());
    }

    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }
    out
}

/// Serde adapter storing durations as strings like `1m30s`.
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
