//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`), each with a typed fallback. Parsing goes
//! through [`ClientConfig::from_lookup`] so it can be exercised without
//! touching the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::RealtimeError;
use crate::ws::backoff::Backoff;

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`], or built in code
/// with [`ClientConfig::new`] and field overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Gateway base URL (`ws://` or `wss://`).
    pub gateway_url: String,

    /// Deployment/instance identifier appended to the base URL.
    pub instance_id: String,

    /// Protocol-version path segment (e.g. `v1`).
    pub protocol_version: String,

    /// Backoff delay before the first reconnect.
    pub reconnect_base_delay: Duration,

    /// Upper bound on any single backoff delay.
    pub reconnect_max_delay: Duration,

    /// Reconnects scheduled before giving up.
    pub max_reconnect_attempts: u32,

    /// Interval between heartbeat pings while connected.
    pub heartbeat_interval: Duration,

    /// Deadline for a health check response.
    pub health_check_timeout: Duration,

    /// Window replayed when no start timestamp is given.
    pub replay_lookback: Duration,

    /// Deadline for opening the transport.
    pub connect_timeout: Duration,

    /// Commands buffered while disconnected before the oldest is dropped.
    pub outbound_queue_capacity: usize,

    /// Size of the recent-event window.
    pub event_history_capacity: usize,

    /// Capacity of the broadcast event stream.
    pub event_stream_capacity: usize,

    /// File used to persist the last known principal, if any.
    pub identity_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Creates a configuration for the given gateway with default tuning.
    #[must_use]
    pub fn new(gateway_url: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            instance_id: instance_id.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if the gateway URL does not use a
    /// WebSocket scheme or the instance identifier is empty.
    pub fn from_env() -> Result<Self, RealtimeError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if the resulting configuration is
    /// invalid (see [`ClientConfig::validate`]).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RealtimeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            gateway_url: lookup("REALTIME_GATEWAY_URL").unwrap_or(defaults.gateway_url),
            instance_id: lookup("REALTIME_INSTANCE_ID").unwrap_or(defaults.instance_id),
            protocol_version: lookup("REALTIME_PROTOCOL_VERSION")
                .unwrap_or(defaults.protocol_version),
            reconnect_base_delay: Duration::from_millis(parse_key(
                &lookup,
                "REALTIME_RECONNECT_BASE_DELAY_MS",
                1_000,
            )),
            reconnect_max_delay: Duration::from_millis(parse_key(
                &lookup,
                "REALTIME_RECONNECT_MAX_DELAY_MS",
                30_000,
            )),
            max_reconnect_attempts: parse_key(&lookup, "REALTIME_MAX_RECONNECT_ATTEMPTS", 10),
            heartbeat_interval: Duration::from_secs(parse_key(
                &lookup,
                "REALTIME_HEARTBEAT_INTERVAL_SECS",
                30,
            )),
            health_check_timeout: Duration::from_millis(parse_key(
                &lookup,
                "REALTIME_HEALTH_TIMEOUT_MS",
                5_000,
            )),
            replay_lookback: Duration::from_secs(parse_key(
                &lookup,
                "REALTIME_REPLAY_LOOKBACK_SECS",
                3_600,
            )),
            connect_timeout: Duration::from_secs(parse_key(
                &lookup,
                "REALTIME_CONNECT_TIMEOUT_SECS",
                10,
            )),
            outbound_queue_capacity: parse_key(&lookup, "REALTIME_OUTBOUND_QUEUE_CAPACITY", 1_000),
            event_history_capacity: parse_key(&lookup, "REALTIME_EVENT_HISTORY_CAPACITY", 100),
            event_stream_capacity: parse_key(&lookup, "REALTIME_EVENT_STREAM_CAPACITY", 1_024),
            identity_path: lookup("REALTIME_IDENTITY_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks the gateway address fields.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if `gateway_url` is not a `ws://` or
    /// `wss://` URL, or `instance_id` is blank.
    pub fn validate(&self) -> Result<(), RealtimeError> {
        if !(self.gateway_url.starts_with("ws://") || self.gateway_url.starts_with("wss://")) {
            return Err(RealtimeError::Config(format!(
                "gateway url must use ws:// or wss://, got {}",
                self.gateway_url
            )));
        }
        if self.instance_id.trim().is_empty() {
            return Err(RealtimeError::Config(
                "instance id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Full gateway endpoint: base URL, instance identifier and protocol
    /// version joined by `/`.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.gateway_url.trim_end_matches('/'),
            self.instance_id,
            self.protocol_version
        )
    }

    /// Reconnect policy derived from the backoff settings.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            self.reconnect_base_delay,
            self.reconnect_max_delay,
            self.max_reconnect_attempts,
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: "ws://localhost:8080".to_string(),
            instance_id: "default".to_string(),
            protocol_version: "v1".to_string(),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            heartbeat_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(5),
            replay_lookback: Duration::from_secs(3_600),
            connect_timeout: Duration::from_secs(10),
            outbound_queue_capacity: 1_000,
            event_history_capacity: 100,
            event_stream_capacity: 1_024,
            identity_path: None,
        }
    }
}

/// Parses a looked-up value as `T`, returning `default` on missing or
/// invalid values.
fn parse_key<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let Ok(config) = ClientConfig::from_lookup(|_| None) else {
            panic!("defaults should be valid");
        };
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.health_check_timeout, Duration::from_secs(5));
    }

    #[test]
    fn reads_overrides() {
        let lookup = lookup_from(&[
            ("REALTIME_GATEWAY_URL", "wss://events.example.org/"),
            ("REALTIME_INSTANCE_ID", "issuer-7"),
            ("REALTIME_MAX_RECONNECT_ATTEMPTS", "3"),
            ("REALTIME_RECONNECT_BASE_DELAY_MS", "250"),
            ("REALTIME_IDENTITY_PATH", "/tmp/principal.json"),
        ]);
        let Ok(config) = ClientConfig::from_lookup(lookup) else {
            panic!("config should parse");
        };
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(250));
        assert_eq!(
            config.identity_path,
            Some(PathBuf::from("/tmp/principal.json"))
        );
        assert_eq!(config.endpoint_url(), "wss://events.example.org/issuer-7/v1");
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let lookup = lookup_from(&[("REALTIME_OUTBOUND_QUEUE_CAPACITY", "lots")]);
        let Ok(config) = ClientConfig::from_lookup(lookup) else {
            panic!("config should parse");
        };
        assert_eq!(config.outbound_queue_capacity, 1_000);
    }

    #[test]
    fn rejects_http_scheme() {
        let lookup = lookup_from(&[("REALTIME_GATEWAY_URL", "https://events.example.org")]);
        let Err(err) = ClientConfig::from_lookup(lookup) else {
            panic!("http scheme must be rejected");
        };
        assert_eq!(err.error_code(), 4001);
    }

    #[test]
    fn rejects_blank_instance() {
        let config = ClientConfig::new("ws://localhost:9000", "  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn backoff_uses_configured_bounds() {
        let mut config = ClientConfig::default();
        config.max_reconnect_attempts = 2;
        let backoff = config.backoff();
        assert_eq!(backoff.next_delay(0), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_delay(2), None);
    }
}
