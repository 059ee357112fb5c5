//! Relay configuration.
//!
//! Configuration is loaded from environment variables with sensible
//! defaults. Fixed secret room codes are redacted in Debug output.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default WebSocket/HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default maximum members per room.
pub const DEFAULT_MAX_ROOM_MEMBERS: usize = 10;

/// Default ephemeral message TTL in seconds.
pub const DEFAULT_MESSAGE_TTL_SECONDS: u64 = 60;

/// Default relay instance ID prefix.
pub const DEFAULT_RELAY_ID_PREFIX: &str = "relay";

/// Relay configuration.
///
/// Loaded from environment variables. Secret room codes are normalized
/// (trimmed, upper-cased) at load time so join-time comparison is a plain
/// equality check.
#[derive(Clone)]
pub struct Config {
    /// Bind address for the WebSocket and health endpoints (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Unique identifier for this relay instance (log correlation).
    pub relay_id: String,

    /// Maximum members per room, enforced at join time.
    pub max_room_members: usize,

    /// Delay before an ephemeral message's `delete` broadcast fires.
    pub message_ttl_seconds: u64,

    /// Fixed secret room codes, comma-separated in `WAYPOINT_SECRET_CODES`.
    /// Protected by `SecretString` to prevent accidental logging.
    pub secret_codes: Vec<SecretString>,
}

/// Custom Debug implementation that redacts the secret codes.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("relay_id", &self.relay_id)
            .field("max_room_members", &self.max_room_members)
            .field("message_ttl_seconds", &self.message_ttl_seconds)
            .field("secret_codes", &format!("[{} REDACTED]", self.secret_codes.len()))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("WAYPOINT_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let max_room_members = match vars.get("WAYPOINT_MAX_ROOM_MEMBERS") {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "WAYPOINT_MAX_ROOM_MEMBERS must be a positive integer, got {raw:?}"
                ))
            })?,
            None => DEFAULT_MAX_ROOM_MEMBERS,
        };
        if max_room_members == 0 {
            return Err(ConfigError::InvalidValue(
                "WAYPOINT_MAX_ROOM_MEMBERS must be at least 1".to_string(),
            ));
        }

        let message_ttl_seconds = match vars.get("WAYPOINT_MESSAGE_TTL_SECONDS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "WAYPOINT_MESSAGE_TTL_SECONDS must be an integer, got {raw:?}"
                ))
            })?,
            None => DEFAULT_MESSAGE_TTL_SECONDS,
        };

        // Secret codes are case-insensitive on the wire; normalize once here.
        let secret_codes = vars
            .get("WAYPOINT_SECRET_CODES")
            .map(String::as_str)
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(|code| SecretString::from(code.to_uppercase()))
            .collect();

        let relay_id = vars.get("WAYPOINT_RELAY_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_RELAY_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            relay_id,
            max_room_members,
            message_ttl_seconds,
            secret_codes,
        })
    }

    /// Secret codes as plain strings for join-time comparison.
    #[must_use]
    pub fn exposed_secret_codes(&self) -> Vec<String> {
        self.secret_codes
            .iter()
            .map(|code| code.expose_secret().to_string())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.max_room_members, DEFAULT_MAX_ROOM_MEMBERS);
        assert_eq!(config.message_ttl_seconds, DEFAULT_MESSAGE_TTL_SECONDS);
        assert!(config.secret_codes.is_empty());
        assert!(config.relay_id.starts_with("relay-"));
    }

    #[test]
    fn test_from_vars_custom_values() {
        let vars = HashMap::from([
            ("WAYPOINT_BIND_ADDRESS".to_string(), "127.0.0.1:9001".to_string()),
            ("WAYPOINT_MAX_ROOM_MEMBERS".to_string(), "4".to_string()),
            ("WAYPOINT_MESSAGE_TTL_SECONDS".to_string(), "30".to_string()),
            ("WAYPOINT_RELAY_ID".to_string(), "relay-custom-001".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load");
        assert_eq!(config.bind_address, "127.0.0.1:9001");
        assert_eq!(config.max_room_members, 4);
        assert_eq!(config.message_ttl_seconds, 30);
        assert_eq!(config.relay_id, "relay-custom-001");
    }

    #[test]
    fn test_secret_codes_are_split_and_normalized() {
        let vars = HashMap::from([(
            "WAYPOINT_SECRET_CODES".to_string(),
            " alpha1 ,beta2,, gamma3".to_string(),
        )]);

        let config = Config::from_vars(&vars).expect("Config should load");
        assert_eq!(
            config.exposed_secret_codes(),
            vec!["ALPHA1".to_string(), "BETA2".to_string(), "GAMMA3".to_string()]
        );
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let vars = HashMap::from([("WAYPOINT_MAX_ROOM_MEMBERS".to_string(), "0".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_non_numeric_capacity_is_rejected() {
        let vars = HashMap::from([("WAYPOINT_MAX_ROOM_MEMBERS".to_string(), "many".to_string())]);
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_debug_redacts_secret_codes() {
        let vars = HashMap::from([(
            "WAYPOINT_SECRET_CODES".to_string(),
            "hunter2,swordfish".to_string(),
        )]);
        let config = Config::from_vars(&vars).expect("Config should load");

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("REDACTED"));
        assert!(!debug_output.contains("HUNTER2"));
        assert!(!debug_output.contains("SWORDFISH"));
    }
}
