//! Connection pool configuration
//!
//! Defines how many sessions a pooled tunnel connection may carry and for
//! how long it accepts new ones.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum sessions attached over the lifetime of one connection
fn default_max_sessions_per_connection() -> u16 {
    16
}

/// Default eligibility window in seconds
fn default_max_connection_age() -> u64 {
    60
}

/// Connection pool configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Session ids handed out by one connection before it stops accepting
    #[serde(default = "default_max_sessions_per_connection")]
    pub max_sessions_per_connection: u16,

    /// Seconds after creation during which a connection accepts sessions
    #[serde(default = "default_max_connection_age")]
    pub max_connection_age: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_sessions_per_connection: default_max_sessions_per_connection(),
            max_connection_age: default_max_connection_age(),
        }
    }
}

impl PoolConfig {
    /// Eligibility window as a duration
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_connection_age)
    }

    /// Validate the pool configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_sessions_per_connection == 0 {
            return Err("max_sessions_per_connection must be greater than 0".to_string());
        }
        // session ids travel in a 1-byte frame tag and start at 1
        if self.max_sessions_per_connection > u8::MAX as u16 {
            return Err("max_sessions_per_connection cannot exceed 255".to_string());
        }
        if self.max_connection_age == 0 {
            return Err("max_connection_age must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_sessions_per_connection, 16);
        assert_eq!(config.max_connection_age, 60);
        assert_eq!(config.max_age(), Duration::from_secs(60));
    }

    #[test]
    fn test_pool_config_validate_valid() {
        assert!(PoolConfig::default().validate().is_ok());

        let config = PoolConfig {
            max_sessions_per_connection: 255,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pool_config_validate_too_many_sessions() {
        let config = PoolConfig {
            max_sessions_per_connection: 256,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("255"));
    }

    #[test]
    fn test_pool_config_validate_zero() {
        let config = PoolConfig {
            max_sessions_per_connection: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PoolConfig {
            max_connection_age: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
