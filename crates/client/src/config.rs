//! Client tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Settings of one [`PaymentClient`](crate::PaymentClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// On-chain challenge window of channels we propose.
    #[serde(default = "default_challenge_duration_secs")]
    pub challenge_duration_secs: u64,

    /// Interval between on-chain balance queries. Also bounds each query.
    #[serde(default = "default_balance_poll_interval_ms")]
    pub balance_poll_interval_ms: u64,

    /// Capacity of the actor's command queue.
    #[serde(default = "default_command_queue_depth")]
    pub command_queue_depth: usize,
}

fn default_challenge_duration_secs() -> u64 {
    10
}

fn default_balance_poll_interval_ms() -> u64 {
    1000
}

fn default_command_queue_depth() -> usize {
    32
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            challenge_duration_secs: default_challenge_duration_secs(),
            balance_poll_interval_ms: default_balance_poll_interval_ms(),
            command_queue_depth: default_command_queue_depth(),
        }
    }
}

impl ClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.balance_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.challenge_duration_secs == 0 {
            return Err(ClientError::Construction(
                "challenge_duration_secs must be positive".to_string(),
            ));
        }
        if self.balance_poll_interval_ms == 0 {
            return Err(ClientError::Construction(
                "balance_poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.command_queue_depth == 0 {
            return Err(ClientError::Construction(
                "command_queue_depth must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.challenge_duration_secs, 10);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"balance_poll_interval_ms": 50}"#).unwrap();
        assert_eq!(config.balance_poll_interval_ms, 50);
        assert_eq!(config.command_queue_depth, 32);
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = ClientConfig {
            balance_poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ClientError::Construction(_))
        ));
    }
}
