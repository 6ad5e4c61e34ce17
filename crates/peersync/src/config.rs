//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use peersync_transfer::TransferConfig;

/// Configuration for a sync session.
///
/// Durations serialize as integer milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Engine and framing settings.
    pub transfer: TransferConfig,
    /// How long to wait for a pairing outcome.
    #[serde(with = "duration_ms")]
    pub pairing_timeout: Duration,
    /// Stream open attempts on the client link before giving up.
    pub connect_attempts: u32,
    /// Delay between client connect attempts.
    #[serde(with = "duration_ms")]
    pub connect_backoff: Duration,
    /// How long a peer-initiated disconnect waits for the in-flight exchange to drain.
    #[serde(with = "duration_ms")]
    pub disconnect_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transfer: TransferConfig::default(),
            pairing_timeout: Duration::from_secs(30),
            connect_attempts: 3,
            connect_backoff: Duration::from_secs(5),
            disconnect_grace: Duration::from_secs(2),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.transfer.batch_size, 25);
        assert_eq!(config.pairing_timeout, Duration::from_secs(30));
        assert_eq!(config.connect_attempts, 3);
        assert_eq!(config.connect_backoff, Duration::from_secs(5));
    }

    #[test]
    fn test_durations_as_millis() {
        let json = serde_json::to_value(SessionConfig::default()).unwrap();
        assert_eq!(json["pairing_timeout"], 30_000);
        assert_eq!(json["disconnect_grace"], 2_000);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"connect_attempts": 5, "transfer": {"batch_size": 10}}"#)
                .unwrap();
        assert_eq!(config.connect_attempts, 5);
        assert_eq!(config.transfer.batch_size, 10);
        assert_eq!(config.pairing_timeout, Duration::from_secs(30));
    }
}
