//! Peer identity exchanged in the handshake.
//!
//! Checkpoints are keyed by [`AppLifetimeKey`], which is stable across
//! sessions and process restarts. Connection handles and radio addresses are
//! never used as keys.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Stable identity of a sending installation.
///
/// Generated once per installation and persisted by the host. Rendered as
/// lowercase hex.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppLifetimeKey(String);

impl AppLifetimeKey {
    /// Wrap an existing key. Blank keys are rejected.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(CoreError::InvalidIdentity("app lifetime key is blank".into()));
        }
        Ok(Self(key))
    }

    /// Generate a fresh random key (128 bits).
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AppLifetimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AppLifetimeKey({})", self.0)
    }
}

impl fmt::Display for AppLifetimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Basic identity the sender transmits before any manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDetails {
    #[serde(rename = "app-lifetime-key")]
    pub app_lifetime_key: AppLifetimeKey,
    #[serde(rename = "device-id")]
    pub device_id: String,
}

impl DeviceDetails {
    pub fn new(app_lifetime_key: AppLifetimeKey, device_id: impl Into<String>) -> Self {
        Self {
            app_lifetime_key,
            device_id: device_id.into(),
        }
    }

    /// Reject details decoded from the wire with a blank key.
    pub fn validate(&self) -> Result<()> {
        if self.app_lifetime_key.as_str().trim().is_empty() {
            return Err(CoreError::InvalidIdentity("app lifetime key is blank".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_hex_and_unique() {
        let a = AppLifetimeKey::generate();
        let b = AppLifetimeKey::generate();
        assert_eq!(a.as_str().len(), 32);
        assert!(hex::decode(a.as_str()).is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn test_blank_key_rejected() {
        assert!(AppLifetimeKey::new("  ").is_err());
        assert!(AppLifetimeKey::new("abc").is_ok());
    }

    #[test]
    fn test_device_details_wire_keys() {
        let details = DeviceDetails::new(AppLifetimeKey::new("k1").unwrap(), "device-7");
        let json = serde_json::to_string(&details).unwrap();
        assert_eq!(json, r#"{"app-lifetime-key":"k1","device-id":"device-7"}"#);

        let parsed: DeviceDetails = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, details);
    }

    #[test]
    fn test_decoded_blank_key_fails_validation() {
        let parsed: DeviceDetails =
            serde_json::from_str(r#"{"app-lifetime-key":"","device-id":"x"}"#).unwrap();
        assert!(parsed.validate().is_err());
    }
}
