//! Shared serialization/deserialization utilities for configuration

/// Helper module for Duration serialization as seconds
///
/// This module serializes `std::time::Duration` as a u64 representing seconds,
/// which is more human-readable in TOML configuration files.
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a Duration as seconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    /// Deserialize a Duration from seconds (u64)
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct RejectionDelay {
        #[serde(with = "duration_secs")]
        delay: Duration,
    }

    #[test]
    fn test_duration_secs_serialize() {
        let config = RejectionDelay {
            delay: Duration::from_secs(1),
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(text.trim(), "delay = 1");
    }

    #[test]
    fn test_duration_secs_deserialize() {
        let config: RejectionDelay = toml::from_str("delay = 3").unwrap();
        assert_eq!(config.delay, Duration::from_secs(3));
    }
}
