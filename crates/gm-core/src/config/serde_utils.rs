//! Shared serde helpers for configuration types

/// Serialize a `Duration` as whole seconds, which reads better in TOML
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
    struct Timeouts {
        #[serde(with = "duration_secs")]
        startup: Duration,
    }

    #[test]
    fn test_duration_as_toml_integer() {
        let timeouts = Timeouts {
            startup: Duration::from_millis(30_900),
        };
        let text = toml::to_string(&timeouts).unwrap();
        assert_eq!(text.trim(), "startup = 30");

        let parsed: Timeouts = toml::from_str("startup = 45").unwrap();
        assert_eq!(parsed.startup, Duration::from_secs(45));
    }

    #[test]
    fn test_negative_duration_rejected() {
        assert!(toml::from_str::<Timeouts>("startup = -1").is_err());
    }
}
