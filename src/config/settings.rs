//! Engine configuration settings.
//!
//! All values carry serde defaults so an empty configuration source yields a
//! working engine.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;

// ============================================================================
// Default value functions
// ============================================================================

fn default_poll_interval() -> u64 {
    5
}

fn default_zombie_hunt_multiplier() -> u64 {
    60 // with a 5 second poll interval this hunts every 5 minutes
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_queue_limit() -> usize {
    1000
}

// ============================================================================
// Settings
// ============================================================================

/// Complete engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Queue poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// The zombie hunter runs every this-many poll ticks
    #[serde(default = "default_zombie_hunt_multiplier")]
    pub zombie_hunt_multiplier: u64,

    /// IANA time zone used for cron evaluation and engine timestamps
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Maximum number of candidates loaded per job and sync pass
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            zombie_hunt_multiplier: default_zombie_hunt_multiplier(),
            time_zone: default_time_zone(),
            queue_limit: default_queue_limit(),
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file plus `FOREMAN__*` environment
    /// overrides.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        crate::config::loader::load(path)
    }

    /// Validate the loaded settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::validation(
                "poll_interval_seconds",
                "must be greater than zero",
            ));
        }
        if self.zombie_hunt_multiplier == 0 {
            return Err(ConfigError::validation(
                "zombie_hunt_multiplier",
                "must be greater than zero",
            ));
        }
        if self.queue_limit == 0 {
            return Err(ConfigError::validation(
                "queue_limit",
                "must be greater than zero",
            ));
        }
        self.parsed_time_zone()?;
        Ok(())
    }

    /// The configured time zone, parsed.
    pub fn parsed_time_zone(&self) -> Result<Tz, ConfigError> {
        self.time_zone.parse::<Tz>().map_err(|_| {
            ConfigError::validation(
                "time_zone".to_string(),
                format!("unknown time zone '{}'", self.time_zone),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.poll_interval_seconds, 5);
        assert_eq!(settings.zombie_hunt_multiplier, 60);
        assert_eq!(settings.time_zone, "UTC");
        assert_eq!(settings.queue_limit, 1000);
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let settings = Settings {
            poll_interval_seconds: 0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ValidationError { field, .. }) if field == "poll_interval_seconds"
        ));
    }

    #[test]
    fn zero_multiplier_is_rejected() {
        let settings = Settings {
            zombie_hunt_multiplier: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unknown_time_zone_is_rejected() {
        let settings = Settings {
            time_zone: "Mars/Olympus_Mons".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ValidationError { field, .. }) if field == "time_zone"
        ));
    }

    #[test]
    fn named_time_zone_parses() {
        let settings = Settings {
            time_zone: "Europe/Berlin".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.parsed_time_zone().unwrap(), chrono_tz::Europe::Berlin);
    }
}
