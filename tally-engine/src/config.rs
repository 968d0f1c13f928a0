use serde::{Deserialize, Serialize};
use time::Duration;

use crate::domain::DEFAULT_LEDGER_CAPACITY;

/// Tunables of the engine. Every field has a default so partial config files work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Minimum duration any record may be planned down to.
    pub floor_seconds: i64,
    pub default_target_hours: f64,
    pub ledger_capacity: usize,
    pub ledger_retention_days: i64,
    pub intensity_cache_ttl_secs: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            floor_seconds: 900,
            default_target_hours: 8.0,
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            ledger_retention_days: 7,
            intensity_cache_ttl_secs: 300,
        }
    }
}

impl EngineSettings {
    pub fn default_target_seconds(&self) -> i64 {
        (self.default_target_hours * 3600.0).round() as i64
    }

    pub fn ledger_retention(&self) -> Duration {
        Duration::days(self.ledger_retention_days)
    }

    pub fn intensity_cache_ttl(&self) -> Duration {
        Duration::seconds(self.intensity_cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fall_back_to_defaults() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{"floor_seconds": 0, "default_target_hours": 7.5}"#).unwrap();

        assert_eq!(settings.floor_seconds, 0);
        assert_eq!(settings.default_target_seconds(), 27_000);
        assert_eq!(settings.ledger_capacity, 100);
        assert_eq!(settings.ledger_retention(), Duration::days(7));
        assert_eq!(settings.intensity_cache_ttl(), Duration::minutes(5));
    }
}
