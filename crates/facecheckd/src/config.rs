use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use facecheck_core::{MatchError, Thresholds, QUALITY_MIN};

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP surface listens on (default: 127.0.0.1:3000).
    pub bind: SocketAddr,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Base URL of the external recognition service.
    pub recognition_url: String,
    /// Timeout in seconds for a single recognition service request.
    pub recognition_timeout_secs: u64,
    /// Timeout in seconds for a whole check-in (extract + fetch + match).
    pub checkin_timeout_secs: u64,
    /// Similarity at or above which a match is accepted.
    pub accept_threshold: f32,
    /// Similarity at or above which a rejected match counts as low confidence.
    pub low_confidence_threshold: f32,
    /// Minimum face quality reported by the recognition service.
    pub quality_min: f32,
}

impl Config {
    /// Load configuration from `FACECHECK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facecheck");

        let db_path = std::env::var("FACECHECK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("facecheck.db"));

        Self {
            bind: std::env::var("FACECHECK_BIND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000))),
            db_path,
            recognition_url: std::env::var("FACECHECK_RECOGNITION_URL")
                .unwrap_or_else(|_| "http://localhost:5000".to_string()),
            recognition_timeout_secs: env_u64("FACECHECK_RECOGNITION_TIMEOUT_SECS", 10),
            checkin_timeout_secs: env_u64("FACECHECK_CHECKIN_TIMEOUT_SECS", 20),
            accept_threshold: env_f32("FACECHECK_ACCEPT_THRESHOLD", Thresholds::DEFAULT_ACCEPT),
            low_confidence_threshold: env_f32(
                "FACECHECK_LOW_CONFIDENCE_THRESHOLD",
                Thresholds::DEFAULT_LOW_CONFIDENCE,
            ),
            quality_min: env_f32("FACECHECK_QUALITY_MIN", QUALITY_MIN),
        }
    }

    /// Validated decision thresholds.
    pub fn thresholds(&self) -> Result<Thresholds, MatchError> {
        Thresholds::new(self.accept_threshold, self.low_confidence_threshold)
    }

    /// Validated minimum face quality, within `[0, 1]`.
    pub fn quality_minimum(&self) -> Result<f32, MatchError> {
        if (0.0..=1.0).contains(&self.quality_min) {
            Ok(self.quality_min)
        } else {
            Err(MatchError::InvalidInput(format!(
                "quality minimum must be within [0, 1], got {}",
                self.quality_min
            )))
        }
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_secs(self.recognition_timeout_secs)
    }

    pub fn checkin_timeout(&self) -> Duration {
        Duration::from_secs(self.checkin_timeout_secs)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(quality_min: f32) -> Config {
        Config {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            db_path: PathBuf::from("/tmp/facecheck-test.db"),
            recognition_url: "http://localhost:5000".into(),
            recognition_timeout_secs: 10,
            checkin_timeout_secs: 20,
            accept_threshold: Thresholds::DEFAULT_ACCEPT,
            low_confidence_threshold: Thresholds::DEFAULT_LOW_CONFIDENCE,
            quality_min,
        }
    }

    #[test]
    fn test_quality_minimum_range() {
        assert_eq!(config(QUALITY_MIN).quality_minimum().unwrap(), 0.3);
        assert_eq!(config(0.0).quality_minimum().unwrap(), 0.0);
        assert_eq!(config(1.0).quality_minimum().unwrap(), 1.0);
        for bad in [f32::NAN, f32::INFINITY, -1.0, 1.5] {
            assert!(config(bad).quality_minimum().is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn test_default_thresholds_validate() {
        let thresholds = config(QUALITY_MIN).thresholds().unwrap();
        assert_eq!(thresholds, Thresholds::default());

        let mut inverted = config(QUALITY_MIN);
        inverted.accept_threshold = 0.2;
        assert!(inverted.thresholds().is_err());
    }
}
