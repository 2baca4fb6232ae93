use std::path::{Path, PathBuf};

use crate::UNSPECIFIED_LABEL;
use crate::reference::Montage;

pub const MIN_WINDOW_SECONDS: f64 = 1.0;
pub const MAX_WINDOW_SECONDS: f64 = 60.0;
pub const MIN_AMPLITUDE_SCALE: f64 = 1.0;
pub const MAX_AMPLITUDE_SCALE: f64 = 100.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Reviewer settings. Any key missing from the file keeps its default.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReviewConfig {
    /// Seconds of signal visible at once.
    pub window_seconds: f64,
    pub amplitude_scale: f64,
    /// Step used by skip back / skip forward.
    pub skip_seconds: f64,
    /// Narrower drags are treated as clicks.
    pub min_draw_seconds: f64,
    /// Smallest gap kept between refined start and end.
    pub min_region_seconds: f64,
    /// Context shown either side of a group while refining.
    pub refine_padding_seconds: f64,
    pub default_label: String,
    /// Labels offered when confirming a region.
    pub labels: Vec<String>,
    pub montage: Montage,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            window_seconds: 30.0,
            amplitude_scale: 25.0,
            skip_seconds: 5.0,
            min_draw_seconds: 0.15,
            min_region_seconds: 0.05,
            refine_padding_seconds: 2.0,
            default_label: UNSPECIFIED_LABEL.to_owned(),
            labels: [
                "Seizure",
                "Spike",
                "Sharp Wave",
                "Slow Activity",
                "Artifact",
                "Other",
            ]
            .map(str::to_owned)
            .to_vec(),
            montage: Montage::Referential,
        }
    }
}

impl ReviewConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded config from {}: {config:?}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let config: Self = toml::from_str(text)?;
        Ok(config.sanitized())
    }

    /// Pulls out-of-range values back to something usable.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.window_seconds = clamp_or(
            self.window_seconds,
            MIN_WINDOW_SECONDS,
            MAX_WINDOW_SECONDS,
            defaults.window_seconds,
        );
        self.amplitude_scale = clamp_or(
            self.amplitude_scale,
            MIN_AMPLITUDE_SCALE,
            MAX_AMPLITUDE_SCALE,
            defaults.amplitude_scale,
        );
        for (value, fallback) in [
            (&mut self.skip_seconds, defaults.skip_seconds),
            (&mut self.min_draw_seconds, defaults.min_draw_seconds),
            (&mut self.min_region_seconds, defaults.min_region_seconds),
            (&mut self.refine_padding_seconds, defaults.refine_padding_seconds),
        ] {
            if !(value.is_finite() && *value >= 0.0) {
                log::warn!("Config value {value} is not a usable duration, using {fallback}");
                *value = fallback;
            }
        }
        if self.default_label.trim().is_empty() {
            self.default_label = defaults.default_label;
        }
        self
    }
}

fn clamp_or(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(ReviewConfig::from_toml("").expect("parses"), ReviewConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let config = ReviewConfig::from_toml(
            "window_seconds = 10.0\nlabels = [\"Spike\"]\nmontage = \"average-reference\"\n",
        )
        .expect("parses");
        assert_eq!(config.window_seconds, 10.0);
        assert_eq!(config.labels, vec!["Spike".to_owned()]);
        assert_eq!(config.montage, Montage::AverageReference);
        assert_eq!(config.skip_seconds, 5.0);
    }

    #[test]
    fn out_of_range_values_are_pulled_back() {
        let config = ReviewConfig::from_toml(
            "window_seconds = 600.0\n\
             amplitude_scale = 0.0\n\
             min_draw_seconds = -1.0\n\
             default_label = \" \"\n",
        )
        .expect("parses");
        assert_eq!(config.window_seconds, MAX_WINDOW_SECONDS);
        assert_eq!(config.amplitude_scale, MIN_AMPLITUDE_SCALE);
        assert_eq!(config.min_draw_seconds, 0.15);
        assert_eq!(config.default_label, UNSPECIFIED_LABEL);
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(ReviewConfig::from_toml("window_seconds = \"wide\"").is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ReviewConfig::load(&dir.path().join("absent.toml")).expect_err("missing");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
