//! Configuration for the sign stream pipeline.
//!
//! Every threshold, buffer size and per-sign setting is a tunable constant
//! loaded from `config.json`, never derived at runtime.

use crate::classifier::reweight::{EvidenceShape, Scrutiny};
use crate::core::validator::{FingerShape, MotionBand, SignRule};
use crate::locale::LocaleTable;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sizes of the per-client bounded buffers
    pub buffers: BufferConfig,

    /// Confidence and motion thresholds
    pub thresholds: Thresholds,

    /// Temporal stabilizer tuning
    pub stabilizer: StabilizerConfig,

    /// Generic static/dynamic validation policy
    pub validator: ValidatorConfig,

    /// Known signs, in classifier output order
    pub signs: SignCatalog,

    /// Localized label tables
    pub locales: LocaleTable,

    /// Classification worker pool
    pub worker: WorkerConfig,

    /// Port for the HTTP server
    pub port: u16,

    /// URL of the external sequence classifier service
    pub classifier_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffers: BufferConfig::default(),
            thresholds: Thresholds::default(),
            stabilizer: StabilizerConfig::default(),
            validator: ValidatorConfig::default(),
            signs: SignCatalog::default(),
            locales: LocaleTable::default(),
            worker: WorkerConfig::default(),
            port: 5008,
            classifier_url: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, config_path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("signstream")
            .join("config.json")
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.signs.is_empty() {
            return invalid("sign catalog is empty");
        }
        if self.buffers.window_size == 0
            || self.buffers.motion_history == 0
            || self.buffers.prediction_history == 0
            || self.buffers.sentence == 0
        {
            return invalid("buffer sizes must be non-zero");
        }
        for (name, value) in [
            ("base", self.thresholds.base),
            ("high", self.thresholds.high),
            ("raw_override", self.thresholds.raw_override),
            ("relaxed_fraction", self.thresholds.relaxed_fraction),
            ("invalid_discount", self.thresholds.invalid_discount),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "threshold {name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.thresholds.motion <= 0.0 {
            return invalid("motion threshold must be positive");
        }
        if self.stabilizer.vote_majority == 0
            || self.stabilizer.vote_majority > self.stabilizer.vote_window
        {
            return invalid("vote majority must be within 1..=vote_window");
        }
        if self.stabilizer.vote_window > self.buffers.prediction_history {
            return invalid("vote window exceeds prediction history");
        }
        if self.worker.workers == 0 || self.worker.queue_capacity == 0 {
            return invalid("worker pool needs at least one worker and queue slot");
        }
        for sign in self.signs.iter() {
            if sign.weight < 0.0 || !sign.weight.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "sign {} has invalid weight {}",
                    sign.label, sign.weight
                )));
            }
        }
        Ok(())
    }
}

/// Capacities of the per-client bounded buffers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Frames per classification window
    pub window_size: usize,
    /// Motion magnitudes kept per client
    pub motion_history: usize,
    /// Raw class indices kept per client
    pub prediction_history: usize,
    /// Committed labels kept in the sentence
    pub sentence: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            window_size: 30,
            motion_history: 10,
            prediction_history: 10,
            sentence: 5,
        }
    }
}

/// Confidence and motion thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Base confidence threshold
    pub base: f64,
    /// Confidence at or above which a prediction commits without a vote
    pub high: f64,
    /// Raw top score above which the unweighted prediction overrides the weighted one
    pub raw_override: f64,
    /// Mean per-point hand displacement that separates still from moving
    pub motion: f64,
    /// Fraction of the base threshold the slow path requires
    pub relaxed_fraction: f64,
    /// Factor applied to the confidence of geometrically invalid predictions
    pub invalid_discount: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            base: 0.65,
            high: 0.90,
            raw_override: 0.65,
            motion: 0.025,
            relaxed_fraction: 0.9,
            invalid_discount: 0.65,
        }
    }
}

/// Temporal stabilizer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilizerConfig {
    /// Number of recent raw predictions considered by the majority vote
    pub vote_window: usize,
    /// Votes a label needs within the window
    pub vote_majority: usize,
    /// Consecutive cycles a candidate must hold before committing
    pub min_consecutive: u32,
    /// Minimum time a candidate must persist before committing
    #[serde(with = "duration_serde")]
    pub min_dwell: Duration,
    /// Frames without hands tolerated before pending tracking is reset
    pub empty_frame_limit: u32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            vote_window: 3,
            vote_majority: 2,
            min_consecutive: 2,
            min_dwell: Duration::from_millis(400),
            empty_frame_limit: 10,
        }
    }
}

/// Generic motion policy for signs without a bespoke rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Motion samples averaged by sign rules
    pub rule_motion_samples: usize,
    /// Motion samples averaged by the generic policy
    pub default_motion_samples: usize,
    /// Static signs need mean motion below this multiple of the threshold
    pub static_max_motion: f64,
    /// Dynamic signs need mean motion above this multiple of the threshold
    pub dynamic_min_motion: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            rule_motion_samples: 3,
            default_motion_samples: 2,
            static_max_motion: 1.5,
            dynamic_min_motion: 0.5,
        }
    }
}

/// Classification worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker threads; clients are sharded across them
    pub workers: usize,
    /// Pending windows per worker before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 64,
        }
    }
}

/// How a sign is articulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Articulation {
    /// Held pose, little motion expected
    Static,
    /// Moving sign, motion expected
    Dynamic,
}

/// Configuration for a single sign class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignSpec {
    /// Canonical label
    pub label: String,
    pub articulation: Articulation,
    /// Multiplier applied to the classifier score
    pub weight: f64,
    /// Minimum time between two commits of this sign (zero for none)
    #[serde(with = "duration_serde", default)]
    pub cooldown: Duration,
    /// Bespoke geometric test replacing the generic policy
    #[serde(default)]
    pub rule: Option<SignRule>,
    /// Extra skepticism for a sign the classifier over-predicts
    #[serde(default)]
    pub scrutiny: Option<Scrutiny>,
}

impl SignSpec {
    pub fn new(label: impl Into<String>, articulation: Articulation, weight: f64) -> Self {
        Self {
            label: label.into(),
            articulation,
            weight,
            cooldown: Duration::ZERO,
            rule: None,
            scrutiny: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_rule(mut self, rule: SignRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn with_scrutiny(mut self, scrutiny: Scrutiny) -> Self {
        self.scrutiny = Some(scrutiny);
        self
    }
}

/// Ordered table of known signs. Index `i` matches the classifier's `i`-th score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignCatalog {
    signs: Vec<SignSpec>,
}

impl SignCatalog {
    pub fn new(signs: Vec<SignSpec>) -> Self {
        Self { signs }
    }

    pub fn len(&self) -> usize {
        self.signs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignSpec> {
        self.signs.iter()
    }

    /// Sign by classifier index.
    pub fn at(&self, index: usize) -> Option<&SignSpec> {
        self.signs.get(index)
    }

    /// Sign by canonical label.
    pub fn get(&self, label: &str) -> Option<&SignSpec> {
        self.signs.iter().find(|s| s.label == label)
    }

    /// Classifier index of a canonical label.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.signs.iter().position(|s| s.label == label)
    }

    /// Configured cooldown for a label; zero when unknown.
    pub fn cooldown(&self, label: &str) -> Duration {
        self.get(label).map(|s| s.cooldown).unwrap_or(Duration::ZERO)
    }
}

impl Default for SignCatalog {
    fn default() -> Self {
        Self::new(vec![
            SignSpec::new("hello", Articulation::Dynamic, 1.1).with_rule(SignRule::HandNearNose {
                nose_margin: 0.05,
                motion_band: MotionBand::new(0.5, 2.0),
                fallback_min_motion: 0.8,
            }),
            SignSpec::new("thanks", Articulation::Dynamic, 1.1).with_rule(
                SignRule::HandsNearChin {
                    contour_points: 17,
                    fingertip_tolerance: 0.1,
                    motion_band: MotionBand::new(0.6, 1.5),
                },
            ),
            SignSpec::new("iloveyou", Articulation::Static, 0.85)
                .with_cooldown(Duration::from_secs(2))
                .with_rule(SignRule::FingerShape(FingerShape::default()))
                .with_scrutiny(Scrutiny {
                    evidence: EvidenceShape::default(),
                    ..Scrutiny::default()
                }),
        ])
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration, in milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.buffers.window_size, 30);
        assert_eq!(config.buffers.sentence, 5);
        assert_eq!(config.signs.len(), 3);
        assert_eq!(config.stabilizer.min_dwell, Duration::from_millis(400));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = SignCatalog::default();
        assert_eq!(catalog.index_of("thanks"), Some(1));
        assert_eq!(catalog.at(2).map(|s| s.label.as_str()), Some("iloveyou"));
        assert_eq!(catalog.cooldown("iloveyou"), Duration::from_secs(2));
        assert_eq!(catalog.cooldown("hello"), Duration::ZERO);
        assert_eq!(catalog.cooldown("unknown"), Duration::ZERO);
        assert_eq!(
            catalog.get("iloveyou").map(|s| s.articulation),
            Some(Articulation::Static)
        );
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"min_dwell\": 400"));
        assert!(json.contains("\"cooldown\": 2000"));

        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.signs.len(), 3);
        assert_eq!(parsed.signs.cooldown("iloveyou"), Duration::from_secs(2));
        assert!(parsed.signs.get("iloveyou").unwrap().scrutiny.is_some());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(parsed.port, 9000);
        assert_eq!(parsed.buffers.window_size, 30);
    }

    #[test]
    fn test_save_and_load_from_file() {
        let dir = std::env::temp_dir().join(format!("signstream-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");

        let mut config = Config::default();
        config.port = 6100;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.port, 6100);
        assert_eq!(loaded.signs.len(), 3);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::ParseError(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.thresholds.high = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.signs = SignCatalog::new(Vec::new());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.stabilizer.vote_majority = 4;
        assert!(config.validate().is_err());
    }
}
