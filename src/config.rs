use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::chronotype::ChronotypeThresholds;
use crate::hrv::HrvSettings;
use crate::logging::LogConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// Window lengths and regularity reference
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Chronotype category boundaries
    #[serde(default)]
    pub chronotype: ChronotypeThresholds,

    /// HRV spectral estimation parameters
    #[serde(default)]
    pub hrv: HrvSettings,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Default analysis windows, in days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    pub chronotype_window_days: u32,
    pub regularity_window_days: u32,

    /// Window the scored night is taken from
    pub recovery_window_days: u32,

    /// Window pooled into the HRV baseline
    pub recovery_baseline_days: u32,

    /// Hour bed and wake times are measured from
    pub regularity_reference_hour: u32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            chronotype_window_days: 7,
            regularity_window_days: 7,
            recovery_window_days: 1,
            recovery_baseline_days: 30,
            regularity_reference_hour: 20,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();
        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            analysis: AnalysisSettings::default(),
            chronotype: ChronotypeThresholds::default(),
            hrv: HrvSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sleeprs")
            .join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %config_path.display(), error = %format!("{:#}", e), "using default configuration");
                Self::default()
            }
        }
    }

    /// Save configuration to default location
    pub fn save_default(&mut self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to_file(config_path)
    }

    /// Reject settings the estimators cannot work with
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::SleepRsError;

        if !self.chronotype.is_ordered() {
            return Err(SleepRsError::Configuration(format!(
                "chronotype early_before ({}) must not be later than late_from ({})",
                self.chronotype.early_before, self.chronotype.late_from
            )));
        }
        if self.hrv.resample_hz.is_nan() || self.hrv.resample_hz <= 0.0 {
            return Err(SleepRsError::Configuration(format!(
                "hrv resample_hz must be positive, got {}",
                self.hrv.resample_hz
            )));
        }
        if self.hrv.welch_segment_len < 2 {
            return Err(SleepRsError::Configuration(
                "hrv welch_segment_len must be at least 2".to_string(),
            ));
        }
        if self.analysis.regularity_reference_hour >= 24 {
            return Err(SleepRsError::Configuration(format!(
                "regularity_reference_hour must be below 24, got {}",
                self.analysis.regularity_reference_hour
            )));
        }
        Ok(())
    }
}
