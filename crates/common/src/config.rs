//! Application configuration.

use phoneframe_frame_model::{FitPolicy, DEFAULT_BRAND_TEXT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory exported videos are delivered to.
    pub output_dir: PathBuf,

    /// Export settings.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Coarse capability class of the encoding environment.
///
/// Chosen once by the caller; the export core never inspects platform names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityClass {
    #[default]
    Standard,
    /// Mobile-class or otherwise limited encoders.
    Constrained,
}

impl CapabilityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityClass::Standard => "standard",
            CapabilityClass::Constrained => "constrained",
        }
    }
}

impl std::str::FromStr for CapabilityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(CapabilityClass::Standard),
            "constrained" => Ok(CapabilityClass::Constrained),
            other => Err(format!(
                "unknown capability class: {other} (use: standard, constrained)"
            )),
        }
    }
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Capture frame rate.
    pub fps: u32,

    /// Encoder capability class (selects the bit-rate).
    pub capability_class: CapabilityClass,

    /// Hard cap on the recording duration.
    pub max_duration_ms: u64,

    /// Duration used when the source does not report one.
    pub fallback_duration_ms: u64,

    /// Base name of the delivered file (extension follows the codec).
    pub filename_base: String,

    /// Watermark text drawn in the bottom-right corner.
    pub brand_text: String,

    /// Font used for the watermark. System fonts are searched when unset.
    pub font_path: Option<PathBuf>,

    /// How the source video is placed inside the screen.
    pub fit_policy: FitPolicy,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "phoneframe=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            export: ExportDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            capability_class: CapabilityClass::Standard,
            max_duration_ms: 60_000,
            fallback_duration_ms: 30_000,
            filename_base: "phone-frame-4x3".to_string(),
            brand_text: DEFAULT_BRAND_TEXT.to_string(),
            font_path: None,
            fit_policy: FitPolicy::Width,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    base.join("phoneframe").join("config.json")
}

/// Default delivery directory.
fn default_output_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_DOWNLOAD_DIR") {
        return PathBuf::from(dir);
    }
    let downloads = home_dir().join("Downloads");
    if downloads.is_dir() {
        downloads
    } else {
        PathBuf::from(".")
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{ "export": { "fps": 24, "capability_class": "constrained" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.export.fps, 24);
        assert_eq!(config.export.capability_class, CapabilityClass::Constrained);
        assert_eq!(config.export.max_duration_ms, 60_000);
        assert_eq!(config.export.fit_policy, FitPolicy::Width);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_roundtrips_fit_policy() {
        let mut config = AppConfig::default();
        config.export.fit_policy = FitPolicy::Contain;
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"contain\""));
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.export.fit_policy, FitPolicy::Contain);
    }

    #[test]
    fn test_capability_class_parses() {
        assert_eq!(
            "standard".parse::<CapabilityClass>().unwrap(),
            CapabilityClass::Standard
        );
        assert!("ios".parse::<CapabilityClass>().is_err());
    }
}
