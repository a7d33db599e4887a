//! Configuration management for ResizeProbe

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{Result, ProbeError};

pub mod resize;
pub use resize::*;

/// Largest accepted target width, matching the codec's practical limits
pub const MAX_DIMENSION: u32 = 32768;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input/output locations and resize settings
    pub processing: ProcessingConfig,

    /// Memory sampling cadence
    pub sampling: SamplingConfig,

    /// Worker pool settings
    pub workers: WorkerConfig,

    /// Chart rendering settings
    pub chart: ChartConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Directory holding the source images
    pub input_dir: PathBuf,

    /// Directory the resized images are written to
    pub output_dir: PathBuf,

    /// Target width in pixels (height follows the aspect ratio)
    pub width: u32,

    /// Resampling filter
    pub filter: FilterType,

    /// Output format for every pipeline (None = pipeline default)
    pub format: Option<ImageFormat>,

    /// Descend into subdirectories of the input directory
    pub recursive: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("output"),
            width: 200,
            filter: FilterType::default(),
            format: None,
            recursive: false,
        }
    }
}

impl ProcessingConfig {
    /// Build the per-file resize configuration
    pub fn resize_config(&self) -> ResizeConfig {
        let config = ResizeConfig::new().width(self.width).filter(self.filter);
        match self.format {
            Some(format) => config.format(format),
            None => config,
        }
    }
}

/// Memory sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Number of samples taken after the last file
    pub idle_samples: u32,

    /// Pause before each idle sample, in milliseconds
    pub idle_interval_ms: u64,

    /// Pause after each file in the stream variant, in milliseconds
    pub settle_interval_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            idle_samples: 10,
            idle_interval_ms: 1000,
            settle_interval_ms: 1000,
        }
    }
}

impl SamplingConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Upper bound on concurrent workers (None = one worker per file)
    pub max_workers: Option<usize>,
}

/// Chart configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Canvas width in pixels
    pub width: u32,

    /// Canvas height in pixels
    pub height: u32,

    pub title: String,
    pub x_label: String,
    pub y_label: String,

    /// TrueType font used for chart text (None = no text is drawn)
    pub font: Option<PathBuf>,

    /// Directory charts are written to (None = per-variant default)
    pub output_dir: Option<PathBuf>,

    /// Write the sample log as JSON next to each chart
    pub write_json: bool,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Memory Usage During Image Processing".to_string(),
            x_label: "Processed Files".to_string(),
            y_label: "Memory Usage (MB)".to_string(),
            font: None,
            output_dir: None,
            write_json: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Supported image formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Tiff,
    Bmp,
}

impl ImageFormat {
    /// Get file extension for this format
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ProbeError::config(
                format!("Failed to read config file {:?}: {}", path.as_ref(), e)
            ))?;

        match config_extension(path.as_ref()).as_str() {
            "toml" => toml::from_str(&content).map_err(Into::into),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(Into::into),
            _ => Err(ProbeError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        }
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = match config_extension(path.as_ref()).as_str() {
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| ProbeError::config(format!("TOML serialization failed: {}", e)))?,
            "yaml" | "yml" => serde_yaml::to_string(self)?,
            _ => return Err(ProbeError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        };

        std::fs::write(&path, content)
            .map_err(|e| ProbeError::config(
                format!("Failed to write config file {:?}: {}", path.as_ref(), e)
            ))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.processing.resize_config().validate()
            .map_err(|e| ProbeError::config(format!("Invalid processing settings: {}", e)))?;

        if self.workers.max_workers == Some(0) {
            return Err(ProbeError::config("max_workers must be greater than 0"));
        }

        // Room for margins around the plot area
        if self.chart.width < 200 || self.chart.height < 150 {
            return Err(ProbeError::config(format!(
                "Chart must be at least 200x150 pixels, got {}x{}",
                self.chart.width, self.chart.height
            )));
        }

        if let Some(font) = &self.chart.font {
            if !font.is_file() {
                return Err(ProbeError::config(format!("Chart font not found: {:?}", font)));
            }
        }

        if self.logging.level.trim().is_empty() {
            return Err(ProbeError::config("Log level must not be empty"));
        }

        Ok(())
    }
}

fn config_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}
