//! Per-file resize settings

use serde::{Deserialize, Serialize};
use crate::config::{ImageFormat, MAX_DIMENSION};
use crate::error::{Result, ProbeError};

/// Available resize filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    /// Nearest neighbor (fastest, lowest quality)
    Nearest,
    /// Triangle (linear interpolation)
    Triangle,
    /// Catmull-Rom cubic spline
    CatmullRom,
    /// Gaussian blur
    Gaussian,
    /// Lanczos with radius 3
    #[default]
    Lanczos3,
}

impl From<FilterType> for image::imageops::FilterType {
    fn from(filter: FilterType) -> Self {
        match filter {
            FilterType::Nearest => image::imageops::FilterType::Nearest,
            FilterType::Triangle => image::imageops::FilterType::Triangle,
            FilterType::CatmullRom => image::imageops::FilterType::CatmullRom,
            FilterType::Gaussian => image::imageops::FilterType::Gaussian,
            FilterType::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

/// Configuration builder for fluent API
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeConfig {
    /// Target width; height keeps the aspect ratio
    pub width: u32,
    /// Output format (None = pipeline default)
    pub format: Option<ImageFormat>,
    pub filter: FilterType,
}

impl ResizeConfig {
    /// Create a new resize configuration
    pub fn new() -> Self {
        Self {
            width: 200,
            format: None,
            filter: FilterType::Lanczos3,
        }
    }

    /// Set target width
    pub fn width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    /// Set output format
    pub fn format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set resampling filter
    pub fn filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.width > MAX_DIMENSION {
            return Err(ProbeError::invalid_parameters(format!(
                "Width must be between 1-{}, got {}",
                MAX_DIMENSION, self.width
            )));
        }
        Ok(())
    }
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = ResizeConfig::new()
            .width(640)
            .format(ImageFormat::Png)
            .filter(FilterType::Triangle);

        assert_eq!(config.width, 640);
        assert_eq!(config.format, Some(ImageFormat::Png));
        assert_eq!(config.filter, FilterType::Triangle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_width_bounds() {
        assert!(ResizeConfig::new().width(0).validate().is_err());
        assert!(ResizeConfig::new().width(MAX_DIMENSION + 1).validate().is_err());
        assert!(ResizeConfig::new().width(MAX_DIMENSION).validate().is_ok());
    }

    #[test]
    fn test_filter_serde_names() {
        let parsed: FilterType = serde_json::from_str("\"catmullrom\"").unwrap();
        assert_eq!(parsed, FilterType::CatmullRom);
    }
}
