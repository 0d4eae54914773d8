use std::fs;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::error::{PhenotypeError, Result};

/// How leaf pixels are told apart from background
#[derive(
    Debug, Clone,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq
)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SegmentationStrategy {
    /// Foreground when 2G - R - B exceeds `segmentation_threshold`
    ExcessGreen,
    /// Foreground when the pixel falls inside an HSV band
    HsvRange {
        /// Lower hue bound in degrees (0-360)
        hue_min: f32,
        /// Upper hue bound in degrees (0-360)
        hue_max: f32,
        /// Minimum saturation (0-255)
        saturation_min: u8,
        /// Minimum value (0-255)
        value_min: u8,
    },
}

impl Default for SegmentationStrategy {
    fn default() -> Self {
        Self::ExcessGreen
    }
}

/// Pixels over which texture statistics are gathered
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TextureScope {
    /// Only leaf pixels
    #[default]
    Masked,
    /// The whole frame
    Full,
}

/// Read-only settings shared by every pipeline run
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct PhenotypeConfig {
    /// Excess-green cut-off used by the `excess_green` strategy
    pub segmentation_threshold: f32,
    /// Smallest acceptable leaf region, in pixels
    pub min_region_size_pixels: u32,
    /// Denominator magnitude below which VARI is undefined
    pub vari_epsilon: f64,
    pub enable_anomaly_flags: bool,
    /// Gaussian pre-blur sigma; `None` disables blurring
    pub blur_sigma: Option<f32>,
    /// Radius of the open/close noise filter; 0 disables it
    pub morphology_radius: u8,
    pub texture_scope: TextureScope,
    pub segmentation: SegmentationStrategy,
}

impl Default for PhenotypeConfig {
    fn default() -> Self {
        Self {
            segmentation_threshold: 20.0,
            min_region_size_pixels: 50,
            vari_epsilon: 1e-6,
            enable_anomaly_flags: true,
            blur_sigma: Some(1.1), // matches a 5x5 kernel
            morphology_radius: 2,
            texture_scope: TextureScope::default(),
            segmentation: SegmentationStrategy::default(),
        }
    }
}

impl PhenotypeConfig {
    /// Check numeric settings before they reach a pipeline
    pub fn validate(&self) -> Result<()> {
        if !(self.vari_epsilon.is_finite() && self.vari_epsilon > 0.0) {
            return Err(PhenotypeError::InvalidConfig(format!(
                "vari_epsilon must be a positive number, got {}",
                self.vari_epsilon
            )));
        }
        if !self.segmentation_threshold.is_finite() {
            return Err(PhenotypeError::InvalidConfig(
                "segmentation_threshold must be finite".to_string(),
            ));
        }
        if let Some(sigma) = self.blur_sigma {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(PhenotypeError::InvalidConfig(format!(
                    "blur_sigma must be positive, got {sigma}"
                )));
            }
        }
        if let SegmentationStrategy::HsvRange { hue_min, hue_max, .. } = self.segmentation {
            let in_range = |h: f32| (0.0..=360.0).contains(&h);
            if !in_range(hue_min) || !in_range(hue_max) || hue_min > hue_max {
                return Err(PhenotypeError::InvalidConfig(format!(
                    "hue band {hue_min}..{hue_max} must lie within 0..=360 and be ordered"
                )));
            }
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PhenotypeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        let config: PhenotypeConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&fs::read_to_string(path_ref)?),
            Some("json") => Self::from_json(&fs::read_to_string(path_ref)?),
            _ => Err(PhenotypeError::UnsupportedFileFormat),
        }
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Convert configuration to JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
