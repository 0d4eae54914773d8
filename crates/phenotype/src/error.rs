use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Pipeline stage that produced a value or an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Segmentation,
    Contour,
    Morphometry,
    Shape,
    Color,
    Texture,
    Assembly,
}

#[derive(Error, Debug)]
pub enum PhenotypeError {
    #[error("Segmentation failed: {0}")]
    Segmentation(String),

    #[error("Degenerate mask: {0}")]
    DegenerateMask(String),

    #[error("Incomplete feature set: {stage} stage failed: {source}")]
    IncompleteFeatureSet {
        stage: Stage,
        #[source]
        source: Box<PhenotypeError>,
    },

    #[error("Invalid measurement for {field}: {value}")]
    InvalidMeasurement { field: &'static str, value: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

impl PhenotypeError {
    /// Wrap an upstream failure as an incomplete assembly
    pub fn incomplete(stage: Stage, source: PhenotypeError) -> Self {
        Self::IncompleteFeatureSet {
            stage,
            source: Box::new(source),
        }
    }

    /// The originating error, skipping any `IncompleteFeatureSet` wrappers
    pub fn root_cause(&self) -> &PhenotypeError {
        match self {
            Self::IncompleteFeatureSet { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether this failure is definitive for the image (no retry makes sense)
    pub fn is_image_fatal(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::Segmentation(_) | Self::DegenerateMask(_) | Self::InvalidMeasurement { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PhenotypeError>;
