use image::RgbImage;
use crate::{
    config::PhenotypeConfig,
    error::Result,
    types::{Boundary, Mask},
};

/// Trait for leaf/background segmentation algorithms
pub trait Segmenter: Send + Sync {
    /// Classify every pixel, keeping only the principal leaf region
    fn segment(&self, image: &RgbImage, config: &PhenotypeConfig) -> Result<Mask>;
}

/// Trait for boundary extraction algorithms
pub trait ContourExtractor: Send + Sync {
    /// Trace the outer boundary of the mask and measure it
    fn extract_boundary(&self, mask: &Mask) -> Result<Boundary>;
}
