use image::GrayImage;

use crate::{
    algorithms::{ColorSegmenter, ImageprocContourExtractor, SuppliedMask},
    config::{PhenotypeConfig, SegmentationStrategy},
    error::Result,
    pipeline::Pipeline,
    traits::{ContourExtractor, Segmenter},
};

/// Builder for creating processing pipelines with a fluent API
pub struct PipelineBuilder {
    segmenter: Option<Box<dyn Segmenter>>,
    contour_extractor: Option<Box<dyn ContourExtractor>>,
    config: PhenotypeConfig,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            segmenter: None,
            contour_extractor: None,
            config: PhenotypeConfig::default(),
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: PhenotypeConfig) -> Self {
        self.config = config;
        self
    }

    /// Switch the color rule used by the default segmenter
    pub fn with_strategy(mut self, strategy: SegmentationStrategy) -> Self {
        self.config.segmentation = strategy;
        self
    }

    /// Set the segmenter (replaces any existing one)
    pub fn set_segmenter<S>(mut self, segmenter: S) -> Self
    where
        S: Segmenter + 'static,
    {
        self.segmenter = Some(Box::new(segmenter));
        self
    }

    /// Set the contour extractor (replaces any existing one)
    pub fn set_contour_extractor<E>(mut self, extractor: E) -> Self
    where
        E: ContourExtractor + 'static,
    {
        self.contour_extractor = Some(Box::new(extractor));
        self
    }

    /// Use an externally produced mask instead of color segmentation
    pub fn with_supplied_mask(self, mask: GrayImage) -> Self {
        self.set_segmenter(SuppliedMask::new(mask))
    }

    /// Build the pipeline with default components if not specified
    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;

        let segmenter = self.segmenter.unwrap_or_else(|| Box::new(ColorSegmenter));
        let contour_extractor = self
            .contour_extractor
            .unwrap_or_else(|| Box::new(ImageprocContourExtractor));

        Ok(Pipeline::new(segmenter, contour_extractor, self.config))
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
