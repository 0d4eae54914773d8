pub mod builder;

use image::RgbImage;
use tracing::{debug, info_span};

use crate::{
    algorithms::{color, moments, morphometry, texture},
    assembler::{FeatureAssembler, StageOutputs},
    config::PhenotypeConfig,
    error::{PhenotypeError, Result},
    features::FeatureSet,
    traits::{ContourExtractor, Segmenter},
};

/// Single-leaf feature extraction, from RGB image to [`FeatureSet`]
///
/// Stages run in a fixed order: segmentation, boundary extraction, then the
/// four measuring stages, whose results the assembler merges. A pipeline owns
/// no mutable state, so one instance can serve any number of threads.
pub struct Pipeline {
    segmenter: Box<dyn Segmenter>,
    contour_extractor: Box<dyn ContourExtractor>,
    config: PhenotypeConfig,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::PipelineBuilder {
        builder::PipelineBuilder::new()
    }

    pub(crate) fn new(
        segmenter: Box<dyn Segmenter>,
        contour_extractor: Box<dyn ContourExtractor>,
        config: PhenotypeConfig,
    ) -> Self {
        Self {
            segmenter,
            contour_extractor,
            config,
        }
    }

    pub fn config(&self) -> &PhenotypeConfig {
        &self.config
    }

    /// Process an image through the entire pipeline
    pub fn process(&self, image: &RgbImage) -> Result<FeatureSet> {
        self.process_named("image", image)
    }

    /// Same as [`Pipeline::process`], tagging the log span with `image_id`
    ///
    /// Segmentation and boundary failures are returned as they are. Failures
    /// of the measuring stages come back wrapped in `IncompleteFeatureSet`.
    pub fn process_named(&self, image_id: &str, image: &RgbImage) -> Result<FeatureSet> {
        let span = info_span!("pipeline", image = image_id);
        let _enter = span.enter();

        let mask = self.segmenter.segment(image, &self.config)?;
        if mask.is_empty() {
            return Err(PhenotypeError::Segmentation(
                "segmenter returned no foreground".to_string(),
            ));
        }
        debug!(area = %mask.area(), "Leaf segmented");

        let boundary = self.contour_extractor.extract_boundary(&mask)?;
        debug!(points = boundary.contour.len(), perimeter = boundary.perimeter, "Boundary traced");

        let outputs = StageOutputs {
            morphometrics: morphometry::analyze(&mask, &boundary),
            shape: moments::shape_descriptors(&mask),
            color: color::analyze(image, &mask, self.config.vari_epsilon),
            texture: texture::analyze(image, &mask, self.config.texture_scope),
        };

        FeatureAssembler::new(self.config.enable_anomaly_flags).assemble(outputs)
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        format!(
            "Pipeline: {} segmentation, threshold {}, min region {} px, anomaly flags {}",
            self.config.segmentation,
            self.config.segmentation_threshold,
            self.config.min_region_size_pixels,
            if self.config.enable_anomaly_flags { "on" } else { "off" },
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{anomaly::AnomalyKind, types::Mask};
    use image::{GrayImage, Luma, Rgb};

    const BACKGROUND: Rgb<u8> = Rgb([205, 195, 175]);

    /// Elliptical leaf with a faint vein pattern on a beige background
    pub(crate) fn leaf_image() -> RgbImage {
        RgbImage::from_fn(120, 80, |x, y| {
            let dx = (x as f64 - 60.0) / 40.0;
            let dy = (y as f64 - 40.0) / 25.0;
            if dx * dx + dy * dy <= 1.0 {
                let vein = if (x + y) % 7 == 0 { 25 } else { 0 };
                Rgb([60 + vein, 150 + vein / 2, 50])
            } else {
                BACKGROUND
            }
        })
    }

    fn rectangle_image() -> RgbImage {
        RgbImage::from_fn(60, 50, |x, y| {
            if (10..40).contains(&x) && (10..30).contains(&y) {
                Rgb([50, 160, 40])
            } else {
                BACKGROUND
            }
        })
    }

    fn sharp_config() -> PhenotypeConfig {
        PhenotypeConfig {
            blur_sigma: None,
            morphology_radius: 0,
            ..PhenotypeConfig::default()
        }
    }

    #[test]
    fn test_leaf_features_are_plausible() {
        let pipeline = Pipeline::builder().build().expect("Should build");
        let features = pipeline.process(&leaf_image()).expect("Should process");
        let m = features.morphometrics();

        let expected_area = std::f64::consts::PI * 40.0 * 25.0;
        assert!((m.area.as_f64() - expected_area).abs() / expected_area < 0.1, "area {}", m.area);
        assert!((m.aspect_ratio - 25.0 / 40.0).abs() < 0.05, "aspect {}", m.aspect_ratio);
        assert!((m.centroid_x - 60.0).abs() < 0.5);
        assert!((m.centroid_y - 40.0).abs() < 0.5);
        assert!(m.compactness > 0.7);

        assert!(features.color().mean_g > features.color().mean_r);
        assert!(features.color().excess_green_index > 0.0);
        assert!(!features.has_anomaly(AnomalyKind::VariUndefined));
        assert!(features.texture().laplacian_variance > 0.0);
    }

    #[test]
    fn test_processing_is_deterministic() {
        let pipeline = Pipeline::builder().build().expect("Should build");
        let image = leaf_image();

        let first = pipeline.process(&image).expect("Should process");
        let second = pipeline.process_named("again", &image).expect("Should process");
        assert_eq!(first, second);
    }

    #[test]
    fn test_blank_image_fails_segmentation() {
        let pipeline = Pipeline::builder().build().expect("Should build");
        let blank = RgbImage::from_pixel(40, 40, BACKGROUND);

        let err = pipeline.process(&blank).expect_err("Should fail");
        assert!(matches!(err, PhenotypeError::Segmentation(_)), "{err:?}");
    }

    #[test]
    fn test_rectangle_reports_solidity_anomaly_with_raw_value() {
        let pipeline = Pipeline::builder()
            .with_config(sharp_config())
            .build()
            .expect("Should build");
        let features = pipeline.process(&rectangle_image()).expect("Should process");

        assert_eq!(features.morphometrics().area.0, 600);
        assert_eq!((features.morphometrics().width, features.morphometrics().height), (30, 20));
        assert!(features.morphometrics().solidity > 1.0);
        assert!(features.has_anomaly(AnomalyKind::SolidityOutOfRange));
    }

    #[test]
    fn test_disabled_flags_leave_values_untouched() {
        let enabled = Pipeline::builder()
            .with_config(sharp_config())
            .build()
            .expect("Should build");
        let disabled = Pipeline::builder()
            .with_config(PhenotypeConfig { enable_anomaly_flags: false, ..sharp_config() })
            .build()
            .expect("Should build");

        let with_flags = enabled.process(&rectangle_image()).expect("Should process");
        let without = disabled.process(&rectangle_image()).expect("Should process");

        assert!(without.anomalies().is_empty());
        assert_eq!(with_flags.to_mapping(), without.to_mapping());
    }

    #[test]
    fn test_supplied_mask_bypasses_color_rules() {
        // Whole frame is background-coloured, the mask alone marks the leaf
        let image = RgbImage::from_pixel(30, 30, BACKGROUND);
        let mask = GrayImage::from_fn(30, 30, |x, y| {
            if (5..25).contains(&x) && (8..20).contains(&y) { Luma([255]) } else { Luma([0]) }
        });

        let pipeline = Pipeline::builder()
            .with_supplied_mask(mask)
            .build()
            .expect("Should build");
        let features = pipeline.process(&image).expect("Should process");

        assert_eq!(features.morphometrics().area.0, 240);
        assert_eq!(features.color().mean_r, 205.0);
    }

    #[test]
    fn test_single_pixel_leaf_is_degenerate() {
        let image = RgbImage::from_pixel(10, 10, BACKGROUND);
        let mask = GrayImage::from_fn(10, 10, |x, y| if (x, y) == (4, 4) { Luma([255]) } else { Luma([0]) });

        let pipeline = Pipeline::builder()
            .with_config(PhenotypeConfig { min_region_size_pixels: 1, ..PhenotypeConfig::default() })
            .with_supplied_mask(mask)
            .build()
            .expect("Should build");

        let err = pipeline.process(&image).expect_err("Should fail");
        assert!(matches!(err, PhenotypeError::DegenerateMask(_)), "{err:?}");
    }

    struct NothingIsLeaf;

    impl Segmenter for NothingIsLeaf {
        fn segment(&self, image: &RgbImage, _config: &PhenotypeConfig) -> Result<Mask> {
            Ok(Mask::from_fn(image.width(), image.height(), |_, _| false))
        }
    }

    #[test]
    fn test_empty_mask_from_custom_segmenter_fails_segmentation() {
        let pipeline = Pipeline::builder()
            .set_segmenter(NothingIsLeaf)
            .build()
            .expect("Should build");

        let err = pipeline.process(&leaf_image()).expect_err("Should fail");
        assert!(matches!(err, PhenotypeError::Segmentation(_)), "{err:?}");
    }

    #[test]
    fn test_info_mentions_strategy() {
        let pipeline = Pipeline::builder().build().expect("Should build");
        assert!(pipeline.info().contains("excess_green"));
    }
}
