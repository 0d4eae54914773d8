use std::collections::HashMap;

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::{
    contrast::threshold,
    distance_transform::Norm,
    region_labelling::{connected_components, Connectivity},
};
use tracing::debug;

use crate::{
    config::{PhenotypeConfig, SegmentationStrategy},
    error::{PhenotypeError, Result},
    traits::Segmenter,
    types::Mask,
};

/// Color-rule segmenter driven by `PhenotypeConfig::segmentation`
#[derive(Debug, Clone, Default)]
pub struct ColorSegmenter;

impl Segmenter for ColorSegmenter {
    fn segment(&self, image: &RgbImage, config: &PhenotypeConfig) -> Result<Mask> {
        let classified = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            let on = is_leaf_pixel(image.get_pixel(x, y), &config.segmentation, config.segmentation_threshold);
            Luma([if on { 255u8 } else { 0u8 }])
        });

        let smoothed = match config.blur_sigma {
            Some(sigma) => smooth_binary(&classified, sigma),
            None => classified,
        };

        let cleaned = suppress_noise(&smoothed, config.morphology_radius);
        retain_largest_region(&cleaned, config.min_region_size_pixels)
    }
}

/// Mask decoded from an external source; non-zero pixels are leaf
#[derive(Debug, Clone)]
pub struct SuppliedMask {
    pub mask: GrayImage,
}

impl SuppliedMask {
    pub fn new(mask: GrayImage) -> Self {
        Self { mask }
    }
}

impl Segmenter for SuppliedMask {
    fn segment(&self, image: &RgbImage, config: &PhenotypeConfig) -> Result<Mask> {
        if self.mask.dimensions() != image.dimensions() {
            return Err(PhenotypeError::Segmentation(format!(
                "supplied mask is {:?} but image is {:?}",
                self.mask.dimensions(),
                image.dimensions()
            )));
        }
        retain_largest_region(&self.mask, config.min_region_size_pixels)
    }
}

fn is_leaf_pixel(pixel: &Rgb<u8>, strategy: &SegmentationStrategy, threshold: f32) -> bool {
    let [r, g, b] = pixel.0;
    match *strategy {
        SegmentationStrategy::ExcessGreen => {
            let exg = 2.0 * g as f32 - r as f32 - b as f32;
            exg > threshold
        }
        SegmentationStrategy::HsvRange { hue_min, hue_max, saturation_min, value_min } => {
            let (h, s, v) = rgb_to_hsv(r, g, b);
            h >= hue_min && h <= hue_max && s >= saturation_min && v >= value_min
        }
    }
}

/// Hue in degrees, saturation and value scaled to 0-255
pub(crate) fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, u8, u8) {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * ((gf - bf) / delta).rem_euclid(6.0)
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max * 255.0 };

    (hue, saturation.round() as u8, max as u8)
}

/// Gaussian-weighted majority vote over the binary classification
///
/// Isolated pixels and ragged edges are removed while straight boundaries stay put.
fn smooth_binary(binary: &GrayImage, sigma: f32) -> GrayImage {
    let blurred = imageproc::filter::gaussian_blur_f32(binary, sigma);
    threshold(&blurred, 127)
}

/// Morphological opening then closing
fn suppress_noise(binary: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return binary.clone();
    }
    let opened = imageproc::morphology::open(binary, Norm::LInf, radius);
    imageproc::morphology::close(&opened, Norm::LInf, radius)
}

/// Keep only the largest 8-connected foreground region
///
/// Any non-zero pixel is foreground, whatever its gray level.
pub fn retain_largest_region(binary: &GrayImage, min_region_size: u32) -> Result<Mask> {
    let binary = threshold(binary, 0);
    let labeled = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

    let mut sizes: HashMap<u32, u64> = HashMap::new();
    for pixel in labeled.pixels() {
        let label = pixel[0];
        if label != 0 {
            *sizes.entry(label).or_insert(0) += 1;
        }
    }

    // Ties go to the label seen first in raster order
    let Some((label, size)) = sizes
        .iter()
        .map(|(&label, &size)| (label, size))
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
    else {
        return Err(PhenotypeError::Segmentation(
            "no foreground pixel survived filtering".to_string(),
        ));
    };

    debug!(regions = sizes.len(), largest = size, "Connected regions labelled");

    if size < u64::from(min_region_size) {
        return Err(PhenotypeError::Segmentation(format!(
            "largest region has {size} pixels, below the minimum of {min_region_size}"
        )));
    }

    Ok(Mask::from_fn(binary.width(), binary.height(), |x, y| {
        labeled.get_pixel(x, y)[0] == label
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact_config() -> PhenotypeConfig {
        PhenotypeConfig {
            blur_sigma: None,
            morphology_radius: 0,
            min_region_size_pixels: 1,
            ..Default::default()
        }
    }

    fn leaf_on_soil() -> RgbImage {
        let mut img = RgbImage::from_pixel(60, 40, Rgb([120, 90, 60]));
        for y in 10..30 {
            for x in 10..40 {
                img.put_pixel(x, y, Rgb([60, 160, 50]));
            }
        }
        // Speck of green noise away from the leaf
        img.put_pixel(55, 5, Rgb([60, 160, 50]));
        img
    }

    #[test]
    fn test_excess_green_keeps_largest_region() {
        let mask = ColorSegmenter
            .segment(&leaf_on_soil(), &exact_config())
            .expect("Should segment leaf");

        assert_eq!(mask.area().0, 600);
        assert!(!mask.get(55, 5), "Noise speck should be discarded");
        assert!(mask.get(10, 10));
    }

    #[test]
    fn test_hsv_range_segmentation() {
        let config = PhenotypeConfig {
            segmentation: SegmentationStrategy::HsvRange {
                hue_min: 70.0,
                hue_max: 170.0,
                saturation_min: 60,
                value_min: 40,
            },
            ..exact_config()
        };
        let mask = ColorSegmenter
            .segment(&leaf_on_soil(), &config)
            .expect("Should segment leaf");
        assert_eq!(mask.area().0, 600);
    }

    #[test]
    fn test_no_foreground_is_segmentation_error() {
        let soil = RgbImage::from_pixel(20, 20, Rgb([120, 90, 60]));
        let result = ColorSegmenter.segment(&soil, &exact_config());
        assert!(matches!(result, Err(PhenotypeError::Segmentation(_))));
    }

    #[test]
    fn test_region_below_minimum_size_fails() {
        let config = PhenotypeConfig { min_region_size_pixels: 1000, ..exact_config() };
        let result = ColorSegmenter.segment(&leaf_on_soil(), &config);
        assert!(matches!(result, Err(PhenotypeError::Segmentation(_))));
    }

    #[test]
    fn test_default_preprocessing_still_finds_leaf() {
        let mask = ColorSegmenter
            .segment(&leaf_on_soil(), &PhenotypeConfig::default())
            .expect("Should segment leaf with blur and morphology");
        let area = mask.area().0;
        assert!((500..=900).contains(&area), "area {area}");
        assert!(!mask.get(55, 5));
    }

    #[test]
    fn test_supplied_mask_dimension_mismatch() {
        let supplied = SuppliedMask::new(GrayImage::new(10, 10));
        let result = supplied.segment(&RgbImage::new(20, 20), &exact_config());
        assert!(matches!(result, Err(PhenotypeError::Segmentation(_))));
    }

    #[test]
    fn test_supplied_mask_is_filtered_to_largest_region() {
        let mut gray = GrayImage::new(20, 20);
        for y in 2..8 {
            for x in 2..8 {
                gray.put_pixel(x, y, Luma([255]));
            }
        }
        gray.put_pixel(15, 15, Luma([1]));

        let mask = SuppliedMask::new(gray)
            .segment(&RgbImage::new(20, 20), &exact_config())
            .expect("Should accept supplied mask");
        assert_eq!(mask.area().0, 36);
    }

    #[test]
    fn test_supplied_mask_gray_levels_form_one_region() {
        // Antialiased or lossy masks carry several non-zero levels
        let gray = GrayImage::from_fn(30, 20, |x, y| match (x, y) {
            (5..15, 5..15) => Luma([255]),
            (15..25, 5..15) => Luma([128]),
            _ => Luma([0]),
        });

        let mask = SuppliedMask::new(gray)
            .segment(&RgbImage::new(30, 20), &exact_config())
            .expect("Should accept supplied mask");
        assert_eq!(mask.area().0, 200);
        let bounds = mask.bounds().expect("Should have bounds");
        assert_eq!((bounds.width(), bounds.height()), (20, 10));
    }

    #[test]
    fn test_smoothing_keeps_straight_edges_in_place() {
        let config = PhenotypeConfig { blur_sigma: Some(1.1), ..exact_config() };
        let mask = ColorSegmenter
            .segment(&leaf_on_soil(), &config)
            .expect("Should segment leaf");

        // Edge midpoints survive, neighbouring soil stays out
        assert!(mask.get(10, 20) && mask.get(39, 20) && mask.get(25, 10) && mask.get(25, 29));
        assert!(!mask.get(9, 20) && !mask.get(40, 20) && !mask.get(25, 9) && !mask.get(25, 30));
        assert!(!mask.get(55, 5), "Isolated speck should be voted out");
    }

    #[test]
    fn test_rgb_to_hsv_primaries() {
        assert_eq!(rgb_to_hsv(255, 0, 0), (0.0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 0), (120.0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 255), (240.0, 255, 255));
        assert_eq!(rgb_to_hsv(128, 128, 128).1, 0);
    }
}
