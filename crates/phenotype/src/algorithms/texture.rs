use image::{GrayImage, RgbImage};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::TextureScope,
    error::{PhenotypeError, Result},
    types::Mask,
};

/// Gradient statistics and focus measure of the grayscale image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextureStats {
    pub gradient_mean: f64,
    pub gradient_std: f64,
    /// Higher means sharper
    pub laplacian_variance: f64,
}

/// Mean and population variance of the selected values
fn mean_variance(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut n = 0u64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for v in values {
        n += 1;
        sum += v;
        sum_sq += v * v;
    }
    if n == 0 {
        return None;
    }
    let mean = sum / n as f64;
    Some((mean, (sum_sq / n as f64 - mean * mean).max(0.0)))
}

/// Sobel magnitude per pixel, row-major
fn gradient_magnitude(gray: &GrayImage) -> Vec<f64> {
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    gx.pixels()
        .zip(gy.pixels())
        .map(|(h, v)| {
            let (h, v) = (h[0] as f64, v[0] as f64);
            (h * h + v * v).sqrt()
        })
        .collect()
}

/// 4-neighbour Laplacian, kernel [0,1,0; 1,-4,1; 0,1,0], edges clamped
fn laplacian(gray: &GrayImage) -> Vec<f64> {
    let (w, h) = (gray.width() as i64, gray.height() as i64);
    let at = |x: i64, y: i64| -> f64 {
        let cx = x.clamp(0, w - 1) as u32;
        let cy = y.clamp(0, h - 1) as u32;
        gray.get_pixel(cx, cy)[0] as f64
    };

    let mut out = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            out.push(at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4.0 * at(x, y));
        }
    }
    out
}

pub fn analyze(image: &RgbImage, mask: &Mask, scope: TextureScope) -> Result<TextureStats> {
    if image.dimensions() != mask.dimensions() {
        return Err(PhenotypeError::DegenerateMask(format!(
            "mask is {:?} but image is {:?}",
            mask.dimensions(),
            image.dimensions()
        )));
    }

    let gray = image::imageops::grayscale(image);
    let width = gray.width() as usize;
    let selected = |i: usize| match scope {
        TextureScope::Full => true,
        TextureScope::Masked => mask.get((i % width) as u32, (i / width) as u32),
    };

    let gradients = gradient_magnitude(&gray);
    let (gradient_mean, gradient_variance) = mean_variance(
        gradients.iter().enumerate().filter(|(i, _)| selected(*i)).map(|(_, v)| *v),
    )
    .ok_or_else(|| PhenotypeError::DegenerateMask("no pixels selected for texture".to_string()))?;

    let response = laplacian(&gray);
    let (_, laplacian_variance) = mean_variance(
        response.iter().enumerate().filter(|(i, _)| selected(*i)).map(|(_, v)| *v),
    )
    .ok_or_else(|| PhenotypeError::DegenerateMask("no pixels selected for texture".to_string()))?;

    let stats = TextureStats {
        gradient_mean,
        gradient_std: gradient_variance.sqrt(),
        laplacian_variance,
    };
    debug!(?stats, %scope, "Texture statistics computed");
    Ok(stats)
}
