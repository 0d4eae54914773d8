use image::RgbImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    anomaly::{AnomalyFlag, AnomalyKind, Measured},
    error::{PhenotypeError, Result},
    types::Mask,
};

/// Value reported for VARI when its denominator vanishes, signed by the numerator
pub const VARI_SENTINEL: f64 = 1.0;

/// Channel statistics and vegetation indices over the leaf pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColorStats {
    pub mean_r: f64,
    pub std_r: f64,
    pub mean_g: f64,
    pub std_g: f64,
    pub mean_b: f64,
    pub std_b: f64,
    pub excess_green_index: f64,
    pub vari_index: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    sum: f64,
    sum_sq: f64,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.sum_sq += value * value;
    }

    /// Population mean and standard deviation
    fn finish(&self, n: f64) -> (f64, f64) {
        let mean = self.sum / n;
        let variance = (self.sum_sq / n - mean * mean).max(0.0);
        (mean, variance.sqrt())
    }
}

/// (G - R) / (G + R - B) over channel means, with a defined sentinel near zero
pub fn vari_index(mean_r: f64, mean_g: f64, mean_b: f64, epsilon: f64) -> Measured<f64> {
    let numerator = mean_g - mean_r;
    let denominator = mean_g + mean_r - mean_b;

    if denominator.abs() < epsilon {
        let sentinel = if numerator == 0.0 { 0.0 } else { VARI_SENTINEL.copysign(numerator) };
        warn!(denominator, sentinel, "VARI denominator below epsilon");
        return Measured::with_anomalies(
            sentinel,
            vec![AnomalyFlag::new(
                AnomalyKind::VariUndefined,
                format!("VARI denominator {denominator:.3e} below epsilon {epsilon:.1e}; reported {sentinel}"),
            )],
        );
    }
    Measured::clean(numerator / denominator)
}

pub fn analyze(image: &RgbImage, mask: &Mask, vari_epsilon: f64) -> Result<Measured<ColorStats>> {
    if image.dimensions() != mask.dimensions() {
        return Err(PhenotypeError::DegenerateMask(format!(
            "mask is {:?} but image is {:?}",
            mask.dimensions(),
            image.dimensions()
        )));
    }

    let mut channels = [Accumulator::default(); 3];
    let mut exg_sum = 0.0;
    let mut count = 0u64;

    for (x, y) in mask.foreground() {
        let [r, g, b] = image.get_pixel(x, y).0.map(f64::from);
        channels[0].push(r);
        channels[1].push(g);
        channels[2].push(b);
        exg_sum += 2.0 * g - r - b;
        count += 1;
    }

    if count == 0 {
        return Err(PhenotypeError::DegenerateMask(
            "no masked pixels to measure color over".to_string(),
        ));
    }

    let n = count as f64;
    let (mean_r, std_r) = channels[0].finish(n);
    let (mean_g, std_g) = channels[1].finish(n);
    let (mean_b, std_b) = channels[2].finish(n);
    let vari = vari_index(mean_r, mean_g, mean_b, vari_epsilon);

    let stats = ColorStats {
        mean_r,
        std_r,
        mean_g,
        std_g,
        mean_b,
        std_b,
        excess_green_index: exg_sum / n,
        vari_index: vari.value,
    };
    debug!(?stats, "Color statistics computed");

    Ok(Measured::with_anomalies(stats, vari.anomalies))
}
