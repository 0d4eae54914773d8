//! Image moments of a binary mask and the seven Hu invariants derived from them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{PhenotypeError, Result},
    types::Mask,
};

/// Raw spatial moments up to first order, enough to locate the centroid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialMoments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl SpatialMoments {
    pub fn from_mask(mask: &Mask) -> Self {
        let mut moments = Self { m00: 0.0, m10: 0.0, m01: 0.0 };
        for (x, y) in mask.foreground() {
            moments.m00 += 1.0;
            moments.m10 += x as f64;
            moments.m01 += y as f64;
        }
        moments
    }

    /// Mean (x, y) of the foreground, `None` for an empty mask
    pub fn centroid(&self) -> Option<[f64; 2]> {
        if self.m00 == 0.0 {
            return None;
        }
        Some([self.m10 / self.m00, self.m01 / self.m00])
    }
}

/// Central moments up to third order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentralMoments {
    pub m00: f64,
    pub mu20: f64,
    pub mu11: f64,
    pub mu02: f64,
    pub mu30: f64,
    pub mu21: f64,
    pub mu12: f64,
    pub mu03: f64,
}

impl CentralMoments {
    pub fn from_mask(mask: &Mask) -> Result<Self> {
        let spatial = SpatialMoments::from_mask(mask);
        let [cx, cy] = spatial.centroid().ok_or_else(|| {
            PhenotypeError::DegenerateMask("zero area, moments are undefined".to_string())
        })?;

        let mut c = Self {
            m00: spatial.m00,
            mu20: 0.0,
            mu11: 0.0,
            mu02: 0.0,
            mu30: 0.0,
            mu21: 0.0,
            mu12: 0.0,
            mu03: 0.0,
        };
        for (x, y) in mask.foreground() {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            c.mu20 += dx * dx;
            c.mu11 += dx * dy;
            c.mu02 += dy * dy;
            c.mu30 += dx * dx * dx;
            c.mu21 += dx * dx * dy;
            c.mu12 += dx * dy * dy;
            c.mu03 += dy * dy * dy;
        }
        Ok(c)
    }

    /// Scale-normalized moment: mu_pq / m00^(1 + (p + q) / 2)
    fn eta(&self, mu: f64, order: i32) -> f64 {
        mu / self.m00.powf(1.0 + order as f64 / 2.0)
    }
}

/// The seven Hu invariants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShapeDescriptors {
    pub hu_moment_1: f64,
    pub hu_moment_2: f64,
    pub hu_moment_3: f64,
    pub hu_moment_4: f64,
    pub hu_moment_5: f64,
    pub hu_moment_6: f64,
    pub hu_moment_7: f64,
}

impl ShapeDescriptors {
    pub fn from_central(c: &CentralMoments) -> Self {
        let n20 = c.eta(c.mu20, 2);
        let n11 = c.eta(c.mu11, 2);
        let n02 = c.eta(c.mu02, 2);
        let n30 = c.eta(c.mu30, 3);
        let n21 = c.eta(c.mu21, 3);
        let n12 = c.eta(c.mu12, 3);
        let n03 = c.eta(c.mu03, 3);

        let a = n30 + n12;
        let b = n21 + n03;
        let p = n30 - 3.0 * n12;
        let q = 3.0 * n21 - n03;

        Self {
            hu_moment_1: n20 + n02,
            hu_moment_2: (n20 - n02).powi(2) + 4.0 * n11 * n11,
            hu_moment_3: p * p + q * q,
            hu_moment_4: a * a + b * b,
            hu_moment_5: p * a * (a * a - 3.0 * b * b) + q * b * (3.0 * a * a - b * b),
            hu_moment_6: (n20 - n02) * (a * a - b * b) + 4.0 * n11 * a * b,
            hu_moment_7: q * a * (a * a - 3.0 * b * b) - p * b * (3.0 * a * a - b * b),
        }
    }

    pub fn as_array(&self) -> [f64; 7] {
        [
            self.hu_moment_1,
            self.hu_moment_2,
            self.hu_moment_3,
            self.hu_moment_4,
            self.hu_moment_5,
            self.hu_moment_6,
            self.hu_moment_7,
        ]
    }
}

/// Hu invariants of the mask; an empty mask is degenerate
pub fn shape_descriptors(mask: &Mask) -> Result<ShapeDescriptors> {
    let central = CentralMoments::from_mask(mask)?;
    let descriptors = ShapeDescriptors::from_central(&central);
    debug!(hu = ?descriptors.as_array(), "Shape descriptors computed");
    Ok(descriptors)
}
