use std::f64::consts::PI;

use geo::{Area, ConvexHull};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    algorithms::moments::SpatialMoments,
    anomaly::{AnomalyFlag, AnomalyKind, Measured},
    error::{PhenotypeError, Result},
    types::{Boundary, Mask, PixelArea, PolygonArea},
};

/// Size and outline measurements of the leaf region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Morphometrics {
    /// Foreground pixel count
    pub area: PixelArea,
    pub perimeter: f64,
    pub compactness: f64,
    pub width: u32,
    pub height: u32,
    /// Height over width
    pub aspect_ratio: f64,
    #[serde(rename = "area_convexa")]
    pub convex_area: PolygonArea,
    #[serde(rename = "solidez")]
    pub solidity: f64,
    #[serde(rename = "centro_massa_x")]
    pub centroid_x: f64,
    #[serde(rename = "centro_massa_y")]
    pub centroid_y: f64,
}

/// 4πA / P², 1 for a perfect circle
pub fn compactness(area: PixelArea, perimeter: f64) -> f64 {
    4.0 * PI * area.as_f64() / (perimeter * perimeter)
}

/// Pixel area over hull polygon area; the two come from different domains
pub fn solidity(area: PixelArea, convex_area: PolygonArea) -> f64 {
    area.as_f64() / convex_area.as_f64()
}

/// Shoelace area of the convex hull of the boundary points
pub fn convex_hull_area(boundary: &Boundary) -> PolygonArea {
    let hull = boundary.contour.to_line_string().convex_hull();
    PolygonArea(hull.unsigned_area())
}

/// Flag values that exceed their algebraic bounds, keeping them raw
pub fn range_anomalies(solidity: f64, compactness: f64) -> Vec<AnomalyFlag> {
    let mut anomalies = Vec::new();
    if solidity > 1.0 {
        warn!(solidity, "Solidity exceeds 1");
        anomalies.push(AnomalyFlag::new(
            AnomalyKind::SolidityOutOfRange,
            format!("solidity {solidity:.4} > 1: pixel area exceeds convex hull polygon area"),
        ));
    }
    if compactness > 1.0 {
        warn!(compactness, "Compactness exceeds 1");
        anomalies.push(AnomalyFlag::new(
            AnomalyKind::CompactnessOutOfRange,
            format!("compactness {compactness:.4} > 1: pixel area against continuous perimeter"),
        ));
    }
    anomalies
}

pub fn analyze(mask: &Mask, boundary: &Boundary) -> Result<Measured<Morphometrics>> {
    let bounds = mask
        .bounds()
        .ok_or_else(|| PhenotypeError::DegenerateMask("mask has no foreground".to_string()))?;
    let [centroid_x, centroid_y] = SpatialMoments::from_mask(mask)
        .centroid()
        .ok_or_else(|| PhenotypeError::DegenerateMask("zero area, centroid undefined".to_string()))?;

    let (width, height) = (bounds.width(), bounds.height());
    let convex_area = convex_hull_area(boundary);
    if convex_area.as_f64() <= 0.0 {
        return Err(PhenotypeError::DegenerateMask(
            "convex hull encloses no area".to_string(),
        ));
    }

    let compactness = compactness(boundary.area, boundary.perimeter);
    let solidity = solidity(boundary.area, convex_area);

    let morphometrics = Morphometrics {
        area: boundary.area,
        perimeter: boundary.perimeter,
        compactness,
        width,
        height,
        aspect_ratio: height as f64 / width as f64,
        convex_area,
        solidity,
        centroid_x,
        centroid_y,
    };
    debug!(?morphometrics, "Morphometrics computed");

    Ok(Measured::with_anomalies(morphometrics, range_anomalies(solidity, compactness)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{algorithms::contour::ImageprocContourExtractor, traits::ContourExtractor};

    fn measure(mask: &Mask) -> Measured<Morphometrics> {
        let boundary = ImageprocContourExtractor
            .extract_boundary(mask)
            .expect("Should extract boundary");
        analyze(mask, &boundary).expect("Should analyze")
    }

    #[test]
    fn test_reference_fixture_values() {
        let compact = compactness(PixelArea(257), 60.7279);
        assert!((compact - 0.8757).abs() < 1e-4, "compactness {compact}");

        let solid = solidity(PixelArea(257), PolygonArea(237.5));
        assert!((solid - 1.0821).abs() < 1e-4, "solidity {solid}");

        let flags = range_anomalies(solid, compact);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].kind, AnomalyKind::SolidityOutOfRange);
    }

    #[test]
    fn test_rectangle_measurements() {
        let mask = Mask::from_fn(40, 30, |x, y| (5..25).contains(&x) && (5..20).contains(&y));
        let measured = measure(&mask);
        let m = measured.value;

        assert_eq!((m.width, m.height), (20, 15));
        assert_eq!(m.aspect_ratio, 15.0 / 20.0);
        assert_eq!(m.area, PixelArea(300));
        // Hull through pixel centres is 19 x 14
        assert!((m.convex_area.as_f64() - 266.0).abs() < 1e-9);
        assert!((m.solidity - 300.0 / 266.0).abs() < 1e-12);
        assert_eq!((m.centroid_x, m.centroid_y), (14.5, 12.0));

        // Pixel-count area always outgrows the centre-line hull for a rectangle
        assert!(measured
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::SolidityOutOfRange));
    }

    #[test]
    fn test_aspect_ratio_is_height_over_width() {
        let tall = Mask::from_fn(30, 50, |x, y| (5..15).contains(&x) && (5..45).contains(&y));
        let m = measure(&tall).value;
        assert_eq!(m.aspect_ratio, m.height as f64 / m.width as f64);
        assert!(m.aspect_ratio > 1.0);
    }

    #[test]
    fn test_concave_shape_solidity_below_one_not_flagged() {
        // L-shape with a large notch
        let mask = Mask::from_fn(60, 60, |x, y| {
            let vertical = (5..15).contains(&x) && (5..55).contains(&y);
            let horizontal = (5..55).contains(&x) && (45..55).contains(&y);
            vertical || horizontal
        });
        let measured = measure(&mask);

        assert!(measured.value.solidity < 1.0, "solidity {}", measured.value.solidity);
        assert!(!measured
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::SolidityOutOfRange));
    }

    #[test]
    fn test_measurements_are_non_negative() {
        let mask = Mask::from_fn(30, 30, |x, y| {
            let (dx, dy) = (x as f64 - 15.0, y as f64 - 15.0);
            dx * dx / 100.0 + dy * dy / 36.0 <= 1.0
        });
        let m = measure(&mask).value;

        assert!(m.perimeter >= 0.0);
        assert!(m.convex_area.as_f64() >= 0.0);
        assert!(m.compactness > 0.0);
        assert!(m.width > m.height);
    }
}
