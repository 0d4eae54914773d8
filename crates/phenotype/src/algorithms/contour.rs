use geo::Area;
use geo_types::Polygon;
use imageproc::contours::BorderType;
use tracing::debug;

use crate::{
    error::{PhenotypeError, Result},
    traits::ContourExtractor,
    types::{Boundary, Contour, Mask},
};

/// Border-following contour extractor backed by imageproc
#[derive(Debug, Clone, Default)]
pub struct ImageprocContourExtractor;

impl ContourExtractor for ImageprocContourExtractor {
    fn extract_boundary(&self, mask: &Mask) -> Result<Boundary> {
        let binary = mask.to_gray();
        let contours = imageproc::contours::find_contours::<i32>(&binary);

        // The leaf is the outer border enclosing the most area; hole borders are ignored
        let principal = contours
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .map(|c| {
                let contour = Contour::new(
                    c.points.iter().map(|p| [p.x as f64, p.y as f64]).collect(),
                );
                let enclosed = Polygon::new(contour.to_line_string(), vec![]).unsigned_area();
                (contour, enclosed)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let Some((contour, _)) = principal else {
            return Err(PhenotypeError::DegenerateMask(
                "mask has no outer boundary".to_string(),
            ));
        };

        if contour.len() < 3 {
            return Err(PhenotypeError::DegenerateMask(format!(
                "boundary has {} point(s), at least 3 are required",
                contour.len()
            )));
        }

        let area = mask.area();
        let perimeter = contour.closed_length();
        debug!(points = contour.len(), area = area.0, perimeter, "Boundary extracted");

        Ok(Boundary { contour, area, perimeter })
    }
}
