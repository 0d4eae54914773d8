use std::fmt;

use geo_types::{Coord, LineString};
use image::{GrayImage, Luma};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Area measured by counting mask pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PixelArea(pub u64);

/// Area of a continuous polygon (shoelace formula)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PolygonArea(pub f64);

impl PixelArea {
    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }
}

impl PolygonArea {
    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl fmt::Display for PixelArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} px", self.0)
    }
}

impl fmt::Display for PolygonArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} px²", self.0)
    }
}

/// Inclusive axis-aligned bounds of the foreground pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl PixelBounds {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// Binary leaf/background classification aligned to the image grid
#[derive(Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
}

impl Mask {
    /// Build a mask by evaluating `f(x, y)` for every pixel
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> bool,
    {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self { width, height, pixels }
    }

    /// Non-zero pixels of a grayscale image are foreground
    pub fn from_gray(image: &GrayImage) -> Self {
        Self::from_fn(image.width(), image.height(), |x, y| image.get_pixel(x, y)[0] > 0)
    }

    /// 255 for foreground, 0 for background
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { 255u8 } else { 0u8 }])
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether (x, y) is foreground; out-of-range coordinates are background
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.pixels[(y as usize) * (self.width as usize) + x as usize]
    }

    /// Coordinates of every foreground pixel in row-major order
    pub fn foreground(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width as usize;
        self.pixels
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(move |(i, _)| ((i % width) as u32, (i / width) as u32))
    }

    pub fn area(&self) -> PixelArea {
        PixelArea(self.pixels.iter().filter(|on| **on).count() as u64)
    }

    pub fn is_empty(&self) -> bool {
        !self.pixels.iter().any(|on| *on)
    }

    pub fn bounds(&self) -> Option<PixelBounds> {
        self.foreground().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => PixelBounds { min_x: x, min_y: y, max_x: x, max_y: y },
                Some(b) => PixelBounds {
                    min_x: b.min_x.min(x),
                    min_y: b.min_y.min(y),
                    max_x: b.max_x.max(x),
                    max_y: b.max_y.max(y),
                },
            })
        })
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mask")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("area", &self.area().0)
            .finish()
    }
}

/// Ordered outer boundary of the leaf region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    pub points: Vec<[f64; 2]>,
}

impl Contour {
    pub fn new(points: Vec<[f64; 2]>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Convert to geo-types LineString for geometric operations
    pub fn to_line_string(&self) -> LineString<f64> {
        LineString::new(self.points.iter().map(|&[x, y]| Coord { x, y }).collect())
    }

    /// Length of the closed path, last point joined back to the first
    pub fn closed_length(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        let mut total = 0.0;
        for window in self.points.windows(2) {
            total += segment_length(window[0], window[1]);
        }
        if let (Some(first), Some(last)) = (self.points.first(), self.points.last()) {
            total += segment_length(*last, *first);
        }
        total
    }
}

fn segment_length(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    (dx * dx + dy * dy).sqrt()
}

/// Output of the contour stage
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub contour: Contour,
    /// Count of foreground pixels, not the polygon area
    pub area: PixelArea,
    pub perimeter: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_area_and_bounds() {
        let mask = Mask::from_fn(10, 8, |x, y| (2..6).contains(&x) && (3..5).contains(&y));

        assert_eq!(mask.area(), PixelArea(8));
        let bounds = mask.bounds().expect("Should have bounds");
        assert_eq!((bounds.width(), bounds.height()), (4, 2));
        assert_eq!(mask.foreground().next(), Some((2, 3)));
    }

    #[test]
    fn test_empty_mask_has_no_bounds() {
        let mask = Mask::from_fn(4, 4, |_, _| false);
        assert!(mask.is_empty());
        assert!(mask.bounds().is_none());
        assert!(!mask.get(10, 10));
    }

    #[test]
    fn test_gray_conversion_round_trip() {
        let mask = Mask::from_fn(5, 5, |x, y| x == y);
        assert_eq!(Mask::from_gray(&mask.to_gray()), mask);
    }

    #[test]
    fn test_closed_length_includes_diagonals_and_closing_edge() {
        let contour = Contour::new(vec![[0.0, 0.0], [1.0, 1.0], [2.0, 0.0], [1.0, 0.0]]);
        let expected = 2.0 * std::f64::consts::SQRT_2 + 1.0 + 1.0;
        assert!((contour.closed_length() - expected).abs() < 1e-12);
    }
}
