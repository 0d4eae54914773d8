pub mod segmentation;
pub mod contour;
pub mod morphometry;
pub mod moments;
pub mod color;
pub mod texture;

pub use segmentation::{ColorSegmenter, SuppliedMask, retain_largest_region};
pub use contour::ImageprocContourExtractor;
pub use morphometry::Morphometrics;
pub use moments::ShapeDescriptors;
pub use color::ColorStats;
pub use texture::TextureStats;
