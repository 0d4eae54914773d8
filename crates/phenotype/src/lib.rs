//! # Leaf Phenotyping Library
//!
//! Extracts a validated numeric feature set from a photograph of a single
//! leaf: size and outline measurements, Hu shape invariants, color statistics
//! with vegetation indices, and texture/focus measures.
//!
//! ## Core Features
//!
//! - **Trait-based Architecture**: swap segmentation or boundary tracing by implementing traits
//! - **Pipeline System**: segmentation, boundary, four measuring stages and an assembler
//! - **Anomaly Flags**: out-of-range values are reported next to the raw numbers, never clamped
//! - **Batch Processing**: bounded parallel runs with cooperative cancellation
//! - **Narratives**: pluggable prose summaries with a deterministic template fallback
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use phenotype::Pipeline;
//!
//! let pipeline = Pipeline::builder().build()?;
//!
//! let image = image::open("leaf.jpg")?.to_rgb8();
//! let features = pipeline.process(&image)?;
//!
//! for (name, value) in features.to_mapping() {
//!     println!("{name}: {value}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Custom Pipeline
//!
//! ```rust,no_run
//! use phenotype::{Pipeline, PhenotypeConfig, SegmentationStrategy};
//!
//! let config = PhenotypeConfig {
//!     blur_sigma: None,
//!     enable_anomaly_flags: false,
//!     ..PhenotypeConfig::default()
//! };
//! let pipeline = Pipeline::builder()
//!     .with_config(config)
//!     .with_strategy(SegmentationStrategy::HsvRange {
//!         hue_min: 60.0,
//!         hue_max: 170.0,
//!         saturation_min: 50,
//!         value_min: 40,
//!     })
//!     .build()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod config;
pub mod types;
pub mod traits;
pub mod algorithms;
pub mod anomaly;
pub mod features;
pub mod assembler;
pub mod pipeline;
pub mod batch;
pub mod narrative;

// Re-exports for convenience
pub use error::{PhenotypeError, Result, Stage};
pub use config::{PhenotypeConfig, SegmentationStrategy, TextureScope};
pub use types::{Boundary, Contour, Mask, PixelArea, PolygonArea};
pub use traits::*;
pub use algorithms::*;
pub use anomaly::{AnomalyFlag, AnomalyKind};
pub use features::{FeatureSet, FEATURE_NAMES};
pub use pipeline::{Pipeline, builder::PipelineBuilder};
pub use batch::{BatchEntry, BatchItem, BatchOutcome, BatchProcessor, BatchReport, CancellationFlag};
pub use narrative::{
    narrate_with_fallback, CommandNarrator, NarrativeError, NarrativeGenerator, TemplateNarrator,
    DEFAULT_NARRATIVE_TIMEOUT,
};
