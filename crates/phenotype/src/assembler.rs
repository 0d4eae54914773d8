use tracing::{debug, warn};

use crate::{
    algorithms::{morphometry, ColorStats, Morphometrics, ShapeDescriptors, TextureStats},
    anomaly::{AnomalyFlag, AnomalyKind, Measured},
    error::{PhenotypeError, Result, Stage},
    features::FeatureSet,
};

/// Features that can never be negative for a valid mask
const NON_NEGATIVE: [&str; 18] = [
    "area",
    "perimeter",
    "compactness",
    "width",
    "height",
    "aspect_ratio",
    "area_convexa",
    "solidez",
    "hu_moment_1",
    "mean_r",
    "std_r",
    "mean_g",
    "std_g",
    "mean_b",
    "std_b",
    "gradient_mean",
    "gradient_std",
    "laplacian_variance",
];

/// Raw results of the measuring stages, successful or not
#[derive(Debug)]
pub struct StageOutputs {
    pub morphometrics: Result<Measured<Morphometrics>>,
    pub shape: Result<ShapeDescriptors>,
    pub color: Result<Measured<ColorStats>>,
    pub texture: Result<TextureStats>,
}

/// Merges stage outputs into a [`FeatureSet`], checking cross-stage invariants
#[derive(Debug, Clone, Copy)]
pub struct FeatureAssembler {
    enable_anomaly_flags: bool,
}

impl FeatureAssembler {
    pub fn new(enable_anomaly_flags: bool) -> Self {
        Self { enable_anomaly_flags }
    }

    /// Fails with `IncompleteFeatureSet` carrying the first stage error, in stage order
    pub fn assemble(&self, outputs: StageOutputs) -> Result<FeatureSet> {
        let morphometrics = outputs
            .morphometrics
            .map_err(|e| PhenotypeError::incomplete(Stage::Morphometry, e))?;
        let shape = outputs
            .shape
            .map_err(|e| PhenotypeError::incomplete(Stage::Shape, e))?;
        let color = outputs
            .color
            .map_err(|e| PhenotypeError::incomplete(Stage::Color, e))?;
        let texture = outputs
            .texture
            .map_err(|e| PhenotypeError::incomplete(Stage::Texture, e))?;

        let mut anomalies = Vec::new();
        for flag in morphometrics.anomalies.into_iter().chain(color.anomalies) {
            if !anomalies.iter().any(|a: &AnomalyFlag| a.kind == flag.kind) {
                anomalies.push(flag);
            }
        }

        let morph = morphometrics.value;
        let missing_flag = (morph.solidity > 1.0 && !flagged(&anomalies, AnomalyKind::SolidityOutOfRange))
            || (morph.compactness > 1.0 && !flagged(&anomalies, AnomalyKind::CompactnessOutOfRange));
        if missing_flag {
            for flag in morphometry::range_anomalies(morph.solidity, morph.compactness) {
                if !anomalies.iter().any(|a| a.kind == flag.kind) {
                    anomalies.push(flag);
                }
            }
        }

        let features = FeatureSet::new(morph, shape, color.value, texture, Vec::new());
        validate(&features).map_err(|e| PhenotypeError::incomplete(Stage::Assembly, e))?;

        if !self.enable_anomaly_flags && !anomalies.is_empty() {
            let kinds: Vec<&'static str> = anomalies.iter().map(|a| a.kind.into()).collect();
            warn!(?kinds, "Anomaly flags disabled, not attaching");
            anomalies.clear();
        }

        debug!(anomalies = anomalies.len(), "Feature set assembled");
        Ok(FeatureSet::new(morph, shape, color.value, texture, anomalies))
    }
}

fn validate(features: &FeatureSet) -> Result<()> {
    for (field, value) in features.to_mapping() {
        if !value.is_finite() || (value < 0.0 && NON_NEGATIVE.contains(&field)) {
            return Err(PhenotypeError::InvalidMeasurement { field, value });
        }
    }
    Ok(())
}

/// Whether a flag of `kind` is present
pub fn flagged(anomalies: &[AnomalyFlag], kind: AnomalyKind) -> bool {
    anomalies.iter().any(|a| a.kind == kind)
}
