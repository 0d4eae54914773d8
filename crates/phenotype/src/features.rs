use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    algorithms::{ColorStats, Morphometrics, ShapeDescriptors, TextureStats},
    anomaly::{AnomalyFlag, AnomalyKind},
};

/// Every feature name in the order collaborators expect
pub const FEATURE_NAMES: [&str; 28] = [
    "area",
    "perimeter",
    "compactness",
    "width",
    "height",
    "aspect_ratio",
    "area_convexa",
    "solidez",
    "centro_massa_x",
    "centro_massa_y",
    "hu_moment_1",
    "hu_moment_2",
    "hu_moment_3",
    "hu_moment_4",
    "hu_moment_5",
    "hu_moment_6",
    "hu_moment_7",
    "mean_r",
    "std_r",
    "mean_g",
    "std_g",
    "mean_b",
    "std_b",
    "excess_green_index",
    "vari_index",
    "gradient_mean",
    "gradient_std",
    "laplacian_variance",
];

/// Complete feature record for one leaf image.
///
/// Only the assembler creates one; there is no way to change it afterwards.
/// Serializes to a flat object keyed by [`FEATURE_NAMES`] plus `anomalies`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeatureSet {
    #[serde(flatten)]
    morphometrics: Morphometrics,
    #[serde(flatten)]
    shape: ShapeDescriptors,
    #[serde(flatten)]
    color: ColorStats,
    #[serde(flatten)]
    texture: TextureStats,
    anomalies: Vec<AnomalyFlag>,
}

impl FeatureSet {
    pub(crate) fn new(
        morphometrics: Morphometrics,
        shape: ShapeDescriptors,
        color: ColorStats,
        texture: TextureStats,
        anomalies: Vec<AnomalyFlag>,
    ) -> Self {
        Self { morphometrics, shape, color, texture, anomalies }
    }

    pub fn morphometrics(&self) -> &Morphometrics {
        &self.morphometrics
    }

    pub fn shape(&self) -> &ShapeDescriptors {
        &self.shape
    }

    pub fn color(&self) -> &ColorStats {
        &self.color
    }

    pub fn texture(&self) -> &TextureStats {
        &self.texture
    }

    pub fn anomalies(&self) -> &[AnomalyFlag] {
        &self.anomalies
    }

    pub fn has_anomaly(&self, kind: AnomalyKind) -> bool {
        self.anomalies.iter().any(|a| a.kind == kind)
    }

    /// Flat (name, value) pairs in [`FEATURE_NAMES`] order
    pub fn to_mapping(&self) -> Vec<(&'static str, f64)> {
        let m = &self.morphometrics;
        let c = &self.color;
        let t = &self.texture;
        let hu = self.shape.as_array();

        let values = [
            m.area.as_f64(),
            m.perimeter,
            m.compactness,
            m.width as f64,
            m.height as f64,
            m.aspect_ratio,
            m.convex_area.as_f64(),
            m.solidity,
            m.centroid_x,
            m.centroid_y,
            hu[0],
            hu[1],
            hu[2],
            hu[3],
            hu[4],
            hu[5],
            hu[6],
            c.mean_r,
            c.std_r,
            c.mean_g,
            c.std_g,
            c.mean_b,
            c.std_b,
            c.excess_green_index,
            c.vari_index,
            t.gradient_mean,
            t.gradient_std,
            t.laplacian_variance,
        ];
        FEATURE_NAMES.into_iter().zip(values).collect()
    }

    /// Look up one feature by its mapping name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.to_mapping()
            .into_iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{PixelArea, PolygonArea};

    pub(crate) fn sample_feature_set(anomalies: Vec<AnomalyFlag>) -> FeatureSet {
        FeatureSet::new(
            Morphometrics {
                area: PixelArea(257),
                perimeter: 60.7279,
                compactness: 0.8757,
                width: 20,
                height: 15,
                aspect_ratio: 0.75,
                convex_area: PolygonArea(237.5),
                solidity: 1.0821,
                centroid_x: 31.2,
                centroid_y: 18.4,
            },
            ShapeDescriptors {
                hu_moment_1: 0.17,
                hu_moment_2: 0.004,
                hu_moment_3: 1e-4,
                hu_moment_4: 2e-5,
                hu_moment_5: 1e-9,
                hu_moment_6: -3e-7,
                hu_moment_7: 2e-10,
            },
            ColorStats {
                mean_r: 167.73,
                std_r: 12.0,
                mean_g: 156.08,
                std_g: 10.5,
                mean_b: 101.23,
                std_b: 8.0,
                excess_green_index: 43.20,
                vari_index: -0.0523,
            },
            TextureStats {
                gradient_mean: 14.2,
                gradient_std: 20.1,
                laplacian_variance: 310.0,
            },
            anomalies,
        )
    }

    #[test]
    fn test_mapping_matches_serialized_keys() {
        let features = sample_feature_set(vec![]);
        let json = serde_json::to_value(&features).expect("Should serialize");
        let object = json.as_object().expect("Should be a JSON object");

        for (name, value) in features.to_mapping() {
            let serialized = object
                .get(name)
                .and_then(|v| v.as_f64())
                .unwrap_or_else(|| panic!("missing key {name}"));
            assert_eq!(serialized, value, "{name}");
        }
        assert!(object.contains_key("anomalies"));
        assert_eq!(object.len(), FEATURE_NAMES.len() + 1);
    }

    #[test]
    fn test_json_round_trip_preserves_record() {
        let features = sample_feature_set(vec![AnomalyFlag::new(
            AnomalyKind::SolidityOutOfRange,
            "solidity 1.0821 > 1",
        )]);
        let json = serde_json::to_string(&features).expect("Should serialize");
        let parsed: FeatureSet = serde_json::from_str(&json).expect("Should deserialize");
        assert_eq!(parsed, features);
    }

    #[test]
    fn test_lookup_by_name() {
        let features = sample_feature_set(vec![]);
        assert_eq!(features.get("aspect_ratio"), Some(0.75));
        assert_eq!(features.get("area_convexa"), Some(237.5));
        assert_eq!(features.get("unknown"), None);
        assert!(!features.has_anomaly(AnomalyKind::VariUndefined));
    }
}
