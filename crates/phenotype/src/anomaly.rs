use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Kind of soft invariant violation
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr,
    PartialEq, Eq, Hash
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnomalyKind {
    /// Pixel area exceeds the convex hull's polygon area
    SolidityOutOfRange,
    /// VARI denominator too close to zero
    VariUndefined,
    /// Pixel area against continuous perimeter exceeds a perfect circle
    CompactnessOutOfRange,
}

/// Non-fatal note attached to an otherwise valid feature set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnomalyFlag {
    pub kind: AnomalyKind,
    pub message: String,
}

impl AnomalyFlag {
    pub fn new(kind: AnomalyKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// A stage result together with the anomalies it noticed
#[derive(Debug, Clone, PartialEq)]
pub struct Measured<T> {
    pub value: T,
    pub anomalies: Vec<AnomalyFlag>,
}

impl<T> Measured<T> {
    pub fn clean(value: T) -> Self {
        Self { value, anomalies: Vec::new() }
    }

    pub fn with_anomalies(value: T, anomalies: Vec<AnomalyFlag>) -> Self {
        Self { value, anomalies }
    }
}
