//! Prose summaries of a [`FeatureSet`].
//!
//! The pipeline never depends on a narrator: narratives are produced after a
//! feature set is complete, and an unavailable generator is replaced by the
//! deterministic [`TemplateNarrator`].

use std::{future::Future, process::Stdio, time::Duration};

use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command as TokioCommand};
use tracing::{debug, warn};

use crate::{anomaly::AnomalyKind, features::FeatureSet};

/// How long an external narrator may run before it counts as unavailable
pub const DEFAULT_NARRATIVE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum NarrativeError {
    #[error("Narrative generator unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to encode features: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Turns a finished feature set into human-readable text
pub trait NarrativeGenerator: Send + Sync {
    fn generate_narrative(
        &self,
        features: &FeatureSet,
    ) -> impl Future<Output = Result<String, NarrativeError>> + Send;
}

/// External program fed the feature set as JSON on stdin; its stdout is the narrative
#[derive(Debug, Clone)]
pub struct CommandNarrator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandNarrator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_NARRATIVE_TIMEOUT,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program is killed once this elapses
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// First element is the program, the rest its arguments
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone()).with_args(args.iter().cloned()))
    }
}

impl NarrativeGenerator for CommandNarrator {
    async fn generate_narrative(&self, features: &FeatureSet) -> Result<String, NarrativeError> {
        let payload = serde_json::to_vec(features)?;

        let mut child = TokioCommand::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| NarrativeError::Unavailable(format!("cannot start {}: {e}", self.program)))?;

        let stdin = child.stdin.take();
        let exchange = async move {
            // Dropping stdin closes it so the program sees end of input
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                NarrativeError::Unavailable(format!(
                    "{} did not answer within {:?}",
                    self.program, self.timeout
                ))
            })?
            .map_err(|e| NarrativeError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(NarrativeError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(NarrativeError::Unavailable(format!("{} produced no text", self.program)));
        }
        debug!(chars = text.len(), "External narrative received");
        Ok(text)
    }
}

/// Fixed-wording report assembled from the numbers alone
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateNarrator;

impl TemplateNarrator {
    fn shape_sentence(features: &FeatureSet) -> String {
        let m = features.morphometrics();
        let outline = if m.compactness >= 0.8 {
            "a compact, nearly round outline"
        } else if m.compactness >= 0.5 {
            "a moderately elongated outline"
        } else {
            "an irregular or strongly lobed outline"
        };
        let margin = if m.solidity >= 0.95 {
            "smooth margins"
        } else {
            "indented margins"
        };
        format!(
            "The leaf covers {} pixels ({} x {} px, aspect ratio {:.2}) with {outline} \
             (compactness {:.3}) and {margin} (solidity {:.3}).",
            m.area.0, m.width, m.height, m.aspect_ratio, m.compactness, m.solidity
        )
    }

    fn color_sentence(features: &FeatureSet) -> String {
        let c = features.color();
        let vigor = if c.excess_green_index > 40.0 {
            "strong green coloration"
        } else if c.excess_green_index > 10.0 {
            "moderate green coloration"
        } else {
            "weak green coloration, possibly chlorotic or senescent tissue"
        };
        format!(
            "Mean color is R {:.1}, G {:.1}, B {:.1}, showing {vigor} (ExG {:.2}, VARI {:.4}).",
            c.mean_r, c.mean_g, c.mean_b, c.excess_green_index, c.vari_index
        )
    }

    fn texture_sentence(features: &FeatureSet) -> String {
        let t = features.texture();
        let focus = if t.laplacian_variance >= 100.0 { "sharp" } else { "soft or blurred" };
        format!(
            "Surface texture has mean gradient {:.2} (std {:.2}); the image looks {focus} \
             (Laplacian variance {:.1}).",
            t.gradient_mean, t.gradient_std, t.laplacian_variance
        )
    }

    fn anomaly_sentence(features: &FeatureSet) -> Option<String> {
        if features.anomalies().is_empty() {
            return None;
        }
        let notes: Vec<&'static str> = features
            .anomalies()
            .iter()
            .map(|flag| match flag.kind {
                AnomalyKind::SolidityOutOfRange => "solidity above 1 (pixel-count area against hull polygon area)",
                AnomalyKind::VariUndefined => "VARI undefined for this color balance",
                AnomalyKind::CompactnessOutOfRange => "compactness above 1 (pixelated boundary)",
            })
            .collect();
        Some(format!("Measurement notes: {}.", notes.join("; ")))
    }
}

impl NarrativeGenerator for TemplateNarrator {
    async fn generate_narrative(&self, features: &FeatureSet) -> Result<String, NarrativeError> {
        let mut sentences = vec![
            Self::shape_sentence(features),
            Self::color_sentence(features),
            Self::texture_sentence(features),
        ];
        sentences.extend(Self::anomaly_sentence(features));
        Ok(sentences.join(" "))
    }
}

/// Primary narrator's text, or the fallback's when the primary fails
pub async fn narrate_with_fallback<P, F>(
    primary: &P,
    fallback: &F,
    features: &FeatureSet,
) -> Result<String, NarrativeError>
where
    P: NarrativeGenerator,
    F: NarrativeGenerator,
{
    match primary.generate_narrative(features).await {
        Ok(text) => Ok(text),
        Err(e) => {
            warn!(error = %e, "Narrative generator failed, using fallback");
            fallback.generate_narrative(features).await
        }
    }
}
