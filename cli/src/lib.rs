use phenotype::{
    CommandNarrator, DEFAULT_NARRATIVE_TIMEOUT, FeatureSet, NarrativeError, NarrativeGenerator,
    PhenotypeConfig, PhenotypeError, TemplateNarrator,
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File extensions picked up when scanning a directory for leaf images
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Phenotype(#[from] PhenotypeError),
    #[error("No images found in {0}")]
    NoImages(PathBuf),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// Everything a CLI run needs besides its input and output paths
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Images processed at once in batch mode
    pub max_concurrency: usize,
    /// External narrative program and its arguments; the built-in template is used when unset or failing
    pub narrative_command: Option<Vec<String>>,
    /// Seconds the external narrative program may run
    pub narrative_timeout_secs: u64,
    pub pipeline: PhenotypeConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            narrative_command: None,
            narrative_timeout_secs: DEFAULT_NARRATIVE_TIMEOUT.as_secs(),
            pipeline: PhenotypeConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load RunConfig from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load RunConfig from TOML string
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let config: RunConfig = toml::from_str(content)?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Load RunConfig from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load RunConfig from JSON string
    pub fn from_json(content: &str) -> Result<Self, CliError> {
        let config: RunConfig = serde_json::from_str(content)?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }

    /// Defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Convert RunConfig to TOML string
    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    /// Convert RunConfig to JSON string
    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    /// External narrator when configured, template otherwise
    pub fn narrator(&self) -> Narrator {
        match self
            .narrative_command
            .as_deref()
            .and_then(CommandNarrator::from_command_line)
        {
            Some(command) => Narrator::Command(
                command.with_timeout(Duration::from_secs(self.narrative_timeout_secs)),
            ),
            None => Narrator::Template(TemplateNarrator),
        }
    }
}

/// Narrative source selected by the run configuration
#[derive(Debug, Clone)]
pub enum Narrator {
    Command(CommandNarrator),
    Template(TemplateNarrator),
}

impl NarrativeGenerator for Narrator {
    async fn generate_narrative(&self, features: &FeatureSet) -> Result<String, NarrativeError> {
        match self {
            Self::Command(command) => command.generate_narrative(features).await,
            Self::Template(template) => template.generate_narrative(features).await,
        }
    }
}

/// Pretty JSON schema of [`RunConfig`]
pub fn run_config_schema() -> Result<String, CliError> {
    let schema = schemars::schema_for!(RunConfig);
    Ok(serde_json::to_string_pretty(&schema)?)
}

/// Supported images directly inside `dir`, sorted by path
pub fn collect_images<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>, CliError> {
    let dir = dir.as_ref();
    let mut images: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_supported_image(path))
        .collect();

    if images.is_empty() {
        return Err(CliError::NoImages(dir.to_path_buf()));
    }
    images.sort();
    Ok(images)
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn stem(image: &Path) -> String {
    image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

/// `<output_dir>/<stem>_features.json`
pub fn features_path(output_dir: &Path, image: &Path) -> PathBuf {
    output_dir.join(format!("{}_features.json", stem(image)))
}

/// `<output_dir>/<stem>_narrative.txt`
pub fn narrative_path(output_dir: &Path, image: &Path) -> PathBuf {
    output_dir.join(format!("{}_narrative.txt", stem(image)))
}

/// Narrative file per image; images sharing a stem are told apart by extension
pub fn batch_narrative_paths(output_dir: &Path, images: &[&Path]) -> Vec<PathBuf> {
    let mut stems: HashMap<String, usize> = HashMap::new();
    for image in images {
        *stems.entry(stem(image)).or_insert(0) += 1;
    }

    images
        .iter()
        .map(|image| {
            if stems.get(&stem(image)).copied().unwrap_or(0) > 1 {
                let file_name = image
                    .file_name()
                    .map(|n| n.to_string_lossy().replace('.', "_"))
                    .unwrap_or_else(|| stem(image));
                output_dir.join(format!("{file_name}_narrative.txt"))
            } else {
                narrative_path(output_dir, image)
            }
        })
        .collect()
}

/// Write any serializable value as pretty JSON, creating parent directories
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Write the feature file for one image and return its path
pub fn write_features(output_dir: &Path, image: &Path, features: &FeatureSet) -> Result<PathBuf, CliError> {
    let path = features_path(output_dir, image);
    write_json(&path, features)?;
    Ok(path)
}
