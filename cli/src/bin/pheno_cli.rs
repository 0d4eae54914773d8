use clap::{Parser, Subcommand};
use cli::{
    RunConfig, batch_narrative_paths, collect_images, narrative_path, run_config_schema,
    write_features, write_json,
};
use color_eyre::eyre::{Result, WrapErr};
use phenotype::{
    BatchItem, BatchProcessor, FeatureSet, NarrativeGenerator, Pipeline, TemplateNarrator,
    narrate_with_fallback,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Leaf phenotyping feature extraction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract features from a single leaf image
    Single {
        /// Path to the leaf image
        #[arg(short, long)]
        input: PathBuf,
        /// Directory for the feature (and narrative) files
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Run configuration (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Pre-computed leaf mask; non-zero pixels are leaf
        #[arg(long)]
        mask: Option<PathBuf>,
        /// Also write a narrative summary
        #[arg(long)]
        narrative: bool,
    },
    /// Extract features from every image in a directory
    Batch {
        /// Directory containing leaf images
        #[arg(short, long)]
        input: PathBuf,
        /// Directory for batch_results.json (and narratives)
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Run configuration (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Images processed at once (overrides the config)
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Also write a narrative summary per completed image
        #[arg(long)]
        narrative: bool,
    },
    /// Print the JSON schema of the run configuration
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Single { input, output_dir, config, mask, narrative } => {
            process_single(input, output_dir, config.as_deref(), mask.as_deref(), *narrative).await?;
        }
        Commands::Batch { input, output_dir, config, jobs, narrative } => {
            process_batch(input, output_dir, config.as_deref(), *jobs, *narrative).await?;
        }
        Commands::Schema => {
            println!("{}", run_config_schema()?);
        }
    }

    Ok(())
}

async fn process_single(
    input: &Path,
    output_dir: &Path,
    config_path: Option<&Path>,
    mask_path: Option<&Path>,
    narrative: bool,
) -> Result<()> {
    let run_config = RunConfig::load(config_path)?;

    let mut builder = Pipeline::builder().with_config(run_config.pipeline.clone());
    if let Some(mask_path) = mask_path {
        let mask = image::open(mask_path)
            .wrap_err_with(|| format!("Failed to open mask {}", mask_path.display()))?
            .to_luma8();
        builder = builder.with_supplied_mask(mask);
    }
    let pipeline = builder.build()?;
    info!("{}", pipeline.info());

    let image = image::open(input)
        .wrap_err_with(|| format!("Failed to open image {}", input.display()))?
        .to_rgb8();
    let image_id = input.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

    let features = pipeline.process_named(&image_id, &image)?;
    for flag in features.anomalies() {
        warn!(kind = %flag.kind, "{}", flag.message);
    }

    let features_file = write_features(output_dir, input, &features)?;
    info!("✅ Features saved to: {:?}", features_file);

    if narrative {
        let narrator = run_config.narrator();
        write_narrative(&narrator, &narrative_path(output_dir, input), &features).await?;
    }
    Ok(())
}

async fn process_batch(
    input: &Path,
    output_dir: &Path,
    config_path: Option<&Path>,
    jobs: Option<usize>,
    narrative: bool,
) -> Result<()> {
    let run_config = RunConfig::load(config_path)?;
    let pipeline = Pipeline::builder().with_config(run_config.pipeline.clone()).build()?;
    info!("{}", pipeline.info());

    let images = collect_images(input)?;
    info!("Found {} images in {:?}", images.len(), input);

    let items = images.iter().map(BatchItem::from_path).collect();
    let report = BatchProcessor::new(pipeline)
        .with_max_concurrency(jobs.unwrap_or(run_config.max_concurrency))
        .run(items)
        .await;

    let results_file = output_dir.join("batch_results.json");
    write_json(&results_file, &report)?;
    info!(
        "✅ Batch finished: {} completed, {} failed, results saved to {:?}",
        report.completed, report.failed, results_file
    );

    if narrative {
        let narrator = run_config.narrator();
        let names: Vec<&Path> = report.entries.iter().map(|e| Path::new(e.image_id.as_str())).collect();
        let paths = batch_narrative_paths(output_dir, &names);
        for (entry, path) in report.entries.iter().zip(&paths) {
            if let Some(features) = entry.features() {
                write_narrative(&narrator, path, features).await?;
            }
        }
    }
    Ok(())
}

async fn write_narrative<N: NarrativeGenerator>(
    narrator: &N,
    path: &Path,
    features: &FeatureSet,
) -> Result<()> {
    let text = narrate_with_fallback(narrator, &TemplateNarrator, features).await?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    info!("📄 Narrative saved to: {:?}", path);
    Ok(())
}
