use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use image::RgbImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{info, warn};

use crate::{error::Result, features::FeatureSet, pipeline::Pipeline};

/// Shared switch asking a batch to stop starting new images
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
enum Source {
    Path(PathBuf),
    Image(RgbImage),
}

/// One image to process, identified for reporting
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub image_id: String,
    source: Source,
}

impl BatchItem {
    /// Decoded lazily inside the worker; the file name is the identifier
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let image_id = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { image_id, source: Source::Path(path) }
    }

    pub fn from_image(image_id: impl Into<String>, image: RgbImage) -> Self {
        Self { image_id: image_id.into(), source: Source::Image(image) }
    }

    fn load(self) -> Result<RgbImage> {
        match self.source {
            Source::Path(path) => Ok(image::open(path)?.to_rgb8()),
            Source::Image(image) => Ok(image),
        }
    }
}

/// What happened to one image of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Completed { features: FeatureSet },
    Failed { error: String },
    /// Never started because the batch was cancelled
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchEntry {
    pub image_id: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

impl BatchEntry {
    pub fn features(&self) -> Option<&FeatureSet> {
        match &self.outcome {
            BatchOutcome::Completed { features } => Some(features),
            _ => None,
        }
    }
}

/// Entries in input order plus per-status counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchReport {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn new(entries: Vec<BatchEntry>) -> Self {
        let count = |f: fn(&BatchOutcome) -> bool| entries.iter().filter(|e| f(&e.outcome)).count();
        Self {
            total: entries.len(),
            completed: count(|o| matches!(o, BatchOutcome::Completed { .. })),
            failed: count(|o| matches!(o, BatchOutcome::Failed { .. })),
            cancelled: count(|o| matches!(o, BatchOutcome::Cancelled)),
            entries,
        }
    }
}

/// Runs one shared pipeline over many images on the blocking thread pool
pub struct BatchProcessor {
    pipeline: Arc<Pipeline>,
    max_concurrency: usize,
    cancellation: CancellationFlag,
}

impl BatchProcessor {
    pub fn new(pipeline: Pipeline) -> Self {
        Self::from_shared(Arc::new(pipeline))
    }

    pub fn from_shared(pipeline: Arc<Pipeline>) -> Self {
        let max_concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            pipeline,
            max_concurrency,
            cancellation: CancellationFlag::new(),
        }
    }

    /// Upper bound on images processed at once (at least 1)
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = flag;
        self
    }

    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Process every item; failures and cancellations are reported per image
    pub async fn run(&self, items: Vec<BatchItem>) -> BatchReport {
        let total = items.len();
        let ids: Vec<String> = items.iter().map(|item| item.image_id.clone()).collect();
        let mut outcomes: Vec<Option<BatchOutcome>> = vec![None; total];

        info!(total, max_concurrency = self.max_concurrency, "Starting batch");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut done = 0usize;

        for (index, item) in items.into_iter().enumerate() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                outcomes[index] = Some(BatchOutcome::Cancelled);
                continue;
            };
            if self.cancellation.is_cancelled() {
                outcomes[index] = Some(BatchOutcome::Cancelled);
                continue;
            }

            let pipeline = Arc::clone(&self.pipeline);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                (index, process_item(&pipeline, item))
            });

            while let Some(joined) = tasks.try_join_next() {
                record(joined, &mut outcomes, &ids, &mut done, total);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            record(joined, &mut outcomes, &ids, &mut done, total);
        }

        let entries: Vec<BatchEntry> = ids
            .into_iter()
            .zip(outcomes)
            .map(|(image_id, outcome)| BatchEntry {
                image_id,
                outcome: outcome.unwrap_or_else(|| BatchOutcome::Failed {
                    error: "worker task aborted".to_string(),
                }),
            })
            .collect();

        let report = BatchReport::new(entries);
        info!(
            completed = report.completed,
            failed = report.failed,
            cancelled = report.cancelled,
            "Batch finished"
        );
        report
    }
}

fn process_item(pipeline: &Pipeline, item: BatchItem) -> BatchOutcome {
    let image_id = item.image_id.clone();
    let result = item
        .load()
        .and_then(|image| pipeline.process_named(&image_id, &image));

    match result {
        Ok(features) => BatchOutcome::Completed { features },
        Err(e) => {
            warn!(image = %image_id, error = %e, "Image failed");
            BatchOutcome::Failed { error: e.to_string() }
        }
    }
}

fn record(
    joined: std::result::Result<(usize, BatchOutcome), tokio::task::JoinError>,
    outcomes: &mut [Option<BatchOutcome>],
    ids: &[String],
    done: &mut usize,
    total: usize,
) {
    match joined {
        Ok((index, outcome)) => {
            *done += 1;
            let status = match &outcome {
                BatchOutcome::Completed { .. } => "completed",
                BatchOutcome::Failed { .. } => "failed",
                BatchOutcome::Cancelled => "cancelled",
            };
            info!(done = *done, total, image = %ids[index], status, "Image processed");
            outcomes[index] = Some(outcome);
        }
        Err(e) => warn!(error = %e, "Batch worker did not finish"),
    }
}
