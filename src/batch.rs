//! Batch orchestration
//!
//! A batch moves through `Received -> Expanding -> Dispatching ->
//! Collecting -> Archiving -> Done`. Validation fails fast; everything
//! after that is per-job: a job that cannot resolve or render is recorded
//! in the manifest and the batch carries on. Only the all-jobs-failed case
//! is fatal to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future;
use log::{debug, info, warn};
use serde::Serialize;

use crate::archive;
use crate::conversation::{ConversationThread, Sender};
use crate::error::{Error, JobErrorKind, Result};
use crate::image::EvidenceImage;
use crate::pool::RenderPool;
use crate::template::{Scene, TemplateRegistry};

/// Contact names cycled through for the chat header
const CONTACT_NAMES: [&str; 12] = [
    "James Anderson",
    "Emma Wilson",
    "Michael Brown",
    "Sarah Davis",
    "David Miller",
    "Jessica Taylor",
    "Daniel Thomas",
    "Ashley Martinez",
    "Matthew Jackson",
    "Emily White",
    "Christopher Harris",
    "Amanda Clark",
];

/// Upper bound on jobs per request
pub const MAX_BATCH_SIZE: usize = 1000;

/// A fully specified batch: what to render, from which material
pub struct BatchRequest {
    pub platform_id: String,
    pub count: usize,
    pub messages_before: usize,
    pub messages_after: usize,
    pub images: Vec<Arc<EvidenceImage>>,
    pub conversations: Vec<Arc<ConversationThread>>,
}

/// One unit of work: one window/image/platform triple plus its scene.
/// Value type; shares nothing mutable with other jobs.
#[derive(Clone)]
pub struct RenderJob {
    pub index: usize,
    pub thread: Arc<ConversationThread>,
    pub image: Arc<EvidenceImage>,
    pub platform_id: String,
    pub messages_before: usize,
    pub messages_after: usize,
    pub scene: Scene,
}

/// Terminal outcome of one job
pub enum JobOutcome {
    Success(Vec<u8>),
    Failed(JobErrorKind),
}

/// Exactly one of these exists per submitted job
pub struct RenderResult {
    pub job_index: usize,
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Failed,
}

/// Per-job line item in the manifest
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_index: usize,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<JobErrorKind>,
}

/// Summary returned alongside the archive
#[derive(Debug, Clone, Serialize)]
pub struct BatchManifest {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub per_job: Vec<JobReport>,
}

/// Archive bytes plus the manifest describing them
#[derive(Debug)]
pub struct BatchOutput {
    pub archive: Vec<u8>,
    pub manifest: BatchManifest,
}

/// Cooperative batch-level cancellation.
///
/// Cancelling stops jobs that have not yet acquired a pool slot; in-flight
/// renders run to completion or to their own timeout, so no slot leaks.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
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

/// Validate a batch request (the `Received` state)
fn validate(request: &BatchRequest, registry: &TemplateRegistry) -> Result<()> {
    if request.count == 0 {
        return Err(Error::InvalidBatchRequest(
            "count must be at least 1".to_string(),
        ));
    }
    if request.count > MAX_BATCH_SIZE {
        return Err(Error::InvalidBatchRequest(format!(
            "count {} exceeds the {} job limit",
            request.count, MAX_BATCH_SIZE
        )));
    }
    if request.images.is_empty() {
        return Err(Error::InvalidBatchRequest(
            "at least one evidence image is required".to_string(),
        ));
    }
    // Overflow avoidance happens here, not after rendering: the window
    // (messages + the image bubble) must fit the platform's canvas budget.
    // An unregistered platform is left for per-job resolution to report.
    let bubbles = request
        .messages_before
        .checked_add(request.messages_after)
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| {
            Error::InvalidBatchRequest("message window depth overflows".to_string())
        })?;
    if let Ok(template) = registry.get(&request.platform_id) {
        if bubbles > template.max_bubbles {
            return Err(Error::InvalidBatchRequest(format!(
                "window of {} bubbles exceeds the {} bubble budget for {}",
                bubbles, template.max_bubbles, template.id
            )));
        }
    }
    Ok(())
}

/// Deterministic scene for a job index: round-robin contact, index-derived
/// clock, alternating image side. Same index, same scene, every run.
fn scene_for_index(index: usize) -> Scene {
    Scene {
        contact_name: CONTACT_NAMES[index % CONTACT_NAMES.len()].to_string(),
        clock: format!("{}:{:02}", 1 + (index * 3 + 8) % 12, (index * 13 + 41) % 60),
        image_sender: if index % 2 == 0 {
            Sender::Received
        } else {
            Sender::Sent
        },
    }
}

/// Expand a request into `count` jobs (the `Expanding` state), cycling
/// round-robin through conversations and images when the requested count
/// exceeds the supplied material.
fn expand(request: &BatchRequest) -> Vec<RenderJob> {
    let fallback = Arc::new(ConversationThread::fallback());
    (0..request.count)
        .map(|index| {
            let thread = if request.conversations.is_empty() {
                Arc::clone(&fallback)
            } else {
                Arc::clone(&request.conversations[index % request.conversations.len()])
            };
            RenderJob {
                index,
                thread,
                image: Arc::clone(&request.images[index % request.images.len()]),
                platform_id: request.platform_id.clone(),
                messages_before: request.messages_before,
                messages_after: request.messages_after,
                scene: scene_for_index(index),
            }
        })
        .collect()
}

/// Run one job to a terminal outcome. Errors are converted into a
/// recorded failure here; nothing escapes to abort the batch.
async fn execute_job(
    job: RenderJob,
    registry: Arc<TemplateRegistry>,
    pool: Arc<RenderPool>,
    cancel: CancelFlag,
) -> RenderResult {
    let outcome = match run_job(&job, &registry, &pool, &cancel).await {
        Ok(bytes) => JobOutcome::Success(bytes),
        Err(err) => {
            warn!("job {} failed: {}", job.index, err);
            JobOutcome::Failed(JobErrorKind::from(&err))
        }
    };
    RenderResult {
        job_index: job.index,
        outcome,
    }
}

async fn run_job(
    job: &RenderJob,
    registry: &TemplateRegistry,
    pool: &RenderPool,
    cancel: &CancelFlag,
) -> Result<Vec<u8>> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let template = registry.get(&job.platform_id)?;
    let window = job
        .thread
        .window(job.messages_before, job.messages_after, template.max_chars)?;
    let markup = registry.resolve(&job.platform_id, &window, &job.scene, &job.image)?;
    pool.capture(&markup, template.canvas, cancel).await
}

/// Run a whole batch through the pipeline.
///
/// Every submitted job produces exactly one entry in the manifest. The
/// pool's slot count is the only concurrency limiter; all jobs are
/// dispatched up front and block on slot acquisition.
pub async fn run_batch(
    pool: Arc<RenderPool>,
    registry: Arc<TemplateRegistry>,
    request: BatchRequest,
    cancel: CancelFlag,
) -> Result<BatchOutput> {
    // Received
    validate(&request, &registry)?;

    // Expanding
    let jobs = expand(&request);
    let total = jobs.len();
    info!(
        "dispatching {} jobs for platform '{}' across {} pool slots",
        total,
        request.platform_id,
        pool.size()
    );

    // Dispatching
    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let index = job.index;
            let handle = tokio::spawn(execute_job(
                job,
                Arc::clone(&registry),
                Arc::clone(&pool),
                cancel.clone(),
            ));
            (index, handle)
        })
        .collect();

    // Collecting: completion order is arbitrary; reassemble by job index
    let joined = future::join_all(
        handles
            .into_iter()
            .map(|(index, handle)| async move { (index, handle.await) }),
    )
    .await;
    let mut results = Vec::with_capacity(total);
    for (index, outcome) in joined {
        match outcome {
            Ok(result) => results.push(result),
            Err(join_err) => {
                // A panicked task still yields a result for its job
                warn!("job {} task panicked: {}", index, join_err);
                results.push(RenderResult {
                    job_index: index,
                    outcome: JobOutcome::Failed(JobErrorKind::Render),
                });
            }
        }
    }
    results.sort_by_key(|r| r.job_index);

    // Archiving
    let manifest = build_manifest(&results);
    debug!(
        "batch finished: {}/{} succeeded",
        manifest.succeeded, manifest.total
    );
    if manifest.succeeded == 0 {
        return Err(Error::BatchFailed(manifest.failed));
    }
    let entries = results.iter().filter_map(|r| match &r.outcome {
        JobOutcome::Success(bytes) => Some((r.job_index, bytes.as_slice())),
        JobOutcome::Failed(_) => None,
    });
    let archive = archive::build_archive(entries)?;

    // Done
    Ok(BatchOutput { archive, manifest })
}

fn build_manifest(results: &[RenderResult]) -> BatchManifest {
    let per_job: Vec<JobReport> = results
        .iter()
        .map(|r| match &r.outcome {
            JobOutcome::Success(_) => JobReport {
                job_index: r.job_index,
                status: JobStatus::Success,
                error_kind: None,
            },
            JobOutcome::Failed(kind) => JobReport {
                job_index: r.job_index,
                status: JobStatus::Failed,
                error_kind: Some(*kind),
            },
        })
        .collect();
    let succeeded = per_job
        .iter()
        .filter(|j| j.status == JobStatus::Success)
        .count();
    BatchManifest {
        total: per_job.len(),
        succeeded,
        failed: per_job.len() - succeeded,
        per_job,
    }
}
