//! Classification worker.
//!
//! Full windows are handed off as [`ClassificationJob`]s through a
//! [`JobSink`]. The [`ClassificationPool`] runs them on background threads so
//! ingestion never blocks on the model; [`InlineClassification`] runs them on
//! the caller's thread, which makes replays and tests deterministic.
//!
//! Jobs for one client always land on the same worker, so a client's results
//! are written in submission order. A failed or panicking classification is
//! logged and leaves the client's previous result in place.

use crate::classifier::reweight::Reweighter;
use crate::classifier::{check_scores, ClassifierError, SequenceClassifier};
use crate::config::WorkerConfig;
use crate::core::session::{LastResult, ResultSlot};
use crate::landmarks::types::{Detection, LandmarkFrame};
use crate::stats::SharedStats;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// A full window waiting to be classified.
#[derive(Debug, Clone)]
pub struct ClassificationJob {
    pub client_id: String,
    /// Copy of the client's window at submission time
    pub window: Vec<LandmarkFrame>,
    /// Detection of the newest frame in the window
    pub detection: Detection,
    /// Copy of the client's motion history at submission time
    pub motion_history: Vec<f64>,
    /// Where the result goes
    pub slot: ResultSlot,
    pub submitted_at: DateTime<Utc>,
}

/// Something that accepts classification jobs.
pub trait JobSink: Send + Sync {
    /// Hand a job off. Must not block on the classification itself when
    /// called from the ingestion path of a live server.
    fn submit(&self, job: ClassificationJob) -> Result<(), SubmitError>;
}

impl<T: JobSink + ?Sized> JobSink for Arc<T> {
    fn submit(&self, job: ClassificationJob) -> Result<(), SubmitError> {
        (**self).submit(job)
    }
}

/// Job submission errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The worker's queue is at capacity; the job was dropped
    QueueFull,
    /// The worker has shut down
    Disconnected,
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::QueueFull => write!(f, "Classification queue is full"),
            SubmitError::Disconnected => write!(f, "Classification worker has stopped"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Runs one job: classify, reweight, validate, publish.
pub struct ClassificationWorker {
    classifier: Arc<dyn SequenceClassifier>,
    reweighter: Reweighter,
    classes: usize,
    stats: SharedStats,
}

impl ClassificationWorker {
    pub fn new(
        classifier: Arc<dyn SequenceClassifier>,
        reweighter: Reweighter,
        classes: usize,
        stats: SharedStats,
    ) -> Self {
        Self {
            classifier,
            reweighter,
            classes,
            stats,
        }
    }

    /// Classify a job and compute its result without publishing it.
    pub fn classify(&self, job: &ClassificationJob) -> Result<LastResult, ClassifierError> {
        let scores = self.classifier.classify(&job.window)?;
        check_scores(&scores, self.classes)?;

        let prediction = self
            .reweighter
            .evaluate(&scores, &job.detection, &job.motion_history);
        debug!(
            "Client {}: {} ({:.2} raw, {:.2} adjusted, valid={})",
            job.client_id,
            prediction.label,
            prediction.raw_confidence,
            prediction.confidence,
            prediction.valid
        );

        Ok(LastResult::completed(prediction, scores, Utc::now()))
    }

    /// Run a job and publish its result. Errors and panics are contained.
    pub fn process(&self, job: ClassificationJob) {
        match catch_unwind(AssertUnwindSafe(|| self.classify(&job))) {
            Ok(Ok(result)) => {
                job.slot.write(result);
                self.stats.record_classification();
            }
            Ok(Err(e)) => {
                error!("Classification failed for client {}: {}", job.client_id, e);
                self.stats.record_classification_failure();
            }
            Err(_) => {
                error!("Classifier panicked for client {}", job.client_id);
                self.stats.record_classification_failure();
            }
        }
    }
}

/// Background worker threads, each with its own bounded queue.
pub struct ClassificationPool {
    senders: Vec<Sender<ClassificationJob>>,
    handles: Vec<JoinHandle<()>>,
    stats: SharedStats,
}

impl ClassificationPool {
    /// Spawn the worker threads.
    pub fn new(worker: ClassificationWorker, config: &WorkerConfig) -> std::io::Result<Self> {
        let worker = Arc::new(worker);
        let stats = Arc::clone(&worker.stats);
        let count = config.workers.max(1);
        let capacity = config.queue_capacity.max(1);

        let mut senders = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for index in 0..count {
            let (sender, receiver) = bounded::<ClassificationJob>(capacity);
            let worker = Arc::clone(&worker);

            let handle = thread::Builder::new()
                .name(format!("classifier-{index}"))
                .spawn(move || {
                    debug!("Classification worker {} started", index);
                    while let Ok(job) = receiver.recv() {
                        worker.process(job);
                    }
                    debug!("Classification worker {} stopped", index);
                })?;

            senders.push(sender);
            handles.push(handle);
        }

        Ok(Self {
            senders,
            handles,
            stats,
        })
    }

    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Jobs waiting across all queues.
    pub fn pending(&self) -> usize {
        self.senders.iter().map(|s| s.len()).sum()
    }

    /// Stop accepting jobs, drain the queues and join the workers.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.senders.clear();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("Classification worker thread panicked");
            }
        }
    }
}

impl JobSink for ClassificationPool {
    fn submit(&self, job: ClassificationJob) -> Result<(), SubmitError> {
        let shard = shard_for(&job.client_id, self.senders.len());
        let sender = self.senders.get(shard).ok_or(SubmitError::Disconnected)?;

        match sender.try_send(job) {
            Ok(()) => {
                self.stats.record_job_queued();
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                warn!(
                    "Classification queue full, dropping window for client {}",
                    job.client_id
                );
                self.stats.record_job_dropped();
                Err(SubmitError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(SubmitError::Disconnected),
        }
    }
}

impl Drop for ClassificationPool {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs each job synchronously inside `submit`.
pub struct InlineClassification {
    worker: ClassificationWorker,
}

impl InlineClassification {
    pub fn new(worker: ClassificationWorker) -> Self {
        Self { worker }
    }
}

impl JobSink for InlineClassification {
    fn submit(&self, job: ClassificationJob) -> Result<(), SubmitError> {
        self.worker.stats.record_job_queued();
        self.worker.process(job);
        Ok(())
    }
}

/// Worker index for a client.
fn shard_for(client_id: &str, workers: usize) -> usize {
    if workers <= 1 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    client_id.hash(&mut hasher);
    (hasher.finish() % workers as u64) as usize
}
