//! Pipeline counters.
//!
//! Lock-free counters updated from the ingestion path and the classification
//! workers, exposed as a serializable snapshot and a human-readable summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running counters for one pipeline instance.
#[derive(Debug)]
pub struct PipelineStats {
    /// Frames accepted into a session
    frames_ingested: AtomicU64,
    /// Frames rejected because landmark extraction failed
    frames_rejected: AtomicU64,
    /// Windows handed to the classification worker
    jobs_queued: AtomicU64,
    /// Windows dropped because the worker queue was full
    jobs_dropped: AtomicU64,
    classifications_completed: AtomicU64,
    classification_failures: AtomicU64,
    /// Tokens appended to a sentence
    commits: AtomicU64,
    /// Pending-tracking resets after sustained hand loss
    hand_loss_resets: AtomicU64,
    started_at: DateTime<Utc>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            frames_ingested: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            jobs_queued: AtomicU64::new(0),
            jobs_dropped: AtomicU64::new(0),
            classifications_completed: AtomicU64::new(0),
            classification_failures: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            hand_loss_resets: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_frame_ingested(&self) {
        self.frames_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_queued(&self) {
        self.jobs_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_dropped(&self) {
        self.jobs_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classification(&self) {
        self.classifications_completed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classification_failure(&self) {
        self.classification_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hand_loss_reset(&self) {
        self.hand_loss_resets.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_ingested: self.frames_ingested.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            jobs_queued: self.jobs_queued.load(Ordering::Relaxed),
            jobs_dropped: self.jobs_dropped.load(Ordering::Relaxed),
            classifications_completed: self.classifications_completed.load(Ordering::Relaxed),
            classification_failures: self.classification_failures.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            hand_loss_resets: self.hand_loss_resets.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Pipeline Statistics:\n\
             - Frames ingested: {}\n\
             - Frames rejected: {}\n\
             - Windows queued: {} ({} dropped)\n\
             - Classifications: {} ({} failed)\n\
             - Signs committed: {}\n\
             - Hand-loss resets: {}\n\
             - Uptime: {} seconds",
            stats.frames_ingested,
            stats.frames_rejected,
            stats.jobs_queued,
            stats.jobs_dropped,
            stats.classifications_completed,
            stats.classification_failures,
            stats.commits,
            stats.hand_loss_resets,
            stats.uptime_secs
        )
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_ingested: u64,
    pub frames_rejected: u64,
    pub jobs_queued: u64,
    pub jobs_dropped: u64,
    pub classifications_completed: u64,
    pub classification_failures: u64,
    pub commits: u64,
    pub hand_loss_resets: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Thread-safe handle to the pipeline counters.
pub type SharedStats = Arc<PipelineStats>;

/// Create a new shared counter set.
pub fn create_shared_stats() -> SharedStats {
    Arc::new(PipelineStats::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = PipelineStats::new();
        stats.record_frame_ingested();
        stats.record_frame_ingested();
        stats.record_frame_rejected();
        stats.record_job_queued();
        stats.record_commit();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_ingested, 2);
        assert_eq!(snapshot.frames_rejected, 1);
        assert_eq!(snapshot.jobs_queued, 1);
        assert_eq!(snapshot.jobs_dropped, 0);
        assert_eq!(snapshot.commits, 1);
    }

    #[test]
    fn test_summary() {
        let stats = PipelineStats::new();
        stats.record_job_queued();
        stats.record_job_dropped();
        let summary = stats.summary();
        assert!(summary.contains("Windows queued: 1 (1 dropped)"));
        assert!(summary.contains("Signs committed: 0"));
    }

    #[test]
    fn test_shared_across_threads() {
        let stats = create_shared_stats();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record_classification();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot().classifications_completed, 400);
    }
}
