//! Job statistics, collected off the critical path.
//!
//! A [`StatsCollector`] observes committed job updates and keeps cheap
//! in-memory counters per (type, operation); heavier aggregates are pulled
//! from the store on demand when a snapshot is requested.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::error::RegistryError;
use crate::model::{Job, JobStatus, ServiceState};
use crate::store::RegistryStore;

/// Observer notified about committed job lifecycle events.
pub trait JobObserver: Send + Sync {
    /// Called with the committed state after a job's status changes.
    fn job_updated(&self, job: &Job);

    /// Called once per job hand-off a worker actually accepted.
    ///
    /// Candidate walks rewrite the processor of a DISPATCHING job several
    /// times without any worker taking it; this fires only for the
    /// accepting one.
    fn job_dispatched(&self, _job: &Job) {}
}

/// Lifecycle counters for one (type, operation).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperationCounters {
    /// Jobs handed off to a worker.
    pub dispatched: u64,
    /// Jobs that completed successfully.
    pub finished: u64,
    /// Jobs that failed.
    pub failed: u64,
    /// Jobs that were canceled.
    pub canceled: u64,
}

/// Snapshot entry for one (type, operation).
#[derive(Debug, Clone, Serialize)]
pub struct OperationStats {
    /// Job type.
    pub job_type: String,
    /// Operation.
    pub operation: String,
    /// Lifecycle counters since this node started.
    #[serde(flatten)]
    pub counters: OperationCounters,
    /// Mean queue time over finished jobs, in milliseconds.
    pub average_queue_time_ms: Option<f64>,
    /// Mean run time over finished jobs, in milliseconds.
    pub average_run_time_ms: Option<f64>,
}

/// Per-service job counts, the feed behind cluster dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatistics {
    /// Job type of the service.
    pub job_type: String,
    /// Host the service runs on.
    pub host: String,
    /// Current health state.
    pub state: ServiceState,
    /// Jobs currently running on the service.
    pub running: u64,
    /// Jobs finished by the service.
    pub finished: u64,
    /// Jobs failed on the service.
    pub failed: u64,
}

/// Collects per-operation counters from committed job updates.
#[derive(Default)]
pub struct StatsCollector {
    counters: Mutex<BTreeMap<(String, String), OperationCounters>>,
}

impl StatsCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces a snapshot, enriching the counters with store-side
    /// averages.
    pub fn snapshot(&self, store: &dyn RegistryStore) -> Result<Vec<OperationStats>, RegistryError> {
        let counters = match self.counters.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return Ok(Vec::new()),
        };
        let mut stats = Vec::with_capacity(counters.len());
        for ((job_type, operation), counters) in counters {
            let averages = store.average_times(&job_type, &operation)?;
            stats.push(OperationStats {
                job_type,
                operation,
                counters,
                average_queue_time_ms: averages.map(|a| a.queue_time_ms),
                average_run_time_ms: averages.map(|a| a.run_time_ms),
            });
        }
        Ok(stats)
    }
}

impl JobObserver for StatsCollector {
    fn job_updated(&self, job: &Job) {
        let Ok(mut counters) = self.counters.lock() else {
            return;
        };
        let entry = counters
            .entry((job.job_type.clone(), job.operation.clone()))
            .or_default();
        match job.status {
            JobStatus::Finished => entry.finished += 1,
            JobStatus::Failed => entry.failed += 1,
            JobStatus::Canceled => entry.canceled += 1,
            _ => {}
        }
    }

    fn job_dispatched(&self, job: &Job) {
        let Ok(mut counters) = self.counters.lock() else {
            return;
        };
        counters
            .entry((job.job_type.clone(), job.operation.clone()))
            .or_default()
            .dispatched += 1;
    }
}

/// Computes per-service job counts straight from the store.
pub fn service_statistics(store: &dyn RegistryStore) -> Result<Vec<ServiceStatistics>, RegistryError> {
    let mut stats = Vec::new();
    for service in store.services()? {
        let running = store.count_jobs(
            Some(&service.job_type),
            Some(&service.host),
            None,
            Some(JobStatus::Running),
        )?;
        let finished = store.count_jobs(
            Some(&service.job_type),
            Some(&service.host),
            None,
            Some(JobStatus::Finished),
        )?;
        let failed = store.count_jobs(
            Some(&service.job_type),
            Some(&service.host),
            None,
            Some(JobStatus::Failed),
        )?;
        stats.push(ServiceStatistics {
            job_type: service.job_type,
            host: service.host,
            state: service.state,
            running,
            finished,
            failed,
        });
    }
    Ok(stats)
}
