//! Persistence contract for the registry, and its in-memory implementation.
//!
//! The registry operates exclusively through [`RegistryStore`], so the
//! backing engine is pluggable. Every method is transactional on its own:
//! it either applies completely or not at all, and concurrent callers are
//! serialized by the implementation. Optimistic concurrency is expressed
//! through the job `version` column: [`RegistryStore::update_job`] rejects
//! writes whose snapshot version is stale.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::model::{HostRegistration, Job, JobStatus, ServiceKey, ServiceRegistration, ServiceState};

/// Average queue and run times of finished jobs for one (type, operation).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobAverages {
    /// Mean milliseconds between creation and start.
    pub queue_time_ms: f64,
    /// Mean milliseconds between start and completion.
    pub run_time_ms: f64,
    /// Number of jobs the averages were computed over.
    pub samples: u64,
}

/// Transactional store for jobs, hosts, and service registrations.
pub trait RegistryStore: Send + Sync {
    // ── Jobs ──

    /// Persists a new job, assigning its id and initial version.
    fn create_job(&self, job: Job) -> Result<Job, StoreError>;

    /// Looks a job up by id.
    fn job(&self, id: i64) -> Result<Option<Job>, StoreError>;

    /// Writes a job back under the optimistic version check.
    ///
    /// The write succeeds only when `job.version` equals the stored
    /// version; the stored version is then incremented and the updated row
    /// returned. A stale snapshot yields [`StoreError::VersionConflict`].
    fn update_job(&self, job: &Job) -> Result<Job, StoreError>;

    /// Deletes a set of jobs atomically. Fails without deleting anything
    /// if any id is unknown.
    fn delete_jobs(&self, ids: &[i64]) -> Result<(), StoreError>;

    /// Jobs matching an optional type filter and a status set.
    fn jobs_by_status(
        &self,
        job_type: Option<&str>,
        statuses: &[JobStatus],
    ) -> Result<Vec<Job>, StoreError>;

    /// Dispatchable jobs in the given statuses, ordered by creation date.
    fn dispatchable_jobs(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, StoreError>;

    /// Jobs assigned to the given processor service, in the given statuses.
    fn jobs_on_processor(
        &self,
        processor: &ServiceKey,
        statuses: &[JobStatus],
    ) -> Result<Vec<Job>, StoreError>;

    /// Jobs whose processor lives on the given host, in the given statuses.
    fn jobs_on_host(&self, host: &str, statuses: &[JobStatus]) -> Result<Vec<Job>, StoreError>;

    /// Direct children of a job.
    fn direct_children(&self, parent: i64) -> Result<Vec<Job>, StoreError>;

    /// All transitive descendants of a root job.
    fn jobs_by_root(&self, root: i64) -> Result<Vec<Job>, StoreError>;

    /// Top-level jobs (no parent).
    fn jobs_without_parent(&self) -> Result<Vec<Job>, StoreError>;

    /// Number of jobs matching every provided filter.
    fn count_jobs(
        &self,
        job_type: Option<&str>,
        host: Option<&str>,
        operation: Option<&str>,
        status: Option<JobStatus>,
    ) -> Result<u64, StoreError>;

    /// Number of FAILED jobs ever processed by the given service.
    fn failed_job_count(&self, processor: &ServiceKey) -> Result<u64, StoreError>;

    /// Average queue/run times over finished jobs of one (type, operation).
    fn average_times(&self, job_type: &str, operation: &str)
    -> Result<Option<JobAverages>, StoreError>;

    // ── Hosts ──

    /// Creates or replaces a host registration.
    fn upsert_host(&self, host: HostRegistration) -> Result<(), StoreError>;

    /// Looks a host up by base URL.
    fn host(&self, base_url: &str) -> Result<Option<HostRegistration>, StoreError>;

    /// All registered hosts.
    fn hosts(&self) -> Result<Vec<HostRegistration>, StoreError>;

    // ── Services ──

    /// Creates or replaces a service registration.
    fn upsert_service(&self, service: ServiceRegistration) -> Result<(), StoreError>;

    /// Looks a service up by (job type, host).
    fn service(&self, key: &ServiceKey) -> Result<Option<ServiceRegistration>, StoreError>;

    /// All service registrations.
    fn services(&self) -> Result<Vec<ServiceRegistration>, StoreError>;

    /// All online service registrations.
    fn online_services(&self) -> Result<Vec<ServiceRegistration>, StoreError>;

    /// Services of one job type.
    fn services_by_type(&self, job_type: &str) -> Result<Vec<ServiceRegistration>, StoreError>;

    /// Services published by one host.
    fn services_by_host(&self, host: &str) -> Result<Vec<ServiceRegistration>, StoreError>;

    /// WARNING services of a type whose warning trigger equals `signature`.
    fn warning_services_by_trigger(
        &self,
        job_type: &str,
        signature: u64,
    ) -> Result<Vec<ServiceRegistration>, StoreError>;

    /// Services of a type whose warning or error trigger equals `signature`.
    ///
    /// Always a `Vec`; no matches is an empty list.
    fn related_services_by_trigger(
        &self,
        job_type: &str,
        signature: u64,
    ) -> Result<Vec<ServiceRegistration>, StoreError>;

    /// Number of services not currently in the NORMAL state.
    fn count_services_not_normal(&self) -> Result<u64, StoreError>;
}

#[derive(Default)]
struct StoreState {
    next_job_id: i64,
    jobs: BTreeMap<i64, Job>,
    hosts: BTreeMap<String, HostRegistration>,
    services: BTreeMap<ServiceKey, ServiceRegistration>,
}

/// In-memory [`RegistryStore`].
///
/// All state lives behind one mutex, so each trait method is a transaction.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        Ok(self.state.lock()?)
    }
}

fn sorted_by_creation(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|a, b| a.date_created.cmp(&b.date_created).then(a.id.cmp(&b.id)));
    jobs
}

impl RegistryStore for MemoryStore {
    fn create_job(&self, mut job: Job) -> Result<Job, StoreError> {
        let mut state = self.lock()?;
        state.next_job_id += 1;
        job.id = state.next_job_id;
        job.version = 1;
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn job(&self, id: i64) -> Result<Option<Job>, StoreError> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    fn update_job(&self, job: &Job) -> Result<Job, StoreError> {
        let mut state = self.lock()?;
        let stored = state.jobs.get_mut(&job.id).ok_or(StoreError::JobMissing(job.id))?;
        if stored.version != job.version {
            return Err(StoreError::VersionConflict {
                id: job.id,
                snapshot: job.version,
            });
        }
        let mut updated = job.clone();
        updated.version = job.version + 1;
        *stored = updated.clone();
        Ok(updated)
    }

    fn delete_jobs(&self, ids: &[i64]) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        for id in ids {
            if !state.jobs.contains_key(id) {
                return Err(StoreError::JobMissing(*id));
            }
        }
        for id in ids {
            state.jobs.remove(id);
        }
        Ok(())
    }

    fn jobs_by_status(
        &self,
        job_type: Option<&str>,
        statuses: &[JobStatus],
    ) -> Result<Vec<Job>, StoreError> {
        let state = self.lock()?;
        Ok(sorted_by_creation(
            state
                .jobs
                .values()
                .filter(|job| statuses.contains(&job.status))
                .filter(|job| job_type.is_none_or(|t| job.job_type == t))
                .cloned()
                .collect(),
        ))
    }

    fn dispatchable_jobs(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, StoreError> {
        let state = self.lock()?;
        Ok(sorted_by_creation(
            state
                .jobs
                .values()
                .filter(|job| job.dispatchable && statuses.contains(&job.status))
                .cloned()
                .collect(),
        ))
    }

    fn jobs_on_processor(
        &self,
        processor: &ServiceKey,
        statuses: &[JobStatus],
    ) -> Result<Vec<Job>, StoreError> {
        let state = self.lock()?;
        Ok(sorted_by_creation(
            state
                .jobs
                .values()
                .filter(|job| statuses.contains(&job.status))
                .filter(|job| job.processor_service.as_ref() == Some(processor))
                .cloned()
                .collect(),
        ))
    }

    fn jobs_on_host(&self, host: &str, statuses: &[JobStatus]) -> Result<Vec<Job>, StoreError> {
        let state = self.lock()?;
        Ok(sorted_by_creation(
            state
                .jobs
                .values()
                .filter(|job| statuses.contains(&job.status))
                .filter(|job| {
                    job.processor_service
                        .as_ref()
                        .is_some_and(|key| key.host == host)
                })
                .cloned()
                .collect(),
        ))
    }

    fn direct_children(&self, parent: i64) -> Result<Vec<Job>, StoreError> {
        let state = self.lock()?;
        Ok(sorted_by_creation(
            state
                .jobs
                .values()
                .filter(|job| job.parent_id == Some(parent))
                .cloned()
                .collect(),
        ))
    }

    fn jobs_by_root(&self, root: i64) -> Result<Vec<Job>, StoreError> {
        let state = self.lock()?;
        Ok(sorted_by_creation(
            state
                .jobs
                .values()
                .filter(|job| job.root_id == Some(root))
                .cloned()
                .collect(),
        ))
    }

    fn jobs_without_parent(&self) -> Result<Vec<Job>, StoreError> {
        let state = self.lock()?;
        Ok(sorted_by_creation(
            state
                .jobs
                .values()
                .filter(|job| job.parent_id.is_none())
                .cloned()
                .collect(),
        ))
    }

    fn count_jobs(
        &self,
        job_type: Option<&str>,
        host: Option<&str>,
        operation: Option<&str>,
        status: Option<JobStatus>,
    ) -> Result<u64, StoreError> {
        let state = self.lock()?;
        Ok(state
            .jobs
            .values()
            .filter(|job| job_type.is_none_or(|t| job.job_type == t))
            .filter(|job| {
                host.is_none_or(|h| {
                    job.processor_service
                        .as_ref()
                        .is_some_and(|key| key.host == h)
                })
            })
            .filter(|job| operation.is_none_or(|o| job.operation == o))
            .filter(|job| status.is_none_or(|s| job.status == s))
            .count() as u64)
    }

    fn failed_job_count(&self, processor: &ServiceKey) -> Result<u64, StoreError> {
        let state = self.lock()?;
        Ok(state
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Failed)
            .filter(|job| job.processor_service.as_ref() == Some(processor))
            .count() as u64)
    }

    fn average_times(
        &self,
        job_type: &str,
        operation: &str,
    ) -> Result<Option<JobAverages>, StoreError> {
        let state = self.lock()?;
        let mut queue_total = 0i64;
        let mut run_total = 0i64;
        let mut samples = 0u64;
        for job in state.jobs.values() {
            if job.job_type != job_type
                || job.operation != operation
                || job.status != JobStatus::Finished
            {
                continue;
            }
            let (Some(queue), Some(run)) = (job.queue_time_ms, job.run_time_ms) else {
                continue;
            };
            queue_total += queue;
            run_total += run;
            samples += 1;
        }
        if samples == 0 {
            return Ok(None);
        }
        Ok(Some(JobAverages {
            queue_time_ms: queue_total as f64 / samples as f64,
            run_time_ms: run_total as f64 / samples as f64,
            samples,
        }))
    }

    fn upsert_host(&self, host: HostRegistration) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.hosts.insert(host.base_url.clone(), host);
        Ok(())
    }

    fn host(&self, base_url: &str) -> Result<Option<HostRegistration>, StoreError> {
        Ok(self.lock()?.hosts.get(base_url).cloned())
    }

    fn hosts(&self) -> Result<Vec<HostRegistration>, StoreError> {
        Ok(self.lock()?.hosts.values().cloned().collect())
    }

    fn upsert_service(&self, service: ServiceRegistration) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.services.insert(service.key(), service);
        Ok(())
    }

    fn service(&self, key: &ServiceKey) -> Result<Option<ServiceRegistration>, StoreError> {
        Ok(self.lock()?.services.get(key).cloned())
    }

    fn services(&self) -> Result<Vec<ServiceRegistration>, StoreError> {
        Ok(self.lock()?.services.values().cloned().collect())
    }

    fn online_services(&self) -> Result<Vec<ServiceRegistration>, StoreError> {
        Ok(self
            .lock()?
            .services
            .values()
            .filter(|service| service.online)
            .cloned()
            .collect())
    }

    fn services_by_type(&self, job_type: &str) -> Result<Vec<ServiceRegistration>, StoreError> {
        Ok(self
            .lock()?
            .services
            .values()
            .filter(|service| service.job_type == job_type)
            .cloned()
            .collect())
    }

    fn services_by_host(&self, host: &str) -> Result<Vec<ServiceRegistration>, StoreError> {
        Ok(self
            .lock()?
            .services
            .values()
            .filter(|service| service.host == host)
            .cloned()
            .collect())
    }

    fn warning_services_by_trigger(
        &self,
        job_type: &str,
        signature: u64,
    ) -> Result<Vec<ServiceRegistration>, StoreError> {
        Ok(self
            .lock()?
            .services
            .values()
            .filter(|service| service.job_type == job_type)
            .filter(|service| service.state == ServiceState::Warning)
            .filter(|service| service.warning_trigger == Some(signature))
            .cloned()
            .collect())
    }

    fn related_services_by_trigger(
        &self,
        job_type: &str,
        signature: u64,
    ) -> Result<Vec<ServiceRegistration>, StoreError> {
        Ok(self
            .lock()?
            .services
            .values()
            .filter(|service| service.job_type == job_type)
            .filter(|service| {
                (service.state == ServiceState::Warning
                    && service.warning_trigger == Some(signature))
                    || (service.state == ServiceState::Error
                        && service.error_trigger == Some(signature))
            })
            .cloned()
            .collect())
    }

    fn count_services_not_normal(&self) -> Result<u64, StoreError> {
        Ok(self
            .lock()?
            .services
            .values()
            .filter(|service| service.state != ServiceState::Normal)
            .count() as u64)
    }
}
