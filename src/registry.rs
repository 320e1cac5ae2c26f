//! The service registry: hosts, services, jobs, and load accounting.
//!
//! [`ServiceRegistry`] is the public API of the node. Registration events,
//! job lifecycle calls, and the periodic tasks all go through it; the
//! persistence engine stays behind the [`RegistryStore`] trait.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

use crate::constants::{
    LOAD_STATUSES, OP_START_OPERATION, ORPHAN_STATUSES, PROTECTED_OPERATIONS, SWEEP_STATUSES,
    TYPE_WORKFLOW,
};
use crate::error::{RegistryError, StoreError};
use crate::health;
use crate::model::{
    HostLoad, HostRegistration, Job, JobStatus, ServiceKey, ServiceRegistration, ServiceState,
    SystemLoad,
};
use crate::stats::JobObserver;
use crate::store::RegistryStore;

thread_local! {
    static CURRENT_JOB: Cell<Option<i64>> = const { Cell::new(None) };
}

/// RAII guard marking the job the current thread is working on.
///
/// While a guard is alive, [`ServiceRegistry::create_job`] treats the
/// marked job as the parent of any job created without an explicit one, so
/// child jobs inherit their family without plumbing ids through every call.
pub struct CurrentJob {
    previous: Option<i64>,
}

impl CurrentJob {
    /// Marks `id` as the current job until the guard is dropped.
    pub fn enter(id: i64) -> Self {
        let previous = CURRENT_JOB.replace(Some(id));
        Self { previous }
    }

    /// The job the current thread is working on, if any.
    pub fn get() -> Option<i64> {
        CURRENT_JOB.get()
    }
}

impl Drop for CurrentJob {
    fn drop(&mut self) {
        CURRENT_JOB.set(self.previous);
    }
}

/// Parameters for creating a job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Base URL of the host the creating service runs on.
    pub host: String,
    /// Job type; a service registration for (type, host) must exist.
    pub job_type: String,
    /// Operation to perform.
    pub operation: String,
    /// Ordered operation arguments.
    pub arguments: Vec<String>,
    /// Opaque payload.
    pub payload: Option<String>,
    /// Whether the dispatcher selects the execution host.
    pub dispatchable: bool,
    /// Explicit parent job; falls back to the thread's current job.
    pub parent: Option<i64>,
    /// Load factor of the job.
    pub job_load: f32,
    /// Creating user.
    pub creator: String,
    /// Owning organization.
    pub organization: String,
}

impl JobRequest {
    /// A dispatchable request with default load and no arguments.
    pub fn new(
        host: impl Into<String>,
        job_type: impl Into<String>,
        operation: impl Into<String>,
        creator: impl Into<String>,
        organization: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            job_type: job_type.into(),
            operation: operation.into(),
            arguments: Vec::new(),
            payload: None,
            dispatchable: true,
            parent: None,
            job_load: 1.0,
            creator: creator.into(),
            organization: organization.into(),
        }
    }

    /// Sets the operation arguments.
    pub fn with_arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Pins the job to its creator instead of dispatching it.
    pub fn pinned(mut self) -> Self {
        self.dispatchable = false;
        self
    }

    /// Sets an explicit parent job.
    pub fn with_parent(mut self, parent: i64) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the job's load factor.
    pub fn with_load(mut self, job_load: f32) -> Self {
        self.job_load = job_load;
        self
    }
}

/// Registry of hosts, services, and jobs for one cluster.
pub struct ServiceRegistry {
    store: Arc<dyn RegistryStore>,
    max_attempts: u32,
    observers: Mutex<Vec<Arc<dyn JobObserver>>>,
}

impl ServiceRegistry {
    /// Creates a registry over a store. `max_attempts` is the number of
    /// recorded failures after which a WARNING service moves to ERROR.
    pub fn new(store: Arc<dyn RegistryStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
            observers: Mutex::new(Vec::new()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    /// Registers an observer notified after committed status changes and
    /// accepted hand-offs.
    pub fn add_observer(&self, observer: Arc<dyn JobObserver>) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(observer);
        }
    }

    fn notify_observers(&self, job: &Job) {
        let observers = match self.observers.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        for observer in observers {
            observer.job_updated(job);
        }
    }

    /// Tells observers a worker accepted this job.
    pub(crate) fn notify_dispatched(&self, job: &Job) {
        let observers = match self.observers.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        for observer in observers {
            observer.job_dispatched(job);
        }
    }

    // ── Hosts ──

    /// Registers a host, or brings an existing registration back online
    /// with updated facts.
    pub fn register_host(
        &self,
        base_url: &str,
        address: &str,
        memory: u64,
        cores: u32,
        max_load: f32,
    ) -> Result<(), RegistryError> {
        if base_url.trim().is_empty() {
            return Err(RegistryError::InvalidArgument("host base URL must not be blank".into()));
        }
        let host = match self.store.host(base_url)? {
            Some(mut existing) => {
                existing.address = address.to_string();
                existing.memory = memory;
                existing.cores = cores;
                existing.max_load = max_load;
                existing.online = true;
                existing
            }
            None => HostRegistration {
                base_url: base_url.to_string(),
                address: address.to_string(),
                memory,
                cores,
                max_load,
                online: true,
                active: true,
                maintenance: false,
            },
        };
        self.store.upsert_host(host)?;
        info!("Registered host {base_url} (cores={cores}, max_load={max_load})");
        Ok(())
    }

    /// Takes a host offline and unregisters every service it publishes.
    pub fn unregister_host(&self, base_url: &str) -> Result<(), RegistryError> {
        let mut host = self
            .store
            .host(base_url)?
            .ok_or_else(|| RegistryError::HostNotFound(base_url.to_string()))?;
        host.online = false;
        self.store.upsert_host(host)?;

        for service in self.store.services_by_host(base_url)? {
            if service.online {
                self.unregister_service(&service.job_type, base_url)?;
            }
        }
        info!("Unregistered host {base_url}");
        Ok(())
    }

    /// Re-enables a host and every service it publishes.
    pub fn enable_host(&self, base_url: &str) -> Result<(), RegistryError> {
        self.set_host_active(base_url, true)
    }

    /// Administratively disables a host and every service it publishes.
    pub fn disable_host(&self, base_url: &str) -> Result<(), RegistryError> {
        self.set_host_active(base_url, false)
    }

    fn set_host_active(&self, base_url: &str, active: bool) -> Result<(), RegistryError> {
        let mut host = self
            .store
            .host(base_url)?
            .ok_or_else(|| RegistryError::HostNotFound(base_url.to_string()))?;
        host.active = active;
        self.store.upsert_host(host)?;
        for mut service in self.store.services_by_host(base_url)? {
            service.active = active;
            self.store.upsert_service(service)?;
        }
        info!(
            "Host {base_url} {}",
            if active { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Puts a host into or takes it out of maintenance mode.
    pub fn set_maintenance(&self, base_url: &str, maintenance: bool) -> Result<(), RegistryError> {
        let mut host = self
            .store
            .host(base_url)?
            .ok_or_else(|| RegistryError::HostNotFound(base_url.to_string()))?;
        host.maintenance = maintenance;
        self.store.upsert_host(host)?;
        info!(
            "Host {base_url} {} maintenance mode",
            if maintenance { "entered" } else { "left" }
        );
        Ok(())
    }

    // ── Services ──

    /// Registers a service on a host, or brings an existing registration
    /// back online. Re-registration sweeps jobs stuck on the old instance.
    pub fn register_service(
        &self,
        job_type: &str,
        base_url: &str,
        path: &str,
        job_producer: bool,
    ) -> Result<ServiceRegistration, RegistryError> {
        if job_type.trim().is_empty() || path.trim().is_empty() {
            return Err(RegistryError::InvalidArgument(
                "service type and path must not be blank".into(),
            ));
        }
        let host = self
            .store
            .host(base_url)?
            .ok_or_else(|| RegistryError::HostNotFound(base_url.to_string()))?;
        let key = ServiceKey::new(job_type, base_url);

        let service = match self.store.service(&key)? {
            Some(mut existing) => {
                // A re-registration means the previous instance is gone; its
                // in-flight jobs will never report back.
                self.clean_running_jobs(&key)?;
                existing.path = path.to_string();
                existing.job_producer = job_producer;
                existing.online = true;
                existing
            }
            None => ServiceRegistration {
                job_type: job_type.to_string(),
                host: base_url.to_string(),
                path: path.to_string(),
                online: true,
                active: host.active,
                job_producer,
                state: ServiceState::Normal,
                state_changed: Utc::now(),
                warning_trigger: None,
                error_trigger: None,
            },
        };
        self.store.upsert_service(service.clone())?;
        info!("Registered service {key}");
        Ok(service)
    }

    /// Takes a service offline and sweeps its in-flight jobs.
    pub fn unregister_service(&self, job_type: &str, base_url: &str) -> Result<(), RegistryError> {
        let key = ServiceKey::new(job_type, base_url);
        let mut service = self
            .store
            .service(&key)?
            .ok_or_else(|| RegistryError::ServiceNotFound {
                job_type: job_type.to_string(),
                host: base_url.to_string(),
            })?;
        service.online = false;
        self.store.upsert_service(service)?;
        self.clean_running_jobs(&key)?;
        info!("Unregistered service {key}");
        Ok(())
    }

    /// Flips a service's online flag without sweeping its jobs.
    pub fn set_service_online(&self, key: &ServiceKey, online: bool) -> Result<(), RegistryError> {
        let mut service =
            self.store
                .service(key)?
                .ok_or_else(|| RegistryError::ServiceNotFound {
                    job_type: key.job_type.clone(),
                    host: key.host.clone(),
                })?;
        service.online = online;
        self.store.upsert_service(service)?;
        Ok(())
    }

    /// Administratively resets a service to NORMAL, clearing its triggers.
    pub fn sanitize(&self, job_type: &str, base_url: &str) -> Result<(), RegistryError> {
        let key = ServiceKey::new(job_type, base_url);
        let mut service =
            self.store
                .service(&key)?
                .ok_or_else(|| RegistryError::ServiceNotFound {
                    job_type: job_type.to_string(),
                    host: base_url.to_string(),
                })?;
        service.state = ServiceState::Normal;
        service.warning_trigger = None;
        service.error_trigger = None;
        service.state_changed = Utc::now();
        self.store.upsert_service(service)?;
        info!("Service {key} sanitized to NORMAL");
        Ok(())
    }

    // ── Job lifecycle ──

    /// Creates a job on behalf of the service `(job_type, host)`.
    pub fn create_job(&self, request: JobRequest) -> Result<Job, RegistryError> {
        if request.job_type.trim().is_empty() {
            return Err(RegistryError::InvalidArgument("job type must not be blank".into()));
        }
        if request.operation.trim().is_empty() {
            return Err(RegistryError::InvalidArgument("operation must not be blank".into()));
        }
        if !request.job_load.is_finite() || request.job_load < 0.0 {
            return Err(RegistryError::InvalidArgument(format!(
                "job load {} must be a non-negative number",
                request.job_load
            )));
        }

        let creator_key = ServiceKey::new(request.job_type.clone(), request.host.clone());
        if self.store.service(&creator_key)?.is_none() {
            return Err(RegistryError::ServiceNotFound {
                job_type: request.job_type.clone(),
                host: request.host.clone(),
            });
        }
        if let Some(host) = self.store.host(&request.host)? {
            if host.maintenance {
                warn!(
                    "Creating a job from {creator_key} whose host is in maintenance mode"
                );
            }
            if !host.active {
                warn!("Creating a job from {creator_key} whose host is disabled");
            }
        }

        let parent_id = request.parent.or_else(CurrentJob::get);
        let root_id = match parent_id {
            Some(parent_id) => {
                let parent = self
                    .store
                    .job(parent_id)?
                    .ok_or(RegistryError::JobNotFound(parent_id))?;
                Some(parent.root_id.unwrap_or(parent.id))
            }
            None => None,
        };

        let (status, processor) = if request.dispatchable {
            (JobStatus::Queued, None)
        } else {
            (JobStatus::Instantiated, Some(creator_key.clone()))
        };

        let job = Job {
            id: 0,
            job_type: request.job_type,
            operation: request.operation,
            arguments: request.arguments,
            payload: request.payload,
            status,
            failure_reason: None,
            version: 0,
            dispatchable: request.dispatchable,
            job_load: request.job_load,
            creator: request.creator,
            organization: request.organization,
            creator_service: creator_key,
            processor_service: processor,
            parent_id,
            root_id,
            date_created: Utc::now(),
            date_started: None,
            date_completed: None,
            queue_time_ms: None,
            run_time_ms: None,
            blocking_job: None,
            blocked_jobs: Vec::new(),
        };
        let job = self.store.create_job(job)?;
        debug!("Created job {} ({}:{})", job.id, job.job_type, job.operation);
        Ok(job)
    }

    /// Merges a caller's view of a job into the stored row and commits it
    /// under the optimistic version check.
    ///
    /// Timestamps are server-owned and derived from the status transition.
    /// Status changes of non-workflow jobs are handed to the service-health
    /// state machine after the write commits.
    pub fn update_job(&self, incoming: Job) -> Result<Job, RegistryError> {
        let stored = self
            .store
            .job(incoming.id)?
            .ok_or(RegistryError::JobNotFound(incoming.id))?;

        let mut merged = stored.clone();
        merged.operation = incoming.operation;
        merged.arguments = incoming.arguments;
        merged.payload = incoming.payload;
        merged.status = incoming.status;
        merged.failure_reason = incoming.failure_reason;
        merged.dispatchable = incoming.dispatchable;
        merged.job_load = incoming.job_load;
        merged.processor_service = incoming.processor_service;
        merged.blocking_job = incoming.blocking_job;
        merged.blocked_jobs = incoming.blocked_jobs;
        merged.version = incoming.version;
        apply_timestamps(&mut merged);

        let updated = self.store.update_job(&merged)?;
        let status_changed = stored.status != updated.status;
        if status_changed && updated.job_type != TYPE_WORKFLOW {
            health::on_job_update(self.store.as_ref(), self.max_attempts, &updated)?;
        }
        if status_changed {
            self.notify_observers(&updated);
        }
        Ok(updated)
    }

    /// Deletes a job and every descendant.
    pub fn remove_job(&self, id: i64) -> Result<(), RegistryError> {
        if self.store.job(id)?.is_none() {
            return Err(RegistryError::JobNotFound(id));
        }
        let mut ids = Vec::new();
        self.collect_tree(id, &mut ids)?;
        self.store.delete_jobs(&ids)?;
        debug!("Removed job {id} and {} descendant(s)", ids.len() - 1);
        Ok(())
    }

    fn collect_tree(&self, id: i64, out: &mut Vec<i64>) -> Result<(), RegistryError> {
        for child in self.store.direct_children(id)? {
            self.collect_tree(child.id, out)?;
        }
        out.push(id);
        Ok(())
    }

    /// Prunes terminal top-level jobs older than `lifetime_days`, sparing
    /// the protected workflow operations. Returns the number of job trees
    /// removed.
    pub fn remove_parentless_jobs(&self, lifetime_days: u64) -> Result<usize, RegistryError> {
        let cutoff = Utc::now() - chrono::Duration::days(lifetime_days as i64);
        let mut removed = 0;
        for job in self.store.jobs_without_parent()? {
            if !job.status.is_terminal() {
                continue;
            }
            if PROTECTED_OPERATIONS.contains(&job.operation.as_str()) {
                continue;
            }
            if job.date_created >= cutoff {
                continue;
            }
            self.remove_job(job.id)?;
            removed += 1;
        }
        if removed > 0 {
            info!("Pruned {removed} parentless job(s) older than {lifetime_days} day(s)");
        }
        Ok(removed)
    }

    /// Looks a job up by id.
    pub fn job(&self, id: i64) -> Result<Job, RegistryError> {
        self.store.job(id)?.ok_or(RegistryError::JobNotFound(id))
    }

    /// Jobs matching an optional type and status filter.
    pub fn jobs(
        &self,
        job_type: Option<&str>,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, RegistryError> {
        let statuses: Vec<JobStatus> = match status {
            Some(status) => vec![status],
            None => JobStatus::iter().collect(),
        };
        Ok(self.store.jobs_by_status(job_type, &statuses)?)
    }

    /// All transitive descendants of a job.
    pub fn child_jobs(&self, id: i64) -> Result<Vec<Job>, RegistryError> {
        let job = self.job(id)?;
        if job.root_id.is_none() {
            return Ok(self.store.jobs_by_root(id)?);
        }
        let mut out = Vec::new();
        self.collect_children(id, &mut out)?;
        Ok(out)
    }

    fn collect_children(&self, id: i64, out: &mut Vec<Job>) -> Result<(), RegistryError> {
        for child in self.store.direct_children(id)? {
            let child_id = child.id;
            out.push(child);
            self.collect_children(child_id, out)?;
        }
        Ok(())
    }

    /// Number of jobs matching every provided filter.
    pub fn count_jobs(
        &self,
        job_type: Option<&str>,
        host: Option<&str>,
        operation: Option<&str>,
        status: Option<JobStatus>,
    ) -> Result<u64, RegistryError> {
        Ok(self.store.count_jobs(job_type, host, operation, status)?)
    }

    // ── Load accounting and candidate selection ──

    /// Computes the per-host load snapshot.
    ///
    /// Jobs in load-influencing statuses contribute their load factor to
    /// their processor's host, except workflow-typed processors, which
    /// schedule themselves. With `active_only`, services that are offline
    /// or whose host is in maintenance contribute nothing. Every
    /// registered host is present in the result.
    pub fn host_loads(&self, active_only: bool) -> Result<SystemLoad, RegistryError> {
        let hosts = self.store.hosts()?;
        let mut load = SystemLoad::default();
        let mut maintenance = HashMap::new();
        for host in &hosts {
            load.insert(
                host.base_url.clone(),
                HostLoad {
                    current: 0.0,
                    max: host.max_load,
                },
            );
            maintenance.insert(host.base_url.clone(), host.maintenance);
        }

        for job in self.store.jobs_by_status(None, &LOAD_STATUSES)? {
            let Some(processor) = job.processor_service.clone() else {
                continue;
            };
            if processor.job_type == TYPE_WORKFLOW {
                continue;
            }
            if active_only {
                let Some(service) = self.store.service(&processor)? else {
                    continue;
                };
                let host_in_maintenance =
                    maintenance.get(&processor.host).copied().unwrap_or(true);
                if !service.online || host_in_maintenance {
                    continue;
                }
            }
            load.add(&processor.host, job.job_load);
        }
        Ok(load)
    }

    /// Healthy candidates for a job type, cheapest host first, ignoring
    /// host capacity.
    pub fn services_by_load(
        &self,
        job_type: &str,
        load: &SystemLoad,
    ) -> Result<Vec<ServiceRegistration>, RegistryError> {
        self.candidates(job_type, load, false)
    }

    /// Healthy candidates for a job type, cheapest host first, restricted
    /// to hosts with remaining capacity.
    pub fn services_with_capacity(
        &self,
        job_type: &str,
        load: &SystemLoad,
    ) -> Result<Vec<ServiceRegistration>, RegistryError> {
        self.candidates(job_type, load, true)
    }

    fn candidates(
        &self,
        job_type: &str,
        load: &SystemLoad,
        require_capacity: bool,
    ) -> Result<Vec<ServiceRegistration>, RegistryError> {
        let mut hosts = HashMap::new();
        for host in self.store.hosts()? {
            hosts.insert(host.base_url.clone(), host);
        }
        let mut services: Vec<ServiceRegistration> = self
            .store
            .services_by_type(job_type)?
            .into_iter()
            .filter(|service| {
                service.online && service.active && service.state != ServiceState::Error
            })
            .filter(|service| {
                hosts
                    .get(&service.host)
                    .is_some_and(|host| host.online && host.active && !host.maintenance)
            })
            .filter(|service| {
                !require_capacity
                    || load.get(&service.host).is_some_and(|entry| entry.has_capacity())
            })
            .collect();
        services.sort_by(|a, b| load.current(&a.host).total_cmp(&load.current(&b.host)));
        Ok(services)
    }

    // ── Sweeps and recovery ──

    /// Handles jobs stranded on a service whose registration churned.
    ///
    /// Dispatchable jobs are sent back to the queue as RESTART after their
    /// children are canceled; if the family root is PAUSED, the root itself
    /// is restarted at its current operation instead. Non-dispatchable jobs
    /// are failed, since no other service can execute them.
    fn clean_running_jobs(&self, processor: &ServiceKey) -> Result<(), RegistryError> {
        for candidate in self.store.jobs_on_processor(processor, &SWEEP_STATUSES)? {
            // Re-read: an earlier family sweep in this loop may have
            // already canceled this job.
            let Some(job) = self.store.job(candidate.id)? else {
                continue;
            };
            if !SWEEP_STATUSES.contains(&job.status) {
                continue;
            }
            let outcome = if job.dispatchable {
                self.reset_dispatchable_job(job)
            } else {
                warn!(
                    "Failing job {} pinned to vanished service {processor}",
                    job.id
                );
                self.transition(job, JobStatus::Failed).map(|_| ())
            };
            match outcome {
                Err(RegistryError::Store(StoreError::VersionConflict { id, .. })) => {
                    warn!("Job {id} changed while being swept; leaving it alone");
                }
                other => other?,
            }
        }
        Ok(())
    }

    fn reset_dispatchable_job(&self, job: Job) -> Result<(), RegistryError> {
        let job_id = job.id;
        if let Some(root_id) = job.root_id
            && root_id != job.id
            && let Some(root) = self.store.job(root_id)?
            && root.status == JobStatus::Paused
        {
            self.cancel_descendants(root.id)?;
            let mut root = self
                .store
                .job(root_id)?
                .ok_or(RegistryError::JobNotFound(root_id))?;
            root.operation = OP_START_OPERATION.to_string();
            root.processor_service = None;
            self.transition(root, JobStatus::Restart)?;
            info!("Restarted paused family root {root_id} after losing job {job_id}");
        } else {
            self.cancel_descendants(job.id)?;
            let mut job = job;
            job.processor_service = None;
            self.transition(job, JobStatus::Restart)?;
            info!("Job {job_id} queued for restart");
        }
        Ok(())
    }

    fn cancel_descendants(&self, parent: i64) -> Result<(), RegistryError> {
        for child in self.store.direct_children(parent)? {
            self.cancel_descendants(child.id)?;
            if !child.status.is_terminal() {
                self.transition(child, JobStatus::Canceled)?;
            }
        }
        Ok(())
    }

    /// Cancels jobs stranded on a host that did not shut down cleanly.
    /// Returns the number of jobs canceled.
    pub fn clean_orphaned_jobs(&self, host: &str) -> Result<usize, RegistryError> {
        let mut canceled = 0;
        for job in self.store.jobs_on_host(host, &ORPHAN_STATUSES)? {
            warn!("Canceling job {} orphaned on {host}", job.id);
            self.transition(job, JobStatus::Canceled)?;
            canceled += 1;
        }
        Ok(canceled)
    }

    /// Commits a status change directly, without the health-machine
    /// hand-off. Used by sweeps, where failures say nothing about the
    /// health of the service.
    fn transition(&self, mut job: Job, status: JobStatus) -> Result<Job, RegistryError> {
        job.status = status;
        apply_timestamps(&mut job);
        let updated = self.store.update_job(&job)?;
        self.notify_observers(&updated);
        Ok(updated)
    }
}

/// Derives the server-owned timestamps from a status transition.
fn apply_timestamps(job: &mut Job) {
    let now = Utc::now();
    if job.status == JobStatus::Running && job.date_started.is_none() {
        job.date_started = Some(now);
        job.queue_time_ms = Some((now - job.date_created).num_milliseconds());
    }
    if job.status.is_terminal() && job.date_completed.is_none() {
        job.date_completed = Some(now);
        if job.status == JobStatus::Finished && job.date_started.is_none() {
            // The service completed the job without ever reporting RUNNING.
            job.date_started = Some(now);
            job.queue_time_ms = Some((now - job.date_created).num_milliseconds());
        }
        if let Some(started) = job.date_started {
            job.run_time_ms = Some((now - started).num_milliseconds());
        }
    }
}
