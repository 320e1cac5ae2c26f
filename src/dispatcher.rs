//! The periodic job dispatcher.
//!
//! Each round drains jobs awaiting execution, ranks candidate services by
//! host load, and hands jobs off to workers over HTTP. The round never
//! aborts: every per-job failure is logged and the next job is tried.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::client::{DispatchResponse, WorkerClient};
use crate::constants::{DISPATCHABLE_STATUSES, TYPE_WORKFLOW};
use crate::directory::{Directory, Organization, User};
use crate::error::{DispatchError, RegistryError, StoreError};
use crate::model::{FailureReason, Job, JobStatus, ServiceRegistration, SystemLoad};
use crate::registry::{CurrentJob, ServiceRegistry};
use crate::wire;

/// Periodic task that assigns queued jobs to workers.
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
    client: Arc<dyn WorkerClient>,
    directory: Arc<dyn Directory>,
}

impl Dispatcher {
    /// Creates a dispatcher over a registry, a worker client, and an
    /// identity directory.
    pub fn new(
        registry: Arc<ServiceRegistry>,
        client: Arc<dyn WorkerClient>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            registry,
            client,
            directory,
        }
    }

    /// Runs one dispatch round, swallowing and logging any top-level error
    /// so the periodic task never dies.
    pub fn tick(&self) {
        if let Err(err) = self.dispatch_round() {
            error!("Dispatch round failed: {err}");
        }
    }

    /// Runs one dispatch round. Returns the number of jobs handed off.
    pub fn dispatch_round(&self) -> Result<usize, RegistryError> {
        let mut jobs = self.registry.store().dispatchable_jobs(&DISPATCHABLE_STATUSES)?;
        if jobs.is_empty() {
            return Ok(0);
        }
        jobs.sort_by(dispatch_order);
        debug!("Found {} dispatchable job(s)", jobs.len());

        // (type, operation) pairs that proved undispatchable this round;
        // jobs sharing a pair are skipped until the next round.
        let mut undispatchable: HashSet<(String, String)> = HashSet::new();
        let mut load = self.registry.host_loads(true)?;
        let mut dispatched = 0;

        for job in jobs {
            let signature_key = (job.job_type.clone(), job.operation.clone());
            if undispatchable.contains(&signature_key) {
                debug!(
                    "Skipping job {}: {}:{} already proved undispatchable this round",
                    job.id, job.job_type, job.operation
                );
                continue;
            }
            match self.dispatch_one(&job, &mut load) {
                Ok(Some(host)) => {
                    info!("Dispatched job {} to {host}", job.id);
                    dispatched += 1;
                }
                Ok(None) => {}
                Err(DispatchError::ServiceUnavailable(job_type)) => {
                    warn!("No service of type '{job_type}' can take job {} right now", job.id);
                    // Workflow jobs are retried on every pass; everything
                    // else waits for the next round.
                    if job.job_type != TYPE_WORKFLOW {
                        undispatchable.insert(signature_key);
                    }
                }
                Err(DispatchError::Undispatchable { id, reason }) => {
                    debug!("Job {id} not dispatched: {reason}");
                }
                Err(DispatchError::Registry(err)) => {
                    warn!("Dispatching job {} failed: {err}", job.id);
                }
            }
        }
        Ok(dispatched)
    }

    fn dispatch_one(
        &self,
        job: &Job,
        load: &mut SystemLoad,
    ) -> Result<Option<String>, DispatchError> {
        let Some(organization) = self.directory.organization(&job.organization) else {
            warn!(
                "Skipping job {}: organization '{}' cannot be resolved",
                job.id, job.organization
            );
            return Ok(None);
        };
        let Some(user) = self.directory.user(&job.creator) else {
            warn!("Skipping job {}: user '{}' cannot be resolved", job.id, job.creator);
            return Ok(None);
        };

        // A root dispatch is capacity-limited. A child whose family has no
        // running member yet bypasses the capacity check, so a parent
        // occupying the budget can never starve its own first child into a
        // deadlock; once a sibling runs, capacity applies again.
        let root_dispatch = job.parent_id.is_none()
            || job.job_type == TYPE_WORKFLOW
            || self.parent_has_running_child(job)?;
        let candidates = if root_dispatch {
            self.registry.services_with_capacity(&job.job_type, load)?
        } else {
            self.registry.services_by_load(&job.job_type, load)?
        };

        let _guard = CurrentJob::enter(job.id);
        let host = self.hand_off(job, &candidates, &organization, &user)?;
        load.add(&host, job.job_load);
        Ok(Some(host))
    }

    fn parent_has_running_child(&self, job: &Job) -> Result<bool, RegistryError> {
        let Some(parent_id) = job.parent_id else {
            return Ok(false);
        };
        Ok(self
            .registry
            .store()
            .direct_children(parent_id)?
            .iter()
            .any(|child| child.status == JobStatus::Running))
    }

    /// Walks the candidate list until a worker accepts the job.
    fn hand_off(
        &self,
        job: &Job,
        candidates: &[ServiceRegistration],
        organization: &Organization,
        user: &User,
    ) -> Result<String, DispatchError> {
        if candidates.is_empty() {
            return Err(DispatchError::ServiceUnavailable(job.job_type.clone()));
        }

        // Claim the job before talking to anyone. Losing this write means
        // another dispatcher already owns the job.
        let mut claimed = job.clone();
        claimed.status = JobStatus::Dispatching;
        claimed.processor_service = Some(candidates[0].key());
        let mut claimed = match self.registry.update_job(claimed) {
            Ok(job) => job,
            Err(RegistryError::Store(StoreError::VersionConflict { .. })) => {
                return Err(DispatchError::Undispatchable {
                    id: job.id,
                    reason: "claimed by another dispatcher".into(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        for candidate in candidates {
            if claimed.processor_service.as_ref() != Some(&candidate.key()) {
                claimed.processor_service = Some(candidate.key());
                claimed = self.registry.update_job(claimed)?;
            }
            let xml = match wire::to_xml(&claimed) {
                Ok(xml) => xml,
                Err(err) => {
                    self.requeue(claimed);
                    return Err(DispatchError::Undispatchable {
                        id: job.id,
                        reason: format!("job cannot be serialized: {err}"),
                    });
                }
            };

            let url = candidate.dispatch_url();
            match self.client.dispatch(&url, &organization.id, &user.username, &xml) {
                Ok(DispatchResponse::Accepted) => {
                    self.registry.notify_dispatched(&claimed);
                    return Ok(candidate.host.clone());
                }
                Ok(DispatchResponse::Refused) => {
                    debug!("{url} refuses more work; trying the next candidate");
                }
                Ok(DispatchResponse::NotReady) => {
                    debug!("{url} is not serving yet; trying the next candidate");
                }
                Ok(DispatchResponse::Rejected) => {
                    // The job itself is unacceptable and will never be
                    // accepted by anyone; the input is at fault, not the
                    // worker we asked.
                    claimed.status = JobStatus::Failed;
                    claimed.failure_reason = Some(FailureReason::Data);
                    self.registry.update_job(claimed)?;
                    return Err(DispatchError::Undispatchable {
                        id: job.id,
                        reason: format!("permanently rejected by {url}"),
                    });
                }
                Ok(DispatchResponse::Other(code)) => {
                    warn!("{url} answered {code} for job {}; trying the next candidate", job.id);
                }
                Err(err) => {
                    warn!("Dispatch of job {} to {url} failed: {err}", job.id);
                }
            }
        }

        // Every candidate was tried and none accepted.
        self.requeue(claimed);
        Err(DispatchError::Undispatchable {
            id: job.id,
            reason: "every candidate was tried".into(),
        })
    }

    fn requeue(&self, mut claimed: Job) {
        let id = claimed.id;
        claimed.status = JobStatus::Queued;
        claimed.processor_service = None;
        if let Err(err) = self.registry.update_job(claimed) {
            warn!("Failed to restore job {id} to QUEUED: {err}");
        }
    }
}

/// Dispatch precedence: RESTART before QUEUED, non-workflow before
/// workflow, oldest first.
fn dispatch_order(a: &Job, b: &Job) -> Ordering {
    let restart_rank = |job: &Job| u8::from(job.status != JobStatus::Restart);
    let workflow_rank = |job: &Job| u8::from(job.job_type == TYPE_WORKFLOW);
    restart_rank(a)
        .cmp(&restart_rank(b))
        .then(workflow_rank(a).cmp(&workflow_rank(b)))
        .then(a.date_created.cmp(&b.date_created))
}
