//! Service-health state machine.
//!
//! Every terminal job outcome feeds back into the health state of the
//! service that processed it, keyed by the job's signature. A signature
//! that fails once puts its service in WARNING; repeated failures escalate
//! to ERROR; the same signature succeeding elsewhere proves the signature
//! itself is fine and pins the blame on the earlier service. ERROR services
//! stay registered but are excluded from dispatch.
//!
//! Failures marked [`FailureReason::Data`] are caused by the input, not the
//! service, and are ignored here.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::model::{FailureReason, Job, JobStatus, ServiceRegistration, ServiceState};
use crate::store::RegistryStore;

/// Feeds a committed job status change into the state machine.
pub fn on_job_update(
    store: &dyn RegistryStore,
    max_attempts: u32,
    job: &Job,
) -> Result<(), RegistryError> {
    match job.status {
        JobStatus::Failed => on_failure(store, max_attempts, job),
        JobStatus::Finished => on_success(store, job),
        _ => Ok(()),
    }
}

fn on_failure(
    store: &dyn RegistryStore,
    max_attempts: u32,
    job: &Job,
) -> Result<(), RegistryError> {
    if job.failure_reason == Some(FailureReason::Data) {
        debug!(
            "Job {} failed on its input data; service state unchanged",
            job.id
        );
        return Ok(());
    }
    let Some(processor) = &job.processor_service else {
        return Ok(());
    };
    let Some(current) = store.service(processor)? else {
        return Ok(());
    };
    let signature = job.signature();

    // Other services already implicated by this signature. The processor
    // itself is not "related": its own warning trigger must not mask the
    // escalation below.
    let related: Vec<ServiceRegistration> = store
        .related_services_by_trigger(&job.job_type, signature)?
        .into_iter()
        .filter(|service| service.key() != current.key())
        .collect();
    if !related.is_empty() {
        // The signature is already implicated elsewhere, so the earlier
        // suspects are (partially) exonerated by this new failure.
        for service in related {
            match service.state {
                ServiceState::Warning => {
                    info!(
                        "Forgiving service {}: signature {signature:x} also fails elsewhere",
                        service.key()
                    );
                    commit(store, service, ServiceState::Normal, Trigger::Keep)?;
                }
                ServiceState::Error => {
                    info!(
                        "Demoting service {} from ERROR to WARNING: signature {signature:x} \
                         also fails elsewhere",
                        service.key()
                    );
                    // The service falls back to the trigger that first put
                    // it into WARNING.
                    commit(store, service, ServiceState::Warning, Trigger::Keep)?;
                }
                ServiceState::Normal => {}
            }
        }
        return Ok(());
    }

    // First failure of this signature anywhere.
    match current.state {
        ServiceState::Normal => {
            warn!(
                "Service {} entered WARNING on signature {signature:x}",
                current.key()
            );
            commit(store, current, ServiceState::Warning, Trigger::Warning(signature))?;
        }
        ServiceState::Warning => {
            let failures = store.failed_job_count(&current.key())?;
            if failures >= max_attempts as u64 {
                warn!(
                    "Service {} entered ERROR after {failures} failure(s) \
                     (signature {signature:x}); excluding it from dispatch",
                    current.key()
                );
                commit(store, current, ServiceState::Error, Trigger::Error(signature))?;
            }
        }
        ServiceState::Error => {}
    }
    Ok(())
}

fn on_success(store: &dyn RegistryStore, job: &Job) -> Result<(), RegistryError> {
    let signature = job.signature();
    let Some(processor) = &job.processor_service else {
        return Ok(());
    };

    if let Some(current) = store.service(processor)?
        && current.state == ServiceState::Warning
    {
        info!("Service {} recovered to NORMAL", current.key());
        commit(store, current, ServiceState::Normal, Trigger::Keep)?;
    }

    // The signature works here, so a service still warning about it is
    // definitively at fault.
    for service in store.warning_services_by_trigger(&job.job_type, signature)? {
        if &service.key() == processor {
            continue;
        }
        warn!(
            "Service {} entered ERROR: signature {signature:x} succeeded on {processor}",
            service.key()
        );
        commit(store, service, ServiceState::Error, Trigger::Error(signature))?;
    }
    Ok(())
}

enum Trigger {
    /// Leave both triggers as they are.
    Keep,
    /// Record the signature that caused the WARNING.
    Warning(u64),
    /// Record the signature that caused the ERROR.
    Error(u64),
}

fn commit(
    store: &dyn RegistryStore,
    mut service: ServiceRegistration,
    state: ServiceState,
    trigger: Trigger,
) -> Result<(), RegistryError> {
    service.state = state;
    service.state_changed = Utc::now();
    match trigger {
        Trigger::Keep => {}
        Trigger::Warning(signature) => service.warning_trigger = Some(signature),
        Trigger::Error(signature) => service.error_trigger = Some(signature),
    }
    store.upsert_service(service)?;
    Ok(())
}
