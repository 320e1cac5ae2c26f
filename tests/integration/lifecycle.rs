#[path = "common/mod.rs"]
mod common;

use chrono::{Duration, Utc};
use common::{ORG, USER, node};
use mediagrid::{
    error::RegistryError,
    model::{JobStatus, ServiceKey},
    registry::JobRequest,
    store::RegistryStore,
};

#[test]
fn creation_honors_the_dispatchable_invariant() {
    let node = node();
    node.host("http://h1", 4.0);
    node.service("svcA", "http://h1", "/a");

    let queued = node.queue_job("http://h1", "svcA", "run", 1.0);
    assert_eq!(queued.status, JobStatus::Queued);
    assert!(queued.processor_service.is_none());
    assert_eq!(queued.version, 1);

    let pinned = node
        .registry
        .create_job(JobRequest::new("http://h1", "svcA", "run", USER, ORG).pinned())
        .expect("create pinned");
    assert_eq!(pinned.status, JobStatus::Instantiated);
    assert_eq!(pinned.processor_service, Some(ServiceKey::new("svcA", "http://h1")));
}

#[test]
fn creation_proceeds_with_a_warning_on_a_maintenance_host() {
    let node = node();
    node.host("http://h1", 4.0);
    node.service("svcA", "http://h1", "/a");
    node.registry.set_maintenance("http://h1", true).expect("maintenance");

    let job = node.queue_job("http://h1", "svcA", "run", 1.0);
    assert_eq!(job.status, JobStatus::Queued);
}

#[test]
fn blocking_information_round_trips_through_updates() {
    let node = node();
    node.host("http://h1", 4.0);
    node.service("svcA", "http://h1", "/a");

    let blocker = node.queue_job("http://h1", "svcA", "run", 1.0);
    let mut blocked = node.queue_job("http://h1", "svcA", "run", 1.0);

    blocked.status = JobStatus::Waiting;
    blocked.blocking_job = Some(blocker.id);
    let blocked = node.registry.update_job(blocked).expect("block");
    assert_eq!(blocked.blocking_job, Some(blocker.id));

    let mut blocker = node.registry.job(blocker.id).expect("blocker");
    blocker.blocked_jobs = vec![blocked.id];
    let blocker = node.registry.update_job(blocker).expect("record blocked");
    assert_eq!(node.registry.job(blocker.id).unwrap().blocked_jobs, vec![blocked.id]);
}

#[test]
fn payload_and_arguments_merge_on_update() {
    let node = node();
    node.host("http://h1", 4.0);
    node.service("svcA", "http://h1", "/a");

    let mut job = node.queue_job("http://h1", "svcA", "run", 1.0);
    job.payload = Some("progress".into());
    job.arguments = vec!["rewritten".into()];
    let updated = node.registry.update_job(job).expect("update");

    let stored = node.registry.job(updated.id).expect("job");
    assert_eq!(stored.payload.as_deref(), Some("progress"));
    assert_eq!(stored.arguments, vec!["rewritten".to_string()]);
    assert_eq!(stored.version, 2);
}

#[test]
fn stale_updates_are_rejected() {
    let node = node();
    node.host("http://h1", 4.0);
    node.service("svcA", "http://h1", "/a");

    let job = node.queue_job("http://h1", "svcA", "run", 1.0);
    let mut first = job.clone();
    first.status = JobStatus::Running;
    node.registry.update_job(first).expect("first writer");

    let mut second = job;
    second.status = JobStatus::Canceled;
    let err = node.registry.update_job(second).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Store(mediagrid::error::StoreError::VersionConflict { .. })
    ));
}

#[test]
fn queue_and_run_times_are_derived_from_transitions() {
    let node = node();
    node.host("http://h1", 4.0);
    node.service("svcA", "http://h1", "/a");

    let mut job = node.queue_job("http://h1", "svcA", "run", 1.0);
    job.status = JobStatus::Running;
    let mut job = node.registry.update_job(job).expect("start");
    let started = job.date_started.expect("started");
    assert!(job.queue_time_ms.expect("queue time") >= 0);

    job.status = JobStatus::Finished;
    let job = node.registry.update_job(job).expect("finish");
    assert_eq!(job.date_started, Some(started), "start timestamp is stable");
    let completed = job.date_completed.expect("completed");
    assert!(completed >= started);
    assert!(job.run_time_ms.expect("run time") >= 0);
}

#[test]
fn a_job_finished_without_dispatch_still_gets_timestamps() {
    let node = node();
    node.host("http://h1", 4.0);
    node.service("svcA", "http://h1", "/a");

    let mut job = node
        .registry
        .create_job(JobRequest::new("http://h1", "svcA", "run", USER, ORG).pinned())
        .expect("create");
    job.status = JobStatus::Finished;
    let job = node.registry.update_job(job).expect("finish");

    assert!(job.date_started.is_some());
    assert_eq!(job.date_started, job.date_completed);
    assert_eq!(job.run_time_ms, Some(0));
}

#[test]
fn removing_a_missing_job_is_not_found() {
    let node = node();
    assert!(matches!(
        node.registry.remove_job(12345),
        Err(RegistryError::JobNotFound(12345))
    ));
}

#[test]
fn parentless_janitor_spares_young_running_and_protected_jobs() {
    let node = node();
    node.host("http://h1", 4.0);
    node.service("svcA", "http://h1", "/a");
    node.service("workflow", "http://h1", "/wf");

    let age = |job: &mediagrid::model::Job, days: i64| {
        let mut aged = node.registry.job(job.id).expect("job");
        aged.date_created = Utc::now() - Duration::days(days);
        node.store.update_job(&aged).expect("age job");
    };

    // Old and finished: pruned.
    let mut old_finished = node.queue_job("http://h1", "svcA", "run", 1.0);
    old_finished.status = JobStatus::Finished;
    let old_finished = node.registry.update_job(old_finished).expect("finish");
    age(&old_finished, 30);

    // Old but still queued: spared.
    let old_queued = node.queue_job("http://h1", "svcA", "run", 1.0);
    age(&old_queued, 30);

    // Recent and finished: spared.
    let mut recent = node.queue_job("http://h1", "svcA", "run", 1.0);
    recent.status = JobStatus::Finished;
    let recent = node.registry.update_job(recent).expect("finish");

    // Old, finished, but a protected workflow operation: spared.
    let mut protected = node
        .registry
        .create_job(JobRequest::new("http://h1", "workflow", "START_WORKFLOW", USER, ORG))
        .expect("create workflow");
    protected.status = JobStatus::Finished;
    let protected = node.registry.update_job(protected).expect("finish");
    age(&protected, 30);

    // An old finished tree goes away with its children.
    let mut old_parent = node.queue_job("http://h1", "svcA", "compose", 1.0);
    old_parent.status = JobStatus::Finished;
    let old_parent = node.registry.update_job(old_parent).expect("finish");
    let mut child = node
        .registry
        .create_job(
            JobRequest::new("http://h1", "svcA", "run", USER, ORG).with_parent(old_parent.id),
        )
        .expect("create child");
    child.status = JobStatus::Finished;
    let child = node.registry.update_job(child).expect("finish child");
    age(&old_parent, 30);

    let removed = node.registry.remove_parentless_jobs(14).expect("janitor");
    assert_eq!(removed, 2, "two old finished trees pruned");

    assert!(node.store.job(old_finished.id).unwrap().is_none());
    assert!(node.store.job(old_parent.id).unwrap().is_none());
    assert!(node.store.job(child.id).unwrap().is_none(), "children go with the tree");
    assert!(node.store.job(old_queued.id).unwrap().is_some());
    assert!(node.store.job(recent.id).unwrap().is_some());
    assert!(node.store.job(protected.id).unwrap().is_some());
}

#[test]
fn job_counts_filter_by_type_host_operation_and_status() {
    let node = node();
    node.host("http://h1", 4.0);
    node.service("svcA", "http://h1", "/a");

    let mut running = node.queue_job("http://h1", "svcA", "run", 1.0);
    running.status = JobStatus::Running;
    running.processor_service = Some(ServiceKey::new("svcA", "http://h1"));
    node.registry.update_job(running).expect("start");
    node.queue_job("http://h1", "svcA", "probe", 1.0);

    assert_eq!(node.registry.count_jobs(None, None, None, None).unwrap(), 2);
    assert_eq!(
        node.registry
            .count_jobs(Some("svcA"), Some("http://h1"), Some("run"), Some(JobStatus::Running))
            .unwrap(),
        1
    );
    assert_eq!(
        node.registry
            .count_jobs(None, None, None, Some(JobStatus::Queued))
            .unwrap(),
        1
    );
}
