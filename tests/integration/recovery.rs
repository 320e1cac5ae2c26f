#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use common::{HomeEnvGuard, directory, node};
use mediagrid::{
    client::WorkerClient,
    config::{IdentityConfig, RegistrySettings, ServicePublication},
    daemon::RegistryDaemon,
    directory::Directory,
    error::DaemonError,
    model::{JobStatus, ServiceKey},
    store::{MemoryStore, RegistryStore},
    test_utils::ScriptedClient,
};
use tempfile::tempdir;

const LOCAL: &str = "http://local:8080";

fn settings() -> RegistrySettings {
    RegistrySettings {
        server_url: LOCAL.into(),
        address: "127.0.0.1".into(),
        // Periodic tasks stay off so tests control every round themselves.
        dispatch_interval: None,
        heartbeat_interval: None,
        max_attempts: 1,
        collect_job_stats: true,
        job_lifetime_days: 14,
        max_load: Some(4.0),
        identity: IdentityConfig {
            organization: common::ORG.into(),
            user: common::USER.into(),
        },
        services: vec![ServicePublication {
            job_type: "svcA".into(),
            path: "/a".into(),
            job_producer: true,
        }],
    }
}

#[test]
fn orphaned_local_jobs_are_canceled_on_cleanup() {
    let node = node();
    node.host(LOCAL, 4.0);
    node.host("http://remote", 4.0);
    node.service("svcA", LOCAL, "/a");
    node.service("svcA", "http://remote", "/a");

    let mut local_running = node.queue_job(LOCAL, "svcA", "run", 1.0);
    local_running.status = JobStatus::Running;
    local_running.processor_service = Some(ServiceKey::new("svcA", LOCAL));
    let local_running = node.registry.update_job(local_running).expect("start");

    let local_pinned = node
        .registry
        .create_job(
            mediagrid::registry::JobRequest::new(LOCAL, "svcA", "run", common::USER, common::ORG)
                .pinned(),
        )
        .expect("create pinned");

    let mut remote_running = node.queue_job(LOCAL, "svcA", "run", 1.0);
    remote_running.status = JobStatus::Running;
    remote_running.processor_service = Some(ServiceKey::new("svcA", "http://remote"));
    let remote_running = node.registry.update_job(remote_running).expect("start remote");

    let canceled = node.registry.clean_orphaned_jobs(LOCAL).expect("cleanup");
    assert_eq!(canceled, 2);
    assert_eq!(node.registry.job(local_running.id).unwrap().status, JobStatus::Canceled);
    assert_eq!(node.registry.job(local_pinned.id).unwrap().status, JobStatus::Canceled);
    assert_eq!(node.registry.job(remote_running.id).unwrap().status, JobStatus::Running);
}

#[test]
fn daemon_startup_recovers_registers_and_shuts_down_cleanly() {
    let temp = tempdir().expect("tempdir");
    let _home = HomeEnvGuard::set(temp.path());

    // Seed the store the way a crashed node would have left it.
    let store = Arc::new(MemoryStore::new());
    {
        let seeded = mediagrid::registry::ServiceRegistry::new(
            Arc::clone(&store) as Arc<dyn RegistryStore>,
            1,
        );
        seeded.register_host(LOCAL, "127.0.0.1", 8 << 30, 4, 4.0).expect("host");
        seeded.register_service("svcA", LOCAL, "/a", true).expect("service");
        let mut job = seeded
            .create_job(mediagrid::registry::JobRequest::new(
                LOCAL,
                "svcA",
                "run",
                common::USER,
                common::ORG,
            ))
            .expect("job");
        job.status = JobStatus::Running;
        job.processor_service = Some(ServiceKey::new("svcA", LOCAL));
        seeded.update_job(job).expect("strand job");
    }

    let client = Arc::new(ScriptedClient::accepting());
    let daemon = RegistryDaemon::start(
        settings(),
        Arc::clone(&store) as Arc<dyn RegistryStore>,
        Arc::clone(&client) as Arc<dyn WorkerClient>,
        Arc::new(directory()) as Arc<dyn Directory>,
    )
    .expect("start daemon");

    // The stranded job was canceled before anything else happened.
    let orphan = daemon.registry().jobs(None, Some(JobStatus::Canceled)).expect("jobs");
    assert_eq!(orphan.len(), 1);

    // The local host and its published services are registered and online.
    let host = store.host(LOCAL).unwrap().expect("local host");
    assert!(host.online);
    assert_eq!(host.max_load, 4.0);
    let service = store.service(&ServiceKey::new("svcA", LOCAL)).unwrap().expect("service");
    assert!(service.online);

    daemon.stop().expect("stop");
    let host = store.host(LOCAL).unwrap().expect("local host");
    assert!(!host.online, "shutdown unregisters the local host");
    let service = store.service(&ServiceKey::new("svcA", LOCAL)).unwrap().expect("service");
    assert!(!service.online);
}

#[test]
fn a_second_daemon_instance_is_rejected() {
    let temp = tempdir().expect("tempdir");
    let _home = HomeEnvGuard::set(temp.path());

    let client = Arc::new(ScriptedClient::accepting());
    let first = RegistryDaemon::start(
        settings(),
        Arc::new(MemoryStore::new()) as Arc<dyn RegistryStore>,
        Arc::clone(&client) as Arc<dyn WorkerClient>,
        Arc::new(directory()) as Arc<dyn Directory>,
    )
    .expect("first instance");

    let second = RegistryDaemon::start(
        settings(),
        Arc::new(MemoryStore::new()) as Arc<dyn RegistryStore>,
        Arc::clone(&client) as Arc<dyn WorkerClient>,
        Arc::new(directory()) as Arc<dyn Directory>,
    );
    assert!(matches!(second, Err(DaemonError::AlreadyRunning(_))));

    first.stop().expect("stop");
}

#[test]
fn registration_churn_restarts_stuck_dispatchable_jobs() {
    let node = node();
    node.host("http://h1", 4.0);
    node.service("svcA", "http://h1", "/a");

    let mut stuck = node.queue_job("http://h1", "svcA", "run", 1.0);
    stuck.status = JobStatus::Running;
    stuck.processor_service = Some(ServiceKey::new("svcA", "http://h1"));
    let stuck = node.registry.update_job(stuck).expect("start");

    // The service re-announces itself (e.g. after a worker restart): the
    // old instance's jobs can never report back.
    node.service("svcA", "http://h1", "/a");

    let job = node.registry.job(stuck.id).expect("job");
    assert_eq!(job.status, JobStatus::Restart);
    assert!(job.processor_service.is_none());

    // The restarted job outranks fresh queued work on the next round.
    let fresh = node.queue_job("http://h1", "svcA", "other", 1.0);
    assert_eq!(node.dispatcher.dispatch_round().expect("round"), 2);
    let requests = node.client.dispatches();
    assert!(requests[0].body.contains(&format!("<id>{}</id>", job.id)));
    assert!(requests[1].body.contains(&format!("<id>{}</id>", fresh.id)));
}
