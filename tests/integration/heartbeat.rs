#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use common::node;
use mediagrid::{
    client::WorkerClient,
    heartbeat::HeartbeatMonitor,
    model::{JobStatus, ServiceKey},
    store::RegistryStore,
};

#[test]
fn two_strikes_take_a_service_offline_and_sweep_its_jobs() {
    let node = node();
    node.host("http://h1", 4.0);
    node.service("svcA", "http://h1", "/a");
    let monitor = HeartbeatMonitor::new(
        Arc::clone(&node.registry),
        Arc::clone(&node.client) as Arc<dyn WorkerClient>,
    );

    // A job is running on the service when it stops answering.
    let mut running = node.queue_job("http://h1", "svcA", "run", 1.0);
    running.status = JobStatus::Running;
    running.processor_service = Some(ServiceKey::new("svcA", "http://h1"));
    let running = node.registry.update_job(running).expect("start job");

    node.client.script("http://h1/a/dispatch", &[500, 500]);

    // First strike: watch-listed but still online.
    monitor.probe_round().expect("first round");
    let service = node.store.service(&ServiceKey::new("svcA", "http://h1")).unwrap().unwrap();
    assert!(service.online);

    // Second strike: unregistered, and the stranded job is restarted.
    monitor.probe_round().expect("second round");
    let service = node.store.service(&ServiceKey::new("svcA", "http://h1")).unwrap().unwrap();
    assert!(!service.online);

    let job = node.registry.job(running.id).expect("job");
    assert_eq!(job.status, JobStatus::Restart);
    assert!(job.processor_service.is_none());

    assert_eq!(node.client.pings(), vec!["http://h1/a/dispatch"; 2]);
}

#[test]
fn a_pinned_job_fails_when_its_service_goes_offline() {
    let node = node();
    node.host("http://h1", 4.0);
    node.service("svcA", "http://h1", "/a");
    let monitor = HeartbeatMonitor::new(
        Arc::clone(&node.registry),
        Arc::clone(&node.client) as Arc<dyn WorkerClient>,
    );

    let mut pinned = node
        .registry
        .create_job(
            mediagrid::registry::JobRequest::new(
                "http://h1",
                "svcA",
                "run",
                common::USER,
                common::ORG,
            )
            .pinned(),
        )
        .expect("create pinned job");
    pinned.status = JobStatus::Running;
    let pinned = node.registry.update_job(pinned).expect("start");

    node.client.script("http://h1/a/dispatch", &[500, 500]);
    monitor.probe_round().expect("first round");
    monitor.probe_round().expect("second round");

    assert_eq!(node.registry.job(pinned.id).unwrap().status, JobStatus::Failed);
}

#[test]
fn a_recovered_service_is_forgiven_its_first_strike() {
    let node = node();
    node.host("http://h1", 4.0);
    node.service("svcA", "http://h1", "/a");
    let monitor = HeartbeatMonitor::new(
        Arc::clone(&node.registry),
        Arc::clone(&node.client) as Arc<dyn WorkerClient>,
    );

    node.client.script("http://h1/a/dispatch", &[500, 200, 500, 500]);
    let key = ServiceKey::new("svcA", "http://h1");

    monitor.probe_round().expect("strike one");
    assert!(node.store.service(&key).unwrap().unwrap().online);

    // The service answers again: its strike is forgotten...
    monitor.probe_round().expect("recovery");
    assert!(node.store.service(&key).unwrap().unwrap().online);

    // ...so going dark again takes two fresh strikes.
    monitor.probe_round().expect("strike one again");
    assert!(node.store.service(&key).unwrap().unwrap().online);
    monitor.probe_round().expect("strike two");
    assert!(!node.store.service(&key).unwrap().unwrap().online);
}

#[test]
fn maintenance_and_consumer_services_are_not_probed() {
    let node = node();
    node.host("http://h1", 4.0);
    node.host("http://h2", 4.0);
    node.service("svcA", "http://h1", "/a");
    node.registry
        .register_service("svcB", "http://h2", "/b", false)
        .expect("register consumer");
    node.registry.set_maintenance("http://h1", true).expect("maintenance");

    let monitor = HeartbeatMonitor::new(
        Arc::clone(&node.registry),
        Arc::clone(&node.client) as Arc<dyn WorkerClient>,
    );
    monitor.probe_round().expect("round");

    assert!(node.client.pings().is_empty());
}
