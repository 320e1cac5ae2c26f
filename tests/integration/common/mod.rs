#![allow(dead_code)]

use std::{env, path::Path, sync::Arc};

use mediagrid::{
    client::WorkerClient,
    directory::{Directory, Organization, StaticDirectory, User},
    dispatcher::Dispatcher,
    model::{Job, ServiceRegistration},
    registry::{JobRequest, ServiceRegistry},
    store::{MemoryStore, RegistryStore},
    test_utils::ScriptedClient,
};

pub const ORG: &str = "default";
pub const USER: &str = "system";

/// A registry, dispatcher, and scripted worker client sharing one store.
pub struct TestNode {
    pub store: Arc<MemoryStore>,
    pub registry: Arc<ServiceRegistry>,
    pub client: Arc<ScriptedClient>,
    pub dispatcher: Dispatcher,
}

pub fn node() -> TestNode {
    node_with_attempts(1)
}

pub fn node_with_attempts(max_attempts: u32) -> TestNode {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(ServiceRegistry::new(
        Arc::clone(&store) as Arc<dyn RegistryStore>,
        max_attempts,
    ));
    let client = Arc::new(ScriptedClient::accepting());
    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&client) as Arc<dyn WorkerClient>,
        Arc::new(directory()) as Arc<dyn Directory>,
    );
    TestNode {
        store,
        registry,
        client,
        dispatcher,
    }
}

pub fn directory() -> StaticDirectory {
    let mut directory = StaticDirectory::new();
    directory.add_organization(Organization {
        id: ORG.into(),
        name: "Default".into(),
    });
    directory.add_user(User {
        username: USER.into(),
        organization: ORG.into(),
    });
    directory
}

impl TestNode {
    pub fn host(&self, base_url: &str, max_load: f32) {
        self.registry
            .register_host(base_url, "10.0.0.1", 8 << 30, 4, max_load)
            .expect("register host");
    }

    pub fn service(&self, job_type: &str, base_url: &str, path: &str) -> ServiceRegistration {
        self.registry
            .register_service(job_type, base_url, path, true)
            .expect("register service")
    }

    pub fn queue_job(&self, host: &str, job_type: &str, operation: &str, load: f32) -> Job {
        self.registry
            .create_job(JobRequest::new(host, job_type, operation, USER, ORG).with_load(load))
            .expect("create job")
    }
}

/// Points HOME (and the runtime context) at a scratch directory for the
/// duration of a test.
pub struct HomeEnvGuard {
    previous: Option<String>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl HomeEnvGuard {
    pub fn set(home: &Path) -> Self {
        let lock = mediagrid::test_utils::env_lock();
        let previous = env::var("HOME").ok();
        unsafe {
            env::set_var("HOME", home);
        }
        mediagrid::runtime::init(mediagrid::runtime::RuntimeMode::User);
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for HomeEnvGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(value) => unsafe {
                env::set_var("HOME", value);
            },
            None => unsafe {
                env::remove_var("HOME");
            },
        }
        mediagrid::runtime::init(mediagrid::runtime::RuntimeMode::User);
    }
}
