//! Liveness probing of job-producing services.
//!
//! Every round HEADs the dispatch endpoint of each online job producer.
//! A service that fails a probe is put on a watch list; failing a second
//! consecutive round gets it unregistered, which also sweeps the jobs
//! stuck on it. A watched service that answers again is forgiven, and a
//! service found offline but answering is restored.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::client::WorkerClient;
use crate::error::RegistryError;
use crate::model::ServiceKey;
use crate::registry::ServiceRegistry;

/// Periodic task that takes unresponsive services offline.
pub struct HeartbeatMonitor {
    registry: Arc<ServiceRegistry>,
    client: Arc<dyn WorkerClient>,
    watch_list: Mutex<HashSet<ServiceKey>>,
}

impl HeartbeatMonitor {
    /// Creates a monitor over a registry and a worker client.
    pub fn new(registry: Arc<ServiceRegistry>, client: Arc<dyn WorkerClient>) -> Self {
        Self {
            registry,
            client,
            watch_list: Mutex::new(HashSet::new()),
        }
    }

    /// Runs one probe round, swallowing and logging any top-level error so
    /// the periodic task never dies.
    pub fn tick(&self) {
        if let Err(err) = self.probe_round() {
            error!("Heartbeat round failed: {err}");
        }
    }

    /// Probes every online job producer once.
    pub fn probe_round(&self) -> Result<(), RegistryError> {
        for service in self.registry.store().online_services()? {
            if !service.job_producer {
                continue;
            }
            if let Some(host) = self.registry.store().host(&service.host)?
                && host.maintenance
            {
                continue;
            }

            let key = service.key();
            let url = service.dispatch_url();
            match self.client.ping(&url) {
                Ok(200) => {
                    let was_watched = self.forgive(&key);
                    if let Some(current) = self.registry.store().service(&key)?
                        && !current.online
                    {
                        self.registry.set_service_online(&key, true)?;
                        info!("Service {key} is back online");
                    } else if was_watched {
                        debug!("Service {key} answered again; removed from the watch list");
                    }
                }
                outcome => {
                    match outcome {
                        Ok(code) => warn!("Heartbeat for {key} answered {code}"),
                        Err(err) => warn!("Heartbeat for {key} failed: {err}"),
                    }
                    if self.forgive(&key) {
                        warn!("Taking unresponsive service {key} offline");
                        self.registry.unregister_service(&key.job_type, &key.host)?;
                    } else {
                        self.watch(key);
                    }
                }
            }
        }
        Ok(())
    }

    /// Removes a service from the watch list; returns whether it was on it.
    fn forgive(&self, key: &ServiceKey) -> bool {
        self.watch_list
            .lock()
            .map(|mut watched| watched.remove(key))
            .unwrap_or(false)
    }

    fn watch(&self, key: ServiceKey) {
        if let Ok(mut watched) = self.watch_list.lock() {
            watched.insert(key);
        }
    }
}
