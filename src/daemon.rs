//! Node lifecycle: startup recovery, the periodic tasks, and shutdown.
//!
//! Starting the daemon acquires a single-instance lock, cancels jobs
//! orphaned by an unclean shutdown, registers the local host and its
//! configured services, and spawns the dispatcher and heartbeat threads.
//! The threads run with fixed-delay semantics: the next round starts one
//! interval after the previous round returns, so slow rounds never stack.

use std::fs::{self, File, OpenOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use fs2::FileExt;
use sysinfo::System;
use tracing::{info, warn};

use crate::client::WorkerClient;
use crate::config::RegistrySettings;
use crate::constants::{LOCK_FILE_NAME, SHUTDOWN_POLL_INTERVAL};
use crate::directory::Directory;
use crate::dispatcher::Dispatcher;
use crate::error::DaemonError;
use crate::heartbeat::HeartbeatMonitor;
use crate::registry::ServiceRegistry;
use crate::runtime;
use crate::stats::StatsCollector;
use crate::store::RegistryStore;

/// A running mediagrid node.
pub struct RegistryDaemon {
    registry: Arc<ServiceRegistry>,
    settings: RegistrySettings,
    shutdown: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
    stats: Option<Arc<StatsCollector>>,
    _lock_file: File,
}

impl RegistryDaemon {
    /// Recovers, registers, and starts the periodic tasks.
    pub fn start(
        settings: RegistrySettings,
        store: Arc<dyn RegistryStore>,
        client: Arc<dyn WorkerClient>,
        directory: Arc<dyn Directory>,
    ) -> Result<Self, DaemonError> {
        let lock_file = acquire_instance_lock()?;
        let registry = Arc::new(ServiceRegistry::new(store, settings.max_attempts));

        // Jobs stranded by an unclean shutdown must be canceled before any
        // dispatching starts.
        let orphaned = registry.clean_orphaned_jobs(&settings.server_url)?;
        if orphaned > 0 {
            warn!("Canceled {orphaned} job(s) orphaned by the previous shutdown");
        }

        let (memory, cores) = local_host_facts();
        let max_load = settings.max_load.unwrap_or(cores as f32);
        registry.register_host(
            &settings.server_url,
            &settings.address,
            memory,
            cores,
            max_load,
        )?;
        for publication in &settings.services {
            registry.register_service(
                &publication.job_type,
                &settings.server_url,
                &publication.path,
                publication.job_producer,
            )?;
        }

        registry.remove_parentless_jobs(settings.job_lifetime_days)?;

        let stats = settings.collect_job_stats.then(|| {
            let stats = Arc::new(StatsCollector::new());
            registry.add_observer(stats.clone());
            stats
        });

        let shutdown = Arc::new(AtomicBool::new(false));
        let mut tasks = Vec::new();
        if let Some(interval) = settings.dispatch_interval {
            info!("Dispatching jobs every {} ms", interval.as_millis());
            let dispatcher =
                Dispatcher::new(Arc::clone(&registry), Arc::clone(&client), directory);
            tasks.push(spawn_periodic("dispatcher", interval, Arc::clone(&shutdown), move || {
                dispatcher.tick()
            })?);
        }
        if let Some(interval) = settings.heartbeat_interval {
            info!("Probing job producers every {} s", interval.as_secs());
            let heartbeat = HeartbeatMonitor::new(Arc::clone(&registry), client);
            tasks.push(spawn_periodic("heartbeat", interval, Arc::clone(&shutdown), move || {
                heartbeat.tick()
            })?);
        }

        Ok(Self {
            registry,
            settings,
            shutdown,
            tasks,
            stats,
            _lock_file: lock_file,
        })
    }

    /// The registry this node serves.
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// The statistics collector, when enabled.
    pub fn stats(&self) -> Option<&Arc<StatsCollector>> {
        self.stats.as_ref()
    }

    /// Stops the periodic tasks and unregisters the local host.
    pub fn stop(mut self) -> Result<(), DaemonError> {
        info!("Shutting down mediagrid node {}", self.settings.server_url);
        self.shutdown.store(true, Ordering::Relaxed);
        for task in self.tasks.drain(..) {
            if task.join().is_err() {
                warn!("A periodic task panicked during shutdown");
            }
        }
        self.registry.unregister_host(&self.settings.server_url)?;
        Ok(())
    }
}

fn spawn_periodic(
    name: &str,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    task: impl Fn() + Send + 'static,
) -> Result<JoinHandle<()>, DaemonError> {
    let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
        while !shutdown.load(Ordering::Relaxed) {
            task();
            let deadline = Instant::now() + interval;
            while Instant::now() < deadline {
                if shutdown.load(Ordering::Relaxed) {
                    return;
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                thread::sleep(remaining.min(SHUTDOWN_POLL_INTERVAL));
            }
        }
    })?;
    Ok(handle)
}

fn acquire_instance_lock() -> Result<File, DaemonError> {
    let dir = runtime::state_dir();
    fs::create_dir_all(&dir)?;
    let path = dir.join(LOCK_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)?;
    file.try_lock_exclusive()
        .map_err(|_| DaemonError::AlreadyRunning(path.display().to_string()))?;
    Ok(file)
}

fn local_host_facts() -> (u64, u32) {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_cpu_all();
    let memory = system.total_memory();
    let cores = system.cpus().len().max(1) as u32;
    (memory, cores)
}
