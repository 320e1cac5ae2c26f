//! Data model for hosts, service registrations, and jobs.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::constants::DISPATCH_PATH;

/// Execution state of a job.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// Created and pinned to its creator; not eligible for dispatch.
    Instantiated,
    /// Waiting for the dispatcher to pick an execution host.
    Queued,
    /// Claimed by a dispatcher; hand-off to a worker is in flight.
    Dispatching,
    /// Accepted by a worker and executing.
    Running,
    /// Blocked on another job.
    Waiting,
    /// Suspended; may be resumed later.
    Paused,
    /// Completed successfully.
    Finished,
    /// Completed unsuccessfully.
    Failed,
    /// Aborted before completion.
    Canceled,
    /// Re-queued after its processor disappeared; outranks fresh QUEUED jobs.
    Restart,
}

impl JobStatus {
    /// Whether this status ends the job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed | JobStatus::Canceled)
    }

    /// Whether a job in this status counts toward its processor host's load.
    pub fn influences_load(&self) -> bool {
        matches!(
            self,
            JobStatus::Queued | JobStatus::Dispatching | JobStatus::Running | JobStatus::Waiting
        )
    }
}

/// Why a job ended up FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum FailureReason {
    /// The input itself was unusable; no service is at fault and the
    /// health state machine ignores the failure.
    Data,
    /// The processing service misbehaved.
    Processing,
}

/// Health state of a service registration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceState {
    /// Operating normally; eligible for dispatch.
    Normal,
    /// One unexplained failure on record; still eligible for dispatch.
    Warning,
    /// Deemed misbehaving; excluded from candidate lists until it recovers.
    Error,
}

/// Identity of a service registration: a job type published on a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceKey {
    /// The job type the service executes.
    pub job_type: String,
    /// Base URL of the host publishing the service.
    pub host: String,
}

impl ServiceKey {
    /// Creates a key from its parts.
    pub fn new(job_type: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            host: host.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.job_type, self.host)
    }
}

/// A worker node known to the registry.
///
/// Hosts are created on first registration and never deleted; going away is
/// recorded by flipping `online`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRegistration {
    /// Base URL the host is reachable at; the host's identity.
    pub base_url: String,
    /// IP address of the host.
    pub address: String,
    /// Total memory in bytes.
    pub memory: u64,
    /// Number of CPU cores.
    pub cores: u32,
    /// Load budget; jobs' load factors on this host may not exceed it.
    pub max_load: f32,
    /// Whether the host is currently registered and reachable.
    pub online: bool,
    /// Administrative enable flag.
    pub active: bool,
    /// Whether the host is in maintenance mode and must not receive work.
    pub maintenance: bool,
}

/// A service implementation published by a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    /// The job type this service executes.
    pub job_type: String,
    /// Base URL of the owning host.
    pub host: String,
    /// Path of the service's endpoint, relative to the host base URL.
    pub path: String,
    /// Whether the service is currently published.
    pub online: bool,
    /// Administrative enable flag, kept in sync with the owning host's.
    pub active: bool,
    /// Whether this service owns execution of its job type (as opposed to
    /// only submitting jobs).
    pub job_producer: bool,
    /// Current health state.
    pub state: ServiceState,
    /// When `state` last changed.
    pub state_changed: DateTime<Utc>,
    /// Signature of the job that moved this service to WARNING.
    pub warning_trigger: Option<u64>,
    /// Signature of the job that moved this service to ERROR.
    pub error_trigger: Option<u64>,
}

impl ServiceRegistration {
    /// The (job type, host) identity of this registration.
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(self.job_type.clone(), self.host.clone())
    }

    /// Absolute URL jobs are dispatched to and liveness is probed at.
    pub fn dispatch_url(&self) -> String {
        format!("{}{}{}", self.host, self.path, DISPATCH_PATH)
    }
}

/// A unit of work tracked by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Store-assigned identifier.
    pub id: i64,
    /// The service type that executes this job.
    pub job_type: String,
    /// The operation to perform.
    pub operation: String,
    /// Ordered operation arguments.
    pub arguments: Vec<String>,
    /// Opaque payload produced by the job.
    pub payload: Option<String>,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Set when `status` is FAILED.
    pub failure_reason: Option<FailureReason>,
    /// Optimistic-lock counter, incremented by the store on every write.
    pub version: u64,
    /// Whether the dispatcher selects this job's execution host.
    pub dispatchable: bool,
    /// Cost of this job toward its processor host's `max_load` budget.
    pub job_load: f32,
    /// User that created the job.
    pub creator: String,
    /// Organization the job belongs to.
    pub organization: String,
    /// The service that submitted the job.
    pub creator_service: ServiceKey,
    /// The service executing the job, once one is assigned.
    pub processor_service: Option<ServiceKey>,
    /// Direct parent job, if any.
    pub parent_id: Option<i64>,
    /// Transitive root of the job family; `None` for root jobs.
    pub root_id: Option<i64>,
    /// When the job was created.
    pub date_created: DateTime<Utc>,
    /// When the job first entered RUNNING.
    pub date_started: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    pub date_completed: Option<DateTime<Utc>>,
    /// Milliseconds spent between creation and start.
    pub queue_time_ms: Option<i64>,
    /// Milliseconds spent between start and completion.
    pub run_time_ms: Option<i64>,
    /// Job this one is waiting on, if any.
    pub blocking_job: Option<i64>,
    /// Jobs waiting on this one.
    pub blocked_jobs: Vec<i64>,
}

impl Job {
    /// Stable identifier of this job's computational intent. Jobs with the
    /// same type, operation, and arguments share a signature and are
    /// expected to succeed or fail identically.
    pub fn signature(&self) -> u64 {
        signature(&self.job_type, &self.operation, &self.arguments)
    }
}

/// Computes the signature digest over a job's type, operation, and arguments.
pub fn signature(job_type: &str, operation: &str, arguments: &[String]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(job_type.as_bytes());
    hasher.update([0u8]);
    hasher.update(operation.as_bytes());
    for argument in arguments {
        hasher.update([0u8]);
        hasher.update(argument.as_bytes());
    }
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Load of a single host: the sum of load factors of its current jobs
/// against its configured budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HostLoad {
    /// Sum of load factors of jobs currently counted against this host.
    pub current: f32,
    /// The host's load budget.
    pub max: f32,
}

impl HostLoad {
    /// Whether this host can accept more work.
    pub fn has_capacity(&self) -> bool {
        self.current < self.max
    }
}

/// Per-host load snapshot across the cluster.
///
/// Every registered host is present, with a zero load when it has no
/// current jobs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemLoad {
    hosts: BTreeMap<String, HostLoad>,
}

impl SystemLoad {
    /// Records a host with its budget and an initial load.
    pub fn insert(&mut self, host: impl Into<String>, load: HostLoad) {
        self.hosts.insert(host.into(), load);
    }

    /// Load entry for a host, if registered.
    pub fn get(&self, host: &str) -> Option<HostLoad> {
        self.hosts.get(host).copied()
    }

    /// Current load of a host; `0.0` when unknown.
    pub fn current(&self, host: &str) -> f32 {
        self.hosts.get(host).map(|load| load.current).unwrap_or(0.0)
    }

    /// Adds `amount` to a host's current load.
    pub fn add(&mut self, host: &str, amount: f32) {
        if let Some(load) = self.hosts.get_mut(host) {
            load.current += amount;
        }
    }

    /// Iterates over all (host, load) entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &HostLoad)> {
        self.hosts.iter()
    }

    /// Number of hosts in the snapshot.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
