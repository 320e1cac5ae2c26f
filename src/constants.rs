//! Constants and default values for the mediagrid daemon.
//!
//! This module centralizes the magic numbers, wire names, and status sets
//! used throughout the registry to improve maintainability and clarity.

use std::time::Duration;

use crate::model::JobStatus;

// ============================================================================
// Dispatch Scheduling
// ============================================================================

/// Default delay between dispatch rounds, in milliseconds.
pub const DEFAULT_DISPATCH_INTERVAL_MS: u64 = 5_000;

/// Smallest accepted delay between dispatch rounds, in milliseconds.
/// Configured values below this are clamped up; `0` disables dispatching.
pub const MIN_DISPATCH_INTERVAL_MS: u64 = 1_000;

/// Default delay between heartbeat rounds, in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Default number of recorded failures after which a WARNING service is
/// moved to ERROR.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;

/// Default age in days beyond which finished parentless jobs are pruned.
pub const DEFAULT_JOB_LIFETIME_DAYS: u64 = 14;

/// Request timeout applied to outbound dispatch and heartbeat calls.
pub const WORKER_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Polling interval used while a periodic task waits out its fixed delay,
/// kept short so shutdown stays responsive.
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Wire Protocol
// ============================================================================

/// Header carrying the organization a dispatched job belongs to.
pub const HEADER_ORGANIZATION: &str = "X-Mediagrid-Organization";

/// Header carrying the user a dispatched job runs as.
pub const HEADER_USER: &str = "X-Mediagrid-User";

/// Path suffix appended to a service's endpoint for dispatch and liveness.
pub const DISPATCH_PATH: &str = "/dispatch";

// ============================================================================
// Job Types and Operations
// ============================================================================

/// Job type of the workflow engine. Workflow jobs schedule themselves: they
/// are exempt from load balancing and from the round-local skip set.
pub const TYPE_WORKFLOW: &str = "workflow";

/// Operation that resumes a workflow at its current operation.
pub const OP_START_OPERATION: &str = "START_OPERATION";

/// Operation that starts a workflow from the beginning.
pub const OP_START_WORKFLOW: &str = "START_WORKFLOW";

/// Operation that resumes a paused workflow.
pub const OP_RESUME: &str = "RESUME";

/// Operations whose parentless jobs are never pruned by the janitor.
pub const PROTECTED_OPERATIONS: [&str; 3] = [OP_START_OPERATION, OP_START_WORKFLOW, OP_RESUME];

// ============================================================================
// Status Sets
// ============================================================================

/// Statuses the dispatcher drains on every round.
pub const DISPATCHABLE_STATUSES: [JobStatus; 2] = [JobStatus::Queued, JobStatus::Restart];

/// Statuses swept when a service's registration churns.
pub const SWEEP_STATUSES: [JobStatus; 3] =
    [JobStatus::Running, JobStatus::Dispatching, JobStatus::Waiting];

/// Statuses of jobs stranded on a host that did not shut down cleanly.
pub const ORPHAN_STATUSES: [JobStatus; 2] = [JobStatus::Instantiated, JobStatus::Running];

/// Statuses in which a job counts toward its processor host's load.
pub const LOAD_STATUSES: [JobStatus; 4] = [
    JobStatus::Queued,
    JobStatus::Dispatching,
    JobStatus::Running,
    JobStatus::Waiting,
];

// ============================================================================
// File System Constants
// ============================================================================

/// Name of the single-instance lock file stored in the state directory.
pub const LOCK_FILE_NAME: &str = "mgrid.lock";
