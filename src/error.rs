//! Error handling for mediagrid.
use thiserror::Error;

/// Errors raised by the persistence store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row referenced by id no longer exists.
    #[error("job {0} does not exist in the store")]
    JobMissing(i64),

    /// An optimistic write lost the race: the stored version no longer
    /// matches the caller's snapshot.
    #[error("job {id} was modified concurrently (stored version != {snapshot})")]
    VersionConflict {
        /// The job whose write was rejected.
        id: i64,
        /// The version the caller read before modifying the job.
        snapshot: u64,
    },

    /// The store mutex was poisoned by a panicking thread.
    #[error("store lock is poisoned: {0}")]
    LockPoisoned(String),
}

/// Implement the `From` trait to convert a `std::sync::PoisonError` into a `StoreError`.
impl<T> From<std::sync::PoisonError<T>> for StoreError {
    /// Converts a `std::sync::PoisonError` into a `StoreError`.
    fn from(err: std::sync::PoisonError<T>) -> Self {
        StoreError::LockPoisoned(err.to_string())
    }
}

/// Errors raised by the public registry API.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A host lookup by base URL missed.
    #[error("host '{0}' is not registered")]
    HostNotFound(String),

    /// A service lookup by (job type, host) missed.
    #[error("no service registration for '{job_type}' on host '{host}'")]
    ServiceNotFound {
        /// The requested job type.
        job_type: String,
        /// The host the service was expected on.
        host: String,
    },

    /// A job lookup by id missed.
    #[error("job {0} does not exist")]
    JobNotFound(i64),

    /// A required field was blank or out of range at the API boundary.
    #[error("{0}")]
    InvalidArgument(String),

    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcomes of a dispatch attempt that the dispatcher handles itself.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No registered, healthy service of the requested type exists right now.
    #[error("no service of type '{0}' is available for dispatch")]
    ServiceUnavailable(String),

    /// This specific job cannot be dispatched: the optimistic claim was
    /// lost, a worker rejected it permanently, or every candidate refused.
    #[error("job {id} cannot be dispatched: {reason}")]
    Undispatchable {
        /// The affected job.
        id: i64,
        /// Human-readable cause.
        reason: String,
    },

    /// Registry error during the dispatch round.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors from the outbound worker HTTP client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure talking to a worker.
    #[error("worker request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The worker endpoint could not be reached at all.
    #[error("worker unreachable: {0}")]
    Unreachable(String),
}

/// Errors reading or interpreting the node configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading or accessing a configuration file.
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A `${VAR}` reference in the config has no value in the environment.
    #[error("missing environment variable '{0}'")]
    MissingEnvVar(String),
}

/// Errors converting jobs to or from their XML wire form.
#[derive(Debug, Error)]
pub enum WireError {
    /// XML serialization failed.
    #[error("failed to serialize job: {0}")]
    Serialize(String),

    /// XML deserialization failed.
    #[error("failed to parse job document: {0}")]
    Deserialize(String),
}

/// Errors starting or stopping the registry daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Another daemon instance already holds the state-dir lock.
    #[error("another mediagrid instance is already running ({0})")]
    AlreadyRunning(String),

    /// I/O error managing runtime state.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Registry error during startup or shutdown.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The worker HTTP client could not be constructed.
    #[error(transparent)]
    Client(#[from] ClientError),
}
