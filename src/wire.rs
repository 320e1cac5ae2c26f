//! XML wire format for jobs.
//!
//! A [`JobDocument`] is the round-trippable form a job travels in between
//! registry nodes and workers. It carries the job's identity and intent;
//! registration references stay server-side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::model::{Job, JobStatus};

/// Ordered operation arguments, one `<argument>` element each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    /// The argument values, in order.
    #[serde(rename = "argument", default)]
    pub argument: Vec<String>,
}

/// The `<job>` document exchanged with workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "job")]
pub struct JobDocument {
    /// Store-assigned job id.
    pub id: i64,
    /// Service type executing the job.
    #[serde(rename = "type")]
    pub job_type: String,
    /// Operation to perform.
    pub operation: String,
    /// Ordered operation arguments.
    #[serde(default)]
    pub arguments: Arguments,
    /// Opaque payload, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Lifecycle status at serialization time.
    pub status: JobStatus,
    /// Optimistic-lock version at serialization time.
    pub version: u64,
    /// Whether the dispatcher selects the execution host.
    pub dispatchable: bool,
    /// Load factor of the job.
    pub job_load: f32,
    /// Creating user.
    pub creator: String,
    /// Owning organization.
    pub organization: String,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// When the job first entered RUNNING, if it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    /// When the job reached a terminal status, if it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    /// Direct parent job id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<i64>,
    /// Root job id of the family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<i64>,
}

impl From<&Job> for JobDocument {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type.clone(),
            operation: job.operation.clone(),
            arguments: Arguments {
                argument: job.arguments.clone(),
            },
            payload: job.payload.clone(),
            status: job.status,
            version: job.version,
            dispatchable: job.dispatchable,
            job_load: job.job_load,
            creator: job.creator.clone(),
            organization: job.organization.clone(),
            created: job.date_created,
            started: job.date_started,
            completed: job.date_completed,
            parent: job.parent_id,
            root: job.root_id,
        }
    }
}

/// Serializes a job for the wire.
pub fn to_xml(job: &Job) -> Result<String, WireError> {
    quick_xml::se::to_string(&JobDocument::from(job))
        .map_err(|err| WireError::Serialize(err.to_string()))
}

/// Parses a job document off the wire.
pub fn from_xml(xml: &str) -> Result<JobDocument, WireError> {
    quick_xml::de::from_str(xml).map_err(|err| WireError::Deserialize(err.to_string()))
}
