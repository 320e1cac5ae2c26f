//! Outbound HTTP to worker nodes: job dispatch and liveness probes.

use std::time::Duration;

use crate::constants::{HEADER_ORGANIZATION, HEADER_USER};
use crate::error::ClientError;

/// Outcome of a dispatch POST, mapped from the worker's status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResponse {
    /// 204: the worker accepted the job.
    Accepted,
    /// 503: the worker refuses more work right now; try the next candidate.
    Refused,
    /// 405: the endpoint is not serving yet; try the next candidate.
    NotReady,
    /// 412: the job itself is unacceptable and will never be accepted.
    Rejected,
    /// Anything else; logged and treated as a soft failure.
    Other(u16),
}

impl DispatchResponse {
    /// Maps an HTTP status code onto the dispatch protocol.
    pub fn from_status(code: u16) -> Self {
        match code {
            204 => DispatchResponse::Accepted,
            503 => DispatchResponse::Refused,
            405 => DispatchResponse::NotReady,
            412 => DispatchResponse::Rejected,
            other => DispatchResponse::Other(other),
        }
    }
}

/// Client for the worker-facing side of the dispatch protocol.
pub trait WorkerClient: Send + Sync {
    /// POSTs a serialized job to a worker's dispatch endpoint.
    fn dispatch(
        &self,
        url: &str,
        organization: &str,
        user: &str,
        job_xml: &str,
    ) -> Result<DispatchResponse, ClientError>;

    /// HEADs a worker's dispatch endpoint; returns the raw status code.
    fn ping(&self, url: &str) -> Result<u16, ClientError>;
}

/// [`WorkerClient`] backed by a blocking `reqwest` client.
pub struct HttpWorkerClient {
    client: reqwest::blocking::Client,
}

impl HttpWorkerClient {
    /// Builds a client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl WorkerClient for HttpWorkerClient {
    fn dispatch(
        &self,
        url: &str,
        organization: &str,
        user: &str,
        job_xml: &str,
    ) -> Result<DispatchResponse, ClientError> {
        let response = self
            .client
            .post(url)
            .header(HEADER_ORGANIZATION, organization)
            .header(HEADER_USER, user)
            .form(&[("job", job_xml)])
            .send()?;
        Ok(DispatchResponse::from_status(response.status().as_u16()))
    }

    fn ping(&self, url: &str) -> Result<u16, ClientError> {
        let response = self.client.head(url).send()?;
        Ok(response.status().as_u16())
    }
}
