//! Shared helpers for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::client::{DispatchResponse, WorkerClient};
use crate::error::ClientError;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Serializes tests that touch environment variables or the runtime context.
pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A dispatch request recorded by [`ScriptedClient`].
#[derive(Debug, Clone)]
pub struct RecordedDispatch {
    /// The dispatch endpoint that was called.
    pub url: String,
    /// Organization header value.
    pub organization: String,
    /// User header value.
    pub user: String,
    /// The serialized job body.
    pub body: String,
}

/// Worker client double that replays scripted status codes per URL.
///
/// URLs without a script answer with the default status. A scripted status
/// of `0` simulates a transport failure.
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<u16>>>,
    dispatches: Mutex<Vec<RecordedDispatch>>,
    pings: Mutex<Vec<String>>,
    default_status: u16,
}

impl ScriptedClient {
    /// A client whose unscripted answers are 204 Accepted.
    pub fn accepting() -> Self {
        Self::with_default(204)
    }

    /// A client whose unscripted answers are `status`.
    pub fn with_default(status: u16) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            dispatches: Mutex::new(Vec::new()),
            pings: Mutex::new(Vec::new()),
            default_status: status,
        }
    }

    /// Queues status codes to answer for `url`, consumed in order.
    pub fn script(&self, url: &str, statuses: &[u16]) {
        let mut scripts = self.scripts.lock().expect("scripts lock");
        scripts
            .entry(url.to_string())
            .or_default()
            .extend(statuses.iter().copied());
    }

    /// Every dispatch POST seen so far.
    pub fn dispatches(&self) -> Vec<RecordedDispatch> {
        self.dispatches.lock().expect("dispatches lock").clone()
    }

    /// Every liveness probe seen so far.
    pub fn pings(&self) -> Vec<String> {
        self.pings.lock().expect("pings lock").clone()
    }

    fn next_status(&self, url: &str) -> u16 {
        let mut scripts = self.scripts.lock().expect("scripts lock");
        scripts
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(self.default_status)
    }
}

impl WorkerClient for ScriptedClient {
    fn dispatch(
        &self,
        url: &str,
        organization: &str,
        user: &str,
        job_xml: &str,
    ) -> Result<DispatchResponse, ClientError> {
        self.dispatches
            .lock()
            .expect("dispatches lock")
            .push(RecordedDispatch {
                url: url.to_string(),
                organization: organization.to_string(),
                user: user.to_string(),
                body: job_xml.to_string(),
            });
        match self.next_status(url) {
            0 => Err(ClientError::Unreachable(url.to_string())),
            status => Ok(DispatchResponse::from_status(status)),
        }
    }

    fn ping(&self, url: &str) -> Result<u16, ClientError> {
        self.pings.lock().expect("pings lock").push(url.to_string());
        match self.next_status(url) {
            0 => Err(ClientError::Unreachable(url.to_string())),
            status => Ok(status),
        }
    }
}
