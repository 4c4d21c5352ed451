//! Background postmark jobs.
//!
//! `PostmarkJobs::submit` runs a resolution on its own tokio task and returns
//! immediately. Progress is reported as [`JobUpdate`] messages on the channel
//! handed out by [`PostmarkJobs::new`]; callers never share state with a
//! running job.
//!
//! The jobs value also owns the checkout session between jobs, so a login is
//! reused by the next purchase until it expires.

use std::sync::Arc;

use stampdesk_core::PurchaseRequest;
use tokio::sync::{Mutex, mpsc};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::error::ResolveError;
use crate::internetmarke::CheckoutSession;
use crate::orchestrator::{PurchaseConfirmation, PurchaseOrchestrator};
use crate::postmark::SlotPostmarks;

/// Capacity of the update channel.
const UPDATE_BUFFER: usize = 32;

/// Identifier of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a job.
#[derive(Debug)]
pub enum JobStatus {
    /// The job has started.
    Running,
    /// All requested slots were resolved.
    Completed(SlotPostmarks),
    /// The job failed. `requests` is the submitted list, for a retry.
    Failed {
        error: ResolveError,
        requests: Vec<PurchaseRequest>,
    },
}

/// A status change of one job.
#[derive(Debug)]
pub struct JobUpdate {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Runs postmark resolutions in the background.
#[derive(Clone)]
pub struct PostmarkJobs {
    orchestrator: Arc<PurchaseOrchestrator>,
    confirmation: Arc<dyn PurchaseConfirmation>,
    /// Session carried from one job to the next.
    session: Arc<Mutex<Option<CheckoutSession>>>,
    tx: mpsc::Sender<JobUpdate>,
}

impl PostmarkJobs {
    /// Create the job runner and the receiver for its updates.
    #[must_use]
    pub fn new(
        orchestrator: Arc<PurchaseOrchestrator>,
        confirmation: Arc<dyn PurchaseConfirmation>,
    ) -> (Self, mpsc::Receiver<JobUpdate>) {
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let jobs = Self {
            orchestrator,
            confirmation,
            session: Arc::new(Mutex::new(None)),
            tx,
        };
        (jobs, rx)
    }

    /// Start resolving postmarks for `requests` on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, requests: Vec<PurchaseRequest>) -> JobId {
        let job_id = JobId::new();
        let jobs = self.clone();
        let span = info_span!("postmark_job", job_id = %job_id, count = requests.len());

        tokio::spawn(
            async move {
                jobs.send(job_id, JobStatus::Running).await;
                let status = jobs.run(requests).await;
                jobs.send(job_id, status).await;
            }
            .instrument(span),
        );

        job_id
    }

    async fn run(&self, requests: Vec<PurchaseRequest>) -> JobStatus {
        // Concurrent jobs start from the same session instead of each logging in
        let mut session = self.session.lock().await.clone();

        let result = self
            .orchestrator
            .resolve_with_session(&requests, &mut session, self.confirmation.as_ref())
            .await;
        // A rejected login leaves nothing worth keeping
        if session.is_some() || matches!(result, Err(ResolveError::Auth(_))) {
            *self.session.lock().await = session;
        }

        match result {
            Ok(postmarks) => {
                info!("Postmark job completed");
                JobStatus::Completed(postmarks)
            }
            Err(error) => {
                warn!(error = %error, "Postmark job failed");
                JobStatus::Failed { error, requests }
            }
        }
    }

    async fn send(&self, job_id: JobId, status: JobStatus) {
        if self.tx.send(JobUpdate { job_id, status }).await.is_err() {
            warn!("Job update receiver dropped");
        }
    }
}
