use std::{collections::HashMap, sync::Arc, time::Duration};

use shared::{
    domain::ImportId,
    error::ValidationErrors,
    protocol::{ImportHandle, ImportJobSnapshot, ImportOptions, ImportState},
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    customer_client::{CustomerApi, ImportUpload},
    error::{ClientError, ClientResult},
    loaders::require_data,
};

pub const SUBMIT_FAILED_MESSAGE: &str = "Failed to start import";
pub const STATUS_FAILED_MESSAGE: &str = "Failed to fetch import status";
pub const CANCEL_FAILED_MESSAGE: &str = "Failed to cancel import";
pub const ACTIVE_FAILED_MESSAGE: &str = "Failed to fetch active imports";

/// Local view of a job's lifecycle, derived from the last server snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    Idle,
    Submitted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ImportPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ImportPhase::Completed | ImportPhase::Failed | ImportPhase::Cancelled
        )
    }
}

impl From<ImportState> for ImportPhase {
    fn from(state: ImportState) -> Self {
        match state {
            ImportState::Queued => ImportPhase::Submitted,
            ImportState::Running | ImportState::Unknown => ImportPhase::Running,
            ImportState::Completed => ImportPhase::Completed,
            ImportState::Failed => ImportPhase::Failed,
            ImportState::Cancelled => ImportPhase::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedImport {
    pub snapshot: ImportJobSnapshot,
    /// Set once a cancel was acknowledged. The phase still follows the
    /// server; a job may finish before the cancel takes effect.
    pub cancel_requested: bool,
}

impl TrackedImport {
    pub fn phase(&self) -> ImportPhase {
        self.snapshot.status.into()
    }
}

/// Drives server-side CSV import jobs. Job state lives on the server; this
/// only keeps the latest snapshot of each job it has seen in this process.
pub struct ImportOrchestrator<A: CustomerApi + ?Sized> {
    api: Arc<A>,
    jobs: Mutex<HashMap<ImportId, TrackedImport>>,
}

impl<A: CustomerApi + ?Sized> ImportOrchestrator<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Uploads the file. The job is tracked when the server answers with an
    /// id or a snapshot; an import that finished within the request has
    /// nothing left to track.
    pub async fn submit(
        &self,
        upload: ImportUpload,
        options: &ImportOptions,
    ) -> ClientResult<ImportHandle> {
        if upload.is_empty() {
            let mut errors = ValidationErrors::new();
            errors.push("csvFile", "CSV file is required");
            return Err(errors.into());
        }

        let file_name = upload.file_name.clone();
        let handle = match self
            .api
            .import_csv(upload, options)
            .await
            .and_then(|envelope| require_data(envelope, SUBMIT_FAILED_MESSAGE))
        {
            Ok(handle) => handle,
            Err(err) => {
                error!(file = %file_name, error = %err, "import submission failed");
                return Err(err);
            }
        };

        match &handle {
            ImportHandle::Id(id) => {
                info!(import_id = %id, file = %file_name, "import submitted");
                self.record(&ImportJobSnapshot::queued(id.clone(), Some(file_name)))
                    .await;
            }
            ImportHandle::Job(snapshot) => {
                info!(
                    import_id = %snapshot.import_id,
                    file = %file_name,
                    status = %snapshot.status,
                    "import submitted"
                );
                self.record(snapshot).await;
            }
            ImportHandle::Finished(outcome) => {
                info!(
                    file = %file_name,
                    rows = outcome.progress.total_rows,
                    errors = outcome.progress.error_count,
                    "import finished within the upload request"
                );
            }
        }
        Ok(handle)
    }

    /// Fetches the current server snapshot. Safe to repeat; only the local
    /// copy is refreshed.
    pub async fn poll(&self, id: &ImportId) -> ClientResult<ImportJobSnapshot> {
        let envelope = self.api.import_status(id).await?;
        let snapshot = require_data(envelope, STATUS_FAILED_MESSAGE)?;
        self.record(&snapshot).await;
        Ok(snapshot)
    }

    /// Requests cancellation and returns the server's acknowledgement. The
    /// local phase is left alone; the next poll reports the outcome.
    pub async fn cancel(&self, id: &ImportId) -> ClientResult<String> {
        let envelope = match self.api.cancel_import(id).await {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(import_id = %id, error = %err, "import cancel failed");
                return Err(err);
            }
        };
        if !envelope.success {
            let message = if envelope.message.trim().is_empty() {
                CANCEL_FAILED_MESSAGE.to_string()
            } else {
                envelope.message
            };
            warn!(import_id = %id, error = %message, "import cancel rejected");
            return Err(ClientError::Rejected { message });
        }

        if let Some(job) = self.jobs.lock().await.get_mut(id) {
            job.cancel_requested = true;
        }
        info!(import_id = %id, "import cancel requested");
        Ok(envelope.message)
    }

    /// Jobs the server still reports as queued or running.
    pub async fn list_active(&self) -> ClientResult<Vec<ImportJobSnapshot>> {
        let envelope = self.api.active_imports().await?;
        let active: Vec<ImportJobSnapshot> = require_data(envelope, ACTIVE_FAILED_MESSAGE)?
            .into_iter()
            .filter(|job| !job.status.is_terminal())
            .collect();
        for snapshot in &active {
            self.record(snapshot).await;
        }
        Ok(active)
    }

    /// Polls every `interval` until the job reaches a terminal state,
    /// reporting each snapshot. The first failed poll ends the watch.
    pub async fn watch<F>(
        &self,
        id: &ImportId,
        interval: Duration,
        mut on_progress: F,
    ) -> ClientResult<ImportJobSnapshot>
    where
        F: FnMut(&ImportJobSnapshot) + Send,
    {
        loop {
            let snapshot = self.poll(id).await?;
            on_progress(&snapshot);
            if snapshot.status.is_terminal() {
                info!(import_id = %id, status = %snapshot.status, "import finished");
                return Ok(snapshot);
            }
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn phase(&self, id: &ImportId) -> ImportPhase {
        self.jobs
            .lock()
            .await
            .get(id)
            .map(TrackedImport::phase)
            .unwrap_or(ImportPhase::Idle)
    }

    pub async fn tracked(&self, id: &ImportId) -> Option<TrackedImport> {
        self.jobs.lock().await.get(id).cloned()
    }

    async fn record(&self, snapshot: &ImportJobSnapshot) {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(&snapshot.import_id) {
            Some(job) => job.snapshot = snapshot.clone(),
            None => {
                jobs.insert(
                    snapshot.import_id.clone(),
                    TrackedImport {
                        snapshot: snapshot.clone(),
                        cancel_requested: false,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/import_tests.rs"]
mod tests;
