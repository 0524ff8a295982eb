use std::{collections::HashMap, future::Future, time::Duration};

use anyhow::{anyhow, Result};
use chrono::Utc;
use reqwest::Client;
use shared::{
    domain::{EventId, FileEvent, FileId, FileRecord, FileWithEvents, Stage},
    protocol::{ErrorResponse, UpdateFileRequest},
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

const READ_RETRY_ATTEMPTS: usize = 3;
const READ_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);
const READ_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

const OPTIMISTIC_ID_PREFIX: &str = "optimistic-";

/// Retry schedule for read fetches: a fixed number of attempts with the
/// delay doubling between them, capped. Mutations are never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: READ_RETRY_ATTEMPTS,
            initial_delay: READ_RETRY_INITIAL_DELAY,
            max_delay: READ_RETRY_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// A non-success HTTP response, carrying the server's `{"error": ...}`
/// message when one was present.
#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct RequestRejected {
    pub status: reqwest::StatusCode,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    FilesRefreshed,
    FileRefreshed(FileId),
    TransitionRolledBack { file_id: FileId, error: String },
}

#[derive(Debug, Clone, Default)]
pub struct ClientState {
    pub files: Vec<FileRecord>,
    pub details: HashMap<FileId, FileWithEvents>,
}

struct TransitionSnapshot {
    file: Option<FileRecord>,
    detail: Option<FileWithEvents>,
}

/// Cached view of the file-tracking service. Reads land in a local cache;
/// stage transitions are applied optimistically and reconciled against the
/// server, rolling the cache back verbatim when the server refuses.
pub struct FileTrackerClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
    state: Mutex<ClientState>,
    events: broadcast::Sender<ClientEvent>,
}

impl FileTrackerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_retry(base_url, RetryPolicy::default())
    }

    pub fn with_retry(base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            retry,
            state: Mutex::new(ClientState::default()),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// The cached list, in server order. Empty until the first refresh.
    pub async fn files(&self) -> Vec<FileRecord> {
        self.state.lock().await.files.clone()
    }

    pub async fn file(&self, id: &FileId) -> Option<FileWithEvents> {
        self.state.lock().await.details.get(id).cloned()
    }

    pub async fn refresh_files(&self) -> Result<Vec<FileRecord>> {
        let files = self.retry_read("file list", || self.fetch_files()).await?;
        let mut state = self.state.lock().await;
        state.files = files.clone();
        drop(state);
        let _ = self.events.send(ClientEvent::FilesRefreshed);
        Ok(files)
    }

    pub async fn refresh_file(&self, id: &FileId) -> Result<FileWithEvents> {
        let detail = self.retry_read("file detail", || self.fetch_file(id)).await?;
        let mut state = self.state.lock().await;
        if let Some(cached) = state.files.iter_mut().find(|file| &file.id == id) {
            *cached = detail.file.clone();
        }
        state.details.insert(id.clone(), detail.clone());
        drop(state);
        let _ = self.events.send(ClientEvent::FileRefreshed(id.clone()));
        Ok(detail)
    }

    /// Requests a stage transition: the cache is rewritten optimistically
    /// (new stage on the list entry, a temporary event prepended to the
    /// detail), then the server is asked once. On success both cache entries
    /// are refetched so the authoritative state replaces the optimistic one;
    /// on failure the pre-call snapshot is restored verbatim and the error
    /// is returned. One flight, three outcomes: optimistic, then either
    /// reconciled or rolled back.
    pub async fn request_transition(
        &self,
        id: &FileId,
        stage: Stage,
        details: Option<String>,
    ) -> Result<FileWithEvents> {
        let snapshot = self.apply_optimistic(id, stage, details.clone()).await;

        match self.patch_file(id, stage, details).await {
            Ok(updated) => {
                debug!(file_id = %id, stage = %stage, "transition accepted, reconciling");
                self.refresh_files().await?;
                self.refresh_file(id).await?;
                Ok(updated)
            }
            Err(err) => {
                warn!(file_id = %id, stage = %stage, error = %err, "transition failed, rolling back");
                self.restore_snapshot(id, snapshot).await;
                let _ = self.events.send(ClientEvent::TransitionRolledBack {
                    file_id: id.clone(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn apply_optimistic(
        &self,
        id: &FileId,
        stage: Stage,
        details: Option<String>,
    ) -> TransitionSnapshot {
        let mut state = self.state.lock().await;
        let snapshot = TransitionSnapshot {
            file: state.files.iter().find(|file| &file.id == id).cloned(),
            detail: state.details.get(id).cloned(),
        };

        let now = Utc::now();
        if let Some(file) = state.files.iter_mut().find(|file| &file.id == id) {
            file.stage = stage;
            file.last_modified = now;
        }
        if let Some(detail) = state.details.get_mut(id) {
            detail.file.stage = stage;
            detail.file.last_modified = now;
            detail.events.insert(
                0,
                FileEvent {
                    id: EventId::new(format!("{OPTIMISTIC_ID_PREFIX}{}", Uuid::new_v4())),
                    file_id: id.clone(),
                    stage,
                    timestamp: now,
                    details,
                    document_url: None,
                },
            );
        }
        snapshot
    }

    async fn restore_snapshot(&self, id: &FileId, snapshot: TransitionSnapshot) {
        let mut state = self.state.lock().await;
        if let Some(original) = snapshot.file {
            if let Some(cached) = state.files.iter_mut().find(|file| &file.id == id) {
                *cached = original;
            }
        }
        match snapshot.detail {
            Some(original) => {
                state.details.insert(id.clone(), original);
            }
            None => {
                state.details.remove(id);
            }
        }
    }

    async fn retry_read<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;
        for attempt in 0..self.retry.attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.retry.attempts,
                        error = %err,
                        "{what} fetch failed"
                    );
                    last_error = Some(err);
                    if attempt + 1 < self.retry.attempts {
                        tokio::time::sleep(self.retry.delay_for(attempt as u32)).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("{what} fetch failed")))
    }

    async fn fetch_files(&self) -> Result<Vec<FileRecord>> {
        let response = self
            .http
            .get(format!("{}/api/files", self.base_url))
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }

    async fn fetch_file(&self, id: &FileId) -> Result<FileWithEvents> {
        let response = self
            .http
            .get(format!("{}/api/files/{id}", self.base_url))
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }

    pub async fn fetch_file_events(&self, id: &FileId) -> Result<Vec<FileEvent>> {
        let response = self
            .http
            .get(format!("{}/api/files/{id}/events", self.base_url))
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }

    async fn patch_file(
        &self,
        id: &FileId,
        stage: Stage,
        details: Option<String>,
    ) -> Result<FileWithEvents> {
        let request = UpdateFileRequest {
            stage: Some(stage.to_string()),
            details,
        };
        let response = self
            .http
            .patch(format!("{}/api/files/{id}", self.base_url))
            .json(&request)
            .send()
            .await?;
        Ok(expect_success(response).await?.json().await?)
    }
}

async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => format!("request failed with status {status}"),
    };
    Err(RequestRejected { status, message }.into())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
