use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::models::CipherView;
use crate::protocol::{InitPayload, WorkerRequest, WorkerResponse};
use crate::transport::ChannelPort;
use crate::worker::CryptoWorker;

/// Host side of a worker running on its own tokio task.
pub struct WorkerHandle {
    requests: mpsc::Sender<String>,
    responses: mpsc::Receiver<WorkerResponse>,
    task: JoinHandle<Result<()>>,
    timeout: Duration,
}

impl WorkerHandle {
    pub fn spawn(config: WorkerConfig) -> Self {
        Self::spawn_worker(CryptoWorker::new(config.clone()), &config)
    }

    /// Runs an already-built worker, e.g. one with custom services.
    pub fn spawn_worker(worker: CryptoWorker, config: &WorkerConfig) -> Self {
        let (mut port, requests, responses) = ChannelPort::pair(config.channel_capacity.max(1));
        let task = tokio::spawn(async move { worker.run(&mut port).await });
        Self {
            requests,
            responses,
            task,
            timeout: config.response_timeout(),
        }
    }

    /// Sends the payload with a `decryptAllRequest` and waits for the views.
    pub async fn decrypt_all(&mut self, payload: InitPayload) -> Result<Vec<CipherView>> {
        self.send(&WorkerRequest::decrypt_all(Some(payload))).await?;
        match self.wait_for("decryptAllResponse").await? {
            WorkerResponse::DecryptAllResponse { ciphers } => ciphers
                .iter()
                .map(|raw| serde_json::from_str(raw).map_err(WorkerError::from))
                .collect(),
            other => Err(WorkerError::Remote(format!("unexpected response {other:?}"))),
        }
    }

    pub async fn clear_cache(&mut self) -> Result<()> {
        self.send(&WorkerRequest::ClearCacheRequest).await?;
        self.wait_for("clearCacheResponse").await.map(|_| ())
    }

    /// Sends arbitrary text to the worker, as any host could.
    pub async fn post(&self, raw: impl Into<String>) -> Result<()> {
        self.requests
            .send(raw.into())
            .await
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Next response of any kind, bounded by the configured timeout.
    pub async fn next_response(&mut self) -> Result<WorkerResponse> {
        tokio::time::timeout(self.timeout, self.responses.recv())
            .await
            .map_err(|_| WorkerError::Timeout("a response"))?
            .ok_or(WorkerError::ChannelClosed)
    }

    /// Stops the worker without waiting for in-flight work.
    pub fn terminate(self) {
        self.task.abort();
    }

    /// Closes the request channel and waits for the loop to finish.
    pub async fn join(self) -> Result<()> {
        drop(self.requests);
        self.task.await?
    }

    async fn send(&self, request: &WorkerRequest) -> Result<()> {
        self.post(serde_json::to_string(request)?).await
    }

    async fn wait_for(&mut self, expected: &'static str) -> Result<WorkerResponse> {
        let responses = &mut self.responses;
        let wait = async {
            loop {
                let response = responses.recv().await.ok_or(WorkerError::ChannelClosed)?;
                match &response {
                    WorkerResponse::ErrorResponse { message, .. } => {
                        return Err(WorkerError::Remote(message.clone()))
                    }
                    WorkerResponse::DecryptAllResponse { .. } if expected == "decryptAllResponse" => {
                        return Ok(response)
                    }
                    WorkerResponse::ClearCacheResponse if expected == "clearCacheResponse" => {
                        return Ok(response)
                    }
                    _ => debug!(expected, "skipping unrelated response"),
                }
            }
        };
        tokio::time::timeout(self.timeout, wait)
            .await
            .map_err(|_| WorkerError::Timeout(expected))?
    }
}
