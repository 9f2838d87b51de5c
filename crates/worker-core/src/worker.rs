//! The worker: bootstrap, batch decryption and the message loop.

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::models::EncryptedRecord;
use crate::protocol::{
    parse_request, InitPayload, MalformedRequest, WorkerRequest, WorkerResponse,
};
use crate::services::ServiceContainer;
use crate::storage;
use crate::transport::MessagePort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Listening, no payload seeded yet.
    Initializing,
    /// Stores seeded and batch pending.
    Ready,
    /// The batch has been decrypted and posted.
    Served,
}

#[derive(Debug)]
pub struct CryptoWorker {
    config: WorkerConfig,
    services: ServiceContainer,
    pending: Vec<EncryptedRecord>,
    state: WorkerState,
}

impl CryptoWorker {
    pub fn new(config: WorkerConfig) -> Self {
        Self::with_services(config, ServiceContainer::new())
    }

    pub fn with_services(config: WorkerConfig, services: ServiceContainer) -> Self {
        Self {
            config,
            services,
            pending: Vec::new(),
            state: WorkerState::Initializing,
        }
    }

    /// Builds a worker and bootstraps it in one go.
    pub fn with_payload(config: WorkerConfig, payload: &InitPayload) -> Result<Self> {
        let mut worker = Self::new(config);
        worker.bootstrap(payload)?;
        Ok(worker)
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    pub fn pending(&self) -> &[EncryptedRecord] {
        &self.pending
    }

    /// Parses the payload and seeds both stores. Any failure here is a
    /// construction failure and leaves the worker in `Initializing`.
    pub fn bootstrap(&mut self, payload: &InitPayload) -> Result<()> {
        if self.state != WorkerState::Initializing {
            return Err(WorkerError::Construction(
                "worker is already bootstrapped".into(),
            ));
        }
        let parsed = payload.parse()?;

        let mut seeded = 0;
        if let Some(snapshot) = &parsed.storage {
            seeded += storage::seed(self.services.storage(), snapshot)
                .map_err(|e| WorkerError::Construction(format!("storage: {e}")))?;
        }
        let mut secure_seeded = 0;
        if let Some(snapshot) = &parsed.secure_storage {
            secure_seeded += storage::seed(self.services.secure_storage(), snapshot)
                .map_err(|e| WorkerError::Construction(format!("secureStorage: {e}")))?;
        }

        self.pending = parsed.ciphers;
        self.state = WorkerState::Ready;
        info!(
            ciphers = self.pending.len(),
            storage_entries = seeded,
            secure_entries = secure_seeded,
            "worker bootstrapped"
        );
        Ok(())
    }

    /// Decrypts every pending record concurrently. Views come back in
    /// completion order; the first failure aborts the rest of the batch.
    pub async fn decrypt_all(&self) -> Result<Vec<String>> {
        let crypto = self.services.crypto();
        let mut tasks = JoinSet::new();
        for (index, record) in self.pending.iter().enumerate() {
            let record = record.clone();
            let crypto = Arc::clone(&crypto);
            tasks.spawn(async move {
                let view = record
                    .decrypt(&crypto)
                    .await
                    .map_err(|source| WorkerError::Decryption {
                        id: record
                            .id()
                            .map_or_else(|| format!("#{index}"), str::to_string),
                        source,
                    })?;
                Ok::<_, WorkerError>(serde_json::to_string(&view)?)
            });
        }
        debug!(tasks = tasks.len(), "decrypt fan-out started");

        let mut views = Vec::with_capacity(self.pending.len());
        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok(view) => views.push(view),
                Err(err) => {
                    tasks.abort_all();
                    return Err(err);
                }
            }
        }
        debug!(views = views.len(), "decrypt fan-in complete");
        Ok(views)
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.services
            .crypto()
            .clear_cache()
            .await
            .map_err(WorkerError::CacheClear)
    }

    /// Parses and handles one raw message.
    pub async fn handle_message(&mut self, raw: &str) -> Result<Option<WorkerResponse>> {
        match parse_request(raw) {
            Ok(Some(request)) => self.handle(request).await,
            Ok(None) => {
                debug!(bytes = raw.len(), "ignoring unrecognized message");
                Ok(None)
            }
            Err(malformed) => self.reject(malformed).map(|()| None),
        }
    }

    /// A malformed request is fatal while the worker is still waiting for
    /// its payload and ignored afterwards.
    fn reject(&self, malformed: MalformedRequest) -> Result<()> {
        if self.state == WorkerState::Initializing {
            return Err(WorkerError::Construction(malformed.to_string()));
        }
        warn!(
            request = malformed.request,
            reason = %malformed.reason,
            "ignoring malformed request"
        );
        Ok(())
    }

    pub async fn handle(&mut self, request: WorkerRequest) -> Result<Option<WorkerResponse>> {
        match &request {
            WorkerRequest::DecryptAllRequest { .. } => {
                let payload = request.init_payload();
                match self.state {
                    WorkerState::Served => {
                        warn!("batch already served; ignoring decryptAllRequest");
                        return Ok(None);
                    }
                    WorkerState::Initializing => {
                        let payload = payload.ok_or_else(|| {
                            WorkerError::Construction(
                                "decryptAllRequest arrived without an initialization payload"
                                    .into(),
                            )
                        })?;
                        self.bootstrap(&payload)?;
                    }
                    WorkerState::Ready => {
                        if payload.is_some() {
                            warn!("worker already bootstrapped; ignoring attached payload");
                        }
                    }
                }
                let ciphers = self.decrypt_all().await?;
                self.state = WorkerState::Served;
                info!(count = ciphers.len(), "posting decryptAllResponse");
                Ok(Some(WorkerResponse::DecryptAllResponse { ciphers }))
            }
            WorkerRequest::ClearCacheRequest => {
                self.clear_cache().await?;
                info!("posting clearCacheResponse");
                Ok(Some(WorkerResponse::ClearCacheResponse))
            }
            WorkerRequest::Unknown => Ok(None),
        }
    }

    /// Serves requests until the host closes the port. Only a construction
    /// failure ends the loop early.
    pub async fn run<P>(mut self, port: &mut P) -> Result<()>
    where
        P: MessagePort + ?Sized,
    {
        info!(state = ?self.state, "worker listening");
        while let Some(raw) = port.recv().await? {
            let request = match parse_request(&raw) {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!(bytes = raw.len(), "ignoring unrecognized message");
                    continue;
                }
                Err(malformed) => {
                    let name = malformed.request;
                    if let Err(err) = self.reject(malformed) {
                        self.fail(port, name, err).await?;
                    }
                    continue;
                }
            };
            let name = request.name();
            match self.handle(request).await {
                Ok(Some(response)) => port.post(&response).await?,
                Ok(None) => {}
                Err(err) => self.fail(port, name, err).await?,
            }
        }
        info!("message channel closed; worker stopping");
        Ok(())
    }

    /// Logs a failed request and reports it when enabled. Hands construction
    /// failures back so the loop ends.
    async fn fail<P>(&self, port: &mut P, name: &str, err: WorkerError) -> Result<()>
    where
        P: MessagePort + ?Sized,
    {
        warn!(request = name, error = %err, "request failed");
        if self.config.report_errors {
            port.post(&WorkerResponse::ErrorResponse {
                request: name.to_string(),
                message: err.to_string(),
            })
            .await?;
        }
        match err {
            WorkerError::Construction(_) => Err(err),
            _ => Ok(()),
        }
    }
}
