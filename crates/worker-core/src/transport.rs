use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::error::{Result, WorkerError};
use crate::protocol::WorkerResponse;

/// The generic message channel between host and worker.
#[async_trait]
pub trait MessagePort: Send {
    /// Next raw inbound message; `None` once the host has gone away.
    async fn recv(&mut self) -> Result<Option<String>>;
    async fn post(&mut self, response: &WorkerResponse) -> Result<()>;
}

/// In-process port backed by tokio channels.
pub struct ChannelPort {
    inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<WorkerResponse>,
}

impl ChannelPort {
    pub fn new(inbound: mpsc::Receiver<String>, outbound: mpsc::Sender<WorkerResponse>) -> Self {
        Self { inbound, outbound }
    }

    /// Port plus the host's ends of both channels.
    pub fn pair(
        capacity: usize,
    ) -> (Self, mpsc::Sender<String>, mpsc::Receiver<WorkerResponse>) {
        let (request_tx, request_rx) = mpsc::channel(capacity);
        let (response_tx, response_rx) = mpsc::channel(capacity);
        (Self::new(request_rx, response_tx), request_tx, response_rx)
    }
}

#[async_trait]
impl MessagePort for ChannelPort {
    async fn recv(&mut self) -> Result<Option<String>> {
        Ok(self.inbound.recv().await)
    }

    async fn post(&mut self, response: &WorkerResponse) -> Result<()> {
        self.outbound
            .send(response.clone())
            .await
            .map_err(|_| WorkerError::ChannelClosed)
    }
}

/// Newline-delimited JSON over any byte stream (stdio, pipes, sockets).
/// Lines that are not UTF-8 are decoded lossily and left to the parser to
/// reject.
pub struct StreamPort<R, W> {
    reader: BufReader<R>,
    line: Vec<u8>,
    writer: W,
}

impl<R, W> StreamPort<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: Vec::new(),
            writer,
        }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<R, W> MessagePort for StreamPort<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<String>> {
        self.line.clear();
        if self.reader.read_until(b'\n', &mut self.line).await? == 0 {
            return Ok(None);
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.line).into_owned()))
    }

    async fn post(&mut self, response: &WorkerResponse) -> Result<()> {
        let line = serde_json::to_string(response)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}
