//! Ways of opening the duplex byte stream to the worker

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{Result, TransportError};

/// Byte stream the transport can split into a read and a write half
pub trait WorkerStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> WorkerStream for T {}

pub type BoxedStream = Box<dyn WorkerStream>;

/// Opens a fresh stream to the worker
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self) -> Result<BoxedStream>;

    /// Human readable target for logs
    fn describe(&self) -> String;
}

/// Connects to the worker's unix socket, or opens its serial device node
/// read/write when the path is not a socket.
#[derive(Debug, Clone)]
pub struct UnixSocketConnector {
    path: PathBuf,
}

impl UnixSocketConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Connector for UnixSocketConnector {
    async fn open(&self) -> Result<BoxedStream> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|_| TransportError::NoDevice(self.path.display().to_string()))?;

        if is_socket(&metadata) {
            debug!(path = %self.path.display(), "Connecting to worker socket");
            let stream = tokio::net::UnixStream::connect(&self.path)
                .await
                .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", self.path.display(), e)))?;
            Ok(Box::new(stream))
        } else {
            debug!(path = %self.path.display(), "Opening worker device node");
            let file = tokio::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&self.path)
                .await
                .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", self.path.display(), e)))?;
            Ok(Box::new(file))
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(unix)]
fn is_socket(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    metadata.file_type().is_socket()
}

#[cfg(not(unix))]
fn is_socket(_metadata: &std::fs::Metadata) -> bool {
    false
}

/// Hands out a stream that was opened elsewhere. It can be opened once.
pub struct StreamConnector {
    stream: Mutex<Option<BoxedStream>>,
}

impl StreamConnector {
    pub fn new<S: WorkerStream + 'static>(stream: S) -> Self {
        Self {
            stream: Mutex::new(Some(Box::new(stream))),
        }
    }
}

#[async_trait]
impl Connector for StreamConnector {
    async fn open(&self) -> Result<BoxedStream> {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| TransportError::ConnectFailed("stream already consumed".to_string()))
    }

    fn describe(&self) -> String {
        "pre-opened stream".to_string()
    }
}
