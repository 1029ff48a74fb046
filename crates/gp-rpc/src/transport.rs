//! Connection to the worker
//!
//! The transport owns one duplex stream. Writes happen under a lock, one
//! whole frame at a time; a single background task reads frames and hands
//! each response to the call waiting on its id.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connector::{BoxedStream, Connector};
use crate::error::{Result, TransportError};
use crate::pending::PendingTable;
use crate::protocol::{methods, Request, Response, TimeoutPolicy};

/// Read chunk size
const READ_CHUNK: usize = 64 * 1024;

/// Largest frame accepted before the buffer is discarded
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(50);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// State shared with the read loop
struct Shared {
    pending: PendingTable,
    state: Mutex<ConnectionState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Inner {
    connector: Box<dyn Connector>,
    policy: TimeoutPolicy,
    probe_timeout: Duration,
    idle_backoff: Duration,
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<Option<WriteHalf<BoxedStream>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

/// Request/response transport to the worker
///
/// Cloning is cheap; clones share one connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

/// Removes a call's pending entry if the call future is dropped early
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.take(self.id);
    }
}

impl Transport {
    pub fn new(connector: impl Connector + 'static, policy: TimeoutPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector: Box::new(connector),
                policy,
                probe_timeout: DEFAULT_PROBE_TIMEOUT,
                idle_backoff: DEFAULT_IDLE_BACKOFF,
                shared: Arc::new(Shared {
                    pending: PendingTable::default(),
                    state: Mutex::new(ConnectionState::Disconnected),
                }),
                writer: tokio::sync::Mutex::new(None),
                reader: Mutex::new(None),
            }),
        }
    }

    /// Build from `[worker]` settings
    pub fn from_config(connector: impl Connector + 'static, config: &gp_core::WorkerConfig) -> Self {
        Self::new(connector, TimeoutPolicy::from_config(config))
            .with_probe_timeout(Duration::from_secs(config.probe_timeout_secs))
            .with_idle_backoff(Duration::from_millis(config.idle_backoff_ms))
    }

    /// Only effective before the transport is cloned
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.probe_timeout = timeout;
        }
        self
    }

    /// Only effective before the transport is cloned
    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.idle_backoff = backoff;
        }
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Number of calls waiting for a response
    pub fn pending_count(&self) -> usize {
        self.inner.shared.pending.len()
    }

    pub fn timeout_for(&self, method: &str) -> Duration {
        self.inner.policy.timeout_for(method)
    }

    /// Open the stream, start the read loop and probe the worker
    ///
    /// A no-op while already connecting or connected.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.inner.shared.state();
            if matches!(*state, ConnectionState::Connecting | ConnectionState::Connected) {
                let current = *state;
                debug!(state = %current, "connect() ignored");
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }

        let target = self.inner.connector.describe();
        info!(worker = %target, "Connecting to worker");

        match self.establish().await {
            Ok(()) => {
                if self.settle(ConnectionState::Connected) {
                    info!(worker = %target, "Worker connected");
                    return Ok(());
                }
                // disconnect() ran while the probe was in flight
                warn!(worker = %target, "Disconnected while connecting");
                self.teardown().await;
                Err(TransportError::Disconnected)
            }
            Err(e) => {
                error!(worker = %target, error = %e, "Failed to connect to worker");
                self.teardown().await;
                self.settle(ConnectionState::Error);
                Err(e)
            }
        }
    }

    /// Leave Connecting for `next`. Returns false when something else,
    /// normally disconnect(), already moved the state on.
    fn settle(&self, next: ConnectionState) -> bool {
        let mut state = self.inner.shared.state();
        if *state != ConnectionState::Connecting {
            return false;
        }
        *state = next;
        true
    }

    async fn establish(&self) -> Result<()> {
        let stream = self.inner.connector.open().await?;
        let (reader, writer) = tokio::io::split(stream);
        *self.inner.writer.lock().await = Some(writer);

        let handle = tokio::spawn(read_loop(reader, self.inner.shared.clone(), self.inner.idle_backoff));
        if let Some(previous) = self.lock_reader().replace(handle) {
            previous.abort();
        }

        self.request(methods::PING, None, self.inner.probe_timeout)
            .await?
            .into_result()?;
        Ok(())
    }

    /// Close the connection and fail every waiting call with `Disconnected`
    pub async fn disconnect(&self) {
        let failed = self.teardown().await;
        let mut state = self.inner.shared.state();
        if *state != ConnectionState::Disconnected {
            info!(failed_calls = failed, "Worker disconnected");
        }
        *state = ConnectionState::Disconnected;
    }

    async fn teardown(&self) -> usize {
        if let Some(handle) = self.lock_reader().take() {
            handle.abort();
        }
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.inner.shared.pending.fail_all()
    }

    fn lock_reader(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a request and wait for its response, bounded by the method's timeout
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Response> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.request(method, params, self.timeout_for(method)).await
    }

    /// Like `call`, returning the result value and turning an error payload
    /// into `RemoteError`
    pub async fn call_value(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.call(method, params).await?.into_result()
    }

    async fn request(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Response> {
        let id = uuid::Uuid::now_v7().to_string();
        let request = Request::new(id.clone(), method, params);
        let frame = request
            .to_frame()
            .map_err(|e| TransportError::InvalidResponse(format!("unencodable request: {}", e)))?;

        let pending = &self.inner.shared.pending;
        let mut rx = pending
            .register(&id)
            .ok_or_else(|| TransportError::InvalidResponse(format!("duplicate request id {}", id)))?;
        let _guard = PendingGuard { pending, id: &id };

        self.write_frame(&frame).await?;
        debug!(method = %method, id = %id, bytes = frame.len(), "Request sent");

        let started = Instant::now();
        tokio::select! {
            outcome = &mut rx => {
                let outcome = outcome.unwrap_or(Err(TransportError::Disconnected));
                debug!(
                    method = %method,
                    id = %id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    ok = outcome.is_ok(),
                    "Call resolved"
                );
                outcome
            }
            _ = tokio::time::sleep(timeout) => {
                if pending.take(&id).is_some() {
                    warn!(method = %method, id = %id, timeout_secs = timeout.as_secs(), "Call timed out");
                    Err(TransportError::Timeout {
                        method: method.to_string(),
                        timeout,
                    })
                } else {
                    // Resolved in the same instant; the sender already owns the outcome.
                    rx.await.unwrap_or(Err(TransportError::Disconnected))
                }
            }
        }
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut writer = self.inner.writer.lock().await;
        let writer = writer.as_mut().ok_or(TransportError::NotConnected)?;
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

async fn read_loop(mut reader: ReadHalf<BoxedStream>, shared: Arc<Shared>, idle_backoff: Duration) {
    let mut buffer: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                // Short worker-side operations leave gaps on the channel; not an EOF.
                tokio::time::sleep(idle_backoff).await;
            }
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=end).collect();
                    dispatch_frame(&line[..end], &shared.pending);
                }
                if buffer.len() > MAX_FRAME_BYTES {
                    warn!(bytes = buffer.len(), "Oversized frame discarded");
                    buffer.clear();
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(error = %e, "Worker read failed");
                let failed = shared.pending.fail_all();
                *shared.state() = ConnectionState::Error;
                info!(failed_calls = failed, "Read loop stopped");
                return;
            }
        }
    }
}

fn dispatch_frame(line: &[u8], pending: &PendingTable) {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return;
    }

    let response: Response = match serde_json::from_str(text) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, bytes = line.len(), "Dropping malformed frame");
            return;
        }
    };

    let id = response.id.clone();
    if !pending.resolve(&id, Ok(response)) {
        debug!(id = %id, "Response for unknown or expired request");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::StreamConnector;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};
    use tokio::task::JoinSet;

    type Reply = Option<(Duration, Response)>;

    /// In-process worker: answers `ping` immediately and everything else
    /// through `reply`.
    fn spawn_worker<F>(stream: DuplexStream, reply: F) -> JoinHandle<()>
    where
        F: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        tokio::spawn(async move {
            let (read, write) = tokio::io::split(stream);
            let write = Arc::new(tokio::sync::Mutex::new(write));
            let mut lines = BufReader::new(read).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(request) = serde_json::from_str::<Request>(&line) else {
                    continue;
                };
                let answer = if request.method == methods::PING {
                    Some((Duration::ZERO, Response::success(&request.id, json!("pong"))))
                } else {
                    reply(&request)
                };
                let Some((delay, response)) = answer else {
                    continue;
                };

                let write = write.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let mut frame = serde_json::to_vec(&response).unwrap();
                    frame.push(b'\n');
                    let _ = write.lock().await.write_all(&frame).await;
                });
            }
        })
    }

    async fn connected<F>(reply: F) -> Transport
    where
        F: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let (client, server) = tokio::io::duplex(1 << 20);
        spawn_worker(server, reply);
        let transport = Transport::new(StreamConnector::new(client), TimeoutPolicy::default());
        transport.connect().await.unwrap();
        transport
    }

    fn after(delay: Duration, request: &Request, result: Value) -> Reply {
        Some((delay, Response::success(&request.id, result)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_screenshot_reply_inside_timeout() {
        let transport = connected(|req| after(Duration::from_secs(45), req, json!({"image": "aGk="}))).await;

        let value = transport.call_value(methods::SCREENSHOT, None).await.unwrap();
        assert_eq!(value["image"], "aGk=");
        assert_eq!(transport.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_screenshot_reply_past_timeout() {
        let transport = connected(|req| after(Duration::from_secs(65), req, json!({"image": "aGk="}))).await;

        let err = transport.call(methods::SCREENSHOT, None).await.unwrap_err();
        match err {
            TransportError::Timeout { method, timeout } => {
                assert_eq!(method, "screenshot");
                assert_eq!(timeout, Duration::from_secs(60));
            }
            other => panic!("unexpected: {}", other),
        }
        assert_eq!(transport.pending_count(), 0);

        // The late reply is dropped without disturbing later calls
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(transport.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flood_resolves_every_call_exactly_once() {
        let transport = connected(|req| {
            let delay_ms = req.params.as_ref().and_then(|p| p["delay_ms"].as_u64()).unwrap_or(0);
            after(Duration::from_millis(delay_ms), req, json!({"echo": delay_ms}))
        })
        .await;

        let mut calls = JoinSet::new();
        for i in 0..64u64 {
            let delay_ms = (i * 1_300) % 40_000;
            let transport = transport.clone();
            calls.spawn(async move {
                let outcome = transport.call_value(methods::CLICK, Some(json!({"delay_ms": delay_ms}))).await;
                (delay_ms, outcome)
            });
        }

        let mut resolved = 0;
        let mut timed_out = 0;
        while let Some(joined) = calls.join_next().await {
            let (delay_ms, outcome) = joined.unwrap();
            if delay_ms < 30_000 {
                assert_eq!(outcome.unwrap()["echo"], delay_ms);
                resolved += 1;
            } else {
                assert!(matches!(outcome, Err(TransportError::Timeout { .. })));
                timed_out += 1;
            }
        }

        assert_eq!(resolved + timed_out, 64);
        assert!(timed_out > 0);
        assert_eq!(transport.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_fails_waiters() {
        let transport = connected(|_| None).await;

        let waiter = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.call(methods::TYPE_TEXT, Some(json!({"text": "hi"}))).await })
        };
        while transport.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        transport.disconnect().await;
        assert!(matches!(waiter.await.unwrap(), Err(TransportError::Disconnected)));
        assert_eq!(transport.pending_count(), 0);
        assert_eq!(transport.state(), ConnectionState::Disconnected);

        // Idempotent, and calls now fail fast
        transport.disconnect().await;
        assert!(matches!(
            transport.call(methods::CLICK, None).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_during_probe_wins() {
        let (client, _server) = tokio::io::duplex(1024);
        let transport = Transport::new(StreamConnector::new(client), TimeoutPolicy::default());

        let connecting = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.connect().await })
        };
        while transport.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.state(), ConnectionState::Connecting);

        transport.disconnect().await;
        assert!(matches!(connecting.await.unwrap(), Err(TransportError::Disconnected)));
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.pending_count(), 0);
        assert!(matches!(
            transport.call(methods::CLICK, None).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_is_reentrant() {
        let transport = connected(|req| after(Duration::ZERO, req, json!(true))).await;

        // The stream connector can only open once, so a second real connect would fail
        transport.connect().await.unwrap();
        assert!(transport.is_connected());
        assert_eq!(transport.call_value(methods::CLICK, None).await.unwrap(), json!(true));
    }

    #[tokio::test]
    async fn test_connect_failure_sets_error_state() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Transport::new(
            crate::connector::UnixSocketConnector::new(dir.path().join("missing.sock")),
            TimeoutPolicy::default(),
        );

        assert!(matches!(transport.connect().await, Err(TransportError::NoDevice(_))));
        assert_eq!(transport.state(), ConnectionState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_worker_fails_probe() {
        let (client, server) = tokio::io::duplex(1024);
        let transport = Transport::new(StreamConnector::new(client), TimeoutPolicy::default())
            .with_probe_timeout(Duration::from_secs(2));

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        assert_eq!(transport.state(), ConnectionState::Error);
        assert_eq!(transport.pending_count(), 0);
        drop(server);
    }

    #[tokio::test]
    async fn test_remote_error_surfaces() {
        let transport = connected(|req| Some((Duration::ZERO, Response::failure(&req.id, -32000, "no display")))).await;

        match transport.call_value(methods::SCREENSHOT, None).await {
            Err(TransportError::RemoteError { code, message }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "no display");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_and_split_frames() {
        let (client, server) = tokio::io::duplex(1024);
        let transport = Transport::new(StreamConnector::new(client), TimeoutPolicy::default());

        let worker = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();

            let ping: Request = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            let mut frame = serde_json::to_vec(&Response::success(&ping.id, json!("pong"))).unwrap();
            frame.push(b'\n');
            write.write_all(&frame).await.unwrap();

            let call: Request = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            write.write_all(b"this is not json\n\n").await.unwrap();

            let mut frame = serde_json::to_vec(&Response::success(&call.id, json!({"x": 1, "y": 2}))).unwrap();
            frame.push(b'\n');
            let (head, tail) = frame.split_at(frame.len() / 2);
            write.write_all(head).await.unwrap();
            write.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            write.write_all(tail).await.unwrap();

            // Keep the stream open until the test is done
            let _ = lines.next_line().await;
        });

        transport.connect().await.unwrap();
        let value = transport.call_value(methods::CURSOR_POSITION, None).await.unwrap();
        assert_eq!(value, json!({"x": 1, "y": 2}));
        assert!(transport.is_connected());

        transport.disconnect().await;
        worker.abort();
    }
}
