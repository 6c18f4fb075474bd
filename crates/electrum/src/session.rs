//! # Electrum Session
//!
//! A single persistent connection to an Electrum server, shared by any
//! number of concurrent callers.
//!
//! Requests are tagged with a session-unique id and written as one JSON line
//! each. A background reader routes replies back to the waiting caller by id
//! and fans server pushes out to every subscriber of the push's method.
//! Any read or write failure shuts the session down: outstanding callers are
//! released with [`ElectrumError::Shutdown`] and subscriber channels close.

use crate::envelope::{Frame, Notification, RequestEnvelope};
use crate::error::{ElectrumError, Result};
use crate::transport;
use parking_lot::{Mutex, RwLock};
use rustls::ClientConfig;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Default per-call deadline
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default keep-alive interval
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);

/// Default per-subscriber notification buffer
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 16;

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for each call, covering both the write and the reply
    pub request_timeout: Duration,
    /// Interval between `server.ping` keep-alives; `None` disables them
    pub ping_interval: Option<Duration>,
    /// Capacity of each subscriber channel; pushes beyond it are dropped
    pub subscription_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            ping_interval: Some(DEFAULT_PING_INTERVAL),
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
        }
    }
}

/// Lifecycle of a session
///
/// `Disconnected -> Connecting -> Open -> ShuttingDown -> Closed`. A failed
/// connect returns to `Disconnected`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    ShuttingDown,
    Closed,
}

type PendingTable = HashMap<u64, oneshot::Sender<Frame>>;
type SubscriberTable = HashMap<String, Vec<mpsc::Sender<Notification>>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Handle to a shared Electrum session
///
/// Cloning is cheap; all clones talk over the same connection. The
/// background tasks stop once the last handle is dropped.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    peer: Mutex<String>,
    state: Mutex<SessionState>,
    next_id: AtomicU64,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    pending: Mutex<Option<PendingTable>>,
    subscribers: RwLock<Option<SubscriberTable>>,
    shutdown: CancellationToken,
    close_cause: Mutex<Option<ElectrumError>>,
}

impl Session {
    /// Create a disconnected session
    pub fn new(config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                peer: Mutex::new(String::new()),
                state: Mutex::new(SessionState::Disconnected),
                next_id: AtomicU64::new(1),
                writer: tokio::sync::Mutex::new(None),
                pending: Mutex::new(Some(HashMap::new())),
                subscribers: RwLock::new(Some(HashMap::new())),
                shutdown: CancellationToken::new(),
                close_cause: Mutex::new(None),
            }),
        }
    }

    /// Build a session and connect it over plain TCP
    pub async fn connect_tcp(addr: &str, config: SessionConfig) -> Result<Self> {
        let session = Self::new(config);
        session.connect(addr, None).await?;
        Ok(session)
    }

    /// Build a session and connect it over TLS
    pub async fn connect_tls(
        addr: &str,
        tls: Arc<ClientConfig>,
        config: SessionConfig,
    ) -> Result<Self> {
        let session = Self::new(config);
        session.connect(addr, Some(tls)).await?;
        Ok(session)
    }

    /// Open a TCP connection, wrapped in TLS when `tls` is given
    pub async fn connect(&self, addr: &str, tls: Option<Arc<ClientConfig>>) -> Result<()> {
        self.inner.begin_connect()?;

        let timeout = self.inner.config.request_timeout;
        let attached = match tls {
            Some(tls) => match transport::connect_tls(addr, tls, timeout).await {
                Ok(stream) => self.attach(stream, addr.to_string()).await,
                Err(e) => Err(e),
            },
            None => match transport::connect_tcp(addr, timeout).await {
                Ok(stream) => self.attach(stream, addr.to_string()).await,
                Err(e) => Err(e),
            },
        };

        if let Err(e) = &attached {
            warn!("Failed to connect Electrum session to {}: {}", addr, e);
            self.inner.abort_connect();
        }
        attached
    }

    /// Run the session over an already-established stream
    pub async fn connect_stream<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.inner.begin_connect()?;
        self.attach(stream, "stream".to_string()).await
    }

    async fn attach<S>(&self, stream: S, peer: String) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        *self.inner.writer.lock().await = Some(Box::new(write_half));
        *self.inner.peer.lock() = peer.clone();

        {
            let mut state = self.inner.state.lock();
            if *state != SessionState::Connecting {
                // closed while the connection was being established
                return Err(ElectrumError::Shutdown);
            }
            *state = SessionState::Open;
        }

        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.shutdown.clone();
        tokio::spawn(read_loop(weak.clone(), token.clone(), read_half));

        if let Some(every) = self.inner.config.ping_interval {
            tokio::spawn(keep_alive(weak, token, every));
        }

        info!("Electrum session open to {}", peer);
        Ok(())
    }

    /// Issue a call and decode its result into `T`
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let value = self.call_raw(method, params).await?;
        serde_json::from_value(value).map_err(|e| ElectrumError::Decode {
            context: format!("result of {method}"),
            message: e.to_string(),
        })
    }

    /// Issue a call and return its raw JSON result
    pub async fn call_raw(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.inner.ensure_open()?;

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let line = RequestEnvelope {
            id,
            method,
            params: &params,
        }
        .to_line()?;

        let (tx, rx) = oneshot::channel();
        match self.inner.pending.lock().as_mut() {
            Some(table) => {
                table.insert(id, tx);
            }
            None => return Err(ElectrumError::Shutdown),
        }

        let timeout = self.inner.config.request_timeout;
        let deadline = Instant::now() + timeout;
        let timed_out = || ElectrumError::Timeout {
            method: method.to_string(),
            timeout,
        };

        match self.inner.write_line(&line, deadline).await {
            Ok(true) => trace!(id, method, "Electrum request written"),
            Ok(false) => {
                self.inner.forget(id);
                debug!(id, method, "Electrum request timed out before it was written");
                return Err(timed_out());
            }
            Err(e) => {
                self.inner.forget(id);
                return Err(e);
            }
        }

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(frame)) => frame.into_result(),
            Ok(Err(_)) => Err(ElectrumError::Shutdown),
            Err(_) => {
                self.inner.forget(id);
                debug!(id, method, "Electrum request timed out");
                Err(timed_out())
            }
        }
    }

    /// Register interest in pushes for `method`
    ///
    /// The receiver yields `None` once the session shuts down. Subscribing
    /// does not send anything to the server.
    pub fn subscribe(&self, method: &str) -> Result<mpsc::Receiver<Notification>> {
        self.inner.ensure_open()?;

        let (tx, rx) = mpsc::channel(self.inner.config.subscription_buffer.max(1));
        match self.inner.subscribers.write().as_mut() {
            Some(table) => {
                table.entry(method.to_string()).or_default().push(tx);
                Ok(rx)
            }
            None => Err(ElectrumError::Shutdown),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Number of calls still waiting for a reply
    pub fn outstanding_calls(&self) -> usize {
        self.inner
            .pending
            .lock()
            .as_ref()
            .map_or(0, |table| table.len())
    }

    /// Shut the session down from the client side
    pub async fn close(&self) {
        self.inner.shutdown(ElectrumError::Shutdown);
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Error closing Electrum writer: {}", e);
            }
        }
    }

    /// Wait until the session shuts down and return what caused it
    pub async fn closed(&self) -> ElectrumError {
        self.inner.shutdown.cancelled().await;
        self.inner
            .close_cause
            .lock()
            .clone()
            .unwrap_or(ElectrumError::Shutdown)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &*self.inner.peer.lock())
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    fn begin_connect(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            SessionState::Disconnected => {
                *state = SessionState::Connecting;
                Ok(())
            }
            SessionState::ShuttingDown | SessionState::Closed => Err(ElectrumError::Shutdown),
            SessionState::Connecting | SessionState::Open => Err(ElectrumError::AlreadyConnected),
        }
    }

    fn abort_connect(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Connecting {
            *state = SessionState::Disconnected;
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match *self.state.lock() {
            SessionState::Open => Ok(()),
            SessionState::Disconnected | SessionState::Connecting => {
                Err(ElectrumError::NotConnected)
            }
            SessionState::ShuttingDown | SessionState::Closed => Err(ElectrumError::Shutdown),
        }
    }

    /// Write one request line, giving up at `deadline`
    ///
    /// Returns `Ok(false)` when the deadline passes first. A line abandoned
    /// part way through corrupts the framing, so that also shuts the session
    /// down.
    async fn write_line(&self, line: &[u8], deadline: Instant) -> Result<bool> {
        let Ok(mut guard) = tokio::time::timeout_at(deadline, self.writer.lock()).await else {
            return Ok(false);
        };
        let writer = guard.as_mut().ok_or(ElectrumError::Shutdown)?;

        let write = async {
            match writer.write_all(line).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };

        match tokio::time::timeout_at(deadline, write).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(e)) => {
                let cause = ElectrumError::Transport {
                    message: format!("write failed: {e}"),
                };
                self.shutdown(cause.clone());
                Err(cause)
            }
            Err(_) => {
                self.shutdown(ElectrumError::Transport {
                    message: "write stalled past the request deadline".to_string(),
                });
                Ok(false)
            }
        }
    }

    fn forget(&self, id: u64) {
        if let Some(table) = self.pending.lock().as_mut() {
            table.remove(&id);
        }
    }

    fn dispatch(&self, line: &str) {
        let frame = match Frame::parse(line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping unparseable frame from {}: {}", self.peer.lock(), e);
                return;
            }
        };

        if let Some(method) = frame.method.as_deref() {
            self.notify(method, &frame);
        }

        if let Some(id) = frame.id {
            let waiter = self.pending.lock().as_mut().and_then(|t| t.remove(&id));
            match waiter {
                Some(tx) => {
                    // caller may have given up between lookup and send
                    let _ = tx.send(frame);
                }
                None => debug!(id, "Dropping reply with no outstanding call"),
            }
        }
    }

    fn notify(&self, method: &str, frame: &Frame) {
        let mut saw_closed = false;
        {
            let guard = self.subscribers.read();
            let Some(subscribers) = guard.as_ref().and_then(|t| t.get(method)) else {
                trace!(method, "No subscribers for push");
                return;
            };

            let notification = Notification {
                method: method.to_string(),
                params: frame.push_payload(),
            };
            for tx in subscribers {
                match tx.try_send(notification.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(method, "Subscriber buffer full, dropping push");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => saw_closed = true,
                }
            }
        }

        if saw_closed {
            if let Some(table) = self.subscribers.write().as_mut() {
                if let Some(list) = table.get_mut(method) {
                    list.retain(|tx| !tx.is_closed());
                    if list.is_empty() {
                        table.remove(method);
                    }
                }
            }
        }
    }

    /// Move to `Closed`, release every waiter and close every subscriber
    ///
    /// Only the first call has any effect.
    fn shutdown(&self, cause: ElectrumError) -> bool {
        {
            let mut state = self.state.lock();
            if matches!(*state, SessionState::ShuttingDown | SessionState::Closed) {
                return false;
            }
            *state = SessionState::ShuttingDown;
        }

        *self.close_cause.lock() = Some(cause.clone());
        let pending = self.pending.lock().take();
        let subscribers = self.subscribers.write().take();
        self.shutdown.cancel();

        let released = pending.map_or(0, |table| table.len());
        drop(subscribers);
        *self.state.lock() = SessionState::Closed;

        warn!(
            "Electrum session to {} closed ({}), released {} outstanding calls",
            self.peer.lock(),
            cause,
            released
        );
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn read_loop<R>(inner: Weak<Inner>, shutdown: CancellationToken, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return,
            line = lines.next_line() => line,
        };

        let Some(inner) = inner.upgrade() else {
            return;
        };

        match next {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() {
                    inner.dispatch(line);
                }
            }
            Ok(None) => {
                inner.shutdown(ElectrumError::Transport {
                    message: "connection closed by peer".to_string(),
                });
                return;
            }
            Err(e) => {
                inner.shutdown(ElectrumError::Transport {
                    message: format!("read failed: {e}"),
                });
                return;
            }
        }
    }
}

async fn keep_alive(inner: Weak<Inner>, shutdown: CancellationToken, every: Duration) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let session = Session { inner };

        match session.ping().await {
            Ok(()) => trace!("Electrum keep-alive acknowledged"),
            Err(ElectrumError::Shutdown) => return,
            Err(e) => warn!("Electrum keep-alive failed: {}", e),
        }
    }
}
