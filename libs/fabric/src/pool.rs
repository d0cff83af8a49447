//! Connection pool for a single remote address.
//!
//! Every borrowed connection holds one semaphore permit, so at most
//! `max_open` connections are in use at once and each is used by one call
//! at a time. Released connections go back on a LIFO idle list; connections that
//! sat idle longer than `idle_timeout` are closed on the next acquire.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};
use crate::transport::{TcpTransport, Transport};

/// Connection pool configuration.
///
/// Times are in milliseconds so the struct can be read straight out of a
/// config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections opened by [`ConnectionPool::warm_up`]
    pub initial: usize,
    /// Idle connections kept around after release
    pub max_idle: usize,
    /// Connections borrowed at the same time
    pub max_open: usize,
    /// Idle connections older than this are closed instead of reused
    pub idle_timeout_ms: u64,
    /// Time allowed for establishing a TCP connection
    pub connect_timeout_ms: u64,
    /// Time allowed for waiting on a free connection
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial: 1,
            max_idle: 10,
            max_open: 30,
            idle_timeout_ms: 60_000,
            connect_timeout_ms: 3_000,
            acquire_timeout_ms: 30_000,
        }
    }
}

impl PoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

struct IdleConnection {
    id: u64,
    transport: TcpTransport,
    returned_at: Instant,
}

struct PoolShared {
    addr: SocketAddr,
    config: PoolConfig,
    idle: Mutex<Vec<IdleConnection>>,
    permits: Arc<Semaphore>,
    opened: AtomicUsize,
    next_id: AtomicU64,
}

impl PoolShared {
    fn idle(&self) -> MutexGuard<'_, Vec<IdleConnection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recently returned connection that has not gone stale
    fn take_idle(&self) -> Option<IdleConnection> {
        let idle_timeout = self.config.idle_timeout();
        let mut idle = self.idle();
        while let Some(conn) = idle.pop() {
            if conn.returned_at.elapsed() <= idle_timeout {
                return Some(conn);
            }
            tracing::debug!(addr = %self.addr, conn = conn.id, "Closing stale idle connection");
        }
        None
    }

    fn put_idle(&self, id: u64, transport: TcpTransport) {
        let mut idle = self.idle();
        if idle.len() >= self.config.max_idle {
            tracing::debug!(addr = %self.addr, conn = id, "Idle list full, closing connection");
            return;
        }
        idle.push(IdleConnection {
            id,
            transport,
            returned_at: Instant::now(),
        });
    }

    async fn open(&self) -> Result<(u64, TcpTransport)> {
        let transport = TcpTransport::builder()
            .address(self.addr)
            .connect_timeout(self.config.connect_timeout())
            .connect()
            .await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.opened.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(addr = %self.addr, conn = id, "Opened connection");
        Ok((id, transport))
    }
}

/// Pool of TCP connections to one server.
///
/// Cloning is cheap and clones share the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a pool without opening any connection yet
    pub fn new(addr: SocketAddr, config: PoolConfig) -> Result<Self> {
        if config.max_open == 0 {
            return Err(Error::custom("Pool max_open must be at least 1"));
        }

        Ok(Self {
            shared: Arc::new(PoolShared {
                addr,
                permits: Arc::new(Semaphore::new(config.max_open)),
                config,
                idle: Mutex::new(Vec::new()),
                opened: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    /// Open the configured number of initial connections
    pub async fn warm_up(&self) -> Result<()> {
        let shared = &self.shared;
        let wanted = shared.config.initial.min(shared.config.max_idle);
        let missing = wanted.saturating_sub(self.idle_count());
        for _ in 0..missing {
            let (id, transport) = shared.open().await?;
            shared.put_idle(id, transport);
        }
        Ok(())
    }

    /// Borrow a connection, waiting up to `acquire_timeout` for a free slot.
    ///
    /// The connection must be handed back with
    /// [`PooledConnection::release`]; dropping it instead closes it.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let timeout = self.shared.config.acquire_timeout();
        let permit = tokio::time::timeout(timeout, self.shared.permits.clone().acquire_owned())
            .await
            .map_err(|_| Error::PoolTimeout(timeout))?
            .map_err(|_| Error::custom("Connection pool closed"))?;

        let (id, transport) = match self.shared.take_idle() {
            Some(idle) => (idle.id, idle.transport),
            None => self.shared.open().await?,
        };

        Ok(PooledConnection {
            id,
            transport: Some(transport),
            shared: self.shared.clone(),
            _permit: permit,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.shared.addr
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Connections sitting in the idle list
    pub fn idle_count(&self) -> usize {
        self.shared.idle().len()
    }

    /// Connections currently borrowed
    pub fn in_use(&self) -> usize {
        self.shared.config.max_open - self.shared.permits.available_permits()
    }

    /// Connections opened over the pool's lifetime
    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::Relaxed)
    }
}

/// A connection borrowed from a [`ConnectionPool`]
///
/// Exactly one holder at a time. If it is dropped without
/// [`release`](Self::release), for instance after an I/O error left a frame
/// half written or half read, the connection is closed rather than reused.
pub struct PooledConnection {
    id: u64,
    transport: Option<TcpTransport>,
    shared: Arc<PoolShared>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn transport(&mut self) -> Result<&mut TcpTransport> {
        self.transport.as_mut().ok_or(Error::ConnectionClosed)
    }

    pub async fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.transport()?.send(frame).await
    }

    pub async fn receive(&mut self) -> Result<Vec<u8>> {
        self.transport()?.receive().await
    }

    /// Return the connection to the pool for the next caller
    pub fn release(mut self) {
        if let Some(transport) = self.transport.take() {
            self.shared.put_idle(self.id, transport);
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.transport.is_some() {
            tracing::warn!(addr = %self.shared.addr, conn = self.id, "Discarding connection");
        }
    }
}
