//! Client side: the invocation proxy, bound method stubs and the binder.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{BincodeSerializer, Compressor, Serializer, ZstdCompressor};
use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::pool::{ConnectionPool, PoolConfig};
use crate::reply::Reply;
use courier_core::{Request, Response};

pub mod binder;
pub mod stub;

pub use self::binder::{Binder, Binding, ClientStub, ServiceDescriptor};
pub use self::stub::MethodStub;

/// Anything that can carry a request to a server and bring back its response
#[async_trait::async_trait]
pub trait Proxy: Send + Sync {
    async fn invoke(&self, ctx: &CallContext, request: Request) -> Result<Response>;
}

/// RPC client for one server address
///
/// Cheap to clone; clones share the connection pool and codecs.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    pool: ConnectionPool,
    serializer: Arc<dyn Serializer>,
    compressor: Arc<dyn Compressor>,
    next_request_id: AtomicU64,
}

impl Client {
    /// Connect with default codecs and pool settings
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::builder().address(addr).connect().await
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    pub fn serializer(&self) -> Arc<dyn Serializer> {
        self.inner.serializer.clone()
    }

    pub fn compressor(&self) -> Arc<dyn Compressor> {
        self.inner.compressor.clone()
    }

    /// Binder producing stubs that go through this client
    pub fn binder(&self) -> Binder {
        Binder::new(
            Arc::new(self.clone()),
            self.serializer(),
            self.compressor(),
        )
    }

    /// Bind every method of a generated client stub
    pub fn init_service<S: ClientStub>(&self) -> Result<S> {
        self.binder().bind()
    }

    /// Call `service.method` with `arg` without a generated stub
    pub async fn call<A, R>(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        arg: &A,
    ) -> Reply<R>
    where
        A: Serialize + Sync,
        R: DeserializeOwned,
    {
        MethodStub::new(
            service,
            method,
            Arc::new(self.clone()),
            self.serializer(),
            self.compressor(),
        )
        .call(ctx, arg)
        .await
    }
}

#[async_trait::async_trait]
impl Proxy for Client {
    /// Race the round trip against the call context.
    ///
    /// When the context finishes first its error is returned at once. A
    /// request still waiting for a connection is abandoned unsent; one that
    /// was already written keeps running in its own task, which reads and
    /// drops the late response and hands the connection back to the pool.
    async fn invoke(&self, ctx: &CallContext, mut request: Request) -> Result<Response> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        if request.request_id == 0 {
            request.request_id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        }
        let request_id = request.request_id;

        let round_trip = tokio::spawn(round_trip(self.inner.pool.clone(), request, ctx.clone()));

        tokio::select! {
            err = ctx.done() => {
                tracing::debug!(request_id, error = %err, "Call context finished before the response");
                Err(err)
            }
            joined = round_trip => match joined {
                Ok(result) => result,
                Err(e) => Err(Error::custom(format!("Round trip task failed: {e}"))),
            },
        }
    }
}

async fn round_trip(pool: ConnectionPool, mut request: Request, ctx: CallContext) -> Result<Response> {
    let frame = request.encode()?;
    let request_id = request.request_id;

    let mut conn = tokio::select! {
        err = ctx.done() => return Err(err),
        conn = pool.acquire() => conn?,
    };
    // Nothing written yet: a finished caller means the request is never sent
    if let Some(err) = ctx.err() {
        conn.release();
        tracing::debug!(request_id, error = %err, "Call context finished before the request was sent");
        return Err(err);
    }
    conn.send(&frame).await?;

    if ctx.is_oneway() {
        conn.release();
        tracing::debug!(request_id, "Oneway request sent");
        return Err(Error::Oneway);
    }

    let bytes = conn.receive().await?;
    // The frame was read whole, so the connection is clean even if decoding fails
    conn.release();

    let response = Response::decode(&bytes)?;
    if response.request_id != request_id {
        tracing::warn!(
            request_id,
            got = response.request_id,
            "Response id does not match request"
        );
    }
    Ok(response)
}

/// Builder for configuring a [`Client`]
pub struct ClientBuilder {
    address: Option<SocketAddr>,
    serializer: Arc<dyn Serializer>,
    compressor: Arc<dyn Compressor>,
    pool: PoolConfig,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            address: None,
            serializer: Arc::new(BincodeSerializer),
            compressor: Arc::new(ZstdCompressor::default()),
            pool: PoolConfig::default(),
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server address
    pub fn address(mut self, addr: SocketAddr) -> Self {
        self.address = Some(addr);
        self
    }

    /// Serializer for arguments and results (bincode by default)
    pub fn serializer(mut self, serializer: impl Serializer) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Compressor for data segments (zstd by default)
    pub fn compressor(mut self, compressor: impl Compressor) -> Self {
        self.compressor = Arc::new(compressor);
        self
    }

    pub fn pool(mut self, config: PoolConfig) -> Self {
        self.pool = config;
        self
    }

    /// Build the client without touching the network
    pub fn build(self) -> Result<Client> {
        let addr = self
            .address
            .ok_or_else(|| Error::Custom("Address not set".to_string()))?;
        let pool = ConnectionPool::new(addr, self.pool)?;

        Ok(Client {
            inner: Arc::new(ClientInner {
                pool,
                serializer: self.serializer,
                compressor: self.compressor,
                next_request_id: AtomicU64::new(1),
            }),
        })
    }

    /// Build the client and open the pool's initial connections
    pub async fn connect(self) -> Result<Client> {
        let client = self.build()?;
        client.inner.pool.warm_up().await?;
        tracing::debug!(addr = %client.inner.pool.addr(), "Client connected");
        Ok(client)
    }
}
