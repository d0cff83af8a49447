//! Server side: method tables, the dispatcher and the listener loop.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;

use crate::codec::{CodecRegistry, Compressor, Serializer};
use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::transport::{TcpTransportListener, Transport};
use courier_core::{Request, Response};

pub mod dispatcher;
pub mod handler;

pub use self::dispatcher::{DispatchOutcome, Dispatcher};
pub use self::handler::{BoxFuture, Handler, HandlerOutput, ServiceRegistration, TypedHandler};

/// Server tuning, loadable from a config file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Oneway calls allowed to run at once; extra ones are dropped
    pub max_oneway_tasks: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_oneway_tasks: 64,
        }
    }
}

/// Builder for configuring a [`Server`]
pub struct ServerBuilder {
    services: HashMap<String, ServiceRegistration>,
    codecs: CodecRegistry,
    config: ServerConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            services: HashMap::new(),
            codecs: CodecRegistry::with_defaults(),
            config: ServerConfig::default(),
        }
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service; a later registration under the same name wins
    pub fn service(mut self, registration: ServiceRegistration) -> Self {
        let name = registration.name().to_string();
        if self.services.insert(name.clone(), registration).is_some() {
            tracing::debug!(service = %name, "Replaced service registration");
        }
        self
    }

    /// Accept an extra serializer code
    pub fn serializer(mut self, serializer: impl Serializer) -> Self {
        self.codecs.register_serializer(serializer);
        self
    }

    /// Accept an extra compressor code
    pub fn compressor(mut self, compressor: impl Compressor) -> Self {
        self.codecs.register_compressor(compressor);
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Freeze the registries into a dispatcher
    pub fn dispatcher(self) -> Dispatcher {
        Dispatcher::new(self.services, self.codecs, self.config.max_oneway_tasks)
    }

    /// Bind a listener and build the server
    pub async fn bind(self, addr: SocketAddr) -> Result<Server> {
        let listener = TcpTransportListener::bind(addr).await?;
        Ok(Server {
            listener,
            dispatcher: Arc::new(self.dispatcher()),
        })
    }
}

/// A bound RPC server
pub struct Server {
    listener: TcpTransportListener,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the process exits
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Accept connections until `signal` resolves
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = self.listener.local_addr()?;
        tracing::info!(%addr, "Server listening");

        tokio::pin!(signal);
        loop {
            tokio::select! {
                _ = &mut signal => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((transport, peer)) => {
                        tracing::debug!(%peer, "Accepted connection");
                        let dispatcher = self.dispatcher.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(transport, &dispatcher).await {
                                tracing::debug!(%peer, error = %e, "Connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        tracing::info!(%addr, "Server stopped");
        Ok(())
    }
}

/// Serve requests on one connection, strictly in order, until the peer leaves
pub async fn serve_connection<T: Transport>(mut transport: T, dispatcher: &Dispatcher) -> Result<()> {
    loop {
        let frame = match transport.receive().await {
            Ok(frame) => frame,
            Err(Error::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut request = Request::decode(&frame)?;
        let ctx = CallContext::from_request(&request);
        tracing::debug!(
            request_id = request.request_id,
            service = %request.service_name,
            method = %request.method_name,
            oneway = ctx.is_oneway(),
            "Received request"
        );

        let outcome = match unzip_data(dispatcher, &mut request) {
            Ok(()) => dispatcher.invoke(&ctx, request).await,
            Err(e) => DispatchOutcome {
                response: Response::for_request(&request),
                error: Some(e),
            },
        };

        if ctx.is_oneway() || outcome.is_oneway() {
            continue;
        }

        let mut response = outcome.response;
        if let Some(err) = outcome.error {
            response.set_error(&err);
        }
        let bytes = response.encode()?;
        transport.send(&bytes).await?;
    }
}

fn unzip_data(dispatcher: &Dispatcher, request: &mut Request) -> Result<()> {
    let compressor = dispatcher.codecs().compressor(request.compressor)?;
    request.data = compressor.unzip(&request.data)?;
    Ok(())
}
