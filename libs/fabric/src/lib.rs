//! Courier Fabric - RPC client, server and codec layer
//!
//! Builds on the framing in `courier-core` to provide pooled TCP clients,
//! typed stubs, a dispatching server and pluggable serializers/compressors.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use courier_fabric::{service, CallContext, Client, Reply, Server};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! pub struct GetByIdReq { pub id: i64 }
//!
//! #[derive(Serialize, Deserialize)]
//! pub struct GetByIdResp { pub msg: String }
//!
//! service! {
//!     pub trait UserService, client UserClient, name "user-service" {
//!         fn get_by_id(GetByIdReq) -> GetByIdResp as "GetById";
//!     }
//! }
//!
//! struct Users;
//!
//! #[courier_fabric::async_trait]
//! impl UserService for Users {
//!     async fn get_by_id(&self, _ctx: &CallContext, req: GetByIdReq) -> Reply<GetByIdResp> {
//!         Reply::ok(GetByIdResp { msg: format!("user {}", req.id) })
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = Server::builder()
//!     .service(Arc::new(Users).into_registration())
//!     .bind("127.0.0.1:8080".parse()?)
//!     .await?;
//! tokio::spawn(server.serve());
//!
//! let client = Client::connect("127.0.0.1:8080".parse()?).await?;
//! let users: UserClient = client.init_service()?;
//! let ctx = CallContext::with_timeout(std::time::Duration::from_secs(1));
//! let resp = users.get_by_id(&ctx, &GetByIdReq { id: 123 }).await.into_result()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod context;
pub mod error;
pub mod pool;
pub mod reply;
pub mod server;
pub mod transport;

mod macros;

#[doc(hidden)]
pub use async_trait::async_trait;

// Re-exports for convenience
pub use client::{Client, ClientBuilder, ClientStub, MethodStub, Proxy};
pub use codec::{CodecRegistry, Compressor, Serializer};
pub use context::{CallContext, CallOptions, CancelHandle};
pub use error::{Error, Result};
pub use pool::{ConnectionPool, PoolConfig};
pub use reply::Reply;
pub use server::{Server, ServerBuilder, ServerConfig, ServiceRegistration};
