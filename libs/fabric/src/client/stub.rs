use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::Proxy;
use crate::codec::{Compressor, Serializer};
use crate::context::CallContext;
use crate::error::Error;
use crate::reply::Reply;
use courier_core::{Request, Response};

struct Target {
    service: String,
    method: String,
    proxy: Arc<dyn Proxy>,
    serializer: Arc<dyn Serializer>,
    compressor: Arc<dyn Compressor>,
}

/// A remote method bound to a local callable
///
/// Holds the service and method names plus the shared proxy and codecs;
/// no per-call state.
pub struct MethodStub<A, R> {
    target: Arc<Target>,
    _marker: PhantomData<fn(&A) -> R>,
}

impl<A, R> Clone for MethodStub<A, R> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            _marker: PhantomData,
        }
    }
}

impl<A, R> fmt::Debug for MethodStub<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodStub")
            .field("service", &self.target.service)
            .field("method", &self.target.method)
            .finish()
    }
}

impl<A, R> MethodStub<A, R>
where
    A: Serialize + Sync,
    R: DeserializeOwned,
{
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        proxy: Arc<dyn Proxy>,
        serializer: Arc<dyn Serializer>,
        compressor: Arc<dyn Compressor>,
    ) -> Self {
        Self {
            target: Arc::new(Target {
                service: service.into(),
                method: method.into(),
                proxy,
                serializer,
                compressor,
            }),
            _marker: PhantomData,
        }
    }

    pub fn service(&self) -> &str {
        &self.target.service
    }

    pub fn method(&self) -> &str {
        &self.target.method
    }

    /// Perform the full request/response cycle for one call
    pub async fn call(&self, ctx: &CallContext, arg: &A) -> Reply<R> {
        let target = &*self.target;

        let data = match target
            .serializer
            .encode_value(arg)
            .and_then(|bytes| target.compressor.zip(&bytes))
        {
            Ok(data) => data,
            Err(e) => return Reply::err(e),
        };

        let mut request = Request::new(target.service.as_str(), target.method.as_str());
        request.serializer = target.serializer.code();
        request.compressor = target.compressor.code();
        request.data = data;
        if let Some(deadline) = ctx.deadline() {
            request.set_deadline(deadline);
        }
        if ctx.is_oneway() {
            request.set_oneway();
        }

        match target.proxy.invoke(ctx, request).await {
            Ok(response) => self.decode_response(response),
            Err(e) => Reply::err(e),
        }
    }

    fn decode_response(&self, response: Response) -> Reply<R> {
        let target = &*self.target;
        let remote = response.error_message().map(Error::Remote);

        let payload = match target.compressor.unzip(&response.data) {
            Ok(payload) => payload,
            Err(e) => return Reply::err(e),
        };

        let value = if payload.is_empty() {
            None
        } else {
            match target.serializer.decode_value::<R>(&payload) {
                Ok(value) => Some(value),
                Err(e) => return Reply::err(e),
            }
        };

        Reply {
            value,
            error: remote,
        }
    }
}
