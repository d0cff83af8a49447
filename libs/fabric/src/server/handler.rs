//! Method table entries: typed service methods erased to byte handlers.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Serializer;
use crate::context::CallContext;
use crate::error::Error;
use crate::reply::Reply;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler produced: serialized result bytes and/or a business error
#[derive(Debug, Default)]
pub struct HandlerOutput {
    pub data: Option<Vec<u8>>,
    pub error: Option<Error>,
}

impl HandlerOutput {
    fn failed(error: Error) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }
}

/// Trait for handler functions working on raw payload bytes.
pub trait Handler: Send + Sync + 'static {
    fn call(
        &self,
        ctx: CallContext,
        payload: Vec<u8>,
        serializer: Arc<dyn Serializer>,
    ) -> BoxFuture<'static, HandlerOutput>;
}

/// Wrapper that decodes the argument and encodes the result around a typed method.
pub struct TypedHandler<F, A, R, Fut> {
    handler: F,
    _phantom: PhantomData<fn(A) -> (R, Fut)>,
}

impl<F, A, R, Fut> TypedHandler<F, A, R, Fut>
where
    F: Fn(CallContext, A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Reply<R>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, A, R, Fut> Handler for TypedHandler<F, A, R, Fut>
where
    F: Fn(CallContext, A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Reply<R>> + Send + 'static,
{
    fn call(
        &self,
        ctx: CallContext,
        payload: Vec<u8>,
        serializer: Arc<dyn Serializer>,
    ) -> BoxFuture<'static, HandlerOutput> {
        let arg: A = match serializer.decode_value(&payload) {
            Ok(arg) => arg,
            Err(e) => return Box::pin(async move { HandlerOutput::failed(e) }),
        };

        let fut = (self.handler)(ctx, arg);
        Box::pin(async move {
            let reply = fut.await;
            // A business error does not stop a partial result from being sent
            let data = match reply.value {
                Some(value) => match serializer.encode_value(&value) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => return HandlerOutput::failed(e),
                },
                None => None,
            };
            HandlerOutput {
                data,
                error: reply.error,
            }
        })
    }
}

/// A named service and its method table, ready to hand to a server
#[derive(Clone)]
pub struct ServiceRegistration {
    name: String,
    methods: HashMap<String, Arc<dyn Handler>>,
}

impl ServiceRegistration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Add a typed method under its remote name
    pub fn method<F, A, R, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CallContext, A) -> Fut + Send + Sync + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = Reply<R>> + Send + 'static,
    {
        self.methods
            .insert(name.into(), Arc::new(TypedHandler::new(handler)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.methods.get(method).cloned()
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}
