use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::codec::CodecRegistry;
use crate::context::CallContext;
use crate::error::Error;
use crate::server::handler::ServiceRegistration;
use courier_core::{Request, Response};

/// Result of dispatching one request
///
/// `response` is always a writable shell carrying the request's id and
/// codes. `error` is a dispatch failure, a business error returned by the
/// method, or [`Error::OnewayDispatched`] when nothing should be written.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub response: Response,
    pub error: Option<Error>,
}

impl DispatchOutcome {
    fn failed(response: Response, error: Error) -> Self {
        Self {
            response,
            error: Some(error),
        }
    }

    /// Whether the listener should skip writing a response
    pub fn is_oneway(&self) -> bool {
        matches!(self.error, Some(Error::OnewayDispatched))
    }
}

/// Routes decoded requests to registered service methods
pub struct Dispatcher {
    services: HashMap<String, ServiceRegistration>,
    codecs: CodecRegistry,
    oneway_slots: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        services: HashMap<String, ServiceRegistration>,
        codecs: CodecRegistry,
        max_oneway_tasks: usize,
    ) -> Self {
        Self {
            services,
            codecs,
            oneway_slots: Arc::new(Semaphore::new(max_oneway_tasks)),
        }
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Free oneway slots right now
    pub fn oneway_capacity(&self) -> usize {
        self.oneway_slots.available_permits()
    }

    /// Run `request` against its method. `request.data` must already be decompressed.
    pub async fn invoke(&self, ctx: &CallContext, request: Request) -> DispatchOutcome {
        let mut response = Response::for_request(&request);

        let Some(service) = self.services.get(&request.service_name) else {
            return DispatchOutcome::failed(
                response,
                Error::ServiceNotFound(request.service_name),
            );
        };

        let serializer = match self.codecs.serializer(request.serializer) {
            Ok(serializer) => serializer,
            Err(e) => return DispatchOutcome::failed(response, e),
        };
        let compressor = match self.codecs.compressor(request.compressor) {
            Ok(compressor) => compressor,
            Err(e) => return DispatchOutcome::failed(response, e),
        };

        let Some(handler) = service.handler(&request.method_name) else {
            return DispatchOutcome::failed(
                response,
                Error::MethodNotFound {
                    service: request.service_name,
                    method: request.method_name,
                },
            );
        };

        if ctx.is_oneway() {
            match self.oneway_slots.clone().try_acquire_owned() {
                Ok(permit) => {
                    let ctx = ctx.clone();
                    let service_name = request.service_name;
                    let method_name = request.method_name;
                    tokio::spawn(async move {
                        let output = handler.call(ctx, request.data, serializer).await;
                        if let Some(err) = output.error {
                            tracing::debug!(
                                service = %service_name,
                                method = %method_name,
                                error = %err,
                                "Oneway call returned an error"
                            );
                        }
                        drop(permit);
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        service = %request.service_name,
                        method = %request.method_name,
                        "Oneway slots exhausted, dropping call"
                    );
                }
            }
            return DispatchOutcome::failed(response, Error::OnewayDispatched);
        }

        let output = handler.call(ctx.clone(), request.data, serializer).await;

        if let Some(data) = output.data.filter(|d| !d.is_empty()) {
            match compressor.zip(&data) {
                Ok(zipped) => response.data = zipped,
                Err(e) => return DispatchOutcome::failed(response, e),
            }
        }

        DispatchOutcome {
            response,
            error: output.error,
        }
    }
}
