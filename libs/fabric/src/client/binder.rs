use std::collections::HashSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::{MethodStub, Proxy};
use crate::codec::{Compressor, Serializer};
use crate::error::{Error, Result};

/// Static description of a remote service as seen by a client stub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Name the server registered the service under
    pub name: &'static str,
    /// Remote method names, one per stub field
    pub methods: &'static [&'static str],
}

/// A client struct whose fields are bound method stubs
///
/// Usually generated by [`service!`](crate::service).
pub trait ClientStub: Sized {
    fn descriptor() -> ServiceDescriptor;

    /// Build the stub, binding one [`MethodStub`] per declared method
    fn bind(binding: &Binding<'_>) -> Self;
}

/// Turns service descriptions into callable stubs sharing one proxy and codec pair
#[derive(Clone)]
pub struct Binder {
    proxy: Arc<dyn Proxy>,
    serializer: Arc<dyn Serializer>,
    compressor: Arc<dyn Compressor>,
}

impl Binder {
    pub fn new(
        proxy: Arc<dyn Proxy>,
        serializer: Arc<dyn Serializer>,
        compressor: Arc<dyn Compressor>,
    ) -> Self {
        Self {
            proxy,
            serializer,
            compressor,
        }
    }

    /// Check that a descriptor names a service and a flat set of distinct methods
    pub fn validate(descriptor: &ServiceDescriptor) -> Result<()> {
        if descriptor.name.is_empty() {
            return Err(Error::NilService);
        }
        if descriptor.methods.is_empty() {
            return Err(Error::UnsupportedServiceShape(format!(
                "service {} declares no methods",
                descriptor.name
            )));
        }

        let mut seen = HashSet::new();
        for method in descriptor.methods {
            if method.is_empty() {
                return Err(Error::UnsupportedServiceShape(format!(
                    "service {} declares a method without a name",
                    descriptor.name
                )));
            }
            if !seen.insert(*method) {
                return Err(Error::UnsupportedServiceShape(format!(
                    "service {} declares {} twice",
                    descriptor.name, method
                )));
            }
        }
        Ok(())
    }

    /// Validate `S`'s descriptor and bind all of its methods
    pub fn bind<S: ClientStub>(&self) -> Result<S> {
        let descriptor = S::descriptor();
        Self::validate(&descriptor)?;
        tracing::debug!(
            service = descriptor.name,
            methods = descriptor.methods.len(),
            "Bound service stub"
        );
        Ok(S::bind(&Binding {
            binder: self,
            service: descriptor.name,
        }))
    }
}

/// Handed to [`ClientStub::bind`] to mint method stubs for one service
pub struct Binding<'a> {
    binder: &'a Binder,
    service: &'static str,
}

impl Binding<'_> {
    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn method<A, R>(&self, name: &'static str) -> MethodStub<A, R>
    where
        A: Serialize + Sync,
        R: DeserializeOwned,
    {
        MethodStub::new(
            self.service,
            name,
            self.binder.proxy.clone(),
            self.binder.serializer.clone(),
            self.binder.compressor.clone(),
        )
    }
}
