use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::codec::{BincodeSerializer, Compressor, Serializer, ZstdCompressor};
use crate::error::{CodecKind, Error, Result};

/// Serializers and compressors keyed by their wire code
///
/// Filled in at startup, then shared read-only behind an `Arc`.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    serializers: HashMap<u8, Arc<dyn Serializer>>,
    compressors: HashMap<u8, Arc<dyn Compressor>>,
}

impl CodecRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the default serializer (bincode) and compressor (zstd)
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_serializer(BincodeSerializer);
        registry.register_compressor(ZstdCompressor::default());
        registry
    }

    /// Register a serializer, replacing any previous one with the same code
    pub fn register_serializer(&mut self, serializer: impl Serializer) -> &mut Self {
        self.serializers
            .insert(serializer.code(), Arc::new(serializer));
        self
    }

    /// Register a compressor, replacing any previous one with the same code
    pub fn register_compressor(&mut self, compressor: impl Compressor) -> &mut Self {
        self.compressors
            .insert(compressor.code(), Arc::new(compressor));
        self
    }

    pub fn serializer(&self, code: u8) -> Result<Arc<dyn Serializer>> {
        self.serializers
            .get(&code)
            .cloned()
            .ok_or(Error::UnsupportedCodec {
                kind: CodecKind::Serializer,
                code,
            })
    }

    pub fn compressor(&self, code: u8) -> Result<Arc<dyn Compressor>> {
        self.compressors
            .get(&code)
            .cloned()
            .ok_or(Error::UnsupportedCodec {
                kind: CodecKind::Compressor,
                code,
            })
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut serializers: Vec<_> = self.serializers.keys().collect();
        let mut compressors: Vec<_> = self.compressors.keys().collect();
        serializers.sort();
        compressors.sort();
        f.debug_struct("CodecRegistry")
            .field("serializers", &serializers)
            .field("compressors", &compressors)
            .finish()
    }
}
