use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

pub mod bincode;
pub mod identity;
pub mod json;
pub mod registry;
pub mod zstd;

pub use self::bincode::BincodeSerializer;
pub use self::identity::IdentityCompressor;
pub use self::json::JsonSerializer;
pub use self::registry::CodecRegistry;
pub use self::zstd::ZstdCompressor;

/// Serializer trait for turning call arguments and results into bytes
///
/// Object safe so that registries can hold `Arc<dyn Serializer>` keyed by
/// wire code. Typed access goes through [`encode_value`](dyn Serializer::encode_value)
/// and [`decode_value`](dyn Serializer::decode_value).
pub trait Serializer: Send + Sync + 'static {
    /// Wire code identifying this serializer
    fn code(&self) -> u8;

    /// Encode a value into bytes
    fn encode(&self, value: &dyn erased_serde::Serialize) -> Result<Vec<u8>>;

    /// Hand a deserializer over `bytes` to `visit`
    fn decode_with(
        &self,
        bytes: &[u8],
        visit: &mut dyn FnMut(&mut dyn erased_serde::Deserializer<'_>) -> Result<()>,
    ) -> Result<()>;
}

impl dyn Serializer {
    pub fn encode_value<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        self.encode(value)
    }

    pub fn decode_value<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let mut slot = None;
        self.decode_with(bytes, &mut |de| {
            slot = Some(erased_serde::deserialize::<T>(de).map_err(Error::codec)?);
            Ok(())
        })?;
        slot.ok_or_else(|| Error::Codec("decoder produced no value".to_string()))
    }
}

/// Compressor trait applied to the data segment of a message
///
/// Implementations map empty input to empty output so that an absent
/// payload stays absent on the wire.
pub trait Compressor: Send + Sync + 'static {
    /// Wire code identifying this compressor
    fn code(&self) -> u8;

    fn zip(&self, bytes: &[u8]) -> Result<Vec<u8>>;

    fn unzip(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}
