use ::bincode::Options;

use crate::codec::Serializer;
use crate::error::{Error, Result};

/// Bincode codec for binary serialization
///
/// Uses the same fixed-int, little-endian layout as `bincode::serialize`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl BincodeSerializer {
    pub const CODE: u8 = 1;
}

fn options() -> impl Options {
    ::bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

impl Serializer for BincodeSerializer {
    fn code(&self) -> u8 {
        Self::CODE
    }

    fn encode(&self, value: &dyn erased_serde::Serialize) -> Result<Vec<u8>> {
        options().serialize(value).map_err(Error::codec)
    }

    fn decode_with(
        &self,
        bytes: &[u8],
        visit: &mut dyn FnMut(&mut dyn erased_serde::Deserializer<'_>) -> Result<()>,
    ) -> Result<()> {
        let mut de = ::bincode::Deserializer::from_slice(bytes, options());
        let mut erased = <dyn erased_serde::Deserializer>::erase(&mut de);
        visit(&mut erased)
    }
}
