use crate::codec::Compressor;
use crate::error::Result;

/// Compressor that passes bytes through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCompressor;

impl IdentityCompressor {
    pub const CODE: u8 = 0;
}

impl Compressor for IdentityCompressor {
    fn code(&self) -> u8 {
        Self::CODE
    }

    fn zip(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn unzip(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}
