use std::io::Read;

use crate::codec::Compressor;
use crate::error::{Error, Result};
use courier_core::MAX_FRAME_SIZE;

/// Zstandard compressor, the default for data segments
///
/// Decompressed output is capped, [`MAX_FRAME_SIZE`] by default, so a small
/// frame cannot expand into an arbitrarily large allocation.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
    max_output: usize,
}

impl ZstdCompressor {
    pub const CODE: u8 = 1;

    pub fn with_level(level: i32) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Largest payload `unzip` will produce
    pub fn max_output(mut self, limit: usize) -> Self {
        self.max_output = limit;
        self
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self {
            level: 3,
            max_output: MAX_FRAME_SIZE,
        }
    }
}

impl Compressor for ZstdCompressor {
    fn code(&self) -> u8 {
        Self::CODE
    }

    fn zip(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        ::zstd::bulk::compress(bytes, self.level)
            .map_err(|e| Error::Codec(format!("zstd compress failed: {e}")))
    }

    fn unzip(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        let decoder = ::zstd::stream::read::Decoder::with_buffer(bytes)
            .map_err(|e| Error::Codec(format!("zstd decompress failed: {e}")))?;

        let mut out = Vec::new();
        decoder
            .take(self.max_output as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| Error::Codec(format!("zstd decompress failed: {e}")))?;
        if out.len() > self.max_output {
            return Err(Error::Codec(format!(
                "zstd payload expands past {} bytes",
                self.max_output
            )));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shrinks_repetitive_payloads() {
        let compressor = ZstdCompressor::default();
        let payload = "hello, world ".repeat(200).into_bytes();

        let zipped = compressor.zip(&payload).unwrap();
        assert!(zipped.len() < payload.len());
        assert_eq!(compressor.unzip(&zipped).unwrap(), payload);
    }

    #[test]
    fn empty_stays_empty() {
        let compressor = ZstdCompressor::default();
        assert!(compressor.zip(&[]).unwrap().is_empty());
        assert!(compressor.unzip(&[]).unwrap().is_empty());
    }

    #[test]
    fn expansion_is_capped() {
        let bomb = ZstdCompressor::default().zip(&vec![0u8; 1024 * 1024]).unwrap();
        assert!(bomb.len() < 4096);

        let capped = ZstdCompressor::default().max_output(64 * 1024);
        match capped.unzip(&bomb) {
            Err(Error::Codec(msg)) => assert!(msg.contains("expands past")),
            other => panic!("expected Codec error, got {:?}", other.map(|v| v.len())),
        }

        // Exactly at the limit is fine
        let exact = ZstdCompressor::default().max_output(1024 * 1024);
        assert_eq!(exact.unzip(&bomb).unwrap().len(), 1024 * 1024);
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let compressor = ZstdCompressor::default();
        assert!(matches!(
            compressor.unzip(b"definitely not zstd"),
            Err(Error::Codec(_))
        ));
    }
}
