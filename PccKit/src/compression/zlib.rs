//! Zlib block codec

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use super::BlockCodec;
use crate::error::{Error, Result};

/// Zlib codec backed by `flate2`
#[derive(Debug, Clone, Copy)]
pub struct ZlibCodec {
    level: Compression,
}

impl ZlibCodec {
    #[must_use]
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl BlockCodec for ZlibCodec {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(input.len() / 2), self.level);
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, input: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
        // Read at most one byte past the declared size so oversized output is
        // still detected without inflating a hostile block completely
        let mut decoder = ZlibDecoder::new(input).take(uncompressed_size as u64 + 1);
        let mut decompressed = Vec::with_capacity(uncompressed_size);

        decoder.read_to_end(&mut decompressed).map_err(|e| {
            Error::DecompressionError(format!("Failed to decompress Zlib data: {e}"))
        })?;

        Ok(decompressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zlib_block() {
        let codec = ZlibCodec::default();
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 7) as u8).collect();
        let compressed = codec.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(codec.decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_zlib_oversized_output_is_truncated_to_detectable_length() {
        let codec = ZlibCodec::with_level(1);
        let compressed = codec.compress(&[0u8; 100]).unwrap();
        let out = codec.decompress(&compressed, 10).unwrap();
        assert_eq!(out.len(), 11);
    }

    #[test]
    fn test_zlib_garbage_fails() {
        let codec = ZlibCodec::default();
        assert!(codec.decompress(b"not zlib at all", 16).is_err());
    }
}
