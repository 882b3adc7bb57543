//! Block compression for chunked packages
//!
//! A package names one compression algorithm for all of its chunks. The
//! algorithms differ only in which buffer primitive runs on each block, so
//! each one is a [`BlockCodec`] looked up in a [`CodecSet`]. Zlib ships with
//! the crate; LZO and Oodle are provided by the caller.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

pub mod zlib;

pub use zlib::ZlibCodec;

/// Package-wide compression algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum CompressionType {
    None,
    Lzo,
    Zlib,
    Oodle,
}

impl CompressionType {
    /// Parse the on-disk compression type field
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lzo),
            2 => Ok(CompressionType::Zlib),
            3 => Ok(CompressionType::Oodle),
            _ => Err(Error::UnsupportedCompressionType { value }),
        }
    }

    /// Convert to the on-disk compression type field
    #[must_use]
    pub fn to_u32(self) -> u32 {
        match self {
            CompressionType::None => 0,
            CompressionType::Lzo => 1,
            CompressionType::Zlib => 2,
            CompressionType::Oodle => 3,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Lzo => "lzo",
            CompressionType::Zlib => "zlib",
            CompressionType::Oodle => "oodle",
        }
    }

    #[must_use]
    pub fn is_compressed(self) -> bool {
        self != CompressionType::None
    }
}

impl std::str::FromStr for CompressionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionType::None),
            "lzo" => Ok(CompressionType::Lzo),
            "zlib" => Ok(CompressionType::Zlib),
            "oodle" => Ok(CompressionType::Oodle),
            _ => Err(format!(
                "Invalid compression '{s}'. Valid values: none, lzo, zlib, oodle"
            )),
        }
    }
}

/// A buffer-to-buffer block compressor.
///
/// Blocks are independent, so implementations must be callable from several
/// threads at once.
pub trait BlockCodec: Send + Sync {
    /// Compress one block.
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Decompress one block whose uncompressed size is known up front.
    ///
    /// Returning a buffer of a different length is allowed; the caller
    /// checks it against the declared size.
    fn decompress(&self, input: &[u8], uncompressed_size: usize) -> Result<Vec<u8>>;
}

/// Codecs available to a package, keyed by compression type
#[derive(Clone)]
pub struct CodecSet {
    codecs: HashMap<CompressionType, Arc<dyn BlockCodec>>,
}

impl CodecSet {
    /// An empty set (not even Zlib)
    #[must_use]
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Register or replace the codec for a compression type
    #[must_use]
    pub fn with_codec(mut self, compression: CompressionType, codec: Arc<dyn BlockCodec>) -> Self {
        self.insert(compression, codec);
        self
    }

    pub fn insert(&mut self, compression: CompressionType, codec: Arc<dyn BlockCodec>) {
        self.codecs.insert(compression, codec);
    }

    /// Look up the codec for a compression type
    pub fn get(&self, compression: CompressionType) -> Result<&Arc<dyn BlockCodec>> {
        self.codecs
            .get(&compression)
            .ok_or(Error::CodecUnavailable(compression))
    }

    #[must_use]
    pub fn supports(&self, compression: CompressionType) -> bool {
        self.codecs.contains_key(&compression)
    }
}

impl Default for CodecSet {
    fn default() -> Self {
        Self::empty().with_codec(CompressionType::Zlib, Arc::new(ZlibCodec::default()))
    }
}

impl fmt::Debug for CodecSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.codecs.keys().map(CompressionType::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("CodecSet").field("codecs", &kinds).finish()
    }
}

/// Compress a block, rejecting codecs that return nothing for real input
pub fn compress_block(codec: &dyn BlockCodec, input: &[u8]) -> Result<Vec<u8>> {
    let compressed = codec.compress(input)?;
    if compressed.is_empty() && !input.is_empty() {
        return Err(Error::CompressionError(format!(
            "codec produced 0 bytes for a {} byte block",
            input.len()
        )));
    }
    Ok(compressed)
}
