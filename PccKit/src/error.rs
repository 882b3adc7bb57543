//! Error types for `PccKit`

use std::path::PathBuf;

use thiserror::Error;

use crate::compression::CompressionType;

/// The error type for `PccKit` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// IO error from file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The package file does not exist.
    #[error("package not found: {path}")]
    PackageNotFound {
        /// The path that was opened.
        path: PathBuf,
    },

    /// Unexpected end of data while reading a table or chunk.
    #[error("unexpected end of data: {context}")]
    UnexpectedEof {
        /// What was being read.
        context: String,
    },

    // ==================== Package Format Errors ====================
    /// The package file is empty.
    #[error("package file is empty")]
    EmptyPackage,

    /// The header is shorter than the minimum for its version.
    #[error("package header too short: {size} bytes (minimum {minimum})")]
    TruncatedHeader {
        /// The number of bytes available.
        size: u64,
        /// The minimum header length.
        minimum: u64,
    },

    /// The file does not start with the package tag.
    #[error("invalid package magic: expected 0x9E2A83C1, found {found:#010X}")]
    InvalidPackageMagic {
        /// The value found at offset 0.
        found: u32,
    },

    /// The package version is not supported.
    #[error("unsupported package version: {version} (supported: 512, 684)")]
    UnsupportedPackageVersion {
        /// The version number found in the file.
        version: u16,
    },

    /// The compression type field holds an unknown value.
    #[error("unsupported compression type: {value}")]
    UnsupportedCompressionType {
        /// The raw compression type value.
        value: u32,
    },

    /// A chunk header does not start with the package tag.
    #[error("invalid chunk magic in chunk {chunk}: {found:#010X}")]
    InvalidChunkMagic {
        /// The chunk index.
        chunk: usize,
        /// The value found.
        found: u32,
    },

    /// Structural problem in the file (use specific variants when possible).
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    // ==================== Compression/Decompression Errors ====================
    /// No codec has been registered for a compression type.
    #[error("no codec registered for {0:?} compression")]
    CodecUnavailable(CompressionType),

    /// A block decompressed to a different size than declared.
    #[error("block {block} of chunk {chunk} decompressed to {actual} bytes, expected {expected}")]
    BlockSizeMismatch {
        /// The chunk index.
        chunk: usize,
        /// The block index within the chunk.
        block: usize,
        /// The declared uncompressed size.
        expected: usize,
        /// The number of bytes produced.
        actual: usize,
    },

    /// Generic decompression error.
    #[error("decompression failed: {0}")]
    DecompressionError(String),

    /// Generic compression error.
    #[error("compression failed: {0}")]
    CompressionError(String),

    // ==================== Usage Errors ====================
    /// Export index outside the exports table.
    #[error("export index {index} out of range (exports: {count})")]
    ExportIndexOutOfRange {
        /// The zero-based index requested.
        index: usize,
        /// The number of exports.
        count: usize,
    },

    /// Name index outside the names table.
    #[error("name index {index} out of range (names: {count})")]
    NameIndexOutOfRange {
        /// The index requested.
        index: usize,
        /// The number of names.
        count: usize,
    },

    /// The operation needs tables that were not loaded.
    #[error("package was opened with {loaded:?}, operation requires {required:?}")]
    NotLoaded {
        /// The level the package was opened with.
        loaded: crate::package::LoadLevel,
        /// The level the operation requires.
        required: crate::package::LoadLevel,
    },

    // ==================== Layout Invariant Errors ====================
    /// Table/offset ordering was broken while rewriting a package.
    #[error("layout invariant violated: {0}")]
    InvariantViolation(String),

    /// A value does not fit the 32-bit on-disk field.
    #[error("{what} too large for package: {value} bytes")]
    TooLarge {
        /// The field that overflowed.
        what: &'static str,
        /// The value that did not fit.
        value: u64,
    },
}

/// Coarse error classification used by batch callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad magic/version/size or structurally invalid file.
    Format,
    /// Missing or short file.
    Io,
    /// Declared-size mismatch or codec failure.
    Decompression,
    /// Table/offset ordering broken during a rewrite.
    Invariant,
    /// API misuse (bad index, insufficient load level).
    Usage,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::PackageNotFound { .. } | Error::UnexpectedEof { .. } => {
                ErrorKind::Io
            }
            Error::EmptyPackage
            | Error::TruncatedHeader { .. }
            | Error::InvalidPackageMagic { .. }
            | Error::UnsupportedPackageVersion { .. }
            | Error::UnsupportedCompressionType { .. }
            | Error::InvalidChunkMagic { .. }
            | Error::InvalidFormat(_) => ErrorKind::Format,
            Error::CodecUnavailable(_)
            | Error::BlockSizeMismatch { .. }
            | Error::DecompressionError(_)
            | Error::CompressionError(_) => ErrorKind::Decompression,
            Error::ExportIndexOutOfRange { .. }
            | Error::NameIndexOutOfRange { .. }
            | Error::NotLoaded { .. } => ErrorKind::Usage,
            Error::InvariantViolation(_) | Error::TooLarge { .. } => ErrorKind::Invariant,
        }
    }
}

/// A specialized Result type for `PccKit` operations.
pub type Result<T> = std::result::Result<T, Error>;
