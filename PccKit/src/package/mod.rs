//! Package container engine
//!
//! A [`Package`] is opened from any `Read + Seek` source, loads its tables,
//! serves export payloads lazily (decompressing one chunk at a time for
//! compressed packages), accepts replacement payloads, and rewrites the whole
//! file with consistent offsets.
//!
//! ```no_run
//! use pcckit::package::{Package, SaveMode, SaveOptions};
//!
//! let mut package = Package::open("BioD_Citadel.pcc")?;
//! let id = package.find_export("Lightmap", "LightMapTexture2D").expect("export");
//! let mut data = package.export_data(id)?;
//! data.extend_from_slice(&[0u8; 1024]);
//! package.set_export_data(id, data)?;
//! package.save_to_file("BioD_Citadel.pcc", SaveMode::AsOriginal, &SaveOptions::default())?;
//! # Ok::<(), pcckit::Error>(())
//! ```

mod cache;
mod chunks;
mod exports;
mod header;
mod marker;
pub mod negotiate;
mod reader;
mod strings;
mod tables;
mod types;
mod writer;

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use cache::{ChunkCache, SingleChunkCache};
pub use chunks::{DEFAULT_MAX_BLOCK_SIZE, DEFAULT_MAX_CHUNK_SIZE, MAX_BLOCK_SIZE_LIMIT};
pub use header::{PACKAGE_MAGIC, PackageVersion};
pub use marker::{PROCESSED_MARKER, has_processed_marker};
pub use negotiate::{ExportLayout, ExportSlot, RelocationPlan, plan_relocation};
pub use strings::StringEncoding;
pub use types::*;
pub use writer::{SaveOptions, SaveProgressCallback};

use crate::compression::{BlockCodec, CodecSet, CompressionType};
use crate::error::{Error, Result};
use header::{Header, HeaderField};

/// Options for opening a package
#[derive(Debug, Clone)]
pub struct OpenOptions {
    level: LoadLevel,
    codecs: CodecSet,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            level: LoadLevel::Full,
            codecs: CodecSet::default(),
        }
    }
}

impl OpenOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how much of the package to load
    #[must_use]
    pub fn with_level(mut self, level: LoadLevel) -> Self {
        self.level = level;
        self
    }

    /// Register a codec (e.g. LZO or Oodle) for chunked packages
    #[must_use]
    pub fn with_codec(mut self, compression: CompressionType, codec: Arc<dyn BlockCodec>) -> Self {
        self.codecs.insert(compression, codec);
        self
    }

    /// Replace the whole codec set
    #[must_use]
    pub fn with_codecs(mut self, codecs: CodecSet) -> Self {
        self.codecs = codecs;
        self
    }

    /// Open a package file
    pub fn open(self, path: impl AsRef<Path>) -> Result<Package> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::PackageNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        let mut package = Package::load(BufReader::new(file), self.level, self.codecs)?;
        package.path = Some(path.to_path_buf());
        Ok(package)
    }

    /// Open a package from an in-memory or other seekable source
    pub fn open_reader<R: Read + Seek>(self, reader: R) -> Result<Package<R>> {
        Package::load(reader, self.level, self.codecs)
    }
}

/// An opened package
pub struct Package<R: Read + Seek = BufReader<File>> {
    stream: R,
    stream_len: u64,
    path: Option<PathBuf>,
    level: LoadLevel,
    header: Header,
    /// Start of the tables in the decompressed image
    data_offset: u32,
    names: Vec<NameEntry>,
    imports: Vec<ImportEntry>,
    exports: Vec<ExportEntry>,
    /// Opaque depends table, one `i32` per export
    depends: Vec<u8>,
    /// Opaque guids table
    guids: Vec<u8>,
    exports_end_offset: u32,
    modified: bool,
    marked: bool,
    codecs: CodecSet,
    cache: Box<dyn ChunkCache>,
}

impl Package {
    /// Fully load a package file with the default codecs
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        OpenOptions::default().open(path)
    }
}

impl<R: Read + Seek> Package<R> {
    /// Fully load a package from a seekable source with the default codecs
    pub fn from_reader(reader: R) -> Result<Self> {
        OpenOptions::default().open_reader(reader)
    }

    /// Path the package was opened from, if it came from a file
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn version(&self) -> PackageVersion {
        self.header.version
    }

    pub fn load_level(&self) -> LoadLevel {
        self.level
    }

    pub fn compression(&self) -> CompressionType {
        self.header.compression
    }

    pub fn is_compressed(&self) -> bool {
        self.header.compression.is_compressed()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.header.chunks
    }

    /// Start of the tables in the decompressed image
    pub fn data_offset(&self) -> u32 {
        self.data_offset
    }

    /// First byte after the tables, as recorded in the header
    pub fn end_of_tables(&self) -> u32 {
        self.header.end_of_tables()
    }

    /// End-of-data watermark: the highest payload end over all exports
    pub fn exports_end_offset(&self) -> u32 {
        self.exports_end_offset
    }

    pub fn names(&self) -> &[NameEntry] {
        &self.names
    }

    pub fn imports(&self) -> &[ImportEntry] {
        &self.imports
    }

    pub fn exports(&self) -> &[ExportEntry] {
        &self.exports
    }

    pub fn export(&self, id: usize) -> Result<&ExportEntry> {
        self.exports.get(id).ok_or(Error::ExportIndexOutOfRange {
            index: id,
            count: self.exports.len(),
        })
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Whether the source ended with the processed marker
    pub fn is_marked(&self) -> bool {
        self.marked
    }

    /// Opaque extra-names block from the header, including its count
    pub fn extra_names_raw(&self) -> &[u8] {
        &self.header.extra_names
    }

    pub fn cache(&self) -> &dyn ChunkCache {
        self.cache.as_ref()
    }

    /// Swap in a different caching policy
    pub fn set_cache(&mut self, cache: Box<dyn ChunkCache>) {
        self.cache = cache;
    }

    /// Drop the resident chunk
    pub fn dispose_cache(&mut self) {
        self.cache.clear();
    }

    pub(crate) fn require(&self, required: LoadLevel) -> Result<()> {
        if self.level < required {
            return Err(Error::NotLoaded {
                loaded: self.level,
                required,
            });
        }
        Ok(())
    }

    /// Append `length` bytes of the decompressed image starting at `offset`
    /// to `sink`.
    ///
    /// For compressed packages every byte a chunk contributes is copied out
    /// before the next chunk is loaded, since only one chunk stays resident.
    pub fn get_data(&mut self, offset: u32, length: u32, sink: &mut Vec<u8>) -> Result<()> {
        let end = u64::from(offset) + u64::from(length);
        sink.reserve(length as usize);

        if !self.is_compressed() {
            if end > self.stream_len {
                return Err(Error::UnexpectedEof {
                    context: format!("{length} bytes at offset {offset}"),
                });
            }
            let start = sink.len();
            sink.resize(start + length as usize, 0);
            self.stream.seek(SeekFrom::Start(u64::from(offset)))?;
            self.stream.read_exact(&mut sink[start..])?;
            return Ok(());
        }

        let mut position = u64::from(offset);
        while position < end {
            let index = self.chunk_index(position).ok_or_else(|| {
                Error::InvalidFormat(format!("offset {position} is outside the compressed region"))
            })?;
            if self.cache.lookup(index).is_none() {
                let codec = self.codecs.get(self.header.compression)?;
                let chunk = &self.header.chunks[index];
                let data = chunks::load_chunk(&mut self.stream, chunk, index, codec.as_ref())?;
                self.cache.store(index, data);
            }

            let chunk = &self.header.chunks[index];
            let cached = self.cache.lookup(index).ok_or_else(|| {
                Error::InvalidFormat(format!("chunk {index} was not retained by the cache"))
            })?;
            let base = u64::from(chunk.uncompressed_offset);
            let from = (position - base) as usize;
            let to = (end.min(chunk.uncompressed_end()) - base) as usize;
            let bytes = cached.get(from..to).ok_or_else(|| Error::UnexpectedEof {
                context: format!("chunk {index}"),
            })?;
            sink.extend_from_slice(bytes);
            position = chunk.uncompressed_end();
        }
        Ok(())
    }

    /// Index of the chunk covering a decompressed offset
    fn chunk_index(&self, offset: u64) -> Option<usize> {
        let chunks = &self.header.chunks;
        let index = chunks.partition_point(|c| c.uncompressed_end() <= offset);
        chunks.get(index).filter(|c| c.contains(offset)).map(|_| index)
    }

    /// Summary of the package for display
    pub fn summary(&self) -> PackageSummary {
        PackageSummary {
            version: self.header.version,
            compression: self.header.compression,
            chunks: self.header.chunks.len(),
            names: self.names.len(),
            imports: self.imports.len(),
            exports: self.exports.len(),
            data_offset: self.data_offset,
            end_of_tables: self.header.end_of_tables(),
            exports_end_offset: self.exports_end_offset,
            names_offset: self.header.field(HeaderField::NamesOffset),
            imports_offset: self.header.field(HeaderField::ImportsOffset),
            exports_offset: self.header.field(HeaderField::ExportsOffset),
            marked: self.marked,
        }
    }
}

/// Table and layout overview of a package
#[derive(Debug, Clone, serde::Serialize)]
pub struct PackageSummary {
    pub version: PackageVersion,
    pub compression: CompressionType,
    pub chunks: usize,
    pub names: usize,
    pub imports: usize,
    pub exports: usize,
    pub data_offset: u32,
    pub end_of_tables: u32,
    pub exports_end_offset: u32,
    pub names_offset: u32,
    pub imports_offset: u32,
    pub exports_offset: u32,
    pub marked: bool,
}
