//! Package loading: header, chunk table, then the tables in fixed order

use std::io::{Cursor, Read, Seek, SeekFrom};

use super::header::{Header, HeaderField};
use super::marker;
use super::tables::{self, DEPENDS_ENTRY_SIZE, GUID_ENTRY_SIZE};
use super::{LoadLevel, Package, SingleChunkCache};
use crate::compression::CodecSet;
use crate::error::{Error, Result};

/// Where tables are parsed from
enum TableSource {
    /// Read straight from the stream (uncompressed package)
    Stream,
    /// Materialized table region of a compressed package, starting at `base`
    Region { base: u32, bytes: Vec<u8> },
}

impl<R: Read + Seek> Package<R> {
    pub(crate) fn load(mut stream: R, level: LoadLevel, codecs: CodecSet) -> Result<Self> {
        let stream_len = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;

        let header = Header::read(&mut stream, stream_len)?;
        let data_offset = validate_chunks(&header, stream_len)?;
        let marked = marker::stream_has_marker(&mut stream, stream_len)?;

        let mut package = Self {
            stream,
            stream_len,
            path: None,
            level,
            header,
            data_offset,
            names: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            depends: Vec::new(),
            guids: Vec::new(),
            exports_end_offset: 0,
            modified: false,
            marked,
            codecs,
            cache: Box::new(SingleChunkCache::new()),
        };

        if level >= LoadLevel::Tables {
            package.load_tables()?;
        }

        tracing::debug!(
            "Loaded package: version {}, {:?} compression, {} chunks, \
             {} names, {} imports, {} exports",
            package.header.version.to_u16(),
            package.header.compression,
            package.header.chunks.len(),
            package.names.len(),
            package.imports.len(),
            package.exports.len()
        );

        Ok(package)
    }

    /// Load names, imports, exports and (at full level) depends and guids.
    ///
    /// The order is fixed; each table is read at the offset the header
    /// records for it.
    fn load_tables(&mut self) -> Result<()> {
        let mut source = if self.is_compressed() {
            let end_of_tables = self.header.end_of_tables();
            if end_of_tables < self.data_offset {
                return Err(Error::InvalidFormat(format!(
                    "end of tables {end_of_tables} precedes data offset {}",
                    self.data_offset
                )));
            }
            let mut bytes = Vec::new();
            self.get_data(self.data_offset, end_of_tables - self.data_offset, &mut bytes)?;
            TableSource::Region {
                base: self.data_offset,
                bytes,
            }
        } else {
            TableSource::Stream
        };

        let version = self.header.version;

        let (count, offset) = (
            self.header.field(HeaderField::NamesCount),
            self.header.field(HeaderField::NamesOffset),
        );
        self.names = self.with_table(&mut source, "names", offset, |reader, available| {
            tables::read_names(reader, count, version, available)
        })?;

        let (count, offset) = (
            self.header.field(HeaderField::ImportsCount),
            self.header.field(HeaderField::ImportsOffset),
        );
        self.imports = self.with_table(&mut source, "imports", offset, |reader, available| {
            tables::read_imports(reader, count, available)
        })?;

        let (count, offset) = (
            self.header.field(HeaderField::ExportsCount),
            self.header.field(HeaderField::ExportsOffset),
        );
        self.exports = self.with_table(&mut source, "exports", offset, |reader, available| {
            tables::read_exports(reader, count, available)
        })?;

        if self.level >= LoadLevel::Full {
            let count = self.exports.len() as u32;
            let offset = self.header.field(HeaderField::DependsOffset);
            self.depends = self.with_table(&mut source, "depends", offset, |reader, available| {
                tables::read_fixed(reader, "depends", count, DEPENDS_ENTRY_SIZE, available)
            })?;

            let count = self.header.field(HeaderField::GuidsCount);
            let offset = self.header.field(HeaderField::GuidsOffset);
            self.guids = self.with_table(&mut source, "guids", offset, |reader, available| {
                tables::read_fixed(reader, "guids", count, GUID_ENTRY_SIZE, available)
            })?;
        }

        self.exports_end_offset = self.compute_exports_end();
        Ok(())
    }

    /// Run a table parser positioned at `offset`
    fn with_table<T>(
        &mut self,
        source: &mut TableSource,
        table: &str,
        offset: u32,
        parse: impl FnOnce(&mut dyn Read, u64) -> Result<T>,
    ) -> Result<T> {
        match source {
            TableSource::Stream => {
                if u64::from(offset) > self.stream_len {
                    return Err(Error::InvalidFormat(format!(
                        "{table} table offset {offset} is past the end of the file"
                    )));
                }
                self.stream.seek(SeekFrom::Start(u64::from(offset)))?;
                let available = self.stream_len - u64::from(offset);
                parse(&mut self.stream, available)
            }
            TableSource::Region { base, bytes } => {
                let start = offset
                    .checked_sub(*base)
                    .map(|rel| rel as usize)
                    .filter(|&rel| rel <= bytes.len())
                    .ok_or_else(|| {
                        Error::InvalidFormat(format!(
                            "{table} table offset {offset} is outside the table region"
                        ))
                    })?;
                let slice = &bytes[start..];
                parse(&mut Cursor::new(slice), slice.len() as u64)
            }
        }
    }

    /// Highest payload end over all exports, or the end of the tables when
    /// there are no exports
    pub(crate) fn compute_exports_end(&self) -> u32 {
        self.exports
            .iter()
            .map(super::ExportEntry::data_end)
            .max()
            .unwrap_or_else(|| self.header.end_of_tables())
    }
}

/// Check that chunks tile the decompressed data region and sit between the
/// header and the end of the file.
///
/// Returns the decompressed offset at which the tables start.
fn validate_chunks(header: &Header, stream_len: u64) -> Result<u32> {
    if !header.compression.is_compressed() {
        return Ok(header.logical_size() as u32);
    }

    let first = header.chunks.first().ok_or_else(|| {
        Error::InvalidFormat("compressed package has no chunks".to_string())
    })?;

    let mut expected = u64::from(first.uncompressed_offset);
    for (index, chunk) in header.chunks.iter().enumerate() {
        if u64::from(chunk.uncompressed_offset) != expected {
            return Err(Error::InvalidFormat(format!(
                "chunk {index} starts at {} but the previous chunk ends at {expected}",
                chunk.uncompressed_offset
            )));
        }
        if (chunk.compressed_offset as usize) < header.physical_size {
            return Err(Error::InvalidFormat(format!(
                "chunk {index} at {} overlaps the {}-byte header",
                chunk.compressed_offset, header.physical_size
            )));
        }
        let compressed_end = u64::from(chunk.compressed_offset) + u64::from(chunk.compressed_size);
        if compressed_end > stream_len {
            return Err(Error::InvalidFormat(format!(
                "chunk {index} extends past the end of the file"
            )));
        }
        expected = chunk.uncompressed_end();
    }

    Ok(first.uncompressed_offset)
}
