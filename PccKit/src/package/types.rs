//! Types for package tables, chunks and save operations

use super::strings::{RawString, StringEncoding, encode_string, resolve_encoding};
use super::PackageVersion;

/// How much of a package `open` should load
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadLevel {
    /// Header, chunk table and extra names only
    HeaderOnly,
    /// Also names, imports and exports
    Tables,
    /// Also depends and guids; required for saving
    Full,
}

/// Entry in the name table.
///
/// The index of a name never changes once assigned; renaming keeps it.
#[derive(Debug, Clone)]
pub struct NameEntry {
    name: String,
    encoding: StringEncoding,
    /// Exact serialized bytes (length, characters, flags)
    raw: Vec<u8>,
}

impl NameEntry {
    pub(crate) fn from_parsed(string: RawString, flags: Option<u64>) -> Self {
        let mut raw = string.raw;
        if let Some(flags) = flags {
            raw.extend_from_slice(&flags.to_le_bytes());
        }
        Self {
            name: string.value,
            encoding: string.encoding,
            raw,
        }
    }

    /// Build a new entry in the version's native string convention
    pub(crate) fn new(name: &str, version: PackageVersion, flags: u64) -> Self {
        let flags = version.has_name_flags().then_some(flags);
        Self::encoded(name, version.native_encoding(), flags)
    }

    fn encoded(name: &str, preferred: StringEncoding, flags: Option<u64>) -> Self {
        let encoding = resolve_encoding(name, preferred);
        let mut raw = encode_string(name, encoding);
        if let Some(flags) = flags {
            raw.extend_from_slice(&flags.to_le_bytes());
        }
        Self {
            name: name.to_string(),
            encoding,
            raw,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Character width the name is stored with
    #[must_use]
    pub fn encoding(&self) -> StringEncoding {
        self.encoding
    }

    pub(crate) fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Trailing flags of a name entry, if the version has them
    pub(crate) fn flags(&self, version: PackageVersion) -> Option<u64> {
        if !version.has_name_flags() || self.raw.len() < 12 {
            return None;
        }
        let tail = &self.raw[self.raw.len() - 8..];
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(tail);
        Some(u64::from_le_bytes(bytes))
    }

    /// Replace the string, keeping the stored encoding and flags
    pub(crate) fn rename(&mut self, name: &str, version: PackageVersion) {
        let flags = self.flags(version);
        *self = Self::encoded(name, self.encoding, flags);
    }
}

/// Size of a serialized import record
pub const IMPORT_RECORD_SIZE: usize = 28;

/// Entry in the import table: a reference to an object in another package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    raw: [u8; IMPORT_RECORD_SIZE],
}

impl ImportEntry {
    pub(crate) fn from_raw(raw: [u8; IMPORT_RECORD_SIZE]) -> Self {
        Self { raw }
    }

    fn get(&self, offset: usize) -> i32 {
        i32::from_le_bytes([
            self.raw[offset],
            self.raw[offset + 1],
            self.raw[offset + 2],
            self.raw[offset + 3],
        ])
    }

    fn set(&mut self, offset: usize, value: i32) {
        self.raw[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Name index of the package the object lives in
    #[must_use]
    pub fn package_file_id(&self) -> i32 {
        self.get(0)
    }

    /// Name index of the object's class
    #[must_use]
    pub fn class_id(&self) -> i32 {
        self.get(8)
    }

    /// Object index of the outer object
    #[must_use]
    pub fn link_id(&self) -> i32 {
        self.get(16)
    }

    /// Name index of the object
    #[must_use]
    pub fn object_name_id(&self) -> i32 {
        self.get(20)
    }

    pub fn set_object_name_id(&mut self, id: i32) {
        self.set(20, id);
    }

    pub(crate) fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// Fixed part of an export record, up to and including the trailer count
pub const EXPORT_FIXED_SIZE: usize = 48;

/// Guid and package flags after the count-sized trailer
pub const EXPORT_TAIL_SIZE: usize = 20;

const EXPORT_CLASS_OFFSET: usize = 0;
const EXPORT_LINK_OFFSET: usize = 8;
const EXPORT_NAME_OFFSET: usize = 12;
pub(crate) const EXPORT_DATA_SIZE_OFFSET: usize = 32;
pub(crate) const EXPORT_DATA_OFFSET_OFFSET: usize = 36;

/// Entry in the export table: one serialized object stored in this package
#[derive(Debug, Clone)]
pub struct ExportEntry {
    raw: Vec<u8>,
    /// Replacement payload, owned by the entry
    pub(crate) new_data: Option<Vec<u8>>,
}

impl ExportEntry {
    pub(crate) fn from_raw(raw: Vec<u8>) -> Self {
        Self {
            raw,
            new_data: None,
        }
    }

    fn get(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.raw[offset],
            self.raw[offset + 1],
            self.raw[offset + 2],
            self.raw[offset + 3],
        ])
    }

    fn set(&mut self, offset: usize, value: u32) {
        self.raw[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Class object index: negative = import, positive = export, 0 = `Class`
    #[must_use]
    pub fn class_id(&self) -> i32 {
        self.get(EXPORT_CLASS_OFFSET) as i32
    }

    #[must_use]
    pub fn link_id(&self) -> i32 {
        self.get(EXPORT_LINK_OFFSET) as i32
    }

    #[must_use]
    pub fn object_name_id(&self) -> i32 {
        self.get(EXPORT_NAME_OFFSET) as i32
    }

    #[must_use]
    pub fn data_offset(&self) -> u32 {
        self.get(EXPORT_DATA_OFFSET_OFFSET)
    }

    #[must_use]
    pub fn data_size(&self) -> u32 {
        self.get(EXPORT_DATA_SIZE_OFFSET)
    }

    /// End of this export's payload in the decompressed image
    #[must_use]
    pub fn data_end(&self) -> u32 {
        self.data_offset().saturating_add(self.data_size())
    }

    pub(crate) fn set_data_offset(&mut self, offset: u32) {
        self.set(EXPORT_DATA_OFFSET_OFFSET, offset);
    }

    pub(crate) fn set_data_size(&mut self, size: u32) {
        self.set(EXPORT_DATA_SIZE_OFFSET, size);
    }

    /// Whether the payload has been replaced in memory
    #[must_use]
    pub fn is_overridden(&self) -> bool {
        self.new_data.is_some()
    }

    pub(crate) fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Record bytes with a different data offset and size
    pub(crate) fn record_with_layout(&self, offset: u32, size: u32) -> Vec<u8> {
        let mut raw = self.raw.clone();
        raw[EXPORT_DATA_OFFSET_OFFSET..EXPORT_DATA_OFFSET_OFFSET + 4]
            .copy_from_slice(&offset.to_le_bytes());
        raw[EXPORT_DATA_SIZE_OFFSET..EXPORT_DATA_SIZE_OFFSET + 4]
            .copy_from_slice(&size.to_le_bytes());
        raw
    }
}

/// One independently compressed unit inside a chunk
#[derive(Debug, Clone, Default)]
pub struct ChunkBlock {
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub(crate) compressed: Vec<u8>,
    pub(crate) uncompressed: Vec<u8>,
}

impl ChunkBlock {
    /// Drop both buffers once the block has been consumed
    pub(crate) fn release(&mut self) {
        self.compressed = Vec::new();
        self.uncompressed = Vec::new();
    }
}

/// A compressed region of the export-data area, as described by the chunk
/// table. Block sizes live in the chunk's own header on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    /// Offset in the decompressed image
    pub uncompressed_offset: u32,
    pub uncompressed_size: u32,
    /// Offset in the physical file
    pub compressed_offset: u32,
    pub compressed_size: u32,
}

impl Chunk {
    pub(crate) fn new(
        uncompressed_offset: u32,
        uncompressed_size: u32,
        compressed_offset: u32,
        compressed_size: u32,
    ) -> Self {
        Self {
            uncompressed_offset,
            uncompressed_size,
            compressed_offset,
            compressed_size,
        }
    }

    /// End of this chunk in the decompressed image
    #[must_use]
    pub fn uncompressed_end(&self) -> u64 {
        u64::from(self.uncompressed_offset) + u64::from(self.uncompressed_size)
    }

    #[must_use]
    pub fn contains(&self, offset: u64) -> bool {
        offset >= u64::from(self.uncompressed_offset) && offset < self.uncompressed_end()
    }
}

/// Output representation requested from a save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Keep the source package's representation
    AsOriginal,
    /// Write chunk-compressed output when the layout allows it
    ForceCompressed,
    /// Write a plain decompressed image
    ForceDecompressed,
}

/// Tables placed during a save
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TableKind {
    Names,
    Imports,
    Exports,
}

impl TableKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Names => "names",
            Self::Imports => "imports",
            Self::Exports => "exports",
        }
    }
}

/// Result of a save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new file was written
    Written {
        /// Whether the output is chunk-compressed
        compressed: bool,
        /// Number of exports moved to make room for the tables
        relocated_exports: usize,
        /// Tables appended after the export data instead of in place
        deferred_tables: Vec<TableKind>,
        /// Bytes written
        size: u64,
    },
    /// Nothing changed and the target already holds this package
    Unchanged,
    /// Compression was requested but the tables could not stay in front of
    /// the export data, and there was nothing else to write
    Skipped,
}

/// Progress information during a save
#[derive(Debug, Clone)]
pub struct SaveProgress {
    /// Current operation phase
    pub phase: SavePhase,
    /// Current item number (1-indexed)
    pub current: usize,
    /// Total number of items
    pub total: usize,
}

impl SaveProgress {
    #[must_use]
    pub fn new(phase: SavePhase, current: usize, total: usize) -> Self {
        Self {
            phase,
            current,
            total,
        }
    }

    /// Get the progress percentage (0.0 - 1.0)
    #[must_use]
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.current as f32 / self.total as f32
        }
    }
}

/// Phase of a save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    /// Placing tables and relocating exports
    PlacingTables,
    /// Copying export payloads into the image
    WritingExports,
    /// Compressing chunks
    CompressingChunks,
    /// Writing the file
    Writing,
    /// Operation complete
    Complete,
}

impl SavePhase {
    /// Get a human-readable description of this phase
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlacingTables => "Placing tables",
            Self::WritingExports => "Writing exports",
            Self::CompressingChunks => "Compressing chunks",
            Self::Writing => "Writing file",
            Self::Complete => "Complete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::strings::read_string;

    fn export_record(offset: u32, size: u32, trailer: u32) -> Vec<u8> {
        let mut raw = vec![0u8; EXPORT_FIXED_SIZE + 4 * trailer as usize + EXPORT_TAIL_SIZE];
        raw[12..16].copy_from_slice(&3i32.to_le_bytes());
        raw[32..36].copy_from_slice(&size.to_le_bytes());
        raw[36..40].copy_from_slice(&offset.to_le_bytes());
        raw[44..48].copy_from_slice(&trailer.to_le_bytes());
        raw
    }

    #[test]
    fn test_export_fields() {
        let mut entry = ExportEntry::from_raw(export_record(1000, 64, 2));
        assert_eq!(entry.object_name_id(), 3);
        assert_eq!(entry.data_offset(), 1000);
        assert_eq!(entry.data_size(), 64);
        assert_eq!(entry.data_end(), 1064);

        entry.set_data_offset(2000);
        entry.set_data_size(10);
        assert_eq!(entry.data_end(), 2010);

        let moved = entry.record_with_layout(5, 6);
        assert_eq!(ExportEntry::from_raw(moved).data_end(), 11);
        assert_eq!(entry.data_offset(), 2000);
    }

    #[test]
    fn test_name_rename_keeps_encoding_and_flags() {
        let mut entry = NameEntry::new("Texture2D", PackageVersion::Me2, 0x0007_0010_0000_0000);
        assert_eq!(entry.flags(PackageVersion::Me2), Some(0x0007_0010_0000_0000));

        entry.rename("Texture2D_Longer", PackageVersion::Me2);
        assert_eq!(entry.name(), "Texture2D_Longer");
        assert_eq!(entry.flags(PackageVersion::Me2), Some(0x0007_0010_0000_0000));
        assert_eq!(entry.raw().len(), 4 + 17 + 8);

        let mut wide = NameEntry::new("Core", PackageVersion::Me3, 0);
        wide.rename("Engine", PackageVersion::Me3);
        assert_eq!(wide.raw().len(), 4 + 7 * 2);
        assert_eq!(wide.encoding(), StringEncoding::Utf16);

        // A name read as UTF-16 in an Me2 package stays UTF-16 when renamed
        let mut bytes = (-5i32).to_le_bytes().to_vec();
        for unit in "Mesh\0".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let parsed = read_string(&mut std::io::Cursor::new(&bytes)).unwrap();
        let mut read = NameEntry::from_parsed(parsed, Some(0));
        assert_eq!(read.encoding(), StringEncoding::Utf16);
        read.rename("Mesh_01", PackageVersion::Me2);
        assert_eq!(read.encoding(), StringEncoding::Utf16);
        assert_eq!(&read.raw()[..4], &(-8i32).to_le_bytes());
        assert_eq!(read.flags(PackageVersion::Me2), Some(0));

        // Characters outside Latin-1 force UTF-16
        let mut latin = NameEntry::new("Core", PackageVersion::Me2, 0);
        latin.rename("Caf\u{e9}_\u{3b1}", PackageVersion::Me2);
        assert_eq!(latin.encoding(), StringEncoding::Utf16);
    }

    #[test]
    fn test_chunk_contains() {
        let chunk = Chunk::new(100, 50, 0, 0);
        assert!(chunk.contains(100));
        assert!(chunk.contains(149));
        assert!(!chunk.contains(150));
        assert!(!chunk.contains(99));
        assert_eq!(chunk.uncompressed_end(), 150);
    }

    #[test]
    fn test_chunk_is_its_descriptor() {
        let chunk = Chunk::new(0x80, 0x1000, 0xC0, 0x200);
        assert_eq!(
            chunk,
            Chunk {
                uncompressed_offset: 0x80,
                uncompressed_size: 0x1000,
                compressed_offset: 0xC0,
                compressed_size: 0x200,
            }
        );
        assert_eq!(Chunk::default().uncompressed_end(), 0);
    }
}
