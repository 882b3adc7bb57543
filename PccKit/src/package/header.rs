//! Package header layout
//!
//! The header starts with a fixed 16-byte prefix (tag, version, end of
//! tables, folder name length), the folder name, and a version-dependent
//! fixed block holding the table counts and offsets. Everything else in that
//! block is opaque and written back untouched.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use super::strings::{StringEncoding, read_string};
use super::Chunk;
use crate::compression::CompressionType;
use crate::error::{Error, Result};

/// Tag at offset 0 of every package and every compressed chunk
pub const PACKAGE_MAGIC: u32 = 0x9E2A83C1;

/// Bytes before the folder name string
pub(crate) const PREFIX_SIZE: usize = 16;

/// Offset of the end-of-tables field
const END_OF_TABLES_OFFSET: usize = 8;

/// Offset of the folder name length
const FOLDER_NAME_OFFSET: usize = 12;

/// Serialized size of one chunk descriptor
pub(crate) const CHUNK_DESCRIPTOR_SIZE: usize = 16;

/// Supported package versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum PackageVersion {
    /// Version 512: single-byte strings, name entries carry `u64` flags
    Me2,
    /// Version 684: UTF-16 strings, extra header fields
    Me3,
}

/// Header fields rewritten on save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderField {
    NamesCount,
    NamesOffset,
    ExportsCount,
    ExportsOffset,
    ImportsCount,
    ImportsOffset,
    DependsOffset,
    GuidsOffset,
    GuidsCount,
}

impl PackageVersion {
    pub fn from_u16(version: u16) -> Result<Self> {
        match version {
            512 => Ok(PackageVersion::Me2),
            684 => Ok(PackageVersion::Me3),
            _ => Err(Error::UnsupportedPackageVersion { version }),
        }
    }

    #[must_use]
    pub fn to_u16(self) -> u16 {
        match self {
            PackageVersion::Me2 => 512,
            PackageVersion::Me3 => 684,
        }
    }

    /// Size of the fixed block that follows the folder name
    #[must_use]
    pub(crate) fn fixed_block_size(self) -> usize {
        match self {
            PackageVersion::Me2 => 80,
            PackageVersion::Me3 => 92,
        }
    }

    /// Smallest possible header: prefix, empty folder name, fixed block
    #[must_use]
    pub fn min_header_size(self) -> usize {
        PREFIX_SIZE + self.fixed_block_size()
    }

    /// String convention used for newly written strings
    #[must_use]
    pub fn native_encoding(self) -> StringEncoding {
        match self {
            PackageVersion::Me2 => StringEncoding::SingleByte,
            PackageVersion::Me3 => StringEncoding::Utf16,
        }
    }

    /// Whether name-table entries carry a trailing `u64` flags field
    #[must_use]
    pub fn has_name_flags(self) -> bool {
        self == PackageVersion::Me2
    }

    /// Offset of a field relative to the end of the folder name
    pub(crate) fn field_offset(self, field: HeaderField) -> usize {
        match (self, field) {
            (PackageVersion::Me2, HeaderField::NamesCount) => 4,
            (PackageVersion::Me2, HeaderField::NamesOffset) => 8,
            (PackageVersion::Me2, HeaderField::ExportsCount) => 12,
            (PackageVersion::Me2, HeaderField::ExportsOffset) => 16,
            (PackageVersion::Me2, HeaderField::ImportsCount) => 20,
            (PackageVersion::Me2, HeaderField::ImportsOffset) => 24,
            (PackageVersion::Me2, HeaderField::DependsOffset) => 28,
            (PackageVersion::Me2, HeaderField::GuidsOffset) => 32,
            (PackageVersion::Me2, HeaderField::GuidsCount) => 36,
            (PackageVersion::Me3, HeaderField::NamesCount) => 8,
            (PackageVersion::Me3, HeaderField::NamesOffset) => 12,
            (PackageVersion::Me3, HeaderField::ExportsCount) => 16,
            (PackageVersion::Me3, HeaderField::ExportsOffset) => 20,
            (PackageVersion::Me3, HeaderField::ImportsCount) => 24,
            (PackageVersion::Me3, HeaderField::ImportsOffset) => 28,
            (PackageVersion::Me3, HeaderField::DependsOffset) => 32,
            (PackageVersion::Me3, HeaderField::GuidsOffset) => 36,
            (PackageVersion::Me3, HeaderField::GuidsCount) => 44,
        }
    }
}

/// Parsed package header
#[derive(Debug, Clone)]
pub(crate) struct Header {
    pub version: PackageVersion,
    /// Bytes from offset 0 up to the compression type field
    pub prefix: Vec<u8>,
    /// Offset of the fixed block (end of the folder name)
    pub fixed_start: usize,
    pub compression: CompressionType,
    pub chunks: Vec<Chunk>,
    pub tag: u32,
    /// Extra-names block including its count, verbatim
    pub extra_names: Vec<u8>,
    /// Bytes the header occupies on disk
    pub physical_size: usize,
}

impl Header {
    /// Parse the header from the start of a stream of `stream_len` bytes
    pub fn read<R: Read>(reader: &mut R, stream_len: u64) -> Result<Self> {
        if stream_len == 0 {
            return Err(Error::EmptyPackage);
        }
        let smallest = PackageVersion::Me2.min_header_size() as u64;
        if stream_len < 6 {
            return Err(Error::TruncatedHeader {
                size: stream_len,
                minimum: smallest,
            });
        }

        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != PACKAGE_MAGIC {
            return Err(Error::InvalidPackageMagic { found: magic });
        }
        let version = PackageVersion::from_u16(reader.read_u16::<LittleEndian>()?)?;

        let minimum = version.min_header_size() as u64;
        if stream_len < minimum {
            return Err(Error::TruncatedHeader {
                size: stream_len,
                minimum,
            });
        }

        let mut prefix = vec![0u8; PREFIX_SIZE];
        prefix[..4].copy_from_slice(&magic.to_le_bytes());
        prefix[4..6].copy_from_slice(&version.to_u16().to_le_bytes());
        reader.read_exact(&mut prefix[6..])?;

        let name_length = i32::from_le_bytes(read_array(&prefix, FOLDER_NAME_OFFSET));
        let name_bytes = if name_length < 0 {
            u64::from(name_length.unsigned_abs()) * 2
        } else {
            u64::from(name_length.unsigned_abs())
        };
        // Compression type, tag and extra-names count follow the fixed block
        let minimum = minimum + name_bytes + 12;
        if stream_len < minimum {
            return Err(Error::TruncatedHeader {
                size: stream_len,
                minimum,
            });
        }

        let fixed_start = PREFIX_SIZE + name_bytes as usize;
        prefix.resize(fixed_start + version.fixed_block_size(), 0);
        reader.read_exact(&mut prefix[PREFIX_SIZE..])?;

        let compression = CompressionType::from_u32(reader.read_u32::<LittleEndian>()?)?;
        let mut physical_size = prefix.len() + 4;

        let mut chunks = Vec::new();
        if compression.is_compressed() {
            let count = reader.read_u32::<LittleEndian>()? as usize;
            physical_size += 4;
            let table_size = count as u64 * CHUNK_DESCRIPTOR_SIZE as u64;
            if physical_size as u64 + table_size > stream_len {
                return Err(Error::InvalidFormat(format!(
                    "chunk table with {count} entries exceeds file size"
                )));
            }
            chunks.reserve(count);
            for _ in 0..count {
                chunks.push(Chunk::new(
                    reader.read_u32::<LittleEndian>()?,
                    reader.read_u32::<LittleEndian>()?,
                    reader.read_u32::<LittleEndian>()?,
                    reader.read_u32::<LittleEndian>()?,
                ));
            }
            physical_size += table_size as usize;
        }

        let tag = reader.read_u32::<LittleEndian>()?;
        let extra_count = reader.read_u32::<LittleEndian>()?;
        let mut extra_names = extra_count.to_le_bytes().to_vec();
        for _ in 0..extra_count {
            let name = read_string(reader)?;
            extra_names.extend_from_slice(&name.raw);
        }
        physical_size += 4 + extra_names.len();

        Ok(Self {
            version,
            prefix,
            fixed_start,
            compression,
            chunks,
            tag,
            extra_names,
            physical_size,
        })
    }

    /// Size of the header as laid out in the decompressed image
    pub fn logical_size(&self) -> usize {
        self.prefix.len() + 4 + 4 + self.extra_names.len()
    }

    pub fn field(&self, field: HeaderField) -> u32 {
        let offset = self.fixed_start + self.version.field_offset(field);
        u32::from_le_bytes(read_array(&self.prefix, offset))
    }

    pub fn end_of_tables(&self) -> u32 {
        u32::from_le_bytes(read_array(&self.prefix, END_OF_TABLES_OFFSET))
    }

    /// Header bytes for the decompressed image: prefix, `None` compression,
    /// tag and extra names
    pub fn logical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.logical_size());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(&CompressionType::None.to_u32().to_le_bytes());
        out.extend_from_slice(&self.tag.to_le_bytes());
        out.extend_from_slice(&self.extra_names);
        out
    }
}

/// In-place editor for the header prefix at the start of an image
pub(crate) struct HeaderPatch<'a> {
    version: PackageVersion,
    fixed_start: usize,
    bytes: &'a mut [u8],
}

impl<'a> HeaderPatch<'a> {
    pub fn new(header: &Header, bytes: &'a mut [u8]) -> Self {
        Self {
            version: header.version,
            fixed_start: header.fixed_start,
            bytes,
        }
    }

    pub fn set(&mut self, field: HeaderField, value: u32) {
        let offset = self.fixed_start + self.version.field_offset(field);
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn set_end_of_tables(&mut self, value: u32) {
        self.bytes[END_OF_TABLES_OFFSET..END_OF_TABLES_OFFSET + 4]
            .copy_from_slice(&value.to_le_bytes());
    }
}

fn read_array(bytes: &[u8], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&bytes[offset..offset + 4]);
    out
}
