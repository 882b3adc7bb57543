//! Name, import, export, depends and guids table (de)serialization

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use super::strings::read_string;
use super::types::{EXPORT_FIXED_SIZE, EXPORT_TAIL_SIZE, IMPORT_RECORD_SIZE};
use super::{ExportEntry, ImportEntry, NameEntry, PackageVersion};
use crate::error::{Error, Result};

/// Size of one depends entry
pub(crate) const DEPENDS_ENTRY_SIZE: usize = 4;

/// Size of one guids entry: 16-byte guid + `i32` index
pub(crate) const GUID_ENTRY_SIZE: usize = 20;

/// Upper bound on the per-export trailer count
const MAX_EXPORT_TRAILER: u32 = 0x10000;

/// Refuse counts that cannot fit in the bytes that remain
fn check_count(table: &str, count: u32, min_record: usize, available: u64) -> Result<()> {
    if u64::from(count) * min_record as u64 > available {
        return Err(Error::InvalidFormat(format!(
            "{table} table claims {count} entries but only {available} bytes remain"
        )));
    }
    Ok(())
}

pub(crate) fn read_names<R: Read + ?Sized>(
    reader: &mut R,
    count: u32,
    version: PackageVersion,
    available: u64,
) -> Result<Vec<NameEntry>> {
    check_count("names", count, 4, available)?;
    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let string = read_string(reader)?;
        let flags = if version.has_name_flags() {
            Some(reader.read_u64::<LittleEndian>()?)
        } else {
            None
        };
        names.push(NameEntry::from_parsed(string, flags));
    }
    Ok(names)
}

pub(crate) fn read_imports<R: Read + ?Sized>(
    reader: &mut R,
    count: u32,
    available: u64,
) -> Result<Vec<ImportEntry>> {
    check_count("imports", count, IMPORT_RECORD_SIZE, available)?;
    let mut imports = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut raw = [0u8; IMPORT_RECORD_SIZE];
        reader.read_exact(&mut raw)?;
        imports.push(ImportEntry::from_raw(raw));
    }
    Ok(imports)
}

pub(crate) fn read_exports<R: Read + ?Sized>(
    reader: &mut R,
    count: u32,
    available: u64,
) -> Result<Vec<ExportEntry>> {
    check_count("exports", count, EXPORT_FIXED_SIZE + EXPORT_TAIL_SIZE, available)?;
    let mut exports = Vec::with_capacity(count as usize);
    for index in 0..count {
        let mut raw = vec![0u8; EXPORT_FIXED_SIZE];
        reader.read_exact(&mut raw)?;
        let trailer = u32::from_le_bytes([raw[44], raw[45], raw[46], raw[47]]);
        if trailer > MAX_EXPORT_TRAILER {
            return Err(Error::InvalidFormat(format!(
                "export {index} has an implausible trailer count {trailer}"
            )));
        }
        let rest = trailer as usize * 4 + EXPORT_TAIL_SIZE;
        raw.resize(EXPORT_FIXED_SIZE + rest, 0);
        reader.read_exact(&mut raw[EXPORT_FIXED_SIZE..])?;
        exports.push(ExportEntry::from_raw(raw));
    }
    Ok(exports)
}

/// Read a fixed-stride table as an opaque blob
pub(crate) fn read_fixed<R: Read + ?Sized>(
    reader: &mut R,
    table: &str,
    count: u32,
    stride: usize,
    available: u64,
) -> Result<Vec<u8>> {
    check_count(table, count, stride, available)?;
    let mut raw = vec![0u8; count as usize * stride];
    reader.read_exact(&mut raw)?;
    Ok(raw)
}

pub(crate) fn write_names(names: &[NameEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(names.iter().map(|n| n.raw().len()).sum());
    for name in names {
        out.extend_from_slice(name.raw());
    }
    out
}

pub(crate) fn write_imports(imports: &[ImportEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(imports.len() * IMPORT_RECORD_SIZE);
    for import in imports {
        out.extend_from_slice(import.raw());
    }
    out
}

/// Serialized length of the exports table
pub(crate) fn exports_len(exports: &[ExportEntry]) -> usize {
    exports.iter().map(|e| e.raw().len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_names_round_trip_is_byte_exact() {
        let source = [
            NameEntry::new("Core", PackageVersion::Me2, 0x10),
            NameEntry::new("Texture2D", PackageVersion::Me2, 0x20),
        ];
        let bytes = write_names(&source);
        let available = bytes.len() as u64;
        let names =
            read_names(&mut Cursor::new(&bytes), 2, PackageVersion::Me2, available).unwrap();
        assert_eq!(names[1].name(), "Texture2D");
        assert_eq!(names[1].flags(PackageVersion::Me2), Some(0x20));
        assert_eq!(write_names(&names), bytes);
    }

    #[test]
    fn test_exports_variable_width() {
        let mut bytes = Vec::new();
        for trailer in [0u32, 3] {
            let mut raw = vec![0u8; EXPORT_FIXED_SIZE];
            raw[44..48].copy_from_slice(&trailer.to_le_bytes());
            raw.resize(EXPORT_FIXED_SIZE + trailer as usize * 4 + EXPORT_TAIL_SIZE, 0xAB);
            bytes.extend_from_slice(&raw);
        }
        let exports = read_exports(&mut Cursor::new(&bytes), 2, bytes.len() as u64).unwrap();
        assert_eq!(exports[0].raw().len(), 68);
        assert_eq!(exports[1].raw().len(), 80);
        assert_eq!(exports_len(&exports), bytes.len());
    }

    #[test]
    fn test_count_larger_than_data_rejected() {
        let bytes = vec![0u8; 28];
        assert!(matches!(
            read_imports(&mut Cursor::new(&bytes), 1000, bytes.len() as u64),
            Err(Error::InvalidFormat(_))
        ));
        assert_eq!(read_imports(&mut Cursor::new(&bytes), 1, 28).unwrap().len(), 1);
    }
}
