//! Synthetic package builder shared by the integration tests

#![allow(dead_code)]

use pcckit::compression::{BlockCodec, ZlibCodec};
use pcckit::package::{PACKAGE_MAGIC, PackageVersion};

const FOLDER_NAME: &[u8] = b"None\0";
const TAG: u32 = 0x0C5F_7A21;
const BLOCK_SIZE: usize = 0x20000;

struct ExportSpec {
    object: String,
    class: String,
    data: Vec<u8>,
}

/// Builds packages laid out as header, depends, guids, names, imports,
/// exports, then the payloads in export order
pub struct PackageBuilder {
    version: PackageVersion,
    exports: Vec<ExportSpec>,
    guids: usize,
    gap: usize,
    data_region: Option<usize>,
    chunks: Option<Vec<usize>>,
}

/// A built package plus the facts tests check against
pub struct BuiltPackage {
    /// File bytes as written to disk
    pub bytes: Vec<u8>,
    /// Decompressed image (equal to `bytes` for uncompressed packages)
    pub image: Vec<u8>,
    pub header_len: usize,
    pub names: Vec<String>,
    pub export_offsets: Vec<u32>,
}

impl PackageBuilder {
    pub fn new(version: PackageVersion) -> Self {
        Self {
            version,
            exports: Vec::new(),
            guids: 1,
            gap: 0,
            data_region: None,
            chunks: None,
        }
    }

    /// Add an export whose class is imported from `Core`
    pub fn export(mut self, object: &str, class: &str, data: Vec<u8>) -> Self {
        self.exports.push(ExportSpec {
            object: object.to_string(),
            class: class.to_string(),
            data,
        });
        self
    }

    /// Zero bytes between the tables and the first payload
    pub fn gap(mut self, gap: usize) -> Self {
        self.gap = gap;
        self
    }

    /// Pad the gap so everything after the header is exactly `len` bytes
    pub fn data_region(mut self, len: usize) -> Self {
        self.data_region = Some(len);
        self
    }

    /// Zlib-compress the data region into chunks of the given sizes; the
    /// remainder becomes one final chunk
    pub fn compressed(mut self, chunk_sizes: Vec<usize>) -> Self {
        self.chunks = Some(chunk_sizes);
        self
    }

    fn names(&self) -> Vec<String> {
        let mut names = vec!["Core".to_string(), "Class".to_string()];
        for export in &self.exports {
            for name in [&export.class, &export.object] {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    fn classes(&self) -> Vec<String> {
        let mut classes = Vec::new();
        for export in &self.exports {
            if !classes.contains(&export.class) {
                classes.push(export.class.clone());
            }
        }
        classes
    }

    pub fn build(self) -> BuiltPackage {
        let names = self.names();
        let classes = self.classes();
        let name_index = |n: &str| names.iter().position(|x| x == n).unwrap() as i32;

        let names_bytes: Vec<u8> = names
            .iter()
            .flat_map(|n| encode_name(n, self.version))
            .collect();

        let mut imports_bytes = Vec::new();
        for class in &classes {
            for value in [name_index("Core"), 0, name_index("Class"), 0, 0, name_index(class), 0] {
                imports_bytes.extend_from_slice(&value.to_le_bytes());
            }
        }

        let fixed = fixed_block_size(self.version);
        let header_len = 16 + FOLDER_NAME.len() + fixed + 12;
        let depends_offset = header_len;
        let guids_offset = depends_offset + 4 * self.exports.len();
        let names_offset = guids_offset + 20 * self.guids;
        let imports_offset = names_offset + names_bytes.len();
        let exports_offset = imports_offset + imports_bytes.len();
        let tables_end = exports_offset + 68 * self.exports.len();
        let payload_len: usize = self.exports.iter().map(|e| e.data.len()).sum();

        let gap = match self.data_region {
            Some(len) => len - (tables_end - header_len) - payload_len,
            None => self.gap,
        };
        let end_of_tables = tables_end + gap;

        let mut export_offsets = Vec::new();
        let mut offset = end_of_tables;
        let mut exports_bytes = Vec::new();
        for export in &self.exports {
            let class_id = -(classes.iter().position(|c| c == &export.class).unwrap() as i32) - 1;
            let mut record = vec![0u8; 68];
            record[0..4].copy_from_slice(&class_id.to_le_bytes());
            record[12..16].copy_from_slice(&name_index(&export.object).to_le_bytes());
            record[24..32].copy_from_slice(&0x000F_0004u64.to_le_bytes());
            record[32..36].copy_from_slice(&(export.data.len() as u32).to_le_bytes());
            record[36..40].copy_from_slice(&(offset as u32).to_le_bytes());
            exports_bytes.extend_from_slice(&record);
            export_offsets.push(offset as u32);
            offset += export.data.len();
        }

        let mut image = Vec::new();
        image.extend_from_slice(&PACKAGE_MAGIC.to_le_bytes());
        image.extend_from_slice(&self.version.to_u16().to_le_bytes());
        image.extend_from_slice(&0x6Bu16.to_le_bytes());
        image.extend_from_slice(&(end_of_tables as u32).to_le_bytes());
        image.extend_from_slice(&(FOLDER_NAME.len() as i32).to_le_bytes());
        image.extend_from_slice(FOLDER_NAME);

        let mut block = vec![0u8; fixed];
        let base = if self.version == PackageVersion::Me2 { 4 } else { 8 };
        let guids_count_at = if self.version == PackageVersion::Me2 { 36 } else { 44 };
        let mut set = |at: usize, value: usize| {
            block[at..at + 4].copy_from_slice(&(value as u32).to_le_bytes());
        };
        set(base, names.len());
        set(base + 4, names_offset);
        set(base + 8, self.exports.len());
        set(base + 12, exports_offset);
        set(base + 16, classes.len());
        set(base + 20, imports_offset);
        set(base + 24, depends_offset);
        set(base + 28, guids_offset);
        set(guids_count_at, self.guids);
        image.extend_from_slice(&block);

        image.extend_from_slice(&0u32.to_le_bytes()); // compression
        image.extend_from_slice(&TAG.to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes()); // extra names
        assert_eq!(image.len(), header_len);

        for i in 0..self.exports.len() {
            image.extend_from_slice(&(i as i32).to_le_bytes());
        }
        for i in 0..self.guids {
            image.extend_from_slice(&[0xA0 + i as u8; 16]);
            image.extend_from_slice(&(i as i32).to_le_bytes());
        }
        image.extend_from_slice(&names_bytes);
        image.extend_from_slice(&imports_bytes);
        image.extend_from_slice(&exports_bytes);
        image.resize(end_of_tables, 0);
        for export in &self.exports {
            image.extend_from_slice(&export.data);
        }

        let bytes = match &self.chunks {
            Some(sizes) => compress(&image, header_len, sizes),
            None => image.clone(),
        };

        BuiltPackage {
            bytes,
            image,
            header_len,
            names,
            export_offsets,
        }
    }
}

fn fixed_block_size(version: PackageVersion) -> usize {
    match version {
        PackageVersion::Me2 => 80,
        PackageVersion::Me3 => 92,
    }
}

fn encode_name(name: &str, version: PackageVersion) -> Vec<u8> {
    let mut out = Vec::new();
    match version {
        PackageVersion::Me2 => {
            out.extend_from_slice(&(name.len() as i32 + 1).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.push(0);
            out.extend_from_slice(&0x0007_0010u64.to_le_bytes());
        }
        PackageVersion::Me3 => {
            out.extend_from_slice(&(-(name.len() as i32) - 1).to_le_bytes());
            for unit in name.encode_utf16().chain(std::iter::once(0)) {
                out.extend_from_slice(&unit.to_le_bytes());
            }
        }
    }
    out
}

/// Turn a decompressed image into a Zlib-chunked file
fn compress(image: &[u8], header_len: usize, sizes: &[usize]) -> Vec<u8> {
    let mut ranges = Vec::new();
    let mut start = header_len;
    for &size in sizes {
        ranges.push((start, start + size));
        start += size;
    }
    if start < image.len() {
        ranges.push((start, image.len()));
    }

    let codec = ZlibCodec::default();
    let chunks: Vec<Vec<u8>> = ranges
        .iter()
        .map(|&(start, end)| {
            let data = &image[start..end];
            let blocks: Vec<(usize, Vec<u8>)> = data
                .chunks(BLOCK_SIZE)
                .map(|b| (b.len(), codec.compress(b).unwrap()))
                .collect();
            let payload: usize = blocks.iter().map(|(_, c)| c.len()).sum();
            let mut chunk = Vec::new();
            chunk.extend_from_slice(&PACKAGE_MAGIC.to_le_bytes());
            chunk.extend_from_slice(&(BLOCK_SIZE as u32).to_le_bytes());
            chunk.extend_from_slice(&(payload as u32).to_le_bytes());
            chunk.extend_from_slice(&(data.len() as u32).to_le_bytes());
            for (len, compressed) in &blocks {
                chunk.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
                chunk.extend_from_slice(&(*len as u32).to_le_bytes());
            }
            for (_, compressed) in &blocks {
                chunk.extend_from_slice(compressed);
            }
            chunk
        })
        .collect();

    // Prefix up to the compression field, minus the trailing tag and extra names
    let prefix_len = header_len - 12;
    let physical_header = prefix_len + 8 + 16 * chunks.len() + 8;

    let mut out = image[..prefix_len].to_vec();
    out.extend_from_slice(&2u32.to_le_bytes()); // Zlib
    out.extend_from_slice(&(chunks.len() as u32).to_le_bytes());
    let mut compressed_offset = physical_header;
    for (&(start, end), chunk) in ranges.iter().zip(&chunks) {
        out.extend_from_slice(&(start as u32).to_le_bytes());
        out.extend_from_slice(&((end - start) as u32).to_le_bytes());
        out.extend_from_slice(&(compressed_offset as u32).to_le_bytes());
        out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
        compressed_offset += chunk.len();
    }
    out.extend_from_slice(&image[prefix_len + 4..header_len]);
    assert_eq!(out.len(), physical_header);
    for chunk in &chunks {
        out.extend_from_slice(chunk);
    }
    out
}

/// Deterministic payload bytes
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
