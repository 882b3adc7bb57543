//! Package rewriting
//!
//! A save lays out a fresh decompressed image: header, depends, guids, then
//! names, imports and exports in front of the export payloads. A table that
//! no longer fits in front of the first payload either makes room by
//! relocating payloads to the end of the data, or is appended after the data
//! when that is impossible. The image is then written as-is or split into
//! compressed chunks.
//!
//! All placement happens on an [`ExportLayout`] snapshot; the package itself
//! is left untouched.

use std::io::{Read, Seek, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use super::chunks::{self, DEFAULT_MAX_BLOCK_SIZE, DEFAULT_MAX_CHUNK_SIZE, MAX_BLOCK_SIZE_LIMIT};
use super::header::{CHUNK_DESCRIPTOR_SIZE, HeaderField, HeaderPatch};
use super::marker::PROCESSED_MARKER;
use super::negotiate::{ExportLayout, ExportSlot, plan_relocation};
use super::tables::{self, GUID_ENTRY_SIZE};
use super::{Chunk, LoadLevel, Package, SaveMode, SaveOutcome, SavePhase, SaveProgress, TableKind};
use crate::compression::CompressionType;
use crate::error::{Error, Result};

/// Progress callback type for save operations
pub type SaveProgressCallback<'a> = &'a dyn Fn(&SaveProgress);

/// Options controlling how a package is written
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Codec for compressed output; defaults to the source's, or Zlib
    pub compression: Option<CompressionType>,
    /// Upper bound on the decompressed size of one chunk
    pub max_chunk_size: u32,
    /// Decompressed size of one block
    pub max_block_size: u32,
    /// Append the processed marker
    pub append_marker: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compression: None,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            append_marker: false,
        }
    }
}

impl SaveOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the codec used for compressed output
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = Some(compression);
        self
    }

    #[must_use]
    pub fn with_max_chunk_size(mut self, size: u32) -> Self {
        self.max_chunk_size = size.max(1);
        self
    }

    /// Set the block size, clamped to `1..=MAX_BLOCK_SIZE_LIMIT`
    #[must_use]
    pub fn with_max_block_size(mut self, size: u32) -> Self {
        self.max_block_size = size.clamp(1, MAX_BLOCK_SIZE_LIMIT);
        self
    }

    /// Append the processed marker to the output
    #[must_use]
    pub fn with_marker(mut self, append: bool) -> Self {
        self.append_marker = append;
        self
    }
}

/// Where every table lands in the new image
struct TablePlacement {
    layout: ExportLayout,
    header_len: usize,
    depends_offset: u32,
    guids_offset: u32,
    names_offset: u32,
    imports_offset: u32,
    exports_offset: u32,
    end_of_tables: u32,
    names: Vec<u8>,
    imports: Vec<u8>,
    exports_len: usize,
    /// Length of the image including deferred tables
    image_len: usize,
    relocated: usize,
    deferred: Vec<TableKind>,
}

impl<R: Read + Seek> Package<R> {
    /// Write the package to `path`
    pub fn save_to_file(
        &mut self,
        path: impl AsRef<Path>,
        mode: SaveMode,
        options: &SaveOptions,
    ) -> Result<SaveOutcome> {
        self.save_to_file_with_progress(path, mode, options, &|_| {})
    }

    /// Write the package to `path` with a progress callback.
    ///
    /// The output goes to a temporary file next to `path` that replaces it
    /// once complete, so saving over the source file is safe.
    pub fn save_to_file_with_progress(
        &mut self,
        path: impl AsRef<Path>,
        mode: SaveMode,
        options: &SaveOptions,
        progress: SaveProgressCallback,
    ) -> Result<SaveOutcome> {
        let path = path.as_ref();
        self.require(LoadLevel::Full)?;

        if self.is_unchanged_at(path, mode, options) {
            tracing::info!("{} is unchanged, nothing to write", path.display());
            progress(&SaveProgress::new(SavePhase::Complete, 1, 1));
            return Ok(SaveOutcome::Unchanged);
        }

        let Some((bytes, outcome)) = self.render(mode, options, progress)? else {
            return Ok(SaveOutcome::Skipped);
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(&bytes)?;
        temp.flush()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        progress(&SaveProgress::new(SavePhase::Complete, 1, 1));
        tracing::info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(outcome)
    }

    /// Write the package to any writer
    pub fn save_to_writer<W: Write>(
        &mut self,
        writer: &mut W,
        mode: SaveMode,
        options: &SaveOptions,
    ) -> Result<SaveOutcome> {
        self.require(LoadLevel::Full)?;
        let Some((bytes, outcome)) = self.render(mode, options, &|_| {})? else {
            return Ok(SaveOutcome::Skipped);
        };
        writer.write_all(&bytes)?;
        Ok(outcome)
    }

    /// Nothing to do: same file, same representation and chunk bounds,
    /// marker already there
    fn is_unchanged_at(&mut self, path: &Path, mode: SaveMode, options: &SaveOptions) -> bool {
        let same_path = self.path.as_deref().is_some_and(|source| same_file(source, path));
        let same_codec = options.compression.is_none_or(|c| c == self.compression());
        let same_representation = match mode {
            SaveMode::AsOriginal => !self.is_compressed() || same_codec,
            SaveMode::ForceCompressed => self.is_compressed() && same_codec,
            SaveMode::ForceDecompressed => !self.is_compressed(),
        };
        let marker_ok = self.marked || !options.append_marker;
        !self.modified
            && same_path
            && same_representation
            && marker_ok
            && self.chunks_within(options)
    }

    /// Whether every source chunk already honours the requested chunk and
    /// block bounds. Always true for uncompressed sources.
    fn chunks_within(&mut self, options: &SaveOptions) -> bool {
        for (index, chunk) in self.header.chunks.iter().enumerate() {
            if chunk.uncompressed_size > options.max_chunk_size {
                return false;
            }
            match chunks::read_block_size(&mut self.stream, chunk, index) {
                Ok(size) if size <= options.max_block_size => {}
                Ok(_) => return false,
                Err(e) => {
                    tracing::debug!("Could not read block size of chunk {index}: {e}");
                    return false;
                }
            }
        }
        true
    }

    /// Produce the bytes of the output file, or `None` when the save is
    /// skipped
    fn render(
        &mut self,
        mode: SaveMode,
        options: &SaveOptions,
        progress: SaveProgressCallback,
    ) -> Result<Option<(Vec<u8>, SaveOutcome)>> {
        let compression = match mode {
            SaveMode::ForceDecompressed => CompressionType::None,
            SaveMode::ForceCompressed => options.compression.unwrap_or(if self.is_compressed() {
                self.compression()
            } else {
                CompressionType::Zlib
            }),
            SaveMode::AsOriginal if self.is_compressed() => {
                options.compression.unwrap_or(self.compression())
            }
            SaveMode::AsOriginal => CompressionType::None,
        };

        progress(&SaveProgress::new(SavePhase::PlacingTables, 0, 3));
        let placement = self.place_tables()?;

        let mut compress = compression.is_compressed();
        if compress && !placement.deferred.is_empty() {
            if mode == SaveMode::ForceCompressed && !self.modified && !self.is_compressed() {
                tracing::warn!(
                    "Tables do not fit in front of the export data, skipping compression"
                );
                return Ok(None);
            }
            tracing::warn!(
                "Deferred tables ({}) require decompressed output",
                placement
                    .deferred
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            compress = false;
        }

        let image = self.build_image(&placement, progress)?;
        if compress && image.len() <= placement.header_len {
            // Nothing to put in a chunk
            compress = false;
        }

        let mut bytes = if compress {
            self.compress_image(&image, &placement, compression, options, progress)?
        } else {
            image
        };

        if (options.append_marker || self.marked) && !bytes.ends_with(PROCESSED_MARKER) {
            bytes.extend_from_slice(PROCESSED_MARKER);
        }

        progress(&SaveProgress::new(SavePhase::Writing, 1, 1));
        let outcome = SaveOutcome::Written {
            compressed: compress,
            relocated_exports: placement.relocated,
            deferred_tables: placement.deferred,
            size: bytes.len() as u64,
        };
        Ok(Some((bytes, outcome)))
    }

    /// Decide table offsets, relocating payloads where needed
    fn place_tables(&self) -> Result<TablePlacement> {
        let header_len = self.header.logical_size();
        let mut layout = self.export_layout();

        let mut position = header_len as u64;
        let depends_offset = position;
        position += self.depends.len() as u64;
        let guids_offset = position;
        position += self.guids.len() as u64;

        if let Some(first) = layout.first_offset() {
            if position > u64::from(first) {
                return Err(Error::InvariantViolation(format!(
                    "depends and guids end at {position}, past the first export payload at {first}"
                )));
            }
        }

        let names = tables::write_names(&self.names);
        let imports = tables::write_imports(&self.imports);
        let exports_len = tables::exports_len(&self.exports);

        let mut offsets = [0u64; 3];
        let mut relocated = 0;
        let mut deferred = Vec::new();
        let kinds = [TableKind::Names, TableKind::Imports, TableKind::Exports];
        let lengths = [names.len(), imports.len(), exports_len];

        for (i, (&kind, &len)) in kinds.iter().zip(lengths.iter()).enumerate() {
            let end = position + len as u64;
            let limit = layout.first_offset().map_or(u64::MAX, u64::from);
            if end <= limit {
                offsets[i] = position;
                position = end;
                continue;
            }

            match plan_relocation(&layout, end - limit) {
                Some(plan) => {
                    tracing::debug!(
                        "Relocating {} exports to fit the {} table ({} bytes freed)",
                        plan.moves.len(),
                        kind.as_str(),
                        plan.freed
                    );
                    relocated += plan.moves.len();
                    layout.apply(&plan);
                    offsets[i] = position;
                    position = end;
                }
                None => {
                    tracing::warn!(
                        "Not enough room for the {} table, appending it after the export data",
                        kind.as_str()
                    );
                    deferred.push(kind);
                }
            }
        }

        let end_of_tables = layout.first_offset().map_or(position, u64::from);

        // Deferred tables follow the payloads, in table order
        let mut tail = layout.exports_end().max(end_of_tables);
        for (i, kind) in kinds.iter().enumerate() {
            if deferred.contains(kind) {
                offsets[i] = tail;
                tail += lengths[i] as u64;
            }
        }
        if tail > u64::from(u32::MAX) {
            return Err(Error::TooLarge {
                what: "package image",
                value: tail,
            });
        }

        Ok(TablePlacement {
            layout,
            header_len,
            depends_offset: depends_offset as u32,
            guids_offset: guids_offset as u32,
            names_offset: offsets[0] as u32,
            imports_offset: offsets[1] as u32,
            exports_offset: offsets[2] as u32,
            end_of_tables: end_of_tables as u32,
            names,
            imports,
            exports_len,
            image_len: tail as usize,
            relocated,
            deferred,
        })
    }

    /// Lay out the decompressed image described by `placement`
    fn build_image(
        &mut self,
        placement: &TablePlacement,
        progress: SaveProgressCallback,
    ) -> Result<Vec<u8>> {
        let layout = &placement.layout;
        let mut image = self.header.logical_bytes();
        image.resize(placement.end_of_tables as usize, 0);

        put(&mut image, placement.depends_offset, &self.depends);
        put(&mut image, placement.guids_offset, &self.guids);

        let sorted = layout.sorted();
        let total = sorted.len();
        for (i, slot) in sorted.iter().enumerate() {
            progress(&SaveProgress::new(SavePhase::WritingExports, i + 1, total));
            if (slot.offset as usize) < image.len() {
                return Err(Error::InvariantViolation(format!(
                    "export {} at {} overlaps data ending at {}",
                    slot.id,
                    slot.offset,
                    image.len()
                )));
            }
            image.resize(slot.offset as usize, 0);
            self.append_payload(slot, &mut image)?;
        }
        image.resize(placement.image_len.max(image.len()), 0);

        let mut exports = Vec::with_capacity(placement.exports_len);
        for (id, export) in self.exports.iter().enumerate() {
            let slot = layout.slot(id).ok_or_else(|| {
                Error::InvariantViolation(format!("export {id} missing from layout"))
            })?;
            exports.extend_from_slice(&export.record_with_layout(slot.offset, slot.size));
        }

        put(&mut image, placement.names_offset, &placement.names);
        put(&mut image, placement.imports_offset, &placement.imports);
        put(&mut image, placement.exports_offset, &exports);

        let header_len = placement.header_len;
        let mut patch = HeaderPatch::new(&self.header, &mut image[..header_len]);
        patch.set(HeaderField::NamesCount, self.names.len() as u32);
        patch.set(HeaderField::NamesOffset, placement.names_offset);
        patch.set(HeaderField::ImportsCount, self.imports.len() as u32);
        patch.set(HeaderField::ImportsOffset, placement.imports_offset);
        patch.set(HeaderField::ExportsCount, self.exports.len() as u32);
        patch.set(HeaderField::ExportsOffset, placement.exports_offset);
        patch.set(HeaderField::DependsOffset, placement.depends_offset);
        patch.set(HeaderField::GuidsOffset, placement.guids_offset);
        patch.set(HeaderField::GuidsCount, (self.guids.len() / GUID_ENTRY_SIZE) as u32);
        patch.set_end_of_tables(placement.end_of_tables);

        Ok(image)
    }

    /// Copy one export's payload (override or stored bytes) onto the image
    fn append_payload(&mut self, slot: &ExportSlot, image: &mut Vec<u8>) -> Result<()> {
        let export = &self.exports[slot.id];
        let start = image.len();
        match &export.new_data {
            Some(data) => image.extend_from_slice(data),
            None => {
                let (offset, size) = (export.data_offset(), export.data_size());
                self.get_data(offset, size, image)?;
            }
        }
        let written = image.len() - start;
        if written != slot.size as usize {
            return Err(Error::InvariantViolation(format!(
                "export {} payload is {} bytes, layout expects {}",
                slot.id, written, slot.size
            )));
        }
        Ok(())
    }

    /// Split the data region into chunks and compress them
    fn compress_image(
        &self,
        image: &[u8],
        placement: &TablePlacement,
        compression: CompressionType,
        options: &SaveOptions,
        progress: SaveProgressCallback,
    ) -> Result<Vec<u8>> {
        let codec = self.codecs.get(compression)?;
        let ranges = chunk_ranges(
            placement.header_len,
            &placement.layout,
            image.len(),
            options.max_chunk_size as usize,
        );

        let prefix = &self.header.prefix;
        let header_len = prefix.len()
            + 4
            + 4
            + ranges.len() * CHUNK_DESCRIPTOR_SIZE
            + 4
            + self.header.extra_names.len();

        let mut descriptors = Vec::with_capacity(ranges.len());
        let mut payload = Vec::new();
        let total = ranges.len();
        for (i, &(start, end)) in ranges.iter().enumerate() {
            progress(&SaveProgress::new(SavePhase::CompressingChunks, i + 1, total));
            let data = &image[start..end];
            let compressed = chunks::compress_chunk(data, options.max_block_size, codec.as_ref())?;
            let compressed_offset = header_len + payload.len();
            descriptors.push(Chunk::new(
                start as u32,
                (end - start) as u32,
                to_u32(compressed_offset, "compressed package")?,
                to_u32(compressed.len(), "compressed chunk")?,
            ));
            payload.extend_from_slice(&compressed);
        }

        let mut out = Vec::with_capacity(header_len + payload.len());
        out.extend_from_slice(&image[..prefix.len()]);
        out.extend_from_slice(&compression.to_u32().to_le_bytes());
        out.extend_from_slice(&(descriptors.len() as u32).to_le_bytes());
        for chunk in &descriptors {
            out.extend_from_slice(&chunk.uncompressed_offset.to_le_bytes());
            out.extend_from_slice(&chunk.uncompressed_size.to_le_bytes());
            out.extend_from_slice(&chunk.compressed_offset.to_le_bytes());
            out.extend_from_slice(&chunk.compressed_size.to_le_bytes());
        }
        out.extend_from_slice(&self.header.tag.to_le_bytes());
        out.extend_from_slice(&self.header.extra_names);
        out.extend_from_slice(&payload);

        tracing::debug!(
            "Compressed {} bytes into {} chunks ({} bytes)",
            image.len() - placement.header_len,
            descriptors.len(),
            out.len()
        );
        Ok(out)
    }
}

/// Partition `[header_len, image_len)` into chunk ranges.
///
/// The tables form the first unit and each payload (with the padding after
/// it) one more; units are packed into chunks of at most `max_chunk_size`
/// bytes, and units larger than that are split.
fn chunk_ranges(
    header_len: usize,
    layout: &ExportLayout,
    image_len: usize,
    max_chunk_size: usize,
) -> Vec<(usize, usize)> {
    let mut bounds: Vec<usize> = layout
        .sorted()
        .iter()
        .map(|s| s.offset as usize)
        .filter(|&o| o > header_len && o < image_len)
        .collect();
    bounds.push(image_len);
    bounds.dedup();

    let max = max_chunk_size.max(1);
    let mut ranges = Vec::new();
    let mut chunk_start = header_len;
    let mut unit_start = header_len;
    for unit_end in bounds {
        if unit_end - chunk_start > max && unit_start > chunk_start {
            ranges.push((chunk_start, unit_start));
            chunk_start = unit_start;
        }
        while unit_end - chunk_start > max {
            ranges.push((chunk_start, chunk_start + max));
            chunk_start += max;
        }
        unit_start = unit_end;
    }
    if image_len > chunk_start {
        ranges.push((chunk_start, image_len));
    }
    ranges
}

fn put(image: &mut [u8], offset: u32, bytes: &[u8]) {
    let offset = offset as usize;
    image[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn to_u32(value: usize, what: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::TooLarge {
        what,
        value: value as u64,
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn slot(id: usize, offset: u32, size: u32) -> ExportSlot {
        ExportSlot {
            id,
            offset,
            size,
            pinned: false,
        }
    }

    #[test]
    fn test_chunk_ranges_pack_units() {
        let layout = ExportLayout::new(
            vec![slot(0, 200, 300), slot(1, 500, 300), slot(2, 800, 100)],
            900,
        );
        // Tables 100..200, then payloads of 300, 300, 100
        assert_eq!(chunk_ranges(100, &layout, 900, 400), vec![(100, 500), (500, 900)]);
        assert_eq!(chunk_ranges(100, &layout, 900, 1000), vec![(100, 900)]);
    }

    #[test]
    fn test_chunk_ranges_split_oversized_units() {
        let layout = ExportLayout::new(vec![slot(0, 100, 1000)], 1100);
        let ranges = chunk_ranges(50, &layout, 1100, 400);
        assert_eq!(ranges, vec![(50, 100), (100, 500), (500, 900), (900, 1100)]);

        // Ranges tile the data region
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn test_save_options_clamp() {
        let options = SaveOptions::new()
            .with_max_block_size(u32::MAX)
            .with_max_chunk_size(0)
            .with_marker(true);
        assert_eq!(options.max_block_size, MAX_BLOCK_SIZE_LIMIT);
        assert_eq!(options.max_chunk_size, 1);
        assert!(options.append_marker);
    }
}
