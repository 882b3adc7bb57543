//! Chunk (de)compression
//!
//! A chunk on disk is a 16-byte header (tag, max block size, compressed
//! payload size, uncompressed size), one {compressed, uncompressed} size pair
//! per block, then the block payloads back to back. Blocks are independent,
//! so both directions run them through rayon and reassemble in order.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rayon::prelude::*;

use super::header::PACKAGE_MAGIC;
use super::{Chunk, ChunkBlock};
use crate::compression::{BlockCodec, compress_block};
use crate::error::{Error, Result};

/// Size of the per-chunk header
pub(crate) const CHUNK_HEADER_SIZE: usize = 16;

/// Size of one block size pair
pub(crate) const BLOCK_HEADER_SIZE: usize = 8;

/// Default uncompressed size of one block
pub const DEFAULT_MAX_BLOCK_SIZE: u32 = 0x20000;

/// Largest block size accepted when writing
pub const MAX_BLOCK_SIZE_LIMIT: u32 = 0x100000;

/// Default bound on the uncompressed size of a chunk
pub const DEFAULT_MAX_CHUNK_SIZE: u32 = 0x100000;

/// Read a chunk's compressed bytes and decompress all of its blocks
pub(crate) fn load_chunk<R: Read + Seek>(
    reader: &mut R,
    chunk: &Chunk,
    index: usize,
    codec: &dyn BlockCodec,
) -> Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(u64::from(chunk.compressed_offset)))?;
    let mut compressed = vec![0u8; chunk.compressed_size as usize];
    reader.read_exact(&mut compressed)?;

    let mut blocks = parse_blocks(&compressed, chunk, index)?;
    drop(compressed);

    blocks
        .par_iter_mut()
        .enumerate()
        .try_for_each(|(block_index, block)| -> Result<()> {
            let expected = block.uncompressed_size as usize;
            let data = codec.decompress(&block.compressed, expected)?;
            if data.len() != expected {
                return Err(Error::BlockSizeMismatch {
                    chunk: index,
                    block: block_index,
                    expected,
                    actual: data.len(),
                });
            }
            block.uncompressed = data;
            Ok(())
        })?;

    let mut out = Vec::with_capacity(chunk.uncompressed_size as usize);
    for block in &mut blocks {
        out.extend_from_slice(&block.uncompressed);
        block.release();
    }
    tracing::debug!(
        "Decompressed chunk {} ({} blocks, {} bytes)",
        index,
        blocks.len(),
        out.len()
    );
    Ok(out)
}

/// Block size a chunk was written with, read from its on-disk header
pub(crate) fn read_block_size<R: Read + Seek>(
    reader: &mut R,
    chunk: &Chunk,
    index: usize,
) -> Result<u32> {
    reader.seek(SeekFrom::Start(u64::from(chunk.compressed_offset)))?;
    let magic = reader.read_u32::<LittleEndian>()?;
    if magic != PACKAGE_MAGIC {
        return Err(Error::InvalidChunkMagic {
            chunk: index,
            found: magic,
        });
    }
    Ok(reader.read_u32::<LittleEndian>()?)
}

/// Split a chunk's compressed bytes into owned blocks
fn parse_blocks(bytes: &[u8], chunk: &Chunk, index: usize) -> Result<Vec<ChunkBlock>> {
    let mut cursor = Cursor::new(bytes);
    let magic = cursor.read_u32::<LittleEndian>()?;
    if magic != PACKAGE_MAGIC {
        return Err(Error::InvalidChunkMagic {
            chunk: index,
            found: magic,
        });
    }
    let max_block_size = cursor.read_u32::<LittleEndian>()?;
    let _payload_size = cursor.read_u32::<LittleEndian>()?;
    let uncompressed_size = cursor.read_u32::<LittleEndian>()?;

    if uncompressed_size != chunk.uncompressed_size {
        return Err(Error::InvalidFormat(format!(
            "chunk {index} header declares {uncompressed_size} bytes, table declares {}",
            chunk.uncompressed_size
        )));
    }
    if max_block_size == 0 {
        return Err(Error::InvalidFormat(format!(
            "chunk {index} has a zero block size"
        )));
    }

    let count = uncompressed_size.div_ceil(max_block_size) as usize;
    if CHUNK_HEADER_SIZE + count * BLOCK_HEADER_SIZE > bytes.len() {
        return Err(Error::UnexpectedEof {
            context: format!("block table of chunk {index}"),
        });
    }

    let mut blocks = Vec::with_capacity(count);
    for _ in 0..count {
        blocks.push(ChunkBlock {
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            ..ChunkBlock::default()
        });
    }

    let declared: u64 = blocks.iter().map(|b| u64::from(b.uncompressed_size)).sum();
    if declared != u64::from(uncompressed_size) {
        return Err(Error::InvalidFormat(format!(
            "blocks of chunk {index} add up to {declared} bytes, expected {uncompressed_size}"
        )));
    }

    let mut position = CHUNK_HEADER_SIZE + count * BLOCK_HEADER_SIZE;
    for block in &mut blocks {
        let end = position + block.compressed_size as usize;
        let payload = bytes.get(position..end).ok_or_else(|| Error::UnexpectedEof {
            context: format!("block payload of chunk {index}"),
        })?;
        block.compressed = payload.to_vec();
        position = end;
    }

    Ok(blocks)
}

/// Compress one chunk's worth of the decompressed image.
///
/// Block sizes are only known after compression, so the chunk header and
/// block table are written as placeholders and backfilled.
pub(crate) fn compress_chunk(
    data: &[u8],
    max_block_size: u32,
    codec: &dyn BlockCodec,
) -> Result<Vec<u8>> {
    let mut blocks: Vec<ChunkBlock> = data
        .par_chunks(max_block_size as usize)
        .map(|slice| -> Result<ChunkBlock> {
            let compressed = compress_block(codec, slice)?;
            Ok(ChunkBlock {
                compressed_size: compressed.len() as u32,
                uncompressed_size: slice.len() as u32,
                compressed,
                uncompressed: Vec::new(),
            })
        })
        .collect::<Result<_>>()?;

    let table_size = CHUNK_HEADER_SIZE + blocks.len() * BLOCK_HEADER_SIZE;
    let payload_size: usize = blocks.iter().map(|b| b.compressed.len()).sum();
    let mut out = Cursor::new(Vec::with_capacity(table_size + payload_size));

    out.write_all(&[0u8; CHUNK_HEADER_SIZE])?;
    out.write_all(&vec![0u8; blocks.len() * BLOCK_HEADER_SIZE])?;
    for block in &mut blocks {
        out.write_all(&block.compressed)?;
        block.compressed = Vec::new();
    }

    let payload_size = u32::try_from(payload_size).map_err(|_| Error::TooLarge {
        what: "compressed chunk",
        value: payload_size as u64,
    })?;

    out.seek(SeekFrom::Start(0))?;
    out.write_u32::<LittleEndian>(PACKAGE_MAGIC)?;
    out.write_u32::<LittleEndian>(max_block_size)?;
    out.write_u32::<LittleEndian>(payload_size)?;
    out.write_u32::<LittleEndian>(data.len() as u32)?;
    for block in &blocks {
        out.write_u32::<LittleEndian>(block.compressed_size)?;
        out.write_u32::<LittleEndian>(block.uncompressed_size)?;
    }

    Ok(out.into_inner())
}
