//! Length-prefixed package strings
//!
//! The `i32` prefix counts characters including the trailing NUL. A positive
//! length means single-byte characters, a negative one UTF-16LE code units.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

/// Longest string accepted while parsing, in characters
pub(crate) const MAX_STRING_UNITS: i64 = 0x10000;

/// Character width of a serialized string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    /// One byte per character, positive length
    SingleByte,
    /// UTF-16LE, negative length
    Utf16,
}

/// A string as it was read, with its exact serialized bytes
#[derive(Debug, Clone)]
pub(crate) struct RawString {
    pub value: String,
    pub encoding: StringEncoding,
    pub raw: Vec<u8>,
}

/// Read one length-prefixed string, keeping the bytes it was stored as
pub(crate) fn read_string<R: Read + ?Sized>(reader: &mut R) -> Result<RawString> {
    let length = reader.read_i32::<LittleEndian>()?;
    let units = i64::from(length).abs();
    if units > MAX_STRING_UNITS {
        return Err(Error::InvalidFormat(format!(
            "string length {length} exceeds {MAX_STRING_UNITS} characters"
        )));
    }

    let mut raw = Vec::with_capacity(4 + units as usize * 2);
    raw.extend_from_slice(&length.to_le_bytes());

    let (value, encoding) = if length < 0 {
        let mut bytes = vec![0u8; units as usize * 2];
        reader.read_exact(&mut bytes)?;
        raw.extend_from_slice(&bytes);
        let chars: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&c| c != 0)
            .collect();
        (String::from_utf16_lossy(&chars), StringEncoding::Utf16)
    } else {
        let mut bytes = vec![0u8; units as usize];
        reader.read_exact(&mut bytes)?;
        raw.extend_from_slice(&bytes);
        // Latin-1: every byte maps to the char with the same value
        let value = bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| char::from(b))
            .collect();
        (value, StringEncoding::SingleByte)
    };

    Ok(RawString {
        value,
        encoding,
        raw,
    })
}

/// Encoding `value` is written with when `preferred` is asked for.
///
/// Single-byte output is only possible when every character fits in a byte.
pub(crate) fn resolve_encoding(value: &str, preferred: StringEncoding) -> StringEncoding {
    let fits_single_byte = value.chars().all(|c| (c as u32) < 0x100);
    if preferred == StringEncoding::SingleByte && fits_single_byte {
        StringEncoding::SingleByte
    } else {
        StringEncoding::Utf16
    }
}

/// Serialize a string with a trailing NUL
pub(crate) fn encode_string(value: &str, preferred: StringEncoding) -> Vec<u8> {
    let mut out = Vec::new();
    match resolve_encoding(value, preferred) {
        StringEncoding::SingleByte => {
            let count = value.chars().count() + 1;
            out.extend_from_slice(&(count as i32).to_le_bytes());
            out.extend(value.chars().map(|c| c as u8));
            out.push(0);
        }
        StringEncoding::Utf16 => {
            let units: Vec<u16> = value.encode_utf16().collect();
            out.extend_from_slice(&(-((units.len() + 1) as i32)).to_le_bytes());
            for unit in units {
                out.extend_from_slice(&unit.to_le_bytes());
            }
            out.extend_from_slice(&[0, 0]);
        }
    }
    out
}
