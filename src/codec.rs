//! Byte-level primitives shared by the header, descriptor and memo
//! codecs: fixed-width integers with explicit byte order, the packed
//! three-byte modification date, and 11-byte field-name frames.

use std::convert::TryInto;

use crate::{DbfError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Pack a value into a two-byte integer.
pub fn pack_u16(value: u32, order: ByteOrder) -> Result<[u8; 2]> {
    if value > u16::MAX as u32 {
        return Err(DbfError::DataOverflow {
            message: format!("maximum two-byte integer is {}", u16::MAX),
            data: value.to_string(),
        });
    }
    Ok(match order {
        ByteOrder::Little => (value as u16).to_le_bytes(),
        ByteOrder::Big => (value as u16).to_be_bytes(),
    })
}

/// Pack a value into a four-byte integer.
pub fn pack_u32(value: u64, order: ByteOrder) -> Result<[u8; 4]> {
    if value > u32::MAX as u64 {
        return Err(DbfError::DataOverflow {
            message: format!("maximum four-byte integer is {}", u32::MAX),
            data: value.to_string(),
        });
    }
    Ok(match order {
        ByteOrder::Little => (value as u32).to_le_bytes(),
        ByteOrder::Big => (value as u32).to_be_bytes(),
    })
}

pub fn unpack_u16(bytes: &[u8], order: ByteOrder) -> Result<u16> {
    let frame: [u8; 2] = bytes
        .try_into()
        .map_err(|_| DbfError::Corrupt(format!("expected 2 bytes, found {}", bytes.len())))?;
    Ok(match order {
        ByteOrder::Little => u16::from_le_bytes(frame),
        ByteOrder::Big => u16::from_be_bytes(frame),
    })
}

pub fn unpack_u32(bytes: &[u8], order: ByteOrder) -> Result<u32> {
    let frame: [u8; 4] = bytes
        .try_into()
        .map_err(|_| DbfError::Corrupt(format!("expected 4 bytes, found {}", bytes.len())))?;
    Ok(match order {
        ByteOrder::Little => u32::from_le_bytes(frame),
        ByteOrder::Big => u32::from_be_bytes(frame),
    })
}

/// Pack a calendar date into the three header bytes
/// `(year - 1900, month, day)`.
pub fn pack_date(year: i32, month: u32, day: u32) -> Result<[u8; 3]> {
    if !(1900..=2155).contains(&year) {
        return Err(DbfError::DataOverflow {
            message: "packed dates cover 1900..=2155".to_string(),
            data: year.to_string(),
        });
    }
    Ok([(year - 1900) as u8, month as u8, day as u8])
}

/// Unpack the three header bytes into `(year, month, day)`.
pub fn unpack_date(bytes: &[u8]) -> Result<(i32, u32, u32)> {
    let frame: [u8; 3] = bytes
        .try_into()
        .map_err(|_| DbfError::Corrupt(format!("expected 3 bytes, found {}", bytes.len())))?;
    Ok((frame[0] as i32 + 1900, frame[1] as u32, frame[2] as u32))
}

/// Pack a field name into its 11-byte upper-cased, NUL-padded frame.
pub fn pack_name(name: &str) -> Result<[u8; 11]> {
    if name.len() > 10 {
        return Err(DbfError::DataOverflow {
            message: format!("maximum field name length is ten characters, `{}`", name),
            data: name.len().to_string(),
        });
    }
    let mut frame = [0u8; 11];
    for (slot, byte) in frame.iter_mut().zip(name.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    Ok(frame)
}

/// Unpack a NUL-padded name frame into a lower-cased string.
pub fn unpack_name(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| (*b as char).to_ascii_lowercase())
        .collect()
}
