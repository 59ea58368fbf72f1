//! The table header as a mutable byte buffer.
//!
//! ## Header layout
//! ---
//! | Byte offset | Description |
//! | --- | --- |
//! | 0 | Version byte |
//! | 1 - 3 | Last update (year-1900, month, day) |
//! | 4 - 7 | Record count, little-endian |
//! | 8 - 9 | Start of records, little-endian |
//! | 10 - 11 | Record length including delete flag, little-endian |
//! | 12 - 28 | Reserved |
//! | 29 | Codepage byte |
//! | 30 - 31 | Reserved |
//! | 32 - n | 32-byte field descriptors |
//! | n + 1 | Terminator, `0x0D` |
//! | n + 2.. | Extra region (VFP: 263-byte backlink) |
//!
//! The buffer holds the 32-byte prefix, the descriptor block, the
//! terminator and the extra region in one piece; `start` and
//! `record_length` are derived whenever the descriptor or extra
//! blocks are replaced.

use crate::codec::{pack_date, pack_u16, pack_u32, unpack_date, unpack_u16, unpack_u32, ByteOrder};
use crate::temporal::Date;
use crate::{DbfError, Result};

#[cfg(test)]
mod tests;

pub const TERMINATOR: u8 = 0x0d;

#[derive(Debug, Clone)]
pub struct TableHeader {
    data: Vec<u8>,
}

impl TableHeader {
    /// A blank header: no fields, record length 1 (the delete flag),
    /// records starting right after the terminator.
    pub fn new() -> TableHeader {
        let mut data = vec![0u8; 33];
        data[32] = TERMINATOR;
        let mut header = TableHeader { data };
        header.data[8..10].copy_from_slice(&33u16.to_le_bytes());
        header.data[10..12].copy_from_slice(&1u16.to_le_bytes());
        header
    }

    /// Wrap the 32-byte prefix read from disk.
    pub fn from_bytes(prefix: &[u8]) -> Result<TableHeader> {
        if prefix.len() != 32 {
            return Err(DbfError::Corrupt(format!(
                "table header should be 32 bytes, but is {} bytes",
                prefix.len()
            )));
        }
        let mut data = prefix.to_vec();
        data.push(TERMINATOR);
        Ok(TableHeader { data })
    }

    fn terminator_offset(&self) -> Result<usize> {
        let mut offset = 32;
        while offset < self.data.len() {
            if self.data[offset] == TERMINATOR {
                return Ok(offset);
            }
            offset += 32;
        }
        Err(DbfError::Corrupt("corrupt field structure".to_string()))
    }

    pub fn version(&self) -> u8 {
        self.data[0]
    }

    pub fn set_version(&mut self, version: u8) {
        self.data[0] = version;
    }

    pub fn codepage(&self) -> u8 {
        self.data[29]
    }

    pub fn set_codepage(&mut self, codepage: u8) {
        self.data[29] = codepage;
    }

    pub fn record_count(&self) -> usize {
        unpack_u32(&self.data[4..8], ByteOrder::Little).unwrap_or(0) as usize
    }

    pub fn set_record_count(&mut self, count: usize) -> Result<()> {
        let packed = pack_u32(count as u64, ByteOrder::Little)?;
        self.data[4..8].copy_from_slice(&packed);
        Ok(())
    }

    /// Length of one record including the delete flag (read-only,
    /// derived from the field block).
    pub fn record_length(&self) -> usize {
        unpack_u16(&self.data[10..12], ByteOrder::Little).unwrap_or(1) as usize
    }

    /// File offset of the first record (read-only, derived).
    pub fn start(&self) -> usize {
        unpack_u16(&self.data[8..10], ByteOrder::Little).unwrap_or(0) as usize
    }

    /// Date of last table modification.
    pub fn update(&self) -> Date {
        match unpack_date(&self.data[1..4]) {
            Ok((y, m, d)) => Date::new(y, m, d).unwrap_or_else(|_| Date::empty()),
            Err(_) => Date::empty(),
        }
    }

    /// The full buffer, stamped with today's date.
    pub fn data(&mut self) -> Result<&[u8]> {
        let today = Date::today();
        let packed = pack_date(today.year()?, today.month()?, today.day()?)?;
        self.data[1..4].copy_from_slice(&packed);
        Ok(&self.data)
    }

    /// The encoded field-descriptor block.
    pub fn fields(&self) -> Result<&[u8]> {
        let end = self.terminator_offset()?;
        Ok(&self.data[32..end])
    }

    pub fn field_count(&self) -> Result<usize> {
        Ok(self.fields()?.len() / 32)
    }

    /// Replace the descriptor block, recomputing `record_length`
    /// from the descriptor lengths and `start` from the buffer size.
    pub fn set_fields(&mut self, block: &[u8]) -> Result<()> {
        if block.len() % 32 != 0 {
            return Err(DbfError::Corrupt(format!(
                "fields structure corrupt: {} is not a multiple of 32",
                block.len()
            )));
        }
        let end = self.terminator_offset()?;
        self.data.splice(32..end, block.iter().copied());
        let record_length: usize = 1 + block.chunks(32).map(|d| d[16] as usize).sum::<usize>();
        let length = pack_u16(record_length as u32, ByteOrder::Little)?;
        self.data[10..12].copy_from_slice(&length);
        self.refresh_start()
    }

    /// Bytes between the terminator and the first record.
    pub fn extra(&self) -> Result<&[u8]> {
        let end = self.terminator_offset()?;
        Ok(&self.data[end + 1..])
    }

    pub fn set_extra(&mut self, extra: &[u8]) -> Result<()> {
        let end = self.terminator_offset()?;
        self.data.truncate(end + 1);
        self.data.extend_from_slice(extra);
        self.refresh_start()
    }

    fn refresh_start(&mut self) -> Result<()> {
        let start = pack_u16(self.data.len() as u32, ByteOrder::Little)?;
        self.data[8..10].copy_from_slice(&start);
        Ok(())
    }
}

impl Default for TableHeader {
    fn default() -> TableHeader {
        TableHeader::new()
    }
}
