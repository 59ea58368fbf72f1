//! Block-addressed memo side-files.
//!
//! A memo file is an array of fixed-size blocks; block 0 holds the
//! store header and a field referencing "no memo" stores block 0.
//!
//! ## dBase III (`.dbt`)
//! ---
//! | Byte offset | Description |
//! | --- | --- |
//! | 0 - 3 | Next free block, little-endian |
//! | 4 - 511 | Reserved, zero |
//! | n*512.. | Memo payload, terminated by `0x1A 0x1A` |
//!
//! ## Visual FoxPro (`.fpt`)
//! ---
//! | Byte offset | Description |
//! | --- | --- |
//! | 0 - 3 | Next free block, big-endian |
//! | 4 - 5 | Reserved |
//! | 6 - 7 | Block size in bytes, big-endian |
//! | 8 - 511 | Reserved, zero |
//! | n*size.. | `0x00 0x00 0x00 0x01`, payload length (big-endian u32), payload |

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::warn;

use crate::codec::{pack_u32, unpack_u16, unpack_u32, ByteOrder};
use crate::{DbfError, Result};

#[cfg(test)]
mod tests;

pub const DB3_BLOCK_SIZE: usize = 512;

/// The store interface shared by the concrete memo formats.
pub trait MemoStore {
    /// Fetch the payload stored at `block`.
    fn get(&mut self, block: u32) -> Result<Vec<u8>>;
    /// Store a payload, returning the block it begins at.
    fn put(&mut self, data: &[u8]) -> Result<u32>;
    /// The next unallocated block.
    fn next_free(&self) -> u32;
}

fn trim_trailing(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .map(|p| p + 1)
        .unwrap_or(0);
    &data[..end]
}

fn corrupt_memo<E>(_: E) -> DbfError {
    DbfError::Corrupt("memo file appears to be corrupt".to_string())
}

/// dBase III memo store: 512-byte blocks, payloads terminated by
/// `0x1A 0x1A`, trailing whitespace stripped on read.
pub struct Db3Memo {
    file: File,
    next_free: u32,
}

impl Db3Memo {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Db3Memo> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        let mut header = vec![0u8; DB3_BLOCK_SIZE];
        header[..4].copy_from_slice(&pack_u32(1, ByteOrder::Little)?);
        file.write_all(&header)?;
        Ok(Db3Memo { file, next_free: 1 })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Db3Memo> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map_err(corrupt_memo)?;
        let mut head = [0u8; 4];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut head).map_err(corrupt_memo)?;
        let next_free = unpack_u32(&head, ByteOrder::Little)?;
        Ok(Db3Memo { file, next_free })
    }
}

impl MemoStore for Db3Memo {
    fn get(&mut self, block: u32) -> Result<Vec<u8>> {
        self.file
            .seek(SeekFrom::Start(block as u64 * DB3_BLOCK_SIZE as u64))?;
        let mut data = Vec::new();
        let mut chunk = vec![0u8; DB3_BLOCK_SIZE];
        let terminator = loop {
            let read = self.file.read(&mut chunk)?;
            if read == 0 {
                break None;
            }
            data.extend_from_slice(&chunk[..read]);
            if let Some(pos) = data.windows(2).position(|w| w == [0x1a, 0x1a]) {
                break Some(pos);
            }
        };
        let payload = match terminator {
            Some(pos) => &data[..pos],
            None => &data[..],
        };
        Ok(trim_trailing(payload).to_vec())
    }

    fn put(&mut self, data: &[u8]) -> Result<u32> {
        let data = trim_trailing(data);
        let length = data.len() + 2; // room for the two ^Z at the end
        let blocks = (length + DB3_BLOCK_SIZE - 1) / DB3_BLOCK_SIZE;
        let this_memo = self.next_free;
        self.next_free = this_memo + blocks as u32;
        self.file.seek(SeekFrom::Start(0))?;
        self.file
            .write_all(&pack_u32(self.next_free as u64, ByteOrder::Little)?)?;
        self.file
            .seek(SeekFrom::Start(this_memo as u64 * DB3_BLOCK_SIZE as u64))?;
        self.file.write_all(data)?;
        self.file.write_all(&[0x1a, 0x1a])?;
        // zero-fill to the block boundary so writes stay block-aligned
        self.file
            .write_all(&vec![0u8; blocks * DB3_BLOCK_SIZE - length])?;
        self.file.flush()?;
        let double_check = self.get(this_memo)?;
        if double_check.len() != data.len() {
            warn!(
                "memo readback mismatch at block {}: saved {} bytes, retrieved {}",
                this_memo,
                data.len(),
                double_check.len()
            );
            return Err(DbfError::Corrupt("unknown error: memo not saved".to_string()));
        }
        Ok(this_memo)
    }

    fn next_free(&self) -> u32 {
        self.next_free
    }
}

/// Visual FoxPro memo store with a create-time block size of
/// `multiplier * 512`, 1 ≤ multiplier ≤ 32.
pub struct VfpMemo {
    file: File,
    next_free: u32,
    block_size: usize,
}

impl VfpMemo {
    const RECORD_HEADER_LENGTH: usize = 8;

    pub fn create<P: AsRef<Path>>(path: P, multiplier: usize) -> Result<VfpMemo> {
        if !(1..=32).contains(&multiplier) {
            return Err(DbfError::Invalid(format!(
                "memo block multiplier must be 1..=32, not {}",
                multiplier
            )));
        }
        let block_size = multiplier * 512;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        // the 512-byte header must land inside reserved blocks
        let next_free = ((512 + block_size - 1) / block_size).max(1) as u32;
        let mut header = vec![0u8; 512];
        header[..4].copy_from_slice(&pack_u32(next_free as u64, ByteOrder::Big)?);
        header[6..8].copy_from_slice(&crate::codec::pack_u16(block_size as u32, ByteOrder::Big)?);
        file.write_all(&header)?;
        Ok(VfpMemo { file, next_free, block_size })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<VfpMemo> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map_err(corrupt_memo)?;
        let mut header = [0u8; 512];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header).map_err(corrupt_memo)?;
        let next_free = unpack_u32(&header[..4], ByteOrder::Big)?;
        let block_size = unpack_u16(&header[6..8], ByteOrder::Big)? as usize;
        if block_size == 0 {
            return Err(DbfError::Corrupt("memo file appears to be corrupt".to_string()));
        }
        Ok(VfpMemo { file, next_free, block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl MemoStore for VfpMemo {
    fn get(&mut self, block: u32) -> Result<Vec<u8>> {
        self.file
            .seek(SeekFrom::Start(block as u64 * self.block_size as u64))?;
        let mut head = [0u8; Self::RECORD_HEADER_LENGTH];
        self.file.read_exact(&mut head)?;
        let length = unpack_u32(&head[4..8], ByteOrder::Big)? as usize;
        let mut payload = vec![0u8; length];
        self.file.read_exact(&mut payload)?;
        Ok(payload)
    }

    fn put(&mut self, data: &[u8]) -> Result<u32> {
        let data = trim_trailing(data);
        let mut head = [0u8; 4];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut head)?;
        let this_memo = unpack_u32(&head, ByteOrder::Big)?;
        let length = data.len() + Self::RECORD_HEADER_LENGTH;
        let blocks = (length + self.block_size - 1) / self.block_size;
        self.next_free = this_memo + blocks as u32;
        self.file.seek(SeekFrom::Start(0))?;
        self.file
            .write_all(&pack_u32(self.next_free as u64, ByteOrder::Big)?)?;
        self.file
            .seek(SeekFrom::Start(this_memo as u64 * self.block_size as u64))?;
        self.file.write_all(&[0x00, 0x00, 0x00, 0x01])?;
        self.file
            .write_all(&pack_u32(data.len() as u64, ByteOrder::Big)?)?;
        self.file.write_all(data)?;
        // zero-fill to the block boundary so writes stay block-aligned
        self.file
            .write_all(&vec![0u8; blocks * self.block_size - length])?;
        self.file.flush()?;
        Ok(this_memo)
    }

    fn next_free(&self) -> u32 {
        self.next_free
    }
}

/// Memo store for `:memory:` tables and tables closed with
/// `keep_memos`: a plain block map.
pub struct MemoryMemo {
    blocks: HashMap<u32, Vec<u8>>,
    next_free: u32,
}

impl MemoryMemo {
    pub fn new() -> MemoryMemo {
        MemoryMemo { blocks: HashMap::new(), next_free: 1 }
    }
}

impl Default for MemoryMemo {
    fn default() -> MemoryMemo {
        MemoryMemo::new()
    }
}

impl MemoStore for MemoryMemo {
    fn get(&mut self, block: u32) -> Result<Vec<u8>> {
        self.blocks
            .get(&block)
            .cloned()
            .ok_or_else(|| DbfError::Corrupt(format!("no memo stored at block {}", block)))
    }

    fn put(&mut self, data: &[u8]) -> Result<u32> {
        let this_memo = self.next_free;
        self.next_free += 1;
        self.blocks.insert(this_memo, data.to_vec());
        Ok(this_memo)
    }

    fn next_free(&self) -> u32 {
        self.next_free
    }
}
