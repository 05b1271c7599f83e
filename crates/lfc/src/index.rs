//! The 24-byte append-only index record: `{ key: u64, size: u64, time: u64 }`,
//! little-endian. `size == 0` marks a tombstone whose slot is reusable.

use std::io::{Read, Seek, SeekFrom, Write};

use codec::{Reader, Writer};
use constants::LFC_RECORD_SIZE;

use crate::errors::CacheError;

#[derive(Debug, Clone, Copy)]
pub struct Record {
    pub key: u64,
    pub size: u64,
    pub time: u64,
}

impl Record {
    pub fn tombstone(key: u64) -> Self {
        Record {
            key,
            size: 0,
            time: 0,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.size == 0
    }

    pub fn to_bytes(self) -> [u8; LFC_RECORD_SIZE as usize] {
        let mut w = Writer::new();
        w.write_u64(self.key);
        w.write_u64(self.size);
        w.write_u64(self.time);
        w.into_bytes().try_into().unwrap()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CacheError> {
        let mut r = Reader::new(bytes);
        let key = r
            .read_u64()
            .map_err(|_| CacheError::MalformedIndex(0))?;
        let size = r
            .read_u64()
            .map_err(|_| CacheError::MalformedIndex(0))?;
        let time = r
            .read_u64()
            .map_err(|_| CacheError::MalformedIndex(0))?;
        Ok(Record { key, size, time })
    }
}

/// Writes a full record at `offset`, extending the file if necessary.
pub fn write_record_at(
    file: &mut std::fs::File,
    offset: u64,
    record: Record,
) -> Result<(), CacheError> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&record.to_bytes())?;
    Ok(())
}

/// Overwrites only the `size` field of a record, to tombstone it in place.
pub fn tombstone_at(file: &mut std::fs::File, offset: u64) -> Result<(), CacheError> {
    file.seek(SeekFrom::Start(offset + 8))?;
    file.write_all(&0u64.to_le_bytes())?;
    Ok(())
}

/// Reads every whole 24-byte record from `file`, ignoring a trailing partial
/// record, returning `(offset, record)` pairs in file order.
pub fn scan_records(file: &mut std::fs::File) -> Result<Vec<(u64, Record)>, CacheError> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let stride = LFC_RECORD_SIZE as usize;
    let whole = buf.len() / stride;
    let mut out = Vec::with_capacity(whole);

    for i in 0..whole {
        let offset = (i * stride) as u64;
        let slice = &buf[i * stride..(i + 1) * stride];
        out.push((offset, Record::from_bytes(slice)?));
    }

    Ok(out)
}
