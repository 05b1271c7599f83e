//! On-disk layout of a PCF sidecar file: a `u32` total-size prefix, the URL
//! and response headers, then a packed block bitmap starting immediately
//! after.

use std::io::{Read, Seek, SeekFrom, Write};

use codec::{Reader, Writer};

use crate::errors::PcfError;

pub struct HeaderBlock {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Encodes the header block, including its own `u32` length prefix.
pub fn encode_header_block(block: &HeaderBlock) -> Result<Vec<u8>, PcfError> {
    let mut inner = Writer::new();
    inner
        .write_str(&block.url)
        .map_err(|e| PcfError::MalformedSidecar(e.to_string()))?;
    inner
        .write_size(block.headers.len() as u64)
        .map_err(|e| PcfError::MalformedSidecar(e.to_string()))?;
    for (name, value) in &block.headers {
        inner
            .write_str(name)
            .map_err(|e| PcfError::MalformedSidecar(e.to_string()))?;
        inner
            .write_str(value)
            .map_err(|e| PcfError::MalformedSidecar(e.to_string()))?;
    }

    let inner = inner.into_bytes();
    let total = 4 + inner.len() as u32;

    let mut out = Writer::new();
    out.write_u32(total);
    out.write_bytes(&inner);
    Ok(out.into_bytes())
}

/// Parses a header block from the start of `bytes`, returning the block and
/// the total byte length it occupied (where the bitmap begins).
pub fn decode_header_block(bytes: &[u8]) -> Result<(HeaderBlock, u64), PcfError> {
    let mut r = Reader::new(bytes);
    let total = r
        .read_u32()
        .map_err(|e| PcfError::MalformedSidecar(e.to_string()))?;

    if (total as usize) > bytes.len() {
        return Err(PcfError::MalformedSidecar(
            "header_total_bytes exceeds sidecar length".into(),
        ));
    }

    let url = r
        .read_str()
        .map_err(|e| PcfError::MalformedSidecar(e.to_string()))?;
    let n_headers = r
        .read_size()
        .map_err(|e| PcfError::MalformedSidecar(e.to_string()))?;

    let mut headers = Vec::with_capacity(n_headers as usize);
    for _ in 0..n_headers {
        let name = r
            .read_str()
            .map_err(|e| PcfError::MalformedSidecar(e.to_string()))?;
        let value = r
            .read_str()
            .map_err(|e| PcfError::MalformedSidecar(e.to_string()))?;
        headers.push((name, value));
    }

    Ok((HeaderBlock { url, headers }, total as u64))
}

/// Reads the whole sidecar file and splits it into the header block and the
/// raw bitmap bytes that follow it.
pub fn read_sidecar(
    file: &mut std::fs::File,
) -> Result<(HeaderBlock, u64, Vec<u8>), PcfError> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let (block, headers_offset) = decode_header_block(&buf)?;
    let bitmap_bytes = buf.get(headers_offset as usize..).unwrap_or(&[]).to_vec();

    Ok((block, headers_offset, bitmap_bytes))
}

/// Writes a fresh sidecar: header block followed by a zeroed bitmap of
/// `bitmap_len` bytes.
pub fn write_fresh_sidecar(
    file: &mut std::fs::File,
    block: &HeaderBlock,
    bitmap_len: usize,
) -> Result<u64, PcfError> {
    let header_bytes = encode_header_block(block)?;
    let headers_offset = header_bytes.len() as u64;

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header_bytes)?;
    file.write_all(&vec![0u8; bitmap_len])?;
    file.flush()?;

    Ok(headers_offset)
}

/// Flushes a single dirty bitmap byte at `headers_offset + byte_index`.
pub fn write_bitmap_byte(
    file: &mut std::fs::File,
    headers_offset: u64,
    byte_index: u64,
    value: u8,
) -> Result<(), PcfError> {
    file.seek(SeekFrom::Start(headers_offset + byte_index))?;
    file.write_all(&[value])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_block_round_trips() {
        let block = HeaderBlock {
            url: "https://example.com/a.png".into(),
            headers: vec![
                ("content-length".into(), "40000".into()),
                ("content-type".into(), "image/png".into()),
            ],
        };

        let bytes = encode_header_block(&block).unwrap();
        let (decoded, offset) = decode_header_block(&bytes).unwrap();

        assert_eq!(decoded.url, block.url);
        assert_eq!(decoded.headers, block.headers);
        assert_eq!(offset as usize, bytes.len());
    }
}
