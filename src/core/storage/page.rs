// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-capacity page buffer.
//!
//! A page holds length-prefixed records (`u32` little-endian length, then the
//! record bytes). Appending never fails by unwinding: callers check the
//! returned [`PageAppend`] and seal the page when it is full.

/// Result of trying to place a record in a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAppend {
    Appended,
    /// The record fits an empty page but not what is left of this one
    PageFull,
    /// The record can never fit a page of this capacity
    RecordTooLarge,
}

const LEN_PREFIX: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    capacity: usize,
    bytes: Vec<u8>,
    records: usize,
}

impl Page {
    pub fn new(capacity: usize) -> Self {
        Page {
            capacity,
            bytes: Vec::new(),
            records: 0,
        }
    }

    /// Largest record a page of `capacity` bytes can hold
    pub fn max_record_len(capacity: usize) -> usize {
        capacity.saturating_sub(LEN_PREFIX)
    }

    pub fn try_append(&mut self, record: &[u8]) -> PageAppend {
        let needed = LEN_PREFIX + record.len();
        if needed > self.capacity {
            return PageAppend::RecordTooLarge;
        }
        if self.bytes.len() + needed > self.capacity {
            return PageAppend::PageFull;
        }
        self.bytes
            .extend_from_slice(&(record.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(record);
        self.records += 1;
        PageAppend::Appended
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn record_count(&self) -> usize {
        self.records
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Split page bytes back into records
pub fn decode_records(bytes: &[u8]) -> Result<Vec<Vec<u8>>, String> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let header = bytes
            .get(offset..offset + LEN_PREFIX)
            .ok_or_else(|| format!("Truncated record header at offset {}", offset))?;
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        offset += LEN_PREFIX;
        let body = bytes
            .get(offset..offset + len)
            .ok_or_else(|| format!("Truncated record of {} bytes at offset {}", len, offset))?;
        records.push(body.to_vec());
        offset += len;
    }
    Ok(records)
}
