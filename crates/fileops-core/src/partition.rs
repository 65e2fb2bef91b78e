//! Block partitioning — splits a read range into the ordered list of
//! blocks that both transfer modes walk.

use serde::{Deserialize, Serialize};

use crate::error::FileOpsError;

/// One contiguous sub-range of a read, at most `block_size` long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub offset: u64,
    pub length: u64,
}

impl Block {
    /// Offset one past the last byte of this block.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// A validated read request: `size` bytes starting at `offset`, moved in
/// blocks of `block_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRange {
    pub offset: u64,
    pub size: u64,
    pub block_size: u64,
}

impl ReadRange {
    pub fn new(offset: u64, size: u64, block_size: u64) -> Result<Self, FileOpsError> {
        if block_size == 0 {
            return Err(FileOpsError::protocol("block size must be positive"));
        }
        if offset.checked_add(size).is_none() {
            return Err(FileOpsError::protocol(format!(
                "range {offset}+{size} overflows the file offset space"
            )));
        }
        Ok(Self {
            offset,
            size,
            block_size,
        })
    }

    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn block_count(&self) -> u64 {
        self.size.div_ceil(self.block_size)
    }

    pub fn blocks(&self) -> Blocks {
        Blocks {
            current: self.offset,
            remaining: self.size,
            block_size: self.block_size,
        }
    }
}

/// Lazy iterator over the blocks of a [`ReadRange`], in increasing offset order.
#[derive(Debug, Clone)]
pub struct Blocks {
    current: u64,
    remaining: u64,
    block_size: u64,
}

impl Iterator for Blocks {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if self.remaining == 0 {
            return None;
        }
        let length = self.remaining.min(self.block_size);
        let block = Block {
            offset: self.current,
            length,
        };
        self.current += length;
        self.remaining -= length;
        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.div_ceil(self.block_size) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Blocks {}

/// Partition `[offset, offset + size)` into blocks of at most `block_size`.
///
/// `size == 0` yields no blocks at all, never a zero-length block.
pub fn partition(offset: u64, size: u64, block_size: u64) -> Result<Vec<Block>, FileOpsError> {
    Ok(ReadRange::new(offset, size, block_size)?.blocks().collect())
}
