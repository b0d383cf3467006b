//! Chunk plan math.
//!
//! A file of known length is split into fixed-size chunks identified by a
//! zero-based index. Every chunk except possibly the last is exactly
//! `chunk_size` bytes; the last chunk covers the remainder. An empty file
//! still has one (zero-length) chunk so that the completeness condition
//! "all chunks received" stays meaningful.

use crate::error::{Error, Result};
use crate::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};

/// One contiguous byte range of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    /// Zero-based chunk index.
    pub index: u64,
    /// Absolute byte offset of the first byte, `index * chunk_size`.
    pub offset: u64,
    /// Length in bytes; equal to `chunk_size` except for the last chunk.
    pub length: u64,
}

impl ChunkSpec {
    /// Exclusive end offset of this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

fn validate_chunk_size(chunk_size: u64) -> Result<()> {
    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(Error::InvalidChunkSize {
            size: chunk_size,
            min: MIN_CHUNK_SIZE,
            max: MAX_CHUNK_SIZE,
        });
    }
    Ok(())
}

/// Number of chunks for a file of `total_size` bytes, `ceil(total_size / chunk_size)`.
///
/// An empty file counts as one chunk.
pub fn chunk_count(total_size: u64, chunk_size: u64) -> Result<u64> {
    validate_chunk_size(chunk_size)?;
    if total_size == 0 {
        return Ok(1);
    }
    Ok(total_size.div_ceil(chunk_size))
}

/// Build the complete ordered chunk plan for a file.
pub fn chunk_plan(total_size: u64, chunk_size: u64) -> Result<Vec<ChunkSpec>> {
    let count = chunk_count(total_size, chunk_size)?;
    let mut plan = Vec::with_capacity(count as usize);
    for index in 0..count {
        let offset = index * chunk_size;
        let length = if total_size == 0 {
            0
        } else {
            chunk_size.min(total_size - offset)
        };
        plan.push(ChunkSpec {
            index,
            offset,
            length,
        });
    }
    Ok(plan)
}

/// Validate that a client-declared chunk count matches the plan for the
/// negotiated chunk size.
pub fn validate_declared_count(total_size: u64, chunk_size: u64, declared: u64) -> Result<()> {
    let expected = chunk_count(total_size, chunk_size)?;
    if declared != expected {
        return Err(Error::InvalidChunkPlan(format!(
            "declared {declared} chunks but {total_size} bytes at chunk size {chunk_size} yields {expected}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CS: u64 = 1024 * 1024;

    #[test]
    fn exact_multiple() {
        let plan = chunk_plan(3 * CS, CS).unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|c| c.length == CS));
        assert_eq!(plan[2].offset, 2 * CS);
        assert_eq!(plan[2].end(), 3 * CS);
    }

    #[test]
    fn short_tail_chunk() {
        let plan = chunk_plan(2 * CS + 512, CS).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[2].length, 512);
        assert_eq!(plan[2].end(), 2 * CS + 512);
    }

    #[test]
    fn empty_file_has_one_chunk() {
        let plan = chunk_plan(0, CS).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].offset, 0);
        assert_eq!(plan[0].length, 0);
        assert_eq!(chunk_count(0, CS).unwrap(), 1);
    }

    #[test]
    fn single_byte_file() {
        let plan = chunk_plan(1, CS).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].length, 1);
    }

    #[test]
    fn plan_covers_file_without_gaps() {
        let plan = chunk_plan(5 * CS + 7, CS).unwrap();
        let mut cursor = 0;
        for chunk in &plan {
            assert_eq!(chunk.offset, cursor);
            cursor = chunk.end();
        }
        assert_eq!(cursor, 5 * CS + 7);
    }

    #[test]
    fn rejects_out_of_range_chunk_size() {
        assert!(chunk_count(100, 1).is_err());
        assert!(chunk_count(100, MAX_CHUNK_SIZE * 2).is_err());
    }

    #[test]
    fn declared_count_validation() {
        validate_declared_count(3 * CS, CS, 3).unwrap();
        assert!(validate_declared_count(3 * CS, CS, 4).is_err());
        assert!(validate_declared_count(0, CS, 0).is_err());
        validate_declared_count(0, CS, 1).unwrap();
    }
}
