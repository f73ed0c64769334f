//! Memory stressor: allocate 1 MiB blocks and touch one byte per page.

use std::hint::black_box;
use std::time::Instant;

use crate::core::errors::{HwlError, Result};
use crate::load::caps;
use crate::load::result::{LoadPayload, LoadResult};

const BLOCK_BYTES: usize = 1024 * 1024;
const PAGE_STRIDE: usize = 4096;

/// Allocate `clamp(requested, 1, 1000)` MiB and write `(offset ^ block) as i8`
/// at every 4096-byte stride, summing the written bytes into the checksum.
///
/// Allocation uses `try_reserve_exact`, so an exhausted allocator surfaces as
/// an error instead of aborting the process.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn run_memory(requested_mb: i64) -> Result<LoadResult> {
    let size_mb = caps::MEMORY_MB.clamp(requested_mb);
    let start = Instant::now();

    let block_count = size_mb as usize;
    let mut blocks: Vec<Vec<u8>> = Vec::with_capacity(block_count);
    let mut checksum: i64 = 0;

    for block_index in 0..block_count {
        let mut block = Vec::new();
        block
            .try_reserve_exact(BLOCK_BYTES)
            .map_err(|e| HwlError::Runtime {
                details: format!("memory stressor failed to allocate block {block_index}: {e}"),
            })?;
        block.resize(BLOCK_BYTES, 0);

        for offset in (0..BLOCK_BYTES).step_by(PAGE_STRIDE) {
            let byte = (offset ^ block_index) as u8 as i8;
            block[offset] = byte as u8;
            checksum += i64::from(byte);
        }
        blocks.push(block);
    }
    black_box(&blocks);

    Ok(LoadResult {
        magnitude: size_mb,
        payload: LoadPayload::Memory { checksum },
        duration: start.elapsed(),
    })
}
