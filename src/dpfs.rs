//! Duplex resolution engine — which of two physical copies is live.
//!
//! # The scheme
//! A DPFS partition keeps three levels, each stored as two physical
//! copies.  Level 1 is a bit array whose live copy is chosen wholesale by
//! the container ([`ReaderContext::lvl1_selector`]).  Level 2 is a bit
//! array of level-3 blocks; the copy consulted for each group of level-2
//! bits is chosen by the corresponding level-1 bit.  Level 3 holds the
//! actual data; the copy for each `2^log_lvl3`-byte block is chosen by
//! the corresponding level-2 bit.
//!
//! Bit `i` of a level lives in big-endian 32-bit word `i / 32` at bit
//! `31 - (i % 32)` — equivalently byte `i / 8`, MSB first.
//!
//! # Reading
//! [`read_lvl4_uncached`] resolves every byte through the full
//! level-1 → level-2 → level-3 chain.  It is the semantically
//! authoritative definition and the yardstick for the fast path.
//!
//! [`read_lvl4`] is the production path.  It requires a [`Lvl2Cache`] —
//! the level-2 bitmap with level 1 already folded in — and scans the
//! requested range left to right, batching every run of blocks that
//! share a physical copy into one contiguous copy.  One decision per
//! level-2 block boundary instead of one per byte; output is
//! byte-identical to the reference path.
//!
//! # Failure semantics
//! Malformed or undersized buffers are construction failures
//! ([`DpfsError`]).  Out-of-range read offsets are clamped, never
//! errors.  Nothing here re-checks container bounds: the resolver has
//! already proven every emitted offset, for both copies of every level.

use thiserror::Error;

use crate::reader::ReaderContext;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum DpfsError {
    #[error("level 4 payload is external; the duplex cache does not apply")]
    ExternalLvl4,
    #[error("cache buffer too small: need {required} bytes, got {available}")]
    CacheTooSmall { required: usize, available: usize },
    #[error("cache of {required} bytes exceeds the level 2 region ({lvl2_size} bytes)")]
    CacheExceedsLvl2 { required: usize, lvl2_size: u64 },
    #[error("level 1 bitmap addresses only {addressable} of {required} cache bytes")]
    CacheUnaddressable { required: usize, addressable: u64 },
    #[error("level 2 cache not built")]
    CacheNotBuilt,
}

// ── DuplexRegion ─────────────────────────────────────────────────────────────

/// One duplex level: two equal physical copies, the second immediately
/// after the first.
#[derive(Debug, Clone, Copy)]
pub struct DuplexRegion {
    /// Absolute offset of the first copy.
    pub offset: u64,
    /// Size of one copy.
    pub size: u64,
}

impl DuplexRegion {
    /// The selected physical copy.  The resolver has proven both copies
    /// in-bounds, so the slicing here cannot fail on a resolved container.
    pub fn select<'a>(&self, data: &'a [u8], second: bool) -> &'a [u8] {
        let start = (self.offset + if second { self.size } else { 0 }) as usize;
        &data[start..start + self.size as usize]
    }
}

/// Bit `idx` of a duplex bitmap, MSB first.  Bits beyond the stored
/// bitmap read as zero.
fn bitmap_bit(bits: &[u8], idx: u64) -> bool {
    bits.get((idx >> 3) as usize)
        .map_or(false, |b| (b >> (7 - (idx & 7))) & 1 == 1)
}

fn clamp_request(ctx: &ReaderContext, offset: u64, len: usize) -> usize {
    if offset >= ctx.lvl4_size {
        return 0;
    }
    (ctx.lvl4_size - offset).min(len as u64) as usize
}

// ── Merged level-2 cache ─────────────────────────────────────────────────────

/// The level-2 bitmap as if level 1 had already been resolved.
///
/// Holds one bit per level-3 block, rounded up to whole 32-bit words.
/// Built once per context; [`read_lvl4`] then only resolves the
/// remaining level-2 → level-3 layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lvl2Cache {
    bits: Vec<u8>,
}

impl Lvl2Cache {
    /// Cache bytes needed for one bit per level-3 block.
    pub fn required_size(ctx: &ReaderContext) -> usize {
        let block = 1u64 << ctx.log_lvl3;
        let bits = (ctx.lvl3.size + block - 1) >> ctx.log_lvl3;
        (((bits + 31) >> 5) << 2) as usize
    }

    /// Build the merged bitmap into an owned, exactly-sized buffer.
    pub fn build(ctx: &ReaderContext, data: &[u8]) -> Result<Self, DpfsError> {
        let mut bits = vec![0u8; Self::required_size(ctx)];
        let used = Self::build_into(ctx, data, &mut bits)?;
        bits.truncate(used);
        Ok(Self { bits })
    }

    /// Build the merged bitmap into a caller-supplied buffer; returns the
    /// number of bytes used.
    ///
    /// Fails when the payload is external, `buf` is smaller than
    /// [`required_size`](Self::required_size), the cache would exceed the
    /// level-2 region, or the level-1 bitmap cannot address all of it.
    pub fn build_into(
        ctx: &ReaderContext,
        data: &[u8],
        buf: &mut [u8],
    ) -> Result<usize, DpfsError> {
        if ctx.lvl4_external {
            return Err(DpfsError::ExternalLvl4);
        }
        let required = Self::required_size(ctx);
        if buf.len() < required {
            return Err(DpfsError::CacheTooSmall {
                required,
                available: buf.len(),
            });
        }
        if required as u64 > ctx.lvl2.size {
            return Err(DpfsError::CacheExceedsLvl2 {
                required,
                lvl2_size: ctx.lvl2.size,
            });
        }
        let addressable = ctx.lvl1.size.saturating_mul(8u64 << ctx.log_lvl2);
        if required as u64 > addressable {
            return Err(DpfsError::CacheUnaddressable {
                required,
                addressable,
            });
        }

        let lvl1 = ctx.lvl1.select(data, ctx.lvl1_selector);
        let lvl2_0 = ctx.lvl2.select(data, false);
        let lvl2_1 = ctx.lvl2.select(data, true);

        let cache = &mut buf[..required];
        cache.copy_from_slice(&lvl2_0[..required]);

        // One level-1 bit governs 2^log_lvl2 cache bytes (a slice of
        // 8 * 2^log_lvl2 level-2 bits).  Cherry-pick copy 1 wherever the
        // selected level-1 copy has the bit set.
        for j in 0.. {
            let start = (j as usize) << ctx.log_lvl2;
            if start >= required {
                break;
            }
            if bitmap_bit(lvl1, j) {
                let end = (start + (1usize << ctx.log_lvl2)).min(required);
                cache[start..end].copy_from_slice(&lvl2_1[start..end]);
            }
        }
        Ok(required)
    }

    fn bit(&self, idx: u64) -> bool {
        bitmap_bit(&self.bits, idx)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// Reference per-byte extraction of the level-4 payload.
///
/// Fills `out` starting at logical `offset` inside the payload; the
/// request is clamped to the payload size and the number of bytes copied
/// is returned (`0` when `offset` is past the end).  Every byte resolves
/// the full level-1 → level-2 → level-3 chain.
pub fn read_lvl4_uncached(
    out: &mut [u8],
    data: &[u8],
    ctx: &ReaderContext,
    offset: u64,
) -> usize {
    let size = clamp_request(ctx, offset, out.len());
    if size == 0 {
        return 0;
    }
    let out = &mut out[..size];

    // External payload: one contiguous copy, no indirection.
    if ctx.lvl4_external {
        let start = (ctx.lvl4_offset + offset) as usize;
        out.copy_from_slice(&data[start..start + size]);
        return size;
    }

    let lvl1 = ctx.lvl1.select(data, ctx.lvl1_selector);
    let base = ctx.lvl4_offset + offset;
    for (i, byte) in out.iter_mut().enumerate() {
        let pos = base + i as u64;
        let idx_lvl2 = pos >> ctx.log_lvl3;
        let idx_lvl1 = idx_lvl2 >> (3 + ctx.log_lvl2);
        let lvl2 = ctx.lvl2.select(data, bitmap_bit(lvl1, idx_lvl1));
        let lvl3 = ctx.lvl3.select(data, bitmap_bit(lvl2, idx_lvl2));
        *byte = lvl3[pos as usize];
    }
    size
}

/// Cache-assisted extraction of the level-4 payload.
///
/// Same contract as [`read_lvl4_uncached`], but an internal payload
/// requires the merged level-2 cache.  Scans the range left to right
/// keeping the current bit state; each run of level-3 blocks sharing a
/// physical copy is emitted as a single contiguous copy.
pub fn read_lvl4(
    out: &mut [u8],
    data: &[u8],
    ctx: &ReaderContext,
    cache: Option<&Lvl2Cache>,
    offset: u64,
) -> Result<usize, DpfsError> {
    let size = clamp_request(ctx, offset, out.len());
    if size == 0 {
        return Ok(0);
    }
    let out = &mut out[..size];

    if ctx.lvl4_external {
        let start = (ctx.lvl4_offset + offset) as usize;
        out.copy_from_slice(&data[start..start + size]);
        return Ok(size);
    }
    let cache = cache.ok_or(DpfsError::CacheNotBuilt)?;

    let lvl3_0 = ctx.lvl3.select(data, false);
    let lvl3_1 = ctx.lvl3.select(data, true);

    let start = ctx.lvl4_offset + offset;
    let end = start + size as u64;
    let mut read_start = start;
    let mut read_end = read_start;
    let mut state = false;

    while read_start < end {
        // Extend the run while the cached bit matches the current state.
        let idx_lvl2 = read_end >> ctx.log_lvl3;
        if cache.bit(idx_lvl2) == state {
            read_end = (idx_lvl2 + 1) << ctx.log_lvl3;
            if read_end >= end {
                read_end = end;
            } else {
                continue;
            }
        }
        // Flush the accumulated run from the copy matching the old state.
        if read_start < read_end {
            let lvl3 = if state { lvl3_1 } else { lvl3_0 };
            out[(read_start - start) as usize..(read_end - start) as usize]
                .copy_from_slice(&lvl3[read_start as usize..read_end as usize]);
            read_start = read_end;
        }
        state = !state;
    }
    Ok(size)
}
