//! High-level extraction — the primary embedding surface.
//!
//! ```no_run
//! use disadiff::extract::extract_lvl4;
//!
//! let data = std::fs::read("save.bin")?;
//! let payload = extract_lvl4(&data, false)?;
//! std::fs::write("payload.bin", &payload)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use thiserror::Error;

use crate::dpfs::{read_lvl4, read_lvl4_uncached, DpfsError, Lvl2Cache};
use crate::reader::{resolve, ResolveError};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Dpfs(#[from] DpfsError),
}

/// Resolve a container, build the merged level-2 cache (internal
/// payloads only) and read the whole level-4 payload.
pub fn extract_lvl4(data: &[u8], partition_b: bool) -> Result<Vec<u8>, ExtractError> {
    let ctx = resolve(data, partition_b)?;
    let cache = if ctx.lvl4_external {
        None
    } else {
        Some(Lvl2Cache::build(&ctx, data)?)
    };
    let mut out = vec![0u8; ctx.lvl4_size as usize];
    read_lvl4(&mut out, data, &ctx, cache.as_ref(), 0)?;
    Ok(out)
}

/// Like [`extract_lvl4`], but through the per-byte reference resolver.
/// Slower; used to cross-check the production path.
pub fn extract_lvl4_uncached(
    data: &[u8],
    partition_b: bool,
) -> Result<Vec<u8>, ExtractError> {
    let ctx = resolve(data, partition_b)?;
    let mut out = vec![0u8; ctx.lvl4_size as usize];
    read_lvl4_uncached(&mut out, data, &ctx, 0);
    Ok(out)
}
