//! Container resolution — from raw bytes to a validated [`ReaderContext`].
//!
//! # Resolution
//! [`resolve`] walks the container held fully in memory: container header
//! at 0x100, active descriptor table, partition selection, then the DIFI
//! chain (DIFI header + IVFC descriptor + DPFS descriptor).  Every offset
//! and size relation is checked here, once; the duplex engine performs no
//! bounds checks of its own against the container.  Either a fully
//! validated context is returned or a [`ResolveError`] — there is no
//! partial result.
//!
//! # Containment
//! Each duplex level holds two physical copies, the second immediately
//! after the first, so containment is enforced at twice the declared copy
//! size: level N's copies must end at or before level N+1's region, and
//! level 3's copies must end inside the partition.
//!
//! # Overflow
//! All offset/size fields are untrusted u64 values; sums go through
//! checked arithmetic and overflow is a validation failure.

use thiserror::Error;

use crate::descriptor::{
    DiffHeader, DifiHeader, DifiStruct, DisaHeader, DpfsDescriptor, IvfcDescriptor,
    DIFF_MAGIC, DIFI_MAGIC, DISA_MAGIC, DPFS_MAGIC, HEADER_OFFSET, IVFC_MAGIC,
};
use crate::dpfs::DuplexRegion;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("container too small: {0} bytes")]
    TooSmall(u64),
    #[error("unrecognized container magic: {}", hex::encode(.0))]
    UnknownMagic([u8; 8]),
    #[error("partition B requested but container holds {0} partition(s)")]
    PartitionUnavailable(u32),
    #[error("descriptor chain at {offset:#x} out of bounds")]
    DescriptorBounds { offset: u64 },
    #[error("partition {offset:#x}+{size:#x} exceeds container size")]
    PartitionBounds { offset: u64, size: u64 },
    #[error("bad {name} magic: {}", hex::encode(.found))]
    DescriptorMagic { name: &'static str, found: [u8; 8] },
    #[error("malformed DIFI header: {0}")]
    DifiLayout(&'static str),
    #[error("malformed DPFS descriptor: {0}")]
    DpfsGeometry(&'static str),
    #[error("malformed IVFC descriptor: {0}")]
    IvfcGeometry(&'static str),
    #[error("hash size mismatch: DIFI declares {difi:#x}, IVFC declares {ivfc:#x}")]
    HashSizeMismatch { difi: u64, ivfc: u64 },
    #[error("external level 4 region exceeds partition bounds")]
    PayloadBounds,
}

// ── ReaderContext ────────────────────────────────────────────────────────────

/// The validated, resolved view of one container partition.
///
/// Produced once by [`resolve`] and read-only thereafter.  All duplex
/// offsets are absolute file offsets; `lvl4_offset` is relative to the
/// duplex level-3 image for an internal payload and an absolute file
/// offset for an external one.
#[derive(Debug, Clone, Copy)]
pub struct ReaderContext {
    pub partition_offset: u64,
    pub partition_size:   u64,

    pub lvl1: DuplexRegion,
    pub lvl2: DuplexRegion,
    pub lvl3: DuplexRegion,

    /// Picks the live level-1 copy wholesale (level 1 has no level above it).
    pub lvl1_selector: bool,
    pub log_lvl2: u32,
    pub log_lvl3: u32,

    pub lvl4_offset:   u64,
    pub lvl4_size:     u64,
    pub lvl4_external: bool,
}

fn end(offset: u64, size: u64) -> Option<u64> {
    offset.checked_add(size)
}

fn copies_end(offset: u64, size: u64) -> Option<u64> {
    size.checked_mul(2).and_then(|s| offset.checked_add(s))
}

// ── Resolution ───────────────────────────────────────────────────────────────

/// Resolve a DISA/DIFF container image into a [`ReaderContext`].
///
/// `partition_b` selects the second partition of a two-partition DISA
/// container; it is invalid for DIFF and for single-partition DISA.
pub fn resolve(data: &[u8], partition_b: bool) -> Result<ReaderContext, ResolveError> {
    let total = data.len() as u64;
    if data.len() < 0x200 {
        return Err(ResolveError::TooSmall(total));
    }
    let header = &data[HEADER_OFFSET..];
    let tag: [u8; 8] = header[..8].try_into().unwrap_or([0; 8]);

    // Container header: partition bounds and the DIFI chain offset.
    let (partition_offset, partition_size, offset_difi) = if tag == DISA_MAGIC {
        let disa = DisaHeader::new(header).ok_or(ResolveError::TooSmall(total))?;
        let table = if disa.active_table() != 0 {
            disa.offset_table1()
        } else {
            disa.offset_table0()
        };
        if partition_b {
            if disa.n_partitions() != 2 {
                return Err(ResolveError::PartitionUnavailable(disa.n_partitions()));
            }
            let difi = end(table, disa.offset_desc_b())
                .ok_or(ResolveError::DescriptorBounds { offset: table })?;
            (disa.offset_partition_b(), disa.size_partition_b(), difi)
        } else {
            let difi = end(table, disa.offset_desc_a())
                .ok_or(ResolveError::DescriptorBounds { offset: table })?;
            (disa.offset_partition_a(), disa.size_partition_a(), difi)
        }
    } else if tag == DIFF_MAGIC {
        if partition_b {
            return Err(ResolveError::PartitionUnavailable(1));
        }
        let diff = DiffHeader::new(header).ok_or(ResolveError::TooSmall(total))?;
        let table = if diff.active_table() != 0 {
            diff.offset_table1()
        } else {
            diff.offset_table0()
        };
        (diff.offset_partition(), diff.size_partition(), table)
    } else {
        return Err(ResolveError::UnknownMagic(tag));
    };

    if offset_difi == 0
        || end(offset_difi, DifiStruct::SIZE as u64).map_or(true, |e| e > total)
    {
        return Err(ResolveError::DescriptorBounds { offset: offset_difi });
    }
    if end(partition_offset, partition_size).map_or(true, |e| e > total) {
        return Err(ResolveError::PartitionBounds {
            offset: partition_offset,
            size:   partition_size,
        });
    }

    let chain = DifiStruct::new(&data[offset_difi as usize..])
        .ok_or(ResolveError::DescriptorBounds { offset: offset_difi })?;
    let difi = chain.difi();
    let ivfc = chain.ivfc();
    let dpfs = chain.dpfs();

    check_magic("DIFI", difi.magic(), &DIFI_MAGIC)?;
    check_magic("IVFC", ivfc.magic(), &IVFC_MAGIC)?;
    check_magic("DPFS", dpfs.magic(), &DPFS_MAGIC)?;

    check_difi(&difi)?;
    let (lvl1, lvl2, lvl3, log_lvl2, log_lvl3) =
        check_dpfs(&dpfs, partition_offset, partition_size)?;
    let (lvl4_offset, lvl4_size, lvl4_external) =
        check_ivfc(&ivfc, &difi, &dpfs, partition_offset, partition_size)?;

    Ok(ReaderContext {
        partition_offset,
        partition_size,
        lvl1,
        lvl2,
        lvl3,
        lvl1_selector: difi.dpfs_lvl1_selector(),
        log_lvl2,
        log_lvl3,
        lvl4_offset,
        lvl4_size,
        lvl4_external,
    })
}

fn check_magic(
    name: &'static str,
    found: &[u8; 8],
    expected: &[u8; 8],
) -> Result<(), ResolveError> {
    if found != expected {
        return Err(ResolveError::DescriptorMagic { name, found: *found });
    }
    Ok(())
}

/// The three sub-descriptors must be back-to-back at their fixed sizes,
/// followed immediately by a hash of at least 0x20 bytes.
fn check_difi(difi: &DifiHeader) -> Result<(), ResolveError> {
    if difi.offset_ivfc() != DifiHeader::SIZE as u64 {
        return Err(ResolveError::DifiLayout("IVFC sub-descriptor offset"));
    }
    if difi.size_ivfc() != IvfcDescriptor::SIZE as u64 {
        return Err(ResolveError::DifiLayout("IVFC sub-descriptor size"));
    }
    if difi.offset_dpfs() != difi.offset_ivfc() + difi.size_ivfc() {
        return Err(ResolveError::DifiLayout("DPFS sub-descriptor offset"));
    }
    if difi.size_dpfs() != DpfsDescriptor::SIZE as u64 {
        return Err(ResolveError::DifiLayout("DPFS sub-descriptor size"));
    }
    if difi.offset_hash() != difi.offset_dpfs() + difi.size_dpfs() {
        return Err(ResolveError::DifiLayout("hash offset"));
    }
    if difi.size_hash() < 0x20 {
        return Err(ResolveError::DifiLayout("hash size below 0x20"));
    }
    Ok(())
}

fn check_dpfs(
    dpfs: &DpfsDescriptor,
    partition_offset: u64,
    partition_size: u64,
) -> Result<(DuplexRegion, DuplexRegion, DuplexRegion, u32, u32), ResolveError> {
    if dpfs.size_lvl1() == 0 || dpfs.size_lvl2() == 0 || dpfs.size_lvl3() == 0 {
        return Err(ResolveError::DpfsGeometry("zero level size"));
    }
    if copies_end(dpfs.offset_lvl1(), dpfs.size_lvl1()).map_or(true, |e| e > dpfs.offset_lvl2()) {
        return Err(ResolveError::DpfsGeometry("level 1 copies overlap level 2"));
    }
    if copies_end(dpfs.offset_lvl2(), dpfs.size_lvl2()).map_or(true, |e| e > dpfs.offset_lvl3()) {
        return Err(ResolveError::DpfsGeometry("level 2 copies overlap level 3"));
    }
    if copies_end(dpfs.offset_lvl3(), dpfs.size_lvl3()).map_or(true, |e| e > partition_size) {
        return Err(ResolveError::DpfsGeometry("level 3 copies exceed partition"));
    }
    let (log_lvl2, log_lvl3) = (dpfs.log_lvl2(), dpfs.log_lvl3());
    if log_lvl2 < 2 || log_lvl2 > log_lvl3 || log_lvl3 >= 32 {
        return Err(ResolveError::DpfsGeometry("block exponent out of range"));
    }

    // Partition end is already proven <= container size, and each level
    // lies inside the partition, so plain addition cannot overflow here.
    let region = |offset: u64, size: u64| DuplexRegion {
        offset: partition_offset + offset,
        size,
    };
    Ok((
        region(dpfs.offset_lvl1(), dpfs.size_lvl1()),
        region(dpfs.offset_lvl2(), dpfs.size_lvl2()),
        region(dpfs.offset_lvl3(), dpfs.size_lvl3()),
        log_lvl2 as u32,
        log_lvl3 as u32,
    ))
}

fn check_ivfc(
    ivfc: &IvfcDescriptor,
    difi: &DifiHeader,
    dpfs: &DpfsDescriptor,
    partition_offset: u64,
    partition_size: u64,
) -> Result<(u64, u64, bool), ResolveError> {
    if ivfc.size_hash() != difi.size_hash() {
        return Err(ResolveError::HashSizeMismatch {
            difi: difi.size_hash(),
            ivfc: ivfc.size_hash(),
        });
    }
    if ivfc.size_ivfc() != IvfcDescriptor::SIZE as u64 {
        return Err(ResolveError::IvfcGeometry("descriptor size"));
    }
    if end(ivfc.offset_lvl1(), ivfc.size_lvl1()).map_or(true, |e| e > ivfc.offset_lvl2()) {
        return Err(ResolveError::IvfcGeometry("level 1 overlaps level 2"));
    }
    if end(ivfc.offset_lvl2(), ivfc.size_lvl2()).map_or(true, |e| e > ivfc.offset_lvl3()) {
        return Err(ResolveError::IvfcGeometry("level 2 overlaps level 3"));
    }
    let lvl3_end = end(ivfc.offset_lvl3(), ivfc.size_lvl3())
        .filter(|e| *e <= dpfs.size_lvl3())
        .ok_or(ResolveError::IvfcGeometry("level 3 exceeds duplex image"))?;

    let external = difi.ivfc_use_extlvl4();
    let lvl4_offset = if external {
        // Contiguous uncompressed copy outside the duplex scheme; bounds
        // are against the partition itself.
        let abs = end(partition_offset, difi.ivfc_offset_extlvl4())
            .ok_or(ResolveError::PayloadBounds)?;
        if end(abs, ivfc.size_lvl4())
            .map_or(true, |e| e > partition_offset + partition_size)
        {
            return Err(ResolveError::PayloadBounds);
        }
        abs
    } else {
        if lvl3_end > ivfc.offset_lvl4() {
            return Err(ResolveError::IvfcGeometry("level 3 overlaps level 4"));
        }
        if end(ivfc.offset_lvl4(), ivfc.size_lvl4()).map_or(true, |e| e > dpfs.size_lvl3()) {
            return Err(ResolveError::IvfcGeometry("level 4 exceeds duplex image"));
        }
        ivfc.offset_lvl4()
    };

    Ok((lvl4_offset, ivfc.size_lvl4(), external))
}
