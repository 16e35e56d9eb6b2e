//! On-disk layout of the DISA/DIFF container family.
//!
//! # Identity rules
//! Every structure is introduced by an 8-byte magic tag: 4 ASCII bytes
//! followed by a little-endian version word.  Tags are frozen; parsers
//! MUST reject any mismatch.
//!
//! # Layout
//! The container header sits at fixed file offset 0x100.  The active
//! descriptor table holds one [`DifiStruct`] per partition:
//!
//! | Offset | Size  | Field                       |
//! |--------|-------|-----------------------------|
//! | 0x000  | 0x44  | [`DifiHeader`]              |
//! | 0x044  | 0x78  | [`IvfcDescriptor`]          |
//! | 0x0BC  | 0x50  | [`DpfsDescriptor`]          |
//! | 0x10C  | 0x20  | descriptor hash (not read)  |
//! | 0x12C  | 0x04  | padding                     |
//!
//! # Endianness
//! All descriptor fields are strictly little-endian.  No runtime
//! negotiation is ever performed.
//!
//! The types here are borrowed views: read accessors over an
//! externally-owned byte buffer.  Nothing is copied and nothing is
//! validated — validation is the resolver's job.

use byteorder::{ByteOrder, LittleEndian};

/// DISA container (one or two partitions), version 0x00040000.
pub const DISA_MAGIC: [u8; 8] = *b"DISA\x00\x00\x04\x00";
/// DIFF container (single partition), version 0x00030000.
pub const DIFF_MAGIC: [u8; 8] = *b"DIFF\x00\x00\x03\x00";
/// Descriptor-chain header, version 0x00010000.
pub const DIFI_MAGIC: [u8; 8] = *b"DIFI\x00\x00\x01\x00";
/// Integrity (hash-tree) descriptor, version 0x00020000.
pub const IVFC_MAGIC: [u8; 8] = *b"IVFC\x00\x00\x02\x00";
/// Duplex (two-copy redundancy) descriptor, version 0x00010000.
pub const DPFS_MAGIC: [u8; 8] = *b"DPFS\x00\x00\x01\x00";

/// Absolute file offset of the container header.
pub const HEADER_OFFSET: usize = 0x100;

fn u64_at(buf: &[u8], off: usize) -> u64 {
    LittleEndian::read_u64(&buf[off..off + 8])
}

// ── DISA header ──────────────────────────────────────────────────────────────

/// View over the 0x100-byte DISA header.
#[derive(Clone, Copy)]
pub struct DisaHeader<'a>(&'a [u8]);

impl<'a> DisaHeader<'a> {
    pub const SIZE: usize = 0x100;

    pub fn new(buf: &'a [u8]) -> Option<Self> {
        buf.get(..Self::SIZE).map(Self)
    }

    pub fn magic(&self) -> &'a [u8; 8] {
        self.0[..8].try_into().unwrap()
    }

    pub fn n_partitions(&self) -> u32 {
        LittleEndian::read_u32(&self.0[0x08..0x0C])
    }

    /// Secondary descriptor-table offset (absolute).
    pub fn offset_table1(&self) -> u64 { u64_at(self.0, 0x10) }
    /// Primary descriptor-table offset (absolute).
    pub fn offset_table0(&self) -> u64 { u64_at(self.0, 0x18) }
    pub fn size_table(&self)    -> u64 { u64_at(self.0, 0x20) }

    /// Partition A descriptor offset, relative to the active table.
    pub fn offset_desc_a(&self) -> u64 { u64_at(self.0, 0x28) }
    pub fn size_desc_a(&self)   -> u64 { u64_at(self.0, 0x30) }
    pub fn offset_desc_b(&self) -> u64 { u64_at(self.0, 0x38) }
    pub fn size_desc_b(&self)   -> u64 { u64_at(self.0, 0x40) }

    pub fn offset_partition_a(&self) -> u64 { u64_at(self.0, 0x48) }
    pub fn size_partition_a(&self)   -> u64 { u64_at(self.0, 0x50) }
    pub fn offset_partition_b(&self) -> u64 { u64_at(self.0, 0x58) }
    pub fn size_partition_b(&self)   -> u64 { u64_at(self.0, 0x60) }

    /// 0 selects table0, 1 selects table1.
    pub fn active_table(&self) -> u8 { self.0[0x68] }
}

// ── DIFF header ──────────────────────────────────────────────────────────────

/// View over the 0x100-byte DIFF header.  Single partition only.
#[derive(Clone, Copy)]
pub struct DiffHeader<'a>(&'a [u8]);

impl<'a> DiffHeader<'a> {
    pub const SIZE: usize = 0x100;

    pub fn new(buf: &'a [u8]) -> Option<Self> {
        buf.get(..Self::SIZE).map(Self)
    }

    pub fn magic(&self) -> &'a [u8; 8] {
        self.0[..8].try_into().unwrap()
    }

    pub fn offset_table1(&self)    -> u64 { u64_at(self.0, 0x08) }
    pub fn offset_table0(&self)    -> u64 { u64_at(self.0, 0x10) }
    pub fn size_table(&self)       -> u64 { u64_at(self.0, 0x18) }
    pub fn offset_partition(&self) -> u64 { u64_at(self.0, 0x20) }
    pub fn size_partition(&self)   -> u64 { u64_at(self.0, 0x28) }

    /// 0 selects table0, 1 selects table1.
    pub fn active_table(&self) -> u32 {
        LittleEndian::read_u32(&self.0[0x30..0x34])
    }
}

// ── DIFI chain ───────────────────────────────────────────────────────────────

/// View over one 0x130-byte descriptor chain entry.
#[derive(Clone, Copy)]
pub struct DifiStruct<'a>(&'a [u8]);

impl<'a> DifiStruct<'a> {
    pub const SIZE: usize = 0x130;

    pub fn new(buf: &'a [u8]) -> Option<Self> {
        buf.get(..Self::SIZE).map(Self)
    }

    pub fn difi(&self) -> DifiHeader<'a> {
        DifiHeader(&self.0[..DifiHeader::SIZE])
    }

    pub fn ivfc(&self) -> IvfcDescriptor<'a> {
        IvfcDescriptor(&self.0[DifiHeader::SIZE..DifiHeader::SIZE + IvfcDescriptor::SIZE])
    }

    pub fn dpfs(&self) -> DpfsDescriptor<'a> {
        let start = DifiHeader::SIZE + IvfcDescriptor::SIZE;
        DpfsDescriptor(&self.0[start..start + DpfsDescriptor::SIZE])
    }
}

/// View over the 0x44-byte DIFI header.
#[derive(Clone, Copy)]
pub struct DifiHeader<'a>(&'a [u8]);

impl<'a> DifiHeader<'a> {
    pub const SIZE: usize = 0x44;

    pub fn magic(&self) -> &'a [u8; 8] {
        self.0[..8].try_into().unwrap()
    }

    /// Must equal [`DifiHeader::SIZE`].
    pub fn offset_ivfc(&self) -> u64 { u64_at(self.0, 0x08) }
    /// Must equal [`IvfcDescriptor::SIZE`].
    pub fn size_ivfc(&self)   -> u64 { u64_at(self.0, 0x10) }
    /// Must equal `offset_ivfc + size_ivfc`.
    pub fn offset_dpfs(&self) -> u64 { u64_at(self.0, 0x18) }
    /// Must equal [`DpfsDescriptor::SIZE`].
    pub fn size_dpfs(&self)   -> u64 { u64_at(self.0, 0x20) }
    /// Must equal `offset_dpfs + size_dpfs`.
    pub fn offset_hash(&self) -> u64 { u64_at(self.0, 0x28) }
    /// May include padding; never below 0x20.
    pub fn size_hash(&self)   -> u64 { u64_at(self.0, 0x30) }

    /// Level 4 stored contiguously outside the duplex scheme.
    pub fn ivfc_use_extlvl4(&self) -> bool { self.0[0x38] != 0 }
    /// Selects the live level-1 copy wholesale.
    pub fn dpfs_lvl1_selector(&self) -> bool { self.0[0x39] != 0 }

    /// Partition-relative external level-4 offset; meaningful only when
    /// [`ivfc_use_extlvl4`](Self::ivfc_use_extlvl4) is set.
    pub fn ivfc_offset_extlvl4(&self) -> u64 { u64_at(self.0, 0x3C) }
}

/// View over the 0x78-byte IVFC (integrity hierarchy) descriptor.
///
/// Level offsets are relative to the duplex-resolved level-3 image.
/// Only level 4 is ever read; levels 1-3 bound-check the chain.
#[derive(Clone, Copy)]
pub struct IvfcDescriptor<'a>(&'a [u8]);

impl<'a> IvfcDescriptor<'a> {
    pub const SIZE: usize = 0x78;

    pub fn magic(&self) -> &'a [u8; 8] {
        self.0[..8].try_into().unwrap()
    }

    /// Must equal the DIFI header's hash size.
    pub fn size_hash(&self) -> u64 { u64_at(self.0, 0x08) }

    pub fn offset_lvl1(&self) -> u64 { u64_at(self.0, 0x10) }
    pub fn size_lvl1(&self)   -> u64 { u64_at(self.0, 0x18) }
    pub fn offset_lvl2(&self) -> u64 { u64_at(self.0, 0x28) }
    pub fn size_lvl2(&self)   -> u64 { u64_at(self.0, 0x30) }
    pub fn offset_lvl3(&self) -> u64 { u64_at(self.0, 0x40) }
    pub fn size_lvl3(&self)   -> u64 { u64_at(self.0, 0x48) }
    pub fn offset_lvl4(&self) -> u64 { u64_at(self.0, 0x58) }
    pub fn size_lvl4(&self)   -> u64 { u64_at(self.0, 0x60) }

    /// Must equal [`IvfcDescriptor::SIZE`].
    pub fn size_ivfc(&self) -> u64 { u64_at(self.0, 0x70) }
}

/// View over the 0x50-byte DPFS (duplex) descriptor.
///
/// Offsets are partition-relative; each `size` is the size of ONE
/// physical copy, with the second copy immediately after the first.
#[derive(Clone, Copy)]
pub struct DpfsDescriptor<'a>(&'a [u8]);

impl<'a> DpfsDescriptor<'a> {
    pub const SIZE: usize = 0x50;

    pub fn magic(&self) -> &'a [u8; 8] {
        self.0[..8].try_into().unwrap()
    }

    pub fn offset_lvl1(&self) -> u64 { u64_at(self.0, 0x08) }
    pub fn size_lvl1(&self)   -> u64 { u64_at(self.0, 0x10) }
    pub fn offset_lvl2(&self) -> u64 { u64_at(self.0, 0x20) }
    pub fn size_lvl2(&self)   -> u64 { u64_at(self.0, 0x28) }
    /// Address bits covered by one level-2 bit.
    pub fn log_lvl2(&self)    -> u64 { u64_at(self.0, 0x30) }
    pub fn offset_lvl3(&self) -> u64 { u64_at(self.0, 0x38) }
    pub fn size_lvl3(&self)   -> u64 { u64_at(self.0, 0x40) }
    /// Address bits covered by one level-3 bit.
    pub fn log_lvl3(&self)    -> u64 { u64_at(self.0, 0x48) }
}
