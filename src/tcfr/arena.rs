//! The contiguous node arena (spec.md §4.7's node-record table): "A single
//! contiguous byte arena holds every node... The pointer layout is chosen
//! so that a single recursive traversal reads each node as a packed byte
//! stream and updates 32-bit regrets in place with no allocation."
//!
//! Grounded on the teacher's flat `Vec`-backed storage
//! (`examples/krukah-robopoker/src/mccfr/profile.rs` holds strategies in a
//! single `BTreeMap` rather than per-node heap objects) generalized one
//! step further into a raw byte arena, since spec.md explicitly calls for
//! an allocation-free hot path and a fixed on-disk record shape — a case
//! where `unsafe`-free pointer arithmetic over `&mut [u8]` is the
//! idiomatic Rust translation of the original's node-pointer tree.

use byteorder::{ByteOrder, BE};

use crate::error::{Error, Result};
use crate::street::Street;

/// byte offset of a node record within the arena.
pub type NodeOffset = u64;

pub const TAG_SHOWDOWN: u8 = 0;
pub const TAG_P1_FOLDED: u8 = 1;
pub const TAG_P0_FOLDED: u8 = 2;
pub const TAG_P1_ACTS: u8 = 3;
pub const TAG_P0_ACTS: u8 = 4;

pub const NO_FOLD_SUCC: u8 = 0xFF;

/// regret width in bytes for a given street's quantization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegretWidth {
    Byte,
    Short,
    Int,
}

impl RegretWidth {
    pub fn bytes(&self) -> usize {
        match self {
            RegretWidth::Byte => 1,
            RegretWidth::Short => 2,
            RegretWidth::Int => 4,
        }
    }
}

/// default bound on total arena size (spec.md §4.7: "Arena allocation over
/// 2 TB is fatal (configurable bound)").
pub const DEFAULT_MAX_ARENA_BYTES: u64 = 2_u64.pow(41); // 2 TiB

pub struct Arena {
    bytes: Vec<u8>,
    max_bytes: u64,
}

impl Arena {
    pub fn with_capacity(capacity_bytes: u64, max_bytes: u64) -> Result<Self> {
        if capacity_bytes > max_bytes {
            return Err(Error::resource(format!(
                "arena of {capacity_bytes} bytes exceeds the {max_bytes}-byte bound"
            )));
        }
        let capacity = usize::try_from(capacity_bytes)
            .map_err(|_| Error::resource("arena capacity does not fit in this platform's usize"))?;
        Ok(Self { bytes: vec![0u8; capacity], max_bytes })
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn slice(&self, offset: NodeOffset, len: usize) -> Result<&[u8]> {
        let start = offset as usize;
        self.bytes
            .get(start..start + len)
            .ok_or_else(|| Error::resource(format!("arena read out of bounds at offset {offset}")))
    }

    fn slice_mut(&mut self, offset: NodeOffset, len: usize) -> Result<&mut [u8]> {
        let start = offset as usize;
        let end = start + len;
        if end > self.bytes.len() {
            return Err(Error::resource(format!("arena write out of bounds at offset {offset}")));
        }
        Ok(&mut self.bytes[start..end])
    }

    pub fn tag(&self, offset: NodeOffset) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    pub fn street(&self, offset: NodeOffset) -> Result<Street> {
        let raw = self.slice(offset + 1, 1)?[0] & 0b11;
        Street::from_index(raw as usize, Street::Rive)
    }

    pub fn num_succs(&self, offset: NodeOffset) -> Result<u8> {
        Ok(self.slice(offset + 2, 1)?[0])
    }

    pub fn fold_succ_index(&self, offset: NodeOffset) -> Result<Option<u8>> {
        let raw = self.slice(offset + 3, 1)?[0];
        Ok(if raw == NO_FOLD_SUCC { None } else { Some(raw) })
    }

    pub fn half_pot(&self, offset: NodeOffset) -> Result<i32> {
        Ok(BE::read_i32(self.slice(offset + 4, 4)?))
    }

    pub fn succ_offset(&self, offset: NodeOffset, s: u8) -> Result<NodeOffset> {
        Ok(BE::read_u64(self.slice(offset + 4 + 8 * s as u64, 8)?))
    }

    /// byte offset where the per-bucket slab begins, just past the fixed
    /// header and (for nonterminals) the successor pointer table.
    pub fn slab_offset(&self, offset: NodeOffset) -> Result<NodeOffset> {
        let tag = self.tag(offset)?;
        Ok(if is_terminal_tag(tag) {
            offset + 8
        } else {
            let num_succs = self.num_succs(offset)? as u64;
            offset + 4 + 8 * num_succs
        })
    }

    fn regret_offset(&self, offset: NodeOffset, bucket: u32, succ: u8, width: RegretWidth, num_succs: u8) -> Result<NodeOffset> {
        let slab = self.slab_offset(offset)?;
        Ok(slab + (bucket as u64 * num_succs as u64 + succ as u64) * width.bytes() as u64)
    }

    pub fn regret(&self, offset: NodeOffset, bucket: u32, succ: u8, width: RegretWidth, num_succs: u8) -> Result<i64> {
        let at = self.regret_offset(offset, bucket, succ, width, num_succs)?;
        Ok(match width {
            RegretWidth::Byte => self.slice(at, 1)?[0] as i64,
            RegretWidth::Short => BE::read_u16(self.slice(at, 2)?) as i64,
            RegretWidth::Int => BE::read_i32(self.slice(at, 4)?) as i64,
        })
    }

    pub fn set_regret(&mut self, offset: NodeOffset, bucket: u32, succ: u8, width: RegretWidth, num_succs: u8, value: i64) -> Result<()> {
        let at = self.regret_offset(offset, bucket, succ, width, num_succs)?;
        match width {
            RegretWidth::Byte => self.slice_mut(at, 1)?[0] = value.clamp(0, u8::MAX as i64) as u8,
            RegretWidth::Short => BE::write_u16(self.slice_mut(at, 2)?, value.clamp(0, u16::MAX as i64) as u16),
            RegretWidth::Int => BE::write_i32(self.slice_mut(at, 4)?, value as i32),
        }
        Ok(())
    }

    fn sumprob_offset(&self, offset: NodeOffset, bucket: u32, succ: u8, num_buckets: u32, width: RegretWidth, num_succs: u8) -> Result<NodeOffset> {
        let slab = self.slab_offset(offset)?;
        let regrets_bytes = num_buckets as u64 * num_succs as u64 * width.bytes() as u64;
        Ok(slab + regrets_bytes + (bucket as u64 * num_succs as u64 + succ as u64) * 4)
    }

    pub fn sumprob(&self, offset: NodeOffset, bucket: u32, succ: u8, num_buckets: u32, width: RegretWidth, num_succs: u8) -> Result<u32> {
        let at = self.sumprob_offset(offset, bucket, succ, num_buckets, width, num_succs)?;
        Ok(BE::read_u32(self.slice(at, 4)?))
    }

    pub fn set_sumprob(&mut self, offset: NodeOffset, bucket: u32, succ: u8, num_buckets: u32, width: RegretWidth, num_succs: u8, value: u32) -> Result<()> {
        let at = self.sumprob_offset(offset, bucket, succ, num_buckets, width, num_succs)?;
        BE::write_u32(self.slice_mut(at, 4)?, value);
        Ok(())
    }

    pub fn write_tag(&mut self, offset: NodeOffset, tag: u8) -> Result<()> {
        self.slice_mut(offset, 1)?[0] = tag;
        Ok(())
    }
    pub fn write_street(&mut self, offset: NodeOffset, street: Street) -> Result<()> {
        self.slice_mut(offset + 1, 1)?[0] = street.index() as u8 & 0b11;
        Ok(())
    }
    pub fn write_num_succs(&mut self, offset: NodeOffset, n: u8) -> Result<()> {
        self.slice_mut(offset + 2, 1)?[0] = n;
        Ok(())
    }
    pub fn write_fold_succ_index(&mut self, offset: NodeOffset, idx: Option<u8>) -> Result<()> {
        self.slice_mut(offset + 3, 1)?[0] = idx.unwrap_or(NO_FOLD_SUCC);
        Ok(())
    }
    pub fn write_half_pot(&mut self, offset: NodeOffset, half_pot: i32) -> Result<()> {
        BE::write_i32(self.slice_mut(offset + 4, 4)?, half_pot);
        Ok(())
    }
    pub fn write_succ_offset(&mut self, offset: NodeOffset, s: u8, succ_offset: NodeOffset) -> Result<()> {
        BE::write_u64(self.slice_mut(offset + 4 + 8 * s as u64, 8)?, succ_offset);
        Ok(())
    }
}

fn is_terminal_tag(tag: u8) -> bool {
    matches!(tag, TAG_SHOWDOWN | TAG_P1_FOLDED | TAG_P0_FOLDED)
}

/// record size for a nonterminal (header + succ pointers + slab), padded to
/// 8 bytes (spec.md §4.7: "Record padded to 8 bytes").
pub fn nonterminal_record_len(num_succs: u8, num_buckets: u32, regret_width: RegretWidth, has_sumprobs: bool) -> u64 {
    let header = 4 + 8 * num_succs as u64;
    let regrets = num_buckets as u64 * num_succs as u64 * regret_width.bytes() as u64;
    let sumprobs = if has_sumprobs { num_buckets as u64 * num_succs as u64 * 4 } else { 0 };
    pad8(header + regrets + sumprobs)
}

/// record size for a terminal (header + half-pot, no slab).
pub fn terminal_record_len() -> u64 {
    pad8(8)
}

fn pad8(n: u64) -> u64 {
    (n + 7) & !7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonterminal_slab_round_trips_regret_and_sumprob() {
        let num_succs = 3u8;
        let num_buckets = 4u32;
        let len = nonterminal_record_len(num_succs, num_buckets, RegretWidth::Int, true);
        let mut arena = Arena::with_capacity(len, DEFAULT_MAX_ARENA_BYTES).unwrap();
        arena.write_tag(0, TAG_P0_ACTS).unwrap();
        arena.write_street(0, Street::Flop).unwrap();
        arena.write_num_succs(0, num_succs).unwrap();
        arena.write_fold_succ_index(0, Some(1)).unwrap();

        arena.set_regret(0, 2, 1, RegretWidth::Int, num_succs, 12345).unwrap();
        assert_eq!(arena.regret(0, 2, 1, RegretWidth::Int, num_succs).unwrap(), 12345);

        arena.set_sumprob(0, 2, 1, num_buckets, RegretWidth::Int, num_succs, 99).unwrap();
        assert_eq!(arena.sumprob(0, 2, 1, num_buckets, RegretWidth::Int, num_succs).unwrap(), 99);

        assert_eq!(arena.street(0).unwrap(), Street::Flop);
        assert_eq!(arena.fold_succ_index(0).unwrap(), Some(1));
    }

    #[test]
    fn terminal_stores_half_pot() {
        let len = terminal_record_len();
        let mut arena = Arena::with_capacity(len, DEFAULT_MAX_ARENA_BYTES).unwrap();
        arena.write_tag(0, TAG_SHOWDOWN).unwrap();
        arena.write_half_pot(0, -500).unwrap();
        assert_eq!(arena.half_pot(0).unwrap(), -500);
    }

    #[test]
    fn capacity_over_bound_is_rejected() {
        let err = Arena::with_capacity(100, 50);
        assert!(err.is_err());
    }
}
