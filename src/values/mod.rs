//! `CFRValues` (spec.md §3, §4.5): the sparse per-(player, street,
//! nonterminal) regret/sumprob tensor.
//!
//! Grounded on the teacher's `BTreeMap`-keyed sparse storage
//! (`examples/krukah-robopoker/src/mccfr/regret.rs`,
//! `src/mccfr/profile.rs`'s `BTreeMap<Bucket, Strategy>`): we key a
//! `BTreeMap` on `(player, street, nonterminal)` the same way the teacher
//! keys one on `Bucket`, rather than a dense multi-dimensional array, since
//! most (player, street, nonterminal) triples are never visited in a
//! targeted/sampled solve (spec.md §4.5: "lazily-allocated").

pub mod alloc;
pub mod compress;
pub mod io;

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::street::Street;
use crate::Chips;

/// SPEC_FULL.md supplement #4: the original's preprocessor-templated
/// `T_VALUE` made concrete as a closed enum matched everywhere storage is
/// touched (spec.md §3's four numeric widths).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    U8,
    U16,
    I32,
    F64,
}

impl ValueKind {
    /// the on-disk suffix this kind carries (spec.md §6: `d`=f64, `i`=i32,
    /// `c`=u8, `s`=u16).
    pub const fn suffix(&self) -> char {
        match self {
            ValueKind::F64 => 'd',
            ValueKind::I32 => 'i',
            ValueKind::U8 => 'c',
            ValueKind::U16 => 's',
        }
    }

    pub fn from_suffix(c: char) -> Result<Self> {
        match c {
            'd' => Ok(ValueKind::F64),
            'i' => Ok(ValueKind::I32),
            'c' => Ok(ValueKind::U8),
            's' => Ok(ValueKind::U16),
            other => Err(Error::value(format!("unrecognized value-type suffix '{other}'"))),
        }
    }

    pub const fn width_bytes(&self) -> usize {
        match self {
            ValueKind::U8 => 1,
            ValueKind::U16 => 2,
            ValueKind::I32 => 4,
            ValueKind::F64 => 8,
        }
    }

    /// spec.md §4.5: "Value type is auto-detected from which of the
    /// candidate files exists (preference: double → int → char → short)."
    pub const READ_PREFERENCE: [ValueKind; 4] =
        [ValueKind::F64, ValueKind::I32, ValueKind::U8, ValueKind::U16];
}

#[derive(Debug, Clone)]
pub enum Slab {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    F64(Vec<f64>),
}

impl Slab {
    pub(crate) fn zeroed(kind: ValueKind, len: usize) -> Self {
        match kind {
            ValueKind::U8 => Slab::U8(vec![0; len]),
            ValueKind::U16 => Slab::U16(vec![0; len]),
            ValueKind::I32 => Slab::I32(vec![0; len]),
            ValueKind::F64 => Slab::F64(vec![0.0; len]),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Slab::U8(_) => ValueKind::U8,
            Slab::U16(_) => ValueKind::U16,
            Slab::I32(_) => ValueKind::I32,
            Slab::F64(_) => ValueKind::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Slab::U8(v) => v.len(),
            Slab::U16(v) => v.len(),
            Slab::I32(v) => v.len(),
            Slab::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_f64(&self, i: usize) -> f64 {
        match self {
            Slab::U8(v) => v[i] as f64,
            Slab::U16(v) => v[i] as f64,
            Slab::I32(v) => v[i] as f64,
            Slab::F64(v) => v[i],
        }
    }

    pub fn add_f64(&mut self, i: usize, delta: f64) {
        match self {
            Slab::U8(v) => v[i] = (v[i] as f64 + delta).clamp(0.0, u8::MAX as f64) as u8,
            Slab::U16(v) => v[i] = (v[i] as f64 + delta).clamp(0.0, u16::MAX as f64) as u16,
            Slab::I32(v) => v[i] = (v[i] as f64 + delta) as i32,
            Slab::F64(v) => v[i] += delta,
        }
    }
}

/// key into the sparse value store: (player, street, nonterminal id).
pub type ValueKey = (u8, Street, u32);

/// configuration mirrored from spec.md §4.5.
#[derive(Debug, Clone)]
pub struct CFRValuesConfig {
    pub players: Vec<bool>,
    pub streets: Vec<bool>,
    pub sumprobs: bool,
    pub root_bd: u32,
    pub root_bd_st: Street,
    pub bucket_thresholds: Vec<Chips>,
}

pub struct CFRValues {
    pub config: CFRValuesConfig,
    kind: ValueKind,
    slabs: BTreeMap<ValueKey, Slab>,
}

impl CFRValues {
    pub fn new(config: CFRValuesConfig, kind: ValueKind) -> Self {
        Self { config, kind, slabs: BTreeMap::new() }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn covers_player(&self, player: u8) -> bool {
        self.config.players.get(player as usize).copied().unwrap_or(false)
    }

    pub fn covers_street(&self, street: Street) -> bool {
        self.config.streets.get(street.index()).copied().unwrap_or(false)
    }

    /// a node at `street` with `last_bet_to < bucket_thresholds[st]` is
    /// bucketed; otherwise unabstracted (spec.md §4.5).
    pub fn is_bucketed(&self, street: Street, last_bet_to: Chips) -> bool {
        self.config
            .bucket_thresholds
            .get(street.index())
            .map(|&t| last_bet_to < t)
            .unwrap_or(true)
    }

    pub fn slab(&self, key: ValueKey) -> Option<&Slab> {
        self.slabs.get(&key)
    }

    pub fn slab_mut(&mut self, key: ValueKey) -> Option<&mut Slab> {
        self.slabs.get_mut(&key)
    }

    pub fn insert_slab(&mut self, key: ValueKey, slab: Slab) {
        self.slabs.insert(key, slab);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ValueKey, &Slab)> {
        self.slabs.iter()
    }

    /// `SetValues` (spec.md §4.5): overwrite a single node's slab wholesale.
    pub fn set_values(&mut self, key: ValueKey, values: Slab) -> Result<()> {
        if values.kind() != self.kind {
            return Err(Error::value(format!(
                "slab kind {:?} does not match store kind {:?}",
                values.kind(),
                self.kind
            )));
        }
        self.slabs.insert(key, values);
        Ok(())
    }

    /// `MergeInto` (spec.md §4.5): accumulate a freshly solved subgame back
    /// into this (presumably full-tree) store.
    ///
    /// - *Bucketed street:* `full[p,st,nt][a] += subgame[p,st,nt][a]`.
    /// - *Unabstracted street:* `subgame` is indexed by local boards;
    ///   `board_map(local_board) -> global_board` translates each row back.
    pub fn merge_into(
        &mut self,
        subgame: &CFRValues,
        final_street: Street,
        num_hole_card_pairs: u32,
        num_succs_of: impl Fn(ValueKey) -> u32,
        board_map: impl Fn(u32) -> u32,
    ) -> Result<()> {
        for (&key, sub_slab) in subgame.iter() {
            let (_player, street, _nt) = key;
            let num_succs = num_succs_of(key) as usize;
            if num_succs == 0 {
                continue;
            }
            // on the final (subgame) street, a board-indexed holding has
            // been rebased to local board indices by the subgame solve; the
            // translation back to the full tree's global boards is the
            // "unabstracted street" merge regime (spec.md §4.5).
            let existing_holdings = self.holdings_len(key);
            let is_unabstracted_merge = street == final_street
                && !self.is_bucketed(street, 0)
                && sub_slab.len() % num_succs == 0
                && existing_holdings.map(|h| (sub_slab.len() / num_succs) as u32 != h / num_succs as u32).unwrap_or(false);

            let full_slab = self
                .slabs
                .entry(key)
                .or_insert_with(|| Slab::zeroed(self.kind, existing_holdings.unwrap_or(0) as usize));

            if is_unabstracted_merge {
                let local_holdings = sub_slab.len() / num_succs;
                for local_bd in 0..local_holdings as u32 / num_hole_card_pairs.max(1) {
                    let global_bd = board_map(local_bd);
                    for hcp in 0..num_hole_card_pairs {
                        for s in 0..num_succs {
                            let local_idx = (local_bd * num_hole_card_pairs + hcp) as usize * num_succs + s;
                            let global_idx =
                                (global_bd * num_hole_card_pairs + hcp) as usize * num_succs + s;
                            if local_idx < sub_slab.len() && global_idx < full_slab.len() {
                                full_slab.add_f64(global_idx, sub_slab.get_f64(local_idx));
                            }
                        }
                    }
                }
            } else {
                for i in 0..sub_slab.len().min(full_slab.len()) {
                    full_slab.add_f64(i, sub_slab.get_f64(i));
                }
            }
        }
        Ok(())
    }

    fn holdings_len(&self, key: ValueKey) -> Option<u32> {
        self.slabs.get(&key).map(|s| s.len() as u32)
    }
}
