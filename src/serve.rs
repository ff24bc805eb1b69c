//! `CFRValuesFile` (spec.md §4.10): the play-time random-access strategy
//! reader over files the [`crate::restructure`] pass produced.
//!
//! Grounded on the teacher's `save::disk` file-handle convention
//! (`examples/krukah-robopoker/src/save/disk.rs`'s `byteorder::BE` reads);
//! we address the file with `std::os::unix::fs::FileExt::read_at` at
//! precomputed offsets rather than pulling in `memmap2` (no example repo in
//! this pack depends on it — see DESIGN.md), which gives the same
//! random-access contract spec.md §4.10 asks for without a new dependency.

use std::collections::HashMap;
use std::os::unix::fs::FileExt;

use crate::error::{Error, Result};
use crate::street::Street;

/// the four on-disk encodings spec.md §4.10 names, unified with
/// [`crate::restructure::Quantization`]'s `Byte`/`HalfByte`/`Bits` plus the
/// two untouched widths `CFR_INT`/`CFR_DOUBLE` a restructure pass may leave
/// in place for streets it didn't quantize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quant {
    Char,
    HalfByte,
    Bits,
    Int,
    Double,
}

/// per-(player, street) layout: byte offset of nonterminal 0's row within
/// that street's file, the quantization in effect, and `num_succs` per
/// nonterminal (needed to compute later nonterminals' offsets for
/// `Char`/`Int`/`Double`; `HalfByte`/`Bits` only need a running holding
/// count, tracked separately in `StreetFile`).
struct StreetFile {
    file: std::fs::File,
    quant: Quant,
    /// `num_succs` per nonterminal id, in order — needed to walk forward to
    /// nonterminal `nt`'s offset since rows aren't fixed-width across a
    /// whole street in the general case (different nonterminals can carry
    /// different `num_succs`).
    num_succs: Vec<u32>,
    /// cumulative holdings *before* nonterminal `nt`, i.e.
    /// `cum_holdings[nt]`, used by all four quantizations to locate a row.
    cum_holdings: Vec<u64>,
    num_holdings: Vec<u32>,
    total_bytes: u64,
}

/// a located row: byte offset into the street file, the quantization, and
/// (for `Char`) how many successors that row holds; `global_h` is the
/// running holding index across the whole street file (needed by
/// `HalfByte`'s nibble-parity selection).
struct Located {
    offset: u64,
    quant: Quant,
    global_h: u64,
}

impl StreetFile {
    fn offset_of(&self, nt: u32, h: u32) -> Result<Located> {
        let nt = nt as usize;
        let base_holdings = *self
            .cum_holdings
            .get(nt)
            .ok_or_else(|| Error::value(format!("nonterminal {nt} out of range for this street file")))?;
        let holdings = self.num_holdings[nt];
        if h >= holdings {
            return Err(Error::value(format!("holding {h} out of range (have {holdings})")));
        }
        let global_h = base_holdings + h as u64;
        let num_succs = self.num_succs[nt];
        let offset = match self.quant {
            Quant::Char => global_h * num_succs as u64,
            Quant::Int => global_h * num_succs as u64 * 4,
            Quant::Double => global_h * num_succs as u64 * 8,
            // spec.md §4.10: `offset += (h * num_succs) / 2; bit selection
            // by parity` — here "h" means the *global* running holding
            // index across the whole street file, same as the other kinds.
            Quant::HalfByte => (global_h * num_succs as u64) / 2,
            // spec.md §4.10: `offset += h / 4; shift by 6 - 2*(h % 4)`.
            Quant::Bits => global_h / 4,
        };
        Ok(Located { offset, quant: self.quant, global_h })
    }
}

/// `CFRValuesFile`: one instance per trained abstraction, holding an open
/// file handle and precomputed offset table per (player, street).
pub struct CFRValuesFile {
    streets: HashMap<(u8, Street), StreetFile>,
}

impl CFRValuesFile {
    /// opens `dir`'s restructured files for every `(player, street)` this
    /// abstraction covers. `layout` gives, per (player, street), the ordered
    /// `(nonterminal_id, num_succs, num_holdings)` triples in the same
    /// preorder the restructurer wrote them in — callers obtain this from
    /// the betting tree, not from the value file itself (the file carries
    /// no self-describing header beyond its raw bytes).
    pub fn open(
        dir: &str,
        action_seq: &str,
        players: &[u8],
        streets: &[Street],
        quant_of: impl Fn(u8, Street) -> Quant,
        layout_of: impl Fn(u8, Street) -> Vec<(u32, u32, u32)>,
    ) -> Result<Self> {
        let mut streets_map = HashMap::new();
        for &player in players {
            for &street in streets {
                let quant = quant_of(player, street);
                let layout = layout_of(player, street);
                let path = format!("{dir}/{}", Self::filename(action_seq, street, player, quant));
                let file = std::fs::File::open(&path)?;

                let mut num_succs = vec![0u32; layout.len()];
                let mut num_holdings = vec![0u32; layout.len()];
                let mut cum_holdings = Vec::with_capacity(layout.len());
                let mut running = 0u64;
                for &(nt, succs, holdings) in &layout {
                    let nt = nt as usize;
                    if nt >= num_succs.len() {
                        return Err(Error::value("layout nonterminal id out of dense range".to_string()));
                    }
                    num_succs[nt] = succs;
                    num_holdings[nt] = holdings;
                    cum_holdings.push(running);
                    running += holdings as u64;
                }

                let total_bytes = Self::expected_size(quant, &num_succs, &num_holdings);
                let actual = file.metadata()?.len();
                if actual != total_bytes {
                    return Err(Error::value(format!(
                        "file size mismatch for {path}: expected {total_bytes}, found {actual}"
                    )));
                }

                streets_map.insert(
                    (player, street),
                    StreetFile { file, quant, num_succs, cum_holdings, num_holdings, total_bytes },
                );
            }
        }
        Ok(Self { streets: streets_map })
    }

    fn filename(action_seq: &str, street: Street, player: u8, quant: Quant) -> String {
        let suffix = match quant {
            Quant::Char => "c",
            Quant::HalfByte => "h",
            Quant::Bits => "b",
            Quant::Int => "i",
            Quant::Double => "d",
        };
        format!("strategy.{action_seq}.{}.p{player}.{suffix}", street.index())
    }

    /// spec.md §4.10: "Total file size per (player, street) is
    /// deterministic and must match the accumulated offsets at
    /// initialization; mismatch is fatal."
    fn expected_size(quant: Quant, num_succs: &[u32], num_holdings: &[u32]) -> u64 {
        match quant {
            Quant::Bits => {
                let total_holdings: u64 = num_holdings.iter().map(|&h| h as u64).sum();
                (total_holdings + 3) / 4
            }
            Quant::HalfByte => {
                let total_nibbles: u64 =
                    num_succs.iter().zip(num_holdings).map(|(&s, &h)| s as u64 * h as u64).sum();
                (total_nibbles + 1) / 2
            }
            Quant::Char => num_succs.iter().zip(num_holdings).map(|(&s, &h)| s as u64 * h as u64).sum(),
            Quant::Int => 4 * num_succs.iter().zip(num_holdings).map(|(&s, &h)| s as u64 * h as u64).sum::<u64>(),
            Quant::Double => 8 * num_succs.iter().zip(num_holdings).map(|(&s, &h)| s as u64 * h as u64).sum::<u64>(),
        }
    }

    /// `Probs(p, st, nt, h, num_succs, dsi)` (spec.md §4.10): reads the raw
    /// values for holding `h` at nonterminal `nt`, normalizes to a simplex,
    /// falling back to a one-hot at `dsi` ("default succ index") when every
    /// underlying count is zero. For [`Quant::Bits`] ("pure" strategies),
    /// returns a one-hot at the encoded best succ directly.
    pub fn probs(&self, player: u8, street: Street, nt: u32, h: u32, num_succs: u32, dsi: u32) -> Result<Vec<f32>> {
        let street_file = self
            .streets
            .get(&(player, street))
            .ok_or_else(|| Error::value(format!("no strategy file open for player {player}, street {street:?}")))?;
        let located = street_file.offset_of(nt, h)?;

        match located.quant {
            Quant::Bits => {
                let mut byte = [0u8; 1];
                street_file.file.read_exact_at(&mut byte, located.offset)?;
                let shift = 6 - 2 * (located.global_h % 4);
                let best = (byte[0] >> shift) & 0b11;
                Ok(one_hot(num_succs, best as u32))
            }
            Quant::HalfByte => {
                // spec.md §4.10: "bit selection by parity" — `num_succs`
                // nibbles for this holding start at `located.offset`; the
                // parity of `global_h * num_succs` selects whether the first
                // one is the high or low half of that byte.
                let first_high = (located.global_h * num_succs as u64) % 2 == 0;
                let raw = read_nibbles(street_file, located.offset, first_high, num_succs as usize)?;
                Ok(normalize_or_one_hot(&raw.iter().map(|&v| v as f64).collect::<Vec<_>>(), dsi, num_succs))
            }
            Quant::Char => {
                let mut buf = vec![0u8; num_succs as usize];
                street_file.file.read_exact_at(&mut buf, located.offset)?;
                let raw: Vec<f64> = buf.iter().map(|&v| v as f64).collect();
                Ok(normalize_or_one_hot(&raw, dsi, num_succs))
            }
            Quant::Int => {
                let mut buf = vec![0u8; num_succs as usize * 4];
                street_file.file.read_exact_at(&mut buf, located.offset)?;
                let raw: Vec<f64> =
                    buf.chunks_exact(4).map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64).collect();
                Ok(normalize_or_one_hot(&raw, dsi, num_succs))
            }
            Quant::Double => {
                let mut buf = vec![0u8; num_succs as usize * 8];
                street_file.file.read_exact_at(&mut buf, located.offset)?;
                let raw: Vec<f64> = buf
                    .chunks_exact(8)
                    .map(|c| f64::from_be_bytes(c.try_into().expect("8-byte chunk")))
                    .collect();
                Ok(normalize_or_one_hot(&raw, dsi, num_succs))
            }
        }
    }

    pub fn total_bytes(&self, player: u8, street: Street) -> Option<u64> {
        self.streets.get(&(player, street)).map(|s| s.total_bytes)
    }
}

fn one_hot(num_succs: u32, chosen: u32) -> Vec<f32> {
    (0..num_succs).map(|s| if s == chosen { 1.0 } else { 0.0 }).collect()
}

fn normalize_or_one_hot(raw: &[f64], dsi: u32, num_succs: u32) -> Vec<f32> {
    let sum: f64 = raw.iter().sum();
    if sum > 0.0 {
        raw.iter().map(|&v| (v / sum) as f32).collect()
    } else {
        one_hot(num_succs, dsi)
    }
}

/// reads `count` consecutive nibbles starting at byte `offset`, `first_high`
/// selecting whether the first nibble is the high or low half of that byte.
fn read_nibbles(street_file: &StreetFile, offset: u64, first_high: bool, count: usize) -> Result<Vec<u8>> {
    let leading_half_nibbles = if first_high { 0 } else { 1 };
    let bytes_needed = (count + leading_half_nibbles).div_ceil(2);
    let mut buf = vec![0u8; bytes_needed.max(1)];
    let available = street_file.total_bytes.saturating_sub(offset).min(buf.len() as u64) as usize;
    street_file.file.read_exact_at(&mut buf[..available], offset)?;

    let mut out = Vec::with_capacity(count);
    let mut high = first_high;
    let mut byte_idx = 0usize;
    for _ in 0..count {
        let byte = buf[byte_idx];
        let nibble = if high { byte >> 4 } else { byte & 0x0F };
        out.push(nibble);
        if !high {
            byte_idx += 1;
        }
        high = !high;
    }
    Ok(out)
}
