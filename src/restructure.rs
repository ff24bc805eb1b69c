//! The Restructurer (spec.md §4.9): an offline pass that reads trained
//! `double`/`int` regret or sumprob files and emits fixed-width quantized
//! files for [`crate::serve::CFRValuesFile`] to read at play time.
//!
//! Grounded on [`crate::tcfr::quantize`]'s table-driven style and on
//! [`crate::values::compress`]'s `byteorder::BE` I/O convention; this module
//! doesn't need a codec, only a one-shot encode per holding, so it writes
//! plain fixed-width bytes rather than going through the range coder.

use std::io::{BufReader, BufWriter, Read, Write};

use byteorder::{ReadBytesExt, BE};

use crate::error::{Error, Result};
use crate::values::Slab;

/// the three on-disk quantizations spec.md §4.9/§4.10 define, named to
/// match [`crate::serve`]'s `CFR_CHAR`/`CFR_HALF_BYTE`/`CFR_BITS` reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantization {
    /// one byte per (holding, succ) = `round(prob * 256)`, sum-corrected to
    /// exactly 255 (spec.md §4.9: trunk streets).
    Byte,
    /// the same idea packed two values per byte, sum-corrected to 15
    /// (spec.md §4.9: "On the turn (heads-up), half-byte encoding instead").
    HalfByte,
    /// 2 bits per holding encoding the argmin-regret successor, four
    /// holdings packed per byte (spec.md §4.9: subgame street).
    Bits,
}

/// `prob * scale`, summed and corrected so the encoded row sums to exactly
/// `scale - 1` (spec.md §4.9's "sum-correction": "add delta to the max-prob
/// succ; subtract from smallest until sum matches").
fn quantize_row(probs: &[f64], scale: u32) -> Vec<u32> {
    let target = scale - 1;
    let mut q: Vec<u32> = probs.iter().map(|&p| (p * scale as f64).round() as u32).collect();
    let mut sum: i64 = q.iter().map(|&v| v as i64).sum();

    while sum != target as i64 {
        if sum > target as i64 {
            let (idx, _) = q.iter().enumerate().filter(|&(_, &v)| v > 0).max_by_key(|&(_, &v)| v).unwrap_or((0, &0));
            q[idx] = q[idx].saturating_sub(1);
            sum -= 1;
        } else {
            let (idx, _) = q.iter().enumerate().max_by_key(|&(_, &v)| v).unwrap_or((0, &0));
            q[idx] += 1;
            sum += 1;
        }
    }
    q
}

/// regrets to probabilities via regret-matching: uniform if all regrets are
/// zero, else proportional to each successor's (non-negative) regret. Trunk
/// streets restructure *sumprobs* in practice (the average strategy), but
/// the same normalize-and-quantize path applies to either array; the caller
/// decides which file it read.
fn normalize(values: &[f64]) -> Vec<f64> {
    let sum: f64 = values.iter().sum();
    if sum <= 0.0 {
        let n = values.len().max(1);
        vec![1.0 / n as f64; values.len()]
    } else {
        values.iter().map(|&v| v / sum).collect()
    }
}

/// encode a single holding's row of `num_succs` values at the given
/// [`Quantization`], appending to `out`. For [`Quantization::HalfByte`] and
/// [`Quantization::Bits`], callers must supply rows two/four at a time via
/// [`pack_half_bytes`]/[`pack_bits`] — this function alone only handles the
/// one-value-per-byte case.
pub fn encode_byte_row(values: &[f64]) -> Vec<u8> {
    quantize_row(&normalize(values), 256)
        .into_iter()
        .map(|v| v.min(255) as u8)
        .collect()
}

/// half-byte trunk encoding (spec.md §4.9): sum-corrected to 15, two
/// holdings' worth of a single-successor-index-per-nibble packed per byte.
/// Here each holding still gets `num_succs` nibble-valued probabilities; the
/// packing below assumes `num_succs <= 2` is not required — nibbles are
/// packed consecutively across the whole row, high nibble first, matching
/// [`crate::serve::Quant::HalfByte`]'s `(h * num_succs) / 2` addressing with
/// parity selecting high/low.
pub fn encode_half_byte_row(values: &[f64]) -> Vec<u8> {
    let q = quantize_row(&normalize(values), 16);
    let mut out = Vec::with_capacity((q.len() + 1) / 2);
    let mut iter = q.into_iter();
    while let Some(hi) = iter.next() {
        let lo = iter.next().unwrap_or(0);
        out.push(((hi.min(15) as u8) << 4) | (lo.min(15) as u8));
    }
    out
}

/// `argmin` successor under regret-matching: the zero-regret action
/// (spec.md §4.9: "Best succ is defined as the argmin-regret (the
/// zero-regret succ under CFR)").
pub fn argmin_succ(regrets: &[f64]) -> u8 {
    regrets
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i as u8)
        .unwrap_or(0)
}

/// packs four buckets' best-succ indices (each `0..=3`) into one byte, high
/// bucket first (spec.md §8 scenario 6: `{best=0, best=3, best=1}` with an
/// implicit fourth `best=0` packs to `0b00_11_01_00 = 0xD0`).
pub fn pack_bits(best_succs: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity((best_succs.len() + 3) / 4);
    for chunk in best_succs.chunks(4) {
        let mut byte = 0u8;
        for (slot, &b) in chunk.iter().enumerate() {
            byte |= (b & 0b11) << (6 - 2 * slot);
        }
        out.push(byte);
    }
    out
}

/// reads a `num_holdings x num_succs` row-major array of `f64` and writes
/// the requested quantization to `writer`. `is_pure` selects [`pack_bits`]
/// over [`encode_byte_row`]/[`encode_half_byte_row`] regardless of
/// `quantization`, matching spec.md §4.9's "subgame street" rule: the
/// *street*, not the caller, decides whether 2-bit packing applies.
pub fn restructure_slab<W: Write>(
    slab: &Slab,
    num_holdings: usize,
    num_succs: usize,
    quantization: Quantization,
    writer: &mut W,
) -> Result<()> {
    if num_holdings * num_succs != slab.len() {
        return Err(Error::value(format!(
            "slab length {} does not match num_holdings({num_holdings}) * num_succs({num_succs})",
            slab.len()
        )));
    }
    match quantization {
        Quantization::Byte => {
            for h in 0..num_holdings {
                let row: Vec<f64> = (0..num_succs).map(|s| slab.get_f64(h * num_succs + s)).collect();
                writer.write_all(&encode_byte_row(&row))?;
            }
        }
        Quantization::HalfByte => {
            for h in 0..num_holdings {
                let row: Vec<f64> = (0..num_succs).map(|s| slab.get_f64(h * num_succs + s)).collect();
                writer.write_all(&encode_half_byte_row(&row))?;
            }
        }
        Quantization::Bits => {
            let best: Vec<u8> = (0..num_holdings)
                .map(|h| {
                    let row: Vec<f64> = (0..num_succs).map(|s| slab.get_f64(h * num_succs + s)).collect();
                    argmin_succ(&row)
                })
                .collect();
            writer.write_all(&pack_bits(&best))?;
        }
    }
    Ok(())
}

/// streams a trunk-street input file (plain `f64`/`i32` rows, as produced by
/// [`crate::values::io`]) into a byte- or half-byte-quantized output file,
/// one slab (nonterminal) at a time, without holding the whole tree's values
/// in memory — mirroring spec.md §4.9's description of a batch conversion
/// pass over already-written CFR value files.
pub fn restructure_trunk_file<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    num_holdings: usize,
    num_succs: usize,
    source_is_double: bool,
    half_byte: bool,
) -> Result<()> {
    let mut row = vec![0f64; num_succs];
    for _ in 0..num_holdings {
        for slot in row.iter_mut() {
            *slot = if source_is_double { reader.read_f64::<BE>()? } else { f64::from(reader.read_i32::<BE>()?) };
        }
        let bytes = if half_byte { encode_half_byte_row(&row) } else { encode_byte_row(&row) };
        writer.write_all(&bytes)?;
    }
    Ok(())
}

/// streams a subgame-street input file into the 2-bit packed format.
pub fn restructure_subgame_file<R: Read, W: Write>(
    reader: &mut R,
    num_holdings: usize,
    num_succs: usize,
    source_is_double: bool,
) -> Result<Vec<u8>> {
    let mut best = Vec::with_capacity(num_holdings);
    let mut row = vec![0f64; num_succs];
    for _ in 0..num_holdings {
        for slot in row.iter_mut() {
            *slot = if source_is_double { reader.read_f64::<BE>()? } else { f64::from(reader.read_i32::<BE>()?) };
        }
        best.push(argmin_succ(&row));
    }
    let packed = pack_bits(&best);
    Ok(packed)
}

/// convenience wrapper: reads a whole trunk file path and writes the
/// quantized sibling, opening both with buffered I/O the way the teacher's
/// `save::disk` helpers do.
pub fn restructure_trunk_path(
    src_path: &str,
    dst_path: &str,
    num_holdings: usize,
    num_succs: usize,
    source_is_double: bool,
    half_byte: bool,
) -> Result<()> {
    let mut reader = BufReader::new(std::fs::File::open(src_path)?);
    let mut writer = BufWriter::new(std::fs::File::create(dst_path)?);
    restructure_trunk_file(&mut reader, &mut writer, num_holdings, num_succs, source_is_double, half_byte)?;
    writer.flush()?;
    Ok(())
}

pub fn restructure_subgame_path(
    src_path: &str,
    dst_path: &str,
    num_holdings: usize,
    num_succs: usize,
    source_is_double: bool,
) -> Result<()> {
    let mut reader = BufReader::new(std::fs::File::open(src_path)?);
    let packed = restructure_subgame_file(&mut reader, num_holdings, num_succs, source_is_double)?;
    let mut writer = BufWriter::new(std::fs::File::create(dst_path)?);
    writer.write_all(&packed)?;
    writer.flush()?;
    Ok(())
}
