//! The compressed regret-delta codec (spec.md §4.6): "Given two equally
//! sized arrays of 32-bit residuals (ZigZag-encoded signed deltas, one
//! computed against the West predictor and one against the Paeth
//! predictor), encode the cheaper one per block and flip a one-bit
//! predictor flag per block. Two independent 2-bit-wide adaptive contexts
//! (zero-context, block-context) steer coding of a 256-entry distribution
//! over values 0..1023; values outside that range fall back to a two-stage
//! large-value encoder. The decoder mirrors the encoder's context state
//! exactly."
//!
//! The zero-context and block-context states are combined into a 4-bit
//! index (16 states) that selects one of 16 [`tree::OptimalBinaryTree`]s,
//! each trained on its own 256-entry distribution — this is what makes the
//! contexts actually "steer coding" rather than merely being tracked
//! alongside a single static tree.
//!
//! Grounded on the teacher's `byteorder::BE` stream convention
//! (`examples/krukah-robopoker/src/save/disk.rs`) for the fixed-width
//! framing (magic, distribution tables), composed with a purpose-built
//! bit-level reader/writer ([`bits`]) for the variable-length codes
//! themselves, since the teacher never needs sub-byte framing.

pub mod bits;
pub mod context;
pub mod tree;

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, BE};

use crate::error::{Error, Result};
use bits::{BitReader, BitWriter};
use context::{zigzag_decode, zigzag_encode, BlockContext, Predictor, ZeroContext, BLOCK_SIZE};
use tree::OptimalBinaryTree;

const MAGIC: &[u8; 4] = b"Cmpr";
const NUM_SYMBOLS: usize = 256;
/// one tree per combination of the zero-context's 2-bit state and the
/// block-context's 2-bit state (spec.md §4.6's "two independent 2-bit-wide
/// adaptive contexts").
const NUM_CONTEXTS: usize = 16;
/// bucket 255 is reserved as the escape marker into the two-stage
/// large-value path; buckets 0..254 each cover four consecutive zigzag
/// values (0..1019), so `0..NUM_SYMBOLS-1` covers the "high-frequency value
/// range" spec.md §4.6 calls out.
const ESCAPE_BUCKET: u8 = 255;
const BUCKET_WIDTH: u64 = 4;
const ESCAPE_THRESHOLD: u64 = (ESCAPE_BUCKET as u64) * BUCKET_WIDTH;
const ESCAPE_HI_BITS: u8 = 17;
const ESCAPE_LO_BITS: u8 = 16;

fn bucket_of(zigzag: u64) -> (u8, Option<u32>) {
    if zigzag >= ESCAPE_THRESHOLD {
        (ESCAPE_BUCKET, None)
    } else {
        ((zigzag / BUCKET_WIDTH) as u8, Some((zigzag % BUCKET_WIDTH) as u32))
    }
}

/// combines the zero-context's and block-context's 2-bit states into one
/// 4-bit index into the 16 per-context trees/distributions.
fn combined_state(zero_state: u8, block_state: u8) -> usize {
    ((zero_state as usize) << 2) | (block_state as usize)
}

/// builds the 16 context-keyed 256-entry frequency tables the trees are
/// trained on, from the residuals that will actually be compressed. This
/// replays the exact same zero-context/block-context evolution the encode
/// loop in [`compress`] uses, so a symbol seen under context state `c`
/// during training lands in `distributions[c]`. Both encoder and decoder
/// must build/ship the identical tables: the encoder counts them and
/// writes them verbatim; the decoder only ever reads them back (spec.md
/// §4.6: "the decoder rebuilds the identical tree from the shipped
/// distribution").
pub fn build_distribution(residuals: &[i64]) -> [[i64; NUM_SYMBOLS]; NUM_CONTEXTS] {
    let mut distributions = [[0i64; NUM_SYMBOLS]; NUM_CONTEXTS];
    let mut zero_ctx = ZeroContext::default();
    let mut block_ctx = BlockContext::default();
    for block in residuals.chunks(BLOCK_SIZE) {
        let block_state = block_ctx.state();
        let mut any_non_zero = false;
        for &r in block {
            let zigzag = zigzag_encode(r);
            let (bucket, _) = bucket_of(zigzag);
            let ctx = combined_state(zero_ctx.state(), block_state);
            distributions[ctx][bucket as usize] += 1;
            let non_zero = zigzag != 0;
            zero_ctx.push(non_zero);
            any_non_zero |= non_zero;
        }
        block_ctx.push(any_non_zero);
    }
    distributions
}

fn build_trees(distributions: &[[i64; NUM_SYMBOLS]; NUM_CONTEXTS]) -> Result<Vec<OptimalBinaryTree>> {
    distributions.iter().map(OptimalBinaryTree::build).collect()
}

fn encoded_cost(residuals: &[i64], tree: &OptimalBinaryTree) -> u64 {
    residuals
        .iter()
        .map(|&r| {
            let (bucket, remainder) = bucket_of(zigzag_encode(r));
            let (_, len) = tree.code_for(bucket);
            len as u64
                + match remainder {
                    Some(_) => 2,
                    None => u64::from(ESCAPE_HI_BITS) + u64::from(ESCAPE_LO_BITS),
                }
        })
        .sum()
}

/// Compresses `west` or `paeth`, choosing per block whichever is cheaper
/// (spec.md §4.6's "Predictor bit per block"), writing the format: magic,
/// 16 context-keyed 256-entry distributions, symbol count, then the
/// bitstream (one predictor bit followed by that block's coded symbols,
/// repeated per block).
///
/// The predictor choice for a block is estimated under the single tree
/// selected by the zero-/block-context state as of that block's start
/// (the cheaper of the two candidate slices under that tree); the actual
/// symbols are then coded with the full per-symbol context-selected tree,
/// which can differ slightly from the estimate since the zero-context
/// advances within the block.
pub fn compress<W: Write>(
    writer: &mut W,
    west: &[i64],
    paeth: &[i64],
    distributions: &[[i64; NUM_SYMBOLS]; NUM_CONTEXTS],
) -> Result<()> {
    if west.len() != paeth.len() {
        return Err(Error::value("west and paeth residual arrays must be equally sized".to_string()));
    }
    let trees = build_trees(distributions)?;

    writer.write_all(MAGIC)?;
    for distribution in distributions {
        for &count in distribution {
            writer.write_i64::<BE>(count)?;
        }
    }
    writer.write_u32::<BE>(west.len() as u32)?;

    let mut bw = BitWriter::new(&mut *writer);
    let mut zero_ctx = ZeroContext::default();
    let mut block_ctx = BlockContext::default();
    for (west_block, paeth_block) in west.chunks(BLOCK_SIZE).zip(paeth.chunks(BLOCK_SIZE)) {
        let block_state = block_ctx.state();
        let estimator = &trees[combined_state(zero_ctx.state(), block_state)];
        let predictor = Predictor::better_of(encoded_cost(west_block, estimator), encoded_cost(paeth_block, estimator));
        bw.write_bit(predictor == Predictor::Paeth)?;

        let block = match predictor {
            Predictor::West => west_block,
            Predictor::Paeth => paeth_block,
        };
        let mut any_non_zero = false;
        for &r in block {
            let zigzag = zigzag_encode(r);
            let tree = &trees[combined_state(zero_ctx.state(), block_state)];
            let (bucket, remainder) = bucket_of(zigzag);
            let (code, len) = tree.code_for(bucket);
            bw.write_bits(code, len)?;
            match remainder {
                Some(rem) => bw.write_bits(rem, 2)?,
                None => {
                    bw.write_bits((zigzag >> ESCAPE_LO_BITS) as u32, ESCAPE_HI_BITS)?;
                    bw.write_bits((zigzag & ((1 << ESCAPE_LO_BITS) - 1)) as u32, ESCAPE_LO_BITS)?;
                }
            }
            let non_zero = zigzag != 0;
            zero_ctx.push(non_zero);
            any_non_zero |= non_zero;
        }
        block_ctx.push(any_non_zero);
    }
    bw.finish()?;
    Ok(())
}

/// Decompresses a stream written by [`compress`], returning the residual
/// array (still ZigZag-decoded to signed values) alongside the predictor
/// that decoded each one — the caller reconstructs actual values via
/// `predictor.predict(west, north, north_west)` against its own
/// neighboring slabs, since the residual stream alone doesn't carry board
/// adjacency. The predictor can vary block to block, so this is returned
/// per residual rather than once for the whole stream.
pub fn decompress<R: Read>(reader: &mut R) -> Result<(Vec<i64>, Vec<Predictor>)> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::value("bad compressed-stream magic".to_string()));
    }
    let mut distributions = [[0i64; NUM_SYMBOLS]; NUM_CONTEXTS];
    for distribution in distributions.iter_mut() {
        for slot in distribution.iter_mut() {
            *slot = reader.read_i64::<BE>()?;
        }
    }
    let len = reader.read_u32::<BE>()? as usize;
    let trees = build_trees(&distributions)?;

    let mut br = BitReader::new(reader);
    let mut zero_ctx = ZeroContext::default();
    let mut block_ctx = BlockContext::default();
    let mut residuals = Vec::with_capacity(len);
    let mut predictors = Vec::with_capacity(len);
    let mut produced = 0usize;
    while produced < len {
        let block_state = block_ctx.state();
        let predictor = if br.read_bit()? { Predictor::Paeth } else { Predictor::West };
        let mut any_non_zero = false;
        let this_block = BLOCK_SIZE.min(len - produced);
        for _ in 0..this_block {
            let tree = &trees[combined_state(zero_ctx.state(), block_state)];
            let bucket = tree.decode_symbol(|| br.read_bit())?;
            let zigzag = if bucket == ESCAPE_BUCKET {
                let hi = br.read_bits(ESCAPE_HI_BITS)? as u64;
                let lo = br.read_bits(ESCAPE_LO_BITS)? as u64;
                (hi << ESCAPE_LO_BITS) | lo
            } else {
                let remainder = br.read_bits(2)? as u64;
                bucket as u64 * BUCKET_WIDTH + remainder
            };
            let non_zero = zigzag != 0;
            zero_ctx.push(non_zero);
            any_non_zero |= non_zero;
            residuals.push(zigzag_decode(zigzag));
            predictors.push(predictor);
            produced += 1;
        }
        block_ctx.push(any_non_zero);
    }
    Ok((residuals, predictors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_small_residuals_through_the_context_keyed_trees() {
        let west: Vec<i64> = (0..40).map(|i| (i % 7) - 3).collect();
        let paeth: Vec<i64> = west.iter().map(|&v| v * 2).collect();
        let mut training = west.clone();
        training.extend(&paeth);
        let distribution = build_distribution(&training);

        let mut buf = Vec::new();
        compress(&mut buf, &west, &paeth, &distribution).unwrap();
        let (decoded, predictors) = decompress(&mut &buf[..]).unwrap();
        assert_eq!(decoded.len(), west.len());
        assert_eq!(predictors.len(), west.len());
        // each value must match whichever of west/paeth was picked for its block.
        for (i, &v) in decoded.iter().enumerate() {
            let expected = match predictors[i] {
                Predictor::West => west[i],
                Predictor::Paeth => paeth[i],
            };
            assert_eq!(v, expected);
        }
    }

    #[test]
    fn escape_path_round_trips_large_residuals() {
        let west = vec![1_000_000i64, -1_000_000, 0, 5];
        let paeth = west.clone();
        let distribution = build_distribution(&west);

        let mut buf = Vec::new();
        compress(&mut buf, &west, &paeth, &distribution).unwrap();
        let (decoded, _predictors) = decompress(&mut &buf[..]).unwrap();
        assert_eq!(decoded, west);
    }

    #[test]
    fn predictor_can_differ_across_blocks() {
        // first block: west is all zero (cheap), paeth is large (expensive) ->
        // the encoder should pick West there. Second block: the reverse.
        let mut west = vec![0i64; BLOCK_SIZE];
        let mut paeth = vec![500_000i64; BLOCK_SIZE];
        west.extend(vec![500_000i64; BLOCK_SIZE]);
        paeth.extend(vec![0i64; BLOCK_SIZE]);
        let mut training = west.clone();
        training.extend(&paeth);
        let distribution = build_distribution(&training);

        let mut buf = Vec::new();
        compress(&mut buf, &west, &paeth, &distribution).unwrap();
        let (decoded, predictors) = decompress(&mut &buf[..]).unwrap();

        assert_eq!(predictors[0], Predictor::West);
        assert_eq!(predictors[BLOCK_SIZE], Predictor::Paeth);
        assert_eq!(decoded[0], west[0]);
        assert_eq!(decoded[BLOCK_SIZE], paeth[BLOCK_SIZE]);
    }

    #[test]
    fn rejects_mismatched_array_lengths() {
        let distribution = [[0i64; NUM_SYMBOLS]; NUM_CONTEXTS];
        let mut buf = Vec::new();
        let err = compress(&mut buf, &[1, 2], &[1], &distribution);
        assert!(err.is_err());
    }
}
