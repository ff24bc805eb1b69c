//! `Process()`: the TCFR hot-path recursion (spec.md §4.7, §5: "A single
//! recursive traversal reads each node as a packed byte stream... sampled,
//! pruned, and its regret deltas compressed through a quantization table
//! when the street calls for it.").
//!
//! Grounded directly on the original solver's `TCFRThread::Process` (ported
//! algorithm, not ported code — every card-level concern it used to pull
//! from `BoardTree`/`HandValueTree` now arrives pre-resolved through
//! [`crate::collab::Deal`], per spec.md §1's "no symbolic card reasoning in
//! the core"). The regret-matching/exploration/sumprob-ceiling shape
//! mirrors the teacher's own `mccfr::regret`/`mccfr::profile` update step
//! (`examples/krukah-robopoker/src/mccfr/regret.rs`), generalized to the
//! arena's in-place quantized storage instead of a `BTreeMap<Bucket, f32>`.

use rand::Rng;

use crate::collab::Deal;
use crate::error::Result;
use crate::street::Street;
use crate::tcfr::arena::{Arena, NodeOffset, RegretWidth, NO_FOLD_SUCC, TAG_P0_ACTS, TAG_P0_FOLDED, TAG_P1_ACTS, TAG_P1_FOLDED, TAG_SHOWDOWN};
use crate::tcfr::quantize::QuantizeTable;
use crate::REGRET_CAP;

/// per-street solver configuration (spec.md §4.7's per-street toggles:
/// quantization width, whether sumprobs are tracked, whether this street
/// always does a full recursion rather than sampling).
#[derive(Debug, Clone)]
pub struct TcfrConfig {
    pub max_street: Street,
    /// byte-quantized streets (`quantized_streets_`).
    pub quantized_streets: [bool; 4],
    /// short (16-bit) quantized streets; takes precedence over byte
    /// quantization when both would otherwise apply to a street.
    pub short_quantized_streets: [bool; 4],
    /// streets whose regret increments get stochastically rounded to a
    /// coarser grid before accumulation (`scaled_streets_`).
    pub scaled_streets: [bool; 4],
    /// streets that track sumprobs at all.
    pub sumprob_streets: [bool; 4],
    /// streets that always recurse into every successor rather than
    /// sampling (`full_[st]`).
    pub full_streets: [bool; 4],
    pub asymmetric: bool,
    pub target_player: u8,
    /// sumprob updates happen only on full iterations when this is set
    /// (`full_only_avg_update_`).
    pub full_only_avg_update: bool,
    /// force every street to recurse fully, ignoring `full_streets`.
    pub always_full: bool,
    /// if `min_r2 - min_r` (second-lowest minus lowest regret) is below
    /// this, the node recurses on every successor even off the full
    /// schedule — the two actions are too close to resolve with a sample.
    pub close_threshold: i64,
    /// successors whose current regret is at or above this are skipped
    /// during a full recursion (never the fold successor).
    pub pruning_threshold: i64,
    /// probability of ignoring the regret-matching/argmin pick and
    /// sampling uniformly instead (`explore_`).
    pub explore: f64,
    pub sumprob_ceiling: u32,
    pub regret_cap: i64,
}

impl TcfrConfig {
    /// a config with every street at full-precision `i32` regrets, no
    /// quantization, no sampling shortcuts — useful as a baseline/testing
    /// configuration and as the starting point callers narrow from.
    pub fn unquantized(max_street: Street) -> Self {
        Self {
            max_street,
            quantized_streets: [false; 4],
            short_quantized_streets: [false; 4],
            scaled_streets: [false; 4],
            sumprob_streets: [true; 4],
            full_streets: [true; 4],
            asymmetric: false,
            target_player: 0,
            full_only_avg_update: false,
            always_full: true,
            close_threshold: 0,
            pruning_threshold: i64::MAX,
            explore: 0.0,
            sumprob_ceiling: crate::SUMPROB_CEILING_DEFAULT,
            regret_cap: REGRET_CAP,
        }
    }

    pub fn regret_width(&self, street: Street) -> RegretWidth {
        let i = street.index();
        if self.short_quantized_streets[i] {
            RegretWidth::Short
        } else if self.quantized_streets[i] {
            RegretWidth::Byte
        } else {
            RegretWidth::Int
        }
    }

    /// whether `acting_player`'s sumprobs are stored at all at `street`
    /// (spec.md §4.7: `sumprob_streets[st] && (!asymmetric || target_player == acting_player)`).
    pub fn has_sumprob(&self, street: Street, acting_player: u8) -> bool {
        self.sumprob_streets[street.index()] && (!self.asymmetric || self.target_player == acting_player)
    }

    fn is_quantized(&self, street: Street) -> bool {
        let i = street.index();
        self.quantized_streets[i] || self.short_quantized_streets[i]
    }
}

/// the two logarithmic tables the quantized widths look values up through
/// (spec.md §4.7): one per width, shared across all quantized streets and
/// nodes since the curve only depends on the regret cap.
pub struct QuantizeTables {
    pub char_table: QuantizeTable,
    pub short_table: QuantizeTable,
}

impl QuantizeTables {
    pub fn new(max_value: i64) -> Self {
        Self { char_table: QuantizeTable::char_table(max_value), short_table: QuantizeTable::short_table(max_value) }
    }
}

/// everything `process` needs that doesn't change across one traversal:
/// the sampled hand, which player's regrets this call is updating, and
/// whether this is a "full" iteration (gates sumprob updates under
/// `full_only_avg_update`).
pub struct ProcessContext<'a> {
    pub config: &'a TcfrConfig,
    pub quantize: &'a QuantizeTables,
    /// number of distinct buckets allocated at each street index, needed to
    /// locate the sumprob slab past the regret slab.
    pub num_buckets: &'a [u32; 4],
    pub deal: &'a Deal,
    /// `p1_phase_`: the perspective this traversal accumulates regret for.
    pub perspective_player: u8,
    pub is_full_iteration: bool,
}

impl<'a> ProcessContext<'a> {
    fn bucket_for(&self, acting_player: u8, street: Street) -> u32 {
        let buckets = if acting_player == 0 { &self.deal.p0_buckets } else { &self.deal.p1_buckets };
        buckets[street.index()]
    }
}

/// `TCFRThread::Process`: evaluate the subtree at `offset`, updating
/// regrets for `ctx.perspective_player` in place, and returns that
/// player's expected utility in pot-fraction units (spec.md §4.7).
pub fn process(arena: &mut Arena, offset: NodeOffset, ctx: &ProcessContext, rng: &mut impl Rng) -> Result<f64> {
    let tag = arena.tag(offset)?;
    if tag == TAG_SHOWDOWN {
        let half_pot = arena.half_pot(offset)? as f64;
        let mult = if ctx.perspective_player == 0 { ctx.deal.showdown_mult as f64 } else { -(ctx.deal.showdown_mult as f64) };
        return Ok(mult * ctx.deal.board_count as f64 * half_pot);
    }
    if tag == TAG_P1_FOLDED || tag == TAG_P0_FOLDED {
        let half_pot = arena.half_pot(offset)? as f64;
        let folded_player = if tag == TAG_P1_FOLDED { 1 } else { 0 };
        let we_fold = folded_player == ctx.perspective_player;
        let sign = if we_fold { -1.0 } else { 1.0 };
        return Ok(sign * ctx.deal.board_count as f64 * half_pot);
    }

    let street = arena.street(offset)?;
    let acting_player = if tag == TAG_P1_ACTS { 1u8 } else { 0u8 };
    let num_succs = arena.num_succs(offset)?;
    let fold_succ = arena.fold_succ_index(offset)?;
    let width = ctx.config.regret_width(street);
    let num_buckets = ctx.num_buckets[street.index()];
    let bucket = ctx.bucket_for(acting_player, street);

    if acting_player == ctx.perspective_player {
        process_our_turn(arena, offset, ctx, rng, street, num_succs, fold_succ, width, num_buckets, bucket)
    } else {
        process_opponent_turn(arena, offset, ctx, rng, street, num_succs, width, num_buckets, bucket, acting_player)
    }
}

fn uncompress(ctx: &ProcessContext, street: Street, code: i64) -> i64 {
    let i = street.index();
    if ctx.config.short_quantized_streets[i] {
        ctx.quantize.short_table.uncompress(code as u32)
    } else if ctx.config.quantized_streets[i] {
        ctx.quantize.char_table.uncompress(code as u32)
    } else {
        code
    }
}

fn compress(ctx: &ProcessContext, street: Street, value: i64, rng: &mut impl Rng) -> i64 {
    let i = street.index();
    if ctx.config.short_quantized_streets[i] {
        ctx.quantize.short_table.compress(value, rng) as i64
    } else if ctx.config.quantized_streets[i] {
        ctx.quantize.char_table.compress(value, rng) as i64
    } else {
        value.clamp(0, ctx.config.regret_cap)
    }
}

#[allow(clippy::too_many_arguments)]
fn process_our_turn(
    arena: &mut Arena,
    offset: NodeOffset,
    ctx: &ProcessContext,
    rng: &mut impl Rng,
    street: Street,
    num_succs: u8,
    fold_succ: Option<u8>,
    width: RegretWidth,
    num_buckets: u32,
    bucket: u32,
) -> Result<f64> {
    let mut stored = Vec::with_capacity(num_succs as usize);
    for s in 0..num_succs {
        stored.push(arena.regret(offset, bucket, s, width, num_succs)?);
    }
    let expanded: Vec<i64> = stored.iter().map(|&c| uncompress(ctx, street, c)).collect();

    let mut order: Vec<u8> = (0..num_succs).collect();
    order.sort_by_key(|&s| expanded[s as usize]);
    let min_s = order[0];
    let min_r = expanded[min_s as usize];
    let min_r2 = if num_succs > 1 { expanded[order[1] as usize] } else { min_r };

    let recurse_on_all =
        ctx.config.always_full || ctx.config.full_streets[street.index()] || (min_r2 - min_r < ctx.config.close_threshold);

    if !recurse_on_all {
        let chosen = if rng.random_bool(ctx.config.explore) { rng.random_range(0..num_succs) } else { min_s };
        let succ_offset = arena.succ_offset(offset, chosen)?;
        return process(arena, succ_offset, ctx, rng);
    }

    let mut values: Vec<Option<f64>> = vec![None; num_succs as usize];
    for s in 0..num_succs {
        let is_fold = fold_succ == Some(s);
        if !is_fold && expanded[s as usize] >= ctx.config.pruning_threshold {
            continue;
        }
        let succ_offset = arena.succ_offset(offset, s)?;
        values[s as usize] = Some(process(arena, succ_offset, ctx, rng)?);
    }
    let baseline = values[min_s as usize].expect("the argmin-regret successor is never pruned");

    let mut new_regrets = vec![0i64; num_succs as usize];
    let mut min_regret = i64::MAX;
    for s in 0..num_succs as usize {
        let Some(value) = values[s] else { continue };
        let mut incr = value - baseline;
        if ctx.config.scaled_streets[street.index()] {
            incr = stochastic_scale(incr, 0.05, rng);
        }
        let i_regret = expanded[s] - incr;
        new_regrets[s] = i_regret;
        min_regret = min_regret.min(i_regret);
    }
    if min_regret == i64::MAX {
        min_regret = 0;
    }
    let offset_correction = -min_regret;
    for s in 0..num_succs {
        if values[s as usize].is_none() {
            continue;
        }
        let corrected = (new_regrets[s as usize] + offset_correction).clamp(0, ctx.config.regret_cap);
        let code = compress(ctx, street, corrected, rng);
        arena.set_regret(offset, bucket, s, width, num_succs, code)?;
    }

    Ok(baseline)
}

#[allow(clippy::too_many_arguments)]
fn process_opponent_turn(
    arena: &mut Arena,
    offset: NodeOffset,
    ctx: &ProcessContext,
    rng: &mut impl Rng,
    street: Street,
    num_succs: u8,
    width: RegretWidth,
    num_buckets: u32,
    bucket: u32,
    acting_player: u8,
) -> Result<f64> {
    let mut min_s = 0u8;
    for s in 0..num_succs {
        if arena.regret(offset, bucket, s, width, num_succs)? == 0 {
            min_s = s;
            break;
        }
    }
    let chosen = if rng.random_bool(ctx.config.explore) { rng.random_range(0..num_succs) } else { min_s };

    if ctx.config.has_sumprob(street, acting_player) && (ctx.is_full_iteration || !ctx.config.full_only_avg_update) {
        let current = arena.sumprob(offset, bucket, chosen, num_buckets, width, num_succs)?;
        let updated = current + 1;
        if updated > ctx.config.sumprob_ceiling {
            for s in 0..num_succs {
                let halved = arena.sumprob(offset, bucket, s, num_buckets, width, num_succs)? / 2;
                arena.set_sumprob(offset, bucket, s, num_buckets, width, num_succs, halved)?;
            }
        } else {
            arena.set_sumprob(offset, bucket, chosen, num_buckets, width, num_succs, updated)?;
        }
    }

    let succ_offset = arena.succ_offset(offset, chosen)?;
    process(arena, succ_offset, ctx, rng)
}

/// rounds `value * frac` to an integer, resolving the fractional remainder
/// by weighted coin flip so that repeated small increments don't
/// systematically truncate toward zero (spec.md §4.7's "scaled streets").
fn stochastic_scale(value: i64, frac: f64, rng: &mut impl Rng) -> i64 {
    let scaled = value as f64 * frac;
    let floor = scaled.floor();
    let remainder = scaled - floor;
    let rounded = if rng.random_bool(remainder.clamp(0.0, 1.0)) { floor + 1.0 } else { floor };
    rounded as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::BucketSource;
    use crate::tcfr::arena::DEFAULT_MAX_ARENA_BYTES;
    use crate::tcfr::build::build_arena;
    use crate::tree::betting_tree::BettingTree;
    use crate::tree::node::Node;
    use petgraph::graph::DiGraph;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    struct FixedBuckets;
    impl BucketSource for FixedBuckets {
        fn num_buckets(&self, _street: Street) -> u32 {
            2
        }
        fn bucket(&self, _street: Street, _board: u32, _hole_card_pair: u32) -> u32 {
            0
        }
    }

    /// root: player 0 acts, choosing between a call (showdown) and a fold.
    fn two_choice_tree() -> BettingTree {
        let mut graph = DiGraph::new();
        let showdown = graph.add_node(Node::new_showdown_terminal(0, Street::Pref, 100, 2));
        let fold = graph.add_node(Node::new_fold_terminal(1, Street::Pref, 100, 1));
        let mut root = Node::new_nonterminal(Street::Pref, 100, vec![], true, true, 0, 2);
        root.succs = vec![showdown, fold];
        let root_id = graph.add_node(root);
        graph.add_edge(root_id, showdown, ());
        graph.add_edge(root_id, fold, ());

        let mut tree = BettingTree::new(graph, root_id, Street::Pref);
        tree.register_terminal(showdown);
        tree.register_terminal(fold);
        crate::tree::ids::assign_nonterminal_ids(&mut tree);
        tree
    }

    fn deal(showdown_mult: i8) -> Deal {
        Deal { board_count: 1, p0_buckets: vec![0, 0, 0, 0], p1_buckets: vec![0, 0, 0, 0], showdown_mult }
    }

    #[test]
    fn fold_terminal_is_negative_for_the_folding_player() {
        let tree = two_choice_tree();
        let config = TcfrConfig::unquantized(Street::Pref);
        let mut layout = build_arena(&tree, &config, &FixedBuckets, DEFAULT_MAX_ARENA_BYTES).unwrap();
        let fold_offset = layout.offsets[&tree.node(tree.root()).succs[1]];

        let tables = QuantizeTables::new(REGRET_CAP);
        let num_buckets = [2, 2, 2, 2];
        let d = deal(1);
        let ctx = ProcessContext {
            config: &config,
            quantize: &tables,
            num_buckets: &num_buckets,
            deal: &d,
            perspective_player: 0,
            is_full_iteration: true,
        };
        let mut rng = SmallRng::seed_from_u64(1);
        let value = process(&mut layout.arena, fold_offset, &ctx, &mut rng).unwrap();
        assert_eq!(value, -100.0);
    }

    #[test]
    fn our_turn_updates_regret_toward_the_better_action() {
        let tree = two_choice_tree();
        let config = TcfrConfig::unquantized(Street::Pref);
        let mut layout = build_arena(&tree, &config, &FixedBuckets, DEFAULT_MAX_ARENA_BYTES).unwrap();

        let tables = QuantizeTables::new(REGRET_CAP);
        let num_buckets = [2, 2, 2, 2];
        let d = deal(1); // showdown always favors player 0: call dominates fold.
        let ctx = ProcessContext {
            config: &config,
            quantize: &tables,
            num_buckets: &num_buckets,
            deal: &d,
            perspective_player: 0,
            is_full_iteration: true,
        };
        let mut rng = SmallRng::seed_from_u64(7);
        let value = process(&mut layout.arena, layout.root_offset, &ctx, &mut rng).unwrap();
        assert_eq!(value, 100.0);

        let num_succs = layout.arena.num_succs(layout.root_offset).unwrap();
        let call_regret = layout.arena.regret(layout.root_offset, 0, 0, RegretWidth::Int, num_succs).unwrap();
        let fold_regret = layout.arena.regret(layout.root_offset, 0, 1, RegretWidth::Int, num_succs).unwrap();
        // calling is strictly better, so its regret stays at the post-offset
        // floor while folding accrues positive regret for not calling.
        assert_eq!(call_regret, 0);
        assert!(fold_regret > call_regret);
    }

    #[test]
    fn opponent_turn_plays_the_zero_regret_action_and_tallies_sumprob() {
        let tree = two_choice_tree();
        let config = TcfrConfig::unquantized(Street::Pref);
        let mut layout = build_arena(&tree, &config, &FixedBuckets, DEFAULT_MAX_ARENA_BYTES).unwrap();

        let tables = QuantizeTables::new(REGRET_CAP);
        let num_buckets = [2, 2, 2, 2];
        let d = deal(1);
        let ctx = ProcessContext {
            config: &config,
            quantize: &tables,
            num_buckets: &num_buckets,
            deal: &d,
            perspective_player: 1,
            is_full_iteration: true,
        };
        let mut rng = SmallRng::seed_from_u64(3);
        let value = process(&mut layout.arena, layout.root_offset, &ctx, &mut rng).unwrap();
        assert_eq!(value, -100.0); // player 0 calls and wins the showdown.

        let num_succs = layout.arena.num_succs(layout.root_offset).unwrap();
        let sum_call = layout.arena.sumprob(layout.root_offset, 0, 0, 2, RegretWidth::Int, num_succs).unwrap();
        assert_eq!(sum_call, 1);
    }
}
