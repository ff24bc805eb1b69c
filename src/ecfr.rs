//! External-sampling CFR (spec.md §4.8): the simpler, double-precision
//! solver that always evaluates every successor on the traversing player's
//! turn and samples one successor on the opponent's turn.
//!
//! Grounded directly on `examples/original_source/src/ecfr.cpp`'s
//! `ECFRThread::Process()`: unlike `tcfr::process` (spec.md §4.7's
//! quantized, offset-normalized, pruned arena recursion), ECFR keeps the
//! textbook CFR regret update — `regret[s] += succ_value[s] - v`, no cap,
//! no floor-at-zero trick — and stores it as `f64` via [`crate::values::CFRValues`]
//! rather than a bespoke arena, since spec.md §2 calls out ECFR's storage as
//! "double-precision arrays (smaller scale)." We reuse `CFRValues` for both
//! regrets and average-strategy sumprobs instead of inventing a second
//! sparse container, since the (player, street, nonterminal) → slab shape
//! is identical to what `CFRValues` already provides.

use std::collections::BTreeMap;

use rand::Rng;

use crate::collab::{BucketSource, Deal};
use crate::error::{Error, Result};
use crate::street::Street;
use crate::tree::betting_tree::BettingTree;
use crate::tree::node::{NodeId, Player};
use crate::values::{CFRValues, CFRValuesConfig, ValueKey, ValueKind};

/// share of a node's `action_sumprobs` below which a successor is
/// considered under-explored (`ecfr.cpp`'s hardcoded `0.01`).
const BOOST_SHARE_THRESHOLD: f64 = 0.01;

/// flat regret bump applied to every bucket of an under-explored successor.
/// Mirrors `ecfr.cpp`'s literal `1000`; the source comment next to it reads
/// "Hacky to have constant here" and no derivation is given, so this is
/// carried as a bare constant rather than something we can justify further.
const BOOST_AMOUNT: f64 = 1000.0;

/// `ECFRThread`'s `regrets_`/`sumprobs_`/`action_sumprobs_` storage, all
/// keyed the same way `CFRValues` keys everything else in this crate.
pub struct EcfrValues {
    pub regrets: CFRValues,
    pub sumprobs: CFRValues,
    /// only populated when `boost` is enabled: per-node running sum of
    /// `current_probs` across every visit, used solely to decide which
    /// successor is under-explored. One entry per successor, not per
    /// bucket — the boost in `ecfr.cpp` is a per-nonterminal, not
    /// per-bucket, decision.
    action_sumprobs: BTreeMap<ValueKey, Vec<f64>>,
    boost: bool,
}

impl EcfrValues {
    pub fn new(config: CFRValuesConfig, boost: bool) -> Self {
        let regrets = CFRValues::new(config.clone(), ValueKind::F64);
        let sumprobs = CFRValues::new(config, ValueKind::F64);
        Self { regrets, sumprobs, action_sumprobs: BTreeMap::new(), boost }
    }

    /// allocates zeroed regret/sumprob slabs for every nonterminal reachable
    /// from `root` (spec.md §4.5's `AllocateAndClear`, reused as-is).
    pub fn allocate(&mut self, tree: &BettingTree, root: NodeId, buckets: &dyn BucketSource) -> Result<()> {
        self.regrets.allocate_and_clear(tree, root, ValueKind::F64, None, buckets)?;
        self.sumprobs.allocate_and_clear(tree, root, ValueKind::F64, None, buckets)?;
        Ok(())
    }
}

/// one solver's worth of per-call context: which hand was dealt, which
/// player's regrets this traversal updates, and whether this call should
/// also run the boost adjustment (`ecfr.cpp`'s `adjust` parameter, set on
/// the last iteration of a batch).
pub struct EcfrContext<'a> {
    pub deal: &'a Deal,
    pub perspective_player: u8,
    pub adjust: bool,
}

impl EcfrContext<'_> {
    fn bucket_for(&self, player: u8, street: Street) -> usize {
        let buckets = if player == 0 { &self.deal.p0_buckets } else { &self.deal.p1_buckets };
        buckets[street.index()] as usize
    }
}

/// `ECFRThread::Process`: recurse from `node_id`, updating `values` in
/// place, and return this subtree's value from `ctx.perspective_player`'s
/// point of view.
///
/// Unlike TCFR's `board_count`-weighted showdown value, ECFR's own board
/// sampling already draws boards in raw (multiplicity-weighted) proportion,
/// so no additional board-count multiplier appears here — `ctx.deal.board_count`
/// is simply unused by this solver.
pub fn process(
    tree: &BettingTree,
    node_id: NodeId,
    values: &mut EcfrValues,
    ctx: &EcfrContext,
    rng: &mut impl Rng,
) -> Result<f64> {
    let node = tree.node(node_id);
    if node.is_terminal() {
        return Ok(terminal_value(node, ctx));
    }

    let player = node.player_acting.as_acting().expect("nonterminal always acts");
    let street = node.street;
    let num_succs = node.num_succs();
    let key: ValueKey = (player, street, node.id);
    let base = ctx.bucket_for(player, street) * num_succs;

    let regrets: Vec<f64> = {
        let slab = values
            .regrets
            .slab(key)
            .ok_or_else(|| Error::value("ecfr regrets not allocated for this nonterminal"))?;
        (0..num_succs).map(|s| slab.get_f64(base + s)).collect()
    };
    let probs = regret_match(&regrets, node.default_succ_index());

    if player == ctx.perspective_player {
        process_our_turn(tree, node, key, base, &probs, values, ctx, rng)
    } else {
        process_opponent_turn(tree, node, key, base, &probs, values, ctx, rng)
    }
}

fn terminal_value(node: &crate::tree::node::Node, ctx: &EcfrContext) -> f64 {
    match node.player_acting {
        Player::Showdown => {
            let mult = if ctx.perspective_player == 0 { ctx.deal.showdown_mult } else { -ctx.deal.showdown_mult };
            mult as f64 * node.last_bet_to as f64
        }
        Player::Remaining(remaining) => {
            let pot = node.last_bet_to as f64;
            if remaining == ctx.perspective_player {
                pot
            } else {
                -pot
            }
        }
        Player::Acting(_) => unreachable!("a terminal never stores Player::Acting"),
    }
}

/// standard positive-regret matching, one-hot at `dsi` when every regret is
/// non-positive (`ecfr.cpp`'s `CurrentProbs`).
fn regret_match(regrets: &[f64], dsi: usize) -> Vec<f64> {
    let positive_sum: f64 = regrets.iter().map(|&r| r.max(0.0)).sum();
    if positive_sum <= 0.0 {
        let mut probs = vec![0.0; regrets.len()];
        probs[dsi] = 1.0;
        probs
    } else {
        regrets.iter().map(|&r| r.max(0.0) / positive_sum).collect()
    }
}

#[allow(clippy::too_many_arguments)]
fn process_our_turn(
    tree: &BettingTree,
    node: &crate::tree::node::Node,
    key: ValueKey,
    base: usize,
    probs: &[f64],
    values: &mut EcfrValues,
    ctx: &EcfrContext,
    rng: &mut impl Rng,
) -> Result<f64> {
    let mut succ_values = Vec::with_capacity(node.num_succs());
    for &succ in &node.succs {
        succ_values.push(process(tree, succ, values, ctx, rng)?);
    }
    let v: f64 = succ_values.iter().zip(probs).map(|(val, p)| val * p).sum();

    let slab = values.regrets.slab_mut(key).expect("checked present above");
    for (s, &value) in succ_values.iter().enumerate() {
        slab.add_f64(base + s, value - v);
    }
    Ok(v)
}

#[allow(clippy::too_many_arguments)]
fn process_opponent_turn(
    tree: &BettingTree,
    node: &crate::tree::node::Node,
    key: ValueKey,
    base: usize,
    probs: &[f64],
    values: &mut EcfrValues,
    ctx: &EcfrContext,
    rng: &mut impl Rng,
) -> Result<f64> {
    let num_succs = node.num_succs();
    {
        let slab = values
            .sumprobs
            .slab_mut(key)
            .ok_or_else(|| Error::value("ecfr sumprobs not allocated for this nonterminal"))?;
        for (s, &p) in probs.iter().enumerate() {
            slab.add_f64(base + s, p);
        }
    }

    if values.boost {
        let action_sums = values.action_sumprobs.entry(key).or_insert_with(|| vec![0.0; num_succs]);
        for (s, &p) in probs.iter().enumerate() {
            action_sums[s] += p;
        }
        if ctx.adjust {
            let total: f64 = action_sums.iter().sum();
            if total > 0.0 {
                let underexplored: Vec<usize> = action_sums
                    .iter()
                    .enumerate()
                    .filter(|&(_, &share)| share < BOOST_SHARE_THRESHOLD * total)
                    .map(|(s, _)| s)
                    .collect();
                for succ in underexplored {
                    bump_regret_for_every_bucket(values, key, succ, num_succs);
                }
            }
        }
    }

    let chosen = sample_index(probs, rng);
    process(tree, node.succs[chosen], values, ctx, rng)
}

/// the boost in `ecfr.cpp` bumps a successor's regret for every bucket at
/// the node, not just the bucket of the hand being played — it is a
/// structural nudge toward exploring a path, independent of which hand
/// triggered it.
fn bump_regret_for_every_bucket(values: &mut EcfrValues, key: ValueKey, succ: usize, num_succs: usize) {
    if let Some(slab) = values.regrets.slab_mut(key) {
        let num_buckets = slab.len() / num_succs;
        for bucket in 0..num_buckets {
            slab.add_f64(bucket * num_succs + succ, BOOST_AMOUNT);
        }
    }
}

/// inverse-CDF sampling against `current_probs`.
fn sample_index(probs: &[f64], rng: &mut impl Rng) -> usize {
    let r: f64 = rng.random();
    let mut cum = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cum += p;
        if r < cum {
            return i;
        }
    }
    probs.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::street::Street;
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

    fn config() -> CFRValuesConfig {
        CFRValuesConfig {
            players: vec![true, true],
            streets: vec![true, true, true, true],
            sumprobs: true,
            root_bd: 0,
            root_bd_st: Street::Pref,
            bucket_thresholds: vec![i32::MAX, i32::MAX, i32::MAX, i32::MAX],
        }
    }

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

    fn deal() -> Deal {
        Deal { board_count: 1, p0_buckets: vec![0; 4], p1_buckets: vec![0; 4], showdown_mult: 1 }
    }

    #[test]
    fn fold_terminal_is_negative_for_the_folding_player() {
        let tree = two_choice_tree();
        let d = deal();
        let ctx = EcfrContext { deal: &d, perspective_player: 0, adjust: false };
        let fold_node = tree.node(tree.node(tree.root()).succs[1]);
        assert_eq!(terminal_value(fold_node, &ctx), -100.0);
    }

    #[test]
    fn our_turn_accumulates_plain_uncapped_regret() {
        let tree = two_choice_tree();
        let mut values = EcfrValues::new(config(), false);
        values.allocate(&tree, tree.root(), &FixedBuckets).unwrap();
        let d = deal();
        let ctx = EcfrContext { deal: &d, perspective_player: 0, adjust: false };
        let mut rng = SmallRng::seed_from_u64(1);

        let v = process(&tree, tree.root(), &mut values, &ctx, &mut rng).unwrap();
        assert_eq!(v, 100.0);

        let key = (0u8, Street::Pref, tree.node(tree.root()).id);
        let slab = values.regrets.slab(key).unwrap();
        // with both regrets starting at zero, probs is one-hot at the call
        // successor (index 0), so v == succ_values[0] and call's regret
        // stays at zero while fold's regret goes deeply negative.
        assert_eq!(slab.get_f64(0), 0.0);
        assert_eq!(slab.get_f64(1), -200.0);
    }

    #[test]
    fn opponent_turn_tallies_expected_value_sumprob_and_follows_the_sample() {
        let tree = two_choice_tree();
        let mut values = EcfrValues::new(config(), false);
        values.allocate(&tree, tree.root(), &FixedBuckets).unwrap();
        let d = deal();
        let ctx = EcfrContext { deal: &d, perspective_player: 1, adjust: false };
        let mut rng = SmallRng::seed_from_u64(2);

        let v = process(&tree, tree.root(), &mut values, &ctx, &mut rng).unwrap();
        // zero regrets -> one-hot at the call successor, so the sampler
        // always recurses into the showdown regardless of the draw.
        assert_eq!(v, -100.0);

        let key = (0u8, Street::Pref, tree.node(tree.root()).id);
        let slab = values.sumprobs.slab(key).unwrap();
        assert_eq!(slab.get_f64(0), 1.0);
        assert_eq!(slab.get_f64(1), 0.0);
    }

    #[test]
    fn boost_bumps_regret_for_every_bucket_of_an_underexplored_successor() {
        let tree = two_choice_tree();
        let mut values = EcfrValues::new(config(), true);
        values.allocate(&tree, tree.root(), &FixedBuckets).unwrap();
        let key = (0u8, Street::Pref, tree.node(tree.root()).id);

        // seed action_sumprobs directly so the boost decision doesn't
        // depend on first driving real traffic through the tree: successor
        // 1 has a negligible share of the accumulated mass.
        values.action_sumprobs.insert(key, vec![100.0, 0.1]);

        let d = deal();
        let ctx = EcfrContext { deal: &d, perspective_player: 1, adjust: true };
        let mut rng = SmallRng::seed_from_u64(3);
        process(&tree, tree.root(), &mut values, &ctx, &mut rng).unwrap();

        let slab = values.regrets.slab(key).unwrap();
        // bucket 0 and bucket 1 (FixedBuckets reports 2 buckets) both get
        // the flat bump on successor 1, since the boost is per-nonterminal
        // rather than per-bucket.
        assert_eq!(slab.get_f64(1), BOOST_AMOUNT);
        assert_eq!(slab.get_f64(2 + 1), BOOST_AMOUNT);
        assert_eq!(slab.get_f64(0), 0.0);
    }
}
