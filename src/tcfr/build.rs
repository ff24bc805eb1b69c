//! Arena construction from a [`BettingTree`] (spec.md §4.7, §5: "Allocation:
//! a single up-front arena sized by `MeasureTree`; failure at measure time
//! is fatal. No per-iteration allocation is permitted in the hot path.").
//!
//! Grounded on the two-pass measure-then-populate shape the teacher uses
//! for its own `petgraph`-backed structures (`examples/krukah-robopoker/
//! src/cfr/tree/tree.rs` builds the whole graph before any traversal
//! touches it); we generalize it one step further since spec.md's arena is
//! a raw byte buffer rather than a typed graph, so offsets have to be
//! computed before a single byte can be written.

use std::collections::HashMap;

use crate::collab::BucketSource;
use crate::error::{Error, Result};
use crate::street::Street;
use crate::tcfr::arena::{
    nonterminal_record_len, terminal_record_len, Arena, NodeOffset, RegretWidth, TAG_P0_ACTS, TAG_P0_FOLDED,
    TAG_P1_ACTS, TAG_P1_FOLDED, TAG_SHOWDOWN,
};
use crate::tcfr::process::TcfrConfig;
use crate::tree::betting_tree::BettingTree;
use crate::tree::node::{NodeId, Player};

/// the built arena plus the `NodeId -> NodeOffset` map every other TCFR
/// module needs to enter/leave the byte representation (spec.md §9:
/// "every successor pointer becomes an index into the node arena").
pub struct ArenaLayout {
    pub arena: Arena,
    pub offsets: HashMap<NodeId, NodeOffset>,
    pub root_offset: NodeOffset,
}

/// `MeasureTree` + allocate + populate, in one call (spec.md §4.7/§5: the
/// measure pass is fatal-on-overflow, the allocate pass is a single
/// up-front `Vec`, and the populate pass writes every node once even
/// though reentrant nodes are reachable from multiple parents).
pub fn build_arena(
    tree: &BettingTree,
    config: &TcfrConfig,
    buckets: &dyn BucketSource,
    max_arena_bytes: u64,
) -> Result<ArenaLayout> {
    let mut offsets = HashMap::new();
    let mut bump = 0u64;
    measure(tree, tree.root(), config, buckets, &mut offsets, &mut bump)?;

    let mut arena = Arena::with_capacity(bump, max_arena_bytes)?;
    let mut written = std::collections::HashSet::new();
    populate(tree, tree.root(), config, buckets, &offsets, &mut arena, &mut written)?;

    let root_offset = offsets[&tree.root()];
    Ok(ArenaLayout { arena, offsets, root_offset })
}

fn measure(
    tree: &BettingTree,
    node_id: NodeId,
    config: &TcfrConfig,
    buckets: &dyn BucketSource,
    offsets: &mut HashMap<NodeId, NodeOffset>,
    bump: &mut u64,
) -> Result<()> {
    if offsets.contains_key(&node_id) {
        return Ok(());
    }
    let node = tree.node(node_id);
    for &succ in &node.succs {
        measure(tree, succ, config, buckets, offsets, bump)?;
    }

    let len = if node.is_terminal() {
        terminal_record_len()
    } else {
        let player = node.player_acting.as_acting().expect("nonterminal always acts");
        let num_succs = u8::try_from(node.num_succs())
            .map_err(|_| Error::tree("a nonterminal cannot have more than 255 successors"))?;
        let num_buckets = buckets.num_buckets(node.street);
        if num_buckets == 0 {
            return Err(Error::value(format!(
                "street {} has zero buckets; TCFR's arena requires a bucketed abstraction",
                node.street
            )));
        }
        let width = config.regret_width(node.street);
        let has_sumprob = config.has_sumprob(node.street, player);
        nonterminal_record_len(num_succs, num_buckets, width, has_sumprob)
    };
    offsets.insert(node_id, *bump);
    *bump += len;
    Ok(())
}

fn populate(
    tree: &BettingTree,
    node_id: NodeId,
    config: &TcfrConfig,
    buckets: &dyn BucketSource,
    offsets: &HashMap<NodeId, NodeOffset>,
    arena: &mut Arena,
    written: &mut std::collections::HashSet<NodeId>,
) -> Result<()> {
    if !written.insert(node_id) {
        return Ok(());
    }
    let offset = offsets[&node_id];
    let node = tree.node(node_id);

    if node.is_terminal() {
        let tag = match node.player_acting {
            Player::Showdown => TAG_SHOWDOWN,
            Player::Remaining(remaining) => {
                let folded_player = 1 - remaining;
                if folded_player == 1 {
                    TAG_P1_FOLDED
                } else {
                    TAG_P0_FOLDED
                }
            }
            Player::Acting(_) => unreachable!("a terminal never stores Player::Acting"),
        };
        arena.write_tag(offset, tag)?;
        arena.write_street(offset, node.street)?;
        arena.write_half_pot(offset, node.last_bet_to)?;
        return Ok(());
    }

    let player = node.player_acting.as_acting().expect("nonterminal always acts");
    let tag = if player == 1 { TAG_P1_ACTS } else { TAG_P0_ACTS };
    let num_succs = u8::try_from(node.num_succs()).expect("checked during measure");

    arena.write_tag(offset, tag)?;
    arena.write_street(offset, node.street)?;
    arena.write_num_succs(offset, num_succs)?;
    arena.write_fold_succ_index(offset, node.fold_succ_index().map(|i| i as u8))?;

    for succ in &node.succs {
        populate(tree, *succ, config, buckets, offsets, arena, written)?;
    }
    for (s, &succ) in node.succs.iter().enumerate() {
        arena.write_succ_offset(offset, s as u8, offsets[&succ])?;
    }
    Ok(())
}

/// `MeasureTree`: total arena size without allocating, for callers that
/// want to check a budget before committing (spec.md §5).
pub fn measure_tree(tree: &BettingTree, config: &TcfrConfig, buckets: &dyn BucketSource) -> Result<u64> {
    let mut offsets = HashMap::new();
    let mut bump = 0u64;
    measure(tree, tree.root(), config, buckets, &mut offsets, &mut bump)?;
    Ok(bump)
}

/// number of distinct buckets TCFR allocated storage for at each street,
/// dense by street index (needed by `process` to compute sumprob offsets:
/// spec.md §4.7's node record has a bucket stride that depends on
/// `num_buckets`, not just `num_succs`). Streets beyond the tree's own max
/// street are zero and never read.
pub fn num_buckets_per_street(buckets: &dyn BucketSource) -> [u32; 4] {
    let mut out = [0u32; 4];
    for &s in Street::all() {
        out[s.index()] = buckets.num_buckets(s);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::street::Street;
    use crate::tree::node::Node;
    use petgraph::graph::DiGraph;

    struct FixedBuckets;
    impl BucketSource for FixedBuckets {
        fn num_buckets(&self, _street: Street) -> u32 {
            4
        }
        fn bucket(&self, _street: Street, _board: u32, _hole_card_pair: u32) -> u32 {
            0
        }
    }

    fn sample_tree() -> BettingTree {
        let mut graph = DiGraph::new();
        let fold = graph.add_node(Node::new_fold_terminal(0, Street::Pref, 100, 0));
        let showdown = graph.add_node(Node::new_showdown_terminal(1, Street::Pref, 200, 2));
        let mut root = Node::new_nonterminal(Street::Pref, 100, vec![showdown, fold], true, true, 0, 2);
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

    #[test]
    fn builds_an_arena_addressable_at_the_root() {
        let tree = sample_tree();
        let config = TcfrConfig::unquantized(Street::Pref);
        let buckets = FixedBuckets;
        let layout = build_arena(&tree, &config, &buckets, crate::tcfr::arena::DEFAULT_MAX_ARENA_BYTES).unwrap();

        assert_eq!(layout.arena.tag(layout.root_offset).unwrap(), TAG_P0_ACTS);
        assert_eq!(layout.arena.num_succs(layout.root_offset).unwrap(), 2);
    }

    #[test]
    fn zero_bucket_street_is_a_value_error() {
        struct Empty;
        impl BucketSource for Empty {
            fn num_buckets(&self, _street: Street) -> u32 {
                0
            }
            fn bucket(&self, _street: Street, _board: u32, _hole_card_pair: u32) -> u32 {
                0
            }
        }
        let tree = sample_tree();
        let config = TcfrConfig::unquantized(Street::Pref);
        assert!(build_arena(&tree, &config, &Empty, crate::tcfr::arena::DEFAULT_MAX_ARENA_BYTES).is_err());
    }
}
