//! `AllocateAndClear` (spec.md §4.5): "recursively allocates and zeros the
//! storage for all nonterminals reachable from a given node, dispatching by
//! numeric type. Reentrancy: skip if storage already present."

use std::collections::HashSet;

use crate::collab::BucketSource;
use crate::error::Result;
use crate::tree::betting_tree::BettingTree;
use crate::tree::node::NodeId;
use crate::values::{CFRValues, Slab, ValueKind};

impl CFRValues {
    pub fn allocate_and_clear(
        &mut self,
        tree: &BettingTree,
        root: NodeId,
        kind: ValueKind,
        only_p: Option<u8>,
        buckets: &dyn BucketSource,
    ) -> Result<()> {
        let mut visited = HashSet::new();
        self.allocate_recursive(tree, root, kind, only_p, buckets, &mut visited)
    }

    fn allocate_recursive(
        &mut self,
        tree: &BettingTree,
        node_id: NodeId,
        kind: ValueKind,
        only_p: Option<u8>,
        buckets: &dyn BucketSource,
        visited: &mut HashSet<NodeId>,
    ) -> Result<()> {
        if !visited.insert(node_id) {
            return Ok(());
        }
        let node = tree.node(node_id);
        if node.is_terminal() {
            return Ok(());
        }
        let player = node.player_acting.as_acting().expect("nonterminal always acts");
        let covered = only_p.map(|p| p == player).unwrap_or(true) && self.covers_player(player) && self.covers_street(node.street);
        let key = (player, node.street, node.id);
        if covered && self.slab(key).is_none() {
            let num_holdings = if self.is_bucketed(node.street, node.last_bet_to) {
                buckets.num_buckets(node.street)
            } else {
                // unabstracted: caller is expected to have set
                // `bucket_thresholds` to `i32::MAX` on streets it never
                // wants unabstracted, since board/hole-card-pair counts are
                // an external collaborator's concern (`BoardSource`), not
                // this value store's.
                0
            };
            if num_holdings > 0 {
                let len = num_holdings as usize * node.num_succs();
                self.insert_slab(key, Slab::zeroed(kind, len));
            }
        }
        let succs = node.succs.clone();
        for succ in succs {
            self.allocate_recursive(tree, succ, kind, only_p, buckets, visited)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::street::Street;
    use crate::tree::node::Node;
    use crate::values::CFRValuesConfig;
    use petgraph::graph::DiGraph;

    struct FixedBuckets;
    impl BucketSource for FixedBuckets {
        fn num_buckets(&self, _street: Street) -> u32 {
            5
        }
        fn bucket(&self, _street: Street, _board: u32, _hole_card_pair: u32) -> u32 {
            0
        }
    }

    #[test]
    fn allocates_zeroed_slab_sized_by_buckets_times_succs() {
        let mut graph = DiGraph::new();
        let leaf = graph.add_node(Node::new_showdown_terminal(0, Street::Pref, 200, 2));
        let mut root_node = Node::new_nonterminal(Street::Pref, 100, vec![leaf], true, false, 0, 2);
        root_node.succs = vec![leaf];
        let root = graph.add_node(root_node);
        graph.add_edge(root, leaf, ());
        let mut tree = BettingTree::new(graph, root, Street::Pref);
        tree.register_terminal(leaf);
        crate::tree::ids::assign_nonterminal_ids(&mut tree);

        let config = CFRValuesConfig {
            players: vec![true, true],
            streets: vec![true, true, true, true],
            sumprobs: false,
            root_bd: 0,
            root_bd_st: Street::Pref,
            bucket_thresholds: vec![i32::MAX, i32::MAX, i32::MAX, i32::MAX],
        };
        let mut values = CFRValues::new(config, ValueKind::I32);
        values.allocate_and_clear(&tree, tree.root(), ValueKind::I32, None, &FixedBuckets).unwrap();

        let key = (0u8, Street::Pref, tree.node(tree.root()).id);
        let slab = values.slab(key).unwrap();
        assert_eq!(slab.len(), 5);
    }
}
