//! NonterminalID assignment (spec.md §4.4): "A post-order traversal numbers
//! every reachable nonterminal densely, per-(player, street). A reentrant
//! node is assigned a number on first visit; subsequent visits observe the
//! assignment and stop recursion."

use std::collections::HashMap;
use std::collections::HashSet;

use crate::street::Street;
use crate::tree::betting_tree::BettingTree;
use crate::tree::node::{NodeId, UNASSIGNED};

/// assigns nonterminal IDs in place and records the per-(player, street)
/// counts on `tree`. Idempotent: a node already carrying an ID (because it
/// was reached through a reentrant edge that's already been visited) is
/// skipped, matching spec.md's "tolerates reentrancy."
pub fn assign_nonterminal_ids(tree: &mut BettingTree) {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut counters: HashMap<(u8, Street), u32> = HashMap::new();
    post_order(tree, tree.root(), &mut visited, &mut counters);
    for (&key, &count) in counters.iter() {
        tree.set_nonterminal_count(key.0, key.1, count);
    }
}

fn post_order(
    tree: &mut BettingTree,
    node_id: NodeId,
    visited: &mut HashSet<NodeId>,
    counters: &mut HashMap<(u8, Street), u32>,
) {
    if !visited.insert(node_id) {
        return;
    }
    let children = tree.node(node_id).succs.clone();
    for child in children {
        post_order(tree, child, visited, counters);
    }

    let node = tree.node(node_id);
    if node.is_terminal() || node.id != UNASSIGNED {
        return;
    }
    let player = node
        .player_acting
        .as_acting()
        .expect("nonterminal always carries Player::Acting");
    let street = node.street;
    let counter = counters.entry((player, street)).or_insert(0);
    let assigned = *counter;
    *counter += 1;
    tree.graph_mut().node_weight_mut(node_id).expect("valid id").id = assigned;
}

#[cfg(test)]
mod tests {
    use super::*;
    use petgraph::graph::DiGraph;

    use crate::tree::node::Node;

    #[test]
    fn dense_numbering_across_two_siblings() {
        let mut graph = DiGraph::new();
        let t0 = graph.add_node(Node::new_showdown_terminal(0, Street::Pref, 100, 2));
        let t1 = graph.add_node(Node::new_showdown_terminal(1, Street::Pref, 200, 2));
        let mut left = Node::new_nonterminal(Street::Pref, 100, vec![t0], true, false, 1, 2);
        left.succs = vec![t0];
        let left_id = graph.add_node(left);
        let mut right = Node::new_nonterminal(Street::Pref, 100, vec![t1], true, false, 1, 2);
        right.succs = vec![t1];
        let right_id = graph.add_node(right);
        let mut root = Node::new_nonterminal(Street::Pref, 0, vec![left_id, right_id], true, true, 0, 2);
        root.succs = vec![left_id, right_id];
        let root_id = graph.add_node(root);
        graph.add_edge(root_id, left_id, ());
        graph.add_edge(root_id, right_id, ());
        graph.add_edge(left_id, t0, ());
        graph.add_edge(right_id, t1, ());

        let mut tree = BettingTree::new(graph, root_id, Street::Pref);
        tree.register_terminal(t0);
        tree.register_terminal(t1);
        assign_nonterminal_ids(&mut tree);

        assert_eq!(tree.num_nonterminals(1, Street::Pref), 2);
        assert_eq!(tree.num_nonterminals(0, Street::Pref), 1);
        let assigned: std::collections::BTreeSet<u32> =
            [tree.node(left_id).id, tree.node(right_id).id].into_iter().collect();
        assert_eq!(assigned, [0u32, 1u32].into_iter().collect());
    }

    #[test]
    fn reentrant_shared_node_keeps_its_first_id() {
        let mut graph = DiGraph::new();
        let t0 = graph.add_node(Node::new_showdown_terminal(0, Street::Pref, 100, 2));
        let mut shared = Node::new_nonterminal(Street::Pref, 100, vec![t0], true, false, 1, 2);
        shared.succs = vec![t0];
        let shared_id = graph.add_node(shared);
        let mut root = Node::new_nonterminal(Street::Pref, 0, vec![shared_id, shared_id], true, true, 0, 2);
        root.succs = vec![shared_id, shared_id];
        let root_id = graph.add_node(root);
        graph.add_edge(root_id, shared_id, ());

        let mut tree = BettingTree::new(graph, root_id, Street::Pref);
        tree.register_terminal(t0);
        assign_nonterminal_ids(&mut tree);

        assert_eq!(tree.num_nonterminals(1, Street::Pref), 1, "shared node must be numbered once");
    }
}
