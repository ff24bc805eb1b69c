//! `BettingTree`: the rooted DAG of nodes (spec.md §3, §4.2).
//!
//! Grounded on the teacher's `cfr::tree::tree::Tree` wrapper around
//! `petgraph::graph::DiGraph` (`examples/krukah-robopoker/src/cfr/tree/tree.rs`):
//! an arena graph plus a root index. We deviate from the teacher's generic
//! `Tree<T, E, G, I>` (parameterized over abstract `Turn`/`Edge`/`Game`/`Info`
//! traits) because this crate's node/edge shape is concrete and fixed by
//! spec.md §3 — there is exactly one kind of node, not a family of games.

use std::collections::HashMap;

use petgraph::graph::DiGraph;

use crate::error::{Error, Result};
use crate::street::Street;
use crate::tree::node::{Node, NodeId, Player};

/// A single step of a textual action sequence accepted by
/// [`BettingTree::path_to_named_node`] — `C`, `F`, or `B<size>` (spec.md
/// §4.2). `Bet(None)` means "the sole bet," valid only in a limit tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedAction {
    Call,
    Fold,
    Bet(Option<u32>),
}

pub struct BettingTree {
    graph: DiGraph<Node, ()>,
    root: NodeId,
    initial_street: Street,
    num_terminals: u32,
    /// `num_nonterminals[(player, street)]`, populated by
    /// `assign_nonterminal_ids` (spec.md §4.4).
    num_nonterminals: HashMap<(u8, Street), u32>,
    /// terminal-id → node, for `O(1)` lookup by the value store and solvers.
    terminals: Vec<NodeId>,
}

impl BettingTree {
    pub fn new(graph: DiGraph<Node, ()>, root: NodeId, initial_street: Street) -> Self {
        Self {
            graph,
            root,
            initial_street,
            num_terminals: 0,
            num_nonterminals: HashMap::new(),
            terminals: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn initial_street(&self) -> Street {
        self.initial_street
    }

    pub fn graph(&self) -> &DiGraph<Node, ()> {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut DiGraph<Node, ()> {
        &mut self.graph
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.graph.node_weight(id).expect("NodeId must come from this tree's own arena")
    }

    pub fn num_terminals(&self) -> u32 {
        self.num_terminals
    }

    pub fn terminal(&self, terminal_id: u32) -> Result<NodeId> {
        self.terminals
            .get(terminal_id as usize)
            .copied()
            .ok_or_else(|| Error::tree(format!("terminal id {terminal_id} out of range")))
    }

    pub fn num_nonterminals(&self, player: u8, street: Street) -> u32 {
        self.num_nonterminals.get(&(player, street)).copied().unwrap_or(0)
    }

    pub(crate) fn set_nonterminal_count(&mut self, player: u8, street: Street, count: u32) {
        self.num_nonterminals.insert((player, street), count);
    }

    pub(crate) fn register_terminal(&mut self, id: NodeId) -> u32 {
        let terminal_id = self.terminals.len() as u32;
        self.terminals.push(id);
        self.num_terminals = self.terminals.len() as u32;
        terminal_id
    }

    /// parses `C|F|B<int>` segments and walks them from the root, per
    /// spec.md §4.2. A bet segment with size `k` must name a successor whose
    /// resulting bet-to is `before_pot + 2k` when matched against a call
    /// successor — spec.md's exact phrasing is "requires that the target
    /// successor have a call successor whose resulting bet-to satisfies
    /// `(after_pot - before_pot)/2 == k`"; we match on the bet successor's own
    /// `last_bet_to` directly, which is equivalent and avoids a spurious
    /// descent into the successor's own children.
    pub fn path_to_named_node(&self, actions: &[NamedAction]) -> Result<Vec<NodeId>> {
        let mut path = vec![self.root];
        let mut current = self.root;
        for action in actions {
            let node = self.node(current);
            let succ_index = match action {
                NamedAction::Call => node
                    .call_succ_index()
                    .ok_or_else(|| Error::tree("no call successor at this node".to_string()))?,
                NamedAction::Fold => node
                    .fold_succ_index()
                    .ok_or_else(|| Error::tree("no fold successor at this node".to_string()))?,
                NamedAction::Bet(size) => self.find_bet_succ(node, *size)?,
            };
            current = node.succs[succ_index];
            path.push(current);
        }
        Ok(path)
    }

    fn find_bet_succ(&self, node: &Node, size: Option<u32>) -> Result<usize> {
        let first_bet = node
            .first_bet_succ_index()
            .ok_or_else(|| Error::tree("no bet successor at this node".to_string()))?;
        match size {
            None => {
                if node.num_succs() - first_bet != 1 {
                    return Err(Error::tree(
                        "bare 'B' is only unambiguous when exactly one bet successor exists".to_string(),
                    ));
                }
                Ok(first_bet)
            }
            Some(k) => {
                for (offset, &succ) in node.succs[first_bet..].iter().enumerate() {
                    let succ_node = self.node(succ);
                    let bet_amount = succ_node.last_bet_to - node.last_bet_to;
                    if bet_amount == k as i32 {
                        return Ok(first_bet + offset);
                    }
                }
                Err(Error::tree(format!("no bet successor of size {k}")))
            }
        }
    }

    /// clones the subgraph rooted at `node` into a freshly-rooted tree, with
    /// terminal IDs renumbered from zero and nonterminal IDs reassigned
    /// densely (spec.md §4.2).
    pub fn subtree(&self, node: NodeId) -> BettingTree {
        let mut new_graph = DiGraph::new();
        let mut mapped: HashMap<NodeId, NodeId> = HashMap::new();
        let new_root = self.copy_subtree(node, &mut new_graph, &mut mapped);

        let street = self.node(node).street;
        let mut out = BettingTree::new(new_graph, new_root, street);
        for &new_id in mapped.values() {
            if out.node(new_id).is_terminal() {
                out.register_terminal(new_id);
            }
        }
        crate::tree::ids::assign_nonterminal_ids(&mut out);
        out
    }

    fn copy_subtree(
        &self,
        node: NodeId,
        new_graph: &mut DiGraph<Node, ()>,
        mapped: &mut HashMap<NodeId, NodeId>,
    ) -> NodeId {
        if let Some(&existing) = mapped.get(&node) {
            return existing;
        }
        let mut copy = self.node(node).clone();
        copy.id = crate::tree::node::UNASSIGNED;
        copy.succs.clear();
        let new_id = new_graph.add_node(copy);
        mapped.insert(node, new_id);

        let children: Vec<NodeId> = self
            .node(node)
            .succs
            .iter()
            .map(|&child| self.copy_subtree(child, new_graph, mapped))
            .collect();
        for &child in &children {
            new_graph.add_edge(new_id, child, ());
        }
        new_graph.node_weight_mut(new_id).expect("just inserted").succs = children;
        new_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_tree() -> BettingTree {
        let mut graph = DiGraph::new();
        let leaf = graph.add_node(Node::new_showdown_terminal(0, Street::Pref, 200, 2));
        let mut root_node = Node::new_nonterminal(Street::Pref, 100, vec![leaf], true, false, 0, 2);
        root_node.succs = vec![leaf];
        let root = graph.add_node(root_node);
        graph.add_edge(root, leaf, ());

        let mut tree = BettingTree::new(graph, root, Street::Pref);
        tree.register_terminal(leaf);
        tree
    }

    #[test]
    fn path_to_named_node_follows_call() {
        let tree = linear_tree();
        let path = tree.path_to_named_node(&[NamedAction::Call]).unwrap();
        assert_eq!(path.len(), 2);
        assert!(tree.node(path[1]).is_terminal());
    }

    #[test]
    fn path_to_named_node_rejects_missing_fold() {
        let tree = linear_tree();
        assert!(tree.path_to_named_node(&[NamedAction::Fold]).is_err());
    }

    #[test]
    fn subtree_renumbers_terminal_from_zero() {
        let tree = linear_tree();
        let sub = tree.subtree(tree.root());
        assert_eq!(sub.num_terminals(), 1);
        assert!(sub.terminal(0).is_ok());
        assert!(sub.node(sub.root()).has_call_succ());
    }
}
