//! Betting-tree file format (spec.md §6): "for each node, in preorder: u32
//! id, u16 last_bet_to, u16 num_succs, u16 flags, u8 player_acting, u8
//! num_remaining, followed by `num_succs` child records recursively.
//! Terminals carry `num_succs == 0` and no children."
//!
//! Grounded on the teacher's `byteorder::BE` read/write convention
//! (`examples/krukah-robopoker/src/save/disk/writer.rs`); we use
//! `std::fs::File` + `BufReader`/`BufWriter` directly rather than the
//! teacher's Postgres binary-copy framing, since this wire format has
//! nothing to do with a database.

use std::io::{BufReader, BufWriter, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use petgraph::graph::DiGraph;

use crate::error::{Error, Result};
use crate::street::Street;
use crate::tree::betting_tree::BettingTree;
use crate::tree::node::{Node, NodeId, Player};

/// Plain recursive preorder, with full duplication of reentrant subtrees —
/// this wire format carries no back-references, unlike the CFR-value file
/// format (§4.5/§6), which tracks a "seen" set to skip re-emitting merged
/// subtrees. A reentrant node's two occurrences share the same `id` (from
/// `assign_nonterminal_ids`) but are written out independently here.
pub fn write_tree<W: Write>(tree: &BettingTree, writer: &mut W) -> Result<()> {
    write_node(tree, tree.root(), writer)
}

fn write_node<W: Write>(tree: &BettingTree, id: NodeId, writer: &mut W) -> Result<()> {
    let node = tree.node(id);
    writer.write_u32::<BE>(node.id)?;
    writer.write_u16::<BE>(u16::try_from(node.last_bet_to).map_err(|_| Error::tree("bet_to exceeds u16"))?)?;
    writer.write_u16::<BE>(u16::try_from(node.num_succs()).map_err(|_| Error::tree("num_succs exceeds u16"))?)?;
    writer.write_u16::<BE>(u16::from(node.flags))?;
    let player_acting = match node.player_acting {
        Player::Acting(p) | Player::Remaining(p) => p,
        Player::Showdown => 0xFF,
    };
    writer.write_u8(player_acting)?;
    writer.write_u8(node.num_remaining)?;

    for &child in &node.succs {
        write_node(tree, child, writer)?;
    }
    Ok(())
}

/// writes to a path, the way `Disk::save` would in the teacher corpus.
pub fn write_tree_to_path(tree: &BettingTree, path: &str) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_tree(tree, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// `num_succs == 0` marks a terminal (spec.md §6); for a terminal we cannot
/// tell whether it's a showdown or fold purely from the wire bytes (the
/// original relies on `player_acting == 0xFF` for showdown — mirrored here),
/// so this reader reconstructs that distinction from `player_acting`.
pub fn read_tree<R: Read>(reader: &mut R, initial_street: Street) -> Result<BettingTree> {
    let mut graph = DiGraph::new();
    let root = read_node(reader, &mut graph)?;
    let mut tree = BettingTree::new(graph, root, initial_street);
    for idx in tree.graph().node_indices().collect::<Vec<_>>() {
        if tree.node(idx).is_terminal() {
            tree.register_terminal(idx);
        }
    }
    crate::tree::ids::assign_nonterminal_ids(&mut tree);
    Ok(tree)
}

fn read_node<R: Read>(reader: &mut R, graph: &mut DiGraph<Node, ()>) -> Result<NodeId> {
    let id = reader.read_u32::<BE>()?;
    let last_bet_to = i32::from(reader.read_u16::<BE>()?);
    let num_succs = reader.read_u16::<BE>()? as usize;
    let flags = u8::try_from(reader.read_u16::<BE>()?).map_err(|_| Error::tree("flags exceeds u8"))?;
    let player_acting_raw = reader.read_u8()?;
    let num_remaining = reader.read_u8()?;

    let street = Street::from_index(((flags >> 3) & 0b11) as usize, Street::Rive)?;
    let player_acting = if num_succs == 0 {
        if player_acting_raw == 0xFF {
            Player::Showdown
        } else {
            Player::Remaining(player_acting_raw)
        }
    } else {
        Player::Acting(player_acting_raw)
    };

    let mut node = Node {
        id,
        street,
        last_bet_to,
        succs: Vec::with_capacity(num_succs),
        flags,
        player_acting,
        num_remaining,
    };
    if num_succs == 0 {
        return Ok(graph.add_node(node));
    }

    let parent_placeholder = graph.add_node(node.clone());
    let mut children = Vec::with_capacity(num_succs);
    for _ in 0..num_succs {
        children.push(read_node(reader, graph)?);
    }
    node.succs = children.clone();
    *graph.node_weight_mut(parent_placeholder).expect("just inserted") = node;
    for child in children {
        graph.add_edge(parent_placeholder, child, ());
    }
    Ok(parent_placeholder)
}

pub fn read_tree_from_path(path: &str, initial_street: Street) -> Result<BettingTree> {
    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let tree = read_tree(&mut reader, initial_street)?;
    let mut probe = [0u8; 1];
    if reader.read(&mut probe)? != 0 {
        return Err(Error::tree("trailing bytes after tree file".to_string()));
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::Node;

    fn sample_tree() -> BettingTree {
        let mut graph = DiGraph::new();
        let leaf = graph.add_node(Node::new_showdown_terminal(0, Street::Pref, 200, 2));
        let mut root_node = Node::new_nonterminal(Street::Pref, 100, vec![leaf], true, false, 0, 2);
        root_node.succs = vec![leaf];
        let root = graph.add_node(root_node);
        graph.add_edge(root, leaf, ());
        let mut tree = BettingTree::new(graph, root, Street::Pref);
        tree.register_terminal(leaf);
        crate::tree::ids::assign_nonterminal_ids(&mut tree);
        tree
    }

    #[test]
    fn round_trip_preserves_topology() {
        let tree = sample_tree();
        let mut bytes = Vec::new();
        write_tree(&tree, &mut bytes).unwrap();

        let mut cursor = std::io::Cursor::new(bytes);
        let read_back = read_tree(&mut cursor, Street::Pref).unwrap();

        assert_eq!(read_back.num_terminals(), tree.num_terminals());
        assert_eq!(read_back.node(read_back.root()).num_succs(), tree.node(tree.root()).num_succs());
        assert_eq!(read_back.num_nonterminals(0, Street::Pref), tree.num_nonterminals(0, Street::Pref));
    }
}
