//! `CFRValues::{Write,Read,ReadSubtreeFromFull}` (spec.md §4.5, §6).
//!
//! Grounded on the teacher's `byteorder::BE` file I/O convention; filenames
//! follow spec.md §6 verbatim:
//! `{sumprobs|regrets}.<action_seq>.<root_bd_st>.<root_bd>.<st>.<it>.p<p>.<suffix>`.

use std::collections::HashSet;
use std::io::{BufReader, BufWriter, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, BE};

use crate::error::{Error, Result};
use crate::street::Street;
use crate::tree::betting_tree::BettingTree;
use crate::tree::node::NodeId;
use crate::values::{CFRValues, CFRValuesConfig, Slab, ValueKind};

impl CFRValues {
    pub fn filename(&self, action_seq: &str, street: Street, player: u8, iteration: u64) -> String {
        let kind = self.config.sumprobs;
        format!(
            "{}.{}.{}.{}.{}.{}.p{}.{}",
            if kind { "sumprobs" } else { "regrets" },
            action_seq,
            self.config.root_bd_st.index(),
            self.config.root_bd,
            street.index(),
            iteration,
            player,
            self.kind.suffix(),
        )
    }

    /// spec.md §4.5: "A *seen* set prevents re-writing the merged subtrees
    /// of a reentrant graph."
    pub fn write(
        &self,
        dir: &str,
        iteration: u64,
        tree: &BettingTree,
        root: NodeId,
        action_seq: &str,
        only_p: Option<u8>,
    ) -> Result<()> {
        // group nonterminals reachable from `root` by (player, street) so
        // each gets its own file, per spec.md §6.
        let mut grouped: std::collections::BTreeMap<(u8, Street), Vec<NodeId>> = std::collections::BTreeMap::new();
        let mut seen = HashSet::new();
        collect_nonterminals(tree, root, only_p, &mut seen, &mut grouped);

        for ((player, street), nodes) in grouped {
            let path = format!("{dir}/{}", self.filename(action_seq, street, player, iteration));
            let file = std::fs::File::create(&path)?;
            let mut writer = BufWriter::new(file);
            for node_id in nodes {
                let node = tree.node(node_id);
                let key = (player, street, node.id);
                let slab = self
                    .slab(key)
                    .ok_or_else(|| Error::value(format!("no values allocated for nonterminal {}", node.id)))?;
                write_slab(&mut writer, slab)?;
            }
            writer.flush()?;
        }
        Ok(())
    }

    pub fn read(
        config: CFRValuesConfig,
        dir: &str,
        iteration: u64,
        tree: &BettingTree,
        root: NodeId,
        action_seq: &str,
        only_p: Option<u8>,
        num_holdings: impl Fn(Street) -> u32,
    ) -> Result<Self> {
        let mut grouped: std::collections::BTreeMap<(u8, Street), Vec<NodeId>> = std::collections::BTreeMap::new();
        let mut seen = HashSet::new();
        collect_nonterminals(tree, root, only_p, &mut seen, &mut grouped);

        let mut values: Option<CFRValues> = None;
        for ((player, street), nodes) in &grouped {
            let kind = detect_kind(&config, dir, action_seq, *street, *player, iteration)?;
            let target = values.get_or_insert_with(|| CFRValues::new(config.clone(), kind));
            if target.kind() != kind {
                return Err(Error::value("mismatched value type across (player, street) groups".to_string()));
            }

            let path = format!("{dir}/{}", target.filename(action_seq, *street, *player, iteration));
            let file = std::fs::File::open(&path)?;
            let mut reader = BufReader::new(file);
            let holdings = num_holdings(*street) as usize;
            for &node_id in nodes {
                let node = tree.node(node_id);
                let key = (*player, *street, node.id);
                let slab = read_slab(&mut reader, kind, node.num_succs(), holdings)?;
                target.insert_slab(key, slab);
            }
            let mut probe_byte = [0u8; 1];
            if reader.read(&mut probe_byte)? != 0 {
                return Err(Error::io_mismatch(&path));
            }
        }
        values.ok_or_else(|| Error::value("no (player, street) groups to read".to_string()))
    }

    /// `ReadSubtreeFromFull` (spec.md §4.5): stream the whole-tree file but
    /// allocate storage only for nodes inside `subtree_root`.
    pub fn read_subtree_from_full(
        config: CFRValuesConfig,
        dir: &str,
        iteration: u64,
        full_tree: &BettingTree,
        full_root: NodeId,
        subtree_root: NodeId,
        action_seq: &str,
        only_p: Option<u8>,
        num_holdings: impl Fn(Street) -> u32,
    ) -> Result<Self> {
        let mut in_subtree = HashSet::new();
        mark_subtree(full_tree, subtree_root, &mut in_subtree);

        let mut grouped: std::collections::BTreeMap<(u8, Street), Vec<NodeId>> = std::collections::BTreeMap::new();
        let mut seen = HashSet::new();
        collect_nonterminals(full_tree, full_root, only_p, &mut seen, &mut grouped);

        let mut values: Option<CFRValues> = None;
        for ((player, street), nodes) in &grouped {
            let kind = detect_kind(&config, dir, action_seq, *street, *player, iteration)?;
            let target = values.get_or_insert_with(|| CFRValues::new(config.clone(), kind));

            let path = format!("{dir}/{}", target.filename(action_seq, *street, *player, iteration));
            let file = std::fs::File::open(&path)?;
            let mut reader = BufReader::new(file);
            let holdings = num_holdings(*street) as usize;
            for &node_id in nodes {
                let node = full_tree.node(node_id);
                let keep = in_subtree.contains(&node_id);
                let slab = read_slab(&mut reader, kind, node.num_succs(), holdings)?;
                if keep {
                    target.insert_slab((*player, *street, node.id), slab);
                }
            }
        }
        values.ok_or_else(|| Error::value("no (player, street) groups to read".to_string()))
    }
}

/// spec.md §4.5: "Value type is auto-detected from which of the candidate
/// files exists (preference: double → int → char → short)."
fn detect_kind(
    config: &CFRValuesConfig,
    dir: &str,
    action_seq: &str,
    street: Street,
    player: u8,
    iteration: u64,
) -> Result<ValueKind> {
    ValueKind::READ_PREFERENCE
        .into_iter()
        .find(|&k| {
            let probe = CFRValues::new(config.clone(), k);
            std::fs::metadata(format!("{dir}/{}", probe.filename(action_seq, street, player, iteration))).is_ok()
        })
        .ok_or_else(|| Error::value("no value file found for any candidate type".to_string()))
}

impl Error {
    fn io_mismatch(path: &str) -> Self {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("trailing bytes after reading {path}"),
        ))
    }
}

fn collect_nonterminals(
    tree: &BettingTree,
    node_id: NodeId,
    only_p: Option<u8>,
    seen: &mut HashSet<NodeId>,
    grouped: &mut std::collections::BTreeMap<(u8, Street), Vec<NodeId>>,
) {
    if !seen.insert(node_id) {
        return;
    }
    let node = tree.node(node_id);
    if let Some(player) = node.player_acting.as_acting() {
        if only_p.map(|p| p == player).unwrap_or(true) {
            grouped.entry((player, node.street)).or_default().push(node_id);
        }
    }
    for &succ in &node.succs {
        collect_nonterminals(tree, succ, only_p, seen, grouped);
    }
}

fn mark_subtree(tree: &BettingTree, node_id: NodeId, marks: &mut HashSet<NodeId>) {
    if !marks.insert(node_id) {
        return;
    }
    for &succ in &tree.node(node_id).succs {
        mark_subtree(tree, succ, marks);
    }
}

fn write_slab<W: Write>(writer: &mut W, slab: &Slab) -> Result<()> {
    match slab {
        Slab::U8(v) => v.iter().try_for_each(|&x| writer.write_u8(x))?,
        Slab::U16(v) => v.iter().try_for_each(|&x| writer.write_u16::<BE>(x))?,
        Slab::I32(v) => v.iter().try_for_each(|&x| writer.write_i32::<BE>(x))?,
        Slab::F64(v) => v.iter().try_for_each(|&x| writer.write_f64::<BE>(x))?,
    }
    Ok(())
}

fn read_slab<R: Read>(reader: &mut R, kind: ValueKind, num_succs: usize, holdings: usize) -> Result<Slab> {
    let len = holdings.max(1) * num_succs;
    Ok(match kind {
        ValueKind::U8 => Slab::U8((0..len).map(|_| reader.read_u8()).collect::<std::io::Result<_>>()?),
        ValueKind::U16 => Slab::U16((0..len).map(|_| reader.read_u16::<BE>()).collect::<std::io::Result<_>>()?),
        ValueKind::I32 => Slab::I32((0..len).map(|_| reader.read_i32::<BE>()).collect::<std::io::Result<_>>()?),
        ValueKind::F64 => Slab::F64((0..len).map(|_| reader.read_f64::<BE>()).collect::<std::io::Result<_>>()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_matches_the_spec_template() {
        let config = CFRValuesConfig {
            players: vec![true, true],
            streets: vec![true, true, true, true],
            sumprobs: true,
            root_bd: 7,
            root_bd_st: Street::Flop,
            bucket_thresholds: vec![0, 0, 0, 0],
        };
        let values = CFRValues::new(config, ValueKind::I32);
        let name = values.filename("CB", Street::Turn, 1, 42);
        assert_eq!(name, "sumprobs.CB.1.7.2.42.p1.i");
    }
}
