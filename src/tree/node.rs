//! Node representation (spec.md §3).

use petgraph::graph::NodeIndex;

use crate::street::Street;
use crate::Chips;

/// index into the arena graph; spec.md §9 calls for "arena-plus-index" in
/// place of the original's raw pointer-successor records.
pub type NodeId = NodeIndex;

/// sentinel `id` before `assign_nonterminal_ids` runs (spec.md §3: "Initial
/// value is a sentinel meaning 'unassigned'").
pub const UNASSIGNED: u32 = u32::MAX;

/// `player_acting` at a fold terminal stores the *remaining* player; at a
/// showdown it stores a sentinel (spec.md §3). Nonterminals always carry
/// `Acting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Player {
    Acting(u8),
    Remaining(u8),
    Showdown,
}

impl Player {
    pub fn as_acting(&self) -> Option<u8> {
        match self {
            Player::Acting(p) => Some(*p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    /// terminal id if `is_terminal()`, else a nonterminal id assigned by
    /// `assign_nonterminal_ids` (spec.md §4.4). `UNASSIGNED` until then.
    pub id: u32,
    pub street: Street,
    /// total chips contributed by the maximally committed player; spec.md §3
    /// calls this `last_bet_to`/`pot_size` interchangeably.
    pub last_bet_to: Chips,
    /// ordered successors. Invariant (spec.md §3): call at index 0 if
    /// present; fold at index 1 (or 0 with no call) if present; bets follow
    /// in strictly increasing bet-size order. This `Vec` IS the authoritative
    /// order — callers must never rely on petgraph edge iteration order.
    pub succs: Vec<NodeId>,
    /// bit 0 has-call-succ, bit 1 has-fold-succ, bits 3-4 street.
    pub flags: u8,
    pub player_acting: Player,
    /// players who have not folded; `>= 2` at any nonterminal/showdown,
    /// `== 1` at a fold terminal.
    pub num_remaining: u8,
}

impl Node {
    pub fn new_nonterminal(
        street: Street,
        last_bet_to: Chips,
        succs: Vec<NodeId>,
        has_call: bool,
        has_fold: bool,
        player_acting: u8,
        num_remaining: u8,
    ) -> Self {
        Self {
            id: UNASSIGNED,
            street,
            last_bet_to,
            flags: Self::make_flags(has_call, has_fold, street),
            succs,
            player_acting: Player::Acting(player_acting),
            num_remaining,
        }
    }

    pub fn new_fold_terminal(
        terminal_id: u32,
        street: Street,
        last_bet_to: Chips,
        remaining_player: u8,
    ) -> Self {
        Self {
            id: terminal_id,
            street,
            last_bet_to,
            flags: Self::make_flags(false, false, street),
            succs: Vec::new(),
            player_acting: Player::Remaining(remaining_player),
            num_remaining: 1,
        }
    }

    pub fn new_showdown_terminal(
        terminal_id: u32,
        street: Street,
        last_bet_to: Chips,
        num_remaining: u8,
    ) -> Self {
        Self {
            id: terminal_id,
            street,
            last_bet_to,
            flags: Self::make_flags(false, false, street),
            succs: Vec::new(),
            player_acting: Player::Showdown,
            num_remaining,
        }
    }

    pub fn num_succs(&self) -> usize {
        self.succs.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.succs.is_empty()
    }

    pub fn has_call_succ(&self) -> bool {
        self.flags & 0b0000_0001 != 0
    }

    pub fn has_fold_succ(&self) -> bool {
        self.flags & 0b0000_0010 != 0
    }

    /// `CallSuccIndex` (spec.md §4.2): 0 if a call successor exists.
    pub fn call_succ_index(&self) -> Option<usize> {
        self.has_call_succ().then_some(0)
    }

    /// `FoldSuccIndex`: 1 if a call also exists, else 0; `None` with no fold.
    pub fn fold_succ_index(&self) -> Option<usize> {
        self.has_fold_succ()
            .then_some(if self.has_call_succ() { 1 } else { 0 })
    }

    /// `DefaultSuccIndex`: always 0 (spec.md §4.2).
    pub const fn default_succ_index(&self) -> usize {
        0
    }

    /// index of the first bet successor, if any.
    pub fn first_bet_succ_index(&self) -> Option<usize> {
        let skip = usize::from(self.has_call_succ()) + usize::from(self.has_fold_succ());
        (skip < self.num_succs()).then_some(skip)
    }

    fn make_flags(has_call: bool, has_fold: bool, street: Street) -> u8 {
        let mut flags = 0u8;
        if has_call {
            flags |= 0b0000_0001;
        }
        if has_fold {
            flags |= 0b0000_0010;
        }
        flags |= (street.index() as u8 & 0b11) << 3;
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succ_index_rules_match_the_call_fold_bet_ordering_invariant() {
        let node = Node::new_nonterminal(Street::Pref, 100, vec![], true, true, 0, 2);
        assert_eq!(node.call_succ_index(), Some(0));
        assert_eq!(node.fold_succ_index(), Some(1));
        assert_eq!(node.first_bet_succ_index(), Some(2));

        let no_call = Node::new_nonterminal(Street::Pref, 100, vec![], false, true, 0, 2);
        assert_eq!(no_call.call_succ_index(), None);
        assert_eq!(no_call.fold_succ_index(), Some(0));
        assert_eq!(no_call.first_bet_succ_index(), Some(1));
    }

    #[test]
    fn terminal_has_no_successors() {
        let fold = Node::new_fold_terminal(3, Street::Flop, 400, 0);
        assert!(fold.is_terminal());
        assert_eq!(fold.num_remaining, 1);
        assert_eq!(fold.player_acting.as_acting(), None);
    }
}
