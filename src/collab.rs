//! Interfaces to external collaborators this crate consumes as pure lookup
//! services (spec.md §1 non-goals): card abstraction/bucketing, the
//! hand-value tree, board-tree construction, and the handful of game
//! constants (`stack_size`, `small_blind`, ...) spec.md §4.1 says are
//! "implied by an external `Game` collaborator."
//!
//! None of these traits are implemented in this crate. Grounded on the
//! teacher's own collaborator boundary (`examples/krukah-robopoker/src/cards`
//! and `src/gameplay` are consumed by `src/mccfr` through narrow traits
//! rather than by reaching into their internals) — `BoardTree` and
//! `HandValueTree` are explicitly named in spec.md §9 as "global mutable
//! state... model as process-wide initialized-once tables; their API is
//! read-only after initialization," which is exactly the shape a trait
//! object or generic parameter gives us.

use crate::street::Street;
use crate::Chips;

/// game-wide constants a `BettingAbstraction` needs but does not own
/// (spec.md §4.1: "`stack_size`, `min_bet`, `initial_street`, `small_blind`,
/// `big_blind` implied by an external `Game` collaborator").
pub trait GameParams {
    fn stack_size(&self) -> Chips;
    fn min_bet(&self) -> Chips;
    fn initial_street(&self) -> Street;
    fn max_street(&self) -> Street;
    fn small_blind(&self) -> Chips;
    fn big_blind(&self) -> Chips;
}

/// per-street card-abstraction bucketing: maps a private holding (at a given
/// board) to a dense bucket index. Out of scope per spec.md §1 ("the card
/// abstraction / bucketing algorithms... the core consumes them as pure
/// lookup services").
pub trait BucketSource {
    /// number of distinct buckets on `street`.
    fn num_buckets(&self, street: Street) -> u32;

    /// bucket index for a given board/hole-card-pair at `street`.
    fn bucket(&self, street: Street, board: u32, hole_card_pair: u32) -> u32;
}

/// showdown-value lookup for max-street hands, precomputed per spec.md §4.7's
/// HVB table, or computed on demand from a hand-value tree. Out of scope;
/// consumed only through this contract.
pub trait HandValueSource {
    /// relative hand strength at the max street for a (board, hole-card-pair)
    /// — higher wins. Ties are equal values.
    fn hand_value(&self, board: u32, hole_card_pair: u32) -> u32;

    /// optional direct HVB lookup: `(bucket, hand_value)` for a max-street
    /// hand index, when a precomputed table is configured (spec.md §4.7).
    fn hvb(&self, _hand_index: u32) -> Option<(u32, u32)> {
        None
    }
}

/// canonical-board enumeration and multiplicity, used by TCFR's board
/// sampling step (spec.md §4.7, §6 "Preflop-board multiplicity table"). Out
/// of scope; the core only ever asks "how many canonical boards, how many
/// raw (multiplicity-weighted) boards, and what is the canonical board for
/// raw index i."
pub trait BoardSource {
    /// number of canonical boards at `street`.
    fn num_boards(&self, street: Street) -> u32;

    /// number of raw (duplicate-counted) boards at `street`; equals
    /// `num_boards` when every canonical board has multiplicity 1.
    fn num_raw_boards(&self, street: Street) -> u32;

    /// canonical board index for raw board index `idx` at `street`.
    fn board_table(&self, street: Street, idx: u32) -> u32;

    /// how many raw boards map to this canonical board (its sampling weight).
    fn board_count(&self, street: Street, canonical_board: u32) -> u32;
}

/// one sampled hand, resolved down to the bucket indices TCFR's hot loop
/// actually consumes (spec.md §4.7: "Dealing a hand... Compute hand
/// buckets per street from an external buckets service... If an HVB table
/// is configured... otherwise compute with the hand-value tree").
///
/// Everything upstream of this struct — deck composition, card conflicts,
/// hand-value comparison, HVB-vs-hand-value-tree dispatch — is exactly the
/// "card abstraction... hand-value tree, board-tree construction" spec.md
/// §1 puts out of scope ("no symbolic card reasoning appears in the
/// core"). `DealSource` is the one seam the core actually calls into for
/// dealing, per street, so the hot-path recursion (`tcfr::process`) never
/// touches a `Card`.
#[derive(Debug, Clone)]
pub struct Deal {
    /// sampling weight of the realized max-street board (spec.md §4.7:
    /// "multiplied by `board_count` so that sampling a canonical board
    /// weighted by its multiplicity produces an unbiased estimator").
    pub board_count: u32,
    /// `buckets[street.index()]` for the traversing/opponent-neutral
    /// dealer output, player 0's hand.
    pub p0_buckets: Vec<u32>,
    /// same, player 1's hand.
    pub p1_buckets: Vec<u32>,
    /// `showdown_mult` from player 0's perspective: `+1` if p0's hand is
    /// better, `-1` if worse, `0` on a tie (spec.md §4.7).
    pub showdown_mult: i8,
}

/// dealer collaborator: samples one hand per TCFR iteration (spec.md
/// §4.7's "Dealing a hand"). `rng` is a trait object so `DealSource`
/// remains object-safe despite `tcfr`'s generic-RNG hot loop.
pub trait DealSource {
    fn deal(&self, max_street: Street, rng: &mut dyn rand::RngCore) -> Deal;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    struct FixedGame;

    impl GameParams for FixedGame {
        fn stack_size(&self) -> Chips {
            20000
        }
        fn min_bet(&self) -> Chips {
            100
        }
        fn initial_street(&self) -> Street {
            Street::Pref
        }
        fn max_street(&self) -> Street {
            Street::Rive
        }
        fn small_blind(&self) -> Chips {
            50
        }
        fn big_blind(&self) -> Chips {
            100
        }
    }

    #[test]
    fn game_params_are_object_safe_and_usable_by_reference() {
        let game: &dyn GameParams = &FixedGame;
        assert_eq!(game.big_blind(), 100);
        assert_eq!(game.initial_street(), Street::Pref);
    }

    struct FixedDeal;
    impl DealSource for FixedDeal {
        fn deal(&self, max_street: Street, _rng: &mut dyn rand::RngCore) -> Deal {
            Deal {
                board_count: 3,
                p0_buckets: vec![0; max_street.index() + 1],
                p1_buckets: vec![1; max_street.index() + 1],
                showdown_mult: 1,
            }
        }
    }

    #[test]
    fn deal_source_is_object_safe() {
        let dealer: &dyn DealSource = &FixedDeal;
        let mut rng = rand::rngs::SmallRng::seed_from_u64(1);
        let deal = dealer.deal(Street::Rive, &mut rng);
        assert_eq!(deal.board_count, 3);
        assert_eq!(deal.p0_buckets.len(), 4);
    }
}
