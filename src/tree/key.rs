//! Reentrant node key (spec.md §3, §4.3): "A printable string encoding
//! `(prefix, street, player_acting, num_street_bets, bet_to, last_bet_size,
//! num_remaining, num_players_to_act, optional last_aggressor)`. Two
//! construction paths that produce the same key share the resulting
//! subtree."
//!
//! Grounded on the builder's reentrancy hashmap (spec.md §4.3: "compute a
//! hash key... if the key is already in the builder's map, return the
//! stored node reference"); a `String` key into a `HashMap` is the
//! idiomatic equivalent of the original's ad hoc hash-of-struct scheme, and
//! keeps the key inspectable in logs and tests.

use crate::street::Street;
use crate::Chips;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReentrantKeyInput<'a> {
    pub prefix: &'a str,
    pub street: Street,
    pub player_acting: u8,
    pub num_street_bets: u32,
    pub bet_to: Chips,
    pub last_bet_size: Chips,
    pub num_remaining: u8,
    pub num_players_to_act: u8,
    pub last_aggressor: Option<u8>,
}

/// builds the canonical key string. Two `ReentrantKeyInput`s that are
/// field-wise equal (per the betting-abstraction's `betting_key_streets` /
/// `last_aggressor_key` configuration, which decides whether `prefix` and
/// `last_aggressor` participate at all) produce an identical string.
pub fn reentrant_key(input: &ReentrantKeyInput, include_prefix: bool, include_last_aggressor: bool) -> String {
    use std::fmt::Write;

    let mut key = String::new();
    if include_prefix {
        let _ = write!(key, "{}|", input.prefix);
    }
    let _ = write!(
        key,
        "st{}:pa{}:nsb{}:bt{}:lbs{}:nr{}:npta{}",
        input.street.index(),
        input.player_acting,
        input.num_street_bets,
        input.bet_to,
        input.last_bet_size,
        input.num_remaining,
        input.num_players_to_act,
    );
    if include_last_aggressor {
        match input.last_aggressor {
            Some(p) => {
                let _ = write!(key, ":la{p}");
            }
            None => {
                let _ = write!(key, ":laN");
            }
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_collide() {
        let a = ReentrantKeyInput {
            prefix: "ignored",
            street: Street::Turn,
            player_acting: 0,
            num_street_bets: 3,
            bet_to: 600,
            last_bet_size: 200,
            num_remaining: 2,
            num_players_to_act: 1,
            last_aggressor: Some(1),
        };
        let b = ReentrantKeyInput { prefix: "different", ..a.clone() };
        assert_eq!(
            reentrant_key(&a, false, true),
            reentrant_key(&b, false, true),
            "keys must collide when prefix is excluded and all other fields match"
        );
    }

    #[test]
    fn differing_bet_to_does_not_collide() {
        let a = ReentrantKeyInput {
            prefix: "",
            street: Street::Turn,
            player_acting: 0,
            num_street_bets: 3,
            bet_to: 600,
            last_bet_size: 200,
            num_remaining: 2,
            num_players_to_act: 1,
            last_aggressor: None,
        };
        let b = ReentrantKeyInput { bet_to: 601, ..a.clone() };
        assert_ne!(reentrant_key(&a, false, false), reentrant_key(&b, false, false));
    }
}
