//! `BettingAbstraction`: a pure-data configuration object (spec.md §4.1).
//!
//! Grounded on the teacher's `dto`/config-loading convention of reading
//! `serde_json::Value` maps rather than a hand-rolled tokenizer (see
//! SPEC_FULL.md's ambient-stack section). Every recognized key is optional
//! at the `serde_json::Map` level but required by the semantics of the
//! fields the builder actually needs; `from_map` raises `Error::Config` for
//! anything missing or malformed, per spec.md §4.1's "Unrecognised
//! combinations fail with `ConfigError`."

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::street::Street;
use crate::Chips;

/// one of the four candidate-generation strategies spec.md §4.1 calls
/// `no_limit_tree_type ∈ {0,1,2,3}` and SPEC_FULL.md's supplement unifies
/// into a single builder (`original_source/no_limit_tree.cpp` through
/// `no_limit_tree3.cpp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeVariant {
    /// plain pot-fraction table (the baseline `no_limit_tree.cpp`).
    PotFraction = 0,
    /// geometric ladder overlay (`no_limit_tree2.cpp`).
    Geometric = 1,
    /// allowable-bet-to snapping (`no_limit_tree3.cpp`).
    AllowableBetTo = 2,
    /// always-all-in / always-min-bet overlay forced onto every node
    /// (`no_limit_tree4.cpp`/`no_limit_tree5.cpp`).
    ForcedOverlay = 3,
}

/// per-street, per-role sizing table: `bet_sizes[st][num_prior_bets][i]`
/// expressed as a pot fraction (spec.md §4.3's "Pot-fraction list").
pub type PotFractionTable = Vec<Vec<Vec<f64>>>;

#[derive(Debug, Clone)]
struct RoleSizing {
    max_bets: Vec<u32>,
    bet_sizes: PotFractionTable,
    all_bet_size_streets: Vec<bool>,
    all_even_bet_size_streets: Vec<bool>,
    always_min_bet: Vec<Vec<bool>>,
}

impl RoleSizing {
    fn max_bets_on(&self, street: Street) -> u32 {
        self.max_bets.get(street.index()).copied().unwrap_or(0)
    }

    fn pot_fractions(&self, street: Street, num_prior_bets: usize) -> &[f64] {
        self.bet_sizes
            .get(street.index())
            .and_then(|per_nb| per_nb.get(num_prior_bets))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn all_bet_sizes(&self, street: Street) -> bool {
        self.all_bet_size_streets.get(street.index()).copied().unwrap_or(false)
    }

    fn all_even_bet_sizes(&self, street: Street) -> bool {
        self.all_even_bet_size_streets
            .get(street.index())
            .copied()
            .unwrap_or(false)
    }

    fn always_min_bet_at(&self, street: Street, num_street_bets: usize) -> bool {
        self.always_min_bet
            .get(street.index())
            .and_then(|v| v.get(num_street_bets))
            .copied()
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct BettingAbstraction {
    pub limit: bool,
    pub tree_variant: TreeVariant,
    pub asymmetric: bool,
    pub target_player: u8,

    pub stack_size: Chips,
    pub min_bet: Chips,
    pub initial_street: Street,
    pub max_street: Street,
    pub small_blind: Chips,
    pub big_blind: Chips,

    our: RoleSizing,
    opp: RoleSizing,

    pub always_all_in: bool,
    pub no_open_limp: bool,
    pub no_regular_bet_threshold: Option<Chips>,
    pub only_pot_threshold: Option<Chips>,
    pub geometric_type: u8,
    pub close_to_all_in_frac: f64,
    pub bet_size_multiplier: f64,

    pub reentrant_streets: Vec<bool>,
    pub min_reentrant_pot: Chips,
    /// `min_reentrant_bets[st][num_remaining]`.
    pub min_reentrant_bets: Vec<Vec<u32>>,
    pub betting_key_streets: Vec<bool>,
    pub last_aggressor_key: bool,

    pub allowable_bet_tos: Option<Vec<Chips>>,
    pub merge_rules: bool,
}

impl BettingAbstraction {
    /// picks the `our_*`/`opp_*` sizing table for whoever is acting, per
    /// spec.md §4.1: "uses `our_*` whenever `player_acting == target_player`."
    fn role_for(&self, acting_player: u8) -> &RoleSizing {
        if !self.asymmetric || acting_player == self.target_player {
            &self.our
        } else {
            &self.opp
        }
    }

    pub fn max_bets(&self, acting_player: u8, street: Street) -> u32 {
        self.role_for(acting_player).max_bets_on(street)
    }

    pub fn pot_fractions(&self, acting_player: u8, street: Street, num_prior_bets: usize) -> &[f64] {
        self.role_for(acting_player).pot_fractions(street, num_prior_bets)
    }

    pub fn all_bet_sizes(&self, acting_player: u8, street: Street) -> bool {
        self.role_for(acting_player).all_bet_sizes(street)
    }

    pub fn all_even_bet_sizes(&self, acting_player: u8, street: Street) -> bool {
        self.role_for(acting_player).all_even_bet_sizes(street)
    }

    pub fn always_min_bet_at(&self, acting_player: u8, street: Street, num_street_bets: usize) -> bool {
        self.role_for(acting_player).always_min_bet_at(street, num_street_bets)
    }

    pub fn is_reentrant(&self, street: Street) -> bool {
        self.reentrant_streets.get(street.index()).copied().unwrap_or(false)
    }

    pub fn min_reentrant_bets_at(&self, street: Street, num_remaining: usize) -> u32 {
        self.min_reentrant_bets
            .get(street.index())
            .and_then(|v| v.get(num_remaining))
            .copied()
            .unwrap_or(0)
    }

    /// Loads a `BettingAbstraction` from a JSON object, per SPEC_FULL.md's
    /// ambient-stack configuration section. `game` supplies the handful of
    /// fields spec.md §4.1 says are "implied by an external `Game`
    /// collaborator."
    pub fn from_map(map: &serde_json::Map<String, Value>, game: &dyn crate::collab::GameParams) -> Result<Self> {
        let limit = bool_opt(map, "limit")?.unwrap_or(false);
        let asymmetric = bool_opt(map, "asymmetric")?.unwrap_or(false);
        let target_player = u8_opt(map, "target_player")?.unwrap_or(0);
        let tree_variant = match u8_opt(map, "no_limit_tree_type")?.unwrap_or(0) {
            0 => TreeVariant::PotFraction,
            1 => TreeVariant::Geometric,
            2 => TreeVariant::AllowableBetTo,
            3 => TreeVariant::ForcedOverlay,
            other => return Err(Error::config(format!("no_limit_tree_type {other} out of range 0..=3"))),
        };

        let num_streets = game.max_street().index() + 1;
        let our = RoleSizing {
            max_bets: u32_vec(map, "our_max_bets", "max_bets", num_streets)?,
            bet_sizes: pot_fraction_table(map, "our_bet_sizes", "bet_sizes", num_streets)?,
            all_bet_size_streets: bool_vec(map, "our_all_bet_size_streets", "all_bet_size_streets", num_streets)?,
            all_even_bet_size_streets: bool_vec(
                map,
                "our_all_even_bet_size_streets",
                "all_even_bet_size_streets",
                num_streets,
            )?,
            always_min_bet: bool_matrix(map, "our_always_min_bet", "always_min_bet", num_streets)?,
        };
        let opp = if asymmetric {
            RoleSizing {
                max_bets: u32_vec(map, "opp_max_bets", "max_bets", num_streets)?,
                bet_sizes: pot_fraction_table(map, "opp_bet_sizes", "bet_sizes", num_streets)?,
                all_bet_size_streets: bool_vec(
                    map,
                    "opp_all_bet_size_streets",
                    "all_bet_size_streets",
                    num_streets,
                )?,
                all_even_bet_size_streets: bool_vec(
                    map,
                    "opp_all_even_bet_size_streets",
                    "all_even_bet_size_streets",
                    num_streets,
                )?,
                always_min_bet: bool_matrix(map, "opp_always_min_bet", "always_min_bet", num_streets)?,
            }
        } else {
            our.clone()
        };

        Ok(Self {
            limit,
            tree_variant,
            asymmetric,
            target_player,
            stack_size: game.stack_size(),
            min_bet: game.min_bet(),
            initial_street: game.initial_street(),
            max_street: game.max_street(),
            small_blind: game.small_blind(),
            big_blind: game.big_blind(),
            our,
            opp,
            always_all_in: bool_opt(map, "always_all_in")?.unwrap_or(false),
            no_open_limp: bool_opt(map, "no_open_limp")?.unwrap_or(false),
            no_regular_bet_threshold: i32_opt(map, "no_regular_bet_threshold")?,
            only_pot_threshold: i32_opt(map, "only_pot_threshold")?,
            geometric_type: u8_opt(map, "geometric_type")?.unwrap_or(0),
            close_to_all_in_frac: f64_opt(map, "close_to_all_in_frac")?.unwrap_or(0.9),
            bet_size_multiplier: f64_opt(map, "bet_size_multiplier")?.unwrap_or(0.0),
            reentrant_streets: bool_vec(map, "reentrant_streets", "reentrant_streets", num_streets)?,
            min_reentrant_pot: i32_opt(map, "min_reentrant_pot")?.unwrap_or(0),
            min_reentrant_bets: u32_matrix(map, "min_reentrant_bets", num_streets)?,
            betting_key_streets: bool_vec(map, "betting_key_streets", "betting_key_streets", num_streets)?,
            last_aggressor_key: bool_opt(map, "last_aggressor_key")?.unwrap_or(false),
            allowable_bet_tos: i32_vec_opt(map, "allowable_bet_tos")?,
            merge_rules: bool_opt(map, "merge_rules")?.unwrap_or(false),
        })
    }
}

fn bool_opt(map: &serde_json::Map<String, Value>, key: &str) -> Result<Option<bool>> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| Error::config(format!("{key} must be a bool"))),
    }
}

fn u8_opt(map: &serde_json::Map<String, Value>, key: &str) -> Result<Option<u8>> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| Error::config(format!("{key} must be a u8"))),
    }
}

fn i32_opt(map: &serde_json::Map<String, Value>, key: &str) -> Result<Option<i32>> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| Error::config(format!("{key} must be an i32")))
    }
}

fn f64_opt(map: &serde_json::Map<String, Value>, key: &str) -> Result<Option<f64>> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| Error::config(format!("{key} must be a number"))),
    }
}

fn i32_vec_opt(map: &serde_json::Map<String, Value>, key: &str) -> Result<Option<Vec<Chips>>> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => {
            let arr = v
                .as_array()
                .ok_or_else(|| Error::config(format!("{key} must be an array")))?;
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                out.push(
                    item.as_i64()
                        .and_then(|n| i32::try_from(n).ok())
                        .ok_or_else(|| Error::config(format!("{key} elements must be i32")))?,
                );
            }
            Ok(Some(out))
        }
    }
}

fn u32_vec(
    map: &serde_json::Map<String, Value>,
    key: &str,
    fallback_key: &str,
    num_streets: usize,
) -> Result<Vec<u32>> {
    let value = map.get(key).or_else(|| map.get(fallback_key));
    match value {
        None => Ok(vec![0; num_streets]),
        Some(v) => {
            let arr = v
                .as_array()
                .ok_or_else(|| Error::config(format!("{key} must be an array")))?;
            arr.iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| Error::config(format!("{key} elements must be u32")))
                })
                .collect()
        }
    }
}

fn bool_vec(
    map: &serde_json::Map<String, Value>,
    key: &str,
    fallback_key: &str,
    num_streets: usize,
) -> Result<Vec<bool>> {
    let value = map.get(key).or_else(|| map.get(fallback_key));
    match value {
        None => Ok(vec![false; num_streets]),
        Some(v) => {
            let arr = v
                .as_array()
                .ok_or_else(|| Error::config(format!("{key} must be an array")))?;
            arr.iter()
                .map(|item| item.as_bool().ok_or_else(|| Error::config(format!("{key} elements must be bool"))))
                .collect()
        }
    }
}

fn bool_matrix(
    map: &serde_json::Map<String, Value>,
    key: &str,
    fallback_key: &str,
    num_streets: usize,
) -> Result<Vec<Vec<bool>>> {
    let value = map.get(key).or_else(|| map.get(fallback_key));
    match value {
        None => Ok(vec![Vec::new(); num_streets]),
        Some(v) => {
            let arr = v
                .as_array()
                .ok_or_else(|| Error::config(format!("{key} must be an array of arrays")))?;
            arr.iter()
                .map(|row| {
                    row.as_array()
                        .ok_or_else(|| Error::config(format!("{key} rows must be arrays")))?
                        .iter()
                        .map(|item| item.as_bool().ok_or_else(|| Error::config(format!("{key} elements must be bool"))))
                        .collect()
                })
                .collect()
        }
    }
}

fn u32_matrix(map: &serde_json::Map<String, Value>, key: &str, num_streets: usize) -> Result<Vec<Vec<u32>>> {
    match map.get(key) {
        None => Ok(vec![Vec::new(); num_streets]),
        Some(v) => {
            let arr = v
                .as_array()
                .ok_or_else(|| Error::config(format!("{key} must be an array of arrays")))?;
            arr.iter()
                .map(|row| {
                    row.as_array()
                        .ok_or_else(|| Error::config(format!("{key} rows must be arrays")))?
                        .iter()
                        .map(|item| {
                            item.as_u64()
                                .and_then(|n| u32::try_from(n).ok())
                                .ok_or_else(|| Error::config(format!("{key} elements must be u32")))
                        })
                        .collect()
                })
                .collect()
        }
    }
}

fn pot_fraction_table(
    map: &serde_json::Map<String, Value>,
    key: &str,
    fallback_key: &str,
    num_streets: usize,
) -> Result<PotFractionTable> {
    let value = map.get(key).or_else(|| map.get(fallback_key));
    match value {
        None => Ok(vec![Vec::new(); num_streets]),
        Some(v) => {
            let streets = v
                .as_array()
                .ok_or_else(|| Error::config(format!("{key} must be an array")))?;
            streets
                .iter()
                .map(|per_nb| {
                    per_nb
                        .as_array()
                        .ok_or_else(|| Error::config(format!("{key} rows must be arrays")))?
                        .iter()
                        .map(|fracs| {
                            fracs
                                .as_array()
                                .ok_or_else(|| Error::config(format!("{key} entries must be arrays")))?
                                .iter()
                                .map(|f| f.as_f64().ok_or_else(|| Error::config(format!("{key} fractions must be numbers"))))
                                .collect()
                        })
                        .collect()
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::GameParams;
    use serde_json::json;

    struct HeadsUp;
    impl GameParams for HeadsUp {
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
    fn missing_optional_keys_fall_back_to_defaults() {
        let map = json!({ "limit": true }).as_object().unwrap().clone();
        let abstraction = BettingAbstraction::from_map(&map, &HeadsUp).unwrap();
        assert!(abstraction.limit);
        assert!(!abstraction.asymmetric);
        assert_eq!(abstraction.max_bets(0, Street::Pref), 0);
    }

    #[test]
    fn malformed_type_is_a_config_error() {
        let map = json!({ "limit": "yes" }).as_object().unwrap().clone();
        assert!(BettingAbstraction::from_map(&map, &HeadsUp).is_err());
    }

    #[test]
    fn asymmetric_abstraction_picks_role_by_target_player() {
        let map = json!({
            "asymmetric": true,
            "target_player": 0,
            "our_max_bets": [2, 1, 1, 1],
            "opp_max_bets": [6, 6, 6, 6],
        })
        .as_object()
        .unwrap()
        .clone();
        let abstraction = BettingAbstraction::from_map(&map, &HeadsUp).unwrap();
        assert_eq!(abstraction.max_bets(0, Street::Pref), 2);
        assert_eq!(abstraction.max_bets(1, Street::Pref), 6);
    }
}
