//! The abstracted extensive-form betting tree (spec.md §2-§4, §6, §9).

pub mod abstraction;
pub mod betting_tree;
pub mod builder;
pub mod ids;
pub mod key;
pub mod node;
pub mod wire;

pub use abstraction::{BettingAbstraction, TreeVariant};
pub use betting_tree::{BettingTree, NamedAction};
pub use builder::BettingTreeBuilder;
pub use node::{Node, NodeId, Player};
