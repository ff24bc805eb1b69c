//! Betting-tree abstraction and CFR solver core for two-player (and, in a
//! limited form, multi-player) no-limit and limit Texas hold'em.
//!
//! # Submodules
//!
//! - `collab`: interfaces to external collaborators this crate consumes as
//!   pure lookup services (card abstraction, hand values, board tables).
//! - `tree`: the abstracted extensive-form betting tree — configuration,
//!   node representation, builder, nonterminal numbering, wire format.
//! - `values`: the sparse per-(player, street, nonterminal) regret/sumprob
//!   table (`CFRValues`), its I/O, merge semantics, and the compressed
//!   regret codec.
//! - `tcfr`: the contiguous-arena Targeted CFR self-play solver.
//! - `ecfr`: the simpler external-sampling double-precision solver.
//! - `restructure`: offline quantization of trained values to fixed-width
//!   encodings.
//! - `serve`: the random-access runtime strategy reader.
//!
//! This is a library, not a CLI: every fallible operation returns
//! [`error::Result`]; nothing in this crate calls `std::process::exit`.

pub mod collab;
pub mod ecfr;
pub mod error;
pub mod restructure;
pub mod serve;
pub mod street;
pub mod tcfr;
pub mod tree;
pub mod values;

/// dimensional analysis types, mirrored from the teacher crate's top-level
/// type aliases (`Chips`, `Utility`, `Probability`) so every module speaks
/// the same vocabulary instead of bare `i32`/`f32`.
pub type Chips = i32;
pub type Probability = f32;
pub type Utility = f32;

/// number of players this core supports directly. Multi-player betting
/// (spec.md §4.3) generalizes the tree builder beyond 2, but the solvers
/// (TCFR/ECFR) are specified for heads-up play.
pub const MAX_PLAYERS: usize = 2;

/// regret-matching bounds used throughout `tcfr`/`ecfr` (spec.md §8,
/// confirmed against `examples/original_source/src/tcfr.cpp`).
pub const REGRET_CAP: i64 = 2_000_000_000;
pub const SUMPROB_CEILING_DEFAULT: u32 = 4_000_000_000;

/// trait for generating arbitrary instances, used only by tests — mirrored
/// from the teacher's `crate::Arbitrary`.
pub trait Arbitrary {
    fn random() -> Self;
}

/// Initializes terminal + file logging, matching the teacher's
/// `crate::init()`. Never called implicitly by library code; a host binary
/// or test harness opts in.
pub fn init_logging(log_dir: &str) -> error::Result<()> {
    use std::time::SystemTime;
    use std::time::UNIX_EPOCH;

    std::fs::create_dir_all(log_dir).map_err(error::Error::Io)?;
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| error::Error::config("system clock before epoch"))?
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("{log_dir}/{time}.log")).map_err(error::Error::Io)?,
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file])
        .map_err(|e| error::Error::config(e.to_string()))
}

/// progress bar, matching the teacher's `crate::progress(n)`.
pub fn progress(n: usize) -> indicatif::ProgressBar {
    let tick = std::time::Duration::from_secs(5);
    let style = "{spinner:.cyan} {elapsed} ~ {percent:>3}% {wide_bar:.cyan} {pos}/{len}";
    let style = indicatif::ProgressStyle::with_template(style).expect("valid template");
    let bar = indicatif::ProgressBar::new(n as u64);
    bar.set_style(style);
    bar.enable_steady_tick(tick);
    bar
}
