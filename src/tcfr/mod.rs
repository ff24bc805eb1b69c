//! Targeted CFR (spec.md §4.7): the contiguous-arena self-play solver.
//!
//! `arena` and `quantize` hold the low-level storage primitives; `build`
//! turns a [`crate::tree::betting_tree::BettingTree`] into a populated
//! arena; `process` is the per-iteration hot-path recursion; this module
//! ties them together into the multi-threaded self-play loop spec.md §5
//! describes: "worker threads share one arena by raw pointer and update it
//! without synchronization; a torn write is an acceptable cost, not a bug
//! to fix."

pub mod arena;
pub mod build;
pub mod process;
pub mod quantize;

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::SeedableRng;

use crate::collab::DealSource;
#[cfg(feature = "parallel")]
use crate::error::Error;
use crate::error::Result;
use crate::street::Street;
use arena::{Arena, NodeOffset};
use process::{ProcessContext, QuantizeTables, TcfrConfig};

/// wraps [`Arena`] so every worker thread can reach it through a shared
/// `&SharedArena` without a lock (spec.md §5, §9: "no per-iteration
/// allocation or synchronization is permitted in the hot path; concurrent
/// writers to the same bucket are expected and their lost updates are
/// within the solver's noise budget").
///
/// Every write inside `process` touches a `(bucket, succ)` slot with a
/// plain store, never a read-modify-write spanning more than one machine
/// word's worth of actual contention risk (a regret byte/short/int, a
/// sumprob u32): two threads racing on the same slot can only ever produce
/// one of the two written values, not a torn mix of both, because each
/// write is a single aligned store through `byteorder`. That is the
/// specific property that makes the lack of synchronization here sound
/// rather than merely convenient.
pub struct SharedArena(UnsafeCell<Arena>);

unsafe impl Sync for SharedArena {}

impl SharedArena {
    pub fn new(arena: Arena) -> Self {
        Self(UnsafeCell::new(arena))
    }

    pub fn into_inner(self) -> Arena {
        self.0.into_inner()
    }

    /// # Safety
    /// the returned `&mut Arena` aliases every other thread's view of the
    /// same arena. Callers may only use it to call `tcfr::process`, whose
    /// writes are single aligned stores (see struct docs) — never to take
    /// a long-lived borrow or perform a read-modify-write across threads.
    #[allow(clippy::mut_from_ref)]
    fn get_mut(&self) -> &mut Arena {
        unsafe { &mut *self.0.get() }
    }
}

/// static, solver-wide configuration for one training run.
pub struct TcfrSolverConfig {
    pub tcfr: TcfrConfig,
    pub quantize: QuantizeTables,
    pub num_buckets: [u32; 4],
    pub root_offset: NodeOffset,
}

/// resolves `num_threads == 0` ("auto") to the machine's parallelism, the
/// way a caller would otherwise have to query it themselves before calling
/// [`train`].
fn resolve_thread_count(num_threads: usize) -> usize {
    if num_threads != 0 {
        return num_threads;
    }
    #[cfg(feature = "parallel")]
    {
        num_cpus::get()
    }
    #[cfg(not(feature = "parallel"))]
    {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }
}

/// `RunTraining` (spec.md §5): drive `iterations` calls to `process` across
/// `num_threads` workers (`0` means "use every available core"), alternating
/// which player's regrets each iteration updates. Every `batch_size`th
/// completed iteration is reported through `on_batch` so a caller can
/// checkpoint the arena into `CFRValues`/`values::io::write` (spec.md §5's
/// "batch-boundary save").
///
/// With the `parallel` feature (the default), the self-play batch is driven
/// by a `rayon` thread pool the same way the teacher's own training loop
/// parallelizes a batch of trees
/// (`examples/krukah-robopoker/src/mccfr/blueprint.rs`'s
/// `simulations()`: `(0..CFR_BATCH_SIZE).into_par_iter()`). Without the
/// feature, a hand-rolled `std::thread::scope` work-stealing loop covers the
/// same contract so the crate still builds with a minimal dependency set.
#[cfg(feature = "parallel")]
pub fn train(
    arena: &SharedArena,
    config: &TcfrSolverConfig,
    dealer: &(dyn DealSource + Sync),
    iterations: u64,
    num_threads: usize,
    batch_size: u64,
    on_batch: &(dyn Fn(u64) + Sync),
) -> Result<()> {
    use rayon::iter::{IntoParallelIterator, ParallelIterator};

    let completed = AtomicU64::new(0);
    let next_batch = AtomicU64::new(batch_size);
    let threads = resolve_thread_count(num_threads);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|err| Error::resource(format!("failed to build the rayon worker pool: {err}")))?;

    pool.install(|| {
        (0..iterations).into_par_iter().for_each(|i| {
            let mut rng = rand::rngs::SmallRng::seed_from_u64(i ^ 0x5EED);
            run_one_iteration(arena, config, dealer, i, &mut rng);

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done >= next_batch.load(Ordering::Relaxed) {
                let boundary = next_batch.fetch_add(batch_size, Ordering::Relaxed);
                if done >= boundary {
                    on_batch(done);
                }
            }
        });
    });
    Ok(())
}

#[cfg(not(feature = "parallel"))]
pub fn train(
    arena: &SharedArena,
    config: &TcfrSolverConfig,
    dealer: &(dyn DealSource + Sync),
    iterations: u64,
    num_threads: usize,
    batch_size: u64,
    on_batch: &(dyn Fn(u64) + Sync),
) -> Result<()> {
    let completed = AtomicU64::new(0);
    let next_batch = AtomicU64::new(batch_size);
    let threads = resolve_thread_count(num_threads).max(1);

    std::thread::scope(|scope| {
        for worker in 0..threads {
            scope.spawn(move || {
                let mut rng = rand::rngs::SmallRng::seed_from_u64(worker as u64 ^ 0x5EED);
                loop {
                    let i = completed.fetch_add(1, Ordering::Relaxed);
                    if i >= iterations {
                        break;
                    }
                    run_one_iteration(arena, config, dealer, i, &mut rng);

                    let done = i + 1;
                    if done >= next_batch.load(Ordering::Relaxed) {
                        let boundary = next_batch.fetch_add(batch_size, Ordering::Relaxed);
                        if done >= boundary {
                            on_batch(done);
                        }
                    }
                }
            });
        }
    });
    Ok(())
}

fn run_one_iteration(
    arena: &SharedArena,
    config: &TcfrSolverConfig,
    dealer: &(dyn DealSource + Sync),
    iteration: u64,
    rng: &mut rand::rngs::SmallRng,
) {
    let perspective_player = (iteration % 2) as u8;
    let deal = dealer.deal(config.tcfr.max_street, rng);
    // TCFR treats every iteration as "full" unless a caller narrows
    // `full_streets`/`always_full` per street; a coarser full/sampled
    // iteration schedule would be layered on top of this call, not inside
    // it (spec.md §9 leaves the exact batching schedule open — see
    // DESIGN.md).
    let ctx = ProcessContext {
        config: &config.tcfr,
        quantize: &config.quantize,
        num_buckets: &config.num_buckets,
        deal: &deal,
        perspective_player,
        is_full_iteration: true,
    };
    let _ = process::process(arena.get_mut(), config.root_offset, &ctx, rng);
}

/// number of streets this crate ever deals with; used to size the
/// per-street config arrays threaded through `TcfrConfig`.
pub const NUM_STREETS: usize = 4;

pub fn street_array_default() -> [bool; NUM_STREETS] {
    [false; NUM_STREETS]
}

pub fn street_index(street: Street) -> usize {
    street.index()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{BucketSource, Deal};
    use crate::tcfr::arena::{RegretWidth, DEFAULT_MAX_ARENA_BYTES};
    use crate::tcfr::build::build_arena;
    use crate::tree::betting_tree::BettingTree;
    use crate::tree::node::Node;
    use petgraph::graph::DiGraph;
    use rand::RngCore;

    struct FixedBuckets;
    impl BucketSource for FixedBuckets {
        fn num_buckets(&self, _street: Street) -> u32 {
            1
        }
        fn bucket(&self, _street: Street, _board: u32, _hole_card_pair: u32) -> u32 {
            0
        }
    }

    /// player 0 acts once: call always wins the showdown, fold always
    /// loses the pot outright. Training should push call's regret to the
    /// offset floor and fold's regret strictly above it.
    struct AlwaysP0WinsDealer;
    impl DealSource for AlwaysP0WinsDealer {
        fn deal(&self, _max_street: Street, _rng: &mut dyn RngCore) -> Deal {
            Deal { board_count: 1, p0_buckets: vec![0; 4], p1_buckets: vec![0; 4], showdown_mult: 1 }
        }
    }

    fn two_choice_tree() -> BettingTree {
        let mut graph = DiGraph::new();
        let showdown = graph.add_node(Node::new_showdown_terminal(0, Street::Pref, 100, 2));
        let fold = graph.add_node(Node::new_fold_terminal(1, Street::Pref, 100, 1));
        let mut root = Node::new_nonterminal(Street::Pref, 100, vec![], true, true, 0, 2);
        root.succs = vec![showdown, fold];
        let root_id = graph.add_node(root);
        graph.add_edge(root_id, showdown, ());
        graph.add_edge(root_id, fold, ());

        let mut tree = BettingTree::new(graph, root_id, Street::Pref);
        tree.register_terminal(showdown);
        tree.register_terminal(fold);
        crate::tree::ids::assign_nonterminal_ids(&mut tree);
        tree
    }

    #[test]
    fn shared_arena_survives_concurrent_process_calls() {
        let tree = two_choice_tree();
        let tcfr = TcfrConfig::unquantized(Street::Pref);
        let layout = build_arena(&tree, &tcfr, &FixedBuckets, DEFAULT_MAX_ARENA_BYTES).unwrap();
        let root_offset = layout.root_offset;
        let shared = SharedArena::new(layout.arena);

        let config = TcfrSolverConfig {
            tcfr,
            quantize: QuantizeTables::new(crate::REGRET_CAP),
            num_buckets: [1, 1, 1, 1],
            root_offset,
        };
        let dealer = AlwaysP0WinsDealer;
        train(&shared, &config, &dealer, 200, 4, 1_000_000, &|_| {}).unwrap();

        let arena = shared.into_inner();
        let num_succs = arena.num_succs(root_offset).unwrap();
        let call_regret = arena.regret(root_offset, 0, 0, RegretWidth::Int, num_succs).unwrap();
        let fold_regret = arena.regret(root_offset, 0, 1, RegretWidth::Int, num_succs).unwrap();
        assert_eq!(call_regret, 0);
        assert!(fold_regret > 0);
    }

    #[test]
    fn on_batch_fires_once_per_batch_boundary() {
        let tree = two_choice_tree();
        let tcfr = TcfrConfig::unquantized(Street::Pref);
        let layout = build_arena(&tree, &tcfr, &FixedBuckets, DEFAULT_MAX_ARENA_BYTES).unwrap();
        let root_offset = layout.root_offset;
        let shared = SharedArena::new(layout.arena);
        let config = TcfrSolverConfig {
            tcfr,
            quantize: QuantizeTables::new(crate::REGRET_CAP),
            num_buckets: [1, 1, 1, 1],
            root_offset,
        };
        let dealer = AlwaysP0WinsDealer;
        let batches = std::sync::atomic::AtomicU64::new(0);
        train(&shared, &config, &dealer, 100, 1, 10, &|_| {
            batches.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        assert_eq!(batches.load(Ordering::Relaxed), 10);
    }
}
