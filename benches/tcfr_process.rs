//! Benchmarks the TCFR hot path (spec.md §4.7) the way the teacher
//! benchmarks its own CFR inner loop
//! (`examples/krukah-robopoker/benches/benchmarks.rs`'s `solving_cfr_rps`):
//! one `criterion::bench_function` per traversal shape, run with the same
//! `without_plots()`/`sample_size(10)` configuration.

use abstracted_cfr::collab::{BucketSource, Deal};
use abstracted_cfr::street::Street;
use abstracted_cfr::tcfr::arena::DEFAULT_MAX_ARENA_BYTES;
use abstracted_cfr::tcfr::build::build_arena;
use abstracted_cfr::tcfr::process::{process, ProcessContext, QuantizeTables, TcfrConfig};
use abstracted_cfr::tree::betting_tree::BettingTree;
use abstracted_cfr::tree::node::Node;
use abstracted_cfr::REGRET_CAP;
use petgraph::graph::DiGraph;
use rand::rngs::SmallRng;
use rand::SeedableRng;

struct FixedBuckets(u32);

impl BucketSource for FixedBuckets {
    fn num_buckets(&self, _street: Street) -> u32 {
        self.0
    }
    fn bucket(&self, _street: Street, _board: u32, _hole_card_pair: u32) -> u32 {
        0
    }
}

/// root: player 0 chooses between calling to showdown or folding. The
/// smallest possible nonterminal, just enough to exercise one
/// `process_our_turn` + one terminal evaluation per call.
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
    abstracted_cfr::tree::ids::assign_nonterminal_ids(&mut tree);
    tree
}

fn processing_a_two_choice_node(c: &mut criterion::Criterion) {
    let tree = two_choice_tree();
    let config = TcfrConfig::unquantized(Street::Pref);
    let buckets = FixedBuckets(2);
    let mut layout = build_arena(&tree, &config, &buckets, DEFAULT_MAX_ARENA_BYTES).expect("arena builds");

    let tables = QuantizeTables::new(REGRET_CAP);
    let num_buckets = [2, 2, 2, 2];
    let deal = Deal { board_count: 1, p0_buckets: vec![0, 0, 0, 0], p1_buckets: vec![0, 0, 0, 0], showdown_mult: 1 };
    let ctx = ProcessContext {
        config: &config,
        quantize: &tables,
        num_buckets: &num_buckets,
        deal: &deal,
        perspective_player: 0,
        is_full_iteration: true,
    };
    let mut rng = SmallRng::seed_from_u64(11);

    c.bench_function("process() over a two-choice nonterminal", |b| {
        b.iter(|| process(&mut layout.arena, layout.root_offset, &ctx, &mut rng).unwrap())
    });
}

fn processing_the_opponent_turn(c: &mut criterion::Criterion) {
    let tree = two_choice_tree();
    let config = TcfrConfig::unquantized(Street::Pref);
    let buckets = FixedBuckets(2);
    let mut layout = build_arena(&tree, &config, &buckets, DEFAULT_MAX_ARENA_BYTES).expect("arena builds");

    let tables = QuantizeTables::new(REGRET_CAP);
    let num_buckets = [2, 2, 2, 2];
    let deal = Deal { board_count: 1, p0_buckets: vec![0, 0, 0, 0], p1_buckets: vec![0, 0, 0, 0], showdown_mult: 1 };
    let ctx = ProcessContext {
        config: &config,
        quantize: &tables,
        num_buckets: &num_buckets,
        deal: &deal,
        perspective_player: 1,
        is_full_iteration: true,
    };
    let mut rng = SmallRng::seed_from_u64(13);

    c.bench_function("process() from the opponent's perspective", |b| {
        b.iter(|| process(&mut layout.arena, layout.root_offset, &ctx, &mut rng).unwrap())
    });
}

criterion::criterion_group! {
    name = benches;
    config = criterion::Criterion::default()
        .without_plots()
        .noise_threshold(3.0)
        .significance_level(0.01)
        .sample_size(10)
        .measurement_time(std::time::Duration::from_secs(1));
    targets = processing_a_two_choice_node, processing_the_opponent_turn,
}
criterion::criterion_main!(benches);
