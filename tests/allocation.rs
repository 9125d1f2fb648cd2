//! Allocation Properties - invariants of the per-user allocator.
//!
//! Randomized timelines from a seeded ChaCha8Rng, checked against the
//! repetition, pool and binding guarantees of the allocator.

mod common;

use std::collections::{HashMap, HashSet};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use redbench::{
    Allocation, Allocator, DecisionPath, FallbackPath, JoinRange, LibraryEntry, LibraryIndex,
    QueryType, Readset, UserQueryRecord,
};

const LIB_RANGE: JoinRange = JoinRange::new(6, 11);

fn entry(filepath: &str, num_joins: u32, template: &str) -> LibraryEntry {
    LibraryEntry {
        filepath: filepath.to_string(),
        num_joins,
        template: template.to_string(),
    }
}

fn select(hash: &str, tables: &[u64], num_joins: u32, query_id: u64) -> UserQueryRecord {
    UserQueryRecord {
        query_hash: hash.to_string(),
        readset: Readset::new(tables.to_vec()),
        num_joins,
        query_type: QueryType::Select,
        query_id,
    }
}

fn run(
    library: &LibraryIndex,
    timeline: &[UserQueryRecord],
    user: JoinRange,
    seed: u64,
) -> Vec<Allocation> {
    Allocator::new(library, user, LIB_RANGE, ChaCha8Rng::seed_from_u64(seed))
        .unwrap()
        .allocate(timeline)
        .unwrap()
}

// ============================================================================
// Repetition
// ============================================================================

#[test]
fn test_equal_hashes_share_an_instance() {
    let library = LibraryIndex::build(common::generate_library(1)).unwrap();
    for seed in 0..20 {
        let timeline = common::generate_timeline(seed, 600, 80);
        let allocations = run(&library, &timeline, JoinRange::new(1, 8), seed);

        let mut seen: HashMap<&str, u32> = HashMap::new();
        for (record, a) in timeline.iter().zip(&allocations) {
            let first = *seen.entry(record.query_hash.as_str()).or_insert(a.instance);
            assert_eq!(first, a.instance, "hash {} remapped", record.query_hash);
        }
    }
}

#[test]
fn test_repeats_are_cache_hits() {
    let library = LibraryIndex::build(common::generate_library(1)).unwrap();
    let timeline = common::generate_timeline(4, 300, 30);
    let allocations = run(&library, &timeline, JoinRange::new(1, 8), 0);

    let mut seen = HashSet::new();
    for (record, a) in timeline.iter().zip(&allocations) {
        let repeat = !seen.insert(record.query_hash.clone());
        assert_eq!(repeat, a.path == DecisionPath::CacheHit);
    }
}

// ============================================================================
// Pools
// ============================================================================

#[test]
fn test_pooled_instances_never_handed_out_twice() {
    let library = LibraryIndex::build(common::generate_library(2)).unwrap();
    for seed in 0..20 {
        let timeline = common::generate_timeline(seed + 100, 800, 200);
        let allocations = run(&library, &timeline, JoinRange::new(1, 8), seed);

        let mut pooled = HashSet::new();
        for a in allocations
            .iter()
            .filter(|a| a.path != DecisionPath::CacheHit && !a.path.is_unconstrained())
        {
            assert!(
                pooled.insert(a.instance),
                "instance {} popped twice ({})",
                library.instance_id(a.instance),
                a.path
            );
        }
    }
}

#[test]
fn test_every_select_gets_an_instance_with_matching_joins() {
    let library = LibraryIndex::build(common::generate_library(5)).unwrap();
    let timeline = common::generate_timeline(9, 1_000, 500);
    let allocations = run(&library, &timeline, JoinRange::new(1, 8), 3);

    assert_eq!(allocations.len(), timeline.len());
    for a in &allocations {
        assert!(LIB_RANGE.contains(a.normalized_joins));
        // A bound readset keeps drawing from its template whatever the
        // record's join count; every other path selects by join count.
        if !matches!(a.path, DecisionPath::CacheHit | DecisionPath::BoundPoolHit) {
            assert_eq!(library.instance(a.instance).num_joins, a.normalized_joins);
        }
    }
}

// ============================================================================
// Bindings
// ============================================================================

#[test]
fn test_greedy_binding_picks_largest_pool() {
    let library = LibraryIndex::build(vec![
        entry("t2/1", 6, "t2"),
        entry("t1/1", 6, "t1"),
        entry("t1/2", 6, "t1"),
        entry("t1/3", 6, "t1"),
        entry("x/1", 11, "x"),
    ])
    .unwrap();

    let timeline = [select("q", &[4, 2], 3, 1), select("z", &[9], 5, 2)];
    let allocations = run(&library, &timeline, JoinRange::new(3, 5), 0);
    assert_eq!(allocations[0].path, DecisionPath::NewBinding);
    assert_eq!(
        library.instance(allocations[0].instance).template,
        library.template_index("t1").unwrap()
    );
}

#[test]
fn test_distinct_readsets_get_distinct_templates() {
    let entries: Vec<LibraryEntry> = (0..5)
        .flat_map(|t| (0..4).map(move |i| entry(&format!("t{t}/{i}"), 6, &format!("t{t}"))))
        .chain([entry("top/1", 11, "top")])
        .collect();
    let library = LibraryIndex::build(entries).unwrap();

    let timeline: Vec<UserQueryRecord> = (0..5)
        .map(|i| select(&format!("h{i}"), &[i], 1, i))
        .chain([select("max", &[99], 2, 99)])
        .collect();
    let allocations = run(&library, &timeline, JoinRange::new(1, 2), 0);

    let templates: HashSet<u32> = allocations[..5]
        .iter()
        .map(|a| {
            assert_eq!(a.path, DecisionPath::NewBinding);
            library.instance(a.instance).template
        })
        .collect();
    assert_eq!(templates.len(), 5);
}

#[test]
fn test_binding_retires_template_under_every_join_count() {
    // "wide" is listed under 6 and 7 and has the largest pool under 6
    let library = LibraryIndex::build(vec![
        entry("wide/1", 6, "wide"),
        entry("wide/2", 6, "wide"),
        entry("wide/3", 7, "wide"),
        entry("narrow/1", 7, "narrow"),
        entry("top/1", 11, "top"),
    ])
    .unwrap();
    let wide = library.template_index("wide").unwrap();
    let narrow = library.template_index("narrow").unwrap();

    let mut allocator =
        Allocator::new(&library, JoinRange::new(0, 5), LIB_RANGE, ChaCha8Rng::seed_from_u64(0))
            .unwrap();
    // raw 0 -> 6 joins
    let first = allocator.allocate_one(&select("a", &[1], 0, 1)).unwrap().unwrap();
    assert_eq!(library.instance(first.instance).template, wide);

    let state = allocator.state();
    assert!(!state.is_unmapped(wide));
    assert!(state.unmapped_templates(6).next().is_none());
    assert_eq!(state.unmapped_templates(7).collect::<Vec<_>>(), vec![narrow]);

    // raw 1 -> 7 joins; "narrow" is the only unbound candidate
    let second = allocator.allocate_one(&select("b", &[2], 1, 2)).unwrap().unwrap();
    assert_eq!(second.path, DecisionPath::NewBinding);
    assert_eq!(library.instance(second.instance).template, narrow);
}

#[test]
fn test_exhausted_binding_reuses_other_bound_template() {
    let library = LibraryIndex::build(vec![
        entry("a/1", 6, "a"),
        entry("a/2", 6, "a"),
        entry("b/1", 6, "b"),
        entry("top/1", 11, "top"),
    ])
    .unwrap();

    let timeline = vec![
        select("1", &[1], 1, 1), // [1] -> a
        select("2", &[2], 1, 2), // [2] -> b
        select("3", &[2], 1, 3), // b empty, reuse a
        select("4", &[2], 1, 4), // everything empty
        select("5", &[1], 2, 5),
    ];
    let allocations = run(&library, &timeline, JoinRange::new(1, 2), 0);
    let paths: Vec<DecisionPath> = allocations.iter().map(|a| a.path).collect();
    assert_eq!(
        paths,
        vec![
            DecisionPath::NewBinding,
            DecisionPath::NewBinding,
            DecisionPath::BoundPoolExhausted(FallbackPath::ReuseBoundTemplate),
            DecisionPath::BoundPoolExhausted(FallbackPath::UnconstrainedRandom),
            DecisionPath::BoundPoolExhausted(FallbackPath::UnconstrainedRandom),
        ]
    );
    assert_eq!(library.instance_id(allocations[2].instance), "a/1");
}

// ============================================================================
// Normalization
// ============================================================================

#[test]
fn test_normalized_sequence() {
    let library = LibraryIndex::build(common::generate_library(1)).unwrap();
    let timeline = vec![
        select("x", &[1], 3, 1),
        select("y", &[2], 3, 2),
        select("z", &[3], 5, 3),
    ];
    let allocations = run(&library, &timeline, JoinRange::new(3, 5), 0);
    let normalized: Vec<u32> = allocations.iter().map(|a| a.normalized_joins).collect();
    let raw: Vec<u32> = allocations.iter().map(|a| a.raw_joins).collect();
    assert_eq!(normalized, vec![6, 6, 11]);
    assert_eq!(raw, vec![3, 3, 5]);
}

#[test]
fn test_recorder_matches_paths() {
    let library = LibraryIndex::build(common::generate_library(6)).unwrap();
    let timeline = common::generate_timeline(12, 700, 150);
    let mut allocator =
        Allocator::new(&library, JoinRange::new(1, 8), LIB_RANGE, ChaCha8Rng::seed_from_u64(1))
            .unwrap();
    let allocations = allocator.allocate(&timeline).unwrap();

    let recorder = allocator.recorder();
    assert_eq!(recorder.num_queries(), allocations.len() as u64);
    for path in DecisionPath::COUNTED {
        let expected = allocations.iter().filter(|a| a.path == path).count() as u64;
        assert_eq!(recorder.count(path), expected, "{}", path);
    }
}
