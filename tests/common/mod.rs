//! Synthetic libraries and traces shared by the integration tests.

#![allow(dead_code)]

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use redbench::{LibraryEntry, QueryType, Readset, Trace, UserKey, UserQueryRecord};

/// IMDb-shaped library: join counts 6..=11, a few templates per join
/// count, uneven template sizes.
pub fn generate_library(seed: u64) -> Vec<LibraryEntry> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut entries = Vec::new();
    for num_joins in 6..=11u32 {
        let templates = rng.gen_range(2..5);
        for t in 0..templates {
            let template = format!("{num_joins}{}", (b'a' + t as u8) as char);
            for i in 0..rng.gen_range(1..6) {
                entries.push(LibraryEntry {
                    filepath: format!("imdb/ceb/{template}/{i}.sql"),
                    num_joins,
                    template: template.clone(),
                });
            }
        }
    }
    entries
}

/// Timeline drawn from `distinct` query shapes; each shape has a fixed
/// readset and join count, so repeats are exact repeats.
pub fn generate_timeline(seed: u64, len: usize, distinct: usize) -> Vec<UserQueryRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let shapes: Vec<(Readset, u32)> = (0..distinct)
        .map(|_| {
            let tables = (0..rng.gen_range(1..4)).map(|_| rng.gen_range(1..12)).collect();
            (Readset::new(tables), rng.gen_range(1..9))
        })
        .collect();

    let mut timeline: Vec<UserQueryRecord> = (0..len)
        .map(|i| {
            let shape = rng.gen_range(0..distinct);
            let (readset, num_joins) = shapes[shape].clone();
            UserQueryRecord {
                query_hash: format!("fp{shape}#{num_joins}"),
                readset,
                num_joins,
                query_type: QueryType::Select,
                query_id: i as u64,
            }
        })
        .collect();

    // Pin the join-count range to [1, 8] so every user is eligible
    timeline[0].num_joins = 1;
    timeline[0].query_hash = "pin-min".to_string();
    timeline[1].num_joins = 8;
    timeline[1].query_hash = "pin-max".to_string();
    timeline
}

/// Users spread over several repetition-rate groups.
pub fn generate_trace(seed: u64, users: u64) -> Trace {
    Trace::from_timelines((0..users).map(|u| {
        let len = 150;
        let distinct = 5 + (u as usize * 17) % 140;
        (
            UserKey::new(100 + u, u % 3),
            generate_timeline(seed.wrapping_add(u), len, distinct),
        )
    }))
}
