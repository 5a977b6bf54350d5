#![no_main]

use libfuzzer_sys::fuzz_target;
use tally_core::Worker;
use tally_engine::hours_engine::search_helpers::{rank_workers, SEARCH_CANDIDATE_CAP};

fn roster() -> Vec<Worker> {
    [
        (1, "Ivan Petrov", "Fitter"),
        (2, "Pavel Sidorov", "Welder"),
        (3, "Anna Kuznetsova", "Crane operator"),
        (4, "Ивар Озолс", "Монтажник"),
    ]
    .into_iter()
    .map(|(id, name, position)| Worker {
        id,
        name: name.to_string(),
        position: position.to_string(),
        channel_identity: None,
        linked: false,
    })
    .collect()
}

fuzz_target!(|data: &[u8]| {
    let query = String::from_utf8_lossy(data);
    let workers = roster();
    let total = workers.len();

    let ranked = rank_workers(&query, workers);

    assert!(ranked.len() <= total);
    assert!(ranked.len() <= SEARCH_CANDIDATE_CAP);
    let mut ids: Vec<i64> = ranked.iter().map(|worker| worker.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), ranked.len(), "ranked workers must be unique");
    if query.trim().to_lowercase().chars().count() < 2 {
        assert!(ranked.is_empty(), "sub-two-char queries never match");
    }
});
