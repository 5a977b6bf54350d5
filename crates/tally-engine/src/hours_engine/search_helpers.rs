//! Fuzzy worker search used when an unlinked identity types a name.

use tally_core::Worker;

/// Upper bound on ranked candidates returned by a search.
pub const SEARCH_CANDIDATE_CAP: usize = 50;
/// How many candidates are presented as select buttons.
pub const SEARCH_PRESENTED_RESULTS: usize = 10;

/// Ranks workers against a free-text query.
///
/// The query is trimmed and lowercased; queries shorter than two
/// characters yield nothing. Tokens of length one are dropped. A
/// single-token query matches a substring of the name or the position;
/// a multi-token query requires every token somewhere in the name and
/// position combined. Candidates whose name starts with the first
/// token rank before the rest, alphabetically by name within each
/// group, capped at [`SEARCH_CANDIDATE_CAP`].
pub fn rank_workers(query: &str, workers: Vec<Worker>) -> Vec<Worker> {
    let normalized = query.trim().to_lowercase();
    if normalized.chars().count() < 2 {
        return Vec::new();
    }
    let tokens: Vec<&str> = normalized
        .split_whitespace()
        .filter(|token| token.chars().count() > 1)
        .collect();
    let Some(first_token) = tokens.first().copied() else {
        return Vec::new();
    };

    let mut matched: Vec<Worker> = if tokens.len() == 1 {
        workers
            .into_iter()
            .filter(|worker| {
                worker.name.to_lowercase().contains(first_token)
                    || worker.position.to_lowercase().contains(first_token)
            })
            .collect()
    } else {
        workers
            .into_iter()
            .filter(|worker| {
                let haystack =
                    format!("{} {}", worker.name, worker.position).to_lowercase();
                tokens.iter().all(|token| haystack.contains(token))
            })
            .collect()
    };

    matched.sort_by_cached_key(|worker| {
        let name = worker.name.to_lowercase();
        (!name.starts_with(first_token), name)
    });
    matched.truncate(SEARCH_CANDIDATE_CAP);
    matched
}
