use std::collections::HashMap;
use crate::models::{Observer, ObserverState};

/// Order eligible observers for selection
///
/// With `minimize_repeats` the observers are stable-sorted by how many matches they
/// already hold in this run, so ties keep their input order. Otherwise the input
/// order is returned unchanged.
pub fn rank_candidates<'a>(
    mut eligible: Vec<&'a Observer>,
    states: &HashMap<String, ObserverState>,
    minimize_repeats: bool,
) -> Vec<&'a Observer> {
    if minimize_repeats {
        // sort_by_key is stable
        eligible.sort_by_key(|observer| usage_count(states, &observer.id));
    }
    eligible
}

#[inline]
pub fn usage_count(states: &HashMap<String, ObserverState>, observer_id: &str) -> u32 {
    states.get(observer_id).map_or(0, |s| s.usage_count)
}
