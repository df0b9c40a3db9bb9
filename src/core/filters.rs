use chrono::NaiveDate;
use crate::core::distance::DistanceLookup;
use crate::models::{AssignmentRules, Match, Observer, ObserverState};

/// Check the rest-period rule against every prior assignment
///
/// An observer with no assignment in this run always passes.
#[inline]
pub fn passes_rest_period(date: NaiveDate, state: &ObserverState, min_days_between: u32) -> bool {
    let min_days = i64::from(min_days_between);
    let gap_ok = |prior: NaiveDate| (date - prior).num_days().abs() >= min_days;

    state.last_assigned_date.map_or(true, gap_ok)
        && state.history.iter().all(|slot| gap_ok(slot.date))
}

/// Check the same-day policy
///
/// With same-day reuse disallowed, an observer already assigned on this date is only
/// eligible again for the same stadium.
#[inline]
pub fn passes_same_day_policy(
    date: NaiveDate,
    stadium: &str,
    state: &ObserverState,
    allow_same_day: bool,
) -> bool {
    if allow_same_day {
        return true;
    }

    let last_ok = match (state.last_assigned_date, state.last_assigned_stadium.as_deref()) {
        (Some(last_date), last_stadium) if last_date == date => last_stadium == Some(stadium),
        _ => true,
    };

    last_ok
        && state
            .history
            .iter()
            .filter(|slot| slot.date == date)
            .all(|slot| slot.stadium == stadium)
}

/// Exact-city locality, the cheap path
#[inline]
pub fn is_same_city(match_city: &str, observer_city: &str) -> bool {
    let observer_city = observer_city.trim();
    !observer_city.is_empty() && match_city.trim() == observer_city
}

/// Check the locality rule, consulting the distance lookup only when needed
///
/// A failed lookup comes back as unreachable and never passes.
pub async fn passes_locality<D: DistanceLookup>(
    m: &Match,
    observer: &Observer,
    rules: &AssignmentRules,
    distances: &mut D,
) -> bool {
    if observer.city.trim().is_empty() {
        return false;
    }

    if is_same_city(&m.city, &observer.city) {
        return true;
    }

    if !rules.use_distance {
        return false;
    }

    let distance = distances.distance(&m.city, &observer.city).await;
    let within = distance.is_within(rules.max_distance_km);

    tracing::trace!(
        "Locality {} <-> {}: {:?} (max {} km) => {}",
        m.city,
        observer.city,
        distance,
        rules.max_distance_km,
        within
    );

    within
}

/// Decide whether `observer` may take `m` given its state in this run
///
/// Rules are checked cheapest first so the distance lookup only runs for observers
/// that already satisfy the date rules. Matches without a date are never eligible.
pub async fn is_eligible<D: DistanceLookup>(
    m: &Match,
    observer: &Observer,
    state: &ObserverState,
    rules: &AssignmentRules,
    distances: &mut D,
) -> bool {
    let Some(date) = m.date else {
        return false;
    };

    if !passes_rest_period(date, state, rules.min_days_between) {
        return false;
    }

    if !passes_same_day_policy(date, &m.stadium, state, rules.allow_same_day) {
        return false;
    }

    passes_locality(m, observer, rules, distances).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::distance::Distance;
    use std::collections::HashMap;

    struct FixedDistances {
        table: HashMap<(String, String), Distance>,
        calls: usize,
    }

    impl FixedDistances {
        fn new(entries: &[(&str, &str, Distance)]) -> Self {
            let mut table = HashMap::new();
            for (a, b, d) in entries {
                table.insert((a.to_string(), b.to_string()), *d);
                table.insert((b.to_string(), a.to_string()), *d);
            }
            Self { table, calls: 0 }
        }
    }

    impl DistanceLookup for FixedDistances {
        async fn distance(&mut self, from: &str, to: &str) -> Distance {
            self.calls += 1;
            self.table
                .get(&(from.to_string(), to.to_string()))
                .copied()
                .unwrap_or(Distance::Unreachable)
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, day).unwrap()
    }

    fn state_with(day: u32, stadium: &str) -> ObserverState {
        let mut state = ObserverState::default();
        state.commit(date(day), stadium);
        state
    }

    #[test]
    fn test_rest_period() {
        let fresh = ObserverState::default();
        assert!(passes_rest_period(date(5), &fresh, 2));

        let state = state_with(5, "A");
        assert!(passes_rest_period(date(7), &state, 2));
        assert!(passes_rest_period(date(3), &state, 2));
        assert!(!passes_rest_period(date(6), &state, 2));
        assert!(!passes_rest_period(date(4), &state, 2));
        assert!(passes_rest_period(date(5), &state, 0));
    }

    #[test]
    fn test_rest_period_checks_full_history() {
        let mut state = state_with(10, "A");
        state.commit(date(2), "B");

        // Far from the last assignment, but too close to the first
        assert!(!passes_rest_period(date(11), &state, 2));
    }

    #[test]
    fn test_same_day_same_stadium_allowed() {
        let state = state_with(5, "King Fahd");

        assert!(passes_same_day_policy(date(5), "King Fahd", &state, false));
        assert!(!passes_same_day_policy(date(5), "Prince Faisal", &state, false));
        assert!(passes_same_day_policy(date(5), "Prince Faisal", &state, true));
        assert!(passes_same_day_policy(date(6), "Prince Faisal", &state, false));
    }

    #[tokio::test]
    async fn test_same_city_skips_lookup() {
        let m = Match::new("M1", date(5), "Riyadh", "King Fahd");
        let observer = Observer::new("O1", "Observer", " Riyadh ");
        let rules = AssignmentRules { use_distance: true, ..Default::default() };
        let mut distances = FixedDistances::new(&[]);

        assert!(is_eligible(&m, &observer, &ObserverState::default(), &rules, &mut distances).await);
        assert_eq!(distances.calls, 0);
    }

    #[tokio::test]
    async fn test_distance_locality() {
        let m = Match::new("M1", date(5), "Riyadh", "King Fahd");
        let near = Observer::new("O1", "Near", "Kharj");
        let far = Observer::new("O2", "Far", "Qassim");
        let unknown = Observer::new("O3", "Unknown", "Atlantis");
        let rules = AssignmentRules {
            use_distance: true,
            max_distance_km: 100.0,
            ..Default::default()
        };
        let mut distances = FixedDistances::new(&[
            ("Riyadh", "Kharj", Distance::Km(80.0)),
            ("Riyadh", "Qassim", Distance::Km(150.0)),
        ]);
        let state = ObserverState::default();

        assert!(is_eligible(&m, &near, &state, &rules, &mut distances).await);
        assert!(!is_eligible(&m, &far, &state, &rules, &mut distances).await);
        assert!(!is_eligible(&m, &unknown, &state, &rules, &mut distances).await);
    }

    #[tokio::test]
    async fn test_exact_city_only_when_distance_disabled() {
        let m = Match::new("M1", date(5), "Riyadh", "King Fahd");
        let observer = Observer::new("O1", "Near", "Kharj");
        let rules = AssignmentRules::default();
        let mut distances = FixedDistances::new(&[("Riyadh", "Kharj", Distance::Km(80.0))]);

        assert!(!is_eligible(&m, &observer, &ObserverState::default(), &rules, &mut distances).await);
        assert_eq!(distances.calls, 0);
    }

    #[tokio::test]
    async fn test_blank_observer_city_never_eligible() {
        let m = Match::new("M1", date(5), "", "King Fahd");
        let observer = Observer::new("O1", "Nowhere", "  ");
        let mut distances = FixedDistances::new(&[]);

        assert!(!is_eligible(&m, &observer, &ObserverState::default(), &AssignmentRules::default(), &mut distances).await);
    }

    #[tokio::test]
    async fn test_date_rules_checked_before_lookup() {
        let m = Match::new("M1", date(5), "Riyadh", "King Fahd");
        let observer = Observer::new("O1", "Near", "Kharj");
        let rules = AssignmentRules { use_distance: true, ..Default::default() };
        let mut distances = FixedDistances::new(&[("Riyadh", "Kharj", Distance::Km(80.0))]);

        assert!(!is_eligible(&m, &observer, &state_with(4, "X"), &rules, &mut distances).await);
        assert_eq!(distances.calls, 0);
    }
}
