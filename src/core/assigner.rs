use std::collections::HashMap;
use crate::core::{
    distance::DistanceLookup,
    filters::is_eligible,
    ranking::{rank_candidates, usage_count},
};
use crate::models::{Assignment, AssignmentRules, Match, Observer, ObserverState, UnassignedReason};

/// Result of one assignment run
#[derive(Debug, Clone)]
pub struct AssignmentRun {
    /// One entry per input match, in input order
    pub assignments: Vec<Assignment>,
    pub states: HashMap<String, ObserverState>,
}

impl AssignmentRun {
    pub fn assigned_count(&self) -> usize {
        self.assignments.iter().filter(|a| a.is_assigned()).count()
    }

    pub fn unassigned_count(&self) -> usize {
        self.assignments.len() - self.assigned_count()
    }

    pub fn usage_count(&self, observer_id: &str) -> u32 {
        usage_count(&self.states, observer_id)
    }
}

/// Greedy first-fit assignment of observers to matches
///
/// # Pipeline per match
/// 1. Validate the record (id and date present)
/// 2. Filter the whole pool through the eligibility rules
/// 3. Rank survivors by load when repeats are minimized
/// 4. Commit the head of the ranking
///
/// Matches are processed strictly in input order with no look-ahead or backtracking,
/// so an early match may take the only observer a later match could have used.
#[derive(Debug, Clone)]
pub struct Assigner {
    rules: AssignmentRules,
}

impl Assigner {
    pub fn new(rules: AssignmentRules) -> Self {
        Self { rules }
    }

    pub fn with_default_rules() -> Self {
        Self {
            rules: AssignmentRules::default(),
        }
    }

    pub fn rules(&self) -> &AssignmentRules {
        &self.rules
    }

    /// Assign observers to `matches`, starting from a cold observer state
    pub async fn assign<D: DistanceLookup>(
        &self,
        matches: &[Match],
        observers: &[Observer],
        distances: &mut D,
    ) -> AssignmentRun {
        let mut states: HashMap<String, ObserverState> = observers
            .iter()
            .map(|o| (o.id.clone(), ObserverState::default()))
            .collect();

        let mut assignments = Vec::with_capacity(matches.len());

        for m in matches {
            let assignment = self.assign_one(m, observers, &mut states, distances).await;
            assignments.push(assignment);
        }

        let run = AssignmentRun { assignments, states };

        tracing::info!(
            "Assignment run finished: {} matches, {} assigned, {} unassigned, {} observers",
            matches.len(),
            run.assigned_count(),
            run.unassigned_count(),
            observers.len()
        );

        run
    }

    async fn assign_one<D: DistanceLookup>(
        &self,
        m: &Match,
        observers: &[Observer],
        states: &mut HashMap<String, ObserverState>,
        distances: &mut D,
    ) -> Assignment {
        let (match_id, date) = match (&m.id, m.date) {
            (Some(id), Some(date)) => (id.as_str(), date),
            _ => {
                tracing::debug!("Skipping invalid match record: id={:?}, date={:?}", m.id, m.date);
                return Assignment::unassigned(m.id.clone(), UnassignedReason::InvalidMatchRecord);
            }
        };

        let cold = ObserverState::default();
        let mut eligible = Vec::new();
        for observer in observers {
            let state = states.get(&observer.id).unwrap_or(&cold);
            if is_eligible(m, observer, state, &self.rules, distances).await {
                eligible.push(observer);
            }
        }

        let ranked = rank_candidates(eligible, states, self.rules.minimize_repeats);

        let Some(chosen) = ranked.first() else {
            tracing::debug!("No eligible observer for match {} on {} in {}", match_id, date, m.city);
            return Assignment::unassigned(Some(match_id.to_string()), UnassignedReason::NoEligibleObserver);
        };

        states
            .entry(chosen.id.clone())
            .or_default()
            .commit(date, &m.stadium);

        tracing::debug!(
            "Match {} on {} assigned to {} ({} candidates)",
            match_id,
            date,
            chosen.id,
            ranked.len()
        );

        Assignment::assigned(match_id, &chosen.id)
    }
}

impl Default for Assigner {
    fn default() -> Self {
        Self::with_default_rules()
    }
}
