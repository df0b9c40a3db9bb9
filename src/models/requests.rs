use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;
use crate::models::domain::{deserialize_optional_id, AssignmentRules, Match, Observer};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];

/// Match row as delivered by the ingestion step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(
        default,
        alias = "matchId",
        alias = "match_id",
        deserialize_with = "deserialize_optional_id"
    )]
    pub id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default, alias = "venue")]
    pub stadium: String,
}

impl MatchRecord {
    /// Convert to a domain match; an unparseable date becomes `None`
    pub fn to_match(&self) -> Match {
        Match {
            id: self
                .id
                .as_ref()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            date: self.date.as_deref().and_then(parse_match_date),
            city: self.city.trim().to_string(),
            stadium: self.stadium.trim().to_string(),
        }
    }
}

/// Parse the date formats the ingestion step is known to emit
pub fn parse_match_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.date_naive());
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}

/// Per-request overrides of the configured assignment rules
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AssignmentOptions {
    #[serde(default, alias = "allowSameDay")]
    pub allow_same_day: Option<bool>,
    #[serde(default, alias = "minDaysBetween")]
    pub min_days_between: Option<u32>,
    #[serde(default, alias = "minimizeRepeats")]
    pub minimize_repeats: Option<bool>,
    #[serde(default, alias = "useDistance")]
    pub use_distance: Option<bool>,
    #[validate(range(min = 0.0))]
    #[serde(default, alias = "maxDistanceKm")]
    pub max_distance_km: Option<f64>,
}

impl AssignmentOptions {
    pub fn apply(&self, base: AssignmentRules) -> AssignmentRules {
        AssignmentRules {
            allow_same_day: self.allow_same_day.unwrap_or(base.allow_same_day),
            min_days_between: self.min_days_between.unwrap_or(base.min_days_between),
            minimize_repeats: self.minimize_repeats.unwrap_or(base.minimize_repeats),
            use_distance: self.use_distance.unwrap_or(base.use_distance),
            max_distance_km: self.max_distance_km.unwrap_or(base.max_distance_km),
        }
    }
}

/// Request to assign observers to a list of matches
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AssignRequest {
    #[validate(length(min = 1))]
    pub matches: Vec<MatchRecord>,
    #[validate(length(min = 1))]
    pub observers: Vec<Observer>,
    #[serde(default)]
    pub options: Option<AssignmentOptions>,
}

impl AssignRequest {
    /// First observer id that is blank or appears more than once
    pub fn invalid_observer_id(&self) -> Option<String> {
        let mut seen = HashSet::new();
        self.observers
            .iter()
            .map(|o| o.id.trim())
            .find(|id| id.is_empty() || !seen.insert(*id))
            .map(str::to_string)
    }

    pub fn domain_matches(&self) -> Vec<Match> {
        self.matches.iter().map(MatchRecord::to_match).collect()
    }

    pub fn domain_observers(&self) -> Vec<Observer> {
        self.observers
            .iter()
            .map(|o| Observer {
                id: o.id.trim().to_string(),
                name: o.name.trim().to_string(),
                city: o.city.trim().to_string(),
            })
            .collect()
    }
}

/// Distance query parameters
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DistanceQuery {
    #[validate(length(min = 1))]
    pub from: String,
    #[validate(length(min = 1))]
    pub to: String,
}

/// Request to fill the distance cache for every pair of the given cities
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PrewarmRequest {
    #[validate(length(min = 2))]
    pub cities: Vec<String>,
}
