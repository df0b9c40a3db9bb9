use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// A scheduled fixture that needs exactly one observer
///
/// `id` and `date` are optional because the ingestion step hands over rows as-is;
/// the assignment loop rejects records missing either one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub city: String,
    #[serde(default)]
    pub stadium: String,
}

impl Match {
    pub fn new(id: &str, date: NaiveDate, city: &str, stadium: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            date: Some(date),
            city: city.to_string(),
            stadium: stadium.to_string(),
        }
    }
}

/// Record id as found in spreadsheet exports: text or a plain number
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
    Float(f64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Int(n) => n.to_string(),
            // Sheets often export integer ids as 101.0
            RawId::Float(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", n as i64),
            RawId::Float(n) => n.to_string(),
        }
    }
}

/// Deserialize an id given as a JSON string or number
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

/// Like [`deserialize_id`], with `null` meaning no id
pub fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

/// A match commissioner who can be assigned to fixtures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observer {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub city: String,
}

impl Observer {
    pub fn new(id: &str, name: &str, city: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            city: city.to_string(),
        }
    }
}

/// A committed (date, stadium) slot in an observer's schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentSlot {
    pub date: NaiveDate,
    pub stadium: String,
}

/// Per-observer mutable record for the duration of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverState {
    pub usage_count: u32,
    pub last_assigned_date: Option<NaiveDate>,
    pub last_assigned_stadium: Option<String>,
    pub history: Vec<AssignmentSlot>,
}

impl ObserverState {
    /// Record a committed assignment
    pub fn commit(&mut self, date: NaiveDate, stadium: &str) {
        self.usage_count += 1;
        self.last_assigned_date = Some(date);
        self.last_assigned_stadium = Some(stadium.to_string());
        self.history.push(AssignmentSlot {
            date,
            stadium: stadium.to_string(),
        });
    }
}

/// Why a match ended up without an observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnassignedReason {
    InvalidMatchRecord,
    NoEligibleObserver,
}

impl UnassignedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnassignedReason::InvalidMatchRecord => "invalid_match_record",
            UnassignedReason::NoEligibleObserver => "no_eligible_observer",
        }
    }
}

impl std::fmt::Display for UnassignedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    Assigned { observer_id: String },
    Unassigned { reason: UnassignedReason },
}

/// Result of processing one match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub match_id: Option<String>,
    #[serde(flatten)]
    pub outcome: AssignmentOutcome,
}

impl Assignment {
    pub fn assigned(match_id: &str, observer_id: &str) -> Self {
        Self {
            match_id: Some(match_id.to_string()),
            outcome: AssignmentOutcome::Assigned {
                observer_id: observer_id.to_string(),
            },
        }
    }

    pub fn unassigned(match_id: Option<String>, reason: UnassignedReason) -> Self {
        Self {
            match_id,
            outcome: AssignmentOutcome::Unassigned { reason },
        }
    }

    pub fn observer_id(&self) -> Option<&str> {
        match &self.outcome {
            AssignmentOutcome::Assigned { observer_id } => Some(observer_id),
            AssignmentOutcome::Unassigned { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<UnassignedReason> {
        match &self.outcome {
            AssignmentOutcome::Assigned { .. } => None,
            AssignmentOutcome::Unassigned { reason } => Some(*reason),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.observer_id().is_some()
    }
}

/// Eligibility and ranking rules for one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignmentRules {
    pub allow_same_day: bool,
    pub min_days_between: u32,
    pub minimize_repeats: bool,
    pub use_distance: bool,
    pub max_distance_km: f64,
}

impl Default for AssignmentRules {
    fn default() -> Self {
        Self {
            allow_same_day: true,
            min_days_between: 2,
            minimize_repeats: true,
            use_distance: false,
            max_distance_km: 200.0,
        }
    }
}
