use std::fmt;
use std::future::Future;
use std::str::FromStr;
use thiserror::Error;

/// Separator between the two city names in a textual cache key
pub const KEY_SEPARATOR: char = '|';

/// Road distance between two cities
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distance {
    Km(f64),
    /// Lookup failed or no route exists
    Unreachable,
}

impl Distance {
    #[inline]
    pub fn km(&self) -> Option<f64> {
        match self {
            Distance::Km(km) => Some(*km),
            Distance::Unreachable => None,
        }
    }

    /// Distance used for threshold comparisons; unreachable is infinitely far
    #[inline]
    pub fn effective_km(&self) -> f64 {
        self.km().unwrap_or(f64::INFINITY)
    }

    #[inline]
    pub fn is_within(&self, max_km: f64) -> bool {
        match self {
            Distance::Km(km) => *km <= max_km,
            Distance::Unreachable => false,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Distance::Km(_))
    }
}

/// Unordered pair of canonical city names
///
/// The two names are stored sorted so that (A, B) and (B, A) build the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CityPairKey {
    first: String,
    second: String,
}

impl CityPairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self { first: a.to_string(), second: b.to_string() }
        } else {
            Self { first: b.to_string(), second: a.to_string() }
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }

    /// Whether the textual form parses back to this same pair
    pub fn is_persistable(&self) -> bool {
        is_valid_city_name(&self.first) && is_valid_city_name(&self.second)
    }
}

/// A city name usable in a cache key: non-empty and free of the key separator
#[inline]
pub fn is_valid_city_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains(KEY_SEPARATOR)
}

impl fmt::Display for CityPairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.first, KEY_SEPARATOR, self.second)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid city pair key: {0:?}")]
pub struct InvalidPairKey(pub String);

impl FromStr for CityPairKey {
    type Err = InvalidPairKey;

    /// Accepts either ordering of the two names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| InvalidPairKey(s.to_string()))?;
        let (a, b) = (a.trim(), b.trim());
        if !is_valid_city_name(a) || !is_valid_city_name(b) {
            return Err(InvalidPairKey(s.to_string()));
        }
        Ok(Self::new(a, b))
    }
}

/// Anything that can answer "how far apart are these two cities"
///
/// Implemented by the cached distance oracle; tests plug in fixed tables.
pub trait DistanceLookup {
    fn distance(&mut self, from: &str, to: &str) -> impl Future<Output = Distance>;
}
