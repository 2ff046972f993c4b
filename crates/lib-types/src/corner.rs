//! Process corners, edge directions and per-corner value triples.
//!
//! IBIS gives almost every quantity as a `typ min max` column triple. The
//! typical value is mandatory; minimum and maximum may be written as `NA`,
//! which is kept as `None` here rather than copied from the typical column.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Process/voltage/temperature corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corner {
    #[default]
    #[serde(alias = "typ")]
    Typical,
    #[serde(alias = "min")]
    Minimum,
    #[serde(alias = "max")]
    Maximum,
}

impl Corner {
    /// All corners in IBIS column order.
    pub const ALL: [Corner; 3] = [Corner::Typical, Corner::Minimum, Corner::Maximum];

    /// Short column label as used in IBIS headers.
    pub fn label(self) -> &'static str {
        match self {
            Self::Typical => "typ",
            Self::Minimum => "min",
            Self::Maximum => "max",
        }
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Typical => "Typical",
            Self::Minimum => "Minimum",
            Self::Maximum => "Maximum",
        };
        f.write_str(name)
    }
}

impl FromStr for Corner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "typ" | "typical" | "1" => Ok(Self::Typical),
            "min" | "minimum" | "2" => Ok(Self::Minimum),
            "max" | "maximum" | "3" => Ok(Self::Maximum),
            other => Err(format!("unknown corner '{}' (expected typ, min or max)", other)),
        }
    }
}

/// Direction of an output transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    pub const ALL: [Edge; 2] = [Edge::Rising, Edge::Falling];

    /// `(Ku, Kd)` of the steady state the edge starts from.
    #[inline]
    pub fn initial_state(self) -> (f64, f64) {
        match self {
            Self::Rising => (0.0, 1.0),
            Self::Falling => (1.0, 0.0),
        }
    }

    /// `(Ku, Kd)` of the steady state the edge settles into.
    #[inline]
    pub fn final_state(self) -> (f64, f64) {
        match self {
            Self::Rising => (1.0, 0.0),
            Self::Falling => (0.0, 1.0),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rising => "Rising",
            Self::Falling => "Falling",
        })
    }
}

impl FromStr for Edge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rising" | "rise" | "r" => Ok(Self::Rising),
            "falling" | "fall" | "f" => Ok(Self::Falling),
            other => Err(format!("unknown edge '{}' (expected rising or falling)", other)),
        }
    }
}

/// A `(typical, minimum, maximum)` value triple.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Triple<T> {
    pub typ: T,
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: Copy> Triple<T> {
    pub fn new(typ: T, min: Option<T>, max: Option<T>) -> Self {
        Self { typ, min, max }
    }

    /// Same value at every corner.
    pub fn uniform(value: T) -> Self {
        Self {
            typ: value,
            min: Some(value),
            max: Some(value),
        }
    }

    /// Value for a corner, `None` when that column was `NA`.
    #[inline]
    pub fn get(&self, corner: Corner) -> Option<T> {
        match corner {
            Corner::Typical => Some(self.typ),
            Corner::Minimum => self.min,
            Corner::Maximum => self.max,
        }
    }

    /// Value for a corner, substituting the typical value for `NA`.
    #[inline]
    pub fn resolve(&self, corner: Corner) -> T {
        self.get(corner).unwrap_or(self.typ)
    }

    pub fn map<U: Copy>(self, f: impl Fn(T) -> U) -> Triple<U> {
        Triple {
            typ: f(self.typ),
            min: self.min.map(&f),
            max: self.max.map(&f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corner_parsing() {
        assert_eq!("typ".parse::<Corner>().unwrap(), Corner::Typical);
        assert_eq!("Maximum".parse::<Corner>().unwrap(), Corner::Maximum);
        assert_eq!("2".parse::<Corner>().unwrap(), Corner::Minimum);
        assert!("fast".parse::<Corner>().is_err());
    }

    #[test]
    fn test_edge_states() {
        assert_eq!(Edge::Rising.initial_state(), Edge::Falling.final_state());
        assert_eq!(Edge::Rising.final_state(), (1.0, 0.0));
        assert_eq!("fall".parse::<Edge>().unwrap(), Edge::Falling);
    }

    #[test]
    fn test_triple_na_is_not_typical() {
        let t = Triple::new(3.3, None, Some(3.6));
        assert_eq!(t.get(Corner::Minimum), None);
        assert_eq!(t.resolve(Corner::Minimum), 3.3);
        assert_eq!(t.get(Corner::Maximum), Some(3.6));
    }

    #[test]
    fn test_corner_serde_aliases() {
        let c: Corner = serde_json::from_str("\"max\"").unwrap();
        assert_eq!(c, Corner::Maximum);
        assert_eq!(serde_json::to_string(&Corner::Typical).unwrap(), "\"typical\"");
    }
}
