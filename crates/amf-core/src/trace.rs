//! Call tracing verbosity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How much of each request the dispatcher traces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TraceLevel {
    /// No call tracing.
    #[default]
    Off,
    /// Log received call descriptors.
    Calls,
    /// Log received call descriptors and the produced results.
    Full,
}

impl TraceLevel {
    /// Whether received calls are traced.
    pub fn traces_calls(self) -> bool {
        self >= Self::Calls
    }

    /// Whether produced results are traced.
    pub fn traces_results(self) -> bool {
        self == Self::Full
    }

    /// Canonical name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Calls => "calls",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unrecognised trace level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTraceLevelError(String);

impl fmt::Display for ParseTraceLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown trace level: {}", self.0)
    }
}

impl std::error::Error for ParseTraceLevelError {}

impl FromStr for TraceLevel {
    type Err = ParseTraceLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "0" | "off" | "no" => Ok(Self::Off),
            "2" | "calls" => Ok(Self::Calls),
            "true" | "1" | "full" | "on" | "yes" => Ok(Self::Full),
            _ => Err(ParseTraceLevelError(s.to_owned())),
        }
    }
}

impl Serialize for TraceLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TraceLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Settings files may carry the level as a bool, a number or a name.
        let raw = loose::Raw::deserialize(deserializer)?;
        raw.to_string_form()
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

mod loose {
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum Raw {
        Bool(bool),
        Int(u64),
        Str(String),
    }

    impl Raw {
        pub(super) fn to_string_form(&self) -> String {
            match self {
                Self::Bool(b) => b.to_string(),
                Self::Int(n) => n.to_string(),
                Self::Str(s) => s.clone(),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
