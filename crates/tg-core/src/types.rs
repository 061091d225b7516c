//! Core type definitions with validation.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An absolute instant carrying the processing-zone offset.
///
/// The event source normalizes every timestamp to one offset before the
/// engine sees it; hour buckets are cut on this offset's wall clock.
pub type Timestamp = DateTime<FixedOffset>;

/// Identifier of a productivity category row.
pub type CategoryId = i64;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// Invalid productivity type value.
    #[error("invalid productivity type: {value}")]
    InvalidProductivityType { value: String },

    /// A reported duration was negative or not a number.
    #[error("duration must be a finite, non-negative number, got {value}")]
    InvalidDuration { value: f64 },

    /// A window whose end does not come after its start.
    #[error("window end {end} must be after start {start}")]
    InvalidWindow { start: String, end: String },

    /// A look-back longer than `MAX_HOURS_BACK`.
    #[error("cannot look back {hours} hours, the limit is {max}")]
    LookBackTooLong { hours: u32, max: u32 },

    /// An hour of day outside 0..=24.
    #[error("hour must be between 0 and 24, got {value}")]
    InvalidHour { value: u32 },
}

/// How an application's time counts towards productivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductivityType {
    Productive,
    Neutral,
    Distracting,
}

impl ProductivityType {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Productive => "PRODUCTIVE",
            Self::Neutral => "NEUTRAL",
            Self::Distracting => "DISTRACTING",
        }
    }
}

impl fmt::Display for ProductivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProductivityType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PRODUCTIVE" => Ok(Self::Productive),
            "NEUTRAL" => Ok(Self::Neutral),
            "DISTRACTING" => Ok(Self::Distracting),
            _ => Err(ValidationError::InvalidProductivityType {
                value: s.to_string(),
            }),
        }
    }
}

/// A validated subject identifier.
///
/// A subject is one monitored endpoint (a client machine or user). Subject IDs
/// must be non-empty; every bucket is scoped to exactly one subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "subject ID",
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SubjectId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self {
        id.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
