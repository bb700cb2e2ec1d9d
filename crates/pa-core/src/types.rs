//! Core type definitions with validation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A self-report scale must offer at least two choices.
    #[error("self-report scale must be at least 2, got {value}")]
    ScaleTooSmall { value: u8 },

    /// A self-report answer fell outside `1..=scale`.
    #[error("response {response} is outside the scale 1..={scale}")]
    ResponseOutOfRange { response: u8, scale: u8 },

    /// A self-report prompt was answered or skipped a second time.
    #[error("self-report prompted at {prompted_at} was already resolved")]
    AlreadyResolved { prompted_at: DateTime<Utc> },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated session identifier.
    ///
    /// Session IDs are random UUIDs assigned when a session is reconstructed.
    SessionId, "session ID"
);

impl SessionId {
    /// Generates a fresh random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// A self-report prompt and, once resolved, the user's answer.
///
/// Created when the prompt is shown; resolved exactly once by
/// [`answer`](Self::answer) or [`skip`](Self::skip).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfReportResponse {
    /// When the prompt was shown. Sessions ending on this prompt use it as `ended_at`.
    pub prompted_at: DateTime<Utc>,
    pub question: String,
    pub scale: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<u8>,
    #[serde(default)]
    pub skipped: bool,
}

impl SelfReportResponse {
    /// Creates an unanswered prompt record.
    pub fn prompted(
        prompted_at: DateTime<Utc>,
        question: impl Into<String>,
        scale: u8,
    ) -> Result<Self, ValidationError> {
        let question = question.into();
        if question.trim().is_empty() {
            return Err(ValidationError::Empty { field: "question" });
        }
        if scale < 2 {
            return Err(ValidationError::ScaleTooSmall { value: scale });
        }
        Ok(Self {
            prompted_at,
            question,
            scale,
            response: None,
            skipped: false,
        })
    }

    /// Whether the prompt has been answered or skipped.
    pub const fn is_resolved(&self) -> bool {
        self.response.is_some() || self.skipped
    }

    /// Records the user's answer.
    pub fn answer(&mut self, response: u8) -> Result<(), ValidationError> {
        self.ensure_pending()?;
        if response == 0 || response > self.scale {
            return Err(ValidationError::ResponseOutOfRange {
                response,
                scale: self.scale,
            });
        }
        self.response = Some(response);
        Ok(())
    }

    /// Marks the prompt as skipped (dismissed or timed out).
    pub fn skip(&mut self) -> Result<(), ValidationError> {
        self.ensure_pending()?;
        self.skipped = true;
        Ok(())
    }

    const fn ensure_pending(&self) -> Result<(), ValidationError> {
        if self.is_resolved() {
            return Err(ValidationError::AlreadyResolved {
                prompted_at: self.prompted_at,
            });
        }
        Ok(())
    }
}
