//! Intent record types produced by reply analysis.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// How interested the customer is in the offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterestLevel {
    #[serde(rename = "Interested")]
    Interested,
    #[serde(rename = "Not Interested")]
    NotInterested,
    #[serde(rename = "Unsure")]
    Unsure,
    #[serde(rename = "Needs More Information")]
    NeedsMoreInformation,
}

/// How much price drives the customer's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSensitivity {
    High,
    Low,
    Unknown,
}

/// Overall tone of the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl InterestLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interested => "Interested",
            Self::NotInterested => "Not Interested",
            Self::Unsure => "Unsure",
            Self::NeedsMoreInformation => "Needs More Information",
        }
    }
}

impl PriceSensitivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Low => "Low",
            Self::Unknown => "Unknown",
        }
    }
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Negative => "Negative",
            Self::Neutral => "Neutral",
        }
    }
}

/// Lowercase, treat `_` and `-` as spaces, collapse whitespace.
fn normalize_label(s: &str) -> String {
    s.replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

macro_rules! label_from_str {
    ($ty:ty, $field:literal, [$($variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = AnalysisError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = normalize_label(s);
                [$($variant),+]
                    .into_iter()
                    .find(|v| normalize_label(v.as_str()) == wanted)
                    .ok_or_else(|| AnalysisError::OutOfDomain {
                        field: $field,
                        value: s.to_string(),
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

label_from_str!(
    InterestLevel,
    "interest_level",
    [
        InterestLevel::Interested,
        InterestLevel::NotInterested,
        InterestLevel::Unsure,
        InterestLevel::NeedsMoreInformation,
    ]
);
label_from_str!(
    PriceSensitivity,
    "price_sensitivity",
    [
        PriceSensitivity::High,
        PriceSensitivity::Low,
        PriceSensitivity::Unknown,
    ]
);
label_from_str!(
    Sentiment,
    "sentiment",
    [Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral]
);

/// Structured classification of a customer reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub interest_level: InterestLevel,
    pub products_mentioned: Vec<String>,
    pub price_sensitivity: PriceSensitivity,
    pub questions: Vec<String>,
    pub next_action: String,
    pub sentiment: Sentiment,
    /// Set only when analysis could not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntentRecord {
    /// The record the fallback parser starts from.
    pub fn fallback_default() -> Self {
        Self {
            interest_level: InterestLevel::Unsure,
            products_mentioned: Vec::new(),
            price_sensitivity: PriceSensitivity::Unknown,
            questions: Vec::new(),
            next_action: "Follow up".to_string(),
            sentiment: Sentiment::Neutral,
            error: None,
        }
    }

    /// The record returned when generation itself failed.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            next_action: "Ask for clarification".to_string(),
            error: Some(reason.into()),
            ..Self::fallback_default()
        }
    }
}
