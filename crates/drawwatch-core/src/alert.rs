//! Operational alerts raised by the scrape pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    ScraperFailure,
    MissingData,
    SystemError,
    ValidationError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScraperFailure => "SCRAPER_FAILURE",
            Self::MissingData => "MISSING_DATA",
            Self::SystemError => "SYSTEM_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
        }
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCRAPER_FAILURE" => Ok(Self::ScraperFailure),
            "MISSING_DATA" => Ok(Self::MissingData),
            "SYSTEM_ERROR" => Ok(Self::SystemError),
            "VALIDATION_ERROR" => Ok(Self::ValidationError),
            other => Err(UnknownVariant {
                kind: "alert type",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(UnknownVariant {
                kind: "severity",
                value: other.to_string(),
            }),
        }
    }
}

/// An operator-facing alert.
///
/// Alerts start active and stay active until an operator dismisses them;
/// nothing in the pipeline expires or clears them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Assigned by the store on insert.
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: AlertType,
    pub severity: Severity,
    pub message: String,
    pub metadata: serde_json::Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        kind: AlertType,
        severity: Severity,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: None,
            kind,
            severity,
            message: message.into(),
            metadata,
            active: true,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_as_str() {
        for kind in [
            AlertType::ScraperFailure,
            AlertType::MissingData,
            AlertType::SystemError,
            AlertType::ValidationError,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(kind.as_str().parse::<AlertType>().unwrap(), kind);
        }
        for severity in [Severity::Low, Severity::Medium, Severity::High, Severity::Critical] {
            assert_eq!(severity.as_str().parse::<Severity>().unwrap(), severity);
        }
    }

    #[test]
    fn unknown_variants_are_rejected() {
        assert!("PAYMENT_FAILURE".parse::<AlertType>().is_err());
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn new_alert_is_active() {
        let alert = Alert::new(
            AlertType::MissingData,
            Severity::High,
            "Top Pick Missing 2 Draws for 2026-01-08",
            serde_json::json!({ "missingDraws": ["1:00 PM", "2:00 PM"] }),
        );
        assert!(alert.active);
        assert!(alert.id.is_none());
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "MISSING_DATA");
        assert_eq!(json["severity"], "HIGH");
    }
}
