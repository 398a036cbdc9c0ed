//! Severity-graded validation results.

use serde::{Deserialize, Serialize};

/// How serious a validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    None,
    Warning,
    Error,
    /// Unrecoverable; the record must not be sanitized or returned.
    Critical,
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity,
        }
    }
}

/// Outcome of validating raw bytes or a decoded record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub severity: Severity,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// A clean result.
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            severity: Severity::None,
            issues: Vec::new(),
        }
    }

    /// Builds a result from findings. Valid while nothing reaches `Error`.
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let severity = issues
            .iter()
            .map(|i| i.severity)
            .max()
            .unwrap_or(Severity::None);
        Self {
            is_valid: severity < Severity::Error,
            severity,
            issues,
        }
    }

    /// Shorthand for a single critical finding.
    pub fn critical(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::from_issues(vec![ValidationIssue::new(field, message, Severity::Critical)])
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// True when there is something to sanitize but nothing fatal.
    pub fn needs_sanitizing(&self) -> bool {
        !self.issues.is_empty() && self.severity > Severity::None && !self.is_critical()
    }

    /// Issue messages joined for logs and events.
    pub fn summary(&self) -> String {
        self.issues
            .iter()
            .map(|i| format!("{}: {}", i.field, i.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
