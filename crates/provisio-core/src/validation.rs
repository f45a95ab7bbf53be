//! Accumulating field-path validation errors.
//!
//! Validation never stops at the first problem: every check contributes
//! to one [`FieldError`], and callers nest errors under their own field
//! with [`FieldError::via_field`] so the final report names the full path
//! of each violated field (`provider.cluster.endpoint`,
//! `provider.subnetSelector['name']`, ...).

use std::fmt;

/// A single violated constraint and the field paths it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub message: String,
    pub paths: Vec<String>,
}

/// A set of violations gathered during validation. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldError {
    violations: Vec<FieldViolation>,
}

impl FieldError {
    fn single(message: String, path: &str) -> Self {
        Self {
            violations: vec![FieldViolation {
                message,
                paths: vec![path.to_string()],
            }],
        }
    }

    pub fn missing_field(path: &str) -> Self {
        Self::single("missing field(s)".to_string(), path)
    }

    pub fn invalid_value(value: impl fmt::Display, path: &str) -> Self {
        Self::single(format!("invalid value: {value}"), path)
    }

    /// Merge another error into this one.
    pub fn also(mut self, other: FieldError) -> Self {
        self.violations.extend(other.violations);
        self
    }

    /// Merge the error side of a validation result, if any.
    pub fn also_result(self, result: Result<(), FieldError>) -> Self {
        match result {
            Ok(()) => self,
            Err(other) => self.also(other),
        }
    }

    /// Nest every path under `field`.
    pub fn via_field(mut self, field: &str) -> Self {
        for violation in &mut self.violations {
            for path in &mut violation.paths {
                *path = if path.starts_with('[') {
                    format!("{field}{path}")
                } else {
                    format!("{field}.{path}")
                };
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Every violated path, in the order the checks ran.
    pub fn paths(&self) -> Vec<&str> {
        self.violations
            .iter()
            .flat_map(|v| v.paths.iter().map(String::as_str))
            .collect()
    }

    pub fn into_result(self) -> Result<(), FieldError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.message, v.paths.join(", ")))
            .collect();
        f.write_str(&rendered.join("; "))
    }
}

impl std::error::Error for FieldError {}
