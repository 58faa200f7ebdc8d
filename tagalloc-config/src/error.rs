//! Errors raised while loading or checking tracker settings.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found error.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Field-level validation error.
    #[error("Tracker settings out of range:\n{}", format_validation_errors(.0))]
    Validation(#[source] ValidationErrors),

    /// A relationship between two fields does not hold.
    #[error("Inconsistent configuration: {0}")]
    Invariant(String),

    /// Figment parsing error.
    #[error("Configuration parsing error: {0}")]
    Parsing(#[from] Box<figment::Error>),
}

/// One line per failed field, sorted by field name, e.g.
/// `grow_step = 0 is outside 1..=65536`.
fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .iter()
        .flat_map(|(field, errors)| errors.iter().map(move |error| describe(field, error)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe(field: impl fmt::Display, error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return format!("{field}: {message}");
    }
    match (
        error.params.get("value"),
        error.params.get("min"),
        error.params.get("max"),
    ) {
        (Some(value), Some(min), Some(max)) => {
            format!("{field} = {value} is outside {min}..={max}")
        }
        _ => format!("{field}: failed the `{}` check", error.code),
    }
}

impl From<ValidationErrors> for ConfigError {
    fn from(errors: ValidationErrors) -> Self {
        ConfigError::Validation(errors)
    }
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Parsing(Box::new(error))
    }
}
