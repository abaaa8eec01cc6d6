//! Error types for translation resolution.
//!
//! Absence of a translation is never an error. Only two conditions are:
//! a stored `translations` value that is not an object of objects, and an
//! attempt to translate a field that was not declared translatable.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// A field was written through the translation path but is not declared
    /// translatable on its model.
    #[error("{field} is not in translatable fields")]
    NonTranslatableField { field: String },

    /// The stored translations blob is not a mapping of mappings.
    #[error("malformed translations on {model}: {reason}")]
    MalformedTranslations { model: String, reason: String },

    /// Settings that cannot be used (bad language code, non-list fallbacks).
    #[error("improperly configured: {0}")]
    ImproperlyConfigured(String),
}

impl TranslationError {
    pub(crate) fn malformed(model: &str, reason: impl Into<String>) -> Self {
        Self::MalformedTranslations {
            model: model.to_string(),
            reason: reason.into(),
        }
    }

    /// Name of the rejected field, if this is a usage error.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::NonTranslatableField { field } => Some(field),
            _ => None,
        }
    }
}
