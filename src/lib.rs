//! Per-language field overrides stored in a JSON column.
//!
//! A record keeps its default-language values in ordinary fields and every
//! other language in a single `translations` object keyed by language code.
//! Reads resolve through a configurable fallback chain; queries can keep only
//! records that carry a given language.

pub mod config;
pub mod db;
pub mod error;
pub mod i18n;
pub mod middleware;
pub mod model;
pub mod query;
pub mod record;
pub mod security;
pub mod server;

pub use error::TranslationError;
pub use i18n::TranslationSettings;
pub use model::{ModelRegistry, TranslatableModel};
pub use query::{LanguageMode, Lookup, SortOrder, TranslationQuery};
pub use record::{FieldMap, TranslatableRecord};
