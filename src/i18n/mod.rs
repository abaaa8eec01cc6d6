//! Language settings and code handling.
//!
//! # Architecture
//!
//! - `language`: normalization of raw codes (`fr-CA` -> `fr_ca`)
//! - `settings`: default language, shorthand expansion and fallback chains
//!
//! # Example
//!
//! ```
//! use lingofield::i18n::TranslationSettings;
//!
//! let settings = TranslationSettings::new("en_us")
//!     .with_shorthand("fr", "fr_fr")
//!     .with_fallback("fr_ca", ["fr_fr"]);
//!
//! assert_eq!(settings.language_key("fr"), "fr_fr");
//! assert_eq!(settings.language_keys("fr_ca", true), vec!["fr_ca", "fr_fr", "en_us"]);
//! ```

mod language;
mod settings;

pub use language::{is_well_formed, normalize_code};
pub use settings::{TranslationSettings, DEFAULT_LANGUAGE};
