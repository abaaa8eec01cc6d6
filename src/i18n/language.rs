//! Language code normalization.
//!
//! Codes are stored in `language_country` form (`en_us`, `fr_ca`). Request
//! layers usually report `fr-CA` or `fr-ca`, so normalization lower-cases the
//! code and replaces hyphens with underscores. Shorthand expansion (`en` to
//! `en_us`) depends on configuration and lives in `TranslationSettings`.

use regex::Regex;
use std::sync::OnceLock;

/// Pattern for codes accepted in configuration: a 2-3 letter language,
/// optionally followed by a region or script subtag.
static CODE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn code_pattern() -> &'static Regex {
    CODE_PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z]{2,3}(_[a-z0-9]{2,4})?$").expect("language code pattern is valid")
    })
}

/// Normalize a raw language code.
///
/// Never fails: any string maps to some key, unknown keys simply have no
/// translations stored under them.
///
/// # Example
/// ```
/// use lingofield::i18n::normalize_code;
/// assert_eq!(normalize_code(" fr-CA "), "fr_ca");
/// ```
pub fn normalize_code(code: &str) -> String {
    code.trim().replace('-', "_").to_ascii_lowercase()
}

/// Check whether an already-normalized code looks like a language code.
pub fn is_well_formed(code: &str) -> bool {
    code_pattern().is_match(code)
}
