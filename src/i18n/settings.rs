//! Translation settings: default language, shorthand map and fallback chains.
//!
//! This is the single source of truth every record and query resolves
//! against. It is immutable once built and shared behind an `Arc`.

use super::language::{is_well_formed, normalize_code};
use crate::error::TranslationError;
use std::collections::BTreeMap;

/// Default language when none is configured.
pub const DEFAULT_LANGUAGE: &str = "en_us";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationSettings {
    /// Language whose values live in the base fields
    default_language: String,

    /// Bare code to full code (e.g. "en" -> "en_us")
    shorthands: BTreeMap<String, String>,

    /// Full code to ordered alternates (e.g. "fr_ca" -> ["fr_fr"])
    fallbacks: BTreeMap<String, Vec<String>>,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE).with_shorthand("en", "en_us")
    }
}

impl TranslationSettings {
    /// Create settings with the given default language and no shorthands or
    /// fallbacks.
    pub fn new(default_language: &str) -> Self {
        Self {
            default_language: normalize_code(default_language),
            shorthands: BTreeMap::new(),
            fallbacks: BTreeMap::new(),
        }
    }

    /// Add a shorthand expansion.
    pub fn with_shorthand(mut self, short: &str, full: &str) -> Self {
        self.shorthands
            .insert(normalize_code(short), normalize_code(full));
        self
    }

    /// Set the fallback chain for a language.
    pub fn with_fallback<I, S>(mut self, code: &str, chain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let chain = chain.into_iter().map(|c| normalize_code(c.as_ref())).collect();
        self.fallbacks.insert(normalize_code(code), chain);
        self
    }

    /// Build settings from already-parsed maps and validate them.
    pub fn from_maps(
        default_language: &str,
        shorthands: BTreeMap<String, String>,
        fallbacks: BTreeMap<String, Vec<String>>,
    ) -> Result<Self, TranslationError> {
        let mut settings = Self::new(default_language);
        for (short, full) in &shorthands {
            settings = settings.with_shorthand(short, full);
        }
        for (code, chain) in &fallbacks {
            settings = settings.with_fallback(code, chain);
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Reject codes that cannot be language codes.
    pub fn validate(&self) -> Result<(), TranslationError> {
        let check = |code: &str, what: &str| {
            if is_well_formed(code) {
                Ok(())
            } else {
                Err(TranslationError::ImproperlyConfigured(format!(
                    "{} '{}' is not a language code (expected e.g. 'en' or 'en_us')",
                    what, code
                )))
            }
        };

        check(&self.default_language, "default language")?;
        for (short, full) in &self.shorthands {
            check(short, "shorthand")?;
            check(full, "shorthand target")?;
        }
        for (code, chain) in &self.fallbacks {
            check(code, "fallback key")?;
            for alt in chain {
                check(alt, "fallback entry")?;
            }
        }
        Ok(())
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn shorthands(&self) -> &BTreeMap<String, String> {
        &self.shorthands
    }

    /// Normalize a code and expand it through the shorthand map.
    pub fn language_key(&self, code: &str) -> String {
        let code = normalize_code(code);
        match self.shorthands.get(&code) {
            Some(full) => full.clone(),
            None => code,
        }
    }

    /// The ordered list of languages to consult for `code`.
    ///
    /// Starts with the expanded code. With `fallback`, its configured chain
    /// follows and the default language is appended last unless already
    /// present. Without it, only the expanded code is returned.
    pub fn language_keys(&self, code: &str, fallback: bool) -> Vec<String> {
        let key = self.language_key(code);
        let mut codes = vec![key.clone()];

        if !fallback {
            return codes;
        }

        if let Some(chain) = self.fallbacks.get(&key) {
            for alt in chain {
                if !codes.contains(alt) {
                    codes.push(alt.clone());
                }
            }
        }

        if !codes.iter().any(|c| c == &self.default_language) {
            codes.push(self.default_language.clone());
        }
        codes
    }

    /// Whether `code` (after expansion) is the default language.
    pub fn is_default(&self, code: &str) -> bool {
        self.language_key(code) == self.default_language
    }

    /// Languages a request may activate: the targets of the shorthand map.
    pub fn available_languages(&self) -> impl Iterator<Item = &str> {
        self.shorthands.values().map(String::as_str)
    }

    /// Whether `code` is an available language.
    ///
    /// The code is normalized but not expanded: shorthand keys such as `de`
    /// are not themselves available.
    pub fn is_available(&self, code: &str) -> bool {
        let code = normalize_code(code);
        self.available_languages().any(|c| c == code)
    }

    /// The configured fallback chain for a full code.
    pub fn fallback_chain(&self, code: &str) -> &[String] {
        self.fallbacks
            .get(&self.language_key(code))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
