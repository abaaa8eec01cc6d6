use crate::i18n::{TranslationSettings, DEFAULT_LANGUAGE};
use crate::middleware::DEFAULT_LANGUAGE_HEADER;
use anyhow::{Context, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub database_url: String,
    pub port: u16,
    pub api_key: Option<String>,

    // Translations
    pub translations: TranslationSettings,
    pub language_header: String,

    // Model name -> translatable fields
    pub models: BTreeMap<String, Vec<String>>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let default_language = std::env::var("TRANSLATIONS_DEFAULT")
            .unwrap_or_else(|_| DEFAULT_LANGUAGE.to_string());

        let shorthands: BTreeMap<String, String> = match non_empty_var("TRANSLATIONS_MAP") {
            Some(raw) => serde_json::from_str(&raw).context(
                "TRANSLATIONS_MAP should be a JSON object of strings, e.g. {\"en\": \"en_us\"}",
            )?,
            None => TranslationSettings::default().shorthands().clone(),
        };

        let fallbacks: BTreeMap<String, Vec<String>> = match non_empty_var("TRANSLATIONS_FALLBACK") {
            Some(raw) => serde_json::from_str(&raw).context(
                "TRANSLATIONS_FALLBACK should be a JSON object of lists, e.g. {\"en_gb\": [\"en_us\"]}",
            )?,
            None => BTreeMap::new(),
        };

        let translations = TranslationSettings::from_maps(&default_language, shorthands, fallbacks)
            .context("Invalid translation settings")?;

        let models: BTreeMap<String, Vec<String>> = match non_empty_var("TRANSLATABLE_MODELS") {
            Some(raw) => serde_json::from_str(&raw).context(
                "TRANSLATABLE_MODELS should be a JSON object of lists, e.g. {\"fruit\": [\"name\"]}",
            )?,
            None => BTreeMap::new(),
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            api_key: non_empty_var("API_KEY"),

            translations,
            language_header: std::env::var("TRANSLATIONS_HEADER")
                .unwrap_or_else(|_| DEFAULT_LANGUAGE_HEADER.to_string()),

            models,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
