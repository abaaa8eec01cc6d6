//! Translatable records and the translation resolver.
//!
//! A record keeps default-language values in its base fields and per-language
//! overrides in a single JSON value shaped as
//! `{ "<language>": { "<field>": <value> } }`. Reads go through `read_field`,
//! which picks the selected language's override, then the fallback chain,
//! then the base value. Writes go through `write_field` / `translate`, which
//! merge into the stored map without touching other languages.
//!
//! A `null` override counts as missing. Any other value, including `""`,
//! `0` and `false`, is a translation.

use crate::error::TranslationError;
use crate::i18n::TranslationSettings;
use crate::model::TranslatableModel;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Field name to value.
pub type FieldMap = Map<String, Value>;

/// Whether a stored value counts as a translation.
pub(crate) fn is_present(value: &Value) -> bool {
    !value.is_null()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Check that a stored translations value is an object of objects.
fn validated_map<'a>(
    translations: &'a Value,
    model: &str,
) -> Result<Option<&'a FieldMap>, TranslationError> {
    match translations {
        Value::Null => Ok(None),
        Value::Object(map) => {
            for (code, entry) in map {
                if !entry.is_object() {
                    return Err(TranslationError::malformed(
                        model,
                        format!("entry for {} is {}, expected an object", code, json_kind(entry)),
                    ));
                }
            }
            Ok(Some(map))
        }
        other => Err(TranslationError::malformed(
            model,
            format!("expected an object of objects, found {}", json_kind(other)),
        )),
    }
}

/// Mutable access to the translations object, creating it when empty.
fn validated_map_mut<'a>(
    translations: &'a mut Value,
    model: &str,
) -> Result<&'a mut FieldMap, TranslationError> {
    validated_map(translations, model)?;
    if translations.is_null() {
        *translations = Value::Object(FieldMap::new());
    }
    match translations {
        Value::Object(map) => Ok(map),
        other => Err(TranslationError::malformed(
            model,
            format!("expected an object of objects, found {}", json_kind(other)),
        )),
    }
}

#[derive(Debug, Clone)]
pub struct TranslatableRecord {
    id: Option<i64>,
    model: Arc<TranslatableModel>,
    /// Base (default-language) values for every field
    fields: FieldMap,
    /// Stored overrides; `Null` until the first translation is written
    translations: Value,
    /// Currently selected language, always an expanded key
    language_code: String,
    /// Whether reads walk the fallback chain
    fallback: bool,
    updated_at: Option<DateTime<Utc>>,
}

impl TranslatableRecord {
    /// A new, unsaved record with no translations, reading in the default
    /// language.
    pub fn new(model: Arc<TranslatableModel>, fields: FieldMap) -> Self {
        let language_code = model.settings().default_language().to_string();
        Self {
            id: None,
            model,
            fields,
            translations: Value::Null,
            language_code,
            fallback: true,
            updated_at: None,
        }
    }

    /// Rebuild a record loaded from storage.
    ///
    /// The translations value is kept as stored. A malformed value is
    /// reported by the first read or write that consults it.
    pub fn from_stored(
        model: Arc<TranslatableModel>,
        id: i64,
        fields: FieldMap,
        translations: Option<Value>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut record = Self::new(model, fields);
        record.id = Some(id);
        record.translations = translations.unwrap_or(Value::Null);
        record.updated_at = updated_at;
        record
    }

    /// Create a record while `language_code` is active.
    ///
    /// Base fields are populated from `fields` in every case. For a
    /// non-default language the translatable subset is also stored as that
    /// language's translation, and the record reads in that language.
    pub fn create_in(
        model: Arc<TranslatableModel>,
        language_code: &str,
        fields: FieldMap,
    ) -> Result<Self, TranslationError> {
        let mut record = Self::new(model, fields);
        let code = record.settings().language_key(language_code);

        if !record.settings().is_default(&code) {
            let translated: Vec<(String, Value)> = record
                .model
                .translatable_fields()
                .filter_map(|f| record.fields.get(f).map(|v| (f.to_string(), v.clone())))
                .collect();
            for (field, value) in translated {
                record.write_field(&code, &field, value)?;
            }
        }

        record.select_language(&code);
        Ok(record)
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    pub fn model(&self) -> &Arc<TranslatableModel> {
        &self.model
    }

    pub fn settings(&self) -> &TranslationSettings {
        self.model.settings()
    }

    /// Base (default-language) field values.
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// The raw stored translations value.
    pub fn translations(&self) -> &Value {
        &self.translations
    }

    /// The selected language.
    pub fn language(&self) -> &str {
        &self.language_code
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub(crate) fn set_updated_at(&mut self, updated_at: DateTime<Utc>) {
        self.updated_at = Some(updated_at);
    }

    // ==================== Language selection ====================

    /// Select the language reads resolve against, with fallback.
    ///
    /// Never fails. Unknown codes resolve to the default at read time.
    pub fn select_language(&mut self, code: &str) -> &mut Self {
        self.language_code = self.settings().language_key(code);
        self.fallback = true;
        self
    }

    /// Select a language without walking its fallback chain. Fields missing
    /// in that language read their base value.
    pub fn select_language_strict(&mut self, code: &str) -> &mut Self {
        self.select_language(code);
        self.fallback = false;
        self
    }

    /// Return to the default language.
    pub fn reset_language(&mut self) -> &mut Self {
        self.language_code = self.settings().default_language().to_string();
        self.fallback = true;
        self
    }

    /// Select `code` only if the record can be read in it: the default
    /// language, or a language with a non-empty translation entry.
    pub fn language_or_none(&mut self, code: &str) -> Result<Option<&mut Self>, TranslationError> {
        let key = self.settings().language_key(code);
        if !self.settings().is_default(&key) && !self.has_language(&key)? {
            return Ok(None);
        }
        self.select_language(&key);
        Ok(Some(self))
    }

    // ==================== Reads ====================

    /// The stored entry for one language, if any.
    pub fn translation_entry(&self, code: &str) -> Result<Option<&FieldMap>, TranslationError> {
        let key = self.settings().language_key(code);
        let map = validated_map(&self.translations, self.model.name())?;
        Ok(map.and_then(|m| m.get(&key)).and_then(Value::as_object))
    }

    /// Whether the record has a non-empty translation entry for `code`.
    pub fn has_language(&self, code: &str) -> Result<bool, TranslationError> {
        Ok(self
            .translation_entry(code)?
            .map(|entry| !entry.is_empty())
            .unwrap_or(false))
    }

    /// Languages with a stored entry.
    pub fn languages(&self) -> Result<Vec<&str>, TranslationError> {
        let map = validated_map(&self.translations, self.model.name())?;
        Ok(map
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default())
    }

    /// Find the override serving `field` under the selected language.
    fn lookup(&self, field: &str) -> Result<Option<(String, &Value)>, TranslationError> {
        let settings = self.settings();
        if settings.is_default(&self.language_code) {
            return Ok(None);
        }
        let Some(map) = validated_map(&self.translations, self.model.name())? else {
            return Ok(None);
        };

        for code in settings.language_keys(&self.language_code, self.fallback) {
            if settings.is_default(&code) {
                break;
            }
            let Some(entry) = map.get(&code) else {
                continue;
            };
            if let Some(value) = entry.get(field).filter(|v| is_present(v)) {
                return Ok(Some((code, value)));
            }
        }
        Ok(None)
    }

    /// Read a field under the selected language.
    ///
    /// Translatable fields resolve: exact override, then the fallback chain
    /// in order, then the base value. Other fields read the base value.
    pub fn read_field(&self, field: &str) -> Result<Option<&Value>, TranslationError> {
        if !self.model.is_translatable(field) {
            return Ok(self.fields.get(field));
        }
        match self.lookup(field)? {
            Some((_, value)) => Ok(Some(value)),
            None => Ok(self.fields.get(field)),
        }
    }

    /// The language a read of `field` would be served from.
    pub fn resolved_language(&self, field: &str) -> Result<String, TranslationError> {
        if self.model.is_translatable(field) {
            if let Some((code, _)) = self.lookup(field)? {
                return Ok(code);
            }
        }
        Ok(self.settings().default_language().to_string())
    }

    /// All base fields, with translatable ones resolved under the selected
    /// language.
    pub fn resolved_fields(&self) -> Result<FieldMap, TranslationError> {
        let mut resolved = self.fields.clone();
        for field in self.model.translatable_fields() {
            if let Some((_, value)) = self.lookup(field)? {
                resolved.insert(field.to_string(), value.clone());
            }
        }
        Ok(resolved)
    }

    /// Base values of the translatable fields. Missing ones are `null`.
    pub fn default_values(&self) -> FieldMap {
        self.model
            .translatable_fields()
            .map(|f| {
                let value = self.fields.get(f).cloned().unwrap_or(Value::Null);
                (f.to_string(), value)
            })
            .collect()
    }

    /// The translatable values for one language as a flat map.
    ///
    /// Walks the language keys for `code` (the selected language when
    /// `None`). The default language yields the base values. The first
    /// language with a non-empty entry yields its present values. When
    /// nothing matches the map is empty.
    pub fn language_as_dict(
        &self,
        code: Option<&str>,
        fallback: bool,
    ) -> Result<FieldMap, TranslationError> {
        let settings = self.settings();
        let code = code.unwrap_or(&self.language_code);

        for key in settings.language_keys(code, fallback) {
            if settings.is_default(&key) {
                return Ok(self
                    .fields
                    .iter()
                    .filter(|(k, _)| self.model.is_translatable(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect());
            }
            if let Some(entry) = self.translation_entry(&key)? {
                if !entry.is_empty() {
                    return Ok(entry
                        .iter()
                        .filter(|(k, v)| is_present(v) && self.model.is_translatable(k))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect());
                }
            }
        }
        Ok(FieldMap::new())
    }

    // ==================== Writes ====================

    /// Write one field for one language.
    ///
    /// The default language writes the base field. Any other language merges
    /// into `translations[language]`, creating the entry if needed and
    /// keeping every other key. Changes are staged until the record is saved.
    pub fn write_field(
        &mut self,
        language_code: &str,
        field: &str,
        value: Value,
    ) -> Result<(), TranslationError> {
        if !self.model.is_translatable(field) {
            return Err(TranslationError::NonTranslatableField {
                field: field.to_string(),
            });
        }

        let code = self.settings().language_key(language_code);
        if self.settings().is_default(&code) {
            self.fields.insert(field.to_string(), value);
            return Ok(());
        }

        let model = &self.model;
        let map = validated_map_mut(&mut self.translations, model.name())?;
        match map
            .entry(code)
            .or_insert_with(|| Value::Object(FieldMap::new()))
        {
            Value::Object(entry) => {
                entry.insert(field.to_string(), value);
                Ok(())
            }
            other => Err(TranslationError::malformed(
                model.name(),
                format!("translation entry is {}, expected an object", json_kind(other)),
            )),
        }
    }

    /// Write several fields at once.
    ///
    /// Without a language the selected one is used. With a language, that
    /// language is selected afterwards. Every field is checked before anything
    /// is written, so a rejected call leaves the record unchanged.
    pub fn translate<I, K>(
        &mut self,
        language_code: Option<&str>,
        values: I,
    ) -> Result<(), TranslationError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let values: Vec<(String, Value)> = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        if let Some((field, _)) = values.iter().find(|(f, _)| !self.model.is_translatable(f)) {
            return Err(TranslationError::NonTranslatableField {
                field: field.clone(),
            });
        }

        let code = match language_code {
            Some(code) => self.settings().language_key(code),
            None => self.language_code.clone(),
        };
        if !self.settings().is_default(&code) {
            validated_map(&self.translations, self.model.name())?;
        }

        for (field, value) in values {
            self.write_field(&code, &field, value)?;
        }

        if language_code.is_some() {
            self.select_language(&code);
        }
        Ok(())
    }

    /// Assign a field in the context of the selected language.
    ///
    /// Translatable fields under a non-default language become translations.
    /// Everything else writes the base field.
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), TranslationError> {
        if !self.model.is_translatable(field) {
            self.fields.insert(field.to_string(), value);
            return Ok(());
        }
        let code = self.language_code.clone();
        self.write_field(&code, field, value)
    }
}
