//! Model metadata: which fields of a record type are translatable.

use crate::i18n::TranslationSettings;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Describes one kind of translatable record.
#[derive(Debug, Clone)]
pub struct TranslatableModel {
    name: String,
    translatable_fields: BTreeSet<String>,
    settings: Arc<TranslationSettings>,
}

impl TranslatableModel {
    pub fn new<I, S>(name: &str, translatable_fields: I, settings: Arc<TranslationSettings>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            translatable_fields: translatable_fields.into_iter().map(Into::into).collect(),
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &TranslationSettings {
        &self.settings
    }

    pub fn is_translatable(&self, field: &str) -> bool {
        self.translatable_fields.contains(field)
    }

    pub fn translatable_fields(&self) -> impl Iterator<Item = &str> {
        self.translatable_fields.iter().map(String::as_str)
    }
}

/// Lookup of models by name, shared by the store and the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<TranslatableModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `model name -> translatable fields`.
    pub fn from_definitions(
        definitions: &BTreeMap<String, Vec<String>>,
        settings: Arc<TranslationSettings>,
    ) -> Self {
        let mut registry = Self::new();
        for (name, fields) in definitions {
            registry.register(TranslatableModel::new(name, fields.clone(), Arc::clone(&settings)));
        }
        registry
    }

    pub fn register(&mut self, model: TranslatableModel) -> Arc<TranslatableModel> {
        let model = Arc::new(model);
        self.models
            .insert(model.name().to_string(), Arc::clone(&model));
        model
    }

    pub fn get(&self, name: &str) -> Option<Arc<TranslatableModel>> {
        self.models.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}
