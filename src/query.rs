//! Language-aware queries over translatable records.
//!
//! A `TranslationQuery` can run two ways:
//! - `apply` post-filters records already loaded into memory
//! - `to_sql` renders the same query for PostgreSQL, using the JSONB
//!   operators on the `translations` column (`->`, `->>`, `#>>`)
//!
//! Records coming out of a language query read in that language without
//! walking the fallback chain: a field the language does not override shows
//! its default value.
//!
//! In-memory ordering compares strings by code point. The database orders by
//! the column collation, so the two can disagree on accented letters.

use crate::error::TranslationError;
use crate::middleware::current_language;
use crate::model::TranslatableModel;
use crate::record::{FieldMap, TranslatableRecord};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use sqlx::{types::Json, Postgres, QueryBuilder};
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

/// Table holding every translatable record.
pub const RECORDS_TABLE: &str = "translatable_records";

/// Columns selected when loading records.
pub const RECORD_COLUMNS: &str = "id, model, fields, translations, updated_at";

/// True for rows whose `translations` is neither SQL/JSON null nor an object
/// of objects.
const MALFORMED_TRANSLATIONS: &str = "CASE COALESCE(jsonb_typeof(translations), 'null') \
     WHEN 'object' THEN EXISTS (SELECT 1 FROM jsonb_each(translations) AS entry \
     WHERE jsonb_typeof(entry.value) <> 'object') \
     WHEN 'null' THEN FALSE ELSE TRUE END";

/// Keep only records that have a non-empty entry for `code`, reading each in
/// that language. The default language keeps every record.
pub fn filter_has_language<I>(records: I, code: &str) -> Result<Vec<TranslatableRecord>, TranslationError>
where
    I: IntoIterator<Item = TranslatableRecord>,
{
    let mut kept = Vec::new();
    for mut record in records {
        let key = record.settings().language_key(code);
        if record.settings().is_default(&key) || record.has_language(&key)? {
            record.select_language_strict(&key);
            kept.push(record);
        }
    }
    Ok(kept)
}

/// Keep every record, reading each in `code`. Records without an entry for
/// `code` show their default values.
pub fn filter_has_language_or_default<I>(records: I, code: &str) -> Vec<TranslatableRecord>
where
    I: IntoIterator<Item = TranslatableRecord>,
{
    records
        .into_iter()
        .map(|mut record| {
            record.select_language_strict(code);
            record
        })
        .collect()
}

/// Whether records without the requested language are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LanguageMode {
    /// Only records with a non-empty entry for the language
    Strict,
    /// Every record, untranslated ones with default values
    #[default]
    OrDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort order '{}', expected 'asc' or 'desc'", other)),
        }
    }
}

impl<'de> Deserialize<'de> for SortOrder {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl SortOrder {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Exact,
    Contains,
    IContains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub lookup: Lookup,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
struct JsonOrdering {
    path: Vec<String>,
    language: Option<String>,
    order: SortOrder,
}

/// Text form of a JSON value, the way `->>` / `#>>` render it.
fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Follow object keys (or array indexes) from `root`.
fn walk_path<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Escape `%`, `_` and `\` for a LIKE pattern.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn compare_keys(a: &Option<String>, b: &Option<String>, order: SortOrder) -> Ordering {
    // Missing values sort last ascending and first descending.
    let ascending = match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    match order {
        SortOrder::Asc => ascending,
        SortOrder::Desc => ascending.reverse(),
    }
}

#[derive(Debug, Clone)]
pub struct TranslationQuery {
    model: Arc<TranslatableModel>,
    language: String,
    mode: LanguageMode,
    filters: Vec<FieldFilter>,
    ordering: Option<JsonOrdering>,
    limit: Option<i64>,
}

impl TranslationQuery {
    /// A query over every record of `model`, reading in the active request
    /// language (or the default one outside a request).
    pub fn new(model: Arc<TranslatableModel>) -> Self {
        let language = match current_language() {
            Some(code) => model.settings().language_key(&code),
            None => model.settings().default_language().to_string(),
        };
        Self {
            model,
            language,
            mode: LanguageMode::OrDefault,
            filters: Vec::new(),
            ordering: None,
            limit: None,
        }
    }

    /// Restrict to records translated into `code`.
    pub fn language(mut self, code: &str) -> Self {
        self.language = self.model.settings().language_key(code);
        self.mode = LanguageMode::Strict;
        self
    }

    /// Read in `code`, keeping untranslated records with default values.
    pub fn language_or_default(mut self, code: &str) -> Self {
        self.language = self.model.settings().language_key(code);
        self.mode = LanguageMode::OrDefault;
        self
    }

    /// Filter on a field.
    ///
    /// Under a non-default language, translatable fields are matched against
    /// that language's stored value only, and `Contains` becomes
    /// case-insensitive.
    pub fn filter(mut self, field: &str, lookup: Lookup, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.to_string(),
            lookup,
            value: value.into(),
        });
        self
    }

    /// Order by the string at `json_path` within one language's translation.
    ///
    /// `json_path` is a comma- or dot-separated key path (`"name"`,
    /// `"details,origin"`). `language` defaults to the query's language. For
    /// the default language the base fields are used. A path with no keys
    /// clears the ordering, leaving records in id order.
    pub fn order_by_json_path(mut self, json_path: &str, language: Option<&str>, order: SortOrder) -> Self {
        let path: Vec<String> = json_path
            .split([',', '.'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if path.is_empty() {
            self.ordering = None;
            return self;
        }
        self.ordering = Some(JsonOrdering {
            path,
            language: language.map(|code| self.model.settings().language_key(code)),
            order,
        });
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit.max(0));
        self
    }

    pub fn model(&self) -> &Arc<TranslatableModel> {
        &self.model
    }

    pub fn language_code(&self) -> &str {
        &self.language
    }

    pub fn mode(&self) -> LanguageMode {
        self.mode
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    fn is_default_language(&self) -> bool {
        self.model.settings().is_default(&self.language)
    }

    /// Whether only records with a non-empty entry for the language qualify.
    pub fn requires_language_entry(&self) -> bool {
        self.mode == LanguageMode::Strict && !self.is_default_language()
    }

    /// Whether `field` is matched against the translations column.
    fn is_translated(&self, field: &str) -> bool {
        !self.is_default_language() && self.model.is_translatable(field)
    }

    fn effective_lookup(&self, filter: &FieldFilter) -> Lookup {
        match filter.lookup {
            Lookup::Contains if self.is_translated(&filter.field) => Lookup::IContains,
            other => other,
        }
    }

    // ==================== Application-side ====================

    fn filter_target<'a>(
        &self,
        record: &'a TranslatableRecord,
        field: &str,
    ) -> Result<Option<&'a Value>, TranslationError> {
        if self.is_translated(field) {
            Ok(record
                .translation_entry(&self.language)?
                .and_then(|entry| entry.get(field)))
        } else {
            Ok(record.fields().get(field))
        }
    }

    /// Whether a loaded record satisfies the query.
    pub fn matches(&self, record: &TranslatableRecord) -> Result<bool, TranslationError> {
        if record.model().name() != self.model.name() {
            return Ok(false);
        }
        if self.mode == LanguageMode::Strict
            && !self.is_default_language()
            && !record.has_language(&self.language)?
        {
            return Ok(false);
        }

        for filter in &self.filters {
            let Some(target) = self.filter_target(record, &filter.field)? else {
                return Ok(false);
            };
            let matched = match self.effective_lookup(filter) {
                Lookup::Exact => target == &filter.value,
                Lookup::Contains => match (json_text(target), json_text(&filter.value)) {
                    (Some(haystack), Some(needle)) => haystack.contains(&needle),
                    _ => false,
                },
                Lookup::IContains => match (json_text(target), json_text(&filter.value)) {
                    (Some(haystack), Some(needle)) => {
                        haystack.to_lowercase().contains(&needle.to_lowercase())
                    }
                    _ => false,
                },
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn sort_key(
        &self,
        ordering: &JsonOrdering,
        record: &TranslatableRecord,
    ) -> Result<Option<String>, TranslationError> {
        let language = ordering.language.as_deref().unwrap_or(&self.language);
        let value = if self.model.settings().is_default(language) {
            ordering
                .path
                .split_first()
                .and_then(|(first, rest)| record.fields().get(first).map(|v| (v, rest)))
                .and_then(|(root, rest)| walk_path(root, rest))
        } else {
            match record.translation_entry(language)? {
                Some(entry) => ordering
                    .path
                    .split_first()
                    .and_then(|(first, rest)| entry.get(first).map(|v| (v, rest)))
                    .and_then(|(root, rest)| walk_path(root, rest)),
                None => None,
            }
        };
        Ok(value.and_then(json_text))
    }

    /// Run the query over records already in memory.
    pub fn apply<I>(&self, records: I) -> Result<Vec<TranslatableRecord>, TranslationError>
    where
        I: IntoIterator<Item = TranslatableRecord>,
    {
        let mut kept = Vec::new();
        for record in records {
            if self.matches(&record)? {
                kept.push(record);
            }
        }

        match &self.ordering {
            Some(ordering) => {
                let mut keyed = kept
                    .into_iter()
                    .map(|record| Ok((self.sort_key(ordering, &record)?, record)))
                    .collect::<Result<Vec<_>, TranslationError>>()?;
                keyed.sort_by(|(ka, ra), (kb, rb)| {
                    compare_keys(ka, kb, ordering.order).then_with(|| ra.id().cmp(&rb.id()))
                });
                kept = keyed.into_iter().map(|(_, record)| record).collect();
            }
            None => kept.sort_by_key(TranslatableRecord::id),
        }

        if let Some(limit) = self.limit {
            kept.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        Ok(filter_has_language_or_default(kept, &self.language))
    }

    /// Run the query and project `fields`, translated where applicable.
    pub fn values<I>(&self, records: I, fields: &[&str]) -> Result<Vec<FieldMap>, TranslationError>
    where
        I: IntoIterator<Item = TranslatableRecord>,
    {
        self.apply(records)?
            .iter()
            .map(|record| {
                fields
                    .iter()
                    .map(|field| {
                        let value = record.read_field(field)?.cloned().unwrap_or(Value::Null);
                        Ok((field.to_string(), value))
                    })
                    .collect()
            })
            .collect()
    }

    /// Like `values`, as positional rows.
    pub fn values_list<I>(&self, records: I, fields: &[&str]) -> Result<Vec<Vec<Value>>, TranslationError>
    where
        I: IntoIterator<Item = TranslatableRecord>,
    {
        self.apply(records)?
            .iter()
            .map(|record| {
                fields
                    .iter()
                    .map(|field| Ok(record.read_field(field)?.cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect()
    }

    // ==================== Database-side ====================

    /// Render the full `SELECT` for this query.
    pub fn to_sql(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!("SELECT {} FROM {} ", RECORD_COLUMNS, RECORDS_TABLE));
        self.push_where(&mut builder);
        self.push_order_and_limit(&mut builder);
        builder
    }

    /// Render a count with the same conditions.
    ///
    /// The second column counts matching rows with malformed translations.
    pub fn to_count_sql(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE {}) FROM {} ",
            MALFORMED_TRANSLATIONS, RECORDS_TABLE
        ));
        self.push_where(&mut builder);
        builder
    }

    /// Append the `WHERE` clause: model, language presence and field filters.
    ///
    /// In strict mode rows with malformed translations are kept so loading
    /// them reports the error instead of dropping them.
    pub fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push("WHERE model = ");
        builder.push_bind(self.model.name().to_string());

        if self.requires_language_entry() {
            builder.push(" AND (translations -> ");
            builder.push_bind(self.language.clone());
            builder.push(" <> '{}'::jsonb OR ");
            builder.push(MALFORMED_TRANSLATIONS);
            builder.push(")");
        }

        for filter in &self.filters {
            let translated = self.is_translated(&filter.field);
            let lookup = self.effective_lookup(filter);
            let as_text = lookup != Lookup::Exact;

            builder.push(" AND ");
            if translated {
                builder.push("translations -> ");
                builder.push_bind(self.language.clone());
                builder.push(if as_text { " ->> " } else { " -> " });
            } else {
                builder.push(if as_text { "fields ->> " } else { "fields -> " });
            }
            builder.push_bind(filter.field.clone());

            match lookup {
                Lookup::Exact => {
                    builder.push(" = ");
                    builder.push_bind(Json(filter.value.clone()));
                }
                Lookup::Contains | Lookup::IContains => {
                    builder.push(if lookup == Lookup::Contains { " LIKE " } else { " ILIKE " });
                    let needle = json_text(&filter.value).unwrap_or_default();
                    builder.push_bind(like_pattern(&needle));
                }
            }
        }
    }

    /// Append `ORDER BY` and `LIMIT`.
    pub fn push_order_and_limit(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" ORDER BY ");
        if let Some(ordering) = &self.ordering {
            let language = ordering.language.as_deref().unwrap_or(&self.language);
            if self.model.settings().is_default(language) {
                builder.push("fields #>> ");
                builder.push_bind(ordering.path.clone());
            } else {
                let mut path = Vec::with_capacity(ordering.path.len() + 1);
                path.push(language.to_string());
                path.extend(ordering.path.iter().cloned());
                builder.push("translations #>> ");
                builder.push_bind(path);
            }
            builder.push(" ");
            builder.push(ordering.order.as_sql());
            builder.push(", ");
        }
        builder.push("id ASC");

        if let Some(limit) = self.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::TranslationSettings;
    use crate::middleware::with_language;
    use serde_json::json;

    // ==================== Helper Functions ====================

    fn fruit_model() -> Arc<TranslatableModel> {
        let settings = TranslationSettings::new("en_us")
            .with_shorthand("en", "en_us")
            .with_shorthand("tr", "tr_tr")
            .with_shorthand("de", "de_de")
            .with_fallback("fr_ca", ["fr_fr"]);
        Arc::new(TranslatableModel::new("fruit", ["name", "benefits"], Arc::new(settings)))
    }

    fn fruit(model: &Arc<TranslatableModel>, id: i64, base: Value, translations: Value) -> TranslatableRecord {
        TranslatableRecord::from_stored(
            Arc::clone(model),
            id,
            base.as_object().cloned().unwrap(),
            Some(translations),
            None,
        )
    }

    fn fruits(model: &Arc<TranslatableModel>) -> Vec<TranslatableRecord> {
        vec![
            fruit(
                model,
                1,
                json!({"name": "apple", "benefits": "good for health", "color": "red"}),
                json!({
                    "tr_tr": {"name": "elma"},
                    "de_de": {"name": "Apfel"},
                    "fr_fr": {"name": "pomme", "benefits": "bon pour la santé"},
                }),
            ),
            fruit(
                model,
                2,
                json!({"name": "pear", "benefits": "fiber", "color": "green"}),
                json!({"tr_tr": {"name": "armut"}}),
            ),
            fruit(model, 3, json!({"name": "banana", "color": "yellow"}), json!({"it_it": {}})),
        ]
    }

    fn names(records: &[TranslatableRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.read_field("name").unwrap().and_then(Value::as_str).unwrap_or("").to_string())
            .collect()
    }

    // ==================== filter_has_language ====================

    #[test]
    fn test_filter_has_language_excludes_untranslated() {
        let model = fruit_model();
        let kept = filter_has_language(fruits(&model), "tr_tr").unwrap();
        assert_eq!(names(&kept), vec!["elma", "armut"]);
    }

    #[test]
    fn test_filter_has_language_empty_entry_excluded() {
        let model = fruit_model();
        let kept = filter_has_language(fruits(&model), "it_it").unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn test_filter_has_language_default_keeps_all() {
        let model = fruit_model();
        let kept = filter_has_language(fruits(&model), "en").unwrap();
        assert_eq!(names(&kept), vec!["apple", "pear", "banana"]);
    }

    #[test]
    fn test_filter_has_language_or_default_keeps_all() {
        let model = fruit_model();
        let kept = filter_has_language_or_default(fruits(&model), "tr_tr");
        assert_eq!(names(&kept), vec!["elma", "armut", "banana"]);
    }

    #[test]
    fn test_language_records_do_not_walk_fallbacks() {
        let model = fruit_model();
        let kept = filter_has_language_or_default(fruits(&model), "fr_ca");
        assert_eq!(names(&kept), vec!["apple", "pear", "banana"]);
    }

    #[test]
    fn test_language_merges_over_defaults() {
        let model = fruit_model();
        let kept = filter_has_language(fruits(&model), "de_de").unwrap();
        assert_eq!(kept.len(), 1);
        let fields = kept[0].resolved_fields().unwrap();
        assert_eq!(fields["name"], json!("Apfel"));
        assert_eq!(fields["benefits"], json!("good for health"));
    }

    // ==================== TranslationQuery::apply ====================

    #[test]
    fn test_query_language_counts() {
        let model = fruit_model();
        let strict = TranslationQuery::new(Arc::clone(&model)).language("tr_tr");
        assert_eq!(strict.apply(fruits(&model)).unwrap().len(), 2);

        let lenient = TranslationQuery::new(Arc::clone(&model)).language_or_default("tr_tr");
        assert_eq!(lenient.apply(fruits(&model)).unwrap().len(), 3);
    }

    #[test]
    fn test_query_filter_translated_exact() {
        let model = fruit_model();
        let query = TranslationQuery::new(Arc::clone(&model))
            .language("de_de")
            .filter("name", Lookup::Exact, "Apfel");
        assert_eq!(names(&query.apply(fruits(&model)).unwrap()), vec!["Apfel"]);

        let query = TranslationQuery::new(Arc::clone(&model))
            .language("de_de")
            .filter("name", Lookup::Exact, "apple");
        assert!(query.apply(fruits(&model)).unwrap().is_empty());
    }

    #[test]
    fn test_query_filter_contains_becomes_case_insensitive() {
        let model = fruit_model();
        let query = TranslationQuery::new(Arc::clone(&model))
            .language_or_default("de_de")
            .filter("name", Lookup::Contains, "APF");
        assert_eq!(query.apply(fruits(&model)).unwrap().len(), 1);
    }

    #[test]
    fn test_query_filter_contains_default_language_is_case_sensitive() {
        let model = fruit_model();
        let query = TranslationQuery::new(Arc::clone(&model)).filter("name", Lookup::Contains, "APP");
        assert!(query.apply(fruits(&model)).unwrap().is_empty());
        let query = TranslationQuery::new(Arc::clone(&model)).filter("name", Lookup::Contains, "app");
        assert_eq!(query.apply(fruits(&model)).unwrap().len(), 1);
    }

    #[test]
    fn test_query_filter_non_translatable_uses_base() {
        let model = fruit_model();
        let query = TranslationQuery::new(Arc::clone(&model))
            .language_or_default("tr_tr")
            .filter("color", Lookup::Exact, "green");
        assert_eq!(names(&query.apply(fruits(&model)).unwrap()), vec!["armut"]);
    }

    #[test]
    fn test_query_ignores_other_models() {
        let model = fruit_model();
        let other = Arc::new(TranslatableModel::new(
            "vegetable",
            ["name"],
            Arc::new(TranslationSettings::default()),
        ));
        let query = TranslationQuery::new(other);
        assert!(query.apply(fruits(&model)).unwrap().is_empty());
    }

    #[test]
    fn test_query_order_by_json_path() {
        let model = fruit_model();
        let query = TranslationQuery::new(Arc::clone(&model))
            .language_or_default("tr_tr")
            .order_by_json_path("name", None, SortOrder::Asc);
        // banana has no tr_tr name and sorts last
        assert_eq!(names(&query.apply(fruits(&model)).unwrap()), vec!["armut", "elma", "banana"]);

        let query = TranslationQuery::new(Arc::clone(&model))
            .language_or_default("tr_tr")
            .order_by_json_path("name", None, SortOrder::Desc);
        assert_eq!(names(&query.apply(fruits(&model)).unwrap()), vec!["banana", "elma", "armut"]);
    }

    #[test]
    fn test_query_order_by_default_language_uses_base_fields() {
        let model = fruit_model();
        let query = TranslationQuery::new(Arc::clone(&model))
            .order_by_json_path("name", Some("en_us"), SortOrder::Desc);
        assert_eq!(names(&query.apply(fruits(&model)).unwrap()), vec!["pear", "banana", "apple"]);
    }

    #[test]
    fn test_query_limit() {
        let model = fruit_model();
        let query = TranslationQuery::new(Arc::clone(&model)).limit(2);
        assert_eq!(query.apply(fruits(&model)).unwrap().len(), 2);
    }

    #[test]
    fn test_query_values() {
        let model = fruit_model();
        let query = TranslationQuery::new(Arc::clone(&model))
            .language("de_de")
            .filter("name", Lookup::Exact, "Apfel");
        let values = query.values(fruits(&model), &["name"]).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["name"], json!("Apfel"));

        let rows = query.values_list(fruits(&model), &["name", "color"]).unwrap();
        assert_eq!(rows, vec![vec![json!("Apfel"), json!("red")]]);
    }

    #[test]
    fn test_query_malformed_translations_surface() {
        let model = fruit_model();
        let broken = fruit(&model, 9, json!({"name": "fig"}), json!({"tr_tr": "incir"}));
        let query = TranslationQuery::new(Arc::clone(&model)).language("tr_tr");
        assert!(matches!(
            query.apply(vec![broken]),
            Err(TranslationError::MalformedTranslations { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_uses_active_language() {
        let model = fruit_model();
        let query = with_language("tr-TR".to_string(), async {
            TranslationQuery::new(Arc::clone(&model))
        })
        .await;
        assert_eq!(query.language_code(), "tr_tr");
        assert_eq!(query.mode(), LanguageMode::OrDefault);
        assert_eq!(names(&query.apply(fruits(&model)).unwrap()), vec!["elma", "armut", "banana"]);

        let query = TranslationQuery::new(Arc::clone(&model));
        assert_eq!(query.language_code(), "en_us");
    }

    // ==================== SQL rendering ====================

    #[test]
    fn test_sql_default_language() {
        let query = TranslationQuery::new(fruit_model());
        let builder = query.to_sql();
        assert_eq!(
            builder.sql(),
            "SELECT id, model, fields, translations, updated_at FROM translatable_records \
             WHERE model = $1 ORDER BY id ASC"
        );
    }

    #[test]
    fn test_sql_strict_language() {
        let query = TranslationQuery::new(fruit_model()).language("tr");
        let builder = query.to_sql();
        let sql = builder.sql();
        assert!(sql.contains("WHERE model = $1 AND (translations -> $2 <> '{}'::jsonb OR CASE"));
        assert!(sql.contains("WHEN 'null' THEN FALSE ELSE TRUE END) ORDER BY id ASC"));
    }

    #[test]
    fn test_sql_strict_keeps_malformed_rows_visible() {
        let query = TranslationQuery::new(fruit_model()).language("tr_tr");
        assert!(query.requires_language_entry());
        assert!(query.to_sql().sql().contains(MALFORMED_TRANSLATIONS));
        assert!(!query.to_sql().sql().contains("jsonb_typeof(translations -> "));

        let default = TranslationQuery::new(fruit_model()).language("en");
        assert!(!default.requires_language_entry());
    }

    #[test]
    fn test_sql_or_default_has_no_language_filter() {
        let query = TranslationQuery::new(fruit_model()).language_or_default("tr");
        assert!(!query.to_sql().sql().contains("jsonb_typeof"));
        assert!(!query.requires_language_entry());
    }

    #[test]
    fn test_sql_translated_filters() {
        let query = TranslationQuery::new(fruit_model())
            .language_or_default("de_de")
            .filter("name", Lookup::Contains, "pfel")
            .filter("color", Lookup::Exact, "red");
        let builder = query.to_sql();
        let sql = builder.sql();
        assert!(sql.contains("AND translations -> $2 ->> $3 ILIKE $4"));
        assert!(sql.contains("AND fields -> $5 = $6"));
    }

    #[test]
    fn test_sql_order_and_limit() {
        let query = TranslationQuery::new(fruit_model())
            .language_or_default("fr_fr")
            .order_by_json_path("name", None, SortOrder::Desc)
            .limit(5);
        let builder = query.to_sql();
        assert!(builder
            .sql()
            .ends_with("ORDER BY translations #>> $2 DESC, id ASC LIMIT $3"));
    }

    #[test]
    fn test_count_sql() {
        let query = TranslationQuery::new(fruit_model()).language("tr_tr").limit(5);
        let builder = query.to_count_sql();
        assert!(builder.sql().starts_with("SELECT COUNT(*), COUNT(*) FILTER (WHERE CASE"));
        assert!(builder.sql().contains("FROM translatable_records WHERE model = $1 AND"));
        assert!(!builder.sql().contains("LIMIT"));
    }

    // ==================== Helpers ====================

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn test_sort_order_from_str() {
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[test]
    fn test_sort_order_deserialize_any_case() {
        assert_eq!(serde_json::from_value::<SortOrder>(json!("DESC")).unwrap(), SortOrder::Desc);
        assert_eq!(serde_json::from_value::<SortOrder>(json!(" Asc ")).unwrap(), SortOrder::Asc);
        assert!(serde_json::from_value::<SortOrder>(json!("sideways")).is_err());
    }

    #[test]
    fn test_empty_order_path_keeps_id_order() {
        let model = fruit_model();
        for path in ["", " , .", "."] {
            let query = TranslationQuery::new(Arc::clone(&model))
                .language_or_default("tr_tr")
                .order_by_json_path(path, None, SortOrder::Desc);
            assert!(query.to_sql().sql().ends_with("ORDER BY id ASC"));
            let ids: Vec<Option<i64>> = query
                .apply(fruits(&model))
                .unwrap()
                .iter()
                .map(TranslatableRecord::id)
                .collect();
            assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
        }
    }

    #[test]
    fn test_walk_path_nested() {
        let value = json!({"origin": {"countries": ["Kazakhstan", "China"]}});
        let path = vec!["origin".to_string(), "countries".to_string(), "1".to_string()];
        assert_eq!(walk_path(&value, &path), Some(&json!("China")));
    }
}
