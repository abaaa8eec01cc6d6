use crate::error::TranslationError;
use crate::model::TranslatableModel;
use crate::query::{TranslationQuery, RECORDS_TABLE, RECORD_COLUMNS};
use crate::record::TranslatableRecord;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::sync::Arc;
use tracing::{debug, info};

const MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS translatable_records (
    id BIGSERIAL PRIMARY KEY,
    model TEXT NOT NULL,
    fields JSONB NOT NULL DEFAULT '{}'::jsonb,
    translations JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_translatable_records_model
    ON translatable_records (model);
CREATE INDEX IF NOT EXISTS idx_translatable_records_translations
    ON translatable_records USING GIN (translations);
"#;

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: i64,
    model: String,
    fields: Json<Value>,
    translations: Option<Json<Value>>,
    updated_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_record(self, model: &Arc<TranslatableModel>) -> Result<TranslatableRecord> {
        let fields = match self.fields.0 {
            Value::Object(map) => map,
            other => bail!(
                "Record {} of {} has non-object fields: {}",
                self.id,
                self.model,
                other
            ),
        };
        Ok(TranslatableRecord::from_stored(
            Arc::clone(model),
            self.id,
            fields,
            self.translations.map(|t| t.0),
            Some(self.updated_at),
        ))
    }
}

/// The translations value as stored: no translations is SQL `NULL`.
fn stored_translations(record: &TranslatableRecord) -> Option<Json<Value>> {
    match record.translations() {
        Value::Null => None,
        other => Some(Json(other.clone())),
    }
}

/// PostgreSQL storage for translatable records.
///
/// Saves overwrite the whole row. Two requests saving the same record
/// concurrently resolve as last-write-wins.
#[derive(Clone)]
pub struct RecordStore {
    pool: PgPool,
}

impl RecordStore {
    /// Connect and create the records table if needed
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.run_migrations().await?;

        info!("Record store initialized");
        Ok(store)
    }

    /// Wrap an existing pool without running migrations
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the records table and its indexes (idempotent)
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION)
            .execute(&self.pool)
            .await
            .context("Failed to create translatable_records table")?;
        Ok(())
    }

    /// Insert a new record and assign its id
    pub async fn insert(&self, record: &mut TranslatableRecord) -> Result<i64> {
        let (id, updated_at): (i64, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO translatable_records (model, fields, translations)
             VALUES ($1, $2, $3)
             RETURNING id, updated_at",
        )
        .bind(record.model().name())
        .bind(Json(record.fields().clone()))
        .bind(stored_translations(record))
        .fetch_one(&self.pool)
        .await
        .context(format!("Failed to insert {} record", record.model().name()))?;

        record.set_id(id);
        record.set_updated_at(updated_at);
        debug!("Inserted {} record {}", record.model().name(), id);
        Ok(id)
    }

    /// Persist base fields and translations. Unsaved records are inserted.
    pub async fn save(&self, record: &mut TranslatableRecord) -> Result<()> {
        let Some(id) = record.id() else {
            self.insert(record).await?;
            return Ok(());
        };

        let updated_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "UPDATE translatable_records
             SET fields = $1, translations = $2, updated_at = NOW()
             WHERE id = $3 AND model = $4
             RETURNING updated_at",
        )
        .bind(Json(record.fields().clone()))
        .bind(stored_translations(record))
        .bind(id)
        .bind(record.model().name())
        .fetch_optional(&self.pool)
        .await
        .context(format!("Failed to save {} record {}", record.model().name(), id))?;

        match updated_at {
            Some(ts) => {
                record.set_updated_at(ts);
                debug!("Saved {} record {}", record.model().name(), id);
                Ok(())
            }
            None => bail!("{} record {} no longer exists", record.model().name(), id),
        }
    }

    /// Load one record, reading in the default language
    pub async fn get(&self, model: &Arc<TranslatableModel>, id: i64) -> Result<Option<TranslatableRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE model = $1 AND id = $2",
            RECORD_COLUMNS, RECORDS_TABLE
        );
        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(model.name())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context(format!("Failed to load {} record {}", model.name(), id))?;

        row.map(|row| row.into_record(model)).transpose()
    }

    /// Delete a record together with all of its translations
    pub async fn delete(&self, model_name: &str, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM translatable_records WHERE model = $1 AND id = $2")
            .bind(model_name)
            .bind(id)
            .execute(&self.pool)
            .await
            .context(format!("Failed to delete {} record {}", model_name, id))?;

        Ok(result.rows_affected() > 0)
    }

    /// Run a query, returning records that read in the query's language.
    ///
    /// Fails on rows with malformed translations when the query requires a
    /// language entry.
    pub async fn fetch(&self, query: &TranslationQuery) -> Result<Vec<TranslatableRecord>> {
        let mut builder = query.to_sql();
        let mut rows = builder.build_query_as::<RecordRow>().fetch(&self.pool);

        let mut records = Vec::new();
        while let Some(row) = rows
            .try_next()
            .await
            .context(format!("Failed to fetch {} records", query.model().name()))?
        {
            let mut record = row.into_record(query.model())?;
            if query.requires_language_entry() && !record.has_language(query.language_code())? {
                continue;
            }
            record.select_language_strict(query.language_code());
            records.push(record);
        }

        debug!(
            "Fetched {} {} records in {}",
            records.len(),
            query.model().name(),
            query.language_code()
        );
        Ok(records)
    }

    /// Count the records a query would return, ignoring its limit.
    ///
    /// Fails the same way `fetch` does on malformed translations.
    pub async fn count(&self, query: &TranslationQuery) -> Result<i64> {
        let mut builder = query.to_count_sql();
        let (count, malformed): (i64, i64) = builder
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .context(format!("Failed to count {} records", query.model().name()))?;

        if query.requires_language_entry() && malformed > 0 {
            return Err(TranslationError::malformed(
                query.model().name(),
                format!("{} matching record(s) are not an object of objects", malformed),
            )
            .into());
        }
        Ok(count)
    }
}
