//! HTTP API over translatable records.
//!
//! Every route runs behind [`activate_language`], so reads default to the
//! language requested by the translation header. Writes require the API key
//! when one is configured.

use crate::config::Config;
use crate::db::RecordStore;
use crate::error::TranslationError;
use crate::middleware::{activate_language, ActiveLanguage, LanguageHeader};
use crate::model::{ModelRegistry, TranslatableModel};
use crate::query::{SortOrder, TranslationQuery};
use crate::record::{FieldMap, TranslatableRecord};
use crate::security::is_authorized;
use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct AppState {
    store: RecordStore,
    models: Arc<ModelRegistry>,
    api_key: Option<String>,
}

impl AppState {
    pub fn new(store: RecordStore, models: Arc<ModelRegistry>, api_key: Option<String>) -> Self {
        Self {
            store,
            models,
            api_key,
        }
    }

    fn model(&self, name: &str) -> Result<Arc<TranslatableModel>, ApiError> {
        self.models
            .get(name)
            .ok_or_else(|| ApiError::NotFound(format!("unknown model '{}'", name)))
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        if is_authorized(headers, self.api_key.as_deref()) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("invalid or missing API key")]
    Unauthorized,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<TranslationError> for ApiError {
    fn from(err: TranslationError) -> Self {
        match err {
            TranslationError::NonTranslatableField { .. } => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal(e) => {
                error!("Request failed: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// A record as served: fields resolved in its language.
#[derive(Debug, Serialize)]
pub struct RecordView {
    pub id: Option<i64>,
    pub model: String,
    pub language: String,
    /// Base fields with translatable ones resolved
    pub fields: FieldMap,
    /// Translatable values of the first language with an entry
    pub translation: FieldMap,
    /// Languages stored on the record
    pub languages: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RecordView {
    pub fn from_record(record: &TranslatableRecord) -> Result<Self, TranslationError> {
        Ok(Self {
            id: record.id(),
            model: record.model().name().to_string(),
            language: record.language().to_string(),
            fields: record.resolved_fields()?,
            translation: record.language_as_dict(None, record.fallback_enabled())?,
            languages: record.languages()?.into_iter().map(str::to_string).collect(),
            updated_at: record.updated_at(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    language: Option<String>,
    #[serde(default)]
    strict: bool,
    order_by: Option<String>,
    #[serde(default)]
    order: SortOrder,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    language: Option<String>,
    #[serde(default = "default_fallback")]
    fallback: bool,
}

fn default_fallback() -> bool {
    true
}

fn object_body(body: Value) -> Result<FieldMap, ApiError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::BadRequest("request body must be a JSON object".to_string())),
    }
}

/// `GET /health`
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /models/:model/records`
async fn list_records(
    State(state): State<AppState>,
    Extension(active): Extension<ActiveLanguage>,
    Path(model_name): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let model = state.model(&model_name)?;
    let code = params.language.unwrap_or(active.0);

    let mut query = TranslationQuery::new(model);
    query = if params.strict {
        query.language(&code)
    } else {
        query.language_or_default(&code)
    };
    if let Some(path) = params.order_by.as_deref() {
        query = query.order_by_json_path(path, None, params.order);
    }
    if let Some(limit) = params.limit {
        query = query.limit(limit);
    }

    let records = state.store.fetch(&query).await?;
    let views = records
        .iter()
        .map(RecordView::from_record)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(json!({
        "model": model_name,
        "language": query.language_code(),
        "count": views.len(),
        "records": views,
    })))
}

/// `GET /models/:model/records/:id`
async fn get_record(
    State(state): State<AppState>,
    Extension(active): Extension<ActiveLanguage>,
    Path((model_name, id)): Path<(String, i64)>,
    Query(params): Query<ReadParams>,
) -> Result<Json<RecordView>, ApiError> {
    let model = state.model(&model_name)?;
    let mut record = state
        .store
        .get(&model, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} record {} not found", model_name, id)))?;

    let code = params.language.unwrap_or(active.0);
    if params.fallback {
        record.select_language(&code);
    } else {
        record.select_language_strict(&code);
    }

    Ok(Json(RecordView::from_record(&record)?))
}

/// `POST /models/:model/records`
async fn create_record(
    State(state): State<AppState>,
    Extension(active): Extension<ActiveLanguage>,
    headers: HeaderMap,
    Path(model_name): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<RecordView>), ApiError> {
    state.authorize(&headers)?;
    let model = state.model(&model_name)?;
    let fields = object_body(body)?;

    let mut record = TranslatableRecord::create_in(model, &active.0, fields)?;
    state.store.insert(&mut record).await?;
    info!(
        "Created {} record {:?} in {}",
        model_name,
        record.id(),
        record.language()
    );

    Ok((StatusCode::CREATED, Json(RecordView::from_record(&record)?)))
}

/// `PUT /models/:model/records/:id/translations/:language`
async fn put_translation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((model_name, id, language)): Path<(String, i64, String)>,
    Json(body): Json<Value>,
) -> Result<Json<RecordView>, ApiError> {
    state.authorize(&headers)?;
    let model = state.model(&model_name)?;
    let values = object_body(body)?;

    if let Some(field) = values.keys().find(|f| !model.is_translatable(f)) {
        return Err(TranslationError::NonTranslatableField {
            field: field.clone(),
        }
        .into());
    }

    let mut record = state
        .store
        .get(&model, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} record {} not found", model_name, id)))?;

    record.translate(Some(language.as_str()), values)?;
    state.store.save(&mut record).await?;
    info!("Saved {} translation of {} record {}", record.language(), model_name, id);

    Ok(Json(RecordView::from_record(&record)?))
}

/// `DELETE /models/:model/records/:id`
async fn delete_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((model_name, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    state.authorize(&headers)?;
    state.model(&model_name)?;

    if state.store.delete(&model_name, id).await? {
        info!("Deleted {} record {}", model_name, id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("{} record {} not found", model_name, id)))
    }
}

/// Build the axum router with shared state.
pub fn build_router(state: AppState, language: LanguageHeader) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/models/:model/records", get(list_records).post(create_record))
        .route(
            "/models/:model/records/:id",
            get(get_record).delete(delete_record),
        )
        .route(
            "/models/:model/records/:id/translations/:language",
            put(put_translation),
        )
        .layer(middleware::from_fn_with_state(language, activate_language))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Connect the store and serve until the process exits.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let settings = Arc::new(config.translations.clone());
    let models = ModelRegistry::from_definitions(&config.models, Arc::clone(&settings));
    if models.names().next().is_none() {
        warn!("No translatable models configured (set TRANSLATABLE_MODELS)");
    }
    for name in models.names() {
        info!("Registered translatable model '{}'", name);
    }

    let language = LanguageHeader::new(Arc::clone(&settings), &config.language_header)?;
    let store = RecordStore::connect(&config.database_url).await?;
    let state = AppState::new(store, Arc::new(models), config.api_key.clone());
    let app = build_router(state, language);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to {}", addr))?;

    info!(
        "Listening on {} (default language {}, header {})",
        addr,
        settings.default_language(),
        config.language_header
    );
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
