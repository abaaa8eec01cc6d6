//! Request middleware that activates a language from a header.
//!
//! A request carrying `x-translation-language: tr_tr` (header name
//! configurable) runs with `tr_tr` active, provided the code is one of the
//! available languages. Anything else runs with the default language. The
//! active language is exposed two ways: as an `ActiveLanguage` request
//! extension for handlers, and through `current_language()` for code that
//! has no access to the request (queries built deeper in the call stack).

use crate::error::TranslationError;
use crate::i18n::{normalize_code, TranslationSettings};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName},
    middleware::Next,
    response::Response,
};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Header consulted when none is configured.
pub const DEFAULT_LANGUAGE_HEADER: &str = "x-translation-language";

tokio::task_local! {
    static ACTIVE_LANGUAGE: String;
}

/// The language active for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveLanguage(pub String);

/// The language activated for the running task, if any.
pub fn current_language() -> Option<String> {
    ACTIVE_LANGUAGE.try_with(Clone::clone).ok()
}

/// Run `fut` with `code` as the active language.
pub async fn with_language<F>(code: String, fut: F) -> F::Output
where
    F: Future,
{
    ACTIVE_LANGUAGE.scope(code, fut).await
}

/// Middleware state: which header to read and which languages it may select.
#[derive(Debug, Clone)]
pub struct LanguageHeader {
    settings: Arc<TranslationSettings>,
    header: HeaderName,
}

impl LanguageHeader {
    pub fn new(settings: Arc<TranslationSettings>, header: &str) -> Result<Self, TranslationError> {
        let header = HeaderName::try_from(header).map_err(|e| {
            TranslationError::ImproperlyConfigured(format!(
                "invalid language header name '{}': {}",
                header, e
            ))
        })?;
        Ok(Self { settings, header })
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// The language requested by the header, if it is available.
    ///
    /// Only full codes listed as shorthand targets are accepted; the
    /// shorthand keys themselves are not.
    pub fn requested_language(&self, headers: &HeaderMap) -> Option<String> {
        let raw = headers.get(&self.header)?.to_str().ok()?.trim();
        if raw.is_empty() {
            return None;
        }

        let code = normalize_code(raw);
        if self.settings.is_available(&code) {
            Some(code)
        } else {
            debug!("Ignoring unavailable language '{}' from {}", raw, self.header);
            None
        }
    }

    /// The requested language, or the default.
    pub fn resolve(&self, headers: &HeaderMap) -> String {
        self.requested_language(headers)
            .unwrap_or_else(|| self.settings.default_language().to_string())
    }
}

/// Activate the request's language for the rest of the handler chain.
///
/// Install with `axum::middleware::from_fn_with_state(header, activate_language)`.
pub async fn activate_language(
    State(language): State<LanguageHeader>,
    mut req: Request,
    next: Next,
) -> Response {
    let code = language.resolve(req.headers());
    req.extensions_mut().insert(ActiveLanguage(code.clone()));
    with_language(code, next.run(req)).await
}
