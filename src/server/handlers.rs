/// API request handlers
///
/// Success bodies carry `error: false`; failures use the shared error
/// envelope `{error, error_code, message, result: null}`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::core::{
    list_documents, Database, Document, Page, QueryParams, Settings, StoreError,
};
use crate::utils::constants::SENT_MAIL_TABLE;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let db = settings.database();
        Self::with_database(settings, db)
    }

    pub fn with_database(settings: Settings, db: Database) -> Self {
        Self {
            db: Arc::new(db),
            settings: Arc::new(settings),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    error: bool,
    result: T,
}

impl<T> ApiResponse<T> {
    fn ok(result: T) -> Self {
        Self {
            error: false,
            result,
        }
    }
}

/// One page of a listing
#[derive(Serialize)]
pub struct PageResult {
    error: bool,
    result: Vec<Document>,
    #[serde(flatten)]
    page: Page,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED",
            message: "Invalid or missing API token in the Authorization header.".to_string(),
        }
    }

    pub fn unknown() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "UNKNOWN_ERROR",
            message: "An unknown error has occurred. Please contact the administrator of this site."
                .to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::warn!("Store error while handling request: {}", err);
        ApiError::unknown()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": true,
                "error_code": self.code,
                "message": self.message,
                "result": null,
            })),
        )
            .into_response()
    }
}

// ============================================================================
// Email Handlers
// ============================================================================

/// `GET /api/emails` - every query parameter that is not a paging control is a filter
pub async fn list_emails(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<PageResult>, ApiError> {
    let params: QueryParams = pairs.into_iter().collect();
    let store = state.db.store().await?;

    let listing = list_documents(
        store.as_ref(),
        SENT_MAIL_TABLE,
        &params,
        &state.settings.page_limits(),
    )
    .await?;

    Ok(Json(PageResult {
        error: false,
        result: listing.result,
        page: listing.page,
    }))
}

/// `GET /api/emails/:id`
pub async fn get_email(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    let store = state.db.store().await?;

    match store.get(SENT_MAIL_TABLE, &id).await? {
        Some(doc) => Ok(Json(ApiResponse::ok(doc))),
        None => Err(ApiError::not_found(format!("No email found with queue id '{}'", id))),
    }
}

// ============================================================================
// Misc Handlers
// ============================================================================

pub async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::ok("healthy".to_string()))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found(
        "The requested resource or URL was not found. You may wish to check the URL for typos.",
    )
}
