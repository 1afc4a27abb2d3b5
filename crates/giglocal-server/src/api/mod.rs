pub mod artists;
pub mod gigs;
pub mod venues;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use giglocal_db::sea_orm::DbErr;
use giglocal_db::AppState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::binder::FieldErrors;
use crate::workflow::{CreateRecipe, Record, WorkflowError};

/// Upper bound on a create-form body, image included.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub type ApiError = (StatusCode, Json<serde_json::Value>);

#[derive(Debug, Serialize)]
struct ApiStatus {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PaginationParams {
    /// 1-based page and clamped page size. The page is capped so the row
    /// offset stays within a signed 64-bit SQL `OFFSET`.
    pub fn resolve(&self) -> (u64, u64) {
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let max_page = i64::MAX as u64 / per_page;
        let page = self.page.unwrap_or(1).clamp(1, max_page);
        (page, per_page)
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: u64, page: u64, per_page: u64) -> Self {
        Self {
            data,
            total,
            page,
            per_page,
            total_pages: total.div_ceil(per_page),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// State of a create form as shown to the admin.
#[derive(Debug, Serialize)]
pub struct FormView {
    pub entity: &'static str,
    pub values: BTreeMap<String, String>,
    pub errors: FieldErrors,
    pub summary: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

impl FormView {
    pub fn empty(entity: &'static str) -> Self {
        Self {
            entity,
            values: BTreeMap::new(),
            errors: FieldErrors::default(),
            summary: Vec::new(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = Some(options);
        self
    }
}

/// Turn a workflow outcome into a redirect, a redisplayed form, or an error.
pub fn respond<R: CreateRecipe>(
    result: Result<Record<R>, WorkflowError>,
    values: BTreeMap<String, String>,
    options: Option<serde_json::Value>,
) -> Result<Response, ApiError> {
    let err = match result {
        Ok(_) => return Ok(Redirect::to(R::INDEX_PATH).into_response()),
        Err(err) => err,
    };

    if !err.redisplays_form() {
        tracing::error!(entity = R::ENTITY, "create failed: {err}");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": err.to_string() })),
        ));
    }

    let summary = err.summary().map(str::to_string).into_iter().collect();
    let errors = match err {
        WorkflowError::Invalid(errors) => errors,
        _ => FieldErrors::default(),
    };

    Ok(Json(FormView {
        entity: R::ENTITY,
        values,
        errors,
        summary,
        options,
    })
    .into_response())
}

pub fn db_error(e: DbErr) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": format!("DB error: {e}") })),
    )
}

pub fn multipart_error(e: MultipartError) -> ApiError {
    (
        e.status(),
        Json(serde_json::json!({ "error": format!("Invalid form submission: {}", e.body_text()) })),
    )
}

/// Admin routes plus local media serving. Response layers are added by the caller.
pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/artists", get(artists::list_artists))
        .route(
            "/artists/create",
            get(artists::create_form).post(artists::create_artist),
        )
        .route("/venues", get(venues::list_venues))
        .route(
            "/venues/create",
            get(venues::create_form).post(venues::create_venue),
        )
        .route("/gigs", get(gigs::list_gigs))
        .route(
            "/gigs/create",
            get(gigs::create_form).post(gigs::create_gig),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    let mut app = Router::new()
        .route("/healthz", get(healthz))
        .nest("/admin", admin);

    if let Some(root) = state.storage.local_root() {
        app = app.nest_service("/media", ServeDir::new(root.to_path_buf()));
    }

    app.with_state(state)
}

async fn healthz() -> Json<ApiStatus> {
    Json(ApiStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
