use async_trait::async_trait;
use axum::{
    extract::{Multipart, Query, State},
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use giglocal_db::entities::venue;
use giglocal_db::sea_orm::{DatabaseTransaction, EntityTrait, PaginatorTrait, QueryOrder, Set};
use giglocal_db::AppState;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    db_error, multipart_error, respond, ApiError, FormView, PaginatedResponse, PaginationParams,
};
use crate::binder::{Binder, FieldErrors, RawForm};
use crate::workflow::{AssetPolicy, CreateEntityWorkflow, CreateRecipe, WorkflowError};

#[derive(Debug, Serialize)]
pub struct VenueResponse {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub address: String,
    pub website: String,
    pub suburb: String,
    pub state: String,
    pub postcode: i32,
    pub image_url: String,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
}

impl From<venue::Model> for VenueResponse {
    fn from(v: venue::Model) -> Self {
        Self {
            id: v.id,
            name: v.name,
            description: v.description,
            address: v.address,
            website: v.website,
            suburb: v.suburb,
            state: v.state,
            postcode: v.postcode,
            image_url: v.image_url,
            created_at: v.created_at,
        }
    }
}

#[derive(Debug)]
pub struct VenueInput {
    pub name: String,
    pub description: String,
    pub address: String,
    pub website: String,
    pub suburb: String,
    pub state: String,
    pub postcode: i32,
}

/// Venues need their image before the row exists, so it is keyed by a
/// fresh UUID instead of the database id.
pub struct VenueRecipe;

fn image_key() -> String {
    format!("venues/{}", Uuid::new_v4())
}

#[async_trait]
impl CreateRecipe for VenueRecipe {
    type Input = VenueInput;
    type Refs = ();
    type Active = venue::ActiveModel;

    const ENTITY: &'static str = "venue";
    const INDEX_PATH: &'static str = "/admin/venues";

    fn asset_policy() -> AssetPolicy<Self> {
        AssetPolicy::RequiredBeforeCreate { key: image_key }
    }

    fn bind(form: &RawForm, _now: DateTime<Utc>) -> Result<VenueInput, FieldErrors> {
        let mut b = Binder::new(form);
        let input = VenueInput {
            name: b.required("name", "Name"),
            description: b.required("description", "Description"),
            address: b.required("address", "Address"),
            website: b.required("website", "Website"),
            suburb: b.required("suburb", "Suburb"),
            state: b.required("state", "State"),
            postcode: b.required_int("postcode", "Postcode"),
        };
        b.require_file("image", "Image");
        b.finish(input)
    }

    async fn resolve(
        _conn: &DatabaseTransaction,
        _input: &VenueInput,
    ) -> Result<(), WorkflowError> {
        Ok(())
    }

    fn build(
        input: VenueInput,
        _refs: (),
        image_url: Option<String>,
        now: DateTime<Utc>,
    ) -> venue::ActiveModel {
        venue::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            address: Set(input.address),
            website: Set(input.website),
            suburb: Set(input.suburb),
            state: Set(input.state),
            postcode: Set(input.postcode),
            image_url: Set(image_url.unwrap_or_default()),
            created_at: Set(now.fixed_offset()),
            ..Default::default()
        }
    }
}

/// GET /admin/venues
pub async fn list_venues(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<VenueResponse>>, ApiError> {
    let (page, per_page) = params.resolve();

    let paginator = venue::Entity::find()
        .order_by_asc(venue::Column::Name)
        .paginate(&state.db, per_page);

    let total = paginator.num_items().await.map_err(db_error)?;
    let venues = paginator.fetch_page(page - 1).await.map_err(db_error)?;

    Ok(Json(PaginatedResponse::new(
        venues.into_iter().map(VenueResponse::from).collect(),
        total,
        page,
        per_page,
    )))
}

/// GET /admin/venues/create
pub async fn create_form() -> Json<FormView> {
    Json(FormView::empty(VenueRecipe::ENTITY))
}

/// POST /admin/venues/create
pub async fn create_venue(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = RawForm::from_multipart(multipart)
        .await
        .map_err(multipart_error)?;
    let values = form.values();

    let result = CreateEntityWorkflow::<VenueRecipe>::new(&state.db, state.storage.as_ref())
        .run(form, Utc::now())
        .await;

    respond::<VenueRecipe>(result, values, None)
}
