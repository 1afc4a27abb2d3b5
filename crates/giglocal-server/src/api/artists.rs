use async_trait::async_trait;
use axum::{
    extract::{Multipart, Query, State},
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use giglocal_db::entities::artist;
use giglocal_db::sea_orm::{
    DatabaseTransaction, EntityTrait, IntoActiveModel, PaginatorTrait, QueryOrder, Set,
};
use giglocal_db::AppState;
use serde::Serialize;
use std::sync::Arc;

use super::{
    db_error, multipart_error, respond, ApiError, FormView, PaginatedResponse, PaginationParams,
};
use crate::binder::{Binder, FieldErrors, RawForm};
use crate::workflow::{AssetPolicy, CreateEntityWorkflow, CreateRecipe, WorkflowError};

pub const NAME_MAX_LEN: usize = 50;

#[derive(Debug, Serialize)]
pub struct ArtistResponse {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub genre: String,
    pub website: String,
    pub image_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
}

impl From<artist::Model> for ArtistResponse {
    fn from(a: artist::Model) -> Self {
        Self {
            id: a.id,
            name: a.name,
            description: a.description,
            genre: a.genre,
            website: a.website,
            image_url: a.image_url,
            created_at: a.created_at,
        }
    }
}

#[derive(Debug)]
pub struct ArtistInput {
    pub name: String,
    pub description: String,
    pub genre: String,
    pub website: String,
}

/// Artists are saved first; the image is stored under the new id.
pub struct ArtistRecipe;

fn image_key(created: &artist::Model) -> String {
    format!("artists/{}", created.id)
}

fn attach_image(created: artist::Model, url: String) -> artist::ActiveModel {
    let mut active = created.into_active_model();
    active.image_url = Set(Some(url));
    active
}

#[async_trait]
impl CreateRecipe for ArtistRecipe {
    type Input = ArtistInput;
    type Refs = ();
    type Active = artist::ActiveModel;

    const ENTITY: &'static str = "artist";
    const INDEX_PATH: &'static str = "/admin/artists";

    fn asset_policy() -> AssetPolicy<Self> {
        AssetPolicy::AttachAfterCreate {
            key: image_key,
            attach: attach_image,
        }
    }

    fn bind(form: &RawForm, _now: DateTime<Utc>) -> Result<ArtistInput, FieldErrors> {
        let mut b = Binder::new(form);
        let input = ArtistInput {
            name: b.required_max_len("name", "Name", NAME_MAX_LEN),
            description: b.required("description", "Description"),
            genre: b.required("genre", "Genre"),
            website: b.required("website", "Website"),
        };
        b.finish(input)
    }

    async fn resolve(
        _conn: &DatabaseTransaction,
        _input: &ArtistInput,
    ) -> Result<(), WorkflowError> {
        Ok(())
    }

    fn build(
        input: ArtistInput,
        _refs: (),
        image_url: Option<String>,
        now: DateTime<Utc>,
    ) -> artist::ActiveModel {
        artist::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            genre: Set(input.genre),
            website: Set(input.website),
            image_url: Set(image_url),
            created_at: Set(now.fixed_offset()),
            ..Default::default()
        }
    }
}

/// GET /admin/artists
pub async fn list_artists(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<ArtistResponse>>, ApiError> {
    let (page, per_page) = params.resolve();

    let paginator = artist::Entity::find()
        .order_by_asc(artist::Column::Name)
        .paginate(&state.db, per_page);

    let total = paginator.num_items().await.map_err(db_error)?;
    let artists = paginator.fetch_page(page - 1).await.map_err(db_error)?;

    Ok(Json(PaginatedResponse::new(
        artists.into_iter().map(ArtistResponse::from).collect(),
        total,
        page,
        per_page,
    )))
}

/// GET /admin/artists/create
pub async fn create_form() -> Json<FormView> {
    Json(FormView::empty(ArtistRecipe::ENTITY))
}

/// POST /admin/artists/create
pub async fn create_artist(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = RawForm::from_multipart(multipart)
        .await
        .map_err(multipart_error)?;
    let values = form.values();

    let result = CreateEntityWorkflow::<ArtistRecipe>::new(&state.db, state.storage.as_ref())
        .run(form, Utc::now())
        .await;

    respond::<ArtistRecipe>(result, values, None)
}
