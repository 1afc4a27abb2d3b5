use async_trait::async_trait;
use axum::{
    extract::{Multipart, Query, State},
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use giglocal_db::entities::{artist, gig, venue};
use giglocal_db::sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, PrimaryKeyTrait, QueryFilter, QueryOrder, Set,
};
use giglocal_db::AppState;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    db_error, multipart_error, respond, ApiError, FormView, PaginatedResponse, PaginationParams,
    SelectOption,
};
use crate::binder::{Binder, FieldErrors, RawForm};
use crate::workflow::{AssetPolicy, CreateEntityWorkflow, CreateRecipe, WorkflowError};

#[derive(Debug, Serialize)]
pub struct GigResponse {
    pub id: i32,
    pub artist_id: i32,
    pub artist_name: Option<String>,
    pub venue_id: i32,
    pub venue_name: Option<String>,
    pub date: chrono::DateTime<chrono::FixedOffset>,
    pub ticket_price: Decimal,
    pub ticket_website: Option<String>,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
}

#[derive(Debug)]
pub struct GigInput {
    /// Kept as submitted; parsed during resolution.
    pub artist_id: String,
    pub venue_id: String,
    pub date: DateTime<Utc>,
    pub ticket_price: Decimal,
    pub ticket_website: Option<String>,
}

pub struct GigRefs {
    pub artist: artist::Model,
    pub venue: venue::Model,
}

pub struct GigRecipe;

/// Look up a referenced record by its submitted id. An id that does not
/// parse is treated the same as one that matches nothing.
async fn find_reference<E>(
    conn: &impl ConnectionTrait,
    reference: &'static str,
    raw: &str,
) -> Result<E::Model, WorkflowError>
where
    E: EntityTrait,
    <E::PrimaryKey as PrimaryKeyTrait>::ValueType: From<i32>,
{
    let found = match raw.parse::<i32>() {
        Ok(id) => E::find_by_id(id)
            .one(conn)
            .await
            .map_err(WorkflowError::Database)?,
        Err(_) => None,
    };

    found.ok_or_else(|| {
        tracing::warn!(reference, value = raw, "referenced record not found");
        WorkflowError::Unresolved {
            reference,
            value: raw.to_string(),
        }
    })
}

#[async_trait]
impl CreateRecipe for GigRecipe {
    type Input = GigInput;
    type Refs = GigRefs;
    type Active = gig::ActiveModel;

    const ENTITY: &'static str = "gig";
    const INDEX_PATH: &'static str = "/admin/gigs";

    fn asset_policy() -> AssetPolicy<Self> {
        AssetPolicy::None
    }

    fn bind(form: &RawForm, now: DateTime<Utc>) -> Result<GigInput, FieldErrors> {
        let mut b = Binder::new(form);
        let input = GigInput {
            artist_id: b.required("artist_id", "Artist"),
            venue_id: b.required("venue_id", "Venue"),
            date: b.required_future_date("date", "Date and time", now),
            ticket_price: b.optional_price("ticket_price", "Ticket price"),
            ticket_website: b.optional("ticket_website"),
        };
        b.finish(input)
    }

    async fn resolve(
        conn: &DatabaseTransaction,
        input: &GigInput,
    ) -> Result<GigRefs, WorkflowError> {
        let artist = find_reference::<artist::Entity>(conn, "artist", &input.artist_id).await?;
        let venue = find_reference::<venue::Entity>(conn, "venue", &input.venue_id).await?;
        Ok(GigRefs { artist, venue })
    }

    fn build(
        input: GigInput,
        refs: GigRefs,
        _image_url: Option<String>,
        now: DateTime<Utc>,
    ) -> gig::ActiveModel {
        gig::ActiveModel {
            artist_id: Set(refs.artist.id),
            venue_id: Set(refs.venue.id),
            date: Set(input.date.fixed_offset()),
            ticket_price: Set(input.ticket_price),
            ticket_website: Set(input.ticket_website),
            created_at: Set(now.fixed_offset()),
            ..Default::default()
        }
    }
}

/// Artist and venue select lists for the gig form, each ordered by name.
pub async fn gig_options(db: &DatabaseConnection) -> Result<serde_json::Value, DbErr> {
    let artists: Vec<SelectOption> = artist::Entity::find()
        .order_by_asc(artist::Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(|a| SelectOption {
            value: a.id.to_string(),
            label: a.name,
        })
        .collect();

    let venues: Vec<SelectOption> = venue::Entity::find()
        .order_by_asc(venue::Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(|v| SelectOption {
            value: v.id.to_string(),
            label: v.name,
        })
        .collect();

    Ok(serde_json::json!({ "artists": artists, "venues": venues }))
}

/// GET /admin/gigs
pub async fn list_gigs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<GigResponse>>, ApiError> {
    let (page, per_page) = params.resolve();

    let paginator = gig::Entity::find()
        .order_by_asc(gig::Column::Date)
        .paginate(&state.db, per_page);

    let total = paginator.num_items().await.map_err(db_error)?;
    let gigs = paginator.fetch_page(page - 1).await.map_err(db_error)?;

    let mut artist_names = HashMap::new();
    let mut venue_names = HashMap::new();
    if !gigs.is_empty() {
        let artist_ids: Vec<i32> = gigs.iter().map(|g| g.artist_id).collect();
        let venue_ids: Vec<i32> = gigs.iter().map(|g| g.venue_id).collect();

        artist_names = artist::Entity::find()
            .filter(artist::Column::Id.is_in(artist_ids))
            .all(&state.db)
            .await
            .map_err(db_error)?
            .into_iter()
            .map(|a| (a.id, a.name))
            .collect();
        venue_names = venue::Entity::find()
            .filter(venue::Column::Id.is_in(venue_ids))
            .all(&state.db)
            .await
            .map_err(db_error)?
            .into_iter()
            .map(|v| (v.id, v.name))
            .collect();
    }

    let data = gigs
        .into_iter()
        .map(|g| GigResponse {
            id: g.id,
            artist_id: g.artist_id,
            artist_name: artist_names.get(&g.artist_id).cloned(),
            venue_id: g.venue_id,
            venue_name: venue_names.get(&g.venue_id).cloned(),
            date: g.date,
            ticket_price: g.ticket_price,
            ticket_website: g.ticket_website,
            created_at: g.created_at,
        })
        .collect();

    Ok(Json(PaginatedResponse::new(data, total, page, per_page)))
}

/// GET /admin/gigs/create
pub async fn create_form(State(state): State<Arc<AppState>>) -> Result<Json<FormView>, ApiError> {
    let options = gig_options(&state.db).await.map_err(db_error)?;
    Ok(Json(FormView::empty(GigRecipe::ENTITY).with_options(options)))
}

/// POST /admin/gigs/create
pub async fn create_gig(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = RawForm::from_multipart(multipart)
        .await
        .map_err(multipart_error)?;
    let values = form.values();

    let result = CreateEntityWorkflow::<GigRecipe>::new(&state.db, state.storage.as_ref())
        .run(form, Utc::now())
        .await;

    let options = match &result {
        Err(e) if e.redisplays_form() => Some(gig_options(&state.db).await.map_err(db_error)?),
        _ => None,
    };

    respond::<GigRecipe>(result, values, options)
}
