//! Generic "create entity with optional attached image" workflow.
//!
//! A submission goes through bind → resolve → build → save → upload →
//! save, with the ordering of upload and save chosen per entity by its
//! [`AssetPolicy`]. Every database write of one submission happens inside a
//! single [`UnitOfWork`] that is committed only when the whole workflow
//! succeeds. Pre-create uploads run before the unit of work begins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use giglocal_db::sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, IntoActiveModel,
};
use giglocal_db::UnitOfWork;
use giglocal_storage::{AssetStore, StorageError};
use std::marker::PhantomData;
use thiserror::Error;

use crate::binder::{FieldErrors, RawForm, UploadedFile};

/// Persisted model produced by a recipe.
pub type Record<R> =
    <<<R as CreateRecipe>::Active as ActiveModelTrait>::Entity as EntityTrait>::Model;

/// When, if ever, the submitted image is uploaded relative to the save.
pub enum AssetPolicy<R: CreateRecipe> {
    /// The entity has no image.
    None,
    /// Save first to obtain an identity, upload under a key derived from
    /// it, then save again with the URL. Image optional.
    AttachAfterCreate {
        key: fn(&Record<R>) -> String,
        attach: fn(Record<R>, String) -> R::Active,
    },
    /// Upload before the record exists; the single save carries the URL.
    /// Image required.
    RequiredBeforeCreate { key: fn() -> String },
}

/// Entity-specific parts of the workflow.
#[async_trait]
pub trait CreateRecipe: Send + Sync + Sized + 'static {
    type Input: Send + Sync;
    type Refs: Send;
    type Active: ActiveModelTrait + ActiveModelBehavior + Send + 'static;

    /// Singular name used in form views and logs.
    const ENTITY: &'static str;
    /// Listing page the caller is sent to after a successful create.
    const INDEX_PATH: &'static str;

    fn asset_policy() -> AssetPolicy<Self>;

    /// Validate raw fields into a typed input. Must not touch I/O.
    fn bind(form: &RawForm, now: DateTime<Utc>) -> Result<Self::Input, FieldErrors>;

    /// Look up anything the input references by id.
    async fn resolve(
        conn: &DatabaseTransaction,
        input: &Self::Input,
    ) -> Result<Self::Refs, WorkflowError>;

    /// Map validated input to a new record with no identity.
    fn build(
        input: Self::Input,
        refs: Self::Refs,
        image_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Self::Active;
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("validation failed on {} field(s)", .0.len())]
    Invalid(FieldErrors),

    #[error("{reference} '{value}' not found")]
    Unresolved {
        reference: &'static str,
        value: String,
    },

    #[error("write conflict: {0}")]
    Conflict(DbErr),

    #[error("image upload failed: {0}")]
    Upload(#[from] StorageError),

    #[error("saving image URL failed: {0}")]
    Attach(DbErr),

    #[error("database error: {0}")]
    Database(DbErr),
}

impl WorkflowError {
    /// Whether the caller should get the form back rather than an error page.
    pub fn redisplays_form(&self) -> bool {
        matches!(
            self,
            Self::Invalid(_) | Self::Unresolved { .. } | Self::Conflict(_)
        )
    }

    /// Form-level message for failures that carry no field detail.
    pub fn summary(&self) -> Option<&'static str> {
        match self {
            Self::Unresolved { .. } => Some("A referenced record could not be found."),
            Self::Conflict(_) => Some("The record could not be saved. Please try again."),
            _ => None,
        }
    }
}

pub struct CreateEntityWorkflow<'a, R> {
    db: &'a DatabaseConnection,
    assets: &'a dyn AssetStore,
    _recipe: PhantomData<R>,
}

impl<'a, R> CreateEntityWorkflow<'a, R>
where
    R: CreateRecipe,
    Record<R>: IntoActiveModel<R::Active>,
{
    pub fn new(db: &'a DatabaseConnection, assets: &'a dyn AssetStore) -> Self {
        Self {
            db,
            assets,
            _recipe: PhantomData,
        }
    }

    pub async fn run(&self, form: RawForm, now: DateTime<Utc>) -> Result<Record<R>, WorkflowError> {
        let input = R::bind(&form, now).map_err(WorkflowError::Invalid)?;
        let mut file = form.file;
        let policy = R::asset_policy();

        // Uploaded before the transaction opens so no connection is held
        // across the storage call.
        let uploaded = match &policy {
            AssetPolicy::RequiredBeforeCreate { key } => {
                let Some(file) = file.take() else {
                    return Err(WorkflowError::Invalid(FieldErrors::single(
                        "image",
                        "The Image field is required.",
                    )));
                };
                Some(self.upload(&key(), file).await?)
            }
            _ => None,
        };

        let uow = UnitOfWork::begin(self.db)
            .await
            .map_err(WorkflowError::Database)?;
        let refs = R::resolve(uow.conn(), &input).await?;

        let record = match policy {
            AssetPolicy::None | AssetPolicy::RequiredBeforeCreate { .. } => {
                Self::add(&uow, R::build(input, refs, uploaded, now)).await?
            }
            AssetPolicy::AttachAfterCreate { key, attach } => {
                let created = Self::add(&uow, R::build(input, refs, None, now)).await?;
                match file {
                    Some(file) => {
                        let url = self.upload(&key(&created), file).await?;
                        uow.save(attach(created, url))
                            .await
                            .map_err(WorkflowError::Attach)?
                    }
                    None => created,
                }
            }
        };

        uow.commit().await.map_err(|e| {
            tracing::error!(entity = R::ENTITY, "commit failed: {e}");
            WorkflowError::Conflict(e)
        })?;

        tracing::info!(entity = R::ENTITY, "created");
        Ok(record)
    }

    async fn add(uow: &UnitOfWork, record: R::Active) -> Result<Record<R>, WorkflowError> {
        uow.add(record).await.map_err(|e| {
            tracing::error!(entity = R::ENTITY, "save failed: {e}");
            WorkflowError::Conflict(e)
        })
    }

    async fn upload(&self, key: &str, file: UploadedFile) -> Result<String, WorkflowError> {
        tracing::debug!(
            entity = R::ENTITY,
            key,
            file_name = file.file_name.as_deref().unwrap_or(""),
            content_type = file.content_type.as_deref().unwrap_or(""),
            bytes = file.data.len(),
            "uploading image"
        );
        self.assets.put(key, &file.data).await.map_err(|e| {
            tracing::error!(entity = R::ENTITY, key, "image upload failed: {e}");
            WorkflowError::Upload(e)
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::api::artists::ArtistRecipe;
    use crate::api::gigs::GigRecipe;
    use crate::api::venues::VenueRecipe;
    use chrono::TimeZone;
    use giglocal_db::entities::{artist, gig, venue};
    use giglocal_db::sea_orm::{DatabaseBackend, MockDatabase, RuntimeErr};
    use rust_decimal::Decimal;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    fn artist_model(id: i32, image_url: Option<String>) -> artist::Model {
        artist::Model {
            id,
            name: "Camp Cope".into(),
            description: "Melbourne three-piece".into(),
            genre: "Indie".into(),
            website: "https://campcope.com".into(),
            image_url,
            created_at: now().fixed_offset(),
        }
    }

    fn venue_model(id: i32, image_url: &str) -> venue::Model {
        venue::Model {
            id,
            name: "The Tote".into(),
            description: "Collingwood rock pub".into(),
            address: "71 Johnston St".into(),
            website: "https://thetotehotel.com".into(),
            suburb: "Collingwood".into(),
            state: "VIC".into(),
            postcode: 3066,
            image_url: image_url.into(),
            created_at: now().fixed_offset(),
        }
    }

    fn gig_model(id: i32) -> gig::Model {
        gig::Model {
            id,
            artist_id: 1,
            venue_id: 2,
            date: Utc
                .with_ymd_and_hms(2026, 11, 7, 21, 0, 0)
                .unwrap()
                .fixed_offset(),
            ticket_price: Decimal::new(2500, 2),
            ticket_website: None,
            created_at: now().fixed_offset(),
        }
    }

    fn artist_form() -> RawForm {
        RawForm::default()
            .with("name", "Camp Cope")
            .with("description", "Melbourne three-piece")
            .with("genre", "Indie")
            .with("website", "https://campcope.com")
    }

    fn venue_form() -> RawForm {
        RawForm::default()
            .with("name", "The Tote")
            .with("description", "Collingwood rock pub")
            .with("address", "71 Johnston St")
            .with("website", "https://thetotehotel.com")
            .with("suburb", "Collingwood")
            .with("state", "VIC")
            .with("postcode", "3066")
            .with_file("tote.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0])
    }

    fn gig_form() -> RawForm {
        RawForm::default()
            .with("artist_id", "1")
            .with("venue_id", "2")
            .with("date", "2026-11-07T21:00")
            .with("ticket_price", "25.00")
    }

    fn conflict() -> DbErr {
        DbErr::Query(RuntimeErr::Internal(
            "could not serialize access due to concurrent update".into(),
        ))
    }

    #[tokio::test]
    async fn test_artist_without_image_saves_once_and_never_uploads() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![artist_model(1, None)]])
            .into_connection();
        let store = RecordingStore::default();

        let created = CreateEntityWorkflow::<ArtistRecipe>::new(&db, &store)
            .run(artist_form(), now())
            .await
            .unwrap();

        assert_eq!(created.id, 1);
        assert!(created.image_url.is_none());
        assert!(store.keys().is_empty());

        let stmts = statements(&db.into_transaction_log());
        assert_eq!(count_prefix(&stmts, "INSERT"), 1);
        assert_eq!(count_prefix(&stmts, "UPDATE"), 0);
        assert!(committed(&stmts));
    }

    #[tokio::test]
    async fn test_artist_with_image_saves_twice_around_one_upload() {
        let url = "https://cdn.giglocal.test/artists/1".to_string();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([
                vec![artist_model(1, None)],
                vec![artist_model(1, Some(url.clone()))],
            ])
            .into_connection();
        let store = RecordingStore::default();

        let created = CreateEntityWorkflow::<ArtistRecipe>::new(&db, &store)
            .run(artist_form().with_file("cope.png", vec![0x89, 0x50, 0x4E, 0x47]), now())
            .await
            .unwrap();

        assert_eq!(store.keys(), vec!["artists/1".to_string()]);
        assert_eq!(created.image_url.as_deref(), Some(url.as_str()));

        let stmts = statements(&db.into_transaction_log());
        assert_eq!(count_prefix(&stmts, "INSERT"), 1);
        assert_eq!(count_prefix(&stmts, "UPDATE"), 1);
        let update = stmts.iter().find(|s| s.sql.starts_with("UPDATE")).unwrap();
        assert!(update.to_string().contains(&url));
        assert!(committed(&stmts));
    }

    #[tokio::test]
    async fn test_artist_upload_failure_rolls_back() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![artist_model(1, None)]])
            .into_connection();
        let store = RecordingStore::failing();

        let err = CreateEntityWorkflow::<ArtistRecipe>::new(&db, &store)
            .run(artist_form().with_file("cope.png", vec![1, 2, 3]), now())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Upload(_)));
        assert!(!err.redisplays_form());
        let stmts = statements(&db.into_transaction_log());
        assert_eq!(count_prefix(&stmts, "UPDATE"), 0);
        assert!(!committed(&stmts));
    }

    #[tokio::test]
    async fn test_artist_attach_failure_is_fatal() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![artist_model(1, None)]])
            .append_query_errors([conflict()])
            .into_connection();
        let store = RecordingStore::default();

        let err = CreateEntityWorkflow::<ArtistRecipe>::new(&db, &store)
            .run(artist_form().with_file("cope.png", vec![1, 2, 3]), now())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Attach(_)));
        assert!(!err.redisplays_form());
        assert!(!committed(&statements(&db.into_transaction_log())));
    }

    #[tokio::test]
    async fn test_missing_required_fields_persist_nothing() {
        for field in ["name", "description", "genre", "website"] {
            let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
            let store = RecordingStore::default();
            let form = artist_form().with(field, "  ");

            let err = CreateEntityWorkflow::<ArtistRecipe>::new(&db, &store)
                .run(form, now())
                .await
                .unwrap_err();

            match err {
                WorkflowError::Invalid(errors) => assert!(errors.contains(field), "{field}"),
                other => panic!("expected validation error for {field}, got {other}"),
            }
            assert!(db.into_transaction_log().is_empty());
            assert!(store.keys().is_empty());
        }
    }

    #[tokio::test]
    async fn test_venue_uploads_then_saves_once_with_url() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![venue_model(3, "https://cdn.giglocal.test/venues/x")]])
            .into_connection();
        let store = RecordingStore::default();

        let created = CreateEntityWorkflow::<VenueRecipe>::new(&db, &store)
            .run(venue_form(), now())
            .await
            .unwrap();
        assert_eq!(created.id, 3);

        let keys = store.keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("venues/"));

        let stmts = statements(&db.into_transaction_log());
        assert_eq!(count_prefix(&stmts, "INSERT"), 1);
        assert_eq!(count_prefix(&stmts, "UPDATE"), 0);
        let insert = stmts.iter().find(|s| s.sql.starts_with("INSERT")).unwrap();
        assert!(insert
            .to_string()
            .contains(&format!("https://cdn.giglocal.test/{}", keys[0])));
    }

    #[tokio::test]
    async fn test_venue_without_image_is_invalid() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let store = RecordingStore::default();
        let mut form = venue_form();
        form.file = None;

        let err = CreateEntityWorkflow::<VenueRecipe>::new(&db, &store)
            .run(form, now())
            .await
            .unwrap_err();

        match err {
            WorkflowError::Invalid(errors) => assert!(errors.contains("image")),
            other => panic!("expected validation error, got {other}"),
        }
        assert!(store.keys().is_empty());
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn test_venue_upload_failure_saves_nothing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let store = RecordingStore::failing();

        let err = CreateEntityWorkflow::<VenueRecipe>::new(&db, &store)
            .run(venue_form(), now())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Upload(_)));
        // No transaction was opened for the failed upload
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn test_venue_write_conflict_after_upload_redisplays_form() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([conflict()])
            .into_connection();
        let store = RecordingStore::default();

        let err = CreateEntityWorkflow::<VenueRecipe>::new(&db, &store)
            .run(venue_form(), now())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Conflict(_)));
        assert!(err.redisplays_form());
        assert_eq!(store.keys().len(), 1);
        let stmts = statements(&db.into_transaction_log());
        assert!(!committed(&stmts));
    }

    #[tokio::test]
    async fn test_artist_write_conflict_skips_upload_and_redisplays_form() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([conflict()])
            .into_connection();
        let store = RecordingStore::default();

        let err = CreateEntityWorkflow::<ArtistRecipe>::new(&db, &store)
            .run(artist_form().with_file("cope.png", vec![1, 2, 3]), now())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Conflict(_)));
        assert!(err.redisplays_form());
        assert!(err.summary().is_some());
        assert!(store.keys().is_empty());
        let stmts = statements(&db.into_transaction_log());
        assert_eq!(count_prefix(&stmts, "UPDATE"), 0);
        assert!(!committed(&stmts));
    }

    #[tokio::test]
    async fn test_gig_resolves_references_and_saves() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![artist_model(1, None)]])
            .append_query_results([vec![venue_model(2, "https://cdn.giglocal.test/venues/v")]])
            .append_query_results([vec![gig_model(9)]])
            .into_connection();
        let store = RecordingStore::default();

        let created = CreateEntityWorkflow::<GigRecipe>::new(&db, &store)
            .run(gig_form(), now())
            .await
            .unwrap();

        assert_eq!(created.id, 9);
        assert!(store.keys().is_empty());
        let stmts = statements(&db.into_transaction_log());
        assert_eq!(count_prefix(&stmts, "SELECT"), 2);
        assert_eq!(count_prefix(&stmts, "INSERT"), 1);
        assert!(committed(&stmts));
    }

    #[tokio::test]
    async fn test_gig_with_unknown_artist_is_not_created() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<artist::Model>::new()])
            .into_connection();
        let store = RecordingStore::default();

        let err = CreateEntityWorkflow::<GigRecipe>::new(&db, &store)
            .run(gig_form(), now())
            .await
            .unwrap_err();

        match &err {
            WorkflowError::Unresolved { reference, value } => {
                assert_eq!(*reference, "artist");
                assert_eq!(value, "1");
            }
            other => panic!("expected unresolved artist, got {other}"),
        }
        assert!(err.redisplays_form());
        let stmts = statements(&db.into_transaction_log());
        assert_eq!(count_prefix(&stmts, "INSERT"), 0);
        assert!(!committed(&stmts));
    }

    #[tokio::test]
    async fn test_gig_with_unknown_venue_is_not_created() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![artist_model(1, None)]])
            .append_query_results([Vec::<venue::Model>::new()])
            .into_connection();
        let store = RecordingStore::default();

        let err = CreateEntityWorkflow::<GigRecipe>::new(&db, &store)
            .run(gig_form(), now())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::Unresolved {
                reference: "venue",
                ..
            }
        ));
        let stmts = statements(&db.into_transaction_log());
        assert_eq!(count_prefix(&stmts, "INSERT"), 0);
    }

    #[tokio::test]
    async fn test_gig_with_non_numeric_reference_is_unresolved_without_query() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let store = RecordingStore::default();

        let err = CreateEntityWorkflow::<GigRecipe>::new(&db, &store)
            .run(gig_form().with("artist_id", "abc"), now())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::Unresolved {
                reference: "artist",
                ..
            }
        ));
        let stmts = statements(&db.into_transaction_log());
        assert_eq!(count_prefix(&stmts, "SELECT"), 0);
    }

    #[tokio::test]
    async fn test_gig_in_the_past_is_rejected_before_any_lookup() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let store = RecordingStore::default();

        let err = CreateEntityWorkflow::<GigRecipe>::new(&db, &store)
            .run(gig_form().with("date", "2026-10-19T09:00"), now())
            .await
            .unwrap_err();

        match err {
            WorkflowError::Invalid(errors) => {
                assert_eq!(
                    errors.get("date").unwrap()[0],
                    "The date must be in the future."
                );
            }
            other => panic!("expected validation error, got {other}"),
        }
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn test_write_conflict_redisplays_form() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![artist_model(1, None)]])
            .append_query_results([vec![venue_model(2, "u")]])
            .append_query_errors([conflict()])
            .into_connection();
        let store = RecordingStore::default();

        let err = CreateEntityWorkflow::<GigRecipe>::new(&db, &store)
            .run(gig_form(), now())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Conflict(_)));
        assert!(err.redisplays_form());
        assert!(err.summary().is_some());
        assert!(!committed(&statements(&db.into_transaction_log())));
    }

    #[test]
    fn test_error_display() {
        let err = WorkflowError::Unresolved {
            reference: "venue",
            value: "42".into(),
        };
        assert_eq!(err.to_string(), "venue '42' not found");

        let err = WorkflowError::Invalid(FieldErrors::single("name", "required"));
        assert_eq!(err.to_string(), "validation failed on 1 field(s)");
    }
}
