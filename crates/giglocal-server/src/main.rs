use axum::{http::HeaderValue, Router};
use giglocal_db::AppState;
use giglocal_storage::AssetStore;
use sea_orm_migration::MigratorTrait;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod api;
mod binder;
mod workflow;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Database connection
    let db_config = giglocal_db::DatabaseConfig::from_env();
    tracing::info!("connecting to database...");
    let db = giglocal_db::connect(&db_config)
        .await
        .expect("failed to connect to database");

    // Run migrations
    tracing::info!("running database migrations...");
    giglocal_migration::Migrator::up(&db, None)
        .await
        .expect("failed to run migrations");
    tracing::info!("migrations complete");

    // Initialize asset storage (S3 or local)
    let storage: Arc<dyn AssetStore> = match std::env::var("STORAGE_BACKEND")
        .unwrap_or_default()
        .as_str()
    {
        "s3" => {
            tracing::info!("initializing S3 asset storage");
            let endpoint = std::env::var("S3_ENDPOINT").ok();
            let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());
            let access_key = std::env::var("S3_ACCESS_KEY")
                .expect("S3_ACCESS_KEY is required when STORAGE_BACKEND=s3");
            let secret_key = std::env::var("S3_SECRET_KEY")
                .expect("S3_SECRET_KEY is required when STORAGE_BACKEND=s3");
            let bucket =
                std::env::var("S3_BUCKET").expect("S3_BUCKET is required when STORAGE_BACKEND=s3");
            let prefix = std::env::var("S3_PREFIX").unwrap_or_default();
            let public_url = std::env::var("S3_PUBLIC_URL").ok();

            Arc::new(
                giglocal_storage::S3AssetStore::from_config(
                    endpoint.as_deref(),
                    &region,
                    &access_key,
                    &secret_key,
                    &bucket,
                    &prefix,
                    public_url.as_deref(),
                )
                .await
                .expect("failed to initialize S3 storage"),
            )
        }
        _ => {
            tracing::info!("using local filesystem asset storage");
            Arc::new(giglocal_storage::LocalAssetStore::from_env())
        }
    };

    let state = Arc::new(AppState { db, storage });
    let app = with_response_layers(api::router(state));

    let addr: SocketAddr = std::env::var("GIGLOCAL_BIND")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));
    tracing::info!(%addr, "server started");

    axum::serve(
        tokio::net::TcpListener::bind(addr)
            .await
            .expect("failed to bind listener"),
        app,
    )
    .await
    .expect("server error");
}

fn with_response_layers(app: Router) -> Router {
    app.layer(TraceLayer::new_for_http())
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
}
