use chrono::Duration;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use vetclinic::{
    app_router, ensure_schema, AppConfig, AppState, CredentialIssuer, JwtGate, PgStore, TracingSink,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vetclinic=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    ensure_schema(&pool).await?;

    if config.admin.is_none() {
        tracing::warn!("ADMIN_EMAIL not set; every login will be rejected");
    }
    let issuer = CredentialIssuer::new(
        &config.jwt_secret,
        Duration::hours(config.jwt_ttl_hours),
        config.admin.clone().into_iter().collect(),
    );
    let state = AppState::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(TracingSink),
        Arc::new(JwtGate::new(&config.jwt_secret)),
        Arc::new(issuer),
    );

    let app = app_router(state)
        .layer(RequestBodyLimitLayer::new(config.request_body_limit))
        .layer(TraceLayer::new_for_http());
    let listener = TcpListener::bind(config.bind_address).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
