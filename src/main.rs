use std::net::SocketAddr;

use doc_to_markdown::shutdown::shutdown_signal;
use doc_to_markdown::{build_router, AppConfig, AppState};
use tracing::info;

#[tokio::main]
async fn main() {
    // Local runs read a `.env` file; real deployments set the environment.
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env().unwrap_or_else(|e| panic!("invalid configuration: {e}"));
    if config.access.api_key.is_none() {
        tracing::warn!("MARKDOWN_API_KEY is not set; the convert endpoint is open to anyone");
    }

    let state = AppState::new(&config).unwrap_or_else(|e| {
        panic!(
            "upload dir {} must be creatable: {e}",
            config.upload_dir.display()
        )
    });
    let app = build_router(state, &config.api_prefix);

    info!(
        app = %config.app_name,
        version = %config.version,
        bind = %config.bind,
        api_prefix = %config.api_prefix,
        upload_dir = %config.upload_dir.display(),
        rate_limit_per_minute = config.access.rate_limit_per_minute,
        "starting server"
    );
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .expect("bind must succeed");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server must start");
    info!("server stopped");
}
