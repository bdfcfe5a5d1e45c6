mod address;
mod api;
mod config;
mod error;
mod geoip;
mod minecraft;
mod motd;
mod probes;
mod resolver;
mod status;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber;

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Create web server runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("mcprobe-web")
        .enable_all()
        .build()
        .expect("Failed to create runtime");

    runtime.block_on(async {
        run_server().await;
    });
}

async fn run_server() {
    let config = config::Config::from_env();

    // Load GeoIP databases and credentials before accepting connections
    geoip::init(&config.geoip_dir);
    probes::credentials::start_watcher(config.probes_file.clone()).await;

    // Build the router
    let app = Router::new()
        .route("/v1/status/{server}", get(api::server_status))
        .route("/v1/distributed/{server}", get(api::distributed_status))
        .route("/v1/stream", get(api::stream))
        .route("/health", get(api::health))
        .route("/", get(api::banner))
        .fallback(api::banner)
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .into_inner(),
        );

    let addr = config.listen_addr();
    info!("Starting mcprobe on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
