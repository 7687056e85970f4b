//! Insights Report Server - Main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use actix_web::{App, HttpServer, web};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use insights_report_lib::api::{self, ApiDoc};
use insights_report_lib::auth::AdminKey;
use insights_report_lib::config::Config;
use insights_report_lib::db::{DbPool, SeaOrmLayoutStore};
use insights_report_lib::middleware::RequestLogger;
use insights_report_lib::services::{
    Catalog, DurationResolver, HttpPeerClient, LayoutService, LayoutStore, OpenSearchGateway,
    ReportEngine, Registry, SearchBackend,
};

/// Perform health check (for Docker healthcheck).
fn health_check() -> bool {
    // Configuration and definitions must both load
    match Config::from_env() {
        Ok(config) => Registry::load(&config.definitions_dir).is_ok(),
        Err(_) => false,
    }
}

fn fail(message: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", message, err);
    std::process::exit(1);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        std::process::exit(if health_check() { 0 } else { 1 });
    }

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL, SEARCH_URL and the PEER_*_URL variables must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Insights Report Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
        info!("Using development defaults for the database, search backend and admin key");
    }

    // Definitions are immutable after this point
    let registry = match Registry::load(&config.definitions_dir) {
        Ok(registry) => Arc::new(registry),
        Err(e) => fail("Failed to load report definitions", e),
    };
    info!(
        "Definitions loaded from {}: {}",
        config.definitions_dir.display(),
        registry.summary()
    );

    // Layout store
    let pool = match DbPool::connect(&config).await {
        Ok(pool) => pool,
        Err(e) => fail("Failed to connect to database", e),
    };
    info!("Database connection established");
    if let Err(e) = pool.migrate().await {
        fail("Failed to run migrations", e);
    }
    info!("Database migrations complete");
    let store: Arc<dyn LayoutStore> = Arc::new(SeaOrmLayoutStore::new(pool));

    // Peer services and the search backend
    let peers = match HttpPeerClient::new(&config.peers) {
        Ok(client) => Arc::new(client),
        Err(e) => fail("Failed to build peer client", e),
    };
    let search: Arc<dyn SearchBackend> = match OpenSearchGateway::new(&config.search) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => fail("Failed to build search client", e),
    };
    info!(
        "Search backend at {} ({} retries, {}s timeout)",
        config.search.url,
        config.search.max_retries,
        config.search.timeout.as_secs()
    );

    let catalog = Arc::new(Catalog::new(
        peers.clone(),
        peers.clone(),
        peers.clone(),
        config.catalog_cache_ttl,
    ));
    let engine = web::Data::new(ReportEngine::new(
        registry.clone(),
        catalog,
        search,
        peers,
        DurationResolver::system(),
        config.stream_page_size,
    ));
    let layouts = web::Data::new(LayoutService::new(registry, store));

    let admin_key = AdminKey::new(config.admin_key.clone());
    if !admin_key.is_configured() {
        warn!("No admin key configured; admin routes will refuse every request");
    }

    let bind_address = config.bind_address();
    let is_development = config.is_development();

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!(
            "Starting server at http://{} ({} workers)",
            bind_address, cpus
        );
        cpus
    };

    let openapi = ApiDoc::openapi();

    // Start HTTP server
    let server = HttpServer::new(move || {
        let allowed_headers = vec![
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-admin-key"),
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("x-request-timeout-ms"),
        ];

        // Configure CORS
        let cors = if is_development {
            // Permissive CORS for development
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "PUT", "OPTIONS"])
                .allowed_headers(allowed_headers)
                .expose_headers(vec![HeaderName::from_static("x-request-id")])
                .max_age(3600)
        } else {
            // Restrictive CORS for production (same-origin only)
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "PUT", "OPTIONS"])
                .allowed_headers(allowed_headers)
                .max_age(3600)
        };

        App::new()
            // Add CORS middleware (must be before other middleware)
            .wrap(cors)
            // Add request logging middleware
            .wrap(RequestLogger)
            // Add shared state
            .app_data(engine.clone())
            .app_data(layouts.clone())
            .app_data(web::Data::new(admin_key.clone()))
            // Configure API routes
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_report_routes)
                    .configure(api::configure_dashboard_routes)
                    .configure(api::configure_environment_routes)
                    .configure(api::configure_ci_routes)
                    .configure(api::configure_admin_routes),
            )
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()))
    });

    // Set worker count
    server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await
}
