mod config;
mod encoding;
mod inference;
mod notify;
mod orchestrator;
mod routes;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use config::AppConfig;
use notify::{LogNotifier, Notifier};
use orchestrator::Orchestrator;
use routes::configure_routes;
use std::env;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::load().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    let inferer = inference::from_config(&config).map_err(|e| {
        log::error!("Failed to initialize the inference backend: {}", e);
        std::io::Error::other(format!("Inference backend error: {}", e))
    })?;

    let orchestrator = web::Data::new(Orchestrator::new(inferer, config.analysis.clone()));
    log::info!(
        "Using '{}' inference backend with {:?} failure policy (max {} images, {} ms per image)",
        orchestrator.backend_name(),
        orchestrator.failure_policy(),
        config.analysis.max_batch_size,
        config.analysis.item_timeout_ms
    );
    let notifier: web::Data<dyn Notifier> =
        web::Data::from(Arc::new(LogNotifier) as Arc<dyn Notifier>);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(orchestrator.clone())
            .app_data(notifier.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
