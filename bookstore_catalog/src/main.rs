use std::env;

use actix_web::{App, HttpServer};
use anyhow::Context;
use paperclip::actix::{web, OpenApiExt};
use tracing_actix_web::TracingLogger;

use bookstore_catalog::app_config::config_app;
use bookstore_catalog::books_repository;
use bookstore_catalog::settings::Settings;
use bookstore_catalog::telemetry::{init_telemetry, shutdown_telemetry};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config_file = env::var("BOOKSTORE_CONFIG").ok();
    let settings = Settings::load(config_file.as_deref())?;
    init_telemetry(&settings.telemetry)?;

    let books_repository = books_repository::connect(&settings.storage)
        .await
        .context("Failed to init storage backend")?;

    tracing::info!(
        "starting HTTP server at http://{}:{}",
        settings.server.host,
        settings.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap_api()
            .app_data(web::Data::new(books_repository.clone()))
            .wrap(TracingLogger::default())
            .configure(config_app)
            .with_json_spec_at("/apispec/v2")
            .build()
    })
    .bind((settings.server.host.as_str(), settings.server.port))?
    .run()
    .await?;

    shutdown_telemetry();
    Ok(())
}
