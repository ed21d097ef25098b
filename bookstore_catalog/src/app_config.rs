use actix_web::error::InternalError;
use actix_web::HttpResponse;
use paperclip::actix::web;

use crate::api::ErrorResponse;
use crate::handlers;

fn json_config() -> actix_web::web::JsonConfig {
    actix_web::web::JsonConfig::default().error_handler(|err, _req| {
        tracing::debug!("Rejected request payload {}", err);
        InternalError::from_response(
            err,
            HttpResponse::BadRequest().json(ErrorResponse::new("Invalid request payload")),
        )
        .into()
    })
}

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(
            web::resource("/books")
                .route(web::get().to(handlers::get_all_books))
                .route(web::post().to(handlers::add_book)),
        )
        .service(
            web::resource("/books/{book_id}")
                .route(web::get().to(handlers::get_book))
                .route(web::patch().to(handlers::update_book)),
        )
        .service(web::resource("/checkout").route(web::post().to(handlers::checkout_book)));
}
