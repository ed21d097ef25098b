use std::sync::Arc;

use actix_web::http::header::LOCATION;
use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{
    api_v2_operation,
    web::{self},
};

use crate::api::{Book, BookId, BookPatch, CheckoutQuery, ErrorResponse};
use crate::books_repository::{BookRepository, BookRepositoryError};

/// Maps a repository failure to the response of `operation`. Server side failures are logged.
fn error_response(operation: &str, err: BookRepositoryError) -> HttpResponse {
    match err {
        BookRepositoryError::NotFound(_) => {
            HttpResponse::NotFound().json(ErrorResponse::new("Book not found"))
        }
        BookRepositoryError::InvalidId(_) => {
            HttpResponse::BadRequest().json(ErrorResponse::new("Invalid book ID"))
        }
        BookRepositoryError::Unavailable(_) => {
            HttpResponse::BadRequest().json(ErrorResponse::new("Book not available"))
        }
        BookRepositoryError::DuplicateId(_) => {
            HttpResponse::Conflict().json(ErrorResponse::new("Book already exists"))
        }
        err => {
            tracing::error!("{} failed {}", operation, err);
            HttpResponse::InternalServerError().json(ErrorResponse::new("Internal server error"))
        }
    }
}

#[api_v2_operation]
pub async fn health(
    books_repository: Data<Arc<dyn BookRepository>>,
) -> Result<HttpResponse, Error> {
    Ok(match books_repository.ping().await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(err) => error_response("Health check", err),
    })
}

#[api_v2_operation]
pub async fn get_all_books(
    books_repository: Data<Arc<dyn BookRepository>>,
) -> Result<HttpResponse, Error> {
    Ok(match books_repository.list_books().await {
        Ok(books) => HttpResponse::Ok().json(books),
        Err(err) => error_response("Get all books", err),
    })
}

#[api_v2_operation]
pub async fn add_book(
    books_repository: Data<Arc<dyn BookRepository>>,
    book: web::Json<Book>,
) -> Result<HttpResponse, Error> {
    Ok(match books_repository.add_book(book.into_inner()).await {
        Ok(book) => HttpResponse::Created()
            .append_header((LOCATION, format!("/books/{}", book.id)))
            .json(book),
        Err(err) => error_response("Add book", err),
    })
}

#[api_v2_operation]
pub async fn update_book(
    books_repository: Data<Arc<dyn BookRepository>>,
    book_id: web::Path<BookId>,
    patch: web::Json<BookPatch>,
) -> Result<HttpResponse, Error> {
    Ok(
        match books_repository
            .update_book(book_id.into_inner(), patch.into_inner())
            .await
        {
            Ok(book) => HttpResponse::Ok().json(book),
            Err(err) => error_response("Update book", err),
        },
    )
}

#[api_v2_operation]
pub async fn get_book(
    books_repository: Data<Arc<dyn BookRepository>>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    Ok(match books_repository.get_book(book_id.into_inner()).await {
        Ok(book) => HttpResponse::Ok().json(book),
        Err(err) => error_response("Get book", err),
    })
}

#[api_v2_operation]
pub async fn checkout_book(
    books_repository: Data<Arc<dyn BookRepository>>,
    query: web::Query<CheckoutQuery>,
) -> Result<HttpResponse, Error> {
    let book_id = match query.into_inner().id {
        Some(book_id) => book_id,
        None => {
            return Ok(HttpResponse::BadRequest()
                .json(ErrorResponse::new("Missing id query parameter")))
        }
    };
    Ok(match books_repository.checkout_book(book_id).await {
        Ok(book) => HttpResponse::Ok().json(book),
        Err(err) => error_response("Checkout book", err),
    })
}
