use std::sync::Arc;

use anyhow::Context;

pub use in_memory_books_repository::{sample_books, InMemoryBookRepository};
pub use mongo_books_repository::{MongoBooksRepository, MongoBooksRepositoryConfig};
pub use postgres_books_repository::{PostgresBooksRepository, PostgresBooksRepositoryConfig};

use crate::api::{Book, BookId, BookPatch};
use crate::settings::{StorageBackend, StorageSettings};

mod in_memory_books_repository;
mod mongo_books_repository;
pub mod postgres_migrations;
mod postgres_books_repository;

#[derive(thiserror::Error, Debug)]
pub enum BookRepositoryError {
    #[error("Book {0} not found")]
    NotFound(BookId),

    #[error("Invalid book id {0}")]
    InvalidId(BookId),

    #[error("Book {0} not available")]
    Unavailable(BookId),

    #[error("Book {0} already exists")]
    DuplicateId(BookId),

    #[error("Backend unavailable {0}")]
    BackendUnavailable(String),

    #[error("Failed to deserialize book: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("DocumentStoreFailure failure {0}")]
    DocumentStoreFailure(#[from] mongodb::error::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait BookRepository: Send + Sync {
    /// Adds book to repository, returns the stored book with its final id
    async fn add_book(&self, book: Book) -> Result<Book, BookRepositoryError>;
    /// Patches book in the repository, returns the book after the update
    async fn update_book(
        &self,
        book_id: BookId,
        patch: BookPatch,
    ) -> Result<Book, BookRepositoryError>;
    /// Retrieves the book from repository
    async fn get_book(&self, book_id: BookId) -> Result<Book, BookRepositoryError>;
    /// Lists all books in the repository
    async fn list_books(&self) -> Result<Vec<Book>, BookRepositoryError>;
    /// Takes one copy of the book, fails with Unavailable when quantity is already zero
    async fn checkout_book(&self, book_id: BookId) -> Result<Book, BookRepositoryError>;
    /// Checks that the underlying storage is reachable
    async fn ping(&self) -> Result<(), BookRepositoryError>;
}

/// Opens the backend selected in settings. Any connection, migration or seed failure is returned
/// as error so the caller can abort startup.
pub async fn connect(settings: &StorageSettings) -> anyhow::Result<Arc<dyn BookRepository>> {
    let repository: Arc<dyn BookRepository> = match settings.backend {
        StorageBackend::InMemory => {
            if settings.in_memory.seed_sample_books {
                Arc::new(InMemoryBookRepository::with_books(sample_books()))
            } else {
                Arc::new(InMemoryBookRepository::default())
            }
        }
        StorageBackend::Mongo => Arc::new(
            MongoBooksRepository::init(MongoBooksRepositoryConfig {
                uri: settings.mongo.uri.clone(),
                database: settings.mongo.database.clone(),
                collection: settings.mongo.collection.clone(),
            })
            .await
            .context("Failed to init mongo")?,
        ),
        StorageBackend::Postgres => Arc::new(
            PostgresBooksRepository::init(PostgresBooksRepositoryConfig {
                hostname: settings.postgres.host.clone(),
                port: settings.postgres.port,
                username: settings.postgres.username.clone(),
                password: settings.postgres.password.clone(),
                database: settings.postgres.database.clone(),
                seed_script: settings.postgres.seed_script.clone(),
            })
            .await
            .context("Failed to init postgres")?,
        ),
    };
    tracing::info!("Using {:?} storage backend", settings.backend);
    Ok(repository)
}
