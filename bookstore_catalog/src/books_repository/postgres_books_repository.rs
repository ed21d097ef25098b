use std::path::PathBuf;

use anyhow::Context;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row, Statement};

use crate::api::{Book, BookId, BookPatch};
use crate::books_repository::postgres_migrations::{run_migrations, run_seed_script};
use crate::books_repository::{BookRepository, BookRepositoryError};

pub struct PostgresBooksRepository {
    client: Client,
}

pub struct PostgresBooksRepositoryConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub seed_script: Option<PathBuf>,
}

impl PostgresBooksRepository {
    pub async fn init(config: PostgresBooksRepositoryConfig) -> anyhow::Result<Self> {
        tracing::info!(
            "Connecting to postgres at {}:{}/{} as {}",
            config.hostname,
            config.port,
            config.database,
            config.username
        );
        let (mut client, connection) = tokio_postgres::Config::new()
            .host(&config.hostname)
            .port(config.port)
            .user(&config.username)
            .password(&config.password)
            .dbname(&config.database)
            .connect(NoTls)
            .await
            .context("Failed to start postgres")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Postgres connection error: {}", e);
            }
        });

        run_migrations(&mut client)
            .await
            .context("Failed to setup tables")?;

        if let Some(seed_script) = &config.seed_script {
            run_seed_script(&client, seed_script).await?;
        }
        Ok(Self { client })
    }
}

fn parse_book_id(book_id: &str) -> Result<i64, BookRepositoryError> {
    book_id
        .parse()
        .map_err(|_| BookRepositoryError::InvalidId(book_id.to_string()))
}

fn book_from_row(row: &Row) -> Result<Book, BookRepositoryError> {
    let id: i64 = row.try_get(0)?;
    Ok(Book {
        id: id.to_string(),
        title: row.try_get(1)?,
        author: row.try_get(2)?,
        quantity: row.try_get(3)?,
    })
}

#[async_trait::async_trait]
impl BookRepository for PostgresBooksRepository {
    async fn add_book(&self, book: Book) -> Result<Book, BookRepositoryError> {
        if book.id.is_empty() {
            let stmt: Statement = self
                .client
                .prepare(
                    "INSERT INTO books (title, author, quantity) VALUES ($1, $2, $3) \
                     RETURNING id, title, author, quantity",
                )
                .await?;
            let rows = self
                .client
                .query(&stmt, &[&book.title, &book.author, &book.quantity])
                .await?;
            return book_from_row(
                rows.first()
                    .ok_or_else(|| BookRepositoryError::Other("Id not returned".to_string()))?,
            );
        }

        let book_id = parse_book_id(&book.id)?;
        // The id sequence is moved past the explicit id so later generated ids cannot collide
        let stmt: Statement = self
            .client
            .prepare(
                "WITH inserted AS ( \
                     INSERT INTO books (id, title, author, quantity) VALUES ($1, $2, $3, $4) \
                     RETURNING id, title, author, quantity \
                 ) \
                 SELECT id, title, author, quantity, \
                     setval(pg_get_serial_sequence('books', 'id'), \
                         GREATEST(id, (SELECT COALESCE(MAX(books.id), 1) FROM books))) \
                 FROM inserted",
            )
            .await?;
        match self
            .client
            .query(
                &stmt,
                &[&book_id, &book.title, &book.author, &book.quantity],
            )
            .await
        {
            Ok(rows) => book_from_row(
                rows.first()
                    .ok_or_else(|| BookRepositoryError::Other("Id not returned".to_string()))?,
            ),
            Err(err) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(BookRepositoryError::DuplicateId(book.id))
            }
            Err(other_err) => Err(other_err.into()),
        }
    }

    async fn update_book(
        &self,
        book_id: BookId,
        patch: BookPatch,
    ) -> Result<Book, BookRepositoryError> {
        let id = parse_book_id(&book_id)?;
        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE books SET \
                 title = COALESCE($1, title), \
                 author = COALESCE($2, author), \
                 quantity = COALESCE($3, quantity) \
                 WHERE id = ($4) RETURNING id, title, author, quantity",
            )
            .await?;

        let rows = self
            .client
            .query(&stmt, &[&patch.title, &patch.author, &patch.quantity, &id])
            .await?;

        book_from_row(
            rows.first()
                .ok_or_else(|| BookRepositoryError::NotFound(book_id))?,
        )
    }

    async fn get_book(&self, book_id: BookId) -> Result<Book, BookRepositoryError> {
        let id = parse_book_id(&book_id)?;
        let stmt: Statement = self
            .client
            .prepare("SELECT id, title, author, quantity FROM books WHERE id = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[&id]).await?;

        book_from_row(
            rows.first()
                .ok_or_else(|| BookRepositoryError::NotFound(book_id))?,
        )
    }

    async fn list_books(&self) -> Result<Vec<Book>, BookRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT id, title, author, quantity FROM books")
            .await?;

        let rows = self.client.query(&stmt, &[]).await?;

        rows.iter().map(book_from_row).collect()
    }

    async fn checkout_book(&self, book_id: BookId) -> Result<Book, BookRepositoryError> {
        let id = parse_book_id(&book_id)?;
        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE books SET quantity = quantity - 1 \
                 WHERE id = ($1) AND quantity > 0 RETURNING id, title, author, quantity",
            )
            .await?;

        let rows = self.client.query(&stmt, &[&id]).await?;
        if let Some(row) = rows.first() {
            return book_from_row(row);
        }

        // Nothing decremented, either the book is missing or it has no copies left
        match self.get_book(book_id.clone()).await {
            Ok(_) => Err(BookRepositoryError::Unavailable(book_id)),
            Err(err) => Err(err),
        }
    }

    async fn ping(&self) -> Result<(), BookRepositoryError> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|err| BookRepositoryError::BackendUnavailable(err.to_string()))
    }
}
