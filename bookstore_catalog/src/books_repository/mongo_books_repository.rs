use anyhow::Context;
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::{Book, BookId, BookPatch};
use crate::books_repository::{BookRepository, BookRepositoryError};

const DUPLICATE_KEY_ERROR_CODE: i32 = 11000;

pub struct MongoBooksRepositoryConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

pub struct MongoBooksRepository {
    client: Client,
    database: String,
    books: Collection<BookDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BookDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    title: String,
    author: String,
    #[serde(deserialize_with = "deserialize_quantity")]
    quantity: i64,
}

/// Shell clients store numbers as doubles, so integral doubles are accepted next to ints
fn deserialize_quantity<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Bson::deserialize(deserializer)? {
        Bson::Int32(quantity) => Ok(i64::from(quantity)),
        Bson::Int64(quantity) => Ok(quantity),
        Bson::Double(quantity)
            if quantity.fract() == 0.0
                && quantity >= i64::MIN as f64
                && quantity < i64::MAX as f64 =>
        {
            Ok(quantity as i64)
        }
        other => Err(D::Error::custom(format!(
            "quantity must be an integer, got {}",
            other
        ))),
    }
}

impl From<BookDocument> for Book {
    fn from(document: BookDocument) -> Self {
        Book {
            id: document.id.to_hex(),
            title: document.title,
            author: document.author,
            quantity: document.quantity,
        }
    }
}

fn parse_book_id(book_id: &str) -> Result<ObjectId, BookRepositoryError> {
    ObjectId::parse_str(book_id).map_err(|_| BookRepositoryError::InvalidId(book_id.to_string()))
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_ERROR_CODE
    )
}

fn patch_to_set_document(patch: &BookPatch) -> Document {
    let mut set = Document::new();
    if let Some(title) = &patch.title {
        set.insert("title", title.clone());
    }
    if let Some(author) = &patch.author {
        set.insert("author", author.clone());
    }
    if let Some(quantity) = patch.quantity {
        set.insert("quantity", quantity);
    }
    set
}

impl MongoBooksRepository {
    pub async fn init(config: MongoBooksRepositoryConfig) -> anyhow::Result<Self> {
        tracing::info!(
            "Connecting to mongo database {} collection {}",
            config.database,
            config.collection
        );
        let client = Client::with_uri_str(&config.uri)
            .await
            .context("Failed to create mongo client")?;
        let books = client
            .database(&config.database)
            .collection::<BookDocument>(&config.collection);

        let repository = Self {
            client,
            database: config.database,
            books,
        };
        repository
            .ping()
            .await
            .context("Failed to connect to mongo")?;
        Ok(repository)
    }

    async fn not_found_or_unavailable(
        &self,
        book_id: BookId,
        id: ObjectId,
    ) -> BookRepositoryError {
        match self.books.find_one(doc! { "_id": id }).await {
            Ok(Some(_)) => BookRepositoryError::Unavailable(book_id),
            Ok(None) => BookRepositoryError::NotFound(book_id),
            Err(err) => err.into(),
        }
    }
}

#[async_trait::async_trait]
impl BookRepository for MongoBooksRepository {
    async fn add_book(&self, book: Book) -> Result<Book, BookRepositoryError> {
        let id = if book.id.is_empty() {
            ObjectId::new()
        } else {
            parse_book_id(&book.id)?
        };
        let document = BookDocument {
            id,
            title: book.title,
            author: book.author,
            quantity: book.quantity,
        };

        match self.books.insert_one(&document).await {
            Ok(_) => Ok(document.into()),
            Err(err) if is_duplicate_key(&err) => {
                Err(BookRepositoryError::DuplicateId(id.to_hex()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update_book(
        &self,
        book_id: BookId,
        patch: BookPatch,
    ) -> Result<Book, BookRepositoryError> {
        let id = parse_book_id(&book_id)?;

        // $set must not be empty, an empty patch is a plain read
        let updated = if patch.is_empty() {
            self.books.find_one(doc! { "_id": id }).await?
        } else {
            self.books
                .find_one_and_update(
                    doc! { "_id": id },
                    doc! { "$set": patch_to_set_document(&patch) },
                )
                .return_document(ReturnDocument::After)
                .await?
        };

        updated
            .map(Book::from)
            .ok_or(BookRepositoryError::NotFound(book_id))
    }

    async fn get_book(&self, book_id: BookId) -> Result<Book, BookRepositoryError> {
        let id = parse_book_id(&book_id)?;
        self.books
            .find_one(doc! { "_id": id })
            .await?
            .map(Book::from)
            .ok_or(BookRepositoryError::NotFound(book_id))
    }

    async fn list_books(&self) -> Result<Vec<Book>, BookRepositoryError> {
        Ok(self
            .books
            .find(doc! {})
            .await?
            .try_collect::<Vec<BookDocument>>()
            .await?
            .into_iter()
            .map(Book::from)
            .collect())
    }

    async fn checkout_book(&self, book_id: BookId) -> Result<Book, BookRepositoryError> {
        let id = parse_book_id(&book_id)?;
        let updated = self
            .books
            .find_one_and_update(
                doc! { "_id": id, "quantity": { "$gt": 0_i64 } },
                doc! { "$inc": { "quantity": -1_i64 } },
            )
            .return_document(ReturnDocument::After)
            .await?;

        match updated {
            Some(document) => Ok(document.into()),
            None => Err(self.not_found_or_unavailable(book_id, id).await),
        }
    }

    async fn ping(&self) -> Result<(), BookRepositoryError> {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|err| BookRepositoryError::BackendUnavailable(err.to_string()))
    }
}
