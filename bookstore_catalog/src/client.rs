use anyhow::{bail, Context};
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;

use crate::api::{Book, BookId, BookPatch, ErrorResponse};

pub struct BookstoreClient {
    url: String,
    client: ClientWithMiddleware,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CheckoutOutcome {
    CheckedOut(Book),
    Unavailable,
    NotFound,
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    response
        .json::<ErrorResponse>()
        .await
        .map(|error| error.message)
        .unwrap_or_else(|_| status.to_string())
}

impl BookstoreClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client)
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    /// Calls POST /books endpoint
    /// Returns the book as stored, with its assigned id
    pub async fn add_book(&self, book: &Book) -> anyhow::Result<Book> {
        let response = self
            .client
            .post(format!("{}/books", self.url))
            .json(book)
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            bail!("Failed to add book {}", error_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls GET /books/{book_id} endpoint
    /// Returns None if book was not in the repository
    pub async fn get_book(&self, book_id: &BookId) -> anyhow::Result<Option<Book>> {
        let response = self
            .client
            .get(format!("{}/books/{}", self.url, book_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            bail!("Failed to get book {}", error_message(response).await)
        }
    }

    /// Calls GET /books endpoint
    pub async fn list_books(&self) -> anyhow::Result<Vec<Book>> {
        let response = self
            .client
            .get(format!("{}/books", self.url))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            bail!("Failed to list books {}", error_message(response).await)
        }
    }

    /// Calls PATCH /books/{book_id} endpoint
    /// Returns None if book was not in the repository
    pub async fn update_book(
        &self,
        book_id: &BookId,
        patch: &BookPatch,
    ) -> anyhow::Result<Option<Book>> {
        let response = self
            .client
            .patch(format!("{}/books/{}", self.url, book_id))
            .json(patch)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            bail!("Failed to update book {}", error_message(response).await)
        }
    }

    /// Calls POST /checkout?id={book_id} endpoint
    pub async fn checkout_book(&self, book_id: &BookId) -> anyhow::Result<CheckoutOutcome> {
        let response = self
            .client
            .post(format!("{}/checkout", self.url))
            .query(&[("id", book_id)])
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(CheckoutOutcome::CheckedOut(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(CheckoutOutcome::NotFound),
            StatusCode::BAD_REQUEST => {
                let message = error_message(response).await;
                if message == "Book not available" {
                    Ok(CheckoutOutcome::Unavailable)
                } else {
                    bail!("Failed to checkout book {}", message)
                }
            }
            _ => bail!("Failed to checkout book {}", error_message(response).await),
        }
    }

    /// Calls GET /health endpoint
    pub async fn is_healthy(&self) -> anyhow::Result<bool> {
        let response = self
            .client
            .get(format!("{}/health", self.url))
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}
