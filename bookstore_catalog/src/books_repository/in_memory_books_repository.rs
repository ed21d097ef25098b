use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;

use crate::api::{Book, BookId, BookPatch};
use crate::books_repository::{BookRepository, BookRepositoryError};

/// Books the service starts with when seeding is enabled
pub fn sample_books() -> Vec<Book> {
    vec![
        Book {
            id: "1".to_string(),
            title: "In Search of Lost Time".to_string(),
            author: "Marcel Proust".to_string(),
            quantity: 2,
        },
        Book {
            id: "2".to_string(),
            title: "The Great Gatsby".to_string(),
            author: "F. Scott Fitzgerald".to_string(),
            quantity: 5,
        },
        Book {
            id: "3".to_string(),
            title: "War and Peace".to_string(),
            author: "Leo Tolstoy".to_string(),
            quantity: 6,
        },
    ]
}

/// Keeps books in insertion order. Duplicate ids are accepted, lookups return the first match.
pub struct InMemoryBookRepository {
    book_sequence_generator: AtomicU64,
    books: parking_lot::RwLock<Vec<Book>>,
}

impl Default for InMemoryBookRepository {
    fn default() -> Self {
        Self::with_books(vec![])
    }
}

impl InMemoryBookRepository {
    pub fn with_books(books: Vec<Book>) -> Self {
        Self {
            book_sequence_generator: AtomicU64::new(1),
            books: parking_lot::RwLock::new(books),
        }
    }
}

#[async_trait::async_trait]
impl BookRepository for InMemoryBookRepository {
    async fn add_book(&self, mut book: Book) -> Result<Book, BookRepositoryError> {
        let mut locked_books = self.books.write();
        if book.id.is_empty() {
            book.id = loop {
                let candidate = self
                    .book_sequence_generator
                    .fetch_add(1, Ordering::Relaxed)
                    .to_string();
                if !locked_books.iter().any(|existing| existing.id == candidate) {
                    break candidate;
                }
            };
        }
        locked_books.push(book.clone());
        Ok(book)
    }

    async fn update_book(
        &self,
        book_id: BookId,
        patch: BookPatch,
    ) -> Result<Book, BookRepositoryError> {
        let mut locked_books = self.books.write();
        let book = locked_books
            .iter_mut()
            .find(|book| book.id == book_id)
            .ok_or(BookRepositoryError::NotFound(book_id))?;

        let mut result_book = json!(book);
        json_patch::merge(&mut result_book, &json!(patch));
        *book = serde_json::from_value(result_book)?;
        Ok(book.clone())
    }

    async fn get_book(&self, book_id: BookId) -> Result<Book, BookRepositoryError> {
        self.books
            .read()
            .iter()
            .find(|book| book.id == book_id)
            .cloned()
            .ok_or(BookRepositoryError::NotFound(book_id))
    }

    async fn list_books(&self) -> Result<Vec<Book>, BookRepositoryError> {
        Ok(self.books.read().clone())
    }

    async fn checkout_book(&self, book_id: BookId) -> Result<Book, BookRepositoryError> {
        let mut locked_books = self.books.write();
        let book = locked_books
            .iter_mut()
            .find(|book| book.id == book_id)
            .ok_or_else(|| BookRepositoryError::NotFound(book_id.clone()))?;

        if book.quantity <= 0 {
            return Err(BookRepositoryError::Unavailable(book_id));
        }
        book.quantity -= 1;
        Ok(book.clone())
    }

    async fn ping(&self) -> Result<(), BookRepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod in_memory_book_repository_tests {
    use std::sync::Arc;

    use crate::api::{Book, BookPatch};
    use crate::books_repository::{
        sample_books, BookRepository, BookRepositoryError, InMemoryBookRepository,
    };

    fn dune() -> Book {
        Book {
            id: "4".to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            quantity: 3,
        }
    }

    #[tokio::test]
    /// Tests if add_book and get_book work correctly
    async fn test_add_book_and_get_it() {
        let repo = InMemoryBookRepository::default();

        let book_not_found = repo.get_book("999".to_string()).await;
        assert!(matches!(
            book_not_found,
            Err(BookRepositoryError::NotFound(..))
        ));

        let added = repo.add_book(dune()).await.expect("Failed to add book");
        assert_eq!(added, dune());

        let book = repo
            .get_book(added.id.clone())
            .await
            .expect("Failed to get book");
        assert_eq!(book, dune());
    }

    #[tokio::test]
    async fn test_add_book_without_id_gets_next_free_id() {
        let repo = InMemoryBookRepository::with_books(sample_books());

        let added = repo
            .add_book(Book {
                id: "".to_string(),
                ..dune()
            })
            .await
            .expect("Failed to add book");
        // 1, 2 and 3 are taken by the sample books
        assert_eq!(added.id, "4");

        let second = repo
            .add_book(Book {
                id: "".to_string(),
                ..dune()
            })
            .await
            .expect("Failed to add book");
        assert_eq!(second.id, "5");
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_accepted_and_first_one_wins() {
        let repo = InMemoryBookRepository::with_books(sample_books());

        repo.add_book(Book {
            id: "1".to_string(),
            ..dune()
        })
        .await
        .expect("Failed to add book");

        assert_eq!(repo.list_books().await.unwrap().len(), 4);
        assert_eq!(
            repo.get_book("1".to_string()).await.unwrap().title,
            "In Search of Lost Time"
        );
    }

    #[tokio::test]
    /// Tests if list_books returns books in insertion order
    async fn test_add_books_and_list_them() {
        let repo = InMemoryBookRepository::default();

        let list = repo.list_books().await.expect("Failed to list books");
        assert_eq!(list, vec![]);

        let book1 = Book {
            id: "a".to_string(),
            title: "title1".to_string(),
            author: "www".to_string(),
            quantity: 1,
        };
        let book2 = Book {
            id: "b".to_string(),
            title: "title2".to_string(),
            ..book1.clone()
        };

        repo.add_book(book1.clone())
            .await
            .expect("Failed to add book");
        assert_eq!(
            repo.list_books().await.expect("Failed to list books"),
            vec![book1.clone()]
        );

        repo.add_book(book2.clone())
            .await
            .expect("Failed to add book");
        assert_eq!(
            repo.list_books().await.expect("Failed to list books"),
            vec![book1, book2]
        );
    }

    #[tokio::test]
    async fn test_add_book_patch_and_get_it() {
        let repo = InMemoryBookRepository::default();
        let result = repo
            .update_book("2000".to_string(), BookPatch::default())
            .await;
        assert!(matches!(result, Err(BookRepositoryError::NotFound(..))));

        let id = repo.add_book(dune()).await.expect("Failed to add book").id;

        let patch_title_only = BookPatch {
            title: Some("patchedTitle".to_string()),
            ..BookPatch::default()
        };
        let patched = repo
            .update_book(id.clone(), patch_title_only)
            .await
            .expect("Failed to patch");

        let expected_with_patch_title = Book {
            title: "patchedTitle".to_string(),
            ..dune()
        };
        assert_eq!(patched, expected_with_patch_title);
        assert_eq!(
            repo.get_book(id.clone()).await.unwrap(),
            expected_with_patch_title
        );

        let patch_all_fields = BookPatch {
            title: Some("Children of Dune".to_string()),
            author: Some("Brian Herbert".to_string()),
            quantity: Some(0),
        };
        repo.update_book(id.clone(), patch_all_fields)
            .await
            .expect("Failed to patch");

        assert_eq!(
            repo.get_book(id.clone()).await.unwrap(),
            Book {
                id,
                title: "Children of Dune".to_string(),
                author: "Brian Herbert".to_string(),
                quantity: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_checkout_until_unavailable() {
        let repo = InMemoryBookRepository::with_books(sample_books());

        let first = repo.checkout_book("1".to_string()).await.unwrap();
        assert_eq!(first.quantity, 1);
        let second = repo.checkout_book("1".to_string()).await.unwrap();
        assert_eq!(second.quantity, 0);

        let third = repo.checkout_book("1".to_string()).await;
        assert!(matches!(third, Err(BookRepositoryError::Unavailable(..))));
        assert_eq!(repo.get_book("1".to_string()).await.unwrap().quantity, 0);

        let missing = repo.checkout_book("999".to_string()).await;
        assert!(matches!(missing, Err(BookRepositoryError::NotFound(..))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checkouts_never_go_below_zero() {
        let repo = Arc::new(InMemoryBookRepository::with_books(sample_books()));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.checkout_book("3".to_string()).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 6);
        assert_eq!(repo.get_book("3".to_string()).await.unwrap().quantity, 0);
    }
}
