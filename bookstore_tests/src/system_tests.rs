use std::time::UNIX_EPOCH;

use bookstore_catalog::api::{Book, BookPatch};
use bookstore_catalog::client::{BookstoreClient, CheckoutOutcome};

use crate::bookstore_url;

fn unique_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos()
}

#[tokio::test]
/// Simple test for the bookstore catalog
/// Creates a book
/// Gets the book
/// Patches the book
/// Gets list of books and checks if the book is there
async fn bookstore_catalog_e2e_test() {
    let client = BookstoreClient::new(&bookstore_url()).expect("Failed to create client");
    assert!(client.is_healthy().await.expect("Failed to call health"));

    let book = Book {
        id: "".to_string(),
        title: format!("Dune {}", unique_suffix()),
        author: "Frank Herbert".to_string(),
        quantity: 3,
    };

    let added = client.add_book(&book).await.expect("Failed to add book");
    assert!(!added.id.is_empty());
    assert_eq!(
        added,
        Book {
            id: added.id.clone(),
            ..book.clone()
        }
    );

    let returned = client
        .get_book(&added.id)
        .await
        .expect("Failed to get book")
        .expect("Book not found");
    assert_eq!(returned, added);

    let updated_title = format!("updated title {}", unique_suffix());
    let patched = client
        .update_book(
            &added.id,
            &BookPatch {
                title: Some(updated_title.clone()),
                ..BookPatch::default()
            },
        )
        .await
        .expect("Failed to patch book")
        .expect("Book not found");
    assert_eq!(
        patched,
        Book {
            title: updated_title.clone(),
            ..added.clone()
        }
    );

    let books = client.list_books().await.expect("Failed to list books");
    assert!(books.iter().any(|listed| *listed == patched));
}

#[tokio::test]
/// Checks out a book until no copies are left
async fn bookstore_checkout_e2e_test() {
    let client = BookstoreClient::new(&bookstore_url()).expect("Failed to create client");

    let added = client
        .add_book(&Book {
            id: "".to_string(),
            title: format!("In Search of Lost Time {}", unique_suffix()),
            author: "Marcel Proust".to_string(),
            quantity: 2,
        })
        .await
        .expect("Failed to add book");

    for expected_quantity in [1, 0] {
        match client
            .checkout_book(&added.id)
            .await
            .expect("Failed to checkout")
        {
            CheckoutOutcome::CheckedOut(book) => assert_eq!(book.quantity, expected_quantity),
            other => panic!("Unexpected checkout outcome {other:?}"),
        }
    }

    assert_eq!(
        client
            .checkout_book(&added.id)
            .await
            .expect("Failed to checkout"),
        CheckoutOutcome::Unavailable
    );

    let book = client
        .get_book(&added.id)
        .await
        .expect("Failed to get book")
        .expect("Book not found");
    assert_eq!(book.quantity, 0);
}
