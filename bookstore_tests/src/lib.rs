//! End to end tests run against a live bookstore_catalog server.
//! The server address is read from `BOOKSTORE_URL` and defaults to `http://127.0.0.1:8888`.

#[cfg(feature = "system_tests")]
mod system_tests;

pub fn bookstore_url() -> String {
    std::env::var("BOOKSTORE_URL").unwrap_or("http://127.0.0.1:8888".to_string())
}
