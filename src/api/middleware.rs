//! API middleware layers.
//!
//! Poll responses must never be served from a cache, so every response
//! carries cache-disabling headers.

use axum::http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

/// Adds `Cache-Control: no-store, no-cache, must-revalidate`,
/// `Pragma: no-cache` and `Expires: 0`.
pub async fn no_cache_headers(request: axum::extract::Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));

    response
}
