//! Response header hygiene.
//!
//! Strips framework-fingerprinting headers from every response.

use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

pub async fn strip_fingerprint(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.remove(header::SERVER);
    headers.remove("x-powered-by");
    response
}
