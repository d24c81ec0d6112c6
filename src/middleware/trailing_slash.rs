//! Trailing-slash canonicalization.
//!
//! Any non-root path ending in `/` gets a permanent redirect to the same
//! path with the final slash stripped, query string preserved. Runs before
//! route mounting, so downstream handlers never see a trailing slash.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

pub async fn remove_trailing_slash(req: Request, next: Next) -> Response {
    let path = req.uri().path();
    if path.len() > 1 && path.ends_with('/') {
        let stripped = &path[..path.len() - 1];
        let location = match req.uri().query() {
            Some(query) => format!("{stripped}?{query}"),
            None => stripped.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&location) {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
            response.headers_mut().insert(header::LOCATION, value);
            return response;
        }
    }
    next.run(req).await
}
