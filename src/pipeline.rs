//! Pipeline composition.
//!
//! # Responsibilities
//! - Assemble every stage into one deterministic request pipeline
//! - Apply each stage conditionally from the configuration, evaluated once
//! - Mount endpoints in configured order and install the not-found fallback
//!
//! # Stage order
//!
//! A request traverses, in order: caller "before_all" hooks, raw-body
//! capture, header hygiene + global body cap, JSON parsing, form parsing,
//! cookie parsing, CORS validation, caller "before_routes" hooks,
//! trailing-slash normalization, compression, access logging, then route
//! dispatch (health, mounted endpoints, not-found fallback). Any fault flows
//! out through the error report stage and then the terminal render stage.
//!
//! Axum layers wrap everything added before them, so the layers below are
//! applied innermost-first: the first `.layer` call runs closest to the
//! handlers and the error chain is attached last to wrap the whole pipeline.

use crate::config::ServerConfig;
use crate::endpoints::EndpointContext;
use crate::middleware::access_log::{access_log, LogStage, TracingSink};
use crate::middleware::body::{
    capture_raw_body, parse_cookies, parse_form_body, parse_json_body, BodyPolicy,
};
use crate::middleware::cors::{validate_origin, CorsPolicy};
use crate::middleware::error_chain::{
    accepts_html, error_page, render_errors, report_errors, RenderPolicy,
};
use crate::middleware::headers::strip_fingerprint;
use crate::middleware::trailing_slash::remove_trailing_slash;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

async fn health() -> &'static str {
    "ok"
}

fn not_found(is_html: bool, req: &Request) -> Response {
    let status = StatusCode::NOT_FOUND;
    if is_html && accepts_html(req) {
        (status, Html(error_page(status))).into_response()
    } else {
        (status, Json(json!({ "error": "Not found" }))).into_response()
    }
}

/// Build the complete request pipeline for a configuration.
///
/// Toggles are evaluated here, once; the returned router is fixed for the
/// server's lifetime.
pub fn build_pipeline(config: &ServerConfig) -> Router {
    let context = EndpointContext {
        limits: config.limits,
        production: config.production,
        is_html: config.is_html,
    };

    let mut router = Router::new();

    if config.enable_health {
        router = router.route("/~health", get(health));
    }

    // Endpoint mounts, in configured order; first matching prefix wins.
    for spec in &config.endpoints {
        let mut sub = (spec.handler)(context.clone());
        if let Some(middleware) = &spec.middleware {
            sub = middleware(sub);
        }
        router = if spec.path == "/" {
            router.merge(sub)
        } else {
            router.nest(&spec.path, sub)
        };
    }

    router = config.hooks.after_routes(router);

    router = match &config.not_found_handler {
        Some(factory) => router.fallback_service(factory(context.clone())),
        None => {
            let is_html = config.is_html;
            router.fallback(move |req: Request| async move { not_found(is_html, &req) })
        }
    };

    router = config.hooks.after_not_found(router);

    // Access logging wraps handler execution for timing and final status.
    let sink: Arc<dyn crate::middleware::access_log::AccessLogSink> =
        match config.log_sink.clone() {
            Some(sink) => sink,
            None => Arc::new(TracingSink {
                json: config.json_log,
            }),
        };
    router = router.layer(from_fn_with_state(Arc::new(LogStage { sink }), access_log));

    if config.enable_compression {
        router = router.layer(CompressionLayer::new());
    }

    if config.remove_trailing_slashes {
        router = router.layer(from_fn(remove_trailing_slash));
    }

    router = config.hooks.before_routes(router);

    // CORS is only installed when a whitelist exists; an empty whitelist is
    // "CORS disabled", not "allow all".
    if !config.cors.whitelist.is_empty() {
        let policy = Arc::new(CorsPolicy::new(&config.cors));
        router = router.layer(from_fn_with_state(policy, validate_origin));
    }

    if config.enable_cookies {
        router = router.layer(from_fn(parse_cookies));
    }

    let body_policy = Arc::new(BodyPolicy::new(
        config.raw_body_paths.clone(),
        config.limits,
    ));
    if config.enable_form_body {
        router = router.layer(from_fn_with_state(body_policy.clone(), parse_form_body));
    }
    if config.enable_json_body {
        router = router.layer(from_fn_with_state(body_policy.clone(), parse_json_body));
    }

    router = router.layer(from_fn(strip_fingerprint));
    router = router.layer(DefaultBodyLimit::max(config.limits.max_body_bytes()));

    if !config.raw_body_paths.is_empty() {
        router = router.layer(from_fn_with_state(body_policy, capture_raw_body));
    }

    router = config.hooks.before_all(router);

    // The error chain wraps the whole pipeline: any fault raised by any
    // stage or handler flows through report, then the terminal render.
    router = router.layer(from_fn(report_errors));
    let render = Arc::new(RenderPolicy {
        production: config.production,
        is_html: config.is_html,
        debug_ip: config.debug_ip.clone(),
    });
    router = router.layer(from_fn_with_state(render, render_errors));

    config.hooks.after_error(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::EndpointSpec;
    use crate::error::ApiError;
    use axum::body::Body;
    use axum::http::{header, Method};
    use tower::ServiceExt;

    async fn send(router: Router, request: Request) -> Response {
        router.oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: Method, uri: &str) -> Request {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_responds_ok() {
        let router = build_pipeline(&ServerConfig::default());
        let response = send(router, request(Method::GET, "/~health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn trailing_slash_redirects_with_query() {
        let router = build_pipeline(&ServerConfig::default());
        let response = send(router, request(Method::GET, "/users/?page=2")).await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/users?page=2"
        );
    }

    #[tokio::test]
    async fn root_is_never_redirected() {
        let router = build_pipeline(&ServerConfig::default());
        let response = send(router, request(Method::GET, "/")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn not_found_is_json() {
        let router = build_pipeline(&ServerConfig::default());
        let response = send(router, request(Method::GET, "/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body, json!({ "error": "Not found" }));
    }

    #[tokio::test]
    async fn allowed_origin_gets_cors_headers() {
        let mut config = ServerConfig::default();
        config.cors.whitelist = vec!["https://app.example.com".into()];
        let router = build_pipeline(&config);

        let mut req = request(Method::GET, "/~health");
        req.headers_mut().insert(
            header::ORIGIN,
            "https://app.example.com".parse().unwrap(),
        );
        let response = send(router, req).await;
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://app.example.com"
        );
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_CREDENTIALS));
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
    }

    #[tokio::test]
    async fn unlisted_origin_gets_no_cors_headers() {
        let mut config = ServerConfig::default();
        config.cors.whitelist = vec!["https://app.example.com".into()];
        let router = build_pipeline(&config);

        let mut req = request(Method::GET, "/~health");
        req.headers_mut()
            .insert(header::ORIGIN, "https://evil.example.com".parse().unwrap());
        let response = send(router, req).await;
        assert!(!response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let invoked = Arc::new(AtomicBool::new(false));
        let seen = invoked.clone();

        let mut config = ServerConfig::default();
        config.cors.whitelist = vec!["https://app.example.com".into()];
        config.endpoints.push(EndpointSpec::new("/api", move |ctx| {
            let seen = seen.clone();
            ctx.router().route(
                "/thing",
                axum::routing::options(move || {
                    let seen = seen.clone();
                    async move {
                        seen.store(true, Ordering::SeqCst);
                        "handled"
                    }
                }),
            )
        }));
        let router = build_pipeline(&config);

        let mut req = request(Method::OPTIONS, "/api/thing");
        req.headers_mut().insert(
            header::ORIGIN,
            "https://app.example.com".parse().unwrap(),
        );
        let response = send(router, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.is_empty());
        assert!(!invoked.load(Ordering::SeqCst), "handler must not run");
    }

    #[tokio::test]
    async fn server_fault_is_generic_in_production() {
        let mut config = ServerConfig::default();
        config.production = true;
        config.endpoints.push(EndpointSpec::new("/api", |ctx| {
            ctx.router().route(
                "/boom",
                get(|| async { Err::<(), ApiError>(ApiError::server("db credentials leaked")) }),
            )
        }));
        let router = build_pipeline(&config);

        let response = send(router, request(Method::GET, "/api/boom")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body, json!({ "error": "Internal server error" }));
    }

    #[tokio::test]
    async fn client_fault_message_is_surfaced() {
        let mut config = ServerConfig::default();
        config.production = true;
        config.endpoints.push(EndpointSpec::new("/api", |ctx| {
            ctx.router().route(
                "/gone",
                get(|| async { Err::<(), ApiError>(ApiError::not_found("X")) }),
            )
        }));
        let router = build_pipeline(&config);

        let response = send(router, request(Method::GET, "/api/gone")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body, json!({ "error": "X" }));
    }

    #[tokio::test]
    async fn debug_body_outside_production() {
        let mut config = ServerConfig::default();
        config.endpoints.push(EndpointSpec::new("/api", |ctx| {
            ctx.router().route(
                "/boom",
                get(|| async { Err::<(), ApiError>(ApiError::server("kaput")) }),
            )
        }));
        let router = build_pipeline(&config);

        let response = send(router, request(Method::GET, "/api/boom")).await;
        let body = body_json(response).await;
        assert_eq!(body["error"], "kaput");
        assert_eq!(body["status"], 500);
        assert!(body.get("trace").is_some());
        assert!(body.get("stack").is_some());
    }

    #[tokio::test]
    async fn mount_passes_path_remainder() {
        let mut config = ServerConfig::default();
        config.endpoints.push(EndpointSpec::new("/foo", |ctx| {
            ctx.router().route("/bar", get(|| async { "remainder" }))
        }));
        let router = build_pipeline(&config);

        let response = send(router, request(Method::GET, "/foo/bar")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn per_endpoint_middleware_applies_to_that_mount_only() {
        let mut config = ServerConfig::default();
        config.endpoints.push(
            EndpointSpec::new("/guarded", |ctx| {
                ctx.router().route("/x", get(|| async { "x" }))
            })
            .with_middleware(|router| {
                router.layer(from_fn(|req: Request, next: axum::middleware::Next| async move {
                    let mut response = next.run(req).await;
                    response
                        .headers_mut()
                        .insert("x-guarded", "1".parse().unwrap());
                    response
                }))
            }),
        );
        config.endpoints.push(EndpointSpec::new("/open", |ctx| {
            ctx.router().route("/x", get(|| async { "x" }))
        }));
        let router = build_pipeline(&config);

        let guarded = send(router.clone(), request(Method::GET, "/guarded/x")).await;
        assert!(guarded.headers().contains_key("x-guarded"));
        let open = send(router, request(Method::GET, "/open/x")).await;
        assert!(!open.headers().contains_key("x-guarded"));
    }

    #[tokio::test]
    async fn oversize_json_body_is_a_client_fault() {
        let mut config = ServerConfig::default();
        config.limits.json_body_bytes = 64;
        config.endpoints.push(EndpointSpec::new("/api", |ctx| {
            ctx.router()
                .route("/ingest", axum::routing::post(|| async { "ok" }))
        }));
        let router = build_pipeline(&config);

        let payload = format!("{{\"data\":\"{}\"}}", "x".repeat(256));
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/ingest")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, payload.len())
            .body(Body::from(payload))
            .unwrap();
        let response = send(router, req).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn hooks_run_at_their_insertion_slots() {
        use crate::hooks::PipelineHooks;
        use std::sync::Mutex;

        struct RecordingHooks {
            seen: Arc<Mutex<Vec<&'static str>>>,
        }

        impl RecordingHooks {
            fn mark(&self, router: Router, slot: &'static str) -> Router {
                let seen = self.seen.clone();
                router.layer(from_fn(
                    move |req: Request, next: axum::middleware::Next| {
                        let seen = seen.clone();
                        async move {
                            seen.lock().unwrap().push(slot);
                            next.run(req).await
                        }
                    },
                ))
            }
        }

        impl PipelineHooks for RecordingHooks {
            fn before_all(&self, router: Router) -> Router {
                self.mark(router, "before_all")
            }
            fn before_routes(&self, router: Router) -> Router {
                self.mark(router, "before_routes")
            }
            fn after_routes(&self, router: Router) -> Router {
                self.mark(router, "after_routes")
            }
            fn after_not_found(&self, router: Router) -> Router {
                self.mark(router, "after_not_found")
            }
            fn after_error(&self, router: Router) -> Router {
                self.mark(router, "after_error")
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut config = ServerConfig::default();
        config.hooks = Arc::new(RecordingHooks { seen: seen.clone() });
        let router = build_pipeline(&config);

        let response = send(router, request(Method::GET, "/~health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        // Layers wrap everything added before them, so a hook's layer runs
        // ahead of every stage installed earlier: after_error sits outermost
        // and the route-level hooks innermost.
        assert_eq!(
            *seen.lock().unwrap(),
            [
                "after_error",
                "before_all",
                "before_routes",
                "after_not_found",
                "after_routes",
            ]
        );
    }

    #[tokio::test]
    async fn html_error_pages_when_enabled() {
        let mut config = ServerConfig::default();
        config.production = true;
        config.is_html = true;
        config.endpoints.push(EndpointSpec::new("/api", |ctx| {
            ctx.router().route(
                "/boom",
                get(|| async { Err::<(), ApiError>(ApiError::server("kaput")) }),
            )
        }));
        let router = build_pipeline(&config);

        let mut req = request(Method::GET, "/api/boom");
        req.headers_mut()
            .insert(header::ACCEPT, "text/html".parse().unwrap());
        let response = send(router.clone(), req).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let page = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(page.contains("500 Internal Server Error"));
        assert!(!page.contains("kaput"), "fault detail must stay redacted");

        let mut miss = request(Method::GET, "/missing");
        miss.headers_mut()
            .insert(header::ACCEPT, "text/html".parse().unwrap());
        let response = send(router, miss).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let page = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(page.contains("404 Not Found"));
    }

    #[tokio::test]
    async fn custom_not_found_handler_replaces_fallback() {
        let mut config = ServerConfig::default();
        config.not_found_handler = Some(Arc::new(|ctx: EndpointContext| {
            ctx.router().fallback(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": "nothing here" })),
                )
            })
        }));
        let router = build_pipeline(&config);

        let response = send(router, request(Method::GET, "/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body, json!({ "error": "nothing here" }));
    }

    #[tokio::test]
    async fn raw_body_paths_skip_parsing() {
        use crate::middleware::body::{ParsedJson, RawBody};
        let mut config = ServerConfig::default();
        config.raw_body_paths = vec!["/hooks".into()];
        config.endpoints.push(EndpointSpec::new("/hooks", |ctx| {
            ctx.router().route(
                "/stripe",
                axum::routing::post(|req: Request| async move {
                    let raw = req.extensions().get::<RawBody>().is_some();
                    let parsed = req.extensions().get::<ParsedJson>().is_some();
                    Json(json!({ "raw": raw, "parsed": parsed }))
                }),
            )
        }));
        let router = build_pipeline(&config);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/hooks/stripe")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"event":"ping"}"#))
            .unwrap();
        let response = send(router, req).await;
        let body = body_json(response).await;
        assert_eq!(body, json!({ "raw": true, "parsed": false }));
    }
}
