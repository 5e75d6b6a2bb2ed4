//! Embedded chat frontend.
//!
//! The browser app under `frontend/` is baked into the binary with
//! `include_str!` so a `chatloom serve` deployment is a single file.
//! `/` serves the page shell; the stylesheet and the SSE client script
//! come from an asset table under `/static/`.

use axum::{
    http::header,
    response::Html,
    routing::get,
    Router,
};

const INDEX_HTML: &str = include_str!("../../../frontend/index.html");

/// Static assets as (route, content type, body) rows.
const ASSETS: &[(&str, &str, &str)] = &[
    (
        "/static/style.css",
        "text/css; charset=utf-8",
        include_str!("../../../frontend/style.css"),
    ),
    (
        "/static/app.js",
        "application/javascript; charset=utf-8",
        include_str!("../../../frontend/app.js"),
    ),
];

/// Build a router that serves the embedded frontend.
pub fn frontend_router() -> Router {
    let mut router = Router::new().route("/", get(|| async { Html(INDEX_HTML) }));
    for &(path, content_type, body) in ASSETS {
        router = router.route(
            path,
            get(move || async move { ([(header::CONTENT_TYPE, content_type)], body) }),
        );
    }
    router
}
