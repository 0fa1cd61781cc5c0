//! Per-hostname sub-applications.
//!
//! # Responsibilities
//! - Serve the `.well-known/dat` discovery document for hosted sites
//! - Serve static files with `index.html` and `.html`/`.htm` inference
//! - Fall back to a directory listing
//! - Forward proxied hostnames to their upstream

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{header, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

use crate::archive::ArchiveKey;
use crate::config::validation::parse_proxy_target;

/// Discovery document path.
pub const WELL_KNOWN_PATH: &str = "/.well-known/dat";

/// Seconds peers may cache the discovery document.
pub const WELL_KNOWN_TTL: u32 = 3600;

/// Client used to forward proxied hostnames.
pub type ProxyClient = Client<HttpConnector, Body>;

pub fn proxy_client() -> ProxyClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Body of `GET /.well-known/dat`.
pub fn well_known_body(key: &ArchiveKey) -> String {
    format!("{}/\nTTL={WELL_KNOWN_TTL}", key.to_url())
}

/// App for an archive-backed site rooted at `directory`.
pub fn hosted_app(key: &ArchiveKey, directory: &Path) -> Router {
    let body = well_known_body(key);
    let root = Arc::new(directory.to_path_buf());

    let listing = Router::new().fallback(listing_handler).with_state(root);
    let files = ServeDir::new(directory)
        .append_index_html_on_directories(true)
        .fallback(listing);

    Router::new()
        .route(WELL_KNOWN_PATH, get(move || async move { body }))
        .fallback_service(files)
}

/// App for a proxied site. Without a target every request is a 404.
pub fn proxied_app(target: Option<&str>, client: ProxyClient) -> Router {
    match target.and_then(parse_proxy_target) {
        Some(authority) => Router::new()
            .fallback(proxy_handler)
            .with_state(ProxyState {
                authority: Arc::new(authority),
                client,
            }),
        None => Router::new().fallback(|| async { StatusCode::NOT_FOUND }),
    }
}

#[derive(Clone)]
struct ProxyState {
    authority: Arc<Authority>,
    client: ProxyClient,
}

async fn proxy_handler(State(state): State<ProxyState>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(state.authority.as_ref().clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot build upstream uri");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(upstream = %state.authority, error = %e, "Upstream error");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

/// Decode a request path into a relative filesystem path. `None` for paths
/// that do not map onto the site directory.
fn relative_path(path: &str) -> Option<PathBuf> {
    let url = url::Url::parse(&format!("file://{path}")).ok()?;
    let decoded = url.to_file_path().ok()?;
    let rel = decoded.strip_prefix("/").ok()?;
    Some(rel.to_path_buf())
}

async fn listing_handler(State(root): State<Arc<PathBuf>>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let Some(rel) = relative_path(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let target = root.join(&rel);

    if !rel.as_os_str().is_empty() && !path.ends_with('/') {
        for ext in ["html", "htm"] {
            let mut candidate = target.clone().into_os_string();
            candidate.push(".");
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            if tokio::fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
                return ServeFile::new(candidate).oneshot(request).await.into_response();
            }
        }
    }

    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_dir() => match render_listing(&target, &path).await {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                tracing::warn!(path = ?target, error = %e, "Directory listing failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        _ => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Not Found",
        )
            .into_response(),
    }
}

async fn render_listing(dir: &Path, request_path: &str) -> std::io::Result<String> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type().await?.is_dir();
        names.push((name, is_dir));
    }
    names.sort();

    let base = if request_path.ends_with('/') {
        request_path.to_string()
    } else {
        format!("{request_path}/")
    };
    let title = escape_html(&base);
    let mut html = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Index of {title}</title></head>\n<body><h1>Index of {title}</h1>\n<ul>\n"
    );
    if base != "/" {
        html.push_str("<li><a href=\"../\">../</a></li>\n");
    }
    for (name, is_dir) in names {
        let suffix = if is_dir { "/" } else { "" };
        let name = escape_html(&name);
        html.push_str(&format!(
            "<li><a href=\"{base}{name}{suffix}\">{name}{suffix}</a></li>\n",
            base = escape_html(&base)
        ));
    }
    html.push_str("</ul>\n</body></html>\n");
    Ok(html)
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
