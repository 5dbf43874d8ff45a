//! Reverse proxy that adds live reload to the application server.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;

use crate::reload::{self, ReloadHub};
use crate::server::ServerError;

/// Tag inserted into every proxied HTML page.
pub fn script_tag() -> String {
    format!(r#"<script src="{}"></script>"#, reload::SCRIPT_PATH)
}

/// Insert the reload script before the last `</body>`, or append it when
/// the page has none.
pub fn inject_reload_script(html: &str) -> String {
    let tag = script_tag();
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(at) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..at]);
            out.push_str(&tag);
            out.push_str(&html[at..]);
            out
        }
        None => format!("{}{}", html, tag),
    }
}

#[derive(Clone)]
struct ProxyState {
    client: Client<HttpConnector, Body>,
    upstream: SocketAddr,
}

/// Forwards browser traffic to the application server.
pub struct ReloadProxy {
    upstream: SocketAddr,
    addr: SocketAddr,
    hub: ReloadHub,
    open: bool,
}

impl ReloadProxy {
    pub fn new(upstream: SocketAddr, addr: SocketAddr, hub: ReloadHub) -> Self {
        Self {
            upstream,
            addr,
            hub,
            open: false,
        }
    }

    /// Open the proxy URL in a browser once listening.
    pub fn with_open(mut self, open: bool) -> Self {
        self.open = open;
        self
    }

    pub fn router(&self) -> Router {
        let state = ProxyState {
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            upstream: self.upstream,
        };

        Router::new()
            .merge(reload::routes::<ProxyState>(self.hub.clone()))
            .fallback(forward)
            .with_state(state)
    }

    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| ServerError::Bind(self.addr, e.to_string()))?;

        let url = format!("http://{}", self.addr);
        tracing::info!(upstream = %self.upstream, "Live reload at {}", url);

        if self.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!(error = %e, "Could not open browser");
            }
        }

        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))
    }
}

async fn forward(State(state): State<ProxyState>, mut req: Request) -> Response {
    let path = req
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");
    let uri = match Uri::try_from(format!("http://{}{}", state.upstream, path)) {
        Ok(uri) => uri,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    *req.uri_mut() = uri;

    let headers = req.headers_mut();
    // Pages must arrive uncompressed to be rewritten.
    headers.remove(header::ACCEPT_ENCODING);
    if let Ok(host) = HeaderValue::from_str(&state.upstream.to_string()) {
        headers.insert(header::HOST, host);
    }

    let response = match state.client.request(req).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "Upstream request failed");
            return (StatusCode::BAD_GATEWAY, e.to_string()).into_response();
        }
    };

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));

    if !is_html {
        return response.map(Body::new);
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(Body::new(body), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => return (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    };
    let body = match std::str::from_utf8(&bytes) {
        Ok(html) => Body::from(inject_reload_script(html)),
        Err(_) => Body::from(bytes),
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::TRANSFER_ENCODING);
    Response::from_parts(parts, body)
}
