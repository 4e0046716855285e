use axum::{
    Router,
    body::{ Body, to_bytes },
    extract::{ Request, State },
    http::{ HeaderMap, StatusCode, header },
    response::{ IntoResponse, Response },
};
use governor::{ DefaultDirectRateLimiter, Quota, RateLimiter };
use log::{ debug, error, info, warn };
use std::error::Error;
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::cors::{ Any, CorsLayer };
use tower_http::services::ServeDir;

use crate::config::ProxyConfig;

const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

const HOP_BY_HOP: [header::HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Clone)]
struct ProxyState {
    config: Arc<ProxyConfig>,
    http: reqwest::Client,
    limiter: Arc<DefaultDirectRateLimiter>,
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Router that forwards everything under the proxy prefix to the target and,
/// when `static_dir` is set, serves it under the base path.
pub fn router(
    config: ProxyConfig,
    rate_limit: u32,
    static_dir: Option<&str>
) -> Result<Router, Box<dyn Error + Send + Sync>> {
    let per_second = NonZeroU32::new(rate_limit).ok_or("Proxy rate limit must be at least 1")?;
    let base_path = config.base_path.clone();

    let state = ProxyState {
        config: Arc::new(config),
        // Redirects go back to the caller untouched.
        http: reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build()?,
        limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let mut app = Router::new().fallback(forward_handler);

    if let Some(dir) = static_dir {
        if base_path == "/" {
            warn!("Static files cannot share the root path with the proxy; not serving {}", dir);
        } else {
            info!("Serving static files from {} under {}", dir, base_path);
            app = app.nest_service(&base_path, ServeDir::new(dir));
        }
    }

    Ok(app.layer(cors).with_state(state))
}

async fn forward_handler(State(state): State<ProxyState>, req: Request) -> Response {
    if state.limiter.check().is_err() {
        warn!("Proxy rate limit exceeded for {}", req.uri());
        return (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
    }

    let Some(rewritten) = state.config.rewrite(req.uri().path()) else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };
    let url = state.config.upstream_url(&rewritten, req.uri().query());
    debug!("Proxying {} {} -> {}", req.method(), req.uri(), url);

    let (parts, body) = req.into_parts();
    let body = match to_bytes(body, MAX_BODY_SIZE).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Rejecting proxied request body: {}", e);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    // The upstream sees its own origin as the host.
    let mut headers = parts.headers;
    headers.remove(header::HOST);
    strip_hop_by_hop(&mut headers);

    let upstream = state.http.request(parts.method, &url).headers(headers).body(body).send().await;

    let resp = match upstream {
        Ok(resp) => resp,
        Err(e) => {
            error!("Upstream request to {} failed: {}", url, e);
            return (StatusCode::BAD_GATEWAY, format!("Upstream request failed: {}", e)).into_response();
        }
    };

    let status = resp.status();
    let mut resp_headers = resp.headers().clone();
    strip_hop_by_hop(&mut resp_headers);

    match resp.bytes().await {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            *response.headers_mut() = resp_headers;
            response
        }
        Err(e) => {
            error!("Reading upstream response from {} failed: {}", url, e);
            (StatusCode::BAD_GATEWAY, format!("Upstream response failed: {}", e)).into_response()
        }
    }
}
