//! HTTP server implementation
//!
//! Accept loop, request body limits, and top-level dispatch between the
//! health checks and the versioned API.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::achievement::AchievementEngine;
use crate::auth::JwtValidator;
use crate::config::Args;
use crate::routes::{self, achievements::API_PREFIX, error_response, FullBody};
use crate::types::TrackerError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub engine: AchievementEngine,
    pub jwt: JwtValidator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, engine: AchievementEngine, jwt: JwtValidator) -> Self {
        Self {
            args,
            engine,
            jwt,
            started_at: Instant::now(),
        }
    }
}

/// Run the HTTP server until the listener fails.
pub async fn run(state: Arc<AppState>) -> Result<(), TrackerError> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("Achievement tracker listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - default JWT secret accepted");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, hyper::Error>(to_boxed(serve(state, addr, req).await)) }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn serve<B>(state: Arc<AppState>, addr: SocketAddr, req: Request<B>) -> Response<FullBody>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    debug!("[{}] {} {}", addr, req.method(), req.uri().path());
    handle_request(&state, req).await
}

/// Dispatch one request.
///
/// Generic over the body so tests can drive it without a socket.
pub async fn handle_request<B>(state: &AppState, req: Request<B>) -> Response<FullBody>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (&method, path.as_str()) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => routes::health_check(state),
        (&Method::GET, "/ready") | (&Method::GET, "/readyz") => {
            routes::readiness_check(state).await
        }
        (&Method::OPTIONS, _) => preflight_response(),
        (_, p) if p.starts_with(API_PREFIX) => {
            let auth_header = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    warn!(path = %path, "Failed to read request body: {}", e);
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        "Request body unreadable or too large",
                        "bad_request",
                    );
                }
            };

            routes::handle_api_request(state, &method, &path, auth_header.as_deref(), body).await
        }
        _ => routes::not_found_response(&path),
    }
}

fn to_boxed(response: Response<FullBody>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<FullBody> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        header::HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        header::HeaderValue::from_static("authorization, content-type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        header::HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    response
}
