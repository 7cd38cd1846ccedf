//! HTTP surface: shared state, router assembly, token middleware and the
//! listener lifecycle.
//!
//! Endpoints:
//! - GET  /health
//! - POST /api/auth/login, GET /api/auth/user
//! - /api/crm/{workers,work_done,work_to_do,notifications}[/{id}]
//! - POST /api/crm/work_to_do/complete/{id}
//! - GET|DELETE /api/crm/trash
//! - GET /api/iot/{cattle,infrastructure,map}, POST /api/iot/simulate
//! - POST /api/webhook/iot
//! - GET /api/weather, GET /api/weather/suggestions

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self as axum_middleware, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::auth::{self, Claims, TokenSigner};
use crate::config::Config;
use crate::db::model::{Notification, WorkDone, WorkToDo, Worker};
use crate::db::Pool;
use crate::error::ErrorBody;
use crate::handlers;
use crate::weather::WeatherService;

/// State shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub weather: Arc<dyn WeatherService>,
    pub tokens: TokenSigner,
    pub auth_enabled: bool,
    /// `(latitude, longitude)` used when a weather request omits them.
    pub default_location: (f64, f64),
}

impl AppState {
    pub fn new(pool: Pool, cfg: &Config, weather: Arc<dyn WeatherService>) -> Self {
        Self {
            pool,
            weather,
            tokens: TokenSigner::new(&cfg.auth.secret, cfg.auth.token_ttl_minutes),
            auth_enabled: cfg.auth.enabled,
            default_location: (cfg.weather.default_latitude, cfg.weather.default_longitude),
        }
    }
}

/// Decoded bearer token of the caller, if any. Inserted by [`token_middleware`].
#[derive(Debug, Clone, Default)]
pub struct CurrentFarmer(pub Option<Claims>);

/// Routes reachable without a token even when auth is enforced.
const OPEN_ROUTES: &[&str] = &["/api/auth/login", "/api/webhook/iot"];

/// Decode the bearer token when present. Reads always pass; writes need a
/// valid token when auth is enabled.
pub(crate) async fn token_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(auth::bearer)
        .and_then(|t| state.tokens.verify(t));
    if claims.is_none() {
        debug!(path = %request.uri().path(), "no valid token; treating as guest");
    }

    let path = request.uri().path();
    let read_only = matches!(*request.method(), Method::GET | Method::HEAD | Method::OPTIONS);
    let open = !path.starts_with("/api/") || OPEN_ROUTES.contains(&path);
    if state.auth_enabled && claims.is_none() && !read_only && !open {
        warn!(method = %request.method(), path, "rejected unauthenticated write");
        let body = ErrorBody {
            error: "No valid token provided".to_string(),
            details: None,
        };
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }

    request.extensions_mut().insert(CurrentFarmer(claims));
    next.run(request).await
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(origin = %o, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if parsed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(parsed)
    }
}

pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    use handlers::crm;

    let api = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/user", get(handlers::auth::current_user))
        .route(
            "/crm/workers",
            get(crm::list::<Worker>).post(crm::create::<Worker>),
        )
        .route(
            "/crm/workers/{id}",
            get(crm::fetch::<Worker>)
                .put(crm::update::<Worker>)
                .delete(crm::delete_worker),
        )
        .route(
            "/crm/work_done",
            get(crm::list::<WorkDone>).post(crm::create::<WorkDone>),
        )
        .route(
            "/crm/work_done/{id}",
            get(crm::fetch::<WorkDone>)
                .put(crm::update::<WorkDone>)
                .delete(crm::delete::<WorkDone>),
        )
        .route(
            "/crm/work_to_do",
            get(crm::list::<WorkToDo>).post(crm::create::<WorkToDo>),
        )
        .route(
            "/crm/work_to_do/{id}",
            get(crm::fetch::<WorkToDo>)
                .put(crm::update::<WorkToDo>)
                .delete(crm::delete::<WorkToDo>),
        )
        .route("/crm/work_to_do/complete/{id}", post(crm::complete))
        .route(
            "/crm/notifications",
            get(crm::list::<Notification>).post(crm::create::<Notification>),
        )
        .route(
            "/crm/notifications/{id}",
            get(crm::fetch::<Notification>)
                .put(crm::update::<Notification>)
                .delete(crm::delete::<Notification>),
        )
        .route(
            "/crm/trash",
            get(crm::list_trash).delete(crm::clear_trash),
        )
        .route("/iot/cattle", get(handlers::iot::cattle))
        .route("/iot/infrastructure", get(handlers::iot::infrastructure))
        .route("/iot/map", get(handlers::iot::map))
        .route("/iot/simulate", post(handlers::iot::simulate))
        .route("/webhook/iot", post(handlers::iot::webhook))
        .route("/weather", get(handlers::weather::forecast))
        .route("/weather/suggestions", get(handlers::weather::suggestions));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            token_middleware,
        ))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve in a background task.
///
/// Returns a oneshot sender that stops the server gracefully, and the
/// address actually bound (useful with port 0).
pub async fn start_server(
    state: AppState,
    bind: SocketAddr,
    cors_origins: &[String],
) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr)> {
    let app = build_router(state, cors_origins);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let bound_addr = listener.local_addr()?;
    info!("herdbook listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("server shutting down");
            })
            .await
        {
            tracing::error!("server error: {}", e);
        }
    });

    Ok((shutdown_tx, bound_addr))
}
