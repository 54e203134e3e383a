//! HTTP surface: session creation, status polling, health, the WebSocket
//! upgrade, and optional static collaborator pages.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Path as UrlPath, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use deskpair_common::SessionId;
use deskpair_config::DeskpairConfig;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::connection::{handle_connection, ConnectionOptions};
use crate::protocol::{Role, SessionStatus};
use crate::router::{RelayRouter, SharedRelayRouter};
use crate::session::{SessionRegistry, SharedSessionRegistry};

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub registry: SharedSessionRegistry,
    pub router: SharedRelayRouter,
    pub options: ConnectionOptions,
}

impl AppState {
    pub fn new(config: &DeskpairConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.sessions.token_length));
        Self {
            router: Arc::new(RelayRouter::new(Arc::clone(&registry))),
            registry,
            options: ConnectionOptions {
                outbox_capacity: config.server.outbox_capacity,
                attach_timeout: config.server.attach_timeout(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub producer_url: String,
    pub consumer_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
    pub connections: usize,
}

/// Optional attach carried on the upgrade URL, e.g. `/ws?id=ab12cd34&role=consumer`.
#[derive(Debug, Deserialize)]
pub struct AttachQuery {
    #[serde(alias = "id")]
    pub session_id: Option<SessionId>,
    pub role: Option<Role>,
}

/// Build the application router.
pub fn app(state: AppState, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);

    let mut routes = Router::new()
        .route("/create-session", get(create_session).post(create_session))
        .route("/session-status/{id}", get(session_status))
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade));

    if let Some(dir) = static_dir {
        routes = routes
            .route_service("/producer", ServeFile::new(dir.join("producer.html")))
            .route_service("/consumer", ServeFile::new(dir.join("consumer.html")))
            .fallback_service(ServeDir::new(dir));
    }

    routes
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the application on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    static_dir: Option<&Path>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = app(state, static_dir);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn create_session(State(state): State<AppState>, headers: HeaderMap) -> Json<CreateSessionResponse> {
    let session_id = state.registry.create();
    let base = base_url(&headers);
    Json(CreateSessionResponse {
        producer_url: format!("{base}/producer?id={session_id}"),
        consumer_url: format!("{base}/consumer?id={session_id}"),
        session_id,
    })
}

async fn session_status(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Json<SessionStatus> {
    Json(state.registry.status(&SessionId::from(id)))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        sessions: state.registry.count(),
        connections: state.router.connection_count(),
    })
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<AttachQuery>,
) -> Response {
    let initial = match (query.session_id, query.role) {
        (Some(session_id), Some(role)) => Some((session_id, role)),
        (None, None) => None,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                "session_id and role must be given together",
            )
                .into_response();
        }
    };

    let router = Arc::clone(&state.router);
    let options = state.options;
    ws.on_upgrade(move |socket| handle_connection(socket, peer, router, options, initial))
}

/// Public origin of the request, honouring a reverse proxy's scheme header.
fn base_url(headers: &HeaderMap) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{proto}://{host}")
}
