use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use server_api::{
    attach_members, detach_members, list_members, list_relations, reorder_member, ApiContext,
    RelationRegistry,
};
use shared::{
    domain::RelationSummary,
    error::{ApiError, ErrorCode},
    protocol::{AttachRequest, DetachRequest, ReorderRequest, ScopeEvent, ScopeMembersResponse},
};
use storage::Storage;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

const MAX_REQUEST_BYTES: usize = 64 * 1024;

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    events: broadcast::Sender<ScopeEvent>,
}

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings()?;
    let database_url = prepare_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let relations =
        RelationRegistry::build(&storage, &settings.sortable_relations).map_err(|error| {
            error!(%error, "refusing to start with an invalid sortable relation configuration");
            error
        })?;
    for relation in relations.summaries() {
        info!(
            parent_type = %relation.parent_entity_type,
            relation = %relation.relation_name,
            "sortable relation registered"
        );
    }

    let api = ApiContext { storage, relations };
    let (events, _) = broadcast::channel(256);

    let state = AppState { api, events };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/events", get(events))
        .route("/relations", get(http_list_relations))
        .route(
            "/relations/:parent_type/:relation_name/parents/:parent_id/members",
            get(http_list_members),
        )
        .route(
            "/relations/:parent_type/:relation_name/attach",
            post(http_attach),
        )
        .route(
            "/relations/:parent_type/:relation_name/reorder",
            post(http_reorder),
        )
        .route(
            "/relations/:parent_type/:relation_name/detach",
            post(http_detach),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.api.storage.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            warn!(%error, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable")
        }
    }
}

async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(|message| {
        let event = message.ok()?;
        Event::default().json_data(&event).ok().map(Ok)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn http_list_relations(State(state): State<Arc<AppState>>) -> Json<Vec<RelationSummary>> {
    Json(list_relations(&state.api))
}

async fn http_list_members(
    State(state): State<Arc<AppState>>,
    Path((parent_type, relation_name, parent_id)): Path<(String, String, i64)>,
) -> Result<Json<ScopeMembersResponse>, HttpError> {
    list_members(&state.api, &parent_type, &relation_name, parent_id)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_attach(
    State(state): State<Arc<AppState>>,
    Path((parent_type, relation_name)): Path<(String, String)>,
    payload: Result<Json<AttachRequest>, JsonRejection>,
) -> Result<Json<ScopeMembersResponse>, HttpError> {
    let Json(request) = payload.map_err(malformed)?;
    let result = attach_members(&state.api, &parent_type, &relation_name, request).await;
    publish(&state, result)
}

async fn http_reorder(
    State(state): State<Arc<AppState>>,
    Path((parent_type, relation_name)): Path<(String, String)>,
    payload: Result<Json<ReorderRequest>, JsonRejection>,
) -> Result<Json<ScopeMembersResponse>, HttpError> {
    let Json(request) = payload.map_err(malformed)?;
    let result = reorder_member(&state.api, &parent_type, &relation_name, request).await;
    publish(&state, result)
}

async fn http_detach(
    State(state): State<Arc<AppState>>,
    Path((parent_type, relation_name)): Path<(String, String)>,
    payload: Result<Json<DetachRequest>, JsonRejection>,
) -> Result<Json<ScopeMembersResponse>, HttpError> {
    let Json(request) = payload.map_err(malformed)?;
    let result = detach_members(&state.api, &parent_type, &relation_name, request).await;
    publish(&state, result)
}

/// Tells subscribers about the outcome of a mutation. Failures the caller
/// could not have prevented are published too.
fn publish(
    state: &AppState,
    result: Result<ScopeMembersResponse, ApiError>,
) -> Result<Json<ScopeMembersResponse>, HttpError> {
    match result {
        Ok(response) => {
            let _ = state.events.send(ScopeEvent::MembershipChanged {
                parent_type: response.parent_type.clone(),
                relation_name: response.relation_name.clone(),
                parent_id: response.parent_id,
                member_count: response.members.len(),
            });
            Ok(Json(response))
        }
        Err(error) => {
            if status_for(error.code).is_server_error() {
                let _ = state.events.send(ScopeEvent::Error(error.clone()));
            }
            Err(http_error(error))
        }
    }
}

fn malformed(rejection: JsonRejection) -> HttpError {
    http_error(ApiError::new(ErrorCode::Validation, rejection.body_text()))
}

fn http_error(error: ApiError) -> HttpError {
    (status_for(error.code), Json(error))
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::ScopeConsistency => StatusCode::CONFLICT,
        ErrorCode::Configuration | ErrorCode::CascadeInterrupted | ErrorCode::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
