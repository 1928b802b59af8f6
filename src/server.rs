//! HTTP surface: routes, request extraction and error rendering.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::contract::{
    EditableEndpoints, EditableFile, EditableKind, EventEndpoints, SessionFactory,
};
use crate::defaults::{Baseline, ServiceInfo};
use crate::editable::process_editable_files;
use crate::error::{RemoteError, ServiceError};
use crate::payload::{parse_payload, Field, Payload, Shape};
use crate::registration::{self, EventInfo};
use crate::session::HttpSessionFactory;
use crate::store::{EventRecord, EventStore};
use crate::watermark::{ensure_template, Watermark};

/// Everything a request handler needs, shared behind an `Arc`.
pub struct AppState {
    pub store: EventStore,
    pub sessions: Arc<dyn SessionFactory>,
    pub baseline: Baseline,
    pub watermark: Watermark,
}

/// Wrapper so [`ServiceError`] can be returned from handlers.
#[derive(Debug)]
pub struct HttpError(pub ServiceError);

impl From<ServiceError> for HttpError {
    fn from(e: ServiceError) -> Self {
        HttpError(e)
    }
}

impl From<RemoteError> for HttpError {
    fn from(e: RemoteError) -> Self {
        HttpError(ServiceError::Remote(e))
    }
}

impl HttpError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Remote(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Transform { .. }
            | ServiceError::MissingDownloadUrl { .. }
            | ServiceError::MissingEndpoint(_)
            | ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self.0 {
            ServiceError::Validation(fields) => json!({ "webargs_errors": fields }),
            ServiceError::Store(detail) => {
                error!(error = %detail, "Internal error");
                json!({ "error": "Internal error" })
            }
            other => {
                if status.is_server_error() {
                    error!(status = status.as_u16(), error = %other, "Request failed");
                } else {
                    warn!(status = status.as_u16(), error = %other, "Request rejected");
                }
                json!({ "error": other.to_string() })
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Body of `PUT /event/{identifier}`.
#[derive(Debug, Deserialize)]
pub struct RegisterEvent {
    pub title: String,
    pub url: String,
    pub token: String,
    pub config_endpoints: EventEndpoints,
}

const LIST_ENDPOINTS: Shape = Shape::Object(&[
    Field::required("create", Shape::Str),
    Field::required("list", Shape::Str),
]);

impl Payload for RegisterEvent {
    const SHAPE: Shape = Shape::Object(&[
        Field::required("title", Shape::Str),
        Field::required("url", Shape::Str),
        Field::required("token", Shape::Str),
        Field::required(
            "config_endpoints",
            Shape::Object(&[
                Field::required("tags", LIST_ENDPOINTS),
                Field::required("editable_types", Shape::Str),
                Field::required("file_types", Shape::Map(&LIST_ENDPOINTS)),
            ]),
        ),
    ]);
}

/// Body of `POST /event/{identifier}/editable/{editable_type}/{contrib_id}`.
#[derive(Debug, Deserialize)]
pub struct CreateEditable {
    #[serde(default)]
    pub editable: serde_json::Value,
    pub revision: SubmittedRevision,
    pub endpoints: EditableEndpoints,
}

#[derive(Debug, Deserialize)]
pub struct SubmittedRevision {
    #[serde(default)]
    pub files: Vec<EditableFile>,
}

const SUBMITTED_FILE: Shape = Shape::Object(&[
    Field::required("uuid", Shape::Str),
    Field::required("filename", Shape::Str),
    Field::optional("content_type", Shape::Str),
    Field::optional("signed_download_url", Shape::Str),
    Field::optional("external_download_url", Shape::Str),
    Field::required("file_type", Shape::Int),
]);

impl Payload for CreateEditable {
    const SHAPE: Shape = Shape::Object(&[
        Field::required("editable", Shape::Any),
        Field::required(
            "revision",
            Shape::Object(&[Field::optional("files", Shape::List(&SUBMITTED_FILE))]),
        ),
        Field::required(
            "endpoints",
            Shape::Object(&[
                Field::required(
                    "revisions",
                    Shape::Object(&[
                        Field::optional("details", Shape::Str),
                        Field::required("replace", Shape::Str),
                    ]),
                ),
                Field::required("file_upload", Shape::Str),
            ]),
        ),
    ]);
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/info", get(service_info))
        .route(
            "/event/{identifier}",
            get(event_info).put(create_event).delete(remove_event),
        )
        .route(
            "/event/{identifier}/editable/{editable_type}/{contrib_id}",
            post(create_editable),
        )
        .layer(middleware::from_fn(request_span))
        .with_state(state)
}

async fn request_span(req: Request, next: Next) -> Response {
    let span = info_span!(
        "request",
        id = %Uuid::new_v4(),
        method = %req.method(),
        path = %req.uri().path(),
    );
    async move {
        let response = next.run(req).await;
        info!(status = response.status().as_u16(), "Request finished");
        response
    }
    .instrument(span)
    .await
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    registration::bearer_token(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok()),
    )
}

async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo::current())
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
    body: Bytes,
) -> Result<StatusCode, HttpError> {
    let payload: RegisterEvent = parse_payload(&body)?;
    let record = EventRecord {
        identifier,
        title: payload.title,
        url: payload.url,
        token: payload.token,
        endpoints: payload.config_endpoints,
    };
    registration::register_event(
        &state.store,
        state.sessions.as_ref(),
        &state.baseline,
        &record,
    )
    .await?;
    Ok(StatusCode::CREATED)
}

async fn event_info(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
    headers: HeaderMap,
) -> Result<Json<EventInfo>, HttpError> {
    let record = registration::authenticate(&state.store, &identifier, authorization(&headers))?;
    Ok(Json(EventInfo::for_event(&record)))
}

async fn remove_event(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, HttpError> {
    let record = registration::authenticate(&state.store, &identifier, authorization(&headers))?;
    let api = state.sessions.open(&record.token)?;
    registration::remove_event(&state.store, api.as_ref(), &state.baseline, &record).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_editable(
    State(state): State<Arc<AppState>>,
    Path((identifier, editable_type, contrib_id)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, HttpError> {
    // Nothing about the request is inspected before the caller is known.
    let record = registration::authenticate(&state.store, &identifier, authorization(&headers))?;
    let kind: EditableKind = editable_type
        .parse()
        .map_err(|e: String| ServiceError::invalid("editable_type", e))?;
    let contrib_id: i64 = contrib_id
        .parse()
        .map_err(|_| ServiceError::invalid("contrib_id", "Not a valid integer."))?;
    let payload: CreateEditable = parse_payload(&body)?;

    info!(
        identifier = %record.identifier,
        editable = %kind,
        contrib_id,
        files = payload.revision.files.len(),
        "New editable submitted"
    );
    let api = state.sessions.open(&record.token)?;
    process_editable_files(
        api.as_ref(),
        &payload.revision.files,
        &payload.endpoints,
        &state.watermark,
    )
    .await?;
    Ok(Json(json!({ "success": true })))
}

/// Open the store, prepare the watermark and serve until Ctrl-C.
pub async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let store = EventStore::open(&config.storage.database)?;
    ensure_template(&config.watermark.template, &config.watermark.label)?;
    let watermark = Watermark::load(&config.watermark.template)?;

    let state = Arc::new(AppState {
        store,
        sessions: Arc::new(HttpSessionFactory::new(config.debug)),
        baseline: Baseline::standard(),
        watermark,
    });

    let addr: SocketAddr = config.server.bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, debug = config.debug, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}
