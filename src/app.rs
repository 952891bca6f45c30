use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::codec::Envelope;
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::editor::EditOutcome;
use crate::error::WorksheetError;
use crate::extract::extract_fields;
use crate::persistence::{FileStore, WorksheetStore};
use crate::template::load_metadata;
use crate::worksheet::{EditTarget, WorksheetKind};

pub struct AppState {
    config: Config,
    store: Arc<FileStore>,
    coordinators: Mutex<HashMap<(String, WorksheetKind), Coordinator>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = Arc::new(FileStore::new(config.data_dir.clone()));
        Self {
            config,
            store,
            coordinators: Mutex::new(HashMap::new()),
        }
    }

    /// The coordinator of one record's worksheet, built and loaded on first use.
    async fn coordinator(
        &self,
        record_id: &str,
        kind: WorksheetKind,
    ) -> Result<Coordinator, WorksheetError> {
        let mut coordinators = self.coordinators.lock().await;
        if let Some(existing) = coordinators.get(&(record_id.to_string(), kind)) {
            return Ok(existing.clone());
        }

        let metadata = load_metadata(self.config.metadata_dir.as_deref(), kind)?;
        let store: Arc<dyn WorksheetStore> = self.store.clone();
        let coordinator = Coordinator::new(
            record_id,
            metadata.build(),
            store,
            self.config.coordinator,
        );
        coordinator.initialize().await?;

        if kind == WorksheetKind::ScheduleOfValues {
            self.link_design(&coordinator).await;
        }

        coordinators.insert((record_id.to_string(), kind), coordinator.clone());
        Ok(coordinator)
    }

    /// Seeds the SOV job name from the record's Design worksheet.
    async fn link_design(&self, sov: &Coordinator) {
        let latest = self
            .store
            .load_latest(WorksheetKind::Design, sov.record_id())
            .await;
        match latest {
            Ok(Some(blob)) => match Envelope::decode(&blob) {
                Ok(envelope) => sov.link_peer(WorksheetKind::Design, &envelope.body_value()),
                Err(e) => warn!("design snapshot unreadable: {}", e),
            },
            Ok(None) => {}
            Err(e) => warn!("design snapshot unavailable: {}", e),
        }
    }
}

#[derive(Deserialize)]
struct EditRequest {
    cell: EditTarget,
    value: String,
}

#[derive(Serialize)]
struct EditResponse {
    status: String,
    warning: Option<String>,
    total: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReloadRequest {
    version_id: Option<String>,
}

#[derive(Serialize)]
struct ApiResponse {
    status: String,
    message: Option<String>,
}

/// Error wrapper that turns a worksheet error into a JSON reply.
struct ApiError(WorksheetError);

impl From<WorksheetError> for ApiError {
    fn from(e: WorksheetError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            WorksheetError::InvalidTarget { .. } | WorksheetError::InvalidMetadata { .. } => {
                StatusCode::BAD_REQUEST
            }
            WorksheetError::Json(_) | WorksheetError::Encoding(_) | WorksheetError::Utf8(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ApiResponse {
            status: "error".to_string(),
            message: Some(self.0.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/kinds", get(list_kinds))
        .route("/api/worksheets/:record/:kind", get(get_worksheet))
        .route("/api/worksheets/:record/:kind/edit", post(edit_cell))
        .route("/api/worksheets/:record/:kind/save", post(save_worksheet))
        .route("/api/worksheets/:record/:kind/autosave", post(autosave_worksheet))
        .route("/api/worksheets/:record/:kind/versions", get(list_versions))
        .route("/api/worksheets/:record/:kind/select/:version", post(select_version))
        .route("/api/worksheets/:record/:kind/reload", post(reload_worksheet))
        .route("/api/worksheets/:record/:kind/fields", get(preview_fields))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let bind = config.bind.clone();
    let app = router(Arc::new(AppState::new(config)));

    let listener = TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn list_kinds() -> Json<Value> {
    let kinds: Vec<Value> = WorksheetKind::ALL
        .iter()
        .map(|kind| json!({ "slug": kind.slug(), "name": kind.payload_type() }))
        .collect();
    Json(Value::Array(kinds))
}

async fn get_worksheet(
    Path((record, kind)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Value>> {
    let coordinator = state.coordinator(&record, kind.parse()?).await?;
    let snapshot = coordinator.save_sheet()?;

    Ok(Json(json!({
        "record": record,
        "kind": coordinator.kind(),
        "selection": coordinator.selection().id(),
        "status": coordinator.status().as_str(),
        "total": coordinator.total(),
        "summary": coordinator.summary(),
        "versions": coordinator.version_options(),
        "snapshot": snapshot,
    })))
}

async fn edit_cell(
    Path((record, kind)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<EditRequest>,
) -> ApiResult<Json<EditResponse>> {
    let coordinator = state.coordinator(&record, kind.parse()?).await?;

    let response = match coordinator.on_cell_edit(&request.cell, &request.value)? {
        EditOutcome::Applied { total, .. } => EditResponse {
            status: "ok".to_string(),
            warning: None,
            total,
        },
        EditOutcome::Rejected { warning } => EditResponse {
            status: "rejected".to_string(),
            warning: Some(warning),
            total: coordinator.total(),
        },
    };
    Ok(Json(response))
}

async fn save_worksheet(
    Path((record, kind)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let coordinator = state.coordinator(&record, kind.parse()?).await?;
    let report = coordinator.save().await?;
    Ok(Json(report).into_response())
}

async fn autosave_worksheet(
    Path((record, kind)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ApiResponse>> {
    let coordinator = state.coordinator(&record, kind.parse()?).await?;
    coordinator.autosave_now().await?;
    Ok(Json(ApiResponse {
        status: "ok".to_string(),
        message: None,
    }))
}

async fn list_versions(
    Path((record, kind)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let coordinator = state.coordinator(&record, kind.parse()?).await?;
    let options = coordinator.refresh_versions().await;
    Ok(Json(options).into_response())
}

async fn select_version(
    Path((record, kind, version)): Path<(String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Value>> {
    let coordinator = state.coordinator(&record, kind.parse()?).await?;
    let loaded = coordinator.select_version(&version).await?;
    Ok(Json(json!({
        "loaded": loaded,
        "selection": coordinator.selection().id(),
        "total": coordinator.total(),
        "summary": coordinator.summary(),
    })))
}

async fn reload_worksheet(
    Path((record, kind)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReloadRequest>,
) -> ApiResult<Json<Value>> {
    let coordinator = state.coordinator(&record, kind.parse()?).await?;
    let reloaded = coordinator
        .on_external_version(request.version_id.as_deref())
        .await?;
    Ok(Json(json!({ "reloaded": reloaded, "total": coordinator.total() })))
}

async fn preview_fields(
    Path((record, kind)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let kind: WorksheetKind = kind.parse()?;
    let coordinator = state.coordinator(&record, kind).await?;
    let body = coordinator.with_worksheet(|worksheet| worksheet.collect())?;
    Ok(Json(extract_fields(kind, &body)).into_response())
}
