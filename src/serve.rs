use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tower::ServiceExt;
use tower::service_fn;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, info, warn};

use crate::graph::{DragOutcome, GraphEdge, GraphNode};
use crate::*;

/// Arguments for running the chain editor server
#[derive(Debug, Clone, Parser)]
#[command(name = "dagedit serve", about = "Host a chain editing session for a browser UI.")]
pub struct ServeArgs {
    /// Chain file to edit; saving writes the canonical text back to it.
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// JSON object catalog used for labels and the palette.
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5151)]
    pub port: u16,

    /// Directory with a built editor front end to serve as static files.
    #[arg(long = "ui-dir")]
    pub ui_dir: Option<PathBuf>,

    /// Editor configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub struct ServeState {
    chain_path: PathBuf,
    session: Mutex<EditorSession>,
    closed: Notify,
}

impl ServeState {
    pub fn new(chain_path: impl Into<PathBuf>, session: EditorSession) -> Self {
        Self {
            chain_path: chain_path.into(),
            session: Mutex::new(session),
            closed: Notify::new(),
        }
    }

    async fn load_catalog(&self, path: Option<&Path>) {
        let catalog = match path {
            Some(path) => match read_catalog(path).await {
                Ok(catalog) => catalog,
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "falling back to an empty object catalog");
                    ObjectCatalog::default()
                }
            },
            None => ObjectCatalog::default(),
        };

        let mut session = self.session.lock().await;
        info!(objects = catalog.len(), "object catalog loaded");
        session.catalog_loaded(catalog, Instant::now());
    }
}

async fn read_catalog(path: &Path) -> Result<ObjectCatalog> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read catalog '{}'", path.display()))?;
    ObjectCatalog::from_json(&contents)
        .with_context(|| format!("failed to parse catalog '{}'", path.display()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainPayload {
    source_path: String,
    state: SessionState,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    used_object_ids: Vec<String>,
    show_loader: bool,
    notices: Vec<Notice>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaletteObjectPayload {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    in_graph: bool,
}

#[derive(Debug, Deserialize)]
struct ObjectQuery {
    #[serde(default)]
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum NewNodeRequest {
    Step {
        #[serde(rename = "objectId")]
        object_id: String,
        x: f32,
        y: f32,
    },
    Group {
        x: f32,
        y: f32,
    },
}

#[derive(Debug, Serialize)]
struct CreatedPayload {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum DragPhase {
    Start,
    Move,
    Stop,
}

#[derive(Debug, Deserialize)]
struct DragRequest {
    phase: DragPhase,
    #[serde(default)]
    x: Option<f32>,
    #[serde(default)]
    y: Option<f32>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct DragPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    hovered_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
    removed_edges: usize,
}

impl From<DragOutcome> for DragPayload {
    fn from(outcome: DragOutcome) -> Self {
        Self {
            hovered_group: None,
            parent: outcome.parent,
            removed_edges: outcome.removed_edges,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EdgeRequest {
    source: String,
    target: String,
}

#[derive(Debug, Deserialize)]
struct SourceUpdateRequest {
    source: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SavedPayload {
    text: String,
    source_path: String,
}

pub fn router(state: Arc<ServeState>) -> Router {
    Router::new()
        .route("/api/chain", get(get_chain))
        .route("/api/objects", get(get_objects))
        .route("/api/chain/nodes", post(post_node))
        .route("/api/chain/nodes/:id", delete(delete_node))
        .route("/api/chain/nodes/:id/position", put(put_position))
        .route("/api/chain/nodes/:id/size", put(put_size))
        .route("/api/chain/nodes/:id/drag", post(post_drag))
        .route("/api/chain/edges", post(post_edge))
        .route("/api/chain/edges/:id", delete(delete_edge))
        .route("/api/chain/format", post(post_format))
        .route("/api/chain/source", put(put_source))
        .route("/api/chain/save", post(post_save))
        .route("/api/chain/cancel", post(post_cancel))
        .with_state(state)
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let contents = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("failed to read '{}'", args.input.display()))?;
    let config = EditorConfig::load(args.config.as_deref())?;
    let session = EditorSession::new(strip_line_ending(&contents), &config, Instant::now());
    let state = Arc::new(ServeState::new(args.input.clone(), session));

    let loader = Arc::clone(&state);
    let catalog_path = args.catalog.clone();
    tokio::spawn(async move {
        loader.load_catalog(catalog_path.as_deref()).await;
    });

    let mut app = router(Arc::clone(&state));

    if let Some(root) = args.ui_dir.clone() {
        let static_dir = ServeDir::new(root.clone())
            .append_index_html_on_directories(true)
            .fallback(ServeFile::new(root.join("index.html")));

        let static_service = service_fn(move |req| {
            let svc = static_dir.clone();
            async move {
                match svc.oneshot(req).await {
                    Ok(response) => Ok(response.map(axum::body::Body::new)),
                    Err(error) => {
                        let message = format!("Static file error: {error}");
                        Ok((StatusCode::INTERNAL_SERVER_ERROR, message).into_response())
                    }
                }
            }
        });

        app = app.fallback_service(static_service);
    }

    let app = app.layer(CorsLayer::permissive());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    println!("dagedit editing '{}' on http://{addr}", args.input.display());
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = state.closed.notified() => info!("editing session closed"),
            }
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

/// Ticks the session once its next timer is due.
fn schedule_tick(state: &Arc<ServeState>, delay: Option<Duration>) {
    let Some(delay) = delay else {
        return;
    };
    let state = Arc::clone(state);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut session = state.session.lock().await;
        if session.tick(Instant::now()) {
            debug!(text = %session.text(), "chain text regenerated");
        }
    });
}

fn snapshot(state: &ServeState, session: &mut EditorSession, now: Instant) -> ChainPayload {
    session.tick(now);
    ChainPayload {
        source_path: state.chain_path.display().to_string(),
        state: session.state(),
        text: session.text().to_string(),
        error: session.error().map(|error| error.to_string()),
        warning: session.warning(),
        nodes: session.graph().nodes.clone(),
        edges: session.graph().edges.clone(),
        used_object_ids: session.used_object_ids(),
        show_loader: session.show_loader(now),
        notices: session.take_notices(),
    }
}

async fn get_chain(State(state): State<Arc<ServeState>>) -> Json<ChainPayload> {
    let mut session = state.session.lock().await;
    Json(snapshot(&state, &mut session, Instant::now()))
}

async fn get_objects(
    State(state): State<Arc<ServeState>>,
    Query(query): Query<ObjectQuery>,
) -> Json<Vec<PaletteObjectPayload>> {
    let session = state.session.lock().await;
    let Some(catalog) = session.catalog() else {
        return Json(Vec::new());
    };

    let objects = catalog
        .search(query.search.as_deref().unwrap_or_default())
        .into_iter()
        .map(|object| PaletteObjectPayload {
            id: object.id.clone(),
            name: object.name.clone(),
            description: object.description.clone(),
            in_graph: session.is_object_used(&object.id),
        })
        .collect();
    Json(objects)
}

async fn post_node(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<NewNodeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let now = Instant::now();
    let mut session = state.session.lock().await;
    let (item, at) = match request {
        NewNodeRequest::Step { object_id, x, y } => {
            let object = match session.catalog() {
                Some(catalog) => catalog.resolve(&object_id),
                None => CatalogObject::new(object_id),
            };
            (PaletteItem::Step(object), Point::new(x, y))
        }
        NewNodeRequest::Group { x, y } => (PaletteItem::Group, Point::new(x, y)),
    };

    let id = session.add_from_palette(item, at, now).ok_or_else(not_editable)?;
    schedule_tick(&state, session.next_wakeup(now));
    Ok((StatusCode::CREATED, Json(CreatedPayload { id })))
}

async fn put_position(
    State(state): State<Arc<ServeState>>,
    AxumPath(node_id): AxumPath<String>,
    Json(position): Json<Point>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let now = Instant::now();
    let mut session = state.session.lock().await;
    if !session.move_node(&node_id, position, now) {
        return Err(node_not_found(&node_id));
    }
    schedule_tick(&state, session.next_wakeup(now));
    Ok(StatusCode::NO_CONTENT)
}

async fn put_size(
    State(state): State<Arc<ServeState>>,
    AxumPath(group_id): AxumPath<String>,
    Json(size): Json<Size>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let now = Instant::now();
    let mut session = state.session.lock().await;
    if !session.resize_group(&group_id, size, now) {
        return Err((
            StatusCode::NOT_FOUND,
            format!("group '{group_id}' not found"),
        ));
    }
    schedule_tick(&state, session.next_wakeup(now));
    Ok(StatusCode::NO_CONTENT)
}

async fn post_drag(
    State(state): State<Arc<ServeState>>,
    AxumPath(node_id): AxumPath<String>,
    Json(request): Json<DragRequest>,
) -> Result<Json<DragPayload>, (StatusCode, String)> {
    let now = Instant::now();
    let mut session = state.session.lock().await;
    let payload = match request.phase {
        DragPhase::Start => {
            if !session.begin_drag(&node_id) {
                return Err(node_not_found(&node_id));
            }
            DragPayload::default()
        }
        DragPhase::Move => {
            let (Some(x), Some(y)) = (request.x, request.y) else {
                return Err((
                    StatusCode::BAD_REQUEST,
                    "drag moves need both 'x' and 'y'".to_string(),
                ));
            };
            if session.graph().node(&node_id).is_none() {
                return Err(node_not_found(&node_id));
            }
            DragPayload {
                hovered_group: session.drag_to(&node_id, Point::new(x, y), now),
                ..DragPayload::default()
            }
        }
        DragPhase::Stop => session
            .end_drag(now)
            .map(DragPayload::from)
            .ok_or_else(|| (StatusCode::CONFLICT, "no drag in progress".to_string()))?,
    };

    schedule_tick(&state, session.next_wakeup(now));
    Ok(Json(payload))
}

async fn delete_node(
    State(state): State<Arc<ServeState>>,
    AxumPath(node_id): AxumPath<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let now = Instant::now();
    let mut session = state.session.lock().await;
    if !session.delete_node(&node_id, now) {
        return Err(node_not_found(&node_id));
    }
    schedule_tick(&state, session.next_wakeup(now));
    Ok(StatusCode::NO_CONTENT)
}

async fn post_edge(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<EdgeRequest>,
) -> Result<Response, (StatusCode, String)> {
    let now = Instant::now();
    let mut session = state.session.lock().await;
    match session.connect(&request.source, &request.target, now) {
        Ok(Some(id)) => {
            schedule_tick(&state, session.next_wakeup(now));
            Ok((StatusCode::CREATED, Json(CreatedPayload { id })).into_response())
        }
        Ok(None) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(err) => Err((StatusCode::CONFLICT, err.to_string())),
    }
}

async fn delete_edge(
    State(state): State<Arc<ServeState>>,
    AxumPath(edge_id): AxumPath<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let now = Instant::now();
    let mut session = state.session.lock().await;
    if !session.disconnect(&edge_id, now) {
        return Err((StatusCode::NOT_FOUND, format!("edge '{edge_id}' not found")));
    }
    schedule_tick(&state, session.next_wakeup(now));
    Ok(StatusCode::NO_CONTENT)
}

async fn post_format(State(state): State<Arc<ServeState>>) -> Json<ChainPayload> {
    let now = Instant::now();
    let mut session = state.session.lock().await;
    session.format(now);
    schedule_tick(&state, session.next_wakeup(now));
    Json(snapshot(&state, &mut session, now))
}

async fn put_source(
    State(state): State<Arc<ServeState>>,
    Json(payload): Json<SourceUpdateRequest>,
) -> Result<Json<ChainPayload>, (StatusCode, String)> {
    let now = Instant::now();
    let mut session = state.session.lock().await;
    if matches!(session.state(), SessionState::Initializing | SessionState::Closed) {
        return Err(not_editable());
    }
    session.set_text(payload.source, now);
    schedule_tick(&state, session.next_wakeup(now));
    Ok(Json(snapshot(&state, &mut session, now)))
}

async fn post_save(
    State(state): State<Arc<ServeState>>,
) -> Result<Json<SavedPayload>, (StatusCode, String)> {
    let mut session = state.session.lock().await;
    let text = session.prepare_save().map_err(save_error)?;

    tokio::fs::write(&state.chain_path, format!("{text}\n"))
        .await
        .with_context(|| format!("failed to write '{}'", state.chain_path.display()))
        .map_err(internal_error)?;
    session.complete_save();
    state.closed.notify_one();

    Ok(Json(SavedPayload {
        text,
        source_path: state.chain_path.display().to_string(),
    }))
}

async fn post_cancel(State(state): State<Arc<ServeState>>) -> StatusCode {
    let mut session = state.session.lock().await;
    if !session.is_closed() {
        info!("chain edit cancelled");
        session.close();
        state.closed.notify_one();
    }
    StatusCode::NO_CONTENT
}

fn save_error(err: SessionError) -> (StatusCode, String) {
    match err {
        SessionError::InvalidChain(_) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        SessionError::NotReady | SessionError::Closed => (StatusCode::CONFLICT, err.to_string()),
    }
}

fn not_editable() -> (StatusCode, String) {
    (
        StatusCode::CONFLICT,
        "the chain editor is not accepting edits".to_string(),
    )
}

fn node_not_found(node_id: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("node '{node_id}' not found"))
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}
