// HTTP request handlers
use crate::application::plot_service::{SlotOutcome, StreamEvent, ZoomRequest};
use crate::application::progress::ProgressReporter;
use crate::domain::mission::Mission;
use crate::domain::plot::PlotFigure;
use crate::domain::selection::{
    LayoutMode, PlotRequest, Selection, SelectionError, TimeWindow, TraceMode,
};
use crate::infrastructure::chunked_stream::stream_from_receiver;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, Response, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

#[derive(Debug, Deserialize, Default)]
pub struct TimeseriesQuery {
    #[serde(default)]
    pub variables: Selection,
    #[serde(default)]
    pub drones: Selection,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub decimation: Option<u32>,
    pub columns: Option<usize>,
    pub layout: Option<String>,
    pub mode: Option<String>,
    /// Request context for last-write-wins; usually one per browser tab.
    pub session: Option<String>,
}

impl TimeseriesQuery {
    fn into_request(self, mission_id: &str, default_decimation: u32) -> Result<PlotRequest, SelectionError> {
        Ok(PlotRequest {
            mission_id: mission_id.to_string(),
            window: TimeWindow::parse(self.start_date.as_deref(), self.end_date.as_deref())?,
            layout: LayoutMode::parse(self.layout.as_deref())?,
            mode: TraceMode::parse(self.mode.as_deref())?,
            decimation_hours: self.decimation.unwrap_or(default_decimation),
            columns: self.columns.unwrap_or(0),
            drones: self.drones,
            variables: self.variables,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct MapQuery {
    pub variable: Option<String>,
    #[serde(default)]
    pub drones: Selection,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ZoomQuery {
    #[serde(default)]
    pub variables: Selection,
    #[serde(default)]
    pub drones: Selection,
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(default)]
    pub reset: bool,
    pub columns: Option<usize>,
    pub layout: Option<String>,
    pub mode: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

async fn respond<T: Serialize>(status: StatusCode, data: &T, compress: bool) -> Response<Body> {
    match json_response(status, data, compress).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

async fn error(status: StatusCode, message: String, compress: bool) -> Response<Body> {
    respond(status, &ErrorBody { error: message }, compress).await
}

/// Bad plot parameters are shown to the user as a placeholder figure.
fn invalid_parameters(e: SelectionError) -> PlotFigure {
    tracing::info!(error = %e, "invalid plot parameters");
    PlotFigure::placeholder(&e.to_string())
}

async fn find_mission(state: &AppState, id: &str, compress: bool) -> Result<Arc<Mission>, Response<Body>> {
    match state.mission_service.get(id) {
        Some(mission) => Ok(mission),
        None => Err(error(StatusCode::NOT_FOUND, format!("unknown mission '{}'", id), compress).await),
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_missions(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response<Body> {
    respond(StatusCode::OK, &state.mission_service.list(), accepts_brotli(&headers)).await
}

pub async fn get_mission(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response<Body> {
    let compress = accepts_brotli(&headers);
    match find_mission(&state, &id, compress).await {
        Ok(mission) => respond(StatusCode::OK, mission.as_ref(), compress).await,
        Err(response) => response,
    }
}

pub async fn list_locations(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response<Body> {
    let compress = accepts_brotli(&headers);
    match state.locations.all().await {
        Ok(rows) => respond(StatusCode::OK, &rows, compress).await,
        Err(e) => {
            tracing::error!(error = %e, "reading locations failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, "locations unavailable".into(), compress).await
        }
    }
}

pub async fn mission_map(
    Path(id): Path<String>,
    Query(query): Query<MapQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response<Body> {
    let compress = accepts_brotli(&headers);
    let mission = match find_mission(&state, &id, compress).await {
        Ok(mission) => mission,
        Err(response) => return response,
    };
    let window = match TimeWindow::parse(query.start_date.as_deref(), query.end_date.as_deref()) {
        Ok(window) => window,
        Err(e) => return respond(StatusCode::OK, &invalid_parameters(e), compress).await,
    };

    let figure = state
        .plot_service
        .trajectory_map(&mission, query.variable.as_deref(), &query.drones, window)
        .await;
    respond(StatusCode::OK, &figure, compress).await
}

pub async fn mission_timeseries(
    Path(id): Path<String>,
    Query(query): Query<TimeseriesQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response<Body> {
    let compress = accepts_brotli(&headers);
    let mission = match find_mission(&state, &id, compress).await {
        Ok(mission) => mission,
        Err(response) => return response,
    };
    let session = query.session.clone();
    let request = match query.into_request(&id, state.plot_service.settings().default_decimation_hours) {
        Ok(request) => request,
        Err(e) => return respond(StatusCode::OK, &invalid_parameters(e), compress).await,
    };

    let progress = ProgressReporter::silent();
    match session {
        Some(context) => {
            match state
                .plot_service
                .timeseries_for_context(&context, &mission, &request, &progress)
                .await
            {
                SlotOutcome::Current(figure) => respond(StatusCode::OK, &figure, compress).await,
                SlotOutcome::Stale => {
                    error(StatusCode::CONFLICT, "superseded by a newer request".into(), compress).await
                }
            }
        }
        None => {
            let figure = state.plot_service.timeseries(&mission, &request, &progress).await;
            respond(StatusCode::OK, &figure, compress).await
        }
    }
}

/// Same as the timeseries endpoint, streamed: progress events, then the figure.
pub async fn stream_timeseries(
    Path(id): Path<String>,
    Query(query): Query<TimeseriesQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response<Body> {
    let compress = accepts_brotli(&headers);
    let mission = match find_mission(&state, &id, compress).await {
        Ok(mission) => mission,
        Err(response) => return response,
    };
    let context = query.session.clone();
    let request = match query.into_request(&id, state.plot_service.settings().default_decimation_hours) {
        Ok(request) => request,
        Err(e) => {
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.try_send(StreamEvent::Figure {
                figure: invalid_parameters(e),
            });
            return stream_from_receiver(rx, compress).into_response();
        }
    };

    let rx = state.plot_service.clone().spawn_timeseries(context, mission, request);
    stream_from_receiver(rx, compress).into_response()
}

pub async fn zoom_timeseries(
    Path(id): Path<String>,
    Query(query): Query<ZoomQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response<Body> {
    let compress = accepts_brotli(&headers);
    let mission = match find_mission(&state, &id, compress).await {
        Ok(mission) => mission,
        Err(response) => return response,
    };
    let parsed = TimeWindow::parse(query.start.as_deref(), query.end.as_deref()).and_then(|window| {
        Ok((window, LayoutMode::parse(query.layout.as_deref())?, TraceMode::parse(query.mode.as_deref())?))
    });
    let (window, layout, mode) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return respond(StatusCode::OK, &invalid_parameters(e), compress).await,
    };

    let request = ZoomRequest {
        drones: query.drones,
        variables: query.variables,
        range: if query.reset || window.is_open() {
            None
        } else {
            Some(window.bounds_ms())
        },
        columns: query.columns.unwrap_or(0),
        layout,
        mode,
    };
    respond(StatusCode::OK, &state.plot_service.zoom(&mission, &request), compress).await
}

pub fn router(state: Arc<AppState>) -> Router {
    // Handlers compress their own bodies.
    Router::new()
        .route("/healthz", get(health_check))
        .route("/missions", get(list_missions))
        .route("/missions/:id", get(get_mission))
        .route("/locations", get(list_locations))
        .route("/missions/:id/map", get(mission_map))
        .route("/missions/:id/timeseries", get(mission_timeseries))
        .route("/missions/:id/timeseries/stream", get(stream_timeseries))
        .route("/missions/:id/timeseries/zoom", get(zoom_timeseries))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
