// Plot service - request-scoped pipelines behind the timeseries and map views
use crate::application::downsampler::Downsampler;
use crate::application::fetcher::{cap_total_rows, FetchPlan, SeriesFetcher};
use crate::application::plot_assembler::{assemble, AssemblyOptions};
use crate::application::progress::{Progress, ProgressReporter};
use crate::application::request_slots::{RequestSlots, Ticket};
use crate::application::resampler::resample;
use crate::application::tabledap_source::LocationStore;
use crate::application::trajectory_map::{location_traces, variable_trace, zoom_center};
use crate::domain::mission::Mission;
use crate::domain::plot::{MapFigure, PlotFigure};
use crate::domain::selection::{LayoutMode, PlotRequest, Selection, TimeWindow, TraceMode};
use crate::domain::series::{DownsampledSeries, Series};
use crate::infrastructure::config::PlotSettings;
use crate::infrastructure::series_cache::SeriesCache;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Messages of a streamed timeseries request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    Progress(Progress),
    Figure { figure: PlotFigure },
    /// A newer request for the same context started; this result was dropped.
    Stale,
}

/// Result of a request run against a context slot.
#[derive(Debug, Clone)]
pub enum SlotOutcome {
    Current(PlotFigure),
    Stale,
}

/// Zoom refinement over cached series.
#[derive(Debug, Clone)]
pub struct ZoomRequest {
    pub drones: Selection,
    pub variables: Selection,
    /// Inclusive epoch-millisecond range; `None` shows everything cached.
    pub range: Option<(i64, i64)>,
    pub columns: usize,
    pub layout: LayoutMode,
    pub mode: TraceMode,
}

pub struct PlotService {
    fetcher: SeriesFetcher,
    locations: Arc<dyn LocationStore>,
    series_cache: Arc<SeriesCache>,
    slots: RequestSlots,
    settings: PlotSettings,
    downsampler: Downsampler,
}

impl PlotService {
    pub fn new(
        fetcher: SeriesFetcher,
        locations: Arc<dyn LocationStore>,
        series_cache: Arc<SeriesCache>,
        settings: PlotSettings,
    ) -> Self {
        Self {
            downsampler: Downsampler::new(settings.minmax_ratio),
            fetcher,
            locations,
            series_cache,
            slots: RequestSlots::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &PlotSettings {
        &self.settings
    }

    fn options(&self, columns: usize, layout: LayoutMode, mode: TraceMode) -> AssemblyOptions {
        AssemblyOptions {
            max_columns: if columns == 0 { self.settings.max_columns } else { columns },
            layout,
            mode,
            row_height: self.settings.row_height,
            corpus_capped: false,
        }
    }

    /// Fetch, thin, resample, downsample and lay out every requested
    /// (drone, variable) pair.
    pub async fn timeseries(
        &self,
        mission: &Mission,
        request: &PlotRequest,
        progress: &ProgressReporter,
    ) -> PlotFigure {
        if !request.has_selection() {
            return PlotFigure::make_selection();
        }

        let plan = FetchPlan {
            variables: request.variables.clone(),
            window: request.window,
            cadence_hours: request.decimation_hours,
        };
        let mut outcome = self.fetcher.fetch(mission, &request.drones, &plan, progress).await;
        for failure in &outcome.failures {
            tracing::info!(mission = %mission.id, drone = %failure.drone, reason = %failure.reason, "drone left out of plot");
        }

        tracing::debug!(mission = %mission.id, rows = outcome.total_rows(), "frames fetched");
        let capped = cap_total_rows(&mut outcome.frames, self.settings.corpus_cap);
        if capped {
            tracing::info!(mission = %mission.id, cap = self.settings.corpus_cap, "combined rows sub-sampled");
        }

        let mut reduced: Vec<DownsampledSeries> = Vec::new();
        for variable in request.variables.iter() {
            for (drone, frame) in &outcome.frames {
                let series = Series::from_frame(drone, variable, frame);
                if series.is_empty() {
                    continue;
                }
                let resampled = resample(&series, request.decimation_hours);
                if resampled.gap_markers() > 0 {
                    tracing::debug!(drone = %drone, variable, gaps = resampled.gap_markers(), "gaps marked");
                }
                reduced.push(
                    self.downsampler
                        .downsample_resampled(&resampled, self.settings.series_budget),
                );
                self.series_cache.insert(&mission.id, series);
            }
        }

        let mut options = self.options(request.columns, request.layout, request.mode);
        options.corpus_capped = capped;
        let figure = assemble(mission, &request.variables, &reduced, &options);
        if let Some(message) = figure.placeholder_message() {
            tracing::info!(mission = %mission.id, message, "no plot");
        } else if let PlotFigure::Grid(grid) = &figure {
            tracing::info!(mission = %mission.id, points = grid.point_count(), "plot assembled");
        }
        figure
    }

    /// Run a timeseries request as the newest one of `context`. The result is
    /// only returned if no other request for that context started since.
    pub async fn timeseries_for_context(
        &self,
        context: &str,
        mission: &Mission,
        request: &PlotRequest,
        progress: &ProgressReporter,
    ) -> SlotOutcome {
        let ticket = self.slots.begin(context, &request.fingerprint());
        self.run_ticket(&ticket, mission, request, progress).await
    }

    async fn run_ticket(
        &self,
        ticket: &Ticket,
        mission: &Mission,
        request: &PlotRequest,
        progress: &ProgressReporter,
    ) -> SlotOutcome {
        let _running = self.slots.hold(ticket);
        let figure = self.timeseries(mission, request, progress).await;
        if self.slots.publish(ticket) {
            SlotOutcome::Current(figure)
        } else {
            SlotOutcome::Stale
        }
    }

    /// Run the request on a background task, streaming progress and then the
    /// figure (or `Stale`). Without a context the request competes with
    /// nothing and always ends with its figure.
    pub fn spawn_timeseries(
        self: Arc<Self>,
        context: Option<String>,
        mission: Arc<Mission>,
        request: PlotRequest,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let ticket = context.map(|c| self.slots.begin(&c, &request.fingerprint()));
            let (progress_tx, mut progress_rx) = mpsc::channel::<Progress>(32);
            let forward_tx = tx.clone();
            let service = self.clone();
            let forward_ticket = ticket.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(p) = progress_rx.recv().await {
                    // A superseded request keeps running but stops reporting.
                    if forward_ticket.as_ref().is_some_and(|t| !service.slots.is_current(t)) {
                        continue;
                    }
                    if forward_tx.send(StreamEvent::Progress(p)).await.is_err() {
                        break;
                    }
                }
            });

            let reporter = ProgressReporter::new(Some(progress_tx), request.drones.len());
            let outcome = match &ticket {
                Some(ticket) => self.run_ticket(ticket, &mission, &request, &reporter).await,
                None => SlotOutcome::Current(self.timeseries(&mission, &request, &reporter).await),
            };
            drop(reporter);
            if let Err(e) = forwarder.await {
                tracing::warn!(error = %e, "progress forwarder failed");
            }

            let event = match outcome {
                SlotOutcome::Current(figure) => StreamEvent::Figure { figure },
                SlotOutcome::Stale => StreamEvent::Stale,
            };
            let _ = tx.send(event).await;
        });

        rx
    }

    /// Re-slice cached series instead of fetching again.
    pub fn zoom(&self, mission: &Mission, request: &ZoomRequest) -> PlotFigure {
        if request.drones.is_empty() || request.variables.is_empty() {
            return PlotFigure::make_selection();
        }

        let mut reduced = Vec::new();
        for variable in request.variables.iter() {
            for drone in request.drones.iter() {
                let Some(series) = self.series_cache.get(&mission.id, drone, variable) else {
                    tracing::debug!(mission = %mission.id, drone, variable, "not cached, skipping");
                    continue;
                };
                let series = match request.range {
                    Some((start, end)) => series.slice(start, end),
                    None => series,
                };
                reduced.push(self.downsampler.downsample(&series, self.settings.series_budget));
            }
        }

        let options = self.options(request.columns, request.layout, request.mode);
        assemble(mission, &request.variables, &reduced, &options)
    }

    /// Last known positions of every drone plus, when a variable and drones are
    /// selected, their tracks colored by that variable.
    pub async fn trajectory_map(
        &self,
        mission: &Mission,
        variable: Option<&str>,
        drones: &Selection,
        window: TimeWindow,
    ) -> PlotFigure {
        let rows = match self.locations.for_mission(&mission.id).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(mission = %mission.id, error = %e, "locations unavailable");
                Vec::new()
            }
        };
        let mut traces = location_traces(mission, &rows);

        let variable = variable.filter(|v| !v.is_empty() && !drones.is_empty());
        if let Some(variable) = variable {
            let plan = FetchPlan {
                variables: Selection::new([variable]),
                window,
                cadence_hours: 0,
            };
            let outcome = self
                .fetcher
                .fetch(mission, drones, &plan, &ProgressReporter::silent())
                .await;
            let budget = self.settings.trajectory_budget / drones.len();
            if let Some(trace) =
                variable_trace(mission, variable, &outcome.frames, budget, &self.downsampler)
            {
                traces.push(trace);
            }
        }

        let lons: Vec<f64> = rows.iter().map(|r| r.longitude).collect();
        let lats: Vec<f64> = rows.iter().map(|r| r.latitude).collect();
        let fitted = zoom_center(&lons, &lats).or_else(|| {
            let lons: Vec<f64> = traces.iter().flat_map(|t| t.lon.iter().copied()).collect();
            let lats: Vec<f64> = traces.iter().flat_map(|t| t.lat.iter().copied()).collect();
            zoom_center(&lons, &lats)
        });
        let Some((zoom, center)) = fitted else {
            return PlotFigure::no_data();
        };

        PlotFigure::Map(MapFigure {
            traces,
            zoom,
            center,
            annotations: Vec::new(),
        })
    }
}
