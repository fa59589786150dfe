// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

use crate::application::fetcher::SeriesFetcher;
use crate::application::locations_job::LocationsJob;
use crate::application::mission_service::MissionService;
use crate::application::plot_service::PlotService;
use crate::application::tabledap_source::{LocationStore, TabledapSource};
use crate::infrastructure::config::{load_missions, load_settings};
use crate::infrastructure::erddap_client::ErddapClient;
use crate::infrastructure::location_store::MemoryLocationStore;
use crate::infrastructure::mission_cache::MissionCache;
use crate::infrastructure::series_cache::SeriesCache;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("saildrone_dashboard=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let settings = load_settings()?;
    let missions_config = load_missions(&settings.missions_path)?;
    let mut plot_settings = settings.plots.clone();
    if let Some(columns) = missions_config.ui.max_columns {
        plot_settings.max_columns = columns;
    }
    let missions = missions_config.missions()?;
    tracing::info!(missions = missions.len(), title = %missions_config.ui.title, "mission catalogue loaded");

    // Infrastructure
    let timeout = Duration::from_secs(settings.erddap.timeout_secs);
    let source: Arc<dyn TabledapSource> = Arc::new(ErddapClient::new(timeout)?);
    let locations: Arc<dyn LocationStore> = Arc::new(MemoryLocationStore::new());
    let cache = Arc::new(MissionCache::new(missions));
    let series_cache = Arc::new(SeriesCache::new(Duration::from_secs(
        settings.refresh.series_cache_ttl_secs,
    )));

    // Services
    let mission_service = MissionService::new(source.clone(), cache, timeout);
    let plot_service = Arc::new(PlotService::new(
        SeriesFetcher::new(source.clone(), timeout),
        locations.clone(),
        series_cache,
        plot_settings,
    ));
    let locations_job = LocationsJob::new(source, locations.clone(), timeout);

    // Background refresh loops; both fire once immediately.
    {
        let missions = mission_service.clone();
        let period = Duration::from_secs(settings.refresh.metadata_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let refreshed = missions.refresh_all().await;
                tracing::info!(refreshed, "mission metadata refresh finished");
            }
        });
    }
    {
        let missions = mission_service.clone();
        let period = Duration::from_secs(settings.refresh.locations_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = locations_job.run(&missions.missions()).await {
                    tracing::error!(error = %e, "locations job failed");
                }
            }
        });
    }

    let state = Arc::new(AppState {
        mission_service,
        plot_service,
        locations,
    });

    let addr: SocketAddr = settings.server.bind.parse()?;
    tracing::info!(%addr, "starting saildrone-dashboard");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router(state)).await?;

    Ok(())
}
