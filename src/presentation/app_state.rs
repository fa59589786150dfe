// Application state for HTTP handlers
use crate::application::mission_service::MissionService;
use crate::application::plot_service::PlotService;
use crate::application::tabledap_source::LocationStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub mission_service: MissionService,
    pub plot_service: Arc<PlotService>,
    pub locations: Arc<dyn LocationStore>,
}
