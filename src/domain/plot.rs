// Plot figure domain models
use serde::Serialize;

pub const MAKE_SELECTION_MESSAGE: &str = "Pick one or more drones and a variable.";
pub const NO_DATA_MESSAGE: &str = "No data for this combination of selections.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Scatter,
    Scattergl,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub name: String,
    pub kind: TraceKind,
    pub mode: String,
    pub color: String,
    /// Epoch milliseconds.
    pub x: Vec<i64>,
    /// `null` entries break the rendered line.
    pub y: Vec<Option<f64>>,
    pub hover_text: Vec<String>,
    pub legend: String,
    pub legend_group: String,
    pub show_legend: bool,
}

impl Trace {
    pub fn len(&self) -> usize {
        self.x.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subplot {
    pub row: usize,
    pub col: usize,
    pub title: String,
    pub variable: String,
    pub traces: Vec<Trace>,
}

/// Subplots arranged on a grid. Every subplot shares one time axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotGrid {
    pub title: String,
    pub rows: usize,
    pub columns: usize,
    pub height: usize,
    pub shared_x_axis: bool,
    pub subplots: Vec<Subplot>,
    pub annotations: Vec<String>,
}

impl PlotGrid {
    pub fn point_count(&self) -> usize {
        self.subplots
            .iter()
            .flat_map(|s| &s.traces)
            .map(|t| t.y.iter().filter(|v| v.is_some()).count())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapTrace {
    pub name: String,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    /// Marker color: a fixed drone color or a value per point.
    pub color: MarkerColor,
    pub hover_text: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MarkerColor {
    Fixed(String),
    Scale { values: Vec<f64>, colorscale: String, title: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapCenter {
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapFigure {
    pub traces: Vec<MapTrace>,
    pub zoom: f64,
    pub center: MapCenter,
    pub annotations: Vec<String>,
}

/// What a plot request renders. Failures are never raw errors: they become a
/// placeholder carrying a human-readable reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlotFigure {
    Grid(PlotGrid),
    Map(MapFigure),
    Placeholder { message: String },
}

impl PlotFigure {
    pub fn placeholder(message: &str) -> Self {
        PlotFigure::Placeholder {
            message: message.to_string(),
        }
    }

    pub fn make_selection() -> Self {
        Self::placeholder(MAKE_SELECTION_MESSAGE)
    }

    pub fn no_data() -> Self {
        Self::placeholder(NO_DATA_MESSAGE)
    }

    pub fn placeholder_message(&self) -> Option<&str> {
        match self {
            PlotFigure::Placeholder { message } => Some(message),
            _ => None,
        }
    }
}
