// Multi-series plot assembler - lays downsampled series out on a subplot grid
use crate::domain::mission::Mission;
use crate::domain::plot::{PlotFigure, PlotGrid, Subplot, Trace, TraceKind};
use crate::domain::selection::{LayoutMode, Selection, TraceMode};
use crate::domain::series::DownsampledSeries;
use chrono::DateTime;
use std::collections::HashSet;

/// Traces longer than this render with WebGL.
pub const WEBGL_THRESHOLD: usize = 1000;
pub const CORPUS_CAP_SUFFIX: &str = " (>25K timeseries sub-sampled to 25,000 points)";

#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    pub max_columns: usize,
    pub layout: LayoutMode,
    pub mode: TraceMode,
    pub row_height: usize,
    /// The combined rows were thinned before downsampling.
    pub corpus_capped: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            max_columns: 3,
            layout: LayoutMode::default(),
            mode: TraceMode::default(),
            row_height: 345,
            corpus_capped: false,
        }
    }
}

/// `(rows, columns)` for `count` subplots with at most `max_columns` per row.
pub fn grid_shape(count: usize, max_columns: usize) -> (usize, usize) {
    if count == 0 {
        return (0, 0);
    }
    let columns = count.min(max_columns.max(1));
    (count.div_ceil(columns), columns)
}

/// Zero-based `(row, col)` of the `index`-th subplot.
pub fn position(index: usize, columns: usize) -> (usize, usize) {
    let columns = columns.max(1);
    (index / columns, index % columns)
}

/// Build the figure for `series`, grouped by the caller's variable order and,
/// within a variable, in the order the series are given. Variables and pairs
/// without data get no subplot.
pub fn assemble(
    mission: &Mission,
    variables: &Selection,
    series: &[DownsampledSeries],
    options: &AssemblyOptions,
) -> PlotFigure {
    if variables.is_empty() {
        return PlotFigure::make_selection();
    }
    if series.iter().all(DownsampledSeries::is_empty) {
        return PlotFigure::no_data();
    }

    // (title, variable, series of that subplot)
    let mut panels: Vec<(String, &str, Vec<&DownsampledSeries>)> = Vec::new();
    for variable in variables.iter() {
        let of_variable: Vec<&DownsampledSeries> = series
            .iter()
            .filter(|s| s.variable == variable && !s.is_empty())
            .collect();
        if of_variable.is_empty() {
            tracing::debug!(variable, "no data, leaving out of the grid");
            continue;
        }
        let title = mission.variable_title(variable);
        match options.layout {
            LayoutMode::AllDronesPerSubplot => panels.push((title, variable, of_variable)),
            LayoutMode::OnePerPair => {
                for s in of_variable {
                    let label = drone_label(mission, &s.drone);
                    panels.push((format!("{} at {}", title, label), variable, vec![s]));
                }
            }
        }
    }

    let (rows, columns) = grid_shape(panels.len(), options.max_columns);
    let mut shown: HashSet<(String, String)> = HashSet::new();
    let mut subplots = Vec::with_capacity(panels.len());

    for (index, (title, variable, members)) in panels.into_iter().enumerate() {
        let (row, col) = position(index, columns);
        let legend = match options.layout {
            LayoutMode::AllDronesPerSubplot if index > 0 => format!("legend{}", index + 1),
            _ => "legend".to_string(),
        };
        let traces = members
            .into_iter()
            .map(|s| {
                let show = shown.insert((legend.clone(), s.drone.clone()));
                build_trace(mission, s, &legend, show, options.mode)
            })
            .collect();
        subplots.push(Subplot {
            row,
            col,
            title,
            variable: variable.to_string(),
            traces,
        });
    }

    let mut annotations = Vec::new();
    let min_ratio = series
        .iter()
        .filter(|s| s.is_reduced() && !s.is_empty())
        .map(|s| s.reduction_ratio)
        .reduce(f64::min);
    if let Some(ratio) = min_ratio {
        annotations.push(format!("Sub-sampling ratio: {:.2}", ratio));
    }

    let mut title = mission.title.clone();
    if options.corpus_capped {
        title.push_str(CORPUS_CAP_SUFFIX);
    }

    PlotFigure::Grid(PlotGrid {
        title,
        rows,
        columns,
        height: options.row_height * rows,
        shared_x_axis: true,
        subplots,
        annotations,
    })
}

fn drone_label(mission: &Mission, drone_id: &str) -> String {
    mission
        .drone(drone_id)
        .map(|d| d.label.clone())
        .unwrap_or_else(|| drone_id.to_string())
}

fn build_trace(
    mission: &Mission,
    series: &DownsampledSeries,
    legend: &str,
    show_legend: bool,
    mode: TraceMode,
) -> Trace {
    let name = drone_label(mission, &series.drone);
    let kind = if series.points.len() > WEBGL_THRESHOLD {
        TraceKind::Scattergl
    } else {
        TraceKind::Scatter
    };
    let hover_text = series
        .points
        .iter()
        .map(|p| match (p.value, DateTime::from_timestamp_millis(p.time_ms)) {
            (Some(v), Some(t)) => format!("{}<br>{}<br>{}", name, v, t.format("%Y-%m-%d %H:%M:%S")),
            _ => String::new(),
        })
        .collect();

    Trace {
        kind,
        mode: mode.as_str().to_string(),
        color: mission.color_of(&series.drone).to_string(),
        x: series.points.iter().map(|p| p.time_ms).collect(),
        y: series.points.iter().map(|p| p.value).collect(),
        hover_text,
        legend: legend.to_string(),
        legend_group: series.drone.clone(),
        show_legend,
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::downsampler::Downsampler;
    use crate::application::fetcher::tests::mission;
    use crate::domain::plot::{MAKE_SELECTION_MESSAGE, NO_DATA_MESSAGE};
    use crate::domain::series::{PlotPoint, Series, SeriesPoint};

    fn downsampled(drone: &str, variable: &str, n: usize) -> DownsampledSeries {
        DownsampledSeries {
            drone: drone.into(),
            variable: variable.into(),
            points: (0..n)
                .map(|i| PlotPoint {
                    time_ms: i as i64 * 1000,
                    value: Some(i as f64),
                })
                .collect(),
            input_count: n,
            reduction_ratio: 1.0,
        }
    }

    fn grid(figure: PlotFigure) -> PlotGrid {
        match figure {
            PlotFigure::Grid(g) => g,
            other => panic!("expected a grid, got {:?}", other),
        }
    }

    #[test]
    fn test_position_wraps_columns() {
        assert_eq!(grid_shape(5, 3), (2, 3));
        assert_eq!(grid_shape(2, 3), (1, 2));
        assert_eq!(grid_shape(3, 3), (1, 3));
        assert_eq!(position(0, 3), (0, 0));
        assert_eq!(position(2, 3), (0, 2));
        assert_eq!(position(3, 3), (1, 0));
        assert_eq!(position(4, 3), (1, 1));
    }

    #[test]
    fn test_two_drones_one_variable_share_a_subplot() {
        let m = mission(&["1069", "1083"]);
        let downsampler = Downsampler::default();
        let series: Vec<DownsampledSeries> = ["1069", "1083"]
            .iter()
            .map(|d| {
                let raw = Series::new(
                    *d,
                    "temperature",
                    (0..10_000)
                        .map(|i| SeriesPoint::new(i * 60_000, (i as f64 / 300.0).sin()))
                        .collect(),
                );
                downsampler.downsample(&raw, 5000)
            })
            .collect();

        let g = grid(assemble(
            &m,
            &Selection::new(["temperature"]),
            &series,
            &AssemblyOptions::default(),
        ));

        assert_eq!(g.subplots.len(), 1);
        assert_eq!(g.subplots[0].traces.len(), 2);
        assert!(g.point_count() <= 10_000);
        assert_eq!(g.annotations, vec!["Sub-sampling ratio: 0.50".to_string()]);
        assert!(g.subplots[0].traces.iter().all(|t| t.kind == TraceKind::Scattergl));
    }

    #[test]
    fn test_subplots_follow_request_order() {
        let m = mission(&["1069"]);
        let series = vec![downsampled("1069", "SAL", 10), downsampled("1069", "TEMP", 10)];
        let g = grid(assemble(
            &m,
            &Selection::new(["TEMP", "SAL"]),
            &series,
            &AssemblyOptions::default(),
        ));

        let order: Vec<&str> = g.subplots.iter().map(|s| s.variable.as_str()).collect();
        assert_eq!(order, vec!["TEMP", "SAL"]);
        assert_eq!((g.subplots[1].row, g.subplots[1].col), (0, 1));
        assert!(g.annotations.is_empty());
    }

    #[test]
    fn test_one_per_pair_layout_and_legend_dedup() {
        let mut m = mission(&["1069", "1083"]);
        m.metadata.long_names.insert("TEMP".into(), "Temperature".into());
        m.metadata.units.insert("TEMP".into(), "degC".into());
        let series = vec![
            downsampled("1069", "TEMP", 5),
            downsampled("1083", "TEMP", 5),
            downsampled("1069", "SAL", 5),
            downsampled("1083", "SAL", 5),
        ];
        let options = AssemblyOptions {
            max_columns: 2,
            layout: LayoutMode::OnePerPair,
            ..AssemblyOptions::default()
        };
        let g = grid(assemble(&m, &Selection::new(["TEMP", "SAL"]), &series, &options));

        assert_eq!(g.subplots.len(), 4);
        assert_eq!((g.rows, g.columns), (2, 2));
        assert_eq!(g.height, 2 * 345);
        assert_eq!(g.subplots[0].title, "Temperature (degC) at 1069");
        let shown: Vec<bool> = g
            .subplots
            .iter()
            .flat_map(|s| &s.traces)
            .map(|t| t.show_legend)
            .collect();
        assert_eq!(shown, vec![true, true, false, false]);
    }

    #[test]
    fn test_all_mode_gives_each_variable_its_own_legend() {
        let m = mission(&["1069"]);
        let series = vec![downsampled("1069", "TEMP", 5), downsampled("1069", "SAL", 5)];
        let g = grid(assemble(
            &m,
            &Selection::new(["TEMP", "SAL"]),
            &series,
            &AssemblyOptions::default(),
        ));
        assert_eq!(g.subplots[0].traces[0].legend, "legend");
        assert_eq!(g.subplots[1].traces[0].legend, "legend2");
        assert!(g.subplots[1].traces[0].show_legend);
    }

    #[test]
    fn test_variable_without_data_takes_no_cell() {
        let m = mission(&["1069", "1083"]);
        let series = vec![
            downsampled("1069", "TEMP", 5),
            downsampled("1083", "TEMP", 0),
            downsampled("1069", "SAL", 0),
            downsampled("1083", "SAL", 0),
        ];
        let g = grid(assemble(
            &m,
            &Selection::new(["SAL", "TEMP"]),
            &series,
            &AssemblyOptions::default(),
        ));
        assert_eq!((g.rows, g.columns), (1, 1));
        assert_eq!(g.subplots.len(), 1);
        assert_eq!(g.subplots[0].variable, "TEMP");
        assert_eq!(g.subplots[0].traces.len(), 1);
        assert_eq!(g.subplots[0].traces[0].legend, "legend");

        let options = AssemblyOptions {
            layout: LayoutMode::OnePerPair,
            ..AssemblyOptions::default()
        };
        let g = grid(assemble(&m, &Selection::new(["SAL", "TEMP"]), &series, &options));
        assert_eq!(g.subplots.len(), 1);
        assert_eq!(g.subplots[0].title, "TEMP at 1069");
    }

    #[test]
    fn test_empty_inputs_become_placeholders() {
        let m = mission(&["1069"]);
        let empty = vec![downsampled("1069", "TEMP", 0)];
        let options = AssemblyOptions::default();

        let none = assemble(&m, &Selection::new(["TEMP"]), &empty, &options);
        assert_eq!(none.placeholder_message(), Some(NO_DATA_MESSAGE));

        let unselected = assemble(&m, &Selection::default(), &empty, &options);
        assert_eq!(unselected.placeholder_message(), Some(MAKE_SELECTION_MESSAGE));
    }

    #[test]
    fn test_corpus_cap_marks_the_title() {
        let m = mission(&["1069"]);
        let options = AssemblyOptions {
            corpus_capped: true,
            ..AssemblyOptions::default()
        };
        let g = grid(assemble(&m, &Selection::new(["TEMP"]), &[downsampled("1069", "TEMP", 3)], &options));
        assert!(g.title.ends_with(CORPUS_CAP_SUFFIX));
        assert_eq!(g.subplots[0].traces[0].kind, TraceKind::Scatter);
    }
}
