// ERDDAP CSV response parsing
use crate::application::tabledap_source::{DatasetInfo, FetchError};
use crate::domain::frame::{Column, ColumnData, Frame};
use chrono::{DateTime, Utc};

fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || cell.eq_ignore_ascii_case("nan")
}

fn parse_time(cell: &str) -> Option<DateTime<Utc>> {
    if is_missing(cell) {
        return None;
    }
    DateTime::parse_from_rfc3339(cell.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn build_column(name: String, unit: Option<String>, cells: Vec<String>) -> Result<Column, FetchError> {
    let is_time = name == "time" || unit.as_deref() == Some("UTC");
    let data = if is_time {
        let mut times = Vec::with_capacity(cells.len());
        for cell in &cells {
            let parsed = parse_time(cell);
            if parsed.is_none() && !is_missing(cell) {
                return Err(FetchError::Malformed(format!(
                    "column '{}' has an unparseable timestamp '{}'",
                    name, cell
                )));
            }
            times.push(parsed);
        }
        ColumnData::Time(times)
    } else {
        let floats: Option<Vec<Option<f64>>> = cells
            .iter()
            .map(|c| {
                if is_missing(c) {
                    Some(None)
                } else {
                    c.trim().parse::<f64>().ok().map(Some)
                }
            })
            .collect();
        match floats {
            Some(values) => ColumnData::Float(values),
            None => ColumnData::Text(
                cells
                    .into_iter()
                    .map(|c| if is_missing(&c) { None } else { Some(c) })
                    .collect(),
            ),
        }
    };
    Ok(Column { name, unit, data })
}

/// Parse a tabledap `.csv` body: header row, units row, then data rows.
pub fn parse_table(body: &str) -> Result<Frame, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| FetchError::Malformed(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(FetchError::Malformed("missing header row".into()));
    }

    let mut records = reader.records();
    let units: Vec<Option<String>> = match records.next() {
        Some(row) => row
            .map_err(|e| FetchError::Malformed(e.to_string()))?
            .iter()
            .map(|u| if u.trim().is_empty() { None } else { Some(u.trim().to_string()) })
            .collect(),
        None => return Err(FetchError::Malformed("missing units row".into())),
    };

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for row in records {
        let row = row.map_err(|e| FetchError::Malformed(e.to_string()))?;
        for (i, cell) in row.iter().enumerate() {
            cells[i].push(cell.to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(units)
        .zip(cells)
        .map(|((name, unit), cells)| build_column(name, unit, cells))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Frame::new(columns))
}

/// Parse an ERDDAP `info/<id>/index.csv` document.
pub fn parse_info(body: &str) -> Result<DatasetInfo, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| FetchError::Malformed(e.to_string()))?
        .clone();
    let index_of = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| FetchError::Malformed(format!("info document has no '{}' column", name)))
    };
    let row_type = index_of("Row Type")?;
    let variable = index_of("Variable Name")?;
    let attribute = index_of("Attribute Name")?;
    let value = index_of("Value")?;

    let mut info = DatasetInfo::default();
    let mut globals: Vec<(String, String)> = Vec::new();
    let mut cf_roles: Vec<(String, String)> = Vec::new();

    for row in reader.records() {
        let row = row.map_err(|e| FetchError::Malformed(e.to_string()))?;
        let get = |i: usize| row.get(i).unwrap_or("").trim().to_string();
        if get(row_type) != "attribute" {
            continue;
        }
        let (var, attr, val) = (get(variable), get(attribute), get(value));
        if var == "NC_GLOBAL" {
            globals.push((attr, val));
            continue;
        }
        if !info.variables.contains(&var) {
            info.variables.push(var.clone());
        }
        match attr.as_str() {
            "long_name" => {
                info.long_names.insert(var, val);
            }
            "units" => {
                info.units.insert(var, val);
            }
            "cf_role" => cf_roles.push((var, val)),
            _ => {}
        }
    }

    let global = |name: &str| {
        globals
            .iter()
            .find(|(a, _)| a == name)
            .map(|(_, v)| v.clone())
    };
    info.time_coverage_start = global("time_coverage_start");
    info.time_coverage_end = global("time_coverage_end");

    if let Some(kind) = global("cdm_data_type").map(|k| k.to_lowercase()) {
        info.dsg_id = global(&format!("cdm_{}_variables", kind))
            .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .or_else(|| {
                let role = format!("{}_id", kind);
                cf_roles.iter().find(|(_, r)| *r == role).map(|(v, _)| v.clone())
            });
    }

    Ok(info)
}
