// Tabular frame returned by a remote tabledap query
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Time(Vec<Option<DateTime<Utc>>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Time(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    fn select(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Time(v) => ColumnData::Time(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Float(v) => ColumnData::Float(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Text(v) => ColumnData::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub unit: Option<String>,
    pub data: ColumnData,
}

/// Column-oriented table. All columns have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
    rows: usize,
}

impl Frame {
    pub fn new(columns: Vec<Column>) -> Self {
        let rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        debug_assert!(columns.iter().all(|c| c.data.len() == rows));
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn time(&self) -> Option<&[Option<DateTime<Utc>>]> {
        match self.column("time").map(|c| &c.data) {
            Some(ColumnData::Time(v)) => Some(v),
            _ => None,
        }
    }

    pub fn floats(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Float(v)) => Some(v),
            _ => None,
        }
    }

    /// String view of a column. Numeric ids (e.g. a trajectory column that
    /// parsed as floats) are rendered without a fractional part.
    pub fn text_at(&self, name: &str, row: usize) -> Option<String> {
        match &self.column(name)?.data {
            ColumnData::Text(v) => v.get(row)?.clone(),
            ColumnData::Float(v) => v.get(row)?.map(|f| {
                if f.fract() == 0.0 {
                    format!("{}", f as i64)
                } else {
                    f.to_string()
                }
            }),
            ColumnData::Time(v) => v.get(row)?.map(|t| t.to_rfc3339()),
        }
    }

    /// Keep only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Frame {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                unit: c.unit.clone(),
                data: c.data.select(rows),
            })
            .collect();
        Frame {
            columns,
            rows: rows.len(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    /// A time/value frame starting at 2023-05-01, one sample per `step_minutes`.
    pub(crate) fn sample_frame(variable: &str, values: &[Option<f64>], step_minutes: i64) -> Frame {
        let start = Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap();
        let times = (0..values.len())
            .map(|i| Some(start + chrono::Duration::minutes(step_minutes * i as i64)))
            .collect();
        Frame::new(vec![
            Column {
                name: "time".into(),
                unit: Some("UTC".into()),
                data: ColumnData::Time(times),
            },
            Column {
                name: variable.into(),
                unit: None,
                data: ColumnData::Float(values.to_vec()),
            },
        ])
    }

    #[test]
    fn test_select_rows_keeps_columns_aligned() {
        let frame = sample_frame("temp", &[Some(1.0), None, Some(3.0), Some(4.0)], 10);
        let picked = frame.select_rows(&[0, 3]);

        assert_eq!(picked.len(), 2);
        assert_eq!(picked.floats("temp").unwrap(), &[Some(1.0), Some(4.0)]);
        assert_eq!(picked.time().unwrap()[1], frame.time().unwrap()[3]);
    }

    #[test]
    fn test_text_at_renders_integral_floats_as_ids() {
        let frame = Frame::new(vec![Column {
            name: "trajectory".into(),
            unit: None,
            data: ColumnData::Float(vec![Some(1069.0)]),
        }]);
        assert_eq!(frame.text_at("trajectory", 0).as_deref(), Some("1069"));
        assert_eq!(frame.text_at("missing", 0), None);
    }
}
