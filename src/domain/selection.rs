// Normalized request selections
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SelectionError {
    #[error("invalid time bound '{0}', expected YYYY-MM-DD or an ISO 8601 timestamp")]
    InvalidTime(String),
    #[error("unknown layout '{0}', expected 'all' or 'one'")]
    UnknownLayout(String),
    #[error("unknown trace mode '{0}'")]
    UnknownMode(String),
}

/// An ordered, de-duplicated list of ids. Request parameters arrive either as a
/// comma-separated string or as a JSON array; both end up here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection(Vec<String>);

impl Selection {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for item in items {
            let item = item.as_ref().trim();
            if !item.is_empty() && !out.iter().any(|o| o == item) {
                out.push(item.to_string());
            }
        }
        Self(out)
    }

    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) => Self::new(s.split(',')),
            None => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, item: &str) -> bool {
        self.0.iter().any(|i| i == item)
    }

    /// Keep only the entries accepted by `allowed`, preserving order.
    pub fn retain(&self, allowed: impl Fn(&str) -> bool) -> Self {
        Self(self.0.iter().filter(|i| allowed(i.as_str())).cloned().collect())
    }

    /// `self ∪ required`, requested entries first in their original order.
    pub fn union<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> Self {
        let mut items = self.0.clone();
        items.extend(required.into_iter().map(str::to_string));
        Self::new(items)
    }
}

impl<'de> Deserialize<'de> for Selection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::One(s)) => Selection::parse(Some(&s)),
            Some(Raw::Many(v)) => Selection::new(v),
            None => Selection::default(),
        })
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// A time filter bound. Date-only bounds cover the whole day when used as the
/// end of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBound {
    Date(NaiveDate),
    Instant(DateTime<Utc>),
}

impl TimeBound {
    pub fn parse(raw: &str) -> Result<Self, SelectionError> {
        let raw = raw.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(TimeBound::Date(date));
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(TimeBound::Instant(ts.with_timezone(&Utc)));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Ok(TimeBound::Instant(naive.and_utc()));
            }
        }
        Err(SelectionError::InvalidTime(raw.to_string()))
    }

    fn start_instant(&self) -> DateTime<Utc> {
        match self {
            TimeBound::Date(d) => d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
            TimeBound::Instant(t) => *t,
        }
    }

    fn end_instant(&self) -> DateTime<Utc> {
        match self {
            TimeBound::Date(d) => d.and_hms_opt(23, 59, 59).unwrap_or_default().and_utc(),
            TimeBound::Instant(t) => *t,
        }
    }
}

/// Inclusive time window for a remote query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<TimeBound>,
    pub end: Option<TimeBound>,
}

impl TimeWindow {
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, SelectionError> {
        let parse = |raw: Option<&str>| -> Result<Option<TimeBound>, SelectionError> {
            match raw.map(str::trim).filter(|s| !s.is_empty()) {
                Some(s) => TimeBound::parse(s).map(Some),
                None => Ok(None),
            }
        };
        Ok(Self {
            start: parse(start)?,
            end: parse(end)?,
        })
    }

    pub fn start_filter(&self) -> Option<String> {
        self.start.map(|b| match b {
            TimeBound::Date(d) => d.format("%Y-%m-%d").to_string(),
            TimeBound::Instant(t) => t.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        })
    }

    /// End bound for the query. A bare date is widened to 23:59:59 so that
    /// same-day observations are not excluded.
    pub fn end_filter(&self) -> Option<String> {
        self.end
            .map(|b| b.end_instant().format("%Y-%m-%dT%H:%M:%SZ").to_string())
    }

    pub fn is_open(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Inclusive epoch-millisecond bounds; a missing side is unbounded.
    pub fn bounds_ms(&self) -> (i64, i64) {
        (
            self.start.map_or(i64::MIN, |b| b.start_instant().timestamp_millis()),
            self.end.map_or(i64::MAX, |b| b.end_instant().timestamp_millis()),
        )
    }
}

/// How traces are laid out into subplots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayoutMode {
    /// One subplot per variable, every drone overlaid.
    #[default]
    AllDronesPerSubplot,
    /// One subplot per (variable, drone) pair.
    OnePerPair,
}

impl LayoutMode {
    pub fn parse(raw: Option<&str>) -> Result<Self, SelectionError> {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => Ok(LayoutMode::AllDronesPerSubplot),
            Some("one") => Ok(LayoutMode::OnePerPair),
            Some(other) => Err(SelectionError::UnknownLayout(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TraceMode {
    Lines,
    Markers,
    #[default]
    LinesAndMarkers,
}

impl TraceMode {
    pub fn parse(raw: Option<&str>) -> Result<Self, SelectionError> {
        match raw.map(str::trim) {
            None | Some("") | Some("both") | Some("lines+markers") => Ok(TraceMode::LinesAndMarkers),
            Some("lines") => Ok(TraceMode::Lines),
            Some("markers") => Ok(TraceMode::Markers),
            Some(other) => Err(SelectionError::UnknownMode(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TraceMode::Lines => "lines",
            TraceMode::Markers => "markers",
            TraceMode::LinesAndMarkers => "lines+markers",
        }
    }
}

/// Everything a timeseries plot needs, validated once at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotRequest {
    pub mission_id: String,
    pub drones: Selection,
    pub variables: Selection,
    pub window: TimeWindow,
    pub decimation_hours: u32,
    pub columns: usize,
    pub layout: LayoutMode,
    pub mode: TraceMode,
}

impl PlotRequest {
    pub fn has_selection(&self) -> bool {
        !self.drones.is_empty() && !self.variables.is_empty()
    }

    /// Stable fingerprint of the parameters, used to tell a stale request
    /// from a repeat of the current one.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}|{:?}|{}|{}|{:?}|{:?}",
            self.mission_id,
            self.drones,
            self.variables,
            self.window,
            self.decimation_hours,
            self.columns,
            self.layout,
            self.mode
        )
    }
}
