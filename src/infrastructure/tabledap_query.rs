// ERDDAP tabledap query builder
use crate::domain::selection::{Selection, TimeWindow};

/// Ordering / server-side thinning hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOrder {
    /// `orderBy("time")`, every row in natural order.
    Natural,
    /// `orderByClosest("time/Nhours")`, one row closest to each N-hour step.
    ClosestHours(u32),
    /// `orderByClosest("time/Nday")`.
    ClosestDays(u32),
}

impl SampleOrder {
    /// Cadence 0 means no server-side thinning.
    pub fn from_cadence(hours: u32) -> Self {
        if hours == 0 {
            SampleOrder::Natural
        } else {
            SampleOrder::ClosestHours(hours)
        }
    }

    fn clause(&self) -> String {
        match self {
            SampleOrder::Natural => "&orderBy(%22time%22)".to_string(),
            SampleOrder::ClosestHours(h) => format!("&orderByClosest(%22time/{}hours%22)", h),
            SampleOrder::ClosestDays(d) => format!("&orderByClosest(%22time/{}day%22)", d),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TabledapQuery {
    pub dataset_url: String,
    pub variables: Selection,
    pub order: SampleOrder,
    pub window: TimeWindow,
    /// Entity filter, e.g. `trajectory="1069"`.
    pub entity: Option<(String, String)>,
}

impl TabledapQuery {
    pub fn new(dataset_url: &str, variables: Selection) -> Self {
        Self {
            dataset_url: dataset_url.trim_end_matches('/').to_string(),
            variables,
            order: SampleOrder::Natural,
            window: TimeWindow::default(),
            entity: None,
        }
    }

    pub fn order(mut self, order: SampleOrder) -> Self {
        self.order = order;
        self
    }

    pub fn window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn entity(mut self, column: &str, value: &str) -> Self {
        self.entity = Some((column.to_string(), value.to_string()));
        self
    }

    /// Full `.csv` request URL.
    pub fn to_url(&self) -> String {
        let variables: Vec<String> = self
            .variables
            .iter()
            .map(|v| urlencoding::encode(v).into_owned())
            .collect();
        let mut url = format!("{}.csv?{}", self.dataset_url, variables.join(","));
        url.push_str(&self.order.clause());
        if let Some(start) = self.window.start_filter() {
            url.push_str(&format!("&time%3E={}", start));
        }
        if let Some(end) = self.window.end_filter() {
            url.push_str(&format!("&time%3C={}", end));
        }
        if let Some((column, value)) = &self.entity {
            url.push_str(&format!("&{}=%22{}%22", column, urlencoding::encode(value)));
        }
        url
    }
}

/// Split a tabledap dataset URL into (server base ending in `/erddap`, dataset id).
pub fn split_dataset_url(dataset_url: &str) -> Option<(&str, &str)> {
    let url = dataset_url.trim_end_matches('/');
    let erddap = url.find("/erddap")? + "/erddap".len();
    let id_start = url.rfind('/')? + 1;
    if id_start <= erddap {
        return None;
    }
    Some((&url[..erddap], &url[id_start..]))
}

/// `<server>/erddap/info/<dataset_id>/index.csv`
pub fn info_url(dataset_url: &str) -> Option<String> {
    let (server, id) = split_dataset_url(dataset_url)?;
    Some(format!("{}/info/{}/index.csv", server, id))
}
