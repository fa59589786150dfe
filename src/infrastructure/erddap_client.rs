// ERDDAP tabledap client implementation
use crate::application::tabledap_source::{DatasetInfo, FetchError, TabledapSource};
use crate::domain::frame::Frame;
use crate::infrastructure::csv_frame::{parse_info, parse_table};
use crate::infrastructure::tabledap_query::{info_url, TabledapQuery};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ErddapClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ErddapClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("saildrone-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, timeout })
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!(url, "requesting");
        let response = self
            .client
            .get(url)
            .header("Accept", "text/csv")
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        response.text().await.map_err(|e| self.map_error(e))
    }

    fn map_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout.as_secs())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl TabledapSource for ErddapClient {
    async fn fetch_info(&self, dataset_url: &str) -> Result<DatasetInfo, FetchError> {
        let url = info_url(dataset_url).ok_or_else(|| {
            FetchError::Malformed(format!("'{}' is not an ERDDAP tabledap dataset URL", dataset_url))
        })?;
        let body = self.get_text(&url).await?;
        parse_info(&body)
    }

    async fn fetch_table(&self, query: &TabledapQuery) -> Result<Frame, FetchError> {
        let body = self.get_text(&query.to_url()).await?;
        let frame = parse_table(&body)?;
        tracing::debug!(rows = frame.len(), dataset = %query.dataset_url, "parsed table");
        Ok(frame)
    }
}
