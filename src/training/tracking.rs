//! Remote experiment tracking over HTTP.
//!
//! A run is registered with `POST {url}/runs`, which answers `{"id": ...}`.
//! Epoch metrics go to `POST {url}/runs/{id}/log` and the test report to
//! `POST {url}/runs/{id}/test`. Failed requests are logged and never abort
//! training.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::callbacks::{Callback, EpochLogs, TrainingControl};
use crate::evaluation::ClassificationReport;

#[derive(Debug, Serialize)]
struct NewRun<'a> {
    project: Option<&'a str>,
    name: &'a str,
    params: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RunCreated {
    id: String,
}

/// Experiment tracking client bound to one run
pub struct RemoteTracker {
    client: Client,
    base_url: String,
    token: Option<String>,
    run_id: String,
}

impl RemoteTracker {
    /// Register a new run with the tracking server
    pub fn connect(
        url: &str,
        token: Option<&str>,
        project: Option<&str>,
        run_name: &str,
        params: &serde_json::Value,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = url.trim_end_matches('/').to_string();

        let mut request = client.post(format!("{}/runs", base_url)).json(&NewRun {
            project,
            name: run_name,
            params,
        });
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .with_context(|| format!("Could not reach tracking server {}", base_url))?;
        if !response.status().is_success() {
            return Err(anyhow!("Tracking server rejected run: {}", response.status()));
        }
        let created: RunCreated = response.json()?;
        info!("Tracking run {} at {}", created.id, base_url);

        Ok(Self {
            client,
            base_url,
            token: token.map(str::to_string),
            run_id: created.id,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn post<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<()> {
        let url = format!("{}/runs/{}/{}", self.base_url, self.run_id, endpoint);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send()?;
        if !response.status().is_success() {
            return Err(anyhow!("{} returned {}", url, response.status()));
        }
        Ok(())
    }
}

impl Callback for RemoteTracker {
    fn name(&self) -> &'static str {
        "tracking"
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, _control: &mut TrainingControl) {
        if let Err(e) = self.post("log", logs) {
            warn!("Tracking: could not log epoch {}: {e:#}", logs.epoch + 1);
        }
    }

    fn on_test_end(&mut self, report: &ClassificationReport) {
        if let Err(e) = self.post("test", report) {
            warn!("Tracking: could not log test results: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_server_is_an_error() {
        let params = serde_json::json!({ "nb_hist": 1024 });
        let result = RemoteTracker::connect("http://127.0.0.1:9/", None, None, "run", &params);
        assert!(result.is_err());
    }

    #[test]
    fn test_run_request_body() {
        let params = serde_json::json!({ "kernel_size": 16 });
        let body = serde_json::to_value(NewRun {
            project: Some("songs"),
            name: "20240101_000000",
            params: &params,
        })
        .unwrap();
        assert_eq!(body["project"], "songs");
        assert_eq!(body["params"]["kernel_size"], 16);
    }
}
