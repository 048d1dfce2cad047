//! HTTP roster sync notifier.
//!
//! Publishes every approved gate permit to a spreadsheet web app, which
//! clears the target range and writes the rows starting at
//! (`start_row`, `start_col`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::RosterSyncConfig;
use domain::models::RosterRow;
use domain::services::{NotifierError, PermitRequestStore, RosterSyncNotifier};

/// Body accepted by the sheet web app.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishBody {
    clear: bool,
    start_row: u32,
    start_col: u32,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct PublishReply {
    ok: bool,
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpRosterSync {
    client: Client,
    config: RosterSyncConfig,
    requests: Arc<dyn PermitRequestStore>,
}

impl HttpRosterSync {
    pub fn new(
        config: RosterSyncConfig,
        requests: Arc<dyn PermitRequestStore>,
    ) -> Result<Self, NotifierError> {
        if config.webapp_url.trim().is_empty() {
            return Err(NotifierError::NotConfigured("webapp_url is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifierError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            config,
            requests,
        })
    }

    async fn roster_rows(&self) -> Result<Vec<Vec<Value>>, NotifierError> {
        let entries = self.requests.gate_roster().await?;
        Ok(entries
            .iter()
            .map(|entry| RosterRow::from_entry(entry).to_sheet_values())
            .collect())
    }
}

#[async_trait]
impl RosterSyncNotifier for HttpRosterSync {
    async fn publish_gate_roster(&self) -> Result<usize, NotifierError> {
        let rows = self.roster_rows().await?;
        let expected = rows.len();
        let body = PublishBody {
            clear: true,
            start_row: self.config.start_row,
            start_col: self.config.start_col,
            rows,
        };

        debug!(rows = expected, "Posting gate roster");

        let response = self
            .client
            .post(&self.config.webapp_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifierError::Transport(format!(
                        "timed out after {}s",
                        self.config.timeout_secs
                    ))
                } else {
                    NotifierError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| NotifierError::Transport(e.to_string()))?;

        // The web app answers errors with an HTML page, so parse before
        // looking at the status.
        let reply: PublishReply = serde_json::from_str(&text).map_err(|_| {
            NotifierError::InvalidResponse(format!("HTTP {}: {}", status, preview(&text)))
        })?;

        if !reply.ok {
            return Err(NotifierError::Rejected(
                reply.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        Ok(reply.count.unwrap_or(expected))
    }
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
