//! Question/answer requests to the worker's HTTP endpoint

use std::time::Duration;

use serde::{Deserialize, Serialize};

use pairbot_core::prelude::*;

/// Default question endpoint served by the worker
pub const DEFAULT_ASK_URL: &str = "http://localhost:8000/ask_superduper";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Body of an ask request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Body of an ask response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

/// Thin client for the worker's question endpoint
#[derive(Debug, Clone)]
pub struct AskClient {
    http: reqwest::Client,
    url: String,
}

impl AskClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::ask(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Ask a question, optionally about a specific file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ask`] on transport failure, a non-success status, or a
    /// body without a string `answer`.
    pub async fn ask(&self, question: &str, filename: Option<&str>) -> Result<AskResponse> {
        let body = AskRequest {
            question: question.to_string(),
            filename: filename.map(str::to_string),
        };
        debug!("POST {} ({} chars)", self.url, body.question.len());

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ask(format!("request to {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ask(format!("{} returned {status}", self.url)));
        }

        response
            .json::<AskResponse>()
            .await
            .map_err(|e| Error::ask(format!("invalid answer from {}: {e}", self.url)))
    }
}
