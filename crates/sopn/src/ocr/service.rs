//! Client side of the external document analysis service.
//!
//! The service is asynchronous: a document is submitted, a job id comes back,
//! and the job is polled until it reaches a terminal state.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use log::debug;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::blocks::AnalysisOutput;
use super::error::{OcrError, Result};
use crate::config::OcrConfig;
use crate::secrets::resolve_secret;

/// Maximum length of an error body kept in an error message.
const MAX_ERROR_BODY_LENGTH: usize = 200;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Job state as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisState {
    InProgress,
    Succeeded,
    PartialSuccess,
    Failed,
}

impl AnalysisState {
    pub fn is_complete(&self) -> bool {
        !matches!(self, AnalysisState::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStatus {
    pub status: AnalysisState,
    #[serde(default)]
    pub status_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct PagesResponse {
    pages: Vec<String>,
}

/// An asynchronous table recognition service.
#[async_trait]
pub trait DocumentAnalysisService: Send + Sync {
    /// Submits a PDF, optionally restricted to `pages`, and returns the job id.
    async fn start_analysis(&self, pdf: Vec<u8>, pages: Option<&[u32]>) -> Result<String>;

    async fn analysis_status(&self, job_id: &str) -> Result<AnalysisStatus>;

    /// Recognition output of a finished job.
    async fn analysis_result(&self, job_id: &str) -> Result<AnalysisOutput>;

    /// Rendered PNG pages of a finished job, or `None` when the service does
    /// not provide them.
    async fn page_images(&self, job_id: &str) -> Result<Option<Vec<Vec<u8>>>>;
}

/// HTTP client for the JSON analysis protocol.
pub struct HttpAnalysisService {
    client: Client,
    endpoint: String,
    api_key: SecretString,
}

impl HttpAnalysisService {
    pub fn new(endpoint: &str, api_key: SecretString, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Builds the client from the `ocr` config section.
    ///
    /// Returns `NotConfigured` when OCR is disabled or has no endpoint.
    pub fn from_config(config: &OcrConfig) -> Result<Self> {
        let endpoint = match config.endpoint.as_deref() {
            Some(endpoint) if config.enabled => endpoint,
            _ => return Err(OcrError::NotConfigured),
        };
        let api_key = resolve_secret(
            config.api_key_file.as_deref(),
            Some(config.api_key_env.as_str()),
        )?;
        Self::new(
            endpoint,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    async fn get(&self, path: &str) -> Result<Response> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;
        Ok(response)
    }
}

/// Turns a non-success response into `OcrError::Status`.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(OcrError::Status {
        status: status.as_u16(),
        body: truncate_body(&body),
    })
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}

fn pages_param(pages: &[u32]) -> String {
    pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl DocumentAnalysisService for HttpAnalysisService {
    async fn start_analysis(&self, pdf: Vec<u8>, pages: Option<&[u32]>) -> Result<String> {
        let mut request = self
            .client
            .post(self.url("analyses"))
            .bearer_auth(self.api_key.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(pdf);
        if let Some(pages) = pages {
            request = request.query(&[("pages", pages_param(pages))]);
        }

        let response = check_status(request.send().await?).await?;
        let started: StartResponse = response.json().await?;
        if started.job_id.is_empty() {
            return Err(OcrError::InvalidResponse("empty job_id".to_string()));
        }
        debug!("Analysis job {} started", started.job_id);
        Ok(started.job_id)
    }

    async fn analysis_status(&self, job_id: &str) -> Result<AnalysisStatus> {
        let response = check_status(self.get(&format!("analyses/{}", job_id)).await?).await?;
        Ok(response.json().await?)
    }

    async fn analysis_result(&self, job_id: &str) -> Result<AnalysisOutput> {
        let response =
            check_status(self.get(&format!("analyses/{}/result", job_id)).await?).await?;
        Ok(response.json().await?)
    }

    async fn page_images(&self, job_id: &str) -> Result<Option<Vec<Vec<u8>>>> {
        let response = self.get(&format!("analyses/{}/pages", job_id)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: PagesResponse = check_status(response).await?.json().await?;

        let images = body
            .pages
            .iter()
            .enumerate()
            .map(|(i, encoded)| {
                base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| {
                        OcrError::InvalidResponse(format!("page {} is not base64: {}", i + 1, e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(images))
    }
}
