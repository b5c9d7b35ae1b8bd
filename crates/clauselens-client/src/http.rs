//! HTTP client for the analysis service's analysis and playbook endpoints.

use clauselens_core::{AnalysisRequest, AnalysisResult, PlaybookVersion, StreamEvent};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::sse;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decoded events of one analysis stream, in arrival order.
///
/// A transport failure is delivered as a final
/// [`StreamEvent::TransportError`] before the stream ends.
pub type EventStream = BoxStream<'static, StreamEvent>;

/// Response of `GET /analysis/{id}`: the stored result once the analysis has
/// completed, a status placeholder before that.
///
/// Every result field has a default, so the placeholder (the only shape with
/// a `status`) must be tried first.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AnalysisLookup {
    Pending { analysis_id: String, status: String },
    Complete(AnalysisResult),
}

#[derive(Deserialize)]
struct CreateAnalysisResponse {
    analysis_id: String,
}

#[derive(Serialize)]
struct CreateVersionBody<'a> {
    content: &'a str,
    change_note: Option<&'a str>,
}

#[derive(Deserialize)]
struct CreatedVersion {
    id: String,
}

#[derive(Serialize)]
struct ReindexBody<'a> {
    version_id: &'a str,
}

/// HTTP client for the analysis service.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the given service base URL.
    ///
    /// `base_url` should be like `http://localhost:8000` (a trailing slash is
    /// dropped).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Use a preconfigured [`reqwest::Client`] (proxies, TLS roots, headers).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /analyze`. Returns the service-assigned analysis id.
    pub async fn create_analysis(&self, request: &AnalysisRequest) -> Result<String, ClientError> {
        let url = format!("{}/analyze", self.base_url);

        info!(
            url = %url,
            kind = %request.kind,
            playbook_version = request.playbook_version_id.as_deref().unwrap_or("-"),
            "submitting analysis"
        );
        let resp = self.client.post(&url).json(request).send().await?;
        let resp = check_status(resp).await?;

        let created: CreateAnalysisResponse = resp.json().await?;
        info!(analysis_id = %created.analysis_id, "analysis created");
        Ok(created.analysis_id)
    }

    /// `GET /analysis/{id}/stream`. Opens the event stream for one analysis.
    ///
    /// Fails only if the stream cannot be established. Frames with
    /// undecodable payloads are skipped, except `final` and `error`: the
    /// stream ends right after the first terminal event.
    pub async fn open_stream(&self, analysis_id: &str) -> Result<EventStream, ClientError> {
        let url = format!("{}/analysis/{}/stream", self.base_url, analysis_id);

        info!(url = %url, "opening analysis stream");
        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let events = sse::frames(resp.bytes_stream()).filter_map(|frame| {
            let event = match frame {
                Ok(frame) => match StreamEvent::decode(&frame.event, &frame.data) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "skipping undecodable stream event");
                        None
                    }
                },
                Err(e) => {
                    debug!(error = %e, "analysis stream read failed");
                    Some(StreamEvent::TransportError(e.to_string()))
                }
            };
            futures::future::ready(event)
        });
        let events = events.scan(false, |closed, event| {
            if *closed {
                return futures::future::ready(None);
            }
            *closed = event.is_terminal();
            futures::future::ready(Some(event))
        });
        Ok(events.boxed())
    }

    /// `GET /analysis/{id}`.
    pub async fn fetch_analysis(&self, analysis_id: &str) -> Result<AnalysisLookup, ClientError> {
        let url = format!("{}/analysis/{}", self.base_url, analysis_id);

        info!(url = %url, "fetching analysis");
        let resp = self.client.get(&url).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// `GET /playbook/versions`, in service order.
    pub async fn list_versions(&self) -> Result<Vec<PlaybookVersion>, ClientError> {
        let url = format!("{}/playbook/versions", self.base_url);

        info!(url = %url, "listing playbook versions");
        let resp = self.client.get(&url).send().await?;
        let resp = check_status(resp).await?;

        let versions: Vec<PlaybookVersion> = resp.json().await?;
        info!(count = versions.len(), "listed playbook versions");
        Ok(versions)
    }

    /// `PUT /playbook`. Returns the id of the new version.
    pub async fn create_version(
        &self,
        content: &str,
        change_note: Option<&str>,
    ) -> Result<String, ClientError> {
        let url = format!("{}/playbook", self.base_url);

        info!(url = %url, bytes = content.len(), "saving playbook version");
        let body = CreateVersionBody {
            content,
            change_note,
        };
        let resp = self.client.put(&url).json(&body).send().await?;
        let resp = check_status(resp).await?;

        let created: CreatedVersion = resp.json().await?;
        info!(version_id = %created.id, "playbook version created");
        Ok(created.id)
    }

    /// `POST /playbook/reindex`.
    pub async fn reindex(&self, version_id: &str) -> Result<(), ClientError> {
        let url = format!("{}/playbook/reindex", self.base_url);

        info!(url = %url, version_id, "reindexing playbook version");
        let resp = self
            .client
            .post(&url)
            .json(&ReindexBody { version_id })
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Server {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}
