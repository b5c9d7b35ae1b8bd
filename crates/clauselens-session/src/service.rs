//! Seams between the session logic and the analysis service.

use async_trait::async_trait;
use clauselens_client::{ApiClient, ClientError, EventStream};
use clauselens_core::{AnalysisRequest, PlaybookVersion};

#[async_trait]
pub trait AnalysisService: Send + Sync + 'static {
    /// Create an analysis job and return its id.
    async fn create_analysis(&self, request: &AnalysisRequest) -> Result<String, ClientError>;

    /// Open the event stream of an existing job.
    async fn open_stream(&self, analysis_id: &str) -> Result<EventStream, ClientError>;
}

#[async_trait]
pub trait PlaybookService: Send + Sync {
    /// All versions, in the service's order. The first is the default.
    async fn list_versions(&self) -> Result<Vec<PlaybookVersion>, ClientError>;

    /// Store new playbook content and return the new version id.
    async fn create_version(
        &self,
        content: &str,
        change_note: Option<&str>,
    ) -> Result<String, ClientError>;

    async fn reindex(&self, version_id: &str) -> Result<(), ClientError>;
}

#[async_trait]
impl AnalysisService for ApiClient {
    async fn create_analysis(&self, request: &AnalysisRequest) -> Result<String, ClientError> {
        ApiClient::create_analysis(self, request).await
    }

    async fn open_stream(&self, analysis_id: &str) -> Result<EventStream, ClientError> {
        ApiClient::open_stream(self, analysis_id).await
    }
}

#[async_trait]
impl PlaybookService for ApiClient {
    async fn list_versions(&self) -> Result<Vec<PlaybookVersion>, ClientError> {
        ApiClient::list_versions(self).await
    }

    async fn create_version(
        &self,
        content: &str,
        change_note: Option<&str>,
    ) -> Result<String, ClientError> {
        ApiClient::create_version(self, content, change_note).await
    }

    async fn reindex(&self, version_id: &str) -> Result<(), ClientError> {
        ApiClient::reindex(self, version_id).await
    }
}
