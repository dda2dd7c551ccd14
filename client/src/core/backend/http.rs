//! HTTP Parser Backend
//!
//! Talks to the parser REST API:
//! - `POST   /parser/analyze`          submit a link
//! - `GET    /parser/status/{taskId}`  poll one task
//! - `GET    /parser/tasks`            list tasks
//! - `DELETE /parser/tasks/{taskId}`   delete one task
//! - `DELETE /parser/tasks/failed`     delete failed tasks
//! - `GET    /course/{videoId}/detail` playable content
//!
//! No retries happen here; periodic callers simply try again next cycle.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::backend::{ApiBase, ParserBackend};
use crate::core::settings::ApiSettings;
use crate::core::subtitles::CourseDetail;
use crate::core::tasks::{clamp_progress, StatusSnapshot, Task, TaskStatus};
use crate::core::{CoreError, CoreResult, EpochMillis, TaskId, VideoId};

/// Default per-request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Longest error body echoed back to the user
const MAX_ERROR_BODY_CHARS: usize = 500;

// =============================================================================
// API Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    video_id: Option<VideoId>,
    #[serde(default)]
    error: Option<String>,
}

impl From<StatusResponse> for StatusSnapshot {
    fn from(resp: StatusResponse) -> Self {
        let status = resp
            .status
            .as_deref()
            .map(TaskStatus::from_wire)
            .unwrap_or_default();
        StatusSnapshot {
            status,
            progress: clamp_progress(resp.progress.unwrap_or(0.0)),
            video_id: resp.video_id.filter(|v| !v.is_empty()),
            error: resp.error.filter(|e| !e.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    task_id: TaskId,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    video_id: Option<VideoId>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    created_at: Option<EpochMillis>,
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        Task {
            task_id: record.task_id,
            url: record.url.unwrap_or_default(),
            title: record.title.filter(|t| !t.is_empty()),
            status: record
                .status
                .as_deref()
                .map(TaskStatus::from_wire)
                .unwrap_or_default(),
            progress: clamp_progress(record.progress.unwrap_or(0.0)),
            video_id: record.video_id.filter(|v| !v.is_empty()),
            error: record.error.filter(|e| !e.is_empty()),
            created_at: record.created_at,
        }
    }
}

/// Error body as produced by the backend framework
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// =============================================================================
// HttpParserBackend
// =============================================================================

/// Parser backend reached over HTTP
pub struct HttpParserBackend {
    /// HTTP client with configured timeout
    client: reqwest::Client,
    base: ApiBase,
}

impl std::fmt::Debug for HttpParserBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpParserBackend")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpParserBackend {
    /// Create a backend client with the default timeout
    pub fn new(base: ApiBase) -> CoreResult<Self> {
        Self::with_timeout(base, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base: ApiBase, timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base })
    }

    /// Create a backend client from connection settings
    pub fn from_settings(settings: &ApiSettings) -> CoreResult<Self> {
        let base = ApiBase::parse(&settings.base_url)?;
        Self::with_timeout(base, settings.request_timeout())
    }

    pub fn base(&self) -> &ApiBase {
        &self.base
    }

    /// Sends a request and returns the body of a successful response
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> CoreResult<String> {
        let url = self.base.endpoint(path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| CoreError::NetworkError(format!("{}: {}", url, e)))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CoreError::NetworkError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Self::parse_api_error(status, &text));
        }

        Ok(text)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> CoreResult<T> {
        let body = self.send(Method::GET, path, None).await?;
        Self::decode(&body)
    }

    fn decode<T: DeserializeOwned>(body: &str) -> CoreResult<T> {
        serde_json::from_str(body)
            .map_err(|e| CoreError::DecodeError(format!("{} (body: {})", e, Self::truncate(body))))
    }

    fn truncate(body: &str) -> String {
        body.chars().take(MAX_ERROR_BODY_CHARS).collect()
    }

    /// Parse an error response body
    fn parse_api_error(status: StatusCode, body: &str) -> CoreError {
        if let Ok(err_resp) = serde_json::from_str::<ApiErrorResponse>(body) {
            if let Some(message) = err_resp
                .message
                .filter(|m| !m.is_empty())
                .or(err_resp.error.filter(|e| !e.is_empty()))
            {
                return CoreError::BackendError {
                    status: status.as_u16(),
                    message,
                };
            }
        }

        let truncated = Self::truncate(body.trim());
        CoreError::BackendError {
            status: status.as_u16(),
            message: if truncated.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                truncated
            },
        }
    }
}

#[async_trait]
impl ParserBackend for HttpParserBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn analyze(&self, url: &str) -> CoreResult<TaskId> {
        let body = serde_json::to_value(AnalyzeRequest { url })?;
        let text = self.send(Method::POST, "/parser/analyze", Some(body)).await?;
        let resp: AnalyzeResponse = Self::decode(&text)?;

        match resp.task_id.filter(|id| !id.is_empty()) {
            Some(task_id) => {
                info!("Submitted {} as task {}", url, task_id);
                Ok(task_id)
            }
            None => Err(CoreError::BackendError {
                status: StatusCode::OK.as_u16(),
                message: resp
                    .message
                    .unwrap_or_else(|| "response carried no taskId".to_string()),
            }),
        }
    }

    async fn task_status(&self, task_id: &str) -> CoreResult<StatusSnapshot> {
        let resp: StatusResponse = self
            .get_json(&format!("/parser/status/{}", task_id))
            .await?;
        Ok(resp.into())
    }

    async fn list_tasks(&self) -> CoreResult<Vec<Task>> {
        let records: Option<Vec<TaskRecord>> = self.get_json("/parser/tasks").await?;
        Ok(records
            .unwrap_or_default()
            .into_iter()
            .map(Task::from)
            .collect())
    }

    async fn delete_task(&self, task_id: &str) -> CoreResult<()> {
        self.send(Method::DELETE, &format!("/parser/tasks/{}", task_id), None)
            .await?;
        info!("Deleted task {}", task_id);
        Ok(())
    }

    async fn delete_failed_tasks(&self) -> CoreResult<()> {
        self.send(Method::DELETE, "/parser/tasks/failed", None).await?;
        info!("Deleted failed tasks");
        Ok(())
    }

    async fn course_detail(&self, video_id: &str) -> CoreResult<CourseDetail> {
        self.get_json(&format!("/course/{}/detail", video_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_mapping() {
        let resp: StatusResponse =
            serde_json::from_str(r#"{"status":"processing","progress":40.4}"#).unwrap();
        let snapshot = StatusSnapshot::from(resp);
        assert_eq!(snapshot.status, TaskStatus::Processing);
        assert_eq!(snapshot.progress, 40);
        assert_eq!(snapshot.video_id, None);

        let resp: StatusResponse = serde_json::from_str(
            r#"{"status":"completed","progress":100,"videoId":"V1","error":null}"#,
        )
        .unwrap();
        let snapshot = StatusSnapshot::from(resp);
        assert_eq!(snapshot, StatusSnapshot::completed("V1"));
    }

    #[test]
    fn test_unknown_task_maps_to_failed() {
        let resp: StatusResponse = serde_json::from_str(
            r#"{"status":"failed","progress":0,"videoId":null,"error":"Task not found"}"#,
        )
        .unwrap();
        let snapshot = StatusSnapshot::from(resp);
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("Task not found"));
    }

    #[test]
    fn test_task_record_mapping() {
        let json = r#"[
            {"taskId":"T1","status":"completed","progress":100,"videoId":"V1","error":null,
             "url":"https://youtu.be/abc","title":"Lecture","createdAt":1700000000000},
            {"taskId":"T2","status":"running","progress":250,"videoId":"","url":null}
        ]"#;
        let records: Vec<TaskRecord> = serde_json::from_str(json).unwrap();
        let tasks: Vec<Task> = records.into_iter().map(Task::from).collect();

        assert_eq!(tasks[0].display_title(), "Lecture");
        assert_eq!(tasks[0].video_id.as_deref(), Some("V1"));
        assert_eq!(tasks[1].status, TaskStatus::Processing);
        assert_eq!(tasks[1].progress, 100);
        assert_eq!(tasks[1].video_id, None);
        assert_eq!(tasks[1].created_at, None);
    }

    #[test]
    fn test_parse_api_error_prefers_message() {
        let err = HttpParserBackend::parse_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"timestamp":"2024-01-01","status":400,"error":"Bad Request","message":"URL is required"}"#,
        );
        match err {
            CoreError::BackendError { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "URL is required");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_api_error_falls_back_to_body_or_reason() {
        let err = HttpParserBackend::parse_api_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(
            err,
            CoreError::BackendError { status: 502, ref message } if message == "upstream down"
        ));
        assert!(err.is_transient());

        let err = HttpParserBackend::parse_api_error(StatusCode::NOT_FOUND, "");
        assert!(matches!(
            err,
            CoreError::BackendError { status: 404, ref message } if message == "Not Found"
        ));
    }

    #[test]
    fn test_analyze_request_shape() {
        let body = serde_json::to_value(AnalyzeRequest {
            url: "https://youtu.be/abc",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"url": "https://youtu.be/abc"}));
    }

    #[test]
    fn test_backend_from_settings() {
        let settings = ApiSettings::default();
        let backend = HttpParserBackend::from_settings(&settings).unwrap();
        assert_eq!(backend.base().as_str(), "http://localhost:8080/api");
        assert_eq!(backend.name(), "http");
    }
}
