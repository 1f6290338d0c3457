//! Job invocation over HTTP

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::config::JobsConfig;

use super::types::{JobError, JobKind, JobPayload};

/// Timeout for the invoke request itself; the job keeps running afterwards
const INVOKE_TIMEOUT_SECS: u64 = 30;

#[async_trait]
pub trait JobInvoker: Send + Sync {
    /// Start a job. Returns once the backend accepted it.
    async fn invoke(&self, job: JobKind, payload: &JobPayload) -> Result<(), JobError>;
}

/// Invokes `POST <functions_url>/<job-name>` with a JSON payload
pub struct HttpJobInvoker {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpJobInvoker {
    pub fn new(config: &JobsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(INVOKE_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.functions_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self, job: JobKind) -> String {
        format!("{}/{}", self.base_url, job.as_str())
    }
}

#[async_trait]
impl JobInvoker for HttpJobInvoker {
    async fn invoke(&self, job: JobKind, payload: &JobPayload) -> Result<(), JobError> {
        let mut request = self.client.post(self.endpoint(job)).json(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| JobError::InvokeFailed {
            job,
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(job = %job, document_id = %payload.document_id, "Invoked job");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_IMPLEMENTED | StatusCode::SERVICE_UNAVAILABLE => {
                Err(JobError::Unavailable(if body.is_empty() {
                    format!("{} returned {}", job, status)
                } else {
                    body
                }))
            }
            _ => Err(JobError::Rejected {
                job,
                status: status.as_u16(),
                message: body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::HeaderMap, routing::post, Json, Router};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Seen = Arc<Mutex<Vec<(String, Option<String>, JobPayload)>>>;

    /// Serve a fake functions endpoint on a random local port
    async fn fake_functions(seen: Seen) -> String {
        let app = Router::new().route(
            "/functions/v1/:job",
            post(move |Path(job): Path<String>, headers: HeaderMap, Json(payload): Json<JobPayload>| {
                let seen = seen.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    seen.lock().await.push((job.clone(), auth, payload));
                    // axum speaks http 1.x, reqwest 0.11 http 0.2
                    if job == "linearize-pdf" {
                        (axum::http::StatusCode::SERVICE_UNAVAILABLE, "qpdf not installed")
                    } else {
                        (axum::http::StatusCode::OK, "")
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/functions/v1/", addr)
    }

    fn payload() -> JobPayload {
        JobPayload::new(JobKind::SplitIntoPages, "doc-1", "uploads/1-doc.pdf")
    }

    #[tokio::test]
    async fn test_posts_payload_with_bearer_token() {
        let seen: Seen = Arc::default();
        let url = fake_functions(seen.clone()).await;
        let invoker = HttpJobInvoker::new(&JobsConfig {
            functions_url: url,
            api_key: Some("secret".into()),
            ..JobsConfig::default()
        });

        invoker.invoke(JobKind::SplitIntoPages, &payload()).await.unwrap();

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "split-pdf");
        assert_eq!(seen[0].1.as_deref(), Some("Bearer secret"));
        assert_eq!(seen[0].2, payload());
    }

    #[tokio::test]
    async fn test_unavailable_tool_is_reported() {
        let url = fake_functions(Arc::default()).await;
        let invoker = HttpJobInvoker::new(&JobsConfig {
            functions_url: url,
            ..JobsConfig::default()
        });

        let err = invoker.invoke(JobKind::Linearize, &payload()).await.unwrap_err();
        assert!(matches!(err, JobError::Unavailable(msg) if msg == "qpdf not installed"));
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let invoker = HttpJobInvoker::new(&JobsConfig {
            functions_url: "http://127.0.0.1:9".into(),
            ..JobsConfig::default()
        });
        let err = invoker.invoke(JobKind::Optimize, &payload()).await.unwrap_err();
        assert!(matches!(err, JobError::InvokeFailed { job: JobKind::Optimize, .. }));
    }
}
