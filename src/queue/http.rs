use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::debug;
use url::Url;

use super::JobQueue;
use crate::error::{IngestError, QueueError};
use crate::model::Job;

/// Posts each batch as a JSON array to a bulk-enqueue endpoint.
///
/// Any transport error or non-2xx status is reported as unavailable.
pub struct HttpJobQueue {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpJobQueue {
    /// # Arguments
    /// * `endpoint` - Bulk endpoint, e.g. `http://queue:3000/jobs/bulk`
    /// * `timeout` - Per-request timeout
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(QueueError::from)?;

        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl JobQueue for HttpJobQueue {
    async fn submit_batch(&self, jobs: &[Job]) -> Result<(), QueueError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(jobs)
            .send()
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(QueueError::Unavailable(format!("{status}: {body}")));
        }

        debug!("Queue accepted {} jobs", jobs.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Operation, PendingPayload};

    #[test]
    fn test_rejects_bad_endpoint() {
        assert!(HttpJobQueue::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_queue_is_unavailable() {
        // Port 9 (discard) on localhost is not listening in test environments.
        let queue = HttpJobQueue::new("http://127.0.0.1:9/jobs", Duration::from_millis(500)).unwrap();
        let jobs = vec![Job::from(PendingPayload::new(
            "A".to_string(),
            Operation::Delete,
            None,
        ))];

        let err = queue.submit_batch(&jobs).await.unwrap_err();
        assert!(matches!(err, QueueError::Unavailable(_)));
    }
}
