//! Network transport for sync batches.
//!
//! The coordinator talks to the server through [`SyncTransport`] so that the
//! whole sync path can run against a test double; the production
//! implementation is a thin `reqwest` client with a bounded deadline per
//! request. A deadline exceeded is reported as [`SyncError::Timeout`] and is
//! handled exactly like any other transport failure.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use repsync_core::{MergeRequest, MergeResponse, SyncError, SyncRequest, SyncResponse, SyncResult};

/// Header naming the authenticated identity a request acts under. Credential
/// verification happens upstream of the engine; by the time a request carries
/// this header the identity has already been established.
pub const USER_ID_HEADER: &str = "X-User-Id";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Submit one batch; the response carries per-event acceptance.
    async fn submit_batch(&self, request: &SyncRequest) -> SyncResult<SyncResponse>;

    /// Fold the anonymous identity's server-side events into the
    /// authenticated one. Returns the number of reattributed events.
    async fn merge_user(
        &self,
        authenticated_user_id: Uuid,
        anonymous_user_id: Uuid,
    ) -> SyncResult<usize>;
}

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// `reqwest`-backed [`SyncTransport`] speaking the `/api/v1` endpoints.
pub struct HttpSyncTransport {
    http: reqwest::Client,
    config: TransportConfig,
}

impl HttpSyncTransport {
    pub fn new(config: TransportConfig) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::NetworkUnavailable {
                message: format!("failed to build http client: {}", e),
            })?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn map_transport_error(&self, error: reqwest::Error) -> SyncError {
        if error.is_timeout() {
            SyncError::Timeout {
                timeout_ms: self.config.request_timeout.as_millis() as u64,
            }
        } else {
            SyncError::NetworkUnavailable {
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn submit_batch(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        let response = self
            .http
            .post(self.endpoint("/sync"))
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::ValidationRejected { message });
        }
        if !status.is_success() {
            return Err(SyncError::NetworkUnavailable {
                message: format!("sync endpoint returned {}", status),
            });
        }

        response
            .json::<SyncResponse>()
            .await
            .map_err(|e| SyncError::Serialization {
                message: format!("malformed sync response: {}", e),
            })
    }

    async fn merge_user(
        &self,
        authenticated_user_id: Uuid,
        anonymous_user_id: Uuid,
    ) -> SyncResult<usize> {
        let response = self
            .http
            .post(self.endpoint("/users/merge"))
            .header(USER_ID_HEADER, authenticated_user_id.to_string())
            .json(&MergeRequest { anonymous_user_id })
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::MergeConflict { message });
        }
        if !status.is_success() {
            return Err(SyncError::NetworkUnavailable {
                message: format!("merge endpoint returned {}", status),
            });
        }

        let body = response
            .json::<MergeResponse>()
            .await
            .map_err(|e| SyncError::Serialization {
                message: format!("malformed merge response: {}", e),
            })?;
        Ok(body.merged_event_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_request(device_id: Uuid, user_id: Uuid) -> SyncRequest {
        SyncRequest {
            device_id,
            user_id,
            events: vec![],
        }
    }

    #[tokio::test]
    async fn submits_batch_and_parses_ack() {
        let server = MockServer::start().await;
        let device_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/api/v1/sync"))
            .and(body_partial_json(json!({"device_id": device_id})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ack_cursor": {"device_id": device_id, "last_acked_sequence": 3},
                "accepted_count": 3,
                "rejected_count": 0,
                "rejected_event_ids": []
            })))
            .mount(&server)
            .await;

        let transport = HttpSyncTransport::new(TransportConfig {
            base_url: server.uri(),
            ..TransportConfig::default()
        })
        .unwrap();

        let response = transport
            .submit_batch(&sample_request(device_id, user_id))
            .await
            .unwrap();
        assert_eq!(response.accepted_count, 3);
        assert_eq!(response.ack_cursor.last_acked_sequence, Some(3));
    }

    #[tokio::test]
    async fn server_error_maps_to_network_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/sync"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let transport = HttpSyncTransport::new(TransportConfig {
            base_url: server.uri(),
            ..TransportConfig::default()
        })
        .unwrap();

        let err = transport
            .submit_batch(&sample_request(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NetworkUnavailable { .. }));
    }

    #[tokio::test]
    async fn deadline_exceeded_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/sync"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(250)),
            )
            .mount(&server)
            .await;

        let transport = HttpSyncTransport::new(TransportConfig {
            base_url: server.uri(),
            request_timeout: Duration::from_millis(50),
        })
        .unwrap();

        let err = transport
            .submit_batch(&sample_request(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Timeout { .. }));
    }

    #[tokio::test]
    async fn merge_sends_identity_header_and_maps_conflict() {
        let server = MockServer::start().await;
        let auth_user = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/api/v1/users/merge"))
            .and(header(USER_ID_HEADER, auth_user.to_string().as_str()))
            .respond_with(ResponseTemplate::new(409).set_body_string("sequence overlap"))
            .mount(&server)
            .await;

        let transport = HttpSyncTransport::new(TransportConfig {
            base_url: server.uri(),
            ..TransportConfig::default()
        })
        .unwrap();

        let err = transport
            .merge_user(auth_user, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MergeConflict { .. }));
    }
}
