use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;

/// Header carrying the recipient's shared token.
pub const TOKEN_HEADER: &str = "x-callback-token";

/// Longest slice of a rejected response body kept for diagnostics.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Why a single callback attempt did not succeed.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Callback rejected with status {status}, response: {body}")]
    NonSuccessStatus { status: StatusCode, body: String },

    #[error("Failed to read callback response: {0}")]
    BodyRead(#[source] reqwest::Error),
}

/// HTTP client for posting callback payloads.
#[derive(Debug, Clone)]
pub struct CallbackClient {
    client: Client,
}

impl CallbackClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, CallbackError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CallbackError::Transport)?;
        Ok(Self { client })
    }

    /// POST `payload` to `url` with `token` in the [`TOKEN_HEADER`] header.
    ///
    /// Only HTTP 200 counts as delivered.
    pub async fn post(&self, url: &str, token: &str, payload: &str) -> Result<(), CallbackError> {
        tracing::debug!(url, bytes = payload.len(), "Posting callback");

        let response = self
            .client
            .post(url)
            .header(TOKEN_HEADER, token)
            .body(payload.to_owned())
            .send()
            .await
            .map_err(CallbackError::Transport)?;

        let status = response.status();
        let body = response.text().await.map_err(CallbackError::BodyRead)?;

        if status != StatusCode::OK {
            return Err(CallbackError::NonSuccessStatus {
                status,
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        Ok(())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> CallbackClient {
        CallbackClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_post_sends_token_and_raw_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header(TOKEN_HEADER, "some token"))
            .and(body_string("{}"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/hook", server.uri());
        client().post(&url, "some token", "{}").await.unwrap();
    }

    #[tokio::test]
    async fn test_non_200_is_failure_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("mock error"))
            .mount(&server)
            .await;

        let err = client()
            .post(&server.uri(), "token", "{}")
            .await
            .unwrap_err();
        match err {
            CallbackError::NonSuccessStatus { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "mock error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_2xx_is_still_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let err = client()
            .post(&server.uri(), "token", "{}")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CallbackError::NonSuccessStatus { status, .. } if status == StatusCode::ACCEPTED
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = CallbackClient::new(Duration::from_millis(100)).unwrap();
        let err = client.post(&server.uri(), "token", "{}").await.unwrap_err();
        assert!(matches!(err, CallbackError::Transport(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_failure() {
        // Port 9 (discard) on localhost is not expected to accept connections
        let err = client()
            .post("http://127.0.0.1:9/hook", "token", "{}")
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::Transport(_)));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
