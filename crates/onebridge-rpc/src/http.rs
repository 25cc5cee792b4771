//! Request/response mode: one HTTP POST per action.
//!
//! The implementation exposes `POST {base_url}/{action}` with the
//! parameters as a JSON body and answers with the same reply frame the
//! WebSocket flavor uses, minus `echo`.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde_json::Value;

use onebridge_protocol::ApiResponse;

use crate::{Caller, RpcError, check_reply};

/// A [`Caller`] that talks to the implementation's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpCaller {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpCaller {
    /// Creates a caller for `base_url` (e.g. `http://127.0.0.1:5700`).
    ///
    /// When `token` is set every request carries
    /// `Authorization: Token <token>`.
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            timeout,
        }
    }

    /// The normalized endpoint root, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Caller for HttpCaller {
    async fn call(&self, action: &str, params: Value) -> Result<Value, RpcError> {
        let url = format!("{}/{}", self.base_url, action);
        let mut request = self
            .client
            .post(&url)
            .json(&params)
            .timeout(self.timeout);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Token {token}"));
        }

        tracing::debug!(action, "[request]");
        let failed = |source: reqwest::Error| {
            if source.is_timeout() {
                RpcError::Timeout {
                    action: action.to_string(),
                    params: params.clone(),
                }
            } else {
                RpcError::Http {
                    action: action.to_string(),
                    source,
                }
            }
        };

        let reply: ApiResponse = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(failed)?
            .json()
            .await
            .map_err(failed)?;

        tracing::debug!(action, retcode = reply.retcode, "[response]");
        check_reply(reply, action, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_posts_params_with_token_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/send_group_msg")
            .match_header("authorization", "Token secret")
            .match_body(mockito::Matcher::Json(json!({"group_id": 5, "message": "hi"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"status": "ok", "retcode": 0, "data": {"message_id": 9}}).to_string(),
            )
            .create_async()
            .await;

        let caller = HttpCaller::new(
            format!("{}/", server.url()),
            Some("secret".into()),
            Duration::from_secs(5),
        );
        let data = caller
            .call("send_group_msg", json!({"group_id": 5, "message": "hi"}))
            .await
            .unwrap();

        assert_eq!(data, json!({"message_id": 9}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_failed_reply_is_remote_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/delete_msg")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"status": "failed", "retcode": 100, "data": null, "wording": "gone"})
                    .to_string(),
            )
            .create_async()
            .await;

        let caller = HttpCaller::new(server.url(), None, Duration::from_secs(5));
        let err = caller
            .call("delete_msg", json!({"message_id": 1}))
            .await
            .unwrap_err();

        assert_eq!(err.retcode(), Some(100));
        assert_eq!(err.action(), Some("delete_msg"));
    }

    #[tokio::test]
    async fn test_call_http_status_error_is_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/get_status")
            .with_status(401)
            .create_async()
            .await;

        let caller = HttpCaller::new(server.url(), None, Duration::from_secs(5));
        let err = caller.call("get_status", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::Http { .. }));
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let caller = HttpCaller::new("http://x:5700///", None, Duration::from_secs(1));
        assert_eq!(caller.base_url(), "http://x:5700");
    }
}
