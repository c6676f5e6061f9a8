// src/api.rs

use crate::errors::{ParleyError, ParleyResult};
use log::{debug, warn};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

/// Gateway to one server session.
///
/// Owns the HTTP client and the CSRF token for that session. The token is
/// fetched lazily on the first request, cached for the lifetime of the
/// client, and refreshed at most once per request when the server rejects
/// it with a 403.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    csrf: Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct CsrfResponse {
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> ParleyResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(ApiClient {
            http,
            base_url,
            csrf: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Returns the session CSRF token, fetching it from `/csrf-token` on
    /// first use.
    pub async fn csrf_token(&self) -> ParleyResult<String> {
        let mut guard = self.csrf.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        debug!("fetching csrf token from {}", self.base_url);
        let response = self.http.get(self.url("/csrf-token")).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParleyError::api_error(
                status.as_u16(),
                extract_error_message(status.as_u16(), &body),
            ));
        }

        let body: CsrfResponse = response.json().await?;
        *guard = Some(body.token.clone());
        Ok(body.token)
    }

    async fn invalidate_csrf(&self) {
        *self.csrf.lock().await = None;
    }

    async fn send_post(&self, endpoint: &str, body: &Value) -> ParleyResult<reqwest::Response> {
        let token = self.csrf_token().await?;
        let response = self
            .http
            .post(self.url(endpoint))
            .header("X-CSRF-Token", token)
            .json(body)
            .send()
            .await?;
        Ok(response)
    }

    /// POSTs a JSON body and returns the raw response, after the CSRF
    /// dance. A 403 whose body mentions the token triggers exactly one
    /// token re-fetch and retry; any other status is returned untouched
    /// for the caller to inspect. Used directly by the streaming consumer,
    /// which must not buffer the body.
    pub async fn post_raw(&self, endpoint: &str, body: &Value) -> ParleyResult<reqwest::Response> {
        let response = self.send_post(endpoint, body).await?;
        if response.status() != StatusCode::FORBIDDEN {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        if text.to_ascii_lowercase().contains("token") {
            warn!("csrf token rejected on {}, re-fetching once", endpoint);
            self.invalidate_csrf().await;
            return self.send_post(endpoint, body).await;
        }

        Err(ParleyError::api_error(
            403,
            extract_error_message(403, &text),
        ))
    }

    /// POSTs a JSON body and returns the parsed JSON response. Endpoints
    /// that answer with an empty body map to `Value::Null`.
    pub async fn post(&self, endpoint: &str, body: &Value) -> ParleyResult<Value> {
        let response = self.post_raw(endpoint, body).await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(ParleyError::api_error(
                status.as_u16(),
                extract_error_message(status.as_u16(), &text),
            ));
        }

        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Typed variant of [`post`](Self::post).
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Value,
    ) -> ParleyResult<T> {
        let value = self.post(endpoint, body).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Pulls the server's error message out of a JSON error body; falls back
/// to a generic status line when the body is not parseable JSON.
pub(crate) fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return message.to_string();
        }
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    format!("request failed: {}", status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_csrf(server: &MockServer, token: &str) {
        Mock::given(method("GET"))
            .and(path("/csrf-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetches_csrf_token_once_and_attaches_header() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/csrf-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok-1" })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/characters/all"))
            .and(header("X-CSRF-Token", "tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(2)
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        api.post("/api/characters/all", &json!({})).await.unwrap();
        api.post("/api/characters/all", &json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn retries_once_when_csrf_token_is_rejected() {
        let server = MockServer::start().await;
        mock_csrf(&server, "tok-2").await;

        // First attempt is rejected with a token complaint, second passes.
        Mock::given(method("POST"))
            .and(path("/api/settings/save"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Invalid CSRF token"))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/settings/save"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "ok" })))
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let value = api.post("/api/settings/save", &json!({})).await.unwrap();
        assert_eq!(value["result"], "ok");
    }

    #[tokio::test]
    async fn forbidden_without_token_mention_is_not_retried() {
        let server = MockServer::start().await;
        mock_csrf(&server, "tok-3").await;

        Mock::given(method("POST"))
            .and(path("/api/characters/delete"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({
                    "error": { "message": "not allowed" }
                })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let err = api
            .post("/api/characters/delete", &json!({ "avatar_url": "a.png" }))
            .await
            .unwrap_err();
        match err {
            ParleyError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "not allowed");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn json_error_body_message_is_surfaced_verbatim() {
        let server = MockServer::start().await;
        mock_csrf(&server, "tok-4").await;

        Mock::given(method("POST"))
            .and(path("/api/chats/get"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({ "error": { "message": "disk on fire" } })),
            )
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let err = api.post("/api/chats/get", &json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[tokio::test]
    async fn non_json_error_body_yields_generic_message() {
        let server = MockServer::start().await;
        mock_csrf(&server, "tok-5").await;

        Mock::given(method("POST"))
            .and(path("/api/chats/get"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let err = api.post("/api/chats/get", &json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "request failed: 502");
    }

    #[tokio::test]
    async fn empty_success_body_maps_to_null() {
        let server = MockServer::start().await;
        mock_csrf(&server, "tok-6").await;

        Mock::given(method("POST"))
            .and(path("/api/chats/save"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let value = api.post("/api/chats/save", &json!({})).await.unwrap();
        assert!(value.is_null());
    }
}
