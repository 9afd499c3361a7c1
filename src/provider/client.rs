//! HTTP plumbing shared by the provider adapters

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};
use crate::governor::QuotaGovernor;
use crate::model::OPERATOR_NAME;

/// Upper bound on a single provider call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Authenticated JSON client for one provider API
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    api_token: String,
    governor: Option<QuotaGovernor>,
}

impl ApiClient {
    pub fn new(base_url: &str, api_token: &str, governor: Option<QuotaGovernor>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(OPERATOR_NAME)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            governor,
        })
    }

    /// Absolute URL for a path below the base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Request builder carrying authorization and content negotiation headers
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.api_token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Send a request and require one of the `expected` statuses
    ///
    /// Quota headers are observed before the status is checked, so a
    /// throttling provider slows down failing calls as well.
    pub async fn send(&self, request: RequestBuilder, expected: &[StatusCode]) -> Result<Response> {
        let response = request.send().await?;
        debug!("{} {}", response.status(), response.url());

        if let Some(governor) = &self.governor {
            governor.observe(response.headers()).await;
        }

        let status = response.status();
        if expected.contains(&status) {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::TransportError {
            status: status.as_u16(),
            expected: expected
                .iter()
                .map(|s| s.as_u16().to_string())
                .collect::<Vec<_>>()
                .join(" or "),
            body,
        })
    }

    /// Send a request and decode its JSON body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        expected: &[StatusCode],
    ) -> Result<T> {
        let response = self.send(request, expected).await?;
        decode(response).await
    }
}

/// Decode a JSON body, classifying malformed content as a decode error
pub async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| Error::DecodeError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Thing {
        name: String,
    }

    #[tokio::test]
    async fn test_sends_bearer_token_and_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/things/1"))
            .and(header("authorization", "Bearer secret"))
            .and(header("user-agent", OPERATOR_NAME))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "one"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), "secret", None).unwrap();
        let thing: Thing = client
            .send_json(client.request(Method::GET, &client.url("/things/1")), &[StatusCode::OK])
            .await
            .unwrap();
        assert_eq!(thing.name, "one");
    }

    #[tokio::test]
    async fn test_unexpected_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad input"))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), "secret", None).unwrap();
        let err = client
            .send(
                client.request(Method::POST, &client.url("/things")),
                &[StatusCode::OK, StatusCode::CREATED],
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "got status 422, expected 200 or 201. Body: bad input");
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), "secret", None).unwrap();
        let err = client
            .send_json::<Thing>(client.request(Method::GET, &client.url("/")), &[StatusCode::OK])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DecodeError(_)));
    }
}
