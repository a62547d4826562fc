use std::fmt::Display;

use log::{debug, error, info, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{config::Config, utils::log_preview};

/// Value of the `code` field when the API found a quote
const API_SUCCESS_CODE: i64 = 200;
const CODE_MISSING: &str = "none";

const MSG_API_STATUS: &str = "获取名言失败，请检查API状态";
const MSG_API_FORMAT: &str = "API响应格式错误，无法解析名言。";
const MSG_API_REQUEST: &str = "API请求错误";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub content: String,
    pub author: String,
}

impl Display for Quote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n\n——{}", self.content, self.author)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to send request: {0}")]
    Request(#[source] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),
    #[error("response is not valid JSON: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    /// `code` is the raw JSON value, or `none` when the field is absent
    #[error("API reported code {code}")]
    Api { code: String },
    #[error("API reported success but sent no quote")]
    MissingData,
}

/// What the composer gets to work with. Fetch failures are carried as values so a mail still goes out.
#[derive(Debug)]
pub enum QuoteOutcome {
    Fetched(Quote),
    Unavailable(FetchError),
}

impl QuoteOutcome {
    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }
}

impl From<Result<Quote, FetchError>> for QuoteOutcome {
    fn from(value: Result<Quote, FetchError>) -> Self {
        match value {
            Ok(quote) => Self::Fetched(quote),
            Err(e) => Self::Unavailable(e),
        }
    }
}

impl Display for QuoteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteOutcome::Fetched(quote) => write!(f, "{quote}"),
            QuoteOutcome::Unavailable(FetchError::Api { .. }) => write!(f, "{MSG_API_STATUS}"),
            QuoteOutcome::Unavailable(FetchError::Decode { .. }) => write!(f, "{MSG_API_FORMAT}"),
            QuoteOutcome::Unavailable(e) => write!(f, "{MSG_API_REQUEST}: {e}"),
        }
    }
}

pub struct QuoteClient<'a> {
    http: Client,
    endpoint: &'a str,
    token: &'a str,
}

impl<'a> QuoteClient<'a> {
    pub fn new(config: &'a Config, token: &'a str) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(config.request_timeout.into())
            .build()
            .map_err(FetchError::Request)?;
        Ok(Self {
            http,
            endpoint: &config.quote_api_url,
            token,
        })
    }

    pub async fn fetch(&self) -> Result<Quote, FetchError> {
        info!("Requesting quote from {}", self.endpoint);
        let response = self
            .http
            .get(self.endpoint)
            .query(&[("token", self.token), ("format", "json")])
            .send()
            .await
            .map_err(FetchError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await.map_err(FetchError::Request)?;
        parse_response(&body)
    }

    /// Never fails, errors are logged and turned into placeholder text
    pub async fn fetch_outcome(&self) -> QuoteOutcome {
        let result = self.fetch().await;
        match &result {
            Ok(quote) => info!(
                "Got quote: {} - {}",
                log_preview(&quote.content, 20),
                quote.author
            ),
            Err(e) => match e {
                FetchError::Decode { body, .. } => {
                    error!("{e}. Body received: {:?}", log_preview(body, 200))
                }
                FetchError::Api { .. } | FetchError::MissingData => {
                    warn!("Unexpected API response: {e}")
                }
                _ => error!("Quote request failed: {e}"),
            },
        }
        result.into()
    }
}

/// Only a body that is not JSON at all is a format error. Any JSON whose `code` is not the
/// number 200 is an API status failure, whatever its shape.
fn parse_response(body: &str) -> Result<Quote, FetchError> {
    let response: Value = serde_json::from_str(body).map_err(|source| FetchError::Decode {
        source,
        body: body.to_string(),
    })?;
    let code = response.get("code");
    if code.and_then(Value::as_i64) != Some(API_SUCCESS_CODE) {
        return Err(FetchError::Api {
            code: code.map_or_else(|| CODE_MISSING.to_string(), Value::to_string),
        });
    }
    match response.get("data") {
        Some(data) if !data.is_null() => {
            Quote::deserialize(data).map_err(|e| {
                debug!("Quote data has an unexpected shape: {e}");
                FetchError::MissingData
            })
        }
        _ => Err(FetchError::MissingData),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tokio::runtime::Runtime;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SUCCESS_BODY: &str =
        r#"{"code":200,"msg":"success","data":{"content":"Q","author":"A"},"time":1}"#;

    fn config_for(server: &MockServer) -> Config {
        Config {
            quote_api_url: format!("{}/api/mingyan", server.uri()),
            request_timeout: 2.into(),
            ..Default::default()
        }
    }

    #[test]
    fn parse_success() {
        let actual = parse_response(SUCCESS_BODY).unwrap();
        assert_eq!(
            actual,
            Quote {
                content: "Q".into(),
                author: "A".into()
            }
        );
    }

    #[rstest]
    #[case(r#"{"code":401,"msg":"token error","data":null}"#, MSG_API_STATUS)]
    #[case(r#"{"code":500}"#, MSG_API_STATUS)]
    #[case("<html>Bad Gateway</html>", MSG_API_FORMAT)]
    #[case("", MSG_API_FORMAT)]
    #[case(r#"{"msg":"no code","data":{"content":"Q","author":"A"}}"#, MSG_API_STATUS)]
    #[case(r#"{"code":"200","data":{"content":"Q","author":"A"}}"#, MSG_API_STATUS)]
    #[case(r#"{"code":null}"#, MSG_API_STATUS)]
    #[case("[1,2]", MSG_API_STATUS)]
    #[case(r#"{"code":200,"data":null}"#, MSG_API_REQUEST)]
    #[case(r#"{"code":200,"data":{"content":1}}"#, MSG_API_REQUEST)]
    fn failed_parse_degrades_to_placeholder(#[case] body: &str, #[case] expected: &str) {
        let outcome: QuoteOutcome = parse_response(body).into();
        assert!(!outcome.is_fetched());
        assert!(outcome.to_string().starts_with(expected));
    }

    #[rstest]
    #[case(r#"{"msg":"no code"}"#, "none")]
    #[case(r#"{"code":"200"}"#, "\"200\"")]
    #[case(r#"{"code":401}"#, "401")]
    fn api_error_keeps_reported_code(#[case] body: &str, #[case] expected: &str) {
        match parse_response(body) {
            Err(FetchError::Api { code }) => assert_eq!(code, expected),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn quote_display_contains_content_and_author() {
        let quote = Quote {
            content: "天行健，君子以自强不息".into(),
            author: "周易".into(),
        };
        assert_eq!(quote.to_string(), "天行健，君子以自强不息\n\n——周易");
    }

    #[test]
    fn fetch_sends_token_and_format() {
        async fn test() {
            // Arrange
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/mingyan"))
                .and(query_param("token", "T"))
                .and(query_param("format", "json"))
                .respond_with(ResponseTemplate::new(200).set_body_string(SUCCESS_BODY))
                .expect(1)
                .mount(&mock_server)
                .await;
            let config = config_for(&mock_server);
            let client = QuoteClient::new(&config, "T").unwrap();

            // Act
            let actual = client.fetch().await.unwrap();

            // Assert
            assert_eq!(actual.content, "Q");
            assert_eq!(actual.author, "A");
        }
        Runtime::new().unwrap().block_on(test());
    }

    #[test]
    fn http_error_status_degrades() {
        async fn test() {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&mock_server)
                .await;
            let config = config_for(&mock_server);
            let client = QuoteClient::new(&config, "T").unwrap();

            let actual = client.fetch_outcome().await;

            assert!(matches!(
                actual,
                QuoteOutcome::Unavailable(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE))
            ));
            assert!(actual.to_string().starts_with(MSG_API_REQUEST));
        }
        Runtime::new().unwrap().block_on(test());
    }

    #[test]
    fn timeout_degrades() {
        async fn test() {
            let mock_server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(SUCCESS_BODY)
                        .set_delay(std::time::Duration::from_secs(5)),
                )
                .mount(&mock_server)
                .await;
            let config = Config {
                request_timeout: 1.into(),
                ..config_for(&mock_server)
            };
            let client = QuoteClient::new(&config, "T").unwrap();

            let actual = client.fetch_outcome().await;

            assert!(matches!(
                actual,
                QuoteOutcome::Unavailable(FetchError::Request(_))
            ));
        }
        Runtime::new().unwrap().block_on(test());
    }

    #[test]
    fn unreachable_server_degrades() {
        async fn test() {
            // Port 9 (discard) on localhost is not expected to be listening
            let config = Config {
                quote_api_url: "http://127.0.0.1:9/api/mingyan".into(),
                ..Default::default()
            };
            let client = QuoteClient::new(&config, "T").unwrap();

            let actual = client.fetch_outcome().await;

            assert!(!actual.is_fetched());
            assert!(!actual.to_string().is_empty());
        }
        Runtime::new().unwrap().block_on(test());
    }
}
