use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use taskgraph_core::config::HttpConfig;
use taskgraph_core::error::{Result, TaskgraphError};
use taskgraph_core::traits::HttpClient;
use taskgraph_core::types::{HttpMethod, HttpRequest, HttpResponse};

/// Characters of a failing response body kept in the error message.
const ERROR_BODY_CHARS: usize = 500;

/// `HttpClient` backed by reqwest.
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| failure(e.to_string()))?;
        Ok(Self { client })
    }
}

fn failure(message: impl Into<String>) -> TaskgraphError {
    TaskgraphError::IntegrationFailure {
        integration: "http".into(),
        message: message.into(),
    }
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

impl HttpClient for ReqwestHttpClient {
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(async move {
            debug!(method = request.method.as_str(), url = %request.url, "HTTP integration call");

            let mut req = self
                .client
                .request(to_reqwest(request.method), &request.url)
                .timeout(Duration::from_secs(request.timeout_secs));
            for (k, v) in &request.headers {
                req = req.header(k.as_str(), v.as_str());
            }
            if let Some(body) = request.body {
                req = req.body(body);
            }

            let resp = req.send().await.map_err(|e| failure(e.to_string()))?;
            let status_code = resp.status().as_u16();
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = resp.text().await.map_err(|e| failure(e.to_string()))?;

            Ok(HttpResponse {
                status_code,
                content_type,
                body,
            })
        })
    }
}

/// Turn a raw response into a step payload.
///
/// Non-2xx responses are failures. Bodies are parsed as JSON when the
/// content type says so and kept as text otherwise.
pub fn interpret_response(response: HttpResponse) -> Result<Value> {
    if !response.is_success() {
        let snippet: String = response.body.chars().take(ERROR_BODY_CHARS).collect();
        return Err(failure(format!("HTTP {}: {}", response.status_code, snippet)));
    }

    let is_json = response
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));

    let body = if is_json {
        match serde_json::from_str::<Value>(&response.body) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Response declared JSON but did not parse, keeping text");
                Value::String(response.body)
            }
        }
    } else {
        Value::String(response.body)
    };

    Ok(serde_json::json!({
        "status_code": response.status_code,
        "body": body,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status_code: u16, content_type: Option<&str>, body: &str) -> HttpResponse {
        HttpResponse {
            status_code,
            content_type: content_type.map(str::to_string),
            body: body.to_string(),
        }
    }

    #[test]
    fn json_body_is_parsed() {
        let value = interpret_response(response(
            200,
            Some("application/json; charset=utf-8"),
            r#"{"ok": true, "items": [1, 2]}"#,
        ))
        .unwrap();
        assert_eq!(value["status_code"], 200);
        assert_eq!(value["body"]["ok"], true);
        assert_eq!(value["body"]["items"][1], 2);
    }

    #[test]
    fn text_body_is_kept_raw() {
        let value = interpret_response(response(200, Some("text/plain"), "hello")).unwrap();
        assert_eq!(value["body"], "hello");
    }

    #[test]
    fn malformed_json_falls_back_to_text() {
        let value =
            interpret_response(response(201, Some("application/json"), "not json")).unwrap();
        assert_eq!(value["body"], "not json");
    }

    #[test]
    fn non_2xx_is_failure() {
        let err = interpret_response(response(404, Some("text/plain"), "missing")).unwrap_err();
        match err {
            TaskgraphError::IntegrationFailure {
                integration,
                message,
            } => {
                assert_eq!(integration, "http");
                assert!(message.contains("404"));
                assert!(message.contains("missing"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn client_builds_from_default_config() {
        assert!(ReqwestHttpClient::new(&HttpConfig::default()).is_ok());
    }
}
