//! Shared HTTP session handling for network backends and services.
//!
//! [`HttpSession`] holds the configuration needed to build a
//! `reqwest::Client` and the client itself once connected. One session is
//! shared by every in-flight request of a connection; `reqwest::Client` is
//! internally reference counted and safe for concurrent use.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::RequestBuilder;
use serde_json::Value;

use vectors_connector_core::ConnectorError;

/// Lazily connected `reqwest` client with default headers.
#[derive(Debug)]
pub struct HttpSession {
    name: &'static str,
    timeout: Duration,
    headers: HeaderMap,
    client: Option<reqwest::Client>,
}

impl HttpSession {
    pub fn new(name: &'static str, timeout_secs: u64) -> Self {
        Self {
            name,
            timeout: Duration::from_secs(timeout_secs),
            headers: HeaderMap::new(),
            client: None,
        }
    }

    /// Add a header sent with every request (credentials, API versions).
    pub fn with_header(mut self, key: &'static str, value: &str) -> Result<Self, ConnectorError> {
        let mut value = HeaderValue::from_str(value).map_err(|_| {
            ConnectorError::Configuration(format!("invalid value for header {}", key))
        })?;
        value.set_sensitive(true);
        self.headers.insert(HeaderName::from_static(key), value);
        Ok(self)
    }

    pub fn connect(&mut self) -> Result<(), ConnectorError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(self.headers.clone())
            .build()
            .map_err(|e| {
                ConnectorError::Connection(format!("failed to build {} client: {}", self.name, e))
            })?;
        self.client = Some(client);
        tracing::debug!(service = self.name, "Connected");
        Ok(())
    }

    /// Drop the client. Returns whether a client was held.
    pub fn disconnect(&mut self) -> bool {
        let was_connected = self.client.take().is_some();
        if was_connected {
            tracing::debug!(service = self.name, "Disconnected");
        }
        was_connected
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Result<&reqwest::Client, ConnectorError> {
        self.client
            .as_ref()
            .ok_or_else(|| ConnectorError::not_connected(self.name))
    }
}

/// A failed HTTP exchange, before it is mapped onto a [`ConnectorError`]
/// kind by the caller.
#[derive(Debug)]
pub struct HttpFailure {
    pub status: Option<u16>,
    pub message: String,
    /// The request never produced a response (DNS, connect, timeout).
    pub transport: bool,
}

impl HttpFailure {
    /// 429, 5xx and transport errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.transport || matches!(self.status, Some(429) | Some(500..=599))
    }

    pub fn into_fetch(self) -> ConnectorError {
        ConnectorError::fetch(self.status, self.message)
    }

    pub fn into_storage(self) -> ConnectorError {
        ConnectorError::Storage(self.describe())
    }

    pub fn into_ai_service(self, service: &str) -> ConnectorError {
        ConnectorError::AiService(format!("{}: {}", service, self.describe()))
    }

    fn describe(&self) -> String {
        match self.status {
            Some(status) => format!("HTTP {}: {}", status, self.message),
            None => self.message.clone(),
        }
    }
}

impl From<reqwest::Error> for HttpFailure {
    fn from(e: reqwest::Error) -> Self {
        Self {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
            transport: e.is_connect() || e.is_timeout() || e.is_request(),
        }
    }
}

/// Send a request and decode a JSON body.
///
/// Non-success statuses become an [`HttpFailure`] carrying the response
/// body. An empty success body decodes to `Value::Null`.
pub async fn send_json(request: RequestBuilder) -> Result<Value, HttpFailure> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HttpFailure {
            status: Some(status.as_u16()),
            message: body,
            transport: false,
        });
    }
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| HttpFailure {
        status: None,
        message: format!("invalid JSON response: {}", e),
        transport: false,
    })
}

/// Send a request and only report whether it succeeded.
pub async fn probe(request: RequestBuilder) -> bool {
    match request.send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            tracing::debug!("Health probe failed: {}", e);
            false
        }
    }
}

/// Strip trailing slashes so paths can be appended with `format!`.
pub fn base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Read a JSON array of numbers as an `f32` vector.
pub fn parse_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_requires_connect() {
        let mut session = HttpSession::new("test service", 5);
        let err = session.client().unwrap_err();
        assert_eq!(
            err.to_string(),
            "connection error: test service is not connected"
        );

        session.connect().unwrap();
        assert!(session.client().is_ok());
        assert!(session.disconnect());
        assert!(!session.disconnect());
    }

    #[test]
    fn test_invalid_header_is_configuration_error() {
        let err = HttpSession::new("x", 5)
            .with_header("api-key", "bad\nvalue")
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_retryable_statuses() {
        let failure = |status, transport| HttpFailure {
            status,
            message: String::new(),
            transport,
        };
        assert!(failure(Some(429), false).is_retryable());
        assert!(failure(Some(503), false).is_retryable());
        assert!(failure(None, true).is_retryable());
        assert!(!failure(Some(400), false).is_retryable());
        assert!(!failure(None, false).is_retryable());
    }

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector(&json!([0.5, 1, -2.0])), Some(vec![0.5, 1.0, -2.0]));
        assert_eq!(parse_vector(&json!([0.5, "x"])), None);
        assert_eq!(parse_vector(&json!({"a": 1})), None);
    }

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("http://localhost:6333/"), "http://localhost:6333");
    }
}
