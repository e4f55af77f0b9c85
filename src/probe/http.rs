//! HTTP probe implementation.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Client, Method};

use super::ProbeError;
use crate::db::Endpoint;

/// What came back from a completed HTTP exchange.
#[derive(Debug, Clone, Copy)]
pub struct HttpResponse {
    pub status: u16,
    /// Time from sending the request to reading the last body byte.
    pub elapsed: Duration,
}

/// Build the HTTP client shared by all probes.
///
/// Redirects are not followed so the observed status is the one the
/// endpoint itself answered with.
pub fn build_client(timeout: Duration) -> Result<Client, ProbeError> {
    Client::builder()
        .timeout(timeout)
        .redirect(redirect::Policy::none())
        .user_agent(concat!("statusboard/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProbeError::Config(e.to_string()))
}

/// Run an HTTP probe against the given endpoint.
///
/// The whole exchange, including the body, is bounded by `timeout`.
pub async fn run_http_probe(
    client: &Client,
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<HttpResponse, ProbeError> {
    let url = if endpoint.url.starts_with("http://") || endpoint.url.starts_with("https://") {
        endpoint.url.clone()
    } else {
        format!("http://{}", endpoint.url)
    };

    let method = parse_method(&endpoint.method)?;
    let headers = parse_headers(endpoint.headers.as_deref())?;

    let mut request = client.request(method, &url).headers(headers).timeout(timeout);
    if let Some(body) = endpoint.body.as_ref().filter(|b| !b.is_empty()) {
        request = request.body(body.clone());
    }

    let start = Instant::now();

    let exchange = async {
        let response = request.send().await?;
        let status = response.status().as_u16();
        // Read the full body to measure complete transfer time
        response.bytes().await?;
        Ok::<_, reqwest::Error>(status)
    };

    let status = match tokio::time::timeout(timeout, exchange).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) if e.is_timeout() => return Err(ProbeError::Timeout(timeout)),
        Ok(Err(e)) if e.is_connect() => return Err(ProbeError::Connect(e.to_string())),
        Ok(Err(e)) => return Err(ProbeError::Network(e.to_string())),
        Err(_) => return Err(ProbeError::Timeout(timeout)),
    };

    Ok(HttpResponse {
        status,
        elapsed: start.elapsed(),
    })
}

fn parse_method(method: &str) -> Result<Method, ProbeError> {
    let upper = method.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Ok(Method::GET);
    }
    Method::from_bytes(upper.as_bytes())
        .map_err(|_| ProbeError::Config(format!("invalid HTTP method {:?}", method)))
}

/// Decode the registry's header blob, a JSON object of header names to values.
fn parse_headers(raw: Option<&str>) -> Result<HeaderMap, ProbeError> {
    let mut headers = HeaderMap::new();
    let raw = match raw.map(str::trim) {
        Some(s) if !s.is_empty() && s != "null" => s,
        _ => return Ok(headers),
    };

    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| ProbeError::Config(format!("headers are not a JSON object: {}", e)))?;

    for (name, value) in map {
        let value = match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ProbeError::Config(format!("invalid header name {:?}", name)))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|_| ProbeError::Config(format!("invalid value for header {}", name)))?;
        headers.insert(name, value);
    }

    Ok(headers)
}
