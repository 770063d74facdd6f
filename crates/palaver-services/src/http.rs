//! Shared plumbing for the HTTP backed services

use chrono::{DateTime, Utc};
use palaver_core::services::HttpTrace;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;
use url::{Position, Url};

use crate::ServiceError;

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";

pub(crate) fn build_client(timeout: Duration, user_agent: &str) -> Result<Client, ServiceError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(|e| ServiceError::Client(format!("Failed to create HTTP client: {}", e)))
}

/// One request and whatever came back
#[derive(Debug, Clone)]
pub(crate) struct Exchange {
    pub method: String,
    pub url: String,
    pub request: String,
    pub status_code: Option<u16>,
    pub response: String,
    pub connection_error: Option<String>,
    pub elapsed_ms: u64,
    pub created_on: DateTime<Utc>,
}

impl Exchange {
    pub fn is_success(&self) -> bool {
        matches!(self.status_code, Some(code) if (200..300).contains(&code))
    }

    pub fn trace(&self) -> HttpTrace {
        HttpTrace {
            url: self.url.clone(),
            method: self.method.clone(),
            status_code: self.status_code,
            request: self.request.clone(),
            response: self.response.clone(),
            elapsed_ms: self.elapsed_ms,
            created_on: self.created_on,
        }
    }

    /// The response status as an error, if it isn't a success
    pub fn check(&self) -> Result<(), ServiceError> {
        if let Some(reason) = &self.connection_error {
            return Err(ServiceError::Connection(reason.clone()));
        }
        match self.status_code {
            Some(_) if self.is_success() => Ok(()),
            Some(status) => Err(ServiceError::Status {
                status,
                body: self.response.clone(),
            }),
            None => Err(ServiceError::Connection("no response".to_string())),
        }
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ServiceError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| ServiceError::InvalidRequest(format!("Invalid header name: {}", key)))?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            ServiceError::InvalidRequest(format!("Invalid value for header {}", key))
        })?;
        map.append(name, value);
    }
    Ok(map)
}

/// Send a request, recording it and its response
///
/// Connection failures are reported in the returned exchange. Headers that
/// can't be sent are an [`ServiceError::InvalidRequest`] and nothing is sent.
/// The method must already be validated.
pub(crate) async fn send(
    client: &Client,
    method: Method,
    url: &Url,
    headers: &BTreeMap<String, String>,
    body: Option<&str>,
    max_body_bytes: usize,
    user_agent: &str,
) -> Result<Exchange, ServiceError> {
    let mut headers = headers.clone();
    if body.is_some() && !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
        headers.insert("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string());
    }

    let mut builder = client
        .request(method.clone(), url.clone())
        .headers(header_map(&headers)?);
    if let Some(body) = body {
        builder = builder.body(body.to_string());
    }

    let request = dump_request(method.as_str(), url, user_agent, &headers, body);
    let created_on = Utc::now();
    let started = Instant::now();

    debug!(method = method.as_str(), url = url.as_str(), "Sending request");

    let (status_code, response, connection_error) = match builder.send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            match resp.text().await {
                Ok(text) => (Some(status), truncate_body(text, max_body_bytes), None),
                Err(e) => (Some(status), String::new(), Some(e.to_string())),
            }
        }
        Err(e) => (None, String::new(), Some(e.to_string())),
    };

    Ok(Exchange {
        method: method.as_str().to_string(),
        url: url.to_string(),
        request,
        status_code,
        response,
        connection_error,
        elapsed_ms: started.elapsed().as_millis() as u64,
        created_on,
    })
}

/// The request as it would appear on the wire
pub(crate) fn dump_request(
    method: &str,
    url: &Url,
    user_agent: &str,
    headers: &BTreeMap<String, String>,
    body: Option<&str>,
) -> String {
    let mut raw = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\n",
        method,
        &url[Position::BeforePath..Position::AfterQuery],
        &url[Position::BeforeHost..Position::AfterPort],
        user_agent
    );
    for (key, value) in headers {
        raw.push_str(&format!("{}: {}\r\n", key, value));
    }
    raw.push_str("\r\n");
    if let Some(body) = body {
        raw.push_str(body);
    }
    raw
}

/// Cut `body` down to at most `max` bytes without splitting a character
pub(crate) fn truncate_body(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
