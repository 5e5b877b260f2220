// src/ingest/http.rs
//! Shared HTTP client and GET helpers that classify failures by kind.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::IngestError;

const USER_AGENT: &str = concat!("hazard-ingest/", env!("CARGO_PKG_VERSION"));

/// One client for every outbound call; `timeout_secs` bounds each request end to end.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, IngestError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| IngestError::config(format!("building http client: {e}")))
}

pub(crate) fn transport_error(url: &str, e: reqwest::Error) -> IngestError {
    if e.is_timeout() {
        IngestError::transport(url, format!("timed out ({e})"))
    } else {
        IngestError::transport(url, e)
    }
}

/// Send a prepared request and return the response only if its status is a success.
pub(crate) async fn send_checked(
    url: &str,
    req: reqwest::RequestBuilder,
) -> Result<reqwest::Response, IngestError> {
    let resp = req.send().await.map_err(|e| transport_error(url, e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(IngestError::status(url, status));
    }
    Ok(resp)
}

/// GET a page body as text.
pub async fn get_text(client: &reqwest::Client, url: &str) -> Result<String, IngestError> {
    let resp = send_checked(url, client.get(url)).await?;
    resp.text().await.map_err(|e| transport_error(url, e))
}

/// GET and decode a JSON body into `T`.
pub async fn get_json<T, Q>(
    client: &reqwest::Client,
    url: &str,
    query: &Q,
) -> Result<T, IngestError>
where
    T: DeserializeOwned,
    Q: serde::Serialize + ?Sized,
{
    let resp = send_checked(url, client.get(url).query(query)).await?;
    let body = resp.text().await.map_err(|e| transport_error(url, e))?;
    serde_json::from_str(&body).map_err(|e| IngestError::malformed(format!("json from {url}"), e))
}

/// Join an API base and a path without doubling slashes.
pub fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
