use duoquery_core::BackendError;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub(crate) fn build_client(timeout_secs: Option<u64>) -> Result<Client, BackendError> {
    let mut builder = Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder
        .build()
        .map_err(|e| BackendError::Connect(format!("failed to build http client: {e}")))
}

/// Parse `address` as a base URL whose path ends in `/`, so relative
/// endpoints are appended rather than replacing the last segment.
pub(crate) fn base_url(address: &str) -> Result<Url, BackendError> {
    let mut url = Url::parse(address)
        .map_err(|e| BackendError::Connect(format!("invalid address `{address}`: {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, BackendError> {
    base.join(path)
        .map_err(|e| BackendError::Request(format!("invalid endpoint `{path}`: {e}")))
}

/// Send a prepared request and decode a successful JSON body.
pub(crate) fn send_json(request: RequestBuilder, url: &Url) -> Result<Value, BackendError> {
    let resp = request.send().map_err(|e| {
        if e.is_connect() {
            BackendError::Connect(format!("failed to reach {url}: {e}"))
        } else {
            BackendError::Request(format!("request to {url} failed: {e}"))
        }
    })?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().unwrap_or_default();
        return Err(BackendError::Request(format!("http error {status}: {text}")));
    }
    resp.json()
        .map_err(|e| BackendError::Response(format!("{url} returned invalid JSON: {e}")))
}
