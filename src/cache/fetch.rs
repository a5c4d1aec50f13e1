//! Network fetching behind the cache worker.

use std::future::Future;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;

use super::store::CachedResponse;

/// Trait for the worker's network edge. Implementations suspend only the
/// fetch event they are serving; the worker may run many fetches at once.
pub trait Fetch: Send + Sync + 'static {
  fn fetch(
    &self,
    method: Method,
    url: &str,
  ) -> impl Future<Output = Result<CachedResponse>> + Send;
}

/// reqwest-backed fetcher.
pub struct HttpFetch {
  client: reqwest::Client,
}

impl HttpFetch {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;
    Ok(Self { client })
  }
}

impl Fetch for HttpFetch {
  fn fetch(
    &self,
    method: Method,
    url: &str,
  ) -> impl Future<Output = Result<CachedResponse>> + Send {
    let request = self.client.request(method, url);
    let url = url.to_string();
    async move {
      let response = request
        .send()
        .await
        .map_err(|e| eyre!("Fetch failed for {}: {}", url, e))?;

      let status = response.status().as_u16();
      let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
      let body = response
        .bytes()
        .await
        .map_err(|e| eyre!("Failed to read body for {}: {}", url, e))?
        .to_vec();

      Ok(CachedResponse {
        url,
        status,
        content_type,
        body,
      })
    }
  }
}
