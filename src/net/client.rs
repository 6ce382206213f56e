use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use url::Url;

use super::types::{Request, Response, ResponseType};
use crate::config::Config;
use crate::error::FetchError;

/// Anything that can turn a request into a response.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// HTTP network backed by reqwest.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Url,
}

impl HttpNetwork {
  pub fn new(config: &Config) -> Result<Self> {
    let origin = config.origin_url()?;

    let client = reqwest::Client::builder()
      .user_agent(concat!("folio-cache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }

  /// Classify a response the way the platform does for the page's origin.
  fn response_type(&self, final_url: &Url) -> ResponseType {
    if final_url.origin() == self.origin.origin() {
      ResponseType::Basic
    } else {
      ResponseType::Cors
    }
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    if !matches!(request.url.scheme(), "http" | "https") {
      return Err(FetchError::UnsupportedScheme(request.url.to_string()));
    }

    let failed = |e: reqwest::Error| FetchError::Network {
      url: request.url.to_string(),
      reason: e.to_string(),
    };

    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await.map_err(failed)?;

    let status = response.status();
    let kind = self.response_type(response.url());
    let headers: BTreeMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response.bytes().await.map_err(failed)?.to_vec();

    tracing::debug!(
      url = %request.url,
      status = status.as_u16(),
      bytes = body.len(),
      "Network response"
    );

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body,
      kind,
    })
  }
}
