use reqwest::Method;
use std::collections::BTreeMap;
use url::Url;

/// How the page environment issued a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RequestMode {
  /// Full page load
  Navigate,
  SameOrigin,
  NoCors,
  Cors,
}

/// What the requested resource will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Destination {
  Document,
  Image,
  Script,
  Style,
  Font,
  Other,
}

/// An outgoing request from the page environment.
#[derive(Debug, Clone)]
pub struct Request {
  pub url: Url,
  pub method: Method,
  pub mode: RequestMode,
  pub destination: Destination,
  pub headers: BTreeMap<String, String>,
  pub body: Option<Vec<u8>>,
}

const EXTENSION_SCHEMES: &[&str] = &["chrome-extension", "moz-extension", "safari-web-extension"];

impl Request {
  /// A subresource GET.
  pub fn get(url: Url) -> Self {
    Self {
      url,
      method: Method::GET,
      mode: RequestMode::NoCors,
      destination: Destination::Other,
      headers: BTreeMap::new(),
      body: None,
    }
  }

  /// A page load.
  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      destination: Destination::Document,
      ..Self::get(url)
    }
  }

  /// A POST carrying a JSON document.
  pub fn post_json(url: Url, body: Vec<u8>) -> Self {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());

    Self {
      url,
      method: Method::POST,
      mode: RequestMode::SameOrigin,
      destination: Destination::Other,
      headers,
      body: Some(body),
    }
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  /// Requests issued by browser extensions are never intercepted.
  pub fn is_extension(&self) -> bool {
    EXTENSION_SCHEMES.contains(&self.url.scheme())
  }
}

/// Fetch response type, as the platform classifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  /// Same-origin network response
  Basic,
  /// Cross-origin network response
  Cors,
  /// Built locally, never came from the network
  Default,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Default => "default",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "basic" => Some(Self::Basic),
      "cors" => Some(Self::Cors),
      "default" => Some(Self::Default),
      _ => None,
    }
  }
}

/// A captured response. Cloning it is how a response is both cached and returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  /// Header names are lowercase
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
  pub kind: ResponseType,
}

const PLACEHOLDER_SVG: &str = concat!(
  r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="150" viewBox="0 0 200 150">"##,
  r##"<rect width="200" height="150" fill="#f0f0f0"/>"##,
  r##"<text x="50%" y="50%" text-anchor="middle" dy=".3em" fill="#999">Image unavailable</text>"##,
  r##"</svg>"##
);

impl Response {
  /// A locally built response.
  pub fn synthetic(status: u16, status_text: &str, content_type: &str, body: &[u8]) -> Self {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), content_type.to_string());

    Self {
      status,
      status_text: status_text.to_string(),
      headers,
      body: body.to_vec(),
      kind: ResponseType::Default,
    }
  }

  /// Stand-in for an image that could not be fetched.
  pub fn placeholder_image() -> Self {
    Self::synthetic(200, "OK", "image/svg+xml", PLACEHOLDER_SVG.as_bytes())
  }

  /// Generic reply for a resource that is neither cached nor reachable.
  pub fn service_unavailable() -> Self {
    Self::synthetic(503, "Service Unavailable", "text/plain", b"Offline")
  }

  /// 2xx status.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Whether a network response may be written into the cache.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.kind == ResponseType::Basic
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
  }
}
