//! Scripted network for tests.

use async_trait::async_trait;
use reqwest::Method;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{Network, Request, Response, ResponseType};
use crate::error::FetchError;

/// Replies from a fixed route table and records every request it sees.
#[derive(Default)]
pub struct MockNetwork {
  routes: Mutex<HashMap<(Method, String), Response>>,
  calls: Mutex<Vec<(Method, String)>>,
  offline: AtomicBool,
}

impl MockNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  /// Route a GET to a same-origin response.
  pub fn serve(&self, url: &str, status: u16, body: &str) {
    self.route(Method::GET, url, response(status, body, ResponseType::Basic));
  }

  pub fn route(&self, method: Method, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert((method, url.to_string()), response);
  }

  /// Every fetch fails while offline.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn calls_to(&self, url: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|(_, u)| u == url)
      .count()
  }
}

#[async_trait]
impl Network for MockNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    // Fragments stay on the client, as with reqwest
    let mut target = request.url.clone();
    target.set_fragment(None);
    let url = target.to_string();
    self
      .calls
      .lock()
      .unwrap()
      .push((request.method.clone(), url.clone()));

    if self.offline.load(Ordering::SeqCst) {
      return Err(FetchError::Network {
        url,
        reason: "network unreachable".to_string(),
      });
    }

    let routes = self.routes.lock().unwrap();
    match routes.get(&(request.method.clone(), url)) {
      Some(response) => Ok(response.clone()),
      None => Ok(response(404, "Not Found", ResponseType::Basic)),
    }
  }
}

pub fn response(status: u16, body: &str, kind: ResponseType) -> Response {
  let mut headers = BTreeMap::new();
  headers.insert("content-type".to_string(), "text/html".to_string());
  Response {
    status,
    status_text: String::new(),
    headers,
    body: body.as_bytes().to_vec(),
    kind,
  }
}
