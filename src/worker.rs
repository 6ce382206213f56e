//! Event dispatcher tying the caching components together.
//!
//! The page environment hands the worker one [`Event`] at a time. Each event is
//! handled to completion, every asynchronous step awaited, and the result is an
//! [`Outcome`] describing what the page should see or do next.

use color_eyre::Result;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::{
  ActivateOutcome, CacheStorage, InstallOutcome, Interception, LifecycleController,
  RequestInterceptor, Resolved,
};
use crate::config::{Config, NotificationConfig};
use crate::error::{InstallError, WorkerError};
use crate::net::{Network, Request};
use crate::notify::{route_click, ClickEffect, Notification, NotificationAction, Notifier};
use crate::queue::SubmissionQueue;
use crate::sync::{SyncAgent, SyncReport, SyncTrigger};
use crate::version::{UpdateCheck, VersionChecker};

/// Control messages posted by the page environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
  /// Activate an installed generation right away
  SkipWaiting,
  /// Refresh the active generation from the manifest
  CacheUpdate,
}

#[derive(Debug)]
pub enum Event {
  Install,
  Activate,
  Fetch(Request),
  Sync {
    tag: String,
  },
  PeriodicSync {
    tag: String,
  },
  Push {
    text: Option<String>,
  },
  NotificationClick {
    action: Option<NotificationAction>,
    data_url: Option<String>,
  },
  NotificationClose,
  Message(ControlMessage),
  /// A form submission made while offline
  Submit {
    payload: Value,
  },
}

#[derive(Debug)]
pub enum Outcome {
  Installed(InstallOutcome),
  Activated(ActivateOutcome),
  Respond(Resolved),
  /// Let the request go to the network untouched
  Passthrough,
  Synced(SyncReport),
  VersionChecked(Option<UpdateCheck>),
  CacheUpdated(usize),
  Notified,
  Click(ClickEffect),
  Queued(i64),
  SkipWaitingSet,
  /// The event does not apply in the current phase or names an unknown tag
  Ignored,
}

/// Where the worker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// Current generation not installed yet
  Parsed,
  /// Installed, waiting to activate
  Installed,
  Activated,
  /// Install failed; the previous generation keeps serving
  Redundant,
}

/// Explicit context for every handler, built once at startup.
pub struct Worker<S: CacheStorage> {
  lifecycle: LifecycleController<S>,
  interceptor: RequestInterceptor<S>,
  sync: SyncAgent,
  versions: VersionChecker<S>,
  queue: Arc<SubmissionQueue>,
  notifier: Arc<dyn Notifier>,
  notifications: NotificationConfig,
  sync_tag: String,
  update_tag: String,
  phase: Phase,
  skip_waiting: bool,
}

impl<S: CacheStorage> Worker<S> {
  pub fn new(
    config: &Config,
    storage: Arc<S>,
    queue: Arc<SubmissionQueue>,
    network: Arc<dyn Network>,
    notifier: Arc<dyn Notifier>,
  ) -> Result<Self> {
    let manifest = config
      .manifest
      .iter()
      .map(|entry| {
        config.resolve(entry).map_err(|e| InstallError::InvalidEntry {
          entry: entry.clone(),
          reason: format!("{:#}", e),
        })
      })
      .collect::<Result<Vec<_>, _>>()?;

    let version = config.cache_version.clone();
    let phase = initial_phase(storage.as_ref(), &version)?;
    tracing::debug!(%version, ?phase, "Worker ready");

    Ok(Self {
      lifecycle: LifecycleController::new(storage.clone(), network.clone(), version, manifest),
      interceptor: RequestInterceptor::new(storage.clone(), network.clone(), config.offline_url()?),
      sync: SyncAgent::new(
        queue.clone(),
        network.clone(),
        notifier.clone(),
        config.submission_url()?,
        config.notifications.clone(),
      ),
      versions: VersionChecker::new(storage, network, config.version_url()?),
      queue,
      notifier,
      notifications: config.notifications.clone(),
      sync_tag: config.sync.tag.clone(),
      update_tag: config.sync.update_tag.clone(),
      phase,
      skip_waiting: false,
    })
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn version(&self) -> &str {
    self.lifecycle.version()
  }

  /// Whether an installed generation should activate without waiting.
  pub fn skip_waiting(&self) -> bool {
    self.skip_waiting
  }

  /// Handle one event to completion.
  pub async fn handle(&mut self, event: Event) -> Result<Outcome, WorkerError> {
    match event {
      Event::Install => self.on_install().await,
      Event::Activate => Ok(self.on_activate()),
      Event::Fetch(request) => Ok(match self.interceptor.intercept(&request).await {
        Interception::Respond(resolved) => Outcome::Respond(resolved),
        Interception::Passthrough => Outcome::Passthrough,
      }),
      Event::Sync { tag } if tag == self.sync_tag => Ok(Outcome::Synced(
        self.sync.sync(SyncTrigger::Reconnected).await,
      )),
      Event::PeriodicSync { tag } if tag == self.sync_tag => {
        Ok(Outcome::Synced(self.sync.sync(SyncTrigger::Periodic).await))
      }
      Event::PeriodicSync { tag } if tag == self.update_tag => {
        Ok(Outcome::VersionChecked(self.versions.check().await))
      }
      Event::Sync { tag } | Event::PeriodicSync { tag } => {
        tracing::debug!(%tag, "Ignoring unknown sync tag");
        Ok(Outcome::Ignored)
      }
      Event::Push { text } => {
        let notification = Notification::push(&self.notifications, text.as_deref());
        self.present(&notification).await;
        Ok(Outcome::Notified)
      }
      Event::NotificationClick { action, data_url } => {
        let effect = route_click(action, data_url.as_deref());
        tracing::debug!(?action, ?effect, "Notification clicked");
        Ok(Outcome::Click(effect))
      }
      Event::NotificationClose => {
        tracing::debug!("Notification closed");
        Ok(Outcome::Ignored)
      }
      Event::Message(ControlMessage::SkipWaiting) => {
        self.skip_waiting = true;
        if self.phase == Phase::Installed {
          Ok(self.on_activate())
        } else {
          Ok(Outcome::SkipWaitingSet)
        }
      }
      Event::Message(ControlMessage::CacheUpdate) => {
        let count = self.lifecycle.update().await?;
        tracing::info!(entries = count, "Cache updated");
        Ok(Outcome::CacheUpdated(count))
      }
      Event::Submit { payload } => Ok(Outcome::Queued(self.queue.enqueue(&payload)?)),
    }
  }

  async fn on_install(&mut self) -> Result<Outcome, WorkerError> {
    match self.lifecycle.install().await {
      Ok(outcome) => {
        self.phase = Phase::Installed;
        self.skip_waiting |= outcome.skip_waiting;
        Ok(Outcome::Installed(outcome))
      }
      Err(e) => {
        tracing::error!(error = %e, "Install failed, previous generation keeps serving");
        self.phase = Phase::Redundant;
        Err(e.into())
      }
    }
  }

  fn on_activate(&mut self) -> Outcome {
    if self.phase != Phase::Installed {
      tracing::debug!(phase = ?self.phase, "Nothing to activate");
      return Outcome::Ignored;
    }

    let outcome = self.lifecycle.activate();
    self.phase = Phase::Activated;
    Outcome::Activated(outcome)
  }

  async fn present(&self, notification: &Notification) {
    if let Err(e) = self.notifier.show(notification).await {
      tracing::warn!(error = %e, "Failed to show notification");
    }
  }
}

fn initial_phase<S: CacheStorage>(storage: &S, version: &str) -> Result<Phase> {
  if storage.active_generation()?.as_deref() == Some(version) {
    return Ok(Phase::Activated);
  }
  if storage.is_ready(version)? {
    return Ok(Phase::Installed);
  }
  Ok(Phase::Parsed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheKey, ResponseSource, SqliteStorage};
  use crate::net::mock::MockNetwork;
  use crate::notify::testing::RecordingNotifier;
  use reqwest::Method;
  use serde_json::json;
  use url::Url;

  const ORIGIN: &str = "https://example.dev";

  struct Fixture {
    config: Config,
    storage: Arc<SqliteStorage>,
    queue: Arc<SubmissionQueue>,
    network: Arc<MockNetwork>,
    notifier: Arc<RecordingNotifier>,
  }

  impl Fixture {
    fn new() -> Self {
      let config = Config {
        origin: ORIGIN.to_string(),
        manifest: vec!["/".to_string(), "/offline.html".to_string()],
        ..Config::default()
      };
      let network = Arc::new(MockNetwork::new());
      network.serve(&url("/"), 200, "home");
      network.serve(&url("/offline.html"), 200, "offline");

      Self {
        config,
        storage: Arc::new(SqliteStorage::open_in_memory().unwrap()),
        queue: Arc::new(SubmissionQueue::open_in_memory().unwrap()),
        network,
        notifier: Arc::new(RecordingNotifier::default()),
      }
    }

    fn worker(&self) -> Worker<SqliteStorage> {
      Worker::new(
        &self.config,
        self.storage.clone(),
        self.queue.clone(),
        self.network.clone(),
        self.notifier.clone(),
      )
      .unwrap()
    }
  }

  fn url(path: &str) -> String {
    format!("{}{}", ORIGIN, path)
  }

  async fn installed_and_active(f: &Fixture) -> Worker<SqliteStorage> {
    let mut worker = f.worker();
    assert!(matches!(
      worker.handle(Event::Install).await.unwrap(),
      Outcome::Installed(_)
    ));
    assert!(matches!(
      worker.handle(Event::Activate).await.unwrap(),
      Outcome::Activated(_)
    ));
    worker
  }

  #[tokio::test]
  async fn test_install_then_activate() {
    let f = Fixture::new();
    let mut worker = f.worker();
    assert_eq!(worker.phase(), Phase::Parsed);

    // Activation before install has nothing to activate
    assert!(matches!(
      worker.handle(Event::Activate).await.unwrap(),
      Outcome::Ignored
    ));

    match worker.handle(Event::Install).await.unwrap() {
      Outcome::Installed(outcome) => {
        assert_eq!(outcome.entries, 2);
        assert!(outcome.skip_waiting);
      }
      other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(worker.phase(), Phase::Installed);
    assert!(worker.skip_waiting());

    worker.handle(Event::Activate).await.unwrap();
    assert_eq!(worker.phase(), Phase::Activated);
    assert_eq!(
      f.storage.active_generation().unwrap().as_deref(),
      Some(worker.version())
    );
  }

  #[test]
  fn test_unparseable_manifest_entry_is_rejected() {
    let f = Fixture::new();
    let config = Config {
      manifest: vec!["http://[broken".to_string()],
      ..f.config.clone()
    };
    let result = Worker::new(
      &config,
      f.storage.clone(),
      f.queue.clone(),
      f.network.clone(),
      f.notifier.clone(),
    );
    let err = result.err().unwrap();
    assert!(matches!(
      err.downcast_ref::<InstallError>(),
      Some(InstallError::InvalidEntry { .. })
    ));
  }

  #[tokio::test]
  async fn test_failed_install_is_redundant_and_cannot_activate() {
    let f = Fixture::new();
    f.network.set_offline(true);
    let mut worker = f.worker();

    let err = worker.handle(Event::Install).await.unwrap_err();
    assert!(matches!(
      err,
      WorkerError::Install(InstallError::Unreachable { .. })
    ));
    assert_eq!(worker.phase(), Phase::Redundant);
    assert!(matches!(
      worker.handle(Event::Activate).await.unwrap(),
      Outcome::Ignored
    ));
    assert!(f.storage.active_generation().unwrap().is_none());
  }

  #[tokio::test]
  async fn test_skip_waiting_message_activates_installed_worker() {
    let f = Fixture::new();
    let mut worker = f.worker();
    worker.handle(Event::Install).await.unwrap();

    let outcome = worker
      .handle(Event::Message(ControlMessage::SkipWaiting))
      .await
      .unwrap();
    assert!(matches!(outcome, Outcome::Activated(_)));
    assert_eq!(worker.phase(), Phase::Activated);
  }

  #[tokio::test]
  async fn test_phase_restored_from_storage() {
    let f = Fixture::new();
    installed_and_active(&f).await;
    assert_eq!(f.worker().phase(), Phase::Activated);

    let next = Config {
      cache_version: "adem-portfolio-v1.1.0".to_string(),
      ..f.config.clone()
    };
    let mut upgraded = Worker::new(
      &next,
      f.storage.clone(),
      f.queue.clone(),
      f.network.clone(),
      f.notifier.clone(),
    )
    .unwrap();
    assert_eq!(upgraded.phase(), Phase::Parsed);

    upgraded.handle(Event::Install).await.unwrap();
    upgraded.handle(Event::Activate).await.unwrap();
    assert_eq!(
      f.storage.generations().unwrap(),
      vec!["adem-portfolio-v1.1.0".to_string()]
    );
  }

  #[tokio::test]
  async fn test_offline_navigation_serves_offline_page() {
    let f = Fixture::new();
    let mut worker = installed_and_active(&f).await;
    f.network.set_offline(true);

    let request = Request::navigate(Url::parse(&url("/projects")).unwrap());
    match worker.handle(Event::Fetch(request)).await.unwrap() {
      Outcome::Respond(resolved) => {
        assert_eq!(resolved.source, ResponseSource::OfflinePage);
        assert_eq!(resolved.response.body, b"offline");
      }
      other => panic!("unexpected outcome {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_post_passes_through() {
    let f = Fixture::new();
    let mut worker = installed_and_active(&f).await;
    let request = Request::post_json(Url::parse(&url("/contact")).unwrap(), b"{}".to_vec());
    assert!(matches!(
      worker.handle(Event::Fetch(request)).await.unwrap(),
      Outcome::Passthrough
    ));
  }

  #[tokio::test]
  async fn test_submit_then_sync() {
    let f = Fixture::new();
    let mut worker = f.worker();
    f.network.route(
      Method::POST,
      &url("/contact"),
      crate::net::mock::response(200, "{}", crate::net::ResponseType::Basic),
    );

    let outcome = worker
      .handle(Event::Submit {
        payload: json!({"name": "A", "email": "a@example.dev", "message": "hi"}),
      })
      .await
      .unwrap();
    assert!(matches!(outcome, Outcome::Queued(_)));
    assert_eq!(f.queue.len().unwrap(), 1);

    let outcome = worker
      .handle(Event::Sync {
        tag: "contact-form".to_string(),
      })
      .await
      .unwrap();
    match outcome {
      Outcome::Synced(report) => assert_eq!(report.delivered.len(), 1),
      other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(f.queue.len().unwrap(), 0);
    assert_eq!(f.notifier.shown().len(), 1);
  }

  #[tokio::test]
  async fn test_submit_surfaces_persist_failure() {
    let f = Fixture::new();
    let mut worker = f.worker();
    f.queue.execute_batch("DROP TABLE submissions").unwrap();

    let err = worker
      .handle(Event::Submit {
        payload: json!({"name": "A"}),
      })
      .await
      .unwrap_err();
    assert!(matches!(err, WorkerError::QueuePersist(_)));
  }

  #[tokio::test]
  async fn test_unknown_sync_tag_is_ignored() {
    let f = Fixture::new();
    let mut worker = f.worker();
    f.queue.enqueue(&json!({"name": "A"})).unwrap();

    let outcome = worker
      .handle(Event::Sync {
        tag: "notification-close".to_string(),
      })
      .await
      .unwrap();
    assert!(matches!(outcome, Outcome::Ignored));
    assert_eq!(f.network.call_count(), 0);
  }

  #[tokio::test]
  async fn test_periodic_update_tag_checks_version() {
    let f = Fixture::new();
    let mut worker = f.worker();
    f.network.serve(&url("/api/version"), 200, r#"{"version":"1.0.0"}"#);

    let outcome = worker
      .handle(Event::PeriodicSync {
        tag: "portfolio-update".to_string(),
      })
      .await
      .unwrap();
    assert!(matches!(outcome, Outcome::VersionChecked(Some(_))));
  }

  #[tokio::test]
  async fn test_cache_update_message_refreshes_entries() {
    let f = Fixture::new();
    let mut worker = installed_and_active(&f).await;
    f.network.serve(&url("/"), 200, "new home");

    let outcome = worker
      .handle(Event::Message(ControlMessage::CacheUpdate))
      .await
      .unwrap();
    assert!(matches!(outcome, Outcome::CacheUpdated(2)));

    let key = CacheKey::get(&Url::parse(&url("/")).unwrap());
    let entry = f
      .storage
      .lookup(worker.version(), &key)
      .unwrap()
      .unwrap();
    assert_eq!(entry.response.body, b"new home");
  }

  #[tokio::test]
  async fn test_push_and_click() {
    let f = Fixture::new();
    let mut worker = f.worker();

    worker.handle(Event::Push { text: None }).await.unwrap();
    let shown = f.notifier.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].body, "New update available!");

    let outcome = worker
      .handle(Event::NotificationClick {
        action: Some(NotificationAction::View),
        data_url: Some(shown[0].data_url.clone()),
      })
      .await
      .unwrap();
    assert!(matches!(outcome, Outcome::Click(ClickEffect::OpenWindow(ref u)) if u == "/"));
  }

  #[test]
  fn test_control_message_wire_format() {
    let skip: ControlMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
    assert_eq!(skip, ControlMessage::SkipWaiting);
    let update: ControlMessage = serde_json::from_str(r#"{"type":"CACHE_UPDATE"}"#).unwrap();
    assert_eq!(update, ControlMessage::CacheUpdate);
  }
}
