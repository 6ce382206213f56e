//! Deferred replay of queued contact-form submissions.

use std::sync::Arc;
use url::Url;

use crate::config::NotificationConfig;
use crate::error::SyncAttemptFailure;
use crate::net::{Network, Request};
use crate::notify::{Notification, Notifier};
use crate::queue::{QueuedSubmission, SubmissionQueue};

/// What woke the agent up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
  /// Connectivity came back
  Reconnected,
  /// Scheduled sync
  Periodic,
}

/// Summary of one drain of the queue.
#[derive(Debug, Default)]
pub struct SyncReport {
  pub attempted: usize,
  pub delivered: Vec<i64>,
  pub failures: Vec<SyncAttemptFailure>,
}

/// Replays queued submissions against the submission endpoint.
///
/// Delivery is at-least-once: a submission that was posted but could not be
/// removed is posted again on the next sync.
pub struct SyncAgent {
  queue: Arc<SubmissionQueue>,
  network: Arc<dyn Network>,
  notifier: Arc<dyn Notifier>,
  endpoint: Url,
  notifications: NotificationConfig,
}

impl SyncAgent {
  pub fn new(
    queue: Arc<SubmissionQueue>,
    network: Arc<dyn Network>,
    notifier: Arc<dyn Notifier>,
    endpoint: Url,
    notifications: NotificationConfig,
  ) -> Self {
    Self {
      queue,
      network,
      notifier,
      endpoint,
      notifications,
    }
  }

  /// Attempt every queued submission once.
  pub async fn sync(&self, trigger: SyncTrigger) -> SyncReport {
    let submissions = match self.queue.dequeue_all() {
      Ok(submissions) => submissions,
      Err(e) => {
        tracing::error!(error = %e, "Could not read queued submissions");
        return SyncReport::default();
      }
    };

    tracing::info!(?trigger, pending = submissions.len(), "Syncing submissions");

    let mut report = SyncReport {
      attempted: submissions.len(),
      ..SyncReport::default()
    };

    for submission in &submissions {
      match self.replay(submission).await {
        Ok(()) => {
          tracing::info!(id = submission.id, "Submission delivered");
          report.delivered.push(submission.id);

          let notification = Notification::submission_sent(&self.notifications);
          if let Err(e) = self.notifier.show(&notification).await {
            tracing::warn!(error = %e, "Failed to show notification");
          }
        }
        Err(failure) => {
          tracing::warn!(error = %failure, "Submission stays queued");
          report.failures.push(failure);
        }
      }
    }

    report
  }

  async fn replay(&self, submission: &QueuedSubmission) -> Result<(), SyncAttemptFailure> {
    let id = submission.id;
    let request = Request::post_json(
      self.endpoint.clone(),
      submission.payload.to_string().into_bytes(),
    );

    let response = self
      .network
      .fetch(&request)
      .await
      .map_err(|source| SyncAttemptFailure::Network { id, source })?;

    if !response.is_ok() {
      return Err(SyncAttemptFailure::Rejected {
        id,
        status: response.status,
      });
    }

    self
      .queue
      .remove(id)
      .map_err(|e| SyncAttemptFailure::Removal {
        id,
        reason: format!("{:#}", e),
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::mock::MockNetwork;
  use crate::notify::testing::RecordingNotifier;
  use reqwest::Method;
  use serde_json::json;

  const ENDPOINT: &str = "https://example.dev/contact";

  struct Fixture {
    queue: Arc<SubmissionQueue>,
    network: Arc<MockNetwork>,
    notifier: Arc<RecordingNotifier>,
    agent: SyncAgent,
  }

  fn fixture() -> Fixture {
    let queue = Arc::new(SubmissionQueue::open_in_memory().unwrap());
    let network = Arc::new(MockNetwork::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let agent = SyncAgent::new(
      queue.clone(),
      network.clone(),
      notifier.clone(),
      Url::parse(ENDPOINT).unwrap(),
      NotificationConfig::default(),
    );
    Fixture {
      queue,
      network,
      notifier,
      agent,
    }
  }

  fn endpoint_replies(network: &MockNetwork, status: u16) {
    network.route(
      Method::POST,
      ENDPOINT,
      crate::net::mock::response(status, "{}", crate::net::ResponseType::Basic),
    );
  }

  #[tokio::test]
  async fn test_success_empties_queue_and_notifies_once() {
    let f = fixture();
    let id = f.queue.enqueue(&json!({"name": "A"})).unwrap();
    endpoint_replies(&f.network, 200);

    let report = f.agent.sync(SyncTrigger::Reconnected).await;
    assert_eq!(report.attempted, 1);
    assert_eq!(report.delivered, vec![id]);
    assert!(report.failures.is_empty());
    assert!(f.queue.dequeue_all().unwrap().is_empty());

    let shown = f.notifier.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "Message Sent!");
  }

  #[tokio::test]
  async fn test_server_error_keeps_submission() {
    let f = fixture();
    let id = f.queue.enqueue(&json!({"name": "A"})).unwrap();
    endpoint_replies(&f.network, 500);

    let report = f.agent.sync(SyncTrigger::Periodic).await;
    assert!(report.delivered.is_empty());
    assert!(matches!(
      report.failures.as_slice(),
      [SyncAttemptFailure::Rejected { status: 500, .. }]
    ));

    let pending = f.queue.dequeue_all().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert!(f.notifier.shown().is_empty());
  }

  #[tokio::test]
  async fn test_offline_keeps_submission_for_next_sync() {
    let f = fixture();
    f.queue.enqueue(&json!({"name": "A"})).unwrap();
    f.network.set_offline(true);

    let report = f.agent.sync(SyncTrigger::Reconnected).await;
    assert!(matches!(
      report.failures.as_slice(),
      [SyncAttemptFailure::Network { .. }]
    ));
    assert_eq!(f.queue.len().unwrap(), 1);

    f.network.set_offline(false);
    endpoint_replies(&f.network, 201);
    let report = f.agent.sync(SyncTrigger::Reconnected).await;
    assert_eq!(report.delivered.len(), 1);
    assert_eq!(f.queue.len().unwrap(), 0);
    assert_eq!(f.notifier.shown().len(), 1);
  }

  #[tokio::test]
  async fn test_failed_removal_keeps_submission_for_redelivery() {
    let f = fixture();
    let id = f.queue.enqueue(&json!({"name": "A"})).unwrap();
    endpoint_replies(&f.network, 200);
    f.queue
      .execute_batch(
        "CREATE TRIGGER keep_submissions BEFORE DELETE ON submissions
         BEGIN SELECT RAISE(ABORT, 'queue is read-only'); END;",
      )
      .unwrap();

    let report = f.agent.sync(SyncTrigger::Reconnected).await;
    assert!(report.delivered.is_empty());
    assert!(matches!(
      report.failures.as_slice(),
      [SyncAttemptFailure::Removal { id: failed, .. }] if *failed == id
    ));
    assert_eq!(f.queue.len().unwrap(), 1);
    assert!(f.notifier.shown().is_empty());

    f.queue.execute_batch("DROP TRIGGER keep_submissions").unwrap();
    let report = f.agent.sync(SyncTrigger::Periodic).await;
    assert_eq!(report.delivered, vec![id]);
    assert_eq!(f.network.calls_to(ENDPOINT), 2);
    assert_eq!(f.queue.len().unwrap(), 0);
    assert_eq!(f.notifier.shown().len(), 1);
  }

  #[tokio::test]
  async fn test_each_submission_is_posted() {
    let f = fixture();
    f.queue.enqueue(&json!({"name": "A"})).unwrap();
    f.queue.enqueue(&json!({"name": "B"})).unwrap();
    endpoint_replies(&f.network, 200);

    let report = f.agent.sync(SyncTrigger::Reconnected).await;
    assert_eq!(report.delivered.len(), 2);
    assert_eq!(f.network.calls_to(ENDPOINT), 2);
    assert_eq!(f.notifier.shown().len(), 2);
  }

  #[tokio::test]
  async fn test_empty_queue_does_nothing() {
    let f = fixture();
    let report = f.agent.sync(SyncTrigger::Periodic).await;
    assert_eq!(report.attempted, 0);
    assert_eq!(f.network.call_count(), 0);
  }
}
