//! Notifications shown to the user and routing of their actions.

use async_trait::async_trait;
use color_eyre::Result;
use std::str::FromStr;

use crate::config::NotificationConfig;

/// The fixed set of buttons a notification carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
  View,
  Close,
}

impl NotificationAction {
  pub const ALL: [NotificationAction; 2] = [Self::View, Self::Close];

  pub fn title(&self) -> &'static str {
    match self {
      Self::View => "View Portfolio",
      Self::Close => "Close",
    }
  }
}

impl FromStr for NotificationAction {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "view" => Ok(Self::View),
      "close" => Ok(Self::Close),
      other => Err(format!("unknown notification action '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  /// Replaces an earlier notification with the same tag
  pub tag: Option<String>,
  /// Opened when the notification is clicked
  pub data_url: String,
  pub actions: Vec<NotificationAction>,
}

impl Notification {
  fn from_config(config: &NotificationConfig, title: &str, body: &str) -> Self {
    Self {
      title: title.to_string(),
      body: body.to_string(),
      icon: config.icon.clone(),
      badge: config.badge.clone(),
      vibrate: config.vibrate.clone(),
      tag: None,
      data_url: config.open_url.clone(),
      actions: NotificationAction::ALL.to_vec(),
    }
  }

  /// A pushed message; empty pushes announce an update.
  pub fn push(config: &NotificationConfig, text: Option<&str>) -> Self {
    let body = text
      .filter(|t| !t.trim().is_empty())
      .unwrap_or("New update available!");
    Self::from_config(config, &config.title, body)
  }

  /// Confirms a queued contact-form submission reached the server.
  pub fn submission_sent(config: &NotificationConfig) -> Self {
    Self {
      tag: Some("contact-success".to_string()),
      ..Self::from_config(
        config,
        "Message Sent!",
        "Your contact form was submitted successfully.",
      )
    }
  }
}

/// Anything that can present a notification to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn show(&self, notification: &Notification) -> Result<()>;
}

/// Presents notifications on stdout.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
  async fn show(&self, notification: &Notification) -> Result<()> {
    tracing::info!(
      title = %notification.title,
      tag = notification.tag.as_deref().unwrap_or(""),
      icon = %notification.icon,
      badge = %notification.badge,
      vibrate = ?notification.vibrate,
      data_url = %notification.data_url,
      "Showing notification"
    );

    let actions: Vec<&str> = notification.actions.iter().map(|a| a.title()).collect();
    println!("[{}] {}", notification.title, notification.body);
    if !actions.is_empty() {
      println!("  actions: {}", actions.join(" | "));
    }
    Ok(())
  }
}

/// What a notification click should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickEffect {
  /// Open or focus a window on this URL
  OpenWindow(String),
  Dismiss,
}

/// Route a click: `view` (or a click on the body) opens the notification's page.
pub fn route_click(action: Option<NotificationAction>, data_url: Option<&str>) -> ClickEffect {
  match action {
    None | Some(NotificationAction::View) => {
      ClickEffect::OpenWindow(data_url.filter(|u| !u.is_empty()).unwrap_or("/").to_string())
    }
    Some(NotificationAction::Close) => ClickEffect::Dismiss,
  }
}
