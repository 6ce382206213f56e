mod cache;
mod config;
mod db;
mod error;
mod logging;
mod net;
mod notify;
mod queue;
mod sync;
mod version;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use cache::{CacheStorage, SqliteStorage};
use config::Config;
use net::{Destination, HttpNetwork, Network, Request, RequestMode, Response};
use notify::{ClickEffect, ConsoleNotifier, NotificationAction, Notifier};
use queue::SubmissionQueue;
use worker::{ControlMessage, Event, Outcome, Worker};

#[derive(Parser, Debug)]
#[command(name = "folio-cache")]
#[command(about = "Offline asset cache and deferred contact-form sync for the portfolio site")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/folio-cache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Site origin, overriding the config file
  #[arg(short, long)]
  origin: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Populate the current cache generation, then activate it
  Install,
  /// Drop stale generations and make the current one active
  Activate,
  /// Re-fetch the manifest into the active generation
  Update,
  /// Post a control message, e.g. '{"type":"SKIP_WAITING"}'
  Message { json: String },
  /// Resolve a request the way the page would see it
  Fetch {
    url: String,
    /// Request mode; `navigate` is a full page load
    #[arg(long, value_enum, default_value = "no-cors")]
    mode: RequestMode,
    /// What the resource is for (default: document for navigations, other otherwise)
    #[arg(long, value_enum)]
    destination: Option<Destination>,
    #[arg(long, default_value = "GET")]
    method: String,
    /// Write the response body to stdout
    #[arg(long)]
    body: bool,
  },
  /// Queue a contact-form submission given as a JSON object
  Submit { payload: String },
  /// List queued submissions
  Queue,
  /// Replay queued submissions now
  Sync,
  /// Check the version endpoint for updates
  CheckVersion,
  /// Run periodic syncs until interrupted
  Watch {
    /// Seconds between syncs (default from config)
    #[arg(long)]
    interval: Option<u64>,
  },
  /// Show a push notification
  Push { text: Option<String> },
  /// Route a notification click
  Click {
    #[arg(long)]
    action: Option<NotificationAction>,
    #[arg(long)]
    url: Option<String>,
  },
  /// Close a notification without clicking it
  Dismiss,
  /// Show cache and queue state
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    Config { origin, ..config }
  } else {
    config
  };

  let data_dir = config.data_dir()?;
  let _log_guard = logging::init(&config.logging, &data_dir.join("logs"))?;
  tracing::debug!(data_dir = %data_dir.display(), origin = %config.origin, "Starting");

  let storage = Arc::new(SqliteStorage::open(&data_dir.join("cache.db"))?);
  let queue = Arc::new(SubmissionQueue::open(&data_dir.join("queue.db"))?);
  let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(&config)?);
  let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);

  let mut worker = Worker::new(
    &config,
    storage.clone(),
    queue.clone(),
    network.clone(),
    notifier,
  )?;

  match args.command {
    Command::Install => {
      print_outcome(&worker.handle(Event::Install).await?);
      if worker.skip_waiting() {
        print_outcome(&worker.handle(Event::Activate).await?);
      }
    }
    Command::Activate => print_outcome(&worker.handle(Event::Activate).await?),
    Command::Update => {
      let outcome = worker
        .handle(Event::Message(ControlMessage::CacheUpdate))
        .await?;
      print_outcome(&outcome);
    }
    Command::Message { json } => {
      let message: ControlMessage =
        serde_json::from_str(&json).map_err(|e| eyre!("Invalid control message: {}", e))?;
      print_outcome(&worker.handle(Event::Message(message)).await?);
    }
    Command::Fetch {
      url,
      mode,
      destination,
      method,
      body,
    } => {
      let request = build_request(&config, &url, mode, destination, &method)?;
      let response = match worker.handle(Event::Fetch(request.clone())).await? {
        Outcome::Respond(resolved) => {
          print_outcome(&Outcome::Respond(resolved.clone()));
          resolved.response
        }
        outcome => {
          print_outcome(&outcome);
          passthrough(network.as_ref(), &request).await?
        }
      };
      if body {
        std::io::stdout().write_all(&response.body)?;
      }
    }
    Command::Submit { payload } => {
      let payload: serde_json::Value =
        serde_json::from_str(&payload).map_err(|e| eyre!("Invalid submission JSON: {}", e))?;
      if !payload.is_object() {
        return Err(eyre!("Submission must be a JSON object"));
      }
      print_outcome(&worker.handle(Event::Submit { payload }).await?);
    }
    Command::Queue => {
      for submission in queue.dequeue_all()? {
        println!(
          "{}\t{}\t{}",
          submission.id,
          submission.created_at.to_rfc3339(),
          submission.payload
        );
      }
    }
    Command::Sync => {
      let outcome = worker
        .handle(Event::Sync {
          tag: config.sync.tag.clone(),
        })
        .await?;
      print_outcome(&outcome);
    }
    Command::CheckVersion => {
      let outcome = worker
        .handle(Event::PeriodicSync {
          tag: config.sync.update_tag.clone(),
        })
        .await?;
      print_outcome(&outcome);
    }
    Command::Watch { interval } => {
      let secs = interval.unwrap_or(config.sync.interval_secs).max(1);
      watch(&mut worker, &config, Duration::from_secs(secs)).await?;
    }
    Command::Push { text } => print_outcome(&worker.handle(Event::Push { text }).await?),
    Command::Click { action, url } => {
      let outcome = worker
        .handle(Event::NotificationClick {
          action,
          data_url: url,
        })
        .await?;
      print_outcome(&outcome);
    }
    Command::Dismiss => print_outcome(&worker.handle(Event::NotificationClose).await?),
    Command::Status => {
      println!("version:  {} ({:?})", worker.version(), worker.phase());
      match storage.active_generation()? {
        Some(active) => println!(
          "active:   {} ({} entries)",
          active,
          storage.entry_count(&active)?
        ),
        None => println!("active:   none"),
      }
      println!("stored:   {}", storage.generations()?.join(", "));
      println!("queued:   {}", queue.len()?);
    }
  }

  Ok(())
}

fn build_request(
  config: &Config,
  location: &str,
  mode: RequestMode,
  destination: Option<Destination>,
  method: &str,
) -> Result<Request> {
  let url = match Url::parse(location) {
    Ok(url) => url,
    Err(_) => config.resolve(location)?,
  };

  let mut request = if mode == RequestMode::Navigate {
    Request::navigate(url)
  } else {
    Request {
      mode,
      ..Request::get(url)
    }
  };
  request.method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
  if let Some(destination) = destination {
    request = request.with_destination(destination);
  }
  Ok(request)
}

/// Requests the cache layer declines go straight to the network.
async fn passthrough(network: &dyn Network, request: &Request) -> Result<Response> {
  let response = network.fetch(request).await?;
  println!(
    "{} {} [passthrough] {} bytes",
    response.status,
    response.status_text,
    response.body.len()
  );
  Ok(response)
}

/// Fire the periodic sync tags on a fixed schedule until Ctrl-C.
async fn watch<S: CacheStorage>(
  worker: &mut Worker<S>,
  config: &Config,
  every: Duration,
) -> Result<()> {
  tracing::info!(interval_secs = every.as_secs(), "Watching for periodic syncs");
  let mut ticker = tokio::time::interval(every);
  let tags = [config.sync.tag.clone(), config.sync.update_tag.clone()];

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        for tag in &tags {
          let outcome = worker.handle(Event::PeriodicSync { tag: tag.clone() }).await?;
          print_outcome(&outcome);
        }
      }
      _ = tokio::signal::ctrl_c() => {
        tracing::info!("Received Ctrl-C, stopping");
        break;
      }
    }
  }

  Ok(())
}

fn print_outcome(outcome: &Outcome) {
  match outcome {
    Outcome::Installed(installed) => println!(
      "installed {} ({} entries)",
      installed.generation, installed.entries
    ),
    Outcome::Activated(activated) => {
      println!("activated {}", activated.generation);
      for name in &activated.deleted {
        println!("  deleted {}", name);
      }
      for failure in &activated.failures {
        println!("  {}", failure);
      }
    }
    Outcome::Respond(resolved) => println!(
      "{} {} [{}] {} bytes, {}",
      resolved.response.status,
      resolved.response.status_text,
      resolved.source.label(),
      resolved.response.body.len(),
      resolved.response.header("content-type").unwrap_or("-")
    ),
    Outcome::Passthrough => println!("not intercepted"),
    Outcome::Synced(report) => {
      println!(
        "synced {}/{} submissions",
        report.delivered.len(),
        report.attempted
      );
      for failure in &report.failures {
        println!("  {}", failure);
      }
    }
    Outcome::VersionChecked(Some(check)) => println!(
      "version {} ({}, digest {})",
      check.version,
      if check.changed { "changed" } else { "unchanged" },
      check.digest.get(..12).unwrap_or(&check.digest)
    ),
    Outcome::VersionChecked(None) => println!("version check failed"),
    Outcome::CacheUpdated(count) => println!("cache updated ({} entries)", count),
    Outcome::Notified => {}
    Outcome::Click(ClickEffect::OpenWindow(url)) => println!("open {}", url),
    Outcome::Click(ClickEffect::Dismiss) => println!("dismissed"),
    Outcome::Queued(id) => println!("queued submission {}", id),
    Outcome::SkipWaitingSet => println!("skip waiting set"),
    Outcome::Ignored => println!("ignored"),
  }
}
