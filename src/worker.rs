//! Event dispatch for the offline worker.
//!
//! The platform delivers typed lifecycle, fetch and push events over a
//! channel; a single background task owns the handler and answers each event
//! through a oneshot reply.

use std::io::{self, Write};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{BucketStorage, CacheError, CacheRouter, InstallReport, OFFLINE_MESSAGE};
use crate::net::{Request, Response, Transport};

pub const DEFAULT_TITLE: &str = "Story App Notification";
pub const DEFAULT_BODY: &str = "You have a new notification.";
pub const NOTIFICATION_ICON: &str = "/favicon.png";

/// Events the platform delivers to the worker.
#[derive(Debug)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(Request),
  /// Raw push payload, if the push carried one
  Push(Option<Vec<u8>>),
  NotificationClick,
}

impl WorkerEvent {
  fn name(&self) -> &'static str {
    match self {
      WorkerEvent::Install => "install",
      WorkerEvent::Activate => "activate",
      WorkerEvent::Fetch(_) => "fetch",
      WorkerEvent::Push(_) => "push",
      WorkerEvent::NotificationClick => "notification-click",
    }
  }
}

#[derive(Debug)]
pub enum EventOutcome {
  Installed(InstallReport),
  /// Names of the buckets that were deleted
  Activated(Vec<String>),
  Responded(Response),
  Notified,
  WindowOpened,
}

#[derive(Debug, Error)]
pub enum WorkerError {
  #[error("cache maintenance failed: {0}")]
  Cache(#[from] CacheError),

  #[error("notification failed: {0}")]
  Notify(String),

  #[error("worker has shut down")]
  Closed,
}

/// A notification ready to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
}

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
  title: Option<String>,
  #[serde(default)]
  options: PushOptions,
}

#[derive(Debug, Default, Deserialize)]
struct PushOptions {
  body: Option<String>,
}

impl Notification {
  /// Build a notification from a push payload of the form
  /// `{"title": ..., "options": {"body": ...}}`. Anything that is not such
  /// an object is shown as the body text.
  pub fn from_payload(payload: Option<&[u8]>) -> Self {
    let (title, body) = match payload {
      None => (None, None),
      Some(bytes) => match serde_json::from_slice::<PushPayload>(bytes) {
        Ok(p) => (p.title, p.options.body),
        Err(_) => {
          let text = String::from_utf8_lossy(bytes).trim().to_string();
          (None, (!text.is_empty()).then_some(text))
        }
      },
    };

    Self {
      title: title
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
      body: body
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| DEFAULT_BODY.to_string()),
      icon: NOTIFICATION_ICON.to_string(),
      badge: NOTIFICATION_ICON.to_string(),
    }
  }
}

/// Where notifications and windows end up.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
  async fn show(&self, notification: &Notification) -> Result<(), WorkerError>;
  async fn open_window(&self, url: &Url) -> Result<(), WorkerError>;
}

/// Prints notifications to stdout.
pub struct ConsoleNotifier;

#[async_trait::async_trait]
impl Notifier for ConsoleNotifier {
  async fn show(&self, notification: &Notification) -> Result<(), WorkerError> {
    writeln!(io::stdout(), "[{}] {}", notification.title, notification.body)
      .map_err(|e| WorkerError::Notify(e.to_string()))
  }

  async fn open_window(&self, url: &Url) -> Result<(), WorkerError> {
    writeln!(io::stdout(), "Open {}", url).map_err(|e| WorkerError::Notify(e.to_string()))
  }
}

/// The event handler: cache router plus notification surface.
pub struct ServiceWorker<T, S, N> {
  router: Arc<CacheRouter<T, S>>,
  precache: Vec<Url>,
  app_root: Url,
  notifier: N,
}

impl<T, S, N> ServiceWorker<T, S, N>
where
  T: Transport + 'static,
  S: BucketStorage + 'static,
  N: Notifier + 'static,
{
  pub fn new(router: Arc<CacheRouter<T, S>>, precache: Vec<Url>, app_root: Url, notifier: N) -> Self {
    Self {
      router,
      precache,
      app_root,
      notifier,
    }
  }

  pub async fn handle(&self, event: WorkerEvent) -> Result<EventOutcome, WorkerError> {
    debug!(event = event.name(), "Handling worker event");
    match event {
      WorkerEvent::Install => {
        let report = self.router.install(&self.precache).await;
        info!(cached = report.cached, failed = report.failed.len(), "Installed");
        Ok(EventOutcome::Installed(report))
      }
      WorkerEvent::Activate => {
        let deleted = self.router.activate()?;
        info!(deleted = deleted.len(), "Activated");
        Ok(EventOutcome::Activated(deleted))
      }
      WorkerEvent::Fetch(request) => {
        let response = match self.router.route(&request).await {
          Ok(response) => response,
          Err(e) => {
            warn!(url = %request.url, error = %e, "Nothing can answer request");
            Response::service_unavailable(OFFLINE_MESSAGE)
          }
        };
        Ok(EventOutcome::Responded(response))
      }
      WorkerEvent::Push(payload) => {
        let notification = Notification::from_payload(payload.as_deref());
        self.notifier.show(&notification).await?;
        Ok(EventOutcome::Notified)
      }
      WorkerEvent::NotificationClick => {
        self.notifier.open_window(&self.app_root).await?;
        Ok(EventOutcome::WindowOpened)
      }
    }
  }
}

struct Envelope {
  event: WorkerEvent,
  reply: oneshot::Sender<Result<EventOutcome, WorkerError>>,
}

/// Sending side of the dispatch channel.
#[derive(Clone)]
pub struct WorkerHandle {
  tx: mpsc::UnboundedSender<Envelope>,
}

impl WorkerHandle {
  /// Deliver an event and wait for the handler's answer.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, WorkerError> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(Envelope { event, reply })
      .map_err(|_| WorkerError::Closed)?;
    rx.await.map_err(|_| WorkerError::Closed)?
  }
}

/// Start the dispatch loop. Fetch events are answered concurrently; lifecycle
/// and notification events run one at a time in arrival order. The loop ends
/// once every handle has been dropped.
pub fn spawn<T, S, N>(worker: ServiceWorker<T, S, N>) -> (WorkerHandle, JoinHandle<()>)
where
  T: Transport + 'static,
  S: BucketStorage + 'static,
  N: Notifier + 'static,
{
  let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
  let worker = Arc::new(worker);

  let task = tokio::spawn(async move {
    while let Some(Envelope { event, reply }) = rx.recv().await {
      if matches!(event, WorkerEvent::Fetch(_)) {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
          let _ = reply.send(worker.handle(event).await);
        });
      } else {
        let result = worker.handle(event).await;
        // Caller may have stopped waiting
        let _ = reply.send(result);
      }
    }
    debug!("Worker dispatch loop stopped");
  });

  (WorkerHandle { tx }, task)
}
