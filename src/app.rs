use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::{eyre::eyre, Report, Result};
use tracing::{info, warn};
use url::Url;

use crate::cache::{BucketStorage, CacheRouter, NoopStorage, RouteTable, SqliteStorage};
use crate::clock::SystemClock;
use crate::commands::{photo_mime, Command};
use crate::config::Config;
use crate::db::{StoryStore, DB_FILE};
use crate::error::Error;
use crate::net::{ReqwestTransport, Request};
use crate::push::{
  LocalPushPlatform, PushError, SubscribeOutcome, SubscriptionManager, UnsubscribeOutcome,
};
use crate::session::Session;
use crate::story::{Fetched, GeoPoint, ListQuery, NewStory, Story, StoryClient, StoryGateway};
use crate::worker::{self, ConsoleNotifier, EventOutcome, ServiceWorker, WorkerEvent, WorkerHandle};

const CACHE_FILE: &str = "cache.db";
const PUSH_FILE: &str = "push-subscription.json";

type Router = CacheRouter<ReqwestTransport, Box<dyn BucketStorage>>;
type Gateway = StoryGateway<Arc<Router>>;

/// Wired-up application: every command runs against these components.
pub struct App {
  store: Arc<StoryStore>,
  router: Arc<Router>,
  gateway: Arc<Gateway>,
  session: Session,
  push: SubscriptionManager<LocalPushPlatform, Arc<Gateway>>,
  worker: WorkerHandle,
}

impl App {
  pub fn new(config: &Config, data_dir: PathBuf) -> Result<Self> {
    let transport = ReqwestTransport::new(
      concat!("storycache/", env!("CARGO_PKG_VERSION")),
      config.timeout(),
    )
    .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    let storage: Box<dyn BucketStorage> = if config.cache.enabled {
      Box::new(SqliteStorage::open(&data_dir.join(CACHE_FILE))?)
    } else {
      info!("Response caching disabled");
      Box::new(NoopStorage)
    };
    let routes = RouteTable::standard(&config.router_settings()?);
    let router = Arc::new(CacheRouter::new(
      transport,
      storage,
      routes,
      Arc::new(SystemClock),
    ));

    let store = Arc::new(StoryStore::new(data_dir.join(DB_FILE)));
    let client = StoryClient::new(Arc::clone(&router), config.api_base()?);
    let gateway = Arc::new(StoryGateway::new(client, Arc::clone(&store)));

    let mut session = Session::new(&data_dir);
    if let Err(e) = session.load() {
      warn!(error = %e, "Ignoring unreadable session");
    }
    gateway.set_token(Config::get_token().or_else(|| session.token().map(String::from)));

    let platform = LocalPushPlatform::new(data_dir.join(PUSH_FILE), config.push_service_url()?);
    let push = SubscriptionManager::new(
      platform,
      Arc::clone(&gateway),
      config.api.vapid_public_key.clone(),
    );

    let app_root = config
      .app_origin()?
      .join("/")
      .map_err(|e| eyre!("Invalid app origin: {}", e))?;
    let (worker, _task) = worker::spawn(ServiceWorker::new(
      Arc::clone(&router),
      config.precache_urls()?,
      app_root,
      ConsoleNotifier,
    ));

    Ok(Self {
      store,
      router,
      gateway,
      session,
      push,
      worker,
    })
  }

  pub async fn run(&mut self, command: Command) -> Result<()> {
    match command {
      Command::Install => {
        if let EventOutcome::Installed(report) = self.dispatch(WorkerEvent::Install).await? {
          println!("Precached {} resources", report.cached);
          for url in &report.failed {
            println!("  failed: {}", url);
          }
        }
      }
      Command::Activate => {
        if let EventOutcome::Activated(deleted) = self.dispatch(WorkerEvent::Activate).await? {
          if deleted.is_empty() {
            println!("No stale buckets");
          }
          for name in deleted {
            println!("Deleted bucket {}", name);
          }
        }
      }
      Command::Buckets => {
        for bucket in self.router.stats()? {
          let marker = if bucket.current { "" } else { " (stale)" };
          println!("{:<32} {:>5}{}", bucket.name, bucket.entries, marker);
        }
      }
      Command::Fetch { url } => {
        let url = Url::parse(&url).map_err(|e| eyre!("Invalid URL '{}': {}", url, e))?;
        let event = WorkerEvent::Fetch(Request::get(url));
        if let EventOutcome::Responded(response) = self.dispatch(event).await? {
          let note = if response.synthesized { " (offline)" } else { "" };
          println!("HTTP {}{}", response.status, note);
          println!("{}", response.text());
        }
      }
      Command::Register {
        name,
        email,
        password,
      } => {
        let message = self
          .gateway
          .register(&name, &email, &password)
          .await
          .map_err(report)?;
        println!("{}", message);
      }
      Command::Login { email, password } => {
        let result = self.gateway.login(&email, &password).await.map_err(report)?;
        let name = result.name.clone();
        self.session.update(result.into());
        self.session.save()?;
        println!("Logged in as {}", name);
      }
      Command::Logout => {
        self.session.clear()?;
        self.gateway.set_token(None);
        println!("Logged out");
      }
      Command::List {
        page,
        size,
        with_location,
      } => {
        let query = ListQuery {
          page,
          size,
          with_location,
        };
        let stories = self.gateway.list_stories(&query).await.map_err(report)?;
        print_notice(&stories);
        if stories.data.is_empty() {
          println!("No stories");
        }
        for story in &stories.data {
          print_summary(story);
        }
      }
      Command::Show { id } => {
        let story = self.gateway.get_story(&id).await.map_err(report)?;
        print_notice(&story);
        print_detail(&story.data);
      }
      Command::Post {
        description,
        photo,
        lat,
        lon,
      } => {
        let bytes = std::fs::read(&photo)
          .map_err(|e| eyre!("Failed to read photo {}: {}", photo.display(), e))?;
        let photo_name = photo
          .file_name()
          .and_then(|n| n.to_str())
          .unwrap_or("photo")
          .to_string();
        let story = NewStory {
          description,
          photo: bytes,
          photo_mime: photo_mime(&photo).to_string(),
          photo_name,
          location: lat.zip(lon).map(|(lat, lon)| GeoPoint { lat, lon }),
        };
        let message = self.gateway.add_new_story(&story).await.map_err(report)?;
        println!("{}", message);
      }
      Command::Save { id } => {
        let story = self.gateway.get_story(&id).await.map_err(report)?;
        print_notice(&story);
        self
          .store
          .saved()
          .save(&story.data)
          .map_err(|e| report(e.into()))?;
        println!("Saved {}", story.data.id);
      }
      Command::Unsave { id } => {
        let removed = self.store.saved().remove(&id).map_err(|e| report(e.into()))?;
        if removed {
          println!("Removed {}", id);
        } else {
          println!("{} was not saved", id);
        }
      }
      Command::Saved => {
        let saved = self.store.saved().get_all().map_err(|e| report(e.into()))?;
        if saved.is_empty() {
          println!("No saved stories");
        }
        for story in &saved {
          print_summary(story);
        }
      }
      Command::Subscribe => match self.push.subscribe().await.map_err(push_report)? {
        SubscribeOutcome::Subscribed(sub) => println!("Subscribed: {}", sub.endpoint),
        SubscribeOutcome::AlreadySubscribed(sub) => println!("Already subscribed: {}", sub.endpoint),
        SubscribeOutcome::Unsupported => println!("Push notifications are not supported"),
      },
      Command::Unsubscribe => match self.push.unsubscribe().await.map_err(push_report)? {
        UnsubscribeOutcome::Unsubscribed => println!("Unsubscribed"),
        UnsubscribeOutcome::NotSubscribed => println!("Not subscribed"),
        UnsubscribeOutcome::Unsupported => println!("Push notifications are not supported"),
      },
      Command::PushStatus => {
        println!("{:?}", self.push.state().await);
        if let Some(sub) = self.push.current().await.map_err(push_report)? {
          println!("  endpoint: {}", sub.endpoint);
        }
      }
      Command::Push { payload } => {
        let event = WorkerEvent::Push(payload.map(String::into_bytes));
        self.dispatch(event).await?;
      }
      Command::NotificationClick => {
        self.dispatch(WorkerEvent::NotificationClick).await?;
      }
    }

    Ok(())
  }

  async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
    Ok(self.worker.dispatch(event).await?)
  }
}

/// Attach the user-facing message to a gateway error.
fn report(e: Error) -> Report {
  let message = e.user_message();
  Report::new(e).wrap_err(message)
}

fn push_report(e: PushError) -> Report {
  match e.server_error() {
    Some(server) => {
      let message = server.user_message();
      Report::new(e).wrap_err(message)
    }
    None => Report::new(e),
  }
}

fn print_notice<T>(fetched: &Fetched<T>) {
  if let Some(notice) = fetched.notice() {
    eprintln!("{}", notice);
  }
}

fn print_summary(story: &Story) {
  println!(
    "{}  {}  {}  {}",
    story.id,
    story.created_at.format("%Y-%m-%d %H:%M"),
    story.author_name,
    first_line(&story.description)
  );
}

fn print_detail(story: &Story) {
  println!("{}", story.id);
  println!("Author:  {}", story.author_name);
  println!("Created: {}", story.created_at.to_rfc3339());
  println!("Photo:   {}", story.photo_url);
  if let Some(point) = story.location {
    println!("Where:   {:.5}, {:.5}", point.lat, point.lon);
  }
  println!();
  println!("{}", story.description);
}

fn first_line(text: &str) -> String {
  let line = text.lines().next().unwrap_or("");
  if line.chars().count() > 60 {
    let cut: String = line.chars().take(57).collect();
    format!("{}...", cut)
  } else {
    line.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_first_line_truncates() {
    assert_eq!(first_line("short\nsecond"), "short");
    let long = "x".repeat(80);
    let line = first_line(&long);
    assert_eq!(line.chars().count(), 60);
    assert!(line.ends_with("..."));
  }

  #[test]
  fn test_report_carries_user_message() {
    let report = report(Error::AuthenticationRequired("401".to_string()));
    assert_eq!(report.to_string(), "Your session has expired. Please log in again.");
  }
}
