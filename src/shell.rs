//! Interactive shell: the composition root that owns the store and the
//! cache worker and drives them from terminal input.
//!
//! The shell is a stand-in for the view layer: it subscribes to the store,
//! prints a one-line summary per committed patch, and translates commands
//! into store operations or cache fetches.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use reqwest::Method;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::cache::{self, CacheHandle, CacheWorker, HttpFetch, SqliteCacheStore};
use crate::commands;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::route::Route;
use crate::state::{AppState, NetworkPatch, NetworkStatus, Sort, StatePatch, ToastKind};
use crate::storage::{save_tip, FileStorage, StateStorage};
use crate::store::{Store, Subscription};

/// Simulated route loading with cooperative cancellation.
///
/// Each navigation briefly flips the network status to `Loading`, then back
/// to `Ok` after a delay. The deferred flip is keyed by the route it was
/// scheduled for: if navigation supersedes it before it fires, the key
/// comparison fails and the stale flip is a no-op.
pub struct RouteLoader {
  store: Store,
  delay: Duration,
  current_key: String,
  timer: Option<JoinHandle<()>>,
}

impl RouteLoader {
  pub fn new(store: Store, delay: Duration) -> Self {
    Self {
      store,
      delay,
      current_key: String::new(),
      timer: None,
    }
  }

  pub fn on_route(&mut self, route: &Route) {
    let key = route.key();
    if key == self.current_key {
      return;
    }
    self.current_key = key.clone();

    self.store.patch(StatePatch {
      network: Some(NetworkPatch::status_of(NetworkStatus::Loading, Some("Loading"))),
      ..Default::default()
    });

    let store = self.store.clone();
    let delay = self.delay;
    let handle = tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      if store.snapshot().route.key() != key {
        // Superseded by a newer navigation
        return;
      }
      store.patch(StatePatch {
        network: Some(NetworkPatch::status_of(NetworkStatus::Ok, None)),
        ..Default::default()
      });
    });
    if let Some(previous) = self.timer.replace(handle) {
      previous.abort();
    }
  }
}

/// Local check used for inline subscribe feedback; never reaches the
/// network-error channel.
pub fn is_valid_email(input: &str) -> bool {
  let mut parts = input.split('@');
  let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
    (Some(local), Some(domain), None) => (local, domain),
    _ => return false,
  };
  let sane = |s: &str| !s.is_empty() && !s.chars().any(|c| c.is_whitespace());
  let (host, tld) = match domain.rsplit_once('.') {
    Some(split) => split,
    None => return false,
  };
  sane(local) && sane(host) && sane(tld)
}

/// One line of state, printed after every commit.
pub fn summarize(state: &AppState) -> String {
  let overlays = {
    let mut open = Vec::new();
    if state.ui.sections_open {
      open.push("sections");
    }
    if state.ui.search_open {
      open.push("search");
    }
    if state.ui.subscribe_open {
      open.push("subscribe");
    }
    if open.is_empty() {
      "-".to_string()
    } else {
      open.join("+")
    }
  };
  let toast = state
    .ui
    .toast
    .as_ref()
    .map(|t| format!("{:?}: {}", t.kind, t.message))
    .unwrap_or_else(|| "-".to_string());
  format!(
    "[{}] theme={} sort={:?} query={:?} saved={} net={} overlays={} toast={}",
    state.route.label(),
    state.theme.label(),
    state.sort,
    state.query,
    state.saved.len(),
    state.network.status.label(),
    overlays,
    toast,
  )
}

/// Main shell state
pub struct Shell {
  store: Store,
  storage: Arc<dyn StateStorage>,
  cache: CacheHandle,
  loader: RouteLoader,
  should_quit: bool,
}

impl Shell {
  /// Wire up storage, store and cache worker from configuration.
  pub async fn new(config: Config, start_hash: &str) -> Result<Self> {
    let storage: Arc<dyn StateStorage> = Arc::new(FileStorage::open(config.storage_dir()?)?);
    let store = Store::new(Arc::clone(&storage))
      .with_toast_timeout(Duration::from_millis(config.toast_timeout_ms));
    store.initialize(start_hash);

    let cache_store = SqliteCacheStore::open(config.cache_db_path()?)?;
    let fetch = HttpFetch::new()?;
    let worker = CacheWorker::new(
      cache_store,
      fetch,
      &config.cache.version,
      config.cache.manifest_urls()?,
      config.cache.origin_url()?,
    );

    // Install only when this version has not been installed before; a failed
    // install leaves previous generations serving, so activation (which
    // deletes them) is skipped too.
    match worker.is_installed() {
      Ok(true) => worker.activate()?,
      Ok(false) => match worker.install().await {
        Ok(()) => worker.activate()?,
        Err(e) => warn!(error = %e, "cache install failed; previous generations remain"),
      },
      Err(e) => warn!(error = %e, "could not inspect cache generations"),
    }
    let cache = cache::spawn(worker);

    let loader = RouteLoader::new(
      store.clone(),
      Duration::from_millis(config.route_load_delay_ms),
    );

    Ok(Self {
      store,
      storage,
      cache,
      loader,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    let subscription: Subscription = self.store.subscribe(|state| {
      println!("{}", summarize(state));
    });

    println!("offprint - type 'help' for commands");
    println!("{}", summarize(&self.store.snapshot()));
    let initial = self.store.snapshot().route;
    self.loader.on_route(&initial);

    let mut events = EventHandler::new();
    while !self.should_quit {
      match events.next().await {
        Some(Event::Line(line)) => self.handle_line(&line).await,
        Some(Event::Eof) | None => break,
      }
    }

    subscription.cancel();
    Ok(())
  }

  async fn handle_line(&mut self, line: &str) {
    let mut words = line.split_whitespace();
    let head = match words.next() {
      Some(head) => head,
      None => return,
    };
    let rest: Vec<&str> = words.collect();

    let command = match commands::resolve(head) {
      Some(command) => command,
      None => {
        let suggestions = commands::get_suggestions(head);
        match suggestions.first() {
          Some(cmd) => println!("Unknown command '{}'. Did you mean '{}'?", head, cmd.name),
          None => println!("Unknown command '{}'. Type 'help' for commands.", head),
        }
        return;
      }
    };

    match command.name {
      "go" => match rest.first() {
        Some(hash) => {
          self.store.sync_route(hash);
          let route = self.store.snapshot().route;
          self.loader.on_route(&route);
        }
        None => println!("Usage: {}", command.usage),
      },
      "search" => self.store.set_query(&rest.join(" ")),
      "sort" => match rest.first().map(|s| Sort::from_str(s)) {
        Some(Ok(sort)) => self.store.set_sort(sort),
        _ => println!("Usage: {}", command.usage),
      },
      "save" => match rest.first() {
        Some(id) => self.store.toggle_saved(id),
        None => println!("Usage: {}", command.usage),
      },
      "clear-saved" => self.store.clear_saved(),
      "theme" => self.store.toggle_theme(),
      "overlay" => match rest.first().copied() {
        Some("sections") => self.store.toggle_sections(),
        Some("search") => self.store.open_search(),
        Some("subscribe") => self.store.open_subscribe(),
        Some("close") => self.store.close_overlays(),
        _ => println!("Usage: {}", command.usage),
      },
      "subscribe" => match rest.first() {
        Some(email) if is_valid_email(email) => {
          self.store.add_newsletter_email(email);
          self.store.close_overlays();
          self.store.set_toast_for(
            "Subscribed locally. No emails are sent.",
            ToastKind::Success,
            Duration::from_millis(3200),
          );
        }
        Some(_) => println!("Please enter a valid email address."),
        None => println!("Usage: {}", command.usage),
      },
      "tip" => {
        let link = rest.first().copied().unwrap_or_default();
        let note = rest.get(1..).map(|n| n.join(" ")).unwrap_or_default();
        if link.is_empty() && note.is_empty() {
          self.store.set_toast("Add a link or a note first.", ToastKind::Info);
        } else if save_tip(self.storage.as_ref(), link, &note) {
          self.store.set_toast("Tip saved locally.", ToastKind::Success);
        } else {
          self.store.set_toast("Could not save tip.", ToastKind::Error);
        }
      }
      "fetch" => match rest.first() {
        Some(url) => match self.cache.fetch(Method::GET, url).await {
          Ok(response) => println!(
            "{} {} ({}, {} bytes)",
            response.status,
            response.url,
            response.content_type,
            response.body.len()
          ),
          Err(e) => println!("Fetch failed: {}", e),
        },
        None => println!("Usage: {}", command.usage),
      },
      "reload" => self.store.reload_persisted(),
      "dismiss" => self.store.dismiss_toast(),
      "retry" => self.store.retry(),
      "state" => println!("{:#?}", self.store.snapshot()),
      "help" => {
        for cmd in commands::COMMANDS {
          println!("  {:<44} {}", cmd.usage, cmd.description);
        }
      }
      "quit" => self.should_quit = true,
      _ => {}
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::route::parse_hash;
  use crate::storage::MemoryStorage;

  fn store() -> Store {
    let store = Store::new(Arc::new(MemoryStorage::new()));
    store.initialize("#/");
    store
  }

  #[tokio::test]
  async fn test_route_load_settles_to_ok() {
    let store = store();
    let mut loader = RouteLoader::new(store.clone(), Duration::from_millis(40));

    store.sync_route("#/section/research");
    loader.on_route(&store.snapshot().route);
    assert_eq!(store.snapshot().network.status, NetworkStatus::Loading);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(store.snapshot().network.status, NetworkStatus::Ok);
  }

  #[tokio::test]
  async fn test_stale_route_load_is_a_noop() {
    let store = store();
    let mut loader = RouteLoader::new(store.clone(), Duration::from_millis(40));

    store.sync_route("#/section/research");
    loader.on_route(&store.snapshot().route);

    // Navigation supersedes the pending load without scheduling a new one;
    // the stale timer's key comparison fails and loading never settles.
    store.sync_route("#/article/ai-medicine-research");
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(store.snapshot().network.status, NetworkStatus::Loading);
  }

  #[tokio::test]
  async fn test_repeat_route_does_not_restart_loading() {
    let store = store();
    let mut loader = RouteLoader::new(store.clone(), Duration::from_millis(20));

    let route = parse_hash("#/saved");
    store.sync_route("#/saved");
    loader.on_route(&route);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(store.snapshot().network.status, NetworkStatus::Ok);

    // Same key again: no new loading flicker.
    loader.on_route(&route);
    assert_eq!(store.snapshot().network.status, NetworkStatus::Ok);
  }

  #[test]
  fn test_email_validation() {
    assert!(is_valid_email("reader@example.com"));
    assert!(is_valid_email("a.b+c@mail.example.org"));
    assert!(!is_valid_email("reader"));
    assert!(!is_valid_email("reader@example"));
    assert!(!is_valid_email("@example.com"));
    assert!(!is_valid_email("reader@.com"));
    assert!(!is_valid_email("rea der@example.com"));
    assert!(!is_valid_email("reader@exa mple.com"));
    assert!(!is_valid_email("a@b@c.com"));
  }

  #[test]
  fn test_summarize_mentions_route_and_theme() {
    let state = AppState::default();
    let line = summarize(&state);
    assert!(line.contains("[home]"));
    assert!(line.contains("theme=light"));
    assert!(line.contains("net=ok"));
  }
}
