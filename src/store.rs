//! Single source of truth for session state.
//!
//! The [`Store`] mediates every read and write: patches merge into the state,
//! the durable subset is persisted best-effort, and every subscriber is then
//! notified synchronously, in registration order, with a fresh snapshot.
//! Consumers only ever receive copies; the state value itself never leaves
//! the store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::route::{parse_hash, Route};
use crate::state::{
  fresh_id, AppState, NetworkPatch, NetworkStatus, Newsletters, NewslettersPatch, StatePatch,
  Theme, Toast, ToastKind, UiPatch, NEWSLETTER_EMAIL_CAP,
};
use crate::storage::{StateStorage, NEWSLETTER_KEY, SAVED_KEY, THEME_KEY};

/// Default auto-dismiss timeout for toasts.
pub const DEFAULT_TOAST_TIMEOUT: Duration = Duration::from_millis(2600);

type Subscriber = Arc<dyn Fn(&AppState) + Send + Sync>;

struct Inner {
  state: AppState,
  storage: Arc<dyn StateStorage>,
  subscribers: Vec<(u64, Subscriber)>,
  next_subscriber: u64,
  toast_timer: Option<JoinHandle<()>>,
  toast_timeout: Duration,
}

impl Inner {
  /// Re-read the persisted subset, keeping defaults where storage is missing
  /// or malformed. Session-only fields are untouched.
  fn load_persisted(&mut self) {
    if let Some(raw) = self.storage.get(THEME_KEY) {
      if let Ok(theme) = serde_json::from_str::<Theme>(&raw) {
        self.state.theme = theme;
      }
    }
    if let Some(raw) = self.storage.get(SAVED_KEY) {
      if let Ok(saved) = serde_json::from_str(&raw) {
        self.state.saved = saved;
      }
    }
    if let Some(raw) = self.storage.get(NEWSLETTER_KEY) {
      if let Ok(mut newsletters) = serde_json::from_str::<Newsletters>(&raw) {
        newsletters.emails.truncate(NEWSLETTER_EMAIL_CAP);
        self.state.newsletters = newsletters;
      }
    }
  }

  /// Write the durable subset back out. Failures are logged and swallowed;
  /// in-memory state stays authoritative.
  fn persist(&self) {
    self.persist_value(THEME_KEY, &self.state.theme);
    self.persist_value(SAVED_KEY, &self.state.saved);
    self.persist_value(NEWSLETTER_KEY, &self.state.newsletters);
  }

  fn persist_value<T: serde::Serialize>(&self, key: &str, value: &T) {
    match serde_json::to_string(value) {
      Ok(encoded) => {
        self.storage.set(key, &encoded);
      }
      Err(e) => warn!(key, error = %e, "failed to serialize persisted state"),
    }
  }
}

/// Reactive state store. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Store {
  inner: Arc<Mutex<Inner>>,
}

/// Handle returned by [`Store::subscribe`]; cancelling deregisters the
/// callback. Cancelling twice is a no-op.
pub struct Subscription {
  id: u64,
  store: Store,
}

impl Subscription {
  pub fn cancel(&self) {
    if let Ok(mut inner) = self.store.inner.lock() {
      inner.subscribers.retain(|(id, _)| *id != self.id);
    }
  }
}

impl Store {
  pub fn new(storage: Arc<dyn StateStorage>) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner {
        state: AppState::default(),
        storage,
        subscribers: Vec::new(),
        next_subscriber: 0,
        toast_timer: None,
        toast_timeout: DEFAULT_TOAST_TIMEOUT,
      })),
    }
  }

  /// Set the toast auto-dismiss timeout.
  pub fn with_toast_timeout(self, timeout: Duration) -> Self {
    if let Ok(mut inner) = self.inner.lock() {
      inner.toast_timeout = timeout;
    }
    self
  }

  /// Load persisted fields, derive the route from the navigation hash and
  /// write the merged result back once. Call exactly once per session before
  /// any other operation; no subscribers are notified.
  pub fn initialize(&self, hash: &str) {
    let mut inner = self.lock();
    inner.load_persisted();
    inner.state.route = parse_hash(hash);
    inner.persist();
  }

  /// Independent copy of the current state; mutating it never affects the
  /// store.
  pub fn snapshot(&self) -> AppState {
    self.lock().state.clone()
  }

  /// Merge a patch, persist the durable subset, then notify every subscriber
  /// exactly once, in registration order, with the committed snapshot.
  pub fn patch(&self, patch: StatePatch) {
    let (subscribers, snapshot) = {
      let mut inner = self.lock();
      inner.state.apply(patch);
      inner.persist();
      let subscribers: Vec<Subscriber> =
        inner.subscribers.iter().map(|(_, f)| Arc::clone(f)).collect();
      (subscribers, inner.state.clone())
    };
    // The lock is released before dispatch so a callback may patch again;
    // such re-entrant patches serialize behind this one.
    for subscriber in subscribers {
      subscriber(&snapshot);
    }
  }

  /// Register a callback invoked after every committed patch.
  pub fn subscribe(&self, f: impl Fn(&AppState) + Send + Sync + 'static) -> Subscription {
    let id = {
      let mut inner = self.lock();
      let id = inner.next_subscriber;
      inner.next_subscriber += 1;
      inner.subscribers.push((id, Arc::new(f)));
      id
    };
    Subscription {
      id,
      store: self.clone(),
    }
  }

  /// Re-read the persisted keys and notify local subscribers. Called when
  /// another instance sharing the same storage has written to it; route,
  /// query and network status stay per-instance.
  pub fn reload_persisted(&self) {
    let (subscribers, snapshot) = {
      let mut inner = self.lock();
      inner.load_persisted();
      let subscribers: Vec<Subscriber> =
        inner.subscribers.iter().map(|(_, f)| Arc::clone(f)).collect();
      (subscribers, inner.state.clone())
    };
    for subscriber in subscribers {
      subscriber(&snapshot);
    }
  }

  // Derived operations: each one is a plain patch with a computed partial.

  pub fn toggle_theme(&self) {
    let next = self.snapshot().theme.flipped();
    self.patch(StatePatch {
      theme: Some(next),
      ..Default::default()
    });
    let message = match next {
      Theme::Dark => "Dark theme on",
      Theme::Light => "Light theme on",
    };
    self.set_toast(message, ToastKind::Info);
  }

  /// Involution: toggling the same id twice restores the original set.
  pub fn toggle_saved(&self, article_id: &str) {
    let mut saved = self.snapshot().saved;
    if !saved.remove(article_id) {
      saved.insert(article_id.to_string());
    }
    self.patch(StatePatch {
      saved: Some(saved),
      ..Default::default()
    });
  }

  pub fn clear_saved(&self) {
    self.patch(StatePatch {
      saved: Some(Default::default()),
      ..Default::default()
    });
    self.set_toast("Saved list cleared.", ToastKind::Info);
  }

  pub fn set_query(&self, query: &str) {
    self.patch(StatePatch {
      query: Some(query.to_string()),
      ..Default::default()
    });
  }

  pub fn set_sort(&self, sort: crate::state::Sort) {
    self.patch(StatePatch {
      sort: Some(sort),
      ..Default::default()
    });
  }

  /// Parse the hash into the route and collapse all overlays so focus
  /// returns to page content.
  pub fn sync_route(&self, hash: &str) {
    self.patch(StatePatch {
      route: Some(parse_hash(hash)),
      ui: Some(UiPatch::overlays_closed()),
      ..Default::default()
    });
  }

  pub fn close_overlays(&self) {
    self.patch(StatePatch {
      ui: Some(UiPatch::overlays_closed()),
      ..Default::default()
    });
  }

  /// Flip the sections panel; opening it forces the other two overlays shut.
  pub fn toggle_sections(&self) {
    let open = self.snapshot().ui.sections_open;
    self.patch(StatePatch {
      ui: Some(UiPatch {
        sections_open: Some(!open),
        search_open: Some(false),
        subscribe_open: Some(false),
        toast: None,
      }),
      ..Default::default()
    });
  }

  /// Opening search closes the sections panel but deliberately leaves the
  /// subscribe overlay's flag alone.
  pub fn open_search(&self) {
    self.patch(StatePatch {
      ui: Some(UiPatch {
        search_open: Some(true),
        sections_open: Some(false),
        ..Default::default()
      }),
      ..Default::default()
    });
  }

  pub fn open_subscribe(&self) {
    self.patch(StatePatch {
      ui: Some(UiPatch {
        subscribe_open: Some(true),
        sections_open: Some(false),
        ..Default::default()
      }),
      ..Default::default()
    });
  }

  pub fn dismiss_toast(&self) {
    self.patch(StatePatch {
      ui: Some(UiPatch {
        toast: Some(None),
        ..Default::default()
      }),
      ..Default::default()
    });
  }

  /// Clear a surfaced network error back to the ok state.
  pub fn retry(&self) {
    self.patch(StatePatch {
      network: Some(NetworkPatch::status_of(NetworkStatus::Ok, None)),
      ..Default::default()
    });
  }

  /// Remember a newsletter address: trimmed, deduplicated, most-recent-first,
  /// capped. Empty input is ignored.
  pub fn add_newsletter_email(&self, email: &str) {
    let trimmed = email.trim();
    if trimmed.is_empty() {
      return;
    }
    let current = self.snapshot().newsletters;
    let mut emails = Vec::with_capacity(current.emails.len() + 1);
    emails.push(trimmed.to_string());
    emails.extend(current.emails.into_iter().filter(|e| e != trimmed));
    emails.truncate(NEWSLETTER_EMAIL_CAP);
    self.patch(StatePatch {
      newsletters: Some(NewslettersPatch {
        emails: Some(emails),
        last: Some(Some(chrono::Utc::now())),
      }),
      ..Default::default()
    });
  }

  /// Raise a toast with the store's configured timeout.
  pub fn set_toast(&self, message: &str, kind: ToastKind) {
    let timeout = self.lock().toast_timeout;
    self.set_toast_for(message, kind, timeout);
  }

  /// Raise a toast and schedule its auto-dismiss. Only one dismiss timer is
  /// tracked: raising a new toast cancels the previous timer, and a stale
  /// timer that fires anyway is a no-op because its id no longer matches.
  pub fn set_toast_for(&self, message: &str, kind: ToastKind, timeout: Duration) {
    let id = fresh_id();
    self.patch(StatePatch {
      ui: Some(UiPatch {
        toast: Some(Some(Toast {
          id: id.clone(),
          message: message.to_string(),
          kind,
        })),
        ..Default::default()
      }),
      ..Default::default()
    });

    let store = self.clone();
    let handle = tokio::spawn(async move {
      tokio::time::sleep(timeout).await;
      store.clear_toast_if(&id);
    });
    let mut inner = self.lock();
    if let Some(previous) = inner.toast_timer.replace(handle) {
      previous.abort();
    }
  }

  fn clear_toast_if(&self, id: &str) {
    let matches = {
      let inner = self.lock();
      inner
        .state
        .ui
        .toast
        .as_ref()
        .map(|t| t.id == id)
        .unwrap_or(false)
    };
    if matches {
      self.dismiss_toast();
    }
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
    // Subscribers run outside the lock, so the only way to poison it is a
    // panic mid-merge; recover the guard and keep serving.
    match self.inner.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}
