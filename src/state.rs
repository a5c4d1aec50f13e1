//! Application state and the patch/merge rule.
//!
//! All mutable session state lives in one [`AppState`] value owned by the
//! store. Writes go through [`StatePatch`]: top-level fields replace, while
//! the `ui`, `article_ui`, `newsletters` and `network` groups merge
//! field-by-field so a patch can touch one flag without clobbering its
//! siblings. The route is a discriminated enum, so a route patch replaces the
//! whole variant.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::route::Route;

/// Upper bound on remembered newsletter addresses, most-recent-first.
pub const NEWSLETTER_EMAIL_CAP: usize = 40;

/// Color scheme, persisted across sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  #[default]
  Light,
  Dark,
}

impl Theme {
  pub fn flipped(self) -> Self {
    match self {
      Theme::Light => Theme::Dark,
      Theme::Dark => Theme::Light,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Theme::Light => "light",
      Theme::Dark => "dark",
    }
  }
}

/// Article list ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
  #[default]
  New,
  Read,
}

impl std::str::FromStr for Sort {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "new" => Ok(Sort::New),
      "read" => Ok(Sort::Read),
      other => Err(format!("unknown sort order: {}", other)),
    }
  }
}

/// Severity of a transient notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
  #[default]
  Info,
  Success,
  Error,
}

/// A transient, auto-dismissing user notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
  /// Unique per raise; the auto-dismiss timer only clears a toast whose id
  /// still matches the one it was scheduled for.
  pub id: String,
  pub message: String,
  pub kind: ToastKind,
}

/// Transient overlay flags and the current toast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ui {
  pub sections_open: bool,
  pub search_open: bool,
  pub subscribe_open: bool,
  pub toast: Option<Toast>,
}

/// Per-article view state. Deliberately not reset on navigation: the active
/// tab carries over to the next article visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleUi {
  pub tab: String,
  pub toc_open: bool,
}

impl Default for ArticleUi {
  fn default() -> Self {
    Self {
      tab: "imaging".to_string(),
      toc_open: false,
    }
  }
}

/// Newsletter subscription record, persisted across sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Newsletters {
  /// Most-recent-first, no duplicates, capped at [`NEWSLETTER_EMAIL_CAP`].
  #[serde(default)]
  pub emails: Vec<String>,
  #[serde(default)]
  pub last: Option<DateTime<Utc>>,
}

/// Simulated network status for the route-load affordance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
  #[default]
  Ok,
  Loading,
  Error,
}

impl NetworkStatus {
  pub fn label(self) -> &'static str {
    match self {
      NetworkStatus::Ok => "ok",
      NetworkStatus::Loading => "loading",
      NetworkStatus::Error => "error",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Network {
  pub status: NetworkStatus,
  pub message: Option<String>,
}

/// The single process-wide application state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
  pub route: Route,
  pub query: String,
  pub sort: Sort,
  pub ui: Ui,
  pub article_ui: ArticleUi,
  pub theme: Theme,
  pub saved: BTreeSet<String>,
  pub newsletters: Newsletters,
  pub network: Network,
}

/// Partial update for [`Ui`]; unset fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct UiPatch {
  pub sections_open: Option<bool>,
  pub search_open: Option<bool>,
  pub subscribe_open: Option<bool>,
  /// `Some(None)` clears the toast, `Some(Some(..))` replaces it.
  pub toast: Option<Option<Toast>>,
}

impl UiPatch {
  /// Closes all three overlay flags, leaving the toast alone.
  pub fn overlays_closed() -> Self {
    Self {
      sections_open: Some(false),
      search_open: Some(false),
      subscribe_open: Some(false),
      toast: None,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct ArticleUiPatch {
  pub tab: Option<String>,
  pub toc_open: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct NewslettersPatch {
  pub emails: Option<Vec<String>>,
  pub last: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkPatch {
  pub status: Option<NetworkStatus>,
  pub message: Option<Option<String>>,
}

impl NetworkPatch {
  pub fn status_of(status: NetworkStatus, message: Option<&str>) -> Self {
    Self {
      status: Some(status),
      message: Some(message.map(str::to_string)),
    }
  }
}

/// A proposed merge into the state. Fields left as `None` are untouched.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
  pub route: Option<Route>,
  pub query: Option<String>,
  pub sort: Option<Sort>,
  pub ui: Option<UiPatch>,
  pub article_ui: Option<ArticleUiPatch>,
  pub theme: Option<Theme>,
  pub saved: Option<BTreeSet<String>>,
  pub newsletters: Option<NewslettersPatch>,
  pub network: Option<NetworkPatch>,
}

impl AppState {
  /// Apply a patch in place. Top-level keys replace; the four nested groups
  /// merge one level deep.
  pub fn apply(&mut self, patch: StatePatch) {
    if let Some(route) = patch.route {
      self.route = route;
    }
    if let Some(query) = patch.query {
      self.query = query;
    }
    if let Some(sort) = patch.sort {
      self.sort = sort;
    }
    if let Some(theme) = patch.theme {
      self.theme = theme;
    }
    if let Some(saved) = patch.saved {
      self.saved = saved;
    }
    if let Some(ui) = patch.ui {
      if let Some(v) = ui.sections_open {
        self.ui.sections_open = v;
      }
      if let Some(v) = ui.search_open {
        self.ui.search_open = v;
      }
      if let Some(v) = ui.subscribe_open {
        self.ui.subscribe_open = v;
      }
      if let Some(v) = ui.toast {
        self.ui.toast = v;
      }
    }
    if let Some(article_ui) = patch.article_ui {
      if let Some(v) = article_ui.tab {
        self.article_ui.tab = v;
      }
      if let Some(v) = article_ui.toc_open {
        self.article_ui.toc_open = v;
      }
    }
    if let Some(newsletters) = patch.newsletters {
      if let Some(v) = newsletters.emails {
        self.newsletters.emails = v;
      }
      if let Some(v) = newsletters.last {
        self.newsletters.last = v;
      }
    }
    if let Some(network) = patch.network {
      if let Some(v) = network.status {
        self.network.status = v;
      }
      if let Some(v) = network.message {
        self.network.message = v;
      }
    }
  }
}

static ID_SEQ: AtomicU64 = AtomicU64::new(0);

/// Process-unique identifier for toasts and tip records.
pub(crate) fn fresh_id() -> String {
  let seq = ID_SEQ.fetch_add(1, Ordering::Relaxed);
  let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
  format!("{:x}-{:x}", nanos, seq)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::route::parse_hash;

  #[test]
  fn test_empty_patch_is_identity() {
    let mut state = AppState::default();
    state.query = "devices".to_string();
    state.saved.insert("a1".to_string());
    let before = state.clone();

    state.apply(StatePatch::default());
    assert_eq!(state, before);
  }

  #[test]
  fn test_top_level_replace() {
    let mut state = AppState::default();
    state.apply(StatePatch {
      query: Some("synthetic data".to_string()),
      sort: Some(Sort::Read),
      theme: Some(Theme::Dark),
      ..Default::default()
    });
    assert_eq!(state.query, "synthetic data");
    assert_eq!(state.sort, Sort::Read);
    assert_eq!(state.theme, Theme::Dark);
    // Untouched groups keep their defaults.
    assert_eq!(state.ui, Ui::default());
  }

  #[test]
  fn test_nested_merge_preserves_unrelated_flags() {
    let mut state = AppState::default();
    state.apply(StatePatch {
      ui: Some(UiPatch {
        search_open: Some(true),
        ..Default::default()
      }),
      ..Default::default()
    });
    state.apply(StatePatch {
      ui: Some(UiPatch {
        subscribe_open: Some(true),
        ..Default::default()
      }),
      ..Default::default()
    });

    assert!(!state.ui.sections_open);
    assert!(state.ui.search_open);
    assert!(state.ui.subscribe_open);
    assert!(state.ui.toast.is_none());
  }

  #[test]
  fn test_route_patch_replaces_variant() {
    let mut state = AppState::default();
    state.apply(StatePatch {
      route: Some(parse_hash("#/article/ai-medicine-research")),
      ..Default::default()
    });
    assert_eq!(
      state.route,
      Route::Article {
        id: "ai-medicine-research".to_string()
      }
    );
    state.apply(StatePatch {
      route: Some(parse_hash("#/")),
      ..Default::default()
    });
    assert_eq!(state.route, Route::Home);
  }

  #[test]
  fn test_toast_clear_requires_explicit_some_none() {
    let mut state = AppState::default();
    let toast = Toast {
      id: fresh_id(),
      message: "Saved.".to_string(),
      kind: ToastKind::Info,
    };
    state.apply(StatePatch {
      ui: Some(UiPatch {
        toast: Some(Some(toast.clone())),
        ..Default::default()
      }),
      ..Default::default()
    });
    // A patch that does not mention the toast leaves it in place.
    state.apply(StatePatch {
      ui: Some(UiPatch {
        sections_open: Some(true),
        ..Default::default()
      }),
      ..Default::default()
    });
    assert_eq!(state.ui.toast, Some(toast));

    state.apply(StatePatch {
      ui: Some(UiPatch {
        toast: Some(None),
        ..Default::default()
      }),
      ..Default::default()
    });
    assert!(state.ui.toast.is_none());
  }

  #[test]
  fn test_article_ui_default_tab() {
    let article_ui = ArticleUi::default();
    assert_eq!(article_ui.tab, "imaging");
    assert!(!article_ui.toc_open);
  }

  #[test]
  fn test_fresh_ids_are_unique() {
    let a = fresh_id();
    let b = fresh_id();
    assert_ne!(a, b);
  }
}
