//! Navigation hash grammar.
//!
//! The grammar is intentionally minimal: `#/` is home, `#/section/<id>` and
//! `#/article/<id>` carry one parameter each, `#/saved`, `#/about` and
//! `#/help` are fixed views, and anything else resolves to the not-found view.
//! There are no query parameters and no nested routes.

use serde::{Deserialize, Serialize};

/// Which view is currently displayed, with its parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Route {
  #[default]
  Home,
  Section {
    section: String,
  },
  Article {
    id: String,
  },
  Saved,
  About,
  Help,
  NotFound,
}

impl Route {
  /// Stable key for comparing navigation targets (used to detect whether a
  /// deferred route-load still applies to the current route).
  pub fn key(&self) -> String {
    match self {
      Route::Home => "home::".to_string(),
      Route::Section { section } => format!("section:{}:", section),
      Route::Article { id } => format!("article::{}", id),
      Route::Saved => "saved::".to_string(),
      Route::About => "about::".to_string(),
      Route::Help => "help::".to_string(),
      Route::NotFound => "notfound::".to_string(),
    }
  }

  /// Short label for status output.
  pub fn label(&self) -> String {
    match self {
      Route::Home => "home".to_string(),
      Route::Section { section } => format!("section/{}", section),
      Route::Article { id } => format!("article/{}", id),
      Route::Saved => "saved".to_string(),
      Route::About => "about".to_string(),
      Route::Help => "help".to_string(),
      Route::NotFound => "notfound".to_string(),
    }
  }
}

/// Parse a navigation hash into a route.
///
/// Empty input behaves like `#/`. Only the first two path segments are
/// significant; empty segments are dropped.
pub fn parse_hash(hash: &str) -> Route {
  let raw = if hash.is_empty() { "#/" } else { hash };
  let raw = raw.strip_prefix('#').unwrap_or(raw);
  let parts: Vec<&str> = raw.split('/').filter(|p| !p.is_empty()).collect();

  match (parts.first().copied(), parts.get(1).copied()) {
    (None, _) => Route::Home,
    (Some("section"), Some(id)) => Route::Section {
      section: id.to_string(),
    },
    (Some("article"), Some(id)) => Route::Article { id: id.to_string() },
    (Some("saved"), _) => Route::Saved,
    (Some("about"), _) => Route::About,
    (Some("help"), _) => Route::Help,
    _ => Route::NotFound,
  }
}
