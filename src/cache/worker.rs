//! The cache worker: lifecycle state machine and fetch dispatch.

use std::sync::{Arc, Mutex};

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;

use super::fetch::Fetch;
use super::store::{CacheStore, CachedResponse};

/// Worker lifecycle. A new version starts at `Installing` and supersedes the
/// previous generation once it reaches `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  Installing,
  Installed,
  Activating,
  Active,
}

/// One intercepted request, answered over a oneshot channel.
struct FetchEvent {
  method: Method,
  url: String,
  reply: oneshot::Sender<Result<CachedResponse>>,
}

/// Versioned cache-first fetch interceptor.
///
/// Owns a cache store and a fetcher; shares no memory with the state store.
pub struct CacheWorker<S: CacheStore, F: Fetch> {
  store: S,
  fetch: F,
  version: String,
  manifest: Vec<String>,
  origin: Url,
  phase: Mutex<Lifecycle>,
}

impl<S: CacheStore + 'static, F: Fetch> CacheWorker<S, F> {
  /// `manifest` holds the absolute URLs of the core assets; `origin` bounds
  /// which responses are cached opportunistically.
  pub fn new(store: S, fetch: F, version: &str, manifest: Vec<String>, origin: Url) -> Self {
    Self {
      store,
      fetch,
      version: version.to_string(),
      manifest,
      origin,
      phase: Mutex::new(Lifecycle::Installing),
    }
  }

  /// Name of the current cache generation; embeds the version tag.
  pub fn cache_name(&self) -> String {
    format!("offprint-cache-{}", self.version)
  }

  pub fn phase(&self) -> Lifecycle {
    *self.phase.lock().unwrap_or_else(|p| p.into_inner())
  }

  fn set_phase(&self, phase: Lifecycle) {
    *self.phase.lock().unwrap_or_else(|p| p.into_inner()) = phase;
  }

  /// Whether the current generation already holds entries, i.e. this version
  /// was installed by a previous run.
  pub fn is_installed(&self) -> Result<bool> {
    Ok(
      self
        .store
        .list_generations()?
        .contains(&self.cache_name()),
    )
  }

  /// Populate the current generation from the core-asset manifest.
  ///
  /// All-or-nothing: every entry must fetch with a success status before
  /// anything is stored. On failure the previous generation is untouched and
  /// keeps serving.
  pub async fn install(&self) -> Result<()> {
    self.set_phase(Lifecycle::Installing);

    let mut fetched = Vec::with_capacity(self.manifest.len());
    for entry in &self.manifest {
      let response = self
        .fetch
        .fetch(Method::GET, entry)
        .await
        .map_err(|e| eyre!("Install fetch failed for {}: {}", entry, e))?;
      if !response.is_success() {
        return Err(eyre!(
          "Install fetch for {} returned status {}",
          entry,
          response.status
        ));
      }
      fetched.push(response);
    }

    let generation = self.cache_name();
    for response in &fetched {
      if let Err(e) = self.store.put(&generation, response) {
        // Clear any rows already written so a half-populated generation
        // never passes the is_installed check on a later run.
        if let Err(rollback) = self.store.delete_generation(&generation) {
          warn!(generation, error = %rollback, "failed to clear partial cache generation");
        }
        return Err(e);
      }
    }

    self.set_phase(Lifecycle::Installed);
    info!(generation, assets = fetched.len(), "cache generation installed");
    Ok(())
  }

  /// Delete every generation other than the current one, then take over.
  pub fn activate(&self) -> Result<()> {
    self.set_phase(Lifecycle::Activating);

    let keep = self.cache_name();
    for name in self.store.list_generations()? {
      if name != keep {
        self.store.delete_generation(&name)?;
        info!(generation = %name, "deleted superseded cache generation");
      }
    }

    self.set_phase(Lifecycle::Active);
    info!(generation = %keep, "cache worker active");
    Ok(())
  }

  /// Serve one request. GETs go cache-first; everything else passes straight
  /// through to the network with no cache involvement.
  pub async fn handle_fetch(&self, method: Method, url: &str) -> Result<CachedResponse> {
    if method != Method::GET {
      return self.fetch.fetch(method, url).await;
    }

    let generation = self.cache_name();
    match self.store.get(&generation, url) {
      Ok(Some(hit)) => {
        debug!(%url, "cache hit");
        return Ok(hit);
      }
      Ok(None) => {}
      Err(e) => warn!(%url, error = %e, "cache lookup failed"),
    }

    match self.fetch.fetch(method, url).await {
      Ok(response) => {
        if response.is_success() && self.same_origin(url) {
          // Best effort: a failed write never fails the in-flight response.
          if let Err(e) = self.store.put(&generation, &response) {
            warn!(%url, error = %e, "failed to cache response");
          }
        }
        Ok(response)
      }
      Err(err) => {
        if let Ok(Some(hit)) = self.store.get(&generation, url) {
          return Ok(hit);
        }
        debug!(%url, error = %err, "network unavailable, serving offline placeholder");
        Ok(CachedResponse::offline_placeholder(url))
      }
    }
  }

  fn same_origin(&self, url: &str) -> bool {
    Url::parse(url)
      .map(|u| u.origin() == self.origin.origin())
      .unwrap_or(false)
  }

  /// Event loop: each fetch event is handled on its own task, so distinct
  /// requests suspend independently with no ordering between them.
  async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<FetchEvent>) {
    while let Some(event) = rx.recv().await {
      let worker = Arc::clone(&self);
      tokio::spawn(async move {
        let result = worker.handle_fetch(event.method, &event.url).await;
        // Ignore send errors - the requester may have gone away
        let _ = event.reply.send(result);
      });
    }
  }
}

/// Request side of a running worker. Cheap to clone.
#[derive(Clone)]
pub struct CacheHandle {
  tx: mpsc::UnboundedSender<FetchEvent>,
}

impl CacheHandle {
  /// Route a request through the worker and await its response.
  pub async fn fetch(&self, method: Method, url: &str) -> Result<CachedResponse> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(FetchEvent {
        method,
        url: url.to_string(),
        reply,
      })
      .map_err(|_| eyre!("Cache worker has stopped"))?;
    rx.await.map_err(|_| eyre!("Cache worker dropped request"))?
  }
}

/// Move the worker onto its own task and return the request handle.
pub fn spawn<S: CacheStore + 'static, F: Fetch>(worker: CacheWorker<S, F>) -> CacheHandle {
  let (tx, rx) = mpsc::unbounded_channel();
  tokio::spawn(Arc::new(worker).run(rx));
  CacheHandle { tx }
}
