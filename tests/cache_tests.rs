use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use url::Url;

use offprint::cache::{
  spawn, CacheStore, CacheWorker, CachedResponse, Fetch, Lifecycle, SqliteCacheStore,
};

const ORIGIN: &str = "http://localhost:8000";

/// Scripted network: serves configured routes unless switched offline.
#[derive(Clone)]
struct FakeFetch {
  inner: Arc<FakeFetchInner>,
}

struct FakeFetchInner {
  routes: Mutex<HashMap<String, CachedResponse>>,
  offline: AtomicBool,
  requests: AtomicUsize,
}

impl FakeFetch {
  fn new() -> Self {
    Self {
      inner: Arc::new(FakeFetchInner {
        routes: Mutex::new(HashMap::new()),
        offline: AtomicBool::new(false),
        requests: AtomicUsize::new(0),
      }),
    }
  }

  fn route(&self, url: &str, status: u16, body: &[u8]) {
    self.inner.routes.lock().unwrap().insert(
      url.to_string(),
      CachedResponse {
        url: url.to_string(),
        status,
        content_type: "text/html".to_string(),
        body: body.to_vec(),
      },
    );
  }

  fn set_offline(&self, offline: bool) {
    self.inner.offline.store(offline, Ordering::SeqCst);
  }

  fn request_count(&self) -> usize {
    self.inner.requests.load(Ordering::SeqCst)
  }
}

impl Fetch for FakeFetch {
  fn fetch(&self, _method: Method, url: &str) -> impl Future<Output = Result<CachedResponse>> + Send {
    self.inner.requests.fetch_add(1, Ordering::SeqCst);
    let result = if self.inner.offline.load(Ordering::SeqCst) {
      Err(eyre!("network unreachable"))
    } else {
      self
        .inner
        .routes
        .lock()
        .unwrap()
        .get(url)
        .cloned()
        .ok_or_else(|| eyre!("connection refused for {}", url))
    };
    async move { result }
  }
}

/// Store whose writes start failing after a budget of successful puts.
/// Reads and deletes pass through untouched.
struct FailingPutStore {
  inner: Arc<SqliteCacheStore>,
  puts_left: AtomicUsize,
}

impl FailingPutStore {
  fn failing_after(inner: Arc<SqliteCacheStore>, successful_puts: usize) -> Self {
    Self {
      inner,
      puts_left: AtomicUsize::new(successful_puts),
    }
  }
}

impl CacheStore for FailingPutStore {
  fn put(&self, generation: &str, response: &CachedResponse) -> Result<()> {
    let allowed = self
      .puts_left
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if !allowed {
      return Err(eyre!("disk full"));
    }
    self.inner.put(generation, response)
  }

  fn get(&self, generation: &str, url: &str) -> Result<Option<CachedResponse>> {
    self.inner.get(generation, url)
  }

  fn list_generations(&self) -> Result<Vec<String>> {
    self.inner.list_generations()
  }

  fn delete_generation(&self, generation: &str) -> Result<()> {
    self.inner.delete_generation(generation)
  }
}

fn asset(path: &str) -> String {
  format!("{}{}", ORIGIN, path)
}

fn worker_for(
  store: Arc<SqliteCacheStore>,
  fetch: FakeFetch,
  version: &str,
  manifest: &[&str],
) -> CacheWorker<Arc<SqliteCacheStore>, FakeFetch> {
  CacheWorker::new(
    store,
    fetch,
    version,
    manifest.iter().map(|p| asset(p)).collect(),
    Url::parse(ORIGIN).unwrap(),
  )
}

#[tokio::test]
async fn install_populates_manifest_and_serves_offline() {
  let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
  let fetch = FakeFetch::new();
  fetch.route(&asset("/"), 200, b"<html>home</html>");
  fetch.route(&asset("/styles.css"), 200, b"body{}");

  let worker = worker_for(store, fetch.clone(), "v1", &["/", "/styles.css"]);
  assert_eq!(worker.phase(), Lifecycle::Installing);
  worker.install().await.unwrap();
  assert_eq!(worker.phase(), Lifecycle::Installed);
  worker.activate().unwrap();
  assert_eq!(worker.phase(), Lifecycle::Active);

  let installed_requests = fetch.request_count();
  fetch.set_offline(true);

  // Cached byte-identical, with no network access.
  let response = worker.handle_fetch(Method::GET, &asset("/")).await.unwrap();
  assert_eq!(response.status, 200);
  assert_eq!(response.body, b"<html>home</html>");
  assert_eq!(fetch.request_count(), installed_requests);
}

#[tokio::test]
async fn install_is_all_or_nothing() {
  let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
  // A previous generation keeps serving if the new install fails.
  store
    .put(
      "offprint-cache-v1",
      &CachedResponse {
        url: asset("/"),
        status: 200,
        content_type: "text/html".to_string(),
        body: b"old".to_vec(),
      },
    )
    .unwrap();

  let fetch = FakeFetch::new();
  fetch.route(&asset("/"), 200, b"new");
  // "/app.js" has no route, so its install fetch fails.
  let worker = worker_for(store.clone(), fetch, "v2", &["/", "/app.js"]);

  assert!(worker.install().await.is_err());
  assert_eq!(
    store.list_generations().unwrap(),
    vec!["offprint-cache-v1".to_string()]
  );
  assert!(store.get("offprint-cache-v2", &asset("/")).unwrap().is_none());
}

#[tokio::test]
async fn install_rejects_non_success_status() {
  let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
  let fetch = FakeFetch::new();
  fetch.route(&asset("/"), 500, b"oops");

  let worker = worker_for(store.clone(), fetch, "v1", &["/"]);
  assert!(worker.install().await.is_err());
  assert!(store.list_generations().unwrap().is_empty());
}

#[tokio::test]
async fn failed_install_write_rolls_back_the_partial_generation() {
  let sqlite = Arc::new(SqliteCacheStore::in_memory().unwrap());
  sqlite
    .put(
      "offprint-cache-v1",
      &CachedResponse {
        url: asset("/"),
        status: 200,
        content_type: "text/html".to_string(),
        body: b"v1 home".to_vec(),
      },
    )
    .unwrap();

  let fetch = FakeFetch::new();
  fetch.route(&asset("/"), 200, b"v2 home");
  fetch.route(&asset("/app.js"), 200, b"app");

  // The second manifest write fails, after the first row already landed.
  let store = Arc::new(FailingPutStore::failing_after(sqlite.clone(), 1));
  let worker = CacheWorker::new(
    store,
    fetch,
    "v2",
    vec![asset("/"), asset("/app.js")],
    Url::parse(ORIGIN).unwrap(),
  );

  assert!(worker.install().await.is_err());
  // The half-written generation is gone, so a later run does not mistake
  // this version for installed and activate over the healthy one.
  assert!(!worker.is_installed().unwrap());
  assert_eq!(
    sqlite.list_generations().unwrap(),
    vec!["offprint-cache-v1".to_string()]
  );
}

#[tokio::test]
async fn failed_cache_write_does_not_fail_the_fetch() {
  let sqlite = Arc::new(SqliteCacheStore::in_memory().unwrap());
  let store = Arc::new(FailingPutStore::failing_after(sqlite.clone(), 0));
  let fetch = FakeFetch::new();
  fetch.route(&asset("/article/a1"), 200, b"article body");

  let worker = CacheWorker::new(store, fetch, "v1", vec![], Url::parse(ORIGIN).unwrap());
  let response = worker
    .handle_fetch(Method::GET, &asset("/article/a1"))
    .await
    .unwrap();
  assert_eq!(response.status, 200);
  assert_eq!(response.body, b"article body");
  assert!(sqlite
    .get("offprint-cache-v1", &asset("/article/a1"))
    .unwrap()
    .is_none());
}

#[tokio::test]
async fn activating_v2_deletes_v1_wholesale() {
  let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
  let fetch = FakeFetch::new();
  fetch.route(&asset("/"), 200, b"v1 home");

  let v1 = worker_for(store.clone(), fetch.clone(), "v1", &["/"]);
  v1.install().await.unwrap();
  v1.activate().unwrap();

  fetch.route(&asset("/"), 200, b"v2 home");
  let v2 = worker_for(store.clone(), fetch.clone(), "v2", &["/"]);
  v2.install().await.unwrap();
  v2.activate().unwrap();

  assert_eq!(
    store.list_generations().unwrap(),
    vec!["offprint-cache-v2".to_string()]
  );
  assert!(store.get("offprint-cache-v1", &asset("/")).unwrap().is_none());

  // is_installed reflects the surviving generation.
  assert!(v2.is_installed().unwrap());
  assert!(!v1.is_installed().unwrap());
}

#[tokio::test]
async fn cache_miss_fetches_and_caches_same_origin() {
  let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
  let fetch = FakeFetch::new();
  fetch.route(&asset("/article/a1"), 200, b"article body");

  let worker = worker_for(store, fetch.clone(), "v1", &[]);
  worker.install().await.unwrap();
  worker.activate().unwrap();

  let first = worker
    .handle_fetch(Method::GET, &asset("/article/a1"))
    .await
    .unwrap();
  assert_eq!(first.body, b"article body");

  // Second hit is served from cache even with the network down.
  fetch.set_offline(true);
  let second = worker
    .handle_fetch(Method::GET, &asset("/article/a1"))
    .await
    .unwrap();
  assert_eq!(second, first);
}

#[tokio::test]
async fn cross_origin_responses_are_not_cached() {
  let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
  let fetch = FakeFetch::new();
  fetch.route("https://cdn.example.com/lib.js", 200, b"lib");

  let worker = worker_for(store, fetch.clone(), "v1", &[]);
  let live = worker
    .handle_fetch(Method::GET, "https://cdn.example.com/lib.js")
    .await
    .unwrap();
  assert_eq!(live.body, b"lib");

  fetch.set_offline(true);
  let offline = worker
    .handle_fetch(Method::GET, "https://cdn.example.com/lib.js")
    .await
    .unwrap();
  assert_eq!(offline.status, 503);
  assert_eq!(offline.body, b"Offline.");
}

#[tokio::test]
async fn non_success_responses_are_returned_but_not_cached() {
  let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
  let fetch = FakeFetch::new();
  fetch.route(&asset("/missing"), 404, b"not found");

  let worker = worker_for(store.clone(), fetch, "v1", &[]);
  let response = worker
    .handle_fetch(Method::GET, &asset("/missing"))
    .await
    .unwrap();
  assert_eq!(response.status, 404);
  assert!(store
    .get("offprint-cache-v1", &asset("/missing"))
    .unwrap()
    .is_none());
}

#[tokio::test]
async fn network_failure_without_cache_yields_placeholder() {
  let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
  let fetch = FakeFetch::new();
  fetch.set_offline(true);

  let worker = worker_for(store, fetch, "v1", &[]);
  let response = worker
    .handle_fetch(Method::GET, &asset("/never-seen"))
    .await
    .unwrap();
  assert_eq!(response.status, 503);
  assert_eq!(response.content_type, "text/plain; charset=utf-8");
  assert_eq!(response.body, b"Offline.");
}

#[tokio::test]
async fn non_get_requests_bypass_the_cache() {
  let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
  // A cached GET for the same URL must not answer a POST.
  store
    .put(
      "offprint-cache-v1",
      &CachedResponse {
        url: asset("/subscribe"),
        status: 200,
        content_type: "text/html".to_string(),
        body: b"cached".to_vec(),
      },
    )
    .unwrap();

  let fetch = FakeFetch::new();
  fetch.route(&asset("/subscribe"), 201, b"created");

  let worker = worker_for(store.clone(), fetch.clone(), "v1", &[]);
  let response = worker
    .handle_fetch(Method::POST, &asset("/subscribe"))
    .await
    .unwrap();
  assert_eq!(response.status, 201);
  assert_eq!(response.body, b"created");

  // And a failing non-GET propagates the error instead of a placeholder.
  fetch.set_offline(true);
  assert!(worker
    .handle_fetch(Method::POST, &asset("/subscribe"))
    .await
    .is_err());
}

#[tokio::test]
async fn spawned_worker_answers_over_the_channel() {
  let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
  let fetch = FakeFetch::new();
  fetch.route(&asset("/"), 200, b"home");

  let worker = worker_for(store, fetch.clone(), "v1", &["/"]);
  worker.install().await.unwrap();
  worker.activate().unwrap();
  let handle = spawn(worker);

  fetch.set_offline(true);
  let response = handle.fetch(Method::GET, &asset("/")).await.unwrap();
  assert_eq!(response.body, b"home");

  // Distinct requests are served independently.
  let miss = handle.fetch(Method::GET, &asset("/other")).await.unwrap();
  assert_eq!(miss.status, 503);
}
