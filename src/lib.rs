pub mod cache;
pub mod commands;
pub mod config;
pub mod event;
pub mod route;
pub mod shell;
pub mod state;
pub mod storage;
pub mod store;

pub use cache::{CacheHandle, CacheStore, CacheWorker, CachedResponse, SqliteCacheStore};
pub use config::Config;
pub use route::{parse_hash, Route};
pub use state::{AppState, StatePatch, Theme, Toast, ToastKind};
pub use storage::{FileStorage, MemoryStorage, StateStorage};
pub use store::{Store, Subscription};
