//! Market metadata cache with a single refetch on miss.
//!
//! Holds the venue-wide metadata snapshot (symbol list, tick sizes, token
//! list) for the lifetime of one client instance. A lookup that misses the
//! cached snapshot refetches exactly once; a miss on fresh data is final.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

/// Instance-scoped snapshot cache.
#[derive(Debug)]
pub struct RefreshingCache<T> {
  snapshot: RwLock<Option<Arc<T>>>,
}

impl<T> Default for RefreshingCache<T> {
  fn default() -> Self {
    Self {
      snapshot: RwLock::new(None),
    }
  }
}

impl<T> RefreshingCache<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// The cached snapshot, fetching it if the cache is empty.
  pub async fn get<F, Fut>(&self, fetch: F) -> Result<Arc<T>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    if let Some(snapshot) = self.snapshot.read().await.clone() {
      return Ok(snapshot);
    }
    self.refresh(fetch).await
  }

  /// Replace the snapshot with freshly fetched data.
  pub async fn refresh<F, Fut>(&self, fetch: F) -> Result<Arc<T>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let fresh = Arc::new(fetch().await?);
    *self.snapshot.write().await = Some(Arc::clone(&fresh));
    Ok(fresh)
  }

  /// Look something up in the snapshot.
  ///
  /// Tries the cached snapshot first. On a miss against stale data the
  /// snapshot is refetched once and `find` runs again. Returns `None` when
  /// the entry is absent from fresh data.
  pub async fn lookup<R, F, Fut, L>(&self, fetch: F, find: L) -> Result<Option<R>>
  where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
    L: Fn(&T) -> Option<R>,
  {
    let cached = self.snapshot.read().await.clone();
    let stale = match cached {
      Some(snapshot) => {
        if let Some(found) = find(&snapshot) {
          return Ok(Some(found));
        }
        true
      }
      None => false,
    };

    if stale {
      debug!("Cache miss, refetching market metadata");
    }
    let fresh = self.refresh(&fetch).await?;
    Ok(find(&fresh))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  async fn markets(calls: &AtomicUsize, list: &[&str]) -> Result<Vec<String>> {
    calls.fetch_add(1, Ordering::SeqCst);
    Ok(list.iter().map(ToString::to_string).collect())
  }

  fn position(market: &str) -> impl Fn(&Vec<String>) -> Option<usize> + '_ {
    move |list| list.iter().position(|m| m == market)
  }

  #[tokio::test]
  async fn hit_uses_cache() {
    let cache = RefreshingCache::new();
    let calls = AtomicUsize::new(0);
    let fetch = || markets(&calls, &["BTCUSDT", "ETHUSDT"]);

    assert_eq!(cache.lookup(fetch, position("ETHUSDT")).await.unwrap(), Some(1));
    assert_eq!(cache.lookup(fetch, position("BTCUSDT")).await.unwrap(), Some(0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn stale_miss_refetches_once() {
    let cache = RefreshingCache::new();
    let calls = AtomicUsize::new(0);
    cache.get(|| markets(&calls, &["BTCUSDT"])).await.unwrap();

    let found = cache
      .lookup(|| markets(&calls, &["BTCUSDT", "NEWUSDT"]), position("NEWUSDT"))
      .await
      .unwrap();
    assert_eq!(found, Some(1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn absent_market_does_not_loop() {
    let cache = RefreshingCache::new();
    let calls = AtomicUsize::new(0);
    let fetch = || markets(&calls, &["BTCUSDT"]);

    cache.get(fetch).await.unwrap();
    assert_eq!(cache.lookup(fetch, position("NOPE")).await.unwrap(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn cold_miss_fetches_once() {
    let cache = RefreshingCache::new();
    let calls = AtomicUsize::new(0);
    let fetch = || markets(&calls, &["BTCUSDT"]);
    assert_eq!(cache.lookup(fetch, position("NOPE")).await.unwrap(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
