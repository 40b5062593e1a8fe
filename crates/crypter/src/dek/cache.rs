//! [`DekCache`]: bounded, TTL-based cache of unwrapped DEKs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use common::CrypterError;
use moka::future::Cache;

use super::DekBytes;
use crate::crypto::KEY_LEN;

/// How long an unwrapped DEK stays usable without another key-service call.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Total cost budget of the cache. Entry cost is wrapped length + key length,
/// so this is roughly a byte budget.
pub const DEFAULT_MAX_COST: u64 = 10_000_000;

/// Concurrent cache mapping wrapped-DEK bytes to the unwrapped DEK.
///
/// Backed by [`moka`], so reads and inserts from many tasks never block each
/// other and eviction under the cost budget is approximate. Entries expire
/// `ttl` after insertion. The provider's *current* DEK is never stored here.
#[derive(Clone)]
pub struct DekCache {
    inner: Cache<Bytes, DekBytes>,
}

impl DekCache {
    /// Create an empty cache.
    pub fn new(ttl: Duration, max_cost: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_cost)
            .weigher(|wrapped: &Bytes, _dek: &DekBytes| -> u32 {
                u32::try_from(wrapped.len() + KEY_LEN).unwrap_or(u32::MAX)
            })
            .time_to_live(ttl)
            .build();
        Self { inner }
    }

    /// Look up the unwrapped DEK for `wrapped_dek`.
    ///
    /// Expired entries are never returned.
    pub async fn get(&self, wrapped_dek: &[u8]) -> Option<DekBytes> {
        self.inner.get(wrapped_dek).await
    }

    /// Insert (or refresh) the unwrapped DEK for `wrapped_dek`.
    pub async fn insert(&self, wrapped_dek: &[u8], dek: DekBytes) {
        self.inner
            .insert(Bytes::copy_from_slice(wrapped_dek), dek)
            .await;
    }

    /// Look up the DEK for `wrapped_dek`, running `unwrap` to produce it on a
    /// miss. The flag is `true` when this call inserted the entry.
    ///
    /// Concurrent misses for the same wrapped DEK share a single `unwrap`;
    /// the others wait for its result. A failed `unwrap` is not cached and its
    /// error is handed to every waiter.
    pub async fn get_or_try_insert_with<F>(
        &self,
        wrapped_dek: &[u8],
        unwrap: F,
    ) -> Result<(DekBytes, bool), Arc<CrypterError>>
    where
        F: Future<Output = Result<DekBytes, CrypterError>>,
    {
        let entry = self
            .inner
            .entry(Bytes::copy_from_slice(wrapped_dek))
            .or_try_insert_with(unwrap)
            .await?;
        let fresh = entry.is_fresh();
        Ok((entry.into_value(), fresh))
    }

    /// Drop the entry for `wrapped_dek`, if any.
    pub async fn invalidate(&self, wrapped_dek: &[u8]) {
        self.inner.invalidate(wrapped_dek).await;
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Apply pending evictions and expirations now.
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl Default for DekCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_COST)
    }
}

impl std::fmt::Debug for DekCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DekCache")
            .field("entries", &self.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dek(fill: u8) -> DekBytes {
        DekBytes::from_slice(&[fill; KEY_LEN], "DEK").unwrap()
    }

    #[tokio::test]
    async fn initially_empty() {
        let cache = DekCache::default();
        assert!(cache.get(b"wrapped").await.is_none());
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn insert_and_get() {
        let cache = DekCache::default();
        cache.insert(b"wrapped-1", dek(1)).await;
        cache.insert(b"wrapped-2", dek(2)).await;

        assert_eq!(cache.get(b"wrapped-1").await.unwrap().as_bytes(), &[1u8; KEY_LEN]);
        assert_eq!(cache.get(b"wrapped-2").await.unwrap().as_bytes(), &[2u8; KEY_LEN]);
        assert!(cache.get(b"wrapped-3").await.is_none());

        cache.run_pending_tasks().await;
        assert_eq!(cache.entry_count(), 2);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = DekCache::new(Duration::from_millis(100), DEFAULT_MAX_COST);
        cache.insert(b"wrapped", dek(7)).await;
        assert!(cache.get(b"wrapped").await.is_some());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(cache.get(b"wrapped").await.is_none());
    }

    #[tokio::test]
    async fn unwraps_only_on_miss() {
        let cache = DekCache::default();

        let (first, fresh) = cache
            .get_or_try_insert_with(b"wrapped", async { Ok(dek(3)) })
            .await
            .unwrap();
        assert!(fresh);
        assert_eq!(first.as_bytes(), &[3u8; KEY_LEN]);

        let (second, fresh) = cache
            .get_or_try_insert_with(b"wrapped", async { Ok(dek(9)) })
            .await
            .unwrap();
        assert!(!fresh);
        assert_eq!(second.as_bytes(), &[3u8; KEY_LEN]);

        cache.invalidate(b"wrapped").await;
        assert!(cache.get(b"wrapped").await.is_none());
    }

    #[tokio::test]
    async fn failed_unwrap_is_not_stored() {
        let cache = DekCache::default();
        let err = cache
            .get_or_try_insert_with(b"wrapped", async { Err(CrypterError::Timeout { service: "kms" }) })
            .await
            .unwrap_err();
        assert!(matches!(*err, CrypterError::Timeout { service: "kms" }));
        assert!(cache.get(b"wrapped").await.is_none());
    }

    #[tokio::test]
    async fn cost_budget_bounds_growth() {
        // Each entry costs 4 + 32 = 36; the budget holds at most two.
        let cache = DekCache::new(DEFAULT_TTL, 80);
        for i in 0u8..20 {
            cache.insert(&[i, i, i, i], dek(i)).await;
        }
        cache.run_pending_tasks().await;
        assert!(cache.entry_count() <= 2);
    }
}
