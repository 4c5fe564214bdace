use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

use crate::core::UserId;
use crate::recommender::RankedPost;

pub struct Cache<K, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> Cache<K, V> {
    /// A zero capacity is bumped to one entry.
    pub fn new(capacity: usize) -> Self {
        Cache {
            inner: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.inner.put(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Last successfully computed ranking of a user, with the snapshot version it
/// was scored against.
#[derive(Debug, Clone)]
pub struct CachedRanking {
    pub snapshot_version: u64,
    pub ranked: Vec<RankedPost>,
}

/// Last-good rankings served when a fresh computation times out.
pub struct RankingCache {
    inner: Mutex<Cache<UserId, CachedRanking>>,
}

impl RankingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Cache::new(capacity)),
        }
    }

    pub async fn get(&self, user_id: UserId) -> Option<CachedRanking> {
        self.inner.lock().await.get(&user_id).cloned()
    }

    pub async fn store(&self, user_id: UserId, snapshot_version: u64, ranked: Vec<RankedPost>) {
        self.inner.lock().await.insert(
            user_id,
            CachedRanking {
                snapshot_version,
                ranked,
            },
        );
    }

    /// Number of users with a cached ranking.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PostId;
    use crate::models::Algorithm;
    use chrono::Utc;

    fn ranked(id: i64) -> Vec<RankedPost> {
        vec![RankedPost {
            post_id: PostId::new(id),
            score: 1.0,
            algorithm: Algorithm::Hybrid,
            created_at: Utc::now(),
        }]
    }

    #[test]
    fn test_lru_evicts_least_recent() {
        let mut cache = Cache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.get(&1), Some(&"a"));
        cache.insert(3, "c");
        assert!(cache.get(&2).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_holds_one_entry() {
        let mut cache = Cache::new(0);
        cache.insert(1, 1);
        cache.insert(2, 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_ranking_cache_keeps_latest_per_user() {
        let cache = RankingCache::new(4);
        cache.store(UserId::new(1), 3, ranked(10)).await;
        cache.store(UserId::new(1), 4, ranked(11)).await;

        let cached = cache.get(UserId::new(1)).await.unwrap();
        assert_eq!(cached.snapshot_version, 4);
        assert_eq!(cached.ranked[0].post_id, PostId::new(11));
        assert_eq!(cache.len().await, 1);
        assert!(cache.get(UserId::new(2)).await.is_none());
    }
}
