use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Records returned by a fetch plus whatever pagination totals the source reported
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutcome<T> {
    pub data: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
}

impl<T> FetchOutcome<T> {
    #[must_use]
    pub const fn new(data: Vec<T>) -> Self {
        Self {
            data,
            total_items: None,
            total_pages: None,
        }
    }

    #[must_use]
    pub const fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub const fn with_totals(mut self, total_items: Option<u64>, total_pages: Option<u64>) -> Self {
        self.total_items = total_items;
        self.total_pages = total_pages;
        self
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> FetchOutcome<U> {
        FetchOutcome {
            data: self.data.into_iter().map(f).collect(),
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: Vec<T>,
    pub timestamp: Instant,
    pub total_items: Option<u64>,
    pub total_pages: Option<u64>,
}

impl<T: Clone> CacheEntry<T> {
    #[must_use]
    pub fn new(outcome: &FetchOutcome<T>) -> Self {
        Self {
            data: outcome.data.clone(),
            timestamp: Instant::now(),
            total_items: outcome.total_items,
            total_pages: outcome.total_pages,
        }
    }

    #[must_use]
    pub fn outcome(&self) -> FetchOutcome<T> {
        FetchOutcome {
            data: self.data.clone(),
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }
}

impl<T> CacheEntry<T> {
    #[must_use]
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }

    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }

    #[must_use]
    pub fn time_until_expiry(&self, ttl: Duration) -> Option<Duration> {
        ttl.checked_sub(self.age()).filter(|left| !left.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cache_entry_expiry() {
        let entry = CacheEntry::new(&FetchOutcome::new(vec!["a".to_string()]));
        let ttl = Duration::from_secs(300);
        assert!(!entry.is_expired(ttl));
        assert!(entry.time_until_expiry(ttl).is_some());

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(entry.is_expired(ttl));
        assert!(entry.time_until_expiry(ttl).is_none());
    }

    #[test]
    fn test_outcome_preserves_totals() {
        let outcome = FetchOutcome::new(vec![1, 2]).with_totals(Some(20), Some(10));
        let entry = CacheEntry::new(&outcome);
        assert_eq!(entry.outcome(), outcome);

        let doubled = outcome.map(|n| n * 2);
        assert_eq!(doubled.data, vec![2, 4]);
        assert_eq!(doubled.total_pages, Some(10));
    }
}
