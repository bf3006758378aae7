use crate::config::DEFAULT_HISTORY_LEN;
use crate::error::BlobStoreError;
use crate::store::{self, BlobStore};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::warn;

pub const HISTORY_KEY: &str = "dictionaryHistory";

/// Receives keywords of completed searches.
pub trait HistorySink: Send + Sync {
    fn record(&self, keyword: &str);
}

/// Most-recent-first keyword list with a fixed capacity. Repeated keywords
/// are kept; the oldest item falls off the end.
#[derive(Debug)]
pub struct SearchHistory {
    capacity: usize,
    keywords: Mutex<VecDeque<String>>,
}

impl SearchHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            keywords: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn with_keywords(capacity: usize, keywords: impl IntoIterator<Item = String>) -> Self {
        let mut list: VecDeque<String> = keywords.into_iter().collect();
        list.truncate(capacity);
        Self {
            capacity,
            keywords: Mutex::new(list),
        }
    }

    /// Loads the persisted list; an unreadable list starts empty.
    pub async fn load(store: &dyn BlobStore, capacity: usize) -> Self {
        match store::get_json::<Vec<String>>(store, HISTORY_KEY).await {
            Ok(keywords) => Self::with_keywords(capacity, keywords),
            Err(BlobStoreError::NotFound(_)) => Self::new(capacity),
            Err(err) => {
                warn!(error = %err, "discarding unreadable search history");
                Self::new(capacity)
            }
        }
    }

    pub async fn save(&self, store: &dyn BlobStore) -> Result<(), BlobStoreError> {
        store::put_json(store, HISTORY_KEY, &self.keywords()).await
    }

    pub fn keywords(&self) -> Vec<String> {
        self.keywords.lock().iter().cloned().collect()
    }

    pub fn push(&self, keyword: &str) {
        if self.capacity == 0 {
            return;
        }
        let mut keywords = self.keywords.lock();
        keywords.push_front(keyword.to_string());
        keywords.truncate(self.capacity);
    }

    pub fn clear(&self) {
        self.keywords.lock().clear();
    }
}

impl Default for SearchHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

impl HistorySink for SearchHistory {
    fn record(&self, keyword: &str) {
        self.push(keyword);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;

    #[test]
    fn newest_first_and_bounded() {
        let history = SearchHistory::new(3);
        for keyword in ["a", "b", "c", "d"] {
            history.push(keyword);
        }
        assert_eq!(history.keywords(), vec!["d", "c", "b"]);
    }

    #[test]
    fn repeated_keyword_is_kept_until_evicted() {
        let history = SearchHistory::default();
        history.push("水");
        history.push("火");
        history.push("水");
        assert_eq!(history.keywords(), vec!["水", "火", "水"]);

        let short = SearchHistory::new(2);
        for keyword in ["水", "火", "水"] {
            short.push(keyword);
        }
        assert_eq!(short.keywords(), vec!["水", "火"]);
    }

    #[test]
    fn default_capacity_is_ten() {
        let history = SearchHistory::default();
        for i in 0..15 {
            history.push(&i.to_string());
        }
        let keywords = history.keywords();
        assert_eq!(keywords.len(), 10);
        assert_eq!(keywords[0], "14");
        assert_eq!(keywords[9], "5");
    }

    #[tokio::test]
    async fn persists_through_blob_store() {
        let store = MemoryBlobStore::new();
        let empty = SearchHistory::load(&store, 10).await;
        assert!(empty.keywords().is_empty());

        let history = SearchHistory::new(10);
        history.push("水");
        history.push("山水");
        history.save(&store).await.unwrap();

        let loaded = SearchHistory::load(&store, 10).await;
        assert_eq!(loaded.keywords(), vec!["山水", "水"]);
        loaded.clear();
        assert!(loaded.keywords().is_empty());
    }
}
