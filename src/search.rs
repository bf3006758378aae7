//! Substring search over the entry set, served page by page.

use crate::cache::EntryCache;
use crate::data::{Entry, EntrySet};
use crate::error::InitializationError;
use crate::history::HistorySink;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Idle,
    Filtering,
    PageReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The working set was rebuilt and holds `total` matches.
    Ready { total: usize },
    /// The keyword is no longer the one the caller is displaying.
    Stale,
    /// Another search or page load is in flight; nothing changed.
    Busy,
}

struct WorkingSet {
    keyword: Option<String>,
    entries: Arc<EntrySet>,
    /// Indices into `entries`, shortest form first.
    matches: Vec<usize>,
    page: usize,
}

pub struct SearchSession {
    cache: Arc<EntryCache>,
    history: Option<Arc<dyn HistorySink>>,
    page_size: usize,
    requested: Mutex<Option<String>>,
    phase: Mutex<SearchPhase>,
    working: Mutex<WorkingSet>,
    busy: AtomicBool,
}

/// Holds the session's in-flight flag until dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SearchSession {
    pub fn new(cache: Arc<EntryCache>) -> Self {
        let page_size = cache.config().page_size.max(1);
        Self {
            cache,
            history: None,
            page_size,
            requested: Mutex::new(None),
            phase: Mutex::new(SearchPhase::Idle),
            working: Mutex::new(WorkingSet {
                keyword: None,
                entries: Arc::new(EntrySet::empty()),
                matches: Vec::new(),
                page: 0,
            }),
            busy: AtomicBool::new(false),
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn phase(&self) -> SearchPhase {
        *self.phase.lock()
    }

    /// Keyword of the current working set.
    pub fn keyword(&self) -> Option<String> {
        self.working.lock().keyword.clone()
    }

    /// Number of pages served since the last search.
    pub fn pages_loaded(&self) -> usize {
        self.working.lock().page
    }

    /// Records the keyword the caller currently displays. Only searches for
    /// this keyword are acted on.
    pub fn request(&self, keyword: &str) {
        *self.requested.lock() = Some(keyword.to_string());
    }

    fn is_requested(&self, keyword: &str) -> bool {
        self.requested.lock().as_deref() == Some(keyword)
    }

    /// Requests `keyword` and runs the search for it.
    pub async fn search(&self, keyword: &str) -> Result<SearchOutcome, InitializationError> {
        self.request(keyword);
        self.new_search(keyword).await
    }

    /// Rebuilds the working set for `keyword`: case-insensitive substring
    /// match on the form, shortest form first, document order among equals.
    pub async fn new_search(&self, keyword: &str) -> Result<SearchOutcome, InitializationError> {
        if !self.is_requested(keyword) {
            debug!(keyword, "discarding search for a keyword no longer requested");
            return Ok(SearchOutcome::Stale);
        }
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            debug!(keyword, "search already in flight");
            return Ok(SearchOutcome::Busy);
        };

        let previous = std::mem::replace(&mut *self.phase.lock(), SearchPhase::Filtering);
        let entries = match self.cache.get_entries().await {
            Ok(entries) => entries,
            Err(err) => {
                *self.phase.lock() = previous;
                return Err(err);
            }
        };

        let matches = filter_sorted(&entries, keyword);
        let total = matches.len();
        {
            let mut working = self.working.lock();
            working.keyword = Some(keyword.to_string());
            working.entries = entries;
            working.matches = matches;
            working.page = 0;
        }
        *self.phase.lock() = SearchPhase::PageReady;
        debug!(keyword, total, "search ready");

        if let Some(history) = &self.history {
            history.record(keyword);
        }
        Ok(SearchOutcome::Ready { total })
    }

    /// The next page of the working set, or `None` when another operation is
    /// in flight (the cursor does not move).
    pub fn load_page(&self) -> Option<Vec<Entry>> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        if self.phase() != SearchPhase::PageReady {
            return Some(Vec::new());
        }

        let mut working = self.working.lock();
        let start = working.page * self.page_size;
        if start >= working.matches.len() {
            return Some(Vec::new());
        }
        let end = (start + self.page_size).min(working.matches.len());
        let page = working.matches[start..end]
            .iter()
            .map(|&index| working.entries.entries[index].clone())
            .collect();
        working.page += 1;
        debug!(page = working.page, "loaded search page");
        Some(page)
    }

    pub fn has_more(&self) -> bool {
        let working = self.working.lock();
        working.page * self.page_size < working.matches.len()
    }
}

fn filter_sorted(entries: &EntrySet, keyword: &str) -> Vec<usize> {
    let needle = keyword.to_lowercase();
    let mut matches: Vec<usize> = entries
        .entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.form.to_lowercase().contains(&needle))
        .map(|(index, _)| index)
        .collect();
    // Length in UTF-16 code units.
    matches.sort_by_key(|&index| entries.entries[index].form.encode_utf16().count());
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{AssetBundle, MemoryBundle};
    use crate::config::EngineConfig;
    use crate::error::BundleError;
    use crate::history::SearchHistory;
    use crate::store::MemoryBlobStore;
    use async_trait::async_trait;
    use std::time::Duration;

    fn lexicon(forms: &[&str]) -> String {
        let entries: String = forms
            .iter()
            .map(|form| format!("<entry><form>{form}</form><sense><usg/><def>{form}</def></sense></entry>"))
            .collect();
        format!("<TEI><text><body>{entries}</body></text></TEI>")
    }

    fn session_over(forms: &[&str], page_size: usize) -> SearchSession {
        let bundle = MemoryBundle::new().with_member("assets/dingfubao.xml", lexicon(forms));
        let config = EngineConfig {
            page_size,
            ..EngineConfig::default()
        };
        let cache = EntryCache::new(Arc::new(MemoryBlobStore::new()), Arc::new(bundle), config);
        SearchSession::new(Arc::new(cache))
    }

    fn forms(page: &[Entry]) -> Vec<&str> {
        page.iter().map(|entry| entry.form.as_str()).collect()
    }

    struct SlowBundle(MemoryBundle);

    #[async_trait]
    impl AssetBundle for SlowBundle {
        async fn member(&self, path: &str) -> Result<Vec<u8>, BundleError> {
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.0.member(path).await
        }
    }

    #[tokio::test]
    async fn shortest_forms_first_in_pages() {
        let session = session_over(&["水果", "山水", "水"], 2);
        assert_eq!(session.phase(), SearchPhase::Idle);
        assert_eq!(
            session.search("水").await.unwrap(),
            SearchOutcome::Ready { total: 3 }
        );
        assert_eq!(session.phase(), SearchPhase::PageReady);
        assert!(session.has_more());

        let first = session.load_page().unwrap();
        assert_eq!(forms(&first), vec!["水", "水果"]);
        assert!(session.has_more());

        let second = session.load_page().unwrap();
        assert_eq!(forms(&second), vec!["山水"]);
        assert!(!session.has_more());
        assert!(session.load_page().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pages_cover_working_set_exactly_once() {
        let all: Vec<String> = (0..47).map(|i| format!("詞{}", "字".repeat(i % 5))).collect();
        let refs: Vec<&str> = all.iter().map(String::as_str).collect();
        let session = session_over(&refs, 10);
        session.search("詞").await.unwrap();

        let mut seen = Vec::new();
        let mut pages = 0;
        while session.has_more() {
            let page = session.load_page().unwrap();
            assert!(!page.is_empty() && page.len() <= 10);
            seen.extend(page);
            pages += 1;
        }
        assert_eq!(pages, 5);
        assert_eq!(seen.len(), 47);
        let lengths: Vec<usize> = seen.iter().map(|e| e.form.encode_utf16().count()).collect();
        assert!(lengths.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn match_is_case_insensitive_substring() {
        let session = session_over(&["Dharma", "dharmakaya", "karma", "ADHARMA"], 20);
        session.search("dHaRma").await.unwrap();
        let page = session.load_page().unwrap();
        assert_eq!(forms(&page), vec!["Dharma", "ADHARMA", "dharmakaya"]);
    }

    #[tokio::test]
    async fn length_counts_utf16_units() {
        // U+20000 takes two UTF-16 units, so "水𠀀" is longer than "水果".
        let session = session_over(&["水𠀀", "水果", "水"], 20);
        session.search("水").await.unwrap();
        let page = session.load_page().unwrap();
        assert_eq!(forms(&page), vec!["水", "水果", "水𠀀"]);
    }

    #[tokio::test]
    async fn no_matches_means_no_more_pages() {
        let session = session_over(&["水"], 20);
        assert_eq!(
            session.search("火").await.unwrap(),
            SearchOutcome::Ready { total: 0 }
        );
        assert!(!session.has_more());
        assert!(session.load_page().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_keyword_is_discarded() {
        let session = session_over(&["水", "火"], 20);
        session.search("水").await.unwrap();
        session.request("火");
        assert_eq!(session.new_search("水").await.unwrap(), SearchOutcome::Stale);
        assert_eq!(session.keyword().as_deref(), Some("水"));

        let fresh = session_over(&["水"], 20);
        assert_eq!(fresh.new_search("水").await.unwrap(), SearchOutcome::Stale);
        assert_eq!(fresh.phase(), SearchPhase::Idle);
    }

    #[tokio::test]
    async fn overlapping_calls_are_no_ops() {
        let bundle = SlowBundle(
            MemoryBundle::new().with_member("assets/dingfubao.xml", lexicon(&["水", "水果"])),
        );
        let cache = EntryCache::new(
            Arc::new(MemoryBlobStore::new()),
            Arc::new(bundle),
            EngineConfig::default(),
        );
        let session = SearchSession::new(Arc::new(cache));
        session.request("水");

        let (searched, page, again) = tokio::join!(
            session.new_search("水"),
            async { session.load_page() },
            session.new_search("水"),
        );
        assert_eq!(searched.unwrap(), SearchOutcome::Ready { total: 2 });
        assert!(page.is_none());
        assert_eq!(again.unwrap(), SearchOutcome::Busy);
        assert_eq!(session.pages_loaded(), 0);
        assert_eq!(session.load_page().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn successful_search_is_recorded_in_history() {
        let history = Arc::new(SearchHistory::default());
        let session = session_over(&["水"], 20).with_history(history.clone());
        session.search("水").await.unwrap();
        session.search("山").await.unwrap();
        session.request("火");
        session.new_search("水").await.unwrap();
        assert_eq!(history.keywords(), vec!["山", "水"]);
    }

    #[tokio::test]
    async fn new_search_resets_cursor() {
        let session = session_over(&["水", "水果", "山水"], 1);
        session.search("水").await.unwrap();
        session.load_page().unwrap();
        session.load_page().unwrap();
        assert_eq!(session.pages_loaded(), 2);
        session.search("山").await.unwrap();
        assert_eq!(session.pages_loaded(), 0);
        assert_eq!(forms(&session.load_page().unwrap()), vec!["山水"]);
    }
}
