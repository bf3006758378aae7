pub mod bundle;
pub mod cache;
pub mod config;
mod data;
pub mod error;
pub mod history;
pub mod render;
pub mod search;
pub mod store;
pub mod transform;
#[cfg(feature = "web")]
pub mod web;
pub mod xml;

pub use bundle::{AssetBundle, DirBundle, MemoryBundle, ZipBundle};
pub use cache::{ENTRY_SET_KEY, EntryCache};
pub use config::EngineConfig;
pub use data::{ENTRY_SET_VERSION, Entry, EntrySet, Sense};
pub use error::{
    BlobStoreError, BundleError, ConfigError, InitializationError, ParseError, SelectionError,
};
pub use history::{HISTORY_KEY, HistorySink, SearchHistory};
pub use render::Renderer;
pub use search::{SearchOutcome, SearchPhase, SearchSession};
pub use store::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use transform::transform;

use serde::Serialize;
use std::sync::Arc;

/// An entry ready for display. Lookups that miss still render, with the
/// requested form and the not-found placeholder sense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEntry {
    pub form: String,
    pub found: bool,
    pub html: String,
}

/// The engine wired to its collaborators: entry cache, renderer and the
/// persisted search history.
pub struct Dictionary {
    cache: Arc<EntryCache>,
    renderer: Renderer,
    history: Arc<SearchHistory>,
    store: Arc<dyn BlobStore>,
}

impl Dictionary {
    pub async fn open(
        store: Arc<dyn BlobStore>,
        bundle: Arc<dyn AssetBundle>,
        config: EngineConfig,
    ) -> Self {
        let history = SearchHistory::load(store.as_ref(), config.history_len).await;
        let renderer = Renderer::new(&config);
        let cache = EntryCache::new(Arc::clone(&store), bundle, config);
        Self {
            cache: Arc::new(cache),
            renderer,
            history: Arc::new(history),
            store,
        }
    }

    pub fn cache(&self) -> &Arc<EntryCache> {
        &self.cache
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn history(&self) -> &Arc<SearchHistory> {
        &self.history
    }

    /// A fresh search session that records into this dictionary's history.
    pub fn search_session(&self) -> SearchSession {
        SearchSession::new(Arc::clone(&self.cache)).with_history(self.history.clone())
    }

    pub async fn save_history(&self) -> Result<(), BlobStoreError> {
        self.history.save(self.store.as_ref()).await
    }

    pub fn render_entry(&self, entry: &Entry) -> RenderedEntry {
        RenderedEntry {
            form: entry.form.clone(),
            found: true,
            html: self.renderer.render(&entry.sense),
        }
    }

    pub async fn lookup(&self, form: &str) -> Result<RenderedEntry, InitializationError> {
        Ok(match self.cache.find_by_form(form).await? {
            Some(entry) => self.render_entry(&entry),
            None => RenderedEntry {
                form: form.to_string(),
                found: false,
                html: self.renderer.render(&Sense::missing(form)),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEXICON: &str = "<TEI><text><body>\
        <entry><form>水</form><sense><usg>名</usg><def>見火</def><xr>火</xr></sense></entry>\
        <entry><form>火</form><sense><usg>名</usg><def>焰<g ref=\"#k1\"/></def></sense></entry>\
        </body></text></TEI>";

    async fn dictionary(store: Arc<MemoryBlobStore>) -> Dictionary {
        let bundle = MemoryBundle::new().with_member("assets/dingfubao.xml", LEXICON);
        Dictionary::open(store, Arc::new(bundle), EngineConfig::default()).await
    }

    #[tokio::test]
    async fn lexicon_to_rendered_link() {
        let dict = dictionary(Arc::new(MemoryBlobStore::new())).await;
        let water = dict.lookup("水").await.unwrap();
        assert!(water.found);
        assert_eq!(water.html, "（名）見<a href=\"/entry/entry/火\">火</a>");

        let fire = dict.lookup("火").await.unwrap();
        assert_eq!(
            fire.html,
            "（名）焰<img src=\"https://localhost/assets/gaiji/k1.png\"/>"
        );
    }

    #[tokio::test]
    async fn missing_form_renders_placeholder() {
        let dict = dictionary(Arc::new(MemoryBlobStore::new())).await;
        let missing = dict.lookup("木").await.unwrap();
        assert!(!missing.found);
        assert_eq!(missing.form, "木");
        assert_eq!(missing.html, "（❌）找不到單辭「木」");
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let store = Arc::new(MemoryBlobStore::new());
        let dict = dictionary(store.clone()).await;
        let session = dict.search_session();
        session.search("水").await.unwrap();
        dict.save_history().await.unwrap();

        let reopened = dictionary(store).await;
        assert_eq!(reopened.history().keywords(), vec!["水"]);
    }
}
