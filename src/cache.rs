//! Versioned, persisted entry set with single-flight initialization.

use crate::bundle::AssetBundle;
use crate::config::EngineConfig;
use crate::data::{ENTRY_SET_VERSION, Entry, EntrySet};
use crate::error::{BundleError, InitializationError, SelectionError};
use crate::store::{self, BlobStore};
use crate::transform::transform;
use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Blob-store key of the persisted [`EntrySet`].
pub const ENTRY_SET_KEY: &str = "dictInfos";

pub struct EntryCache {
    store: Arc<dyn BlobStore>,
    bundle: Arc<dyn AssetBundle>,
    config: EngineConfig,
    current: RwLock<Arc<EntrySet>>,
    build_lock: Mutex<()>,
    initialized: AtomicBool,
    initializing: AtomicBool,
    builds: AtomicU64,
}

impl EntryCache {
    pub fn new(
        store: Arc<dyn BlobStore>,
        bundle: Arc<dyn AssetBundle>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            bundle,
            config,
            current: RwLock::new(Arc::new(EntrySet::empty())),
            build_lock: Mutex::new(()),
            initialized: AtomicBool::new(false),
            initializing: AtomicBool::new(false),
            builds: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// True once an entry set has been produced by this instance.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::Acquire)
    }

    /// Number of times the lexicon transformer has been run.
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> Arc<EntrySet> {
        Arc::clone(&self.current.read())
    }

    /// Makes an entry set available, rebuilding from the bundle when forced or
    /// when no valid cached set exists.
    ///
    /// Calls made while another call is in flight wait for it and share its
    /// result instead of running a second build.
    pub async fn ensure_ready(
        &self,
        force_update: bool,
    ) -> Result<Arc<EntrySet>, InitializationError> {
        let _guard = match self.build_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("entry set initialization in flight, waiting for it");
                let guard = self.build_lock.lock().await;
                if self.is_initialized() {
                    return Ok(self.snapshot());
                }
                // The in-flight attempt failed; this caller makes its own.
                guard
            }
        };

        self.initializing.store(true, Ordering::Release);
        let result = self.initialize(force_update).await;
        self.initializing.store(false, Ordering::Release);
        result
    }

    async fn initialize(&self, force_update: bool) -> Result<Arc<EntrySet>, InitializationError> {
        if !force_update {
            if self.is_initialized() {
                return Ok(self.snapshot());
            }
            if let Some(cached) = self.load_cached().await {
                info!(entries = cached.len(), "using cached entry set");
                return Ok(self.publish(Arc::new(cached)));
            }
        }

        let set = Arc::new(self.build().await?);
        self.persist(&set).await;
        Ok(self.publish(set))
    }

    async fn load_cached(&self) -> Option<EntrySet> {
        match self.store.has(ENTRY_SET_KEY).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("no cached entry set");
                return None;
            }
            Err(err) => {
                warn!(error = %err, "entry set cache unavailable, rebuilding");
                return None;
            }
        }

        match store::get_json::<EntrySet>(self.store.as_ref(), ENTRY_SET_KEY).await {
            Ok(set) if !set.is_current() => {
                info!(
                    found = set.schema_version,
                    expected = ENTRY_SET_VERSION,
                    "discarding cached entry set with stale schema"
                );
                None
            }
            Ok(set) if set.is_empty() => {
                debug!("cached entry set is empty");
                None
            }
            Ok(set) => Some(set),
            Err(err) => {
                warn!(error = %err, "failed to load cached entry set, rebuilding");
                None
            }
        }
    }

    async fn build(&self) -> Result<EntrySet, InitializationError> {
        let path = self.config.lexicon_path();
        let bytes = self.bundle.member(&path).await?;
        let text = decode_text(&bytes);
        self.builds.fetch_add(1, Ordering::Relaxed);
        let entries = transform(&text)?;
        info!(entries = entries.len(), member = %path, "built entry set from lexicon");
        Ok(EntrySet::new(entries))
    }

    async fn persist(&self, set: &EntrySet) {
        if let Err(err) = store::put_json(self.store.as_ref(), ENTRY_SET_KEY, set).await {
            warn!(error = %err, "failed to persist entry set, keeping in-memory copy");
        }
    }

    fn publish(&self, set: Arc<EntrySet>) -> Arc<EntrySet> {
        *self.current.write() = Arc::clone(&set);
        self.initialized.store(true, Ordering::Release);
        set
    }

    /// The current entry set, initializing from cache or bundle on first use.
    pub async fn get_entries(&self) -> Result<Arc<EntrySet>, InitializationError> {
        if !self.is_initialized() {
            return self.ensure_ready(false).await;
        }
        Ok(self.snapshot())
    }

    /// First entry with this form.
    pub async fn find_by_form(&self, form: &str) -> Result<Option<Entry>, InitializationError> {
        Ok(self.get_entries().await?.find_by_form(form).cloned())
    }

    /// Entry at 1-based position `number` in document order.
    pub async fn entry_by_number(&self, number: usize) -> Result<Entry, SelectionError> {
        let set = self.get_entries().await?;
        let total = set.len();
        number
            .checked_sub(1)
            .and_then(|index| set.entries.get(index))
            .cloned()
            .ok_or(SelectionError::OutOfRange { total })
    }

    pub async fn random_entry(&self) -> Result<Entry, SelectionError> {
        let set = self.get_entries().await?;
        if set.is_empty() {
            return Err(SelectionError::Empty);
        }
        let index = rand::thread_rng().gen_range(0..set.len());
        Ok(set.entries[index].clone())
    }

    /// Image bytes of glyph `id`.
    pub async fn glyph(&self, id: &str) -> Result<Vec<u8>, BundleError> {
        self.bundle.member(&self.config.glyph_path(id)).await
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text.into_owned(),
    }
}
