use serde::{Deserialize, Serialize};

/// Schema version of the persisted entry set. Bump whenever [`Entry`] or the
/// transformer output changes so stale caches are rebuilt on upgrade.
pub const ENTRY_SET_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub form: String,
    pub sense: Sense,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sense {
    pub usg: String,
    pub def: String,
    #[serde(default)]
    pub xr: Vec<String>,
}

impl Sense {
    /// Placeholder sense shown when a looked-up form has no entry.
    pub fn missing(form: &str) -> Self {
        Self {
            usg: "❌".to_string(),
            def: format!("找不到單辭「{form}」"),
            xr: Vec::new(),
        }
    }
}

/// The full, versioned collection of entries as persisted in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySet {
    #[serde(rename = "dictEntries")]
    pub entries: Vec<Entry>,
    #[serde(rename = "version")]
    pub schema_version: u32,
}

impl EntrySet {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self {
            entries,
            schema_version: ENTRY_SET_VERSION,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// True when the set was written by this build's schema.
    pub fn is_current(&self) -> bool {
        self.schema_version == ENTRY_SET_VERSION
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry whose form equals `form`. Forms are not guaranteed unique.
    pub fn find_by_form(&self, form: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.form == form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(form: &str, def: &str) -> Entry {
        Entry {
            form: form.to_string(),
            sense: Sense {
                usg: "名".to_string(),
                def: def.to_string(),
                xr: Vec::new(),
            },
        }
    }

    #[test]
    fn persisted_shape_uses_legacy_field_names() {
        let set = EntrySet::new(vec![entry("水", "見")]);
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(value["version"], ENTRY_SET_VERSION);
        assert_eq!(value["dictEntries"][0]["form"], "水");
        assert_eq!(value["dictEntries"][0]["sense"]["usg"], "名");
        assert!(value["dictEntries"][0]["sense"]["xr"].as_array().unwrap().is_empty());
    }

    #[test]
    fn stale_version_is_not_current() {
        let mut set = EntrySet::new(Vec::new());
        assert!(set.is_current());
        set.schema_version = ENTRY_SET_VERSION + 1;
        assert!(!set.is_current());
    }

    #[test]
    fn find_by_form_returns_first_duplicate() {
        let set = EntrySet::new(vec![entry("水", "first"), entry("水", "second")]);
        assert_eq!(set.find_by_form("水").unwrap().sense.def, "first");
        assert!(set.find_by_form("火").is_none());
    }
}
