//! Tag side-table — prompt tags remembered per model file.
//!
//! DESIGN
//! ======
//! Entries are keyed by model, not by node, so a tag written for a LoRA
//! follows that LoRA into every graph that loads it. The table is grouped by
//! model category (`loras`, `checkpoints`, ...) and every category numbers
//! its entries independently, starting at 1. Lookup is by base file name so
//! `loras/style/foo.safetensors` and `foo.safetensors` find the same entry.
//!
//! The stored document keeps the shape existing tag files already use:
//!
//! ```json
//! {"EmbeddingTags": {"loras": {"1": {"Model": "loras/foo.safetensors", "Tags": "foo style"}}}}
//! ```
//!
//! TRADE-OFFS
//! ==========
//! Ids are never reused within a session; deleting the newest entry leaves
//! a gap until the table is reloaded, when the next id becomes max + 1.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::services::persistence::{PersistError, Persister};

pub const TAGS_TABLE: &str = "tags";

pub const OTHER_CATEGORY: &str = "others";

/// Directory hints checked in order. The first match names the category.
const CATEGORY_HINTS: &[(&[&str], &str)] = &[
    (&["lora", "lycoris"], "loras"),
    (&["checkpoint"], "checkpoints"),
    (&["unet"], "unets"),
    (&["vae"], "vaes"),
    (&["clip"], "clips"),
    (&["controlnet"], "controlnets"),
    (&["ipadapter"], "ipadapters"),
    (&["upscale"], "upscalers"),
];

/// Last path component of a model name, splitting on `/` and `\`.
#[must_use]
pub fn base_model_name(model: &str) -> &str {
    model.rsplit(['/', '\\']).next().unwrap_or(model)
}

/// Category for a model path: first by its top-level directory, then by
/// anything in the full path, else [`OTHER_CATEGORY`].
#[must_use]
pub fn model_category(model: &str) -> &'static str {
    let first_dir = model.split(['/', '\\']).next().unwrap_or_default().to_lowercase();
    let whole = model.to_lowercase();
    [first_dir, whole]
        .iter()
        .find_map(|haystack| {
            CATEGORY_HINTS
                .iter()
                .find(|(needles, _)| needles.iter().any(|needle| haystack.contains(needle)))
                .map(|(_, category)| *category)
        })
        .unwrap_or(OTHER_CATEGORY)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "Tags", default)]
    pub tags: String,
}

/// Where an entry lives: its category and its id within that category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagRef {
    pub category: String,
    pub id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TagDocument {
    #[serde(rename = "EmbeddingTags", default)]
    categories: IndexMap<String, IndexMap<String, TagEntry>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagTable {
    categories: IndexMap<String, IndexMap<u64, TagEntry>>,
    next_ids: HashMap<String, u64>,
}

impl TagTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry under `category` (or the model's own category). Tags are
    /// trimmed. Returns `None` if the model has no base name.
    pub fn add(&mut self, category: Option<&str>, model: &str, tags: &str) -> Option<TagRef> {
        if base_model_name(model).is_empty() {
            return None;
        }
        let category = category.unwrap_or_else(|| model_category(model)).to_owned();
        let next = self.next_ids.entry(category.clone()).or_insert(1);
        let id = *next;
        *next += 1;
        self.categories
            .entry(category.clone())
            .or_default()
            .insert(id, TagEntry { model: model.to_owned(), tags: tags.trim().to_owned() });
        Some(TagRef { category, id })
    }

    /// Replace an existing entry's model and tags. Returns `false` if there
    /// is no such entry.
    pub fn update(&mut self, at: &TagRef, model: &str, tags: &str) -> bool {
        let Some(entry) = self.entry_mut(at) else {
            return false;
        };
        *entry = TagEntry { model: model.to_owned(), tags: tags.trim().to_owned() };
        true
    }

    /// Find the entry for `model` by base name, looking in its predicted
    /// category first and then everywhere else.
    #[must_use]
    pub fn find_by_model(&self, model: &str) -> Option<(TagRef, &TagEntry)> {
        let base = base_model_name(model);
        let predicted = model_category(model);
        let matches = |entry: &TagEntry| base_model_name(&entry.model) == base;

        let in_category = |category: &str| {
            self.categories.get(category).and_then(|entries| {
                entries
                    .iter()
                    .find(|(_, entry)| matches(entry))
                    .map(|(id, entry)| (TagRef { category: category.to_owned(), id: *id }, entry))
            })
        };

        in_category(predicted).or_else(|| {
            self.categories
                .keys()
                .filter(|category| category.as_str() != predicted)
                .find_map(|category| in_category(category))
        })
    }

    /// The existing entry for `model`, or a new empty one in its category.
    pub fn get_or_create(&mut self, model: &str) -> Option<TagRef> {
        if let Some((at, _)) = self.find_by_model(model) {
            return Some(at);
        }
        self.add(None, model, "")
    }

    pub fn delete(&mut self, at: &TagRef) -> Option<TagEntry> {
        self.categories.get_mut(&at.category)?.shift_remove(&at.id)
    }

    #[must_use]
    pub fn get(&self, at: &TagRef) -> Option<&TagEntry> {
        self.categories.get(&at.category)?.get(&at.id)
    }

    fn entry_mut(&mut self, at: &TagRef) -> Option<&mut TagEntry> {
        self.categories.get_mut(&at.category)?.get_mut(&at.id)
    }

    /// Tag text to add to a prompt for `model`, if it has any.
    #[must_use]
    pub fn tags_for(&self, model: &str) -> Option<&str> {
        self.find_by_model(model)
            .map(|(_, entry)| entry.tags.as_str())
            .filter(|tags| !tags.is_empty())
    }

    /// Id the next [`TagTable::add`] into `category` will use.
    #[must_use]
    pub fn next_id(&self, category: &str) -> u64 {
        self.next_ids.get(category).copied().unwrap_or(1)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Entries in `category`, ordered by id.
    pub fn entries(&self, category: &str) -> impl Iterator<Item = (u64, &TagEntry)> {
        self.categories
            .get(category)
            .into_iter()
            .flat_map(|entries| entries.iter().map(|(id, entry)| (*id, entry)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.values().map(IndexMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    #[must_use]
    pub fn to_document(&self) -> Value {
        let doc = TagDocument {
            categories: self
                .categories
                .iter()
                .map(|(category, entries)| {
                    let entries = entries.iter().map(|(id, entry)| (id.to_string(), entry.clone())).collect();
                    (category.clone(), entries)
                })
                .collect(),
        };
        serde_json::to_value(doc).unwrap_or(Value::Null)
    }

    /// Rebuild a table from its stored document. Entries are ordered by id
    /// and each category's next id is one past its largest. Entries whose id
    /// is not a number are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Decode`] if the document does not have the
    /// expected shape.
    pub fn from_document(document: Value) -> Result<Self, PersistError> {
        let doc: TagDocument = serde_json::from_value(document)?;
        let mut table = Self::new();
        for (category, raw) in doc.categories {
            let mut entries = IndexMap::with_capacity(raw.len());
            for (id, entry) in raw {
                match id.parse::<u64>() {
                    Ok(id) => {
                        entries.insert(id, entry);
                    }
                    Err(_) => warn!(%category, %id, "tag entry with non-numeric id skipped"),
                }
            }
            entries.sort_keys();
            let next = entries.keys().max().map_or(1, |max| max + 1);
            table.next_ids.insert(category.clone(), next);
            table.categories.insert(category, entries);
        }
        Ok(table)
    }

    /// Queue a save under [`TAGS_TABLE`].
    pub fn save(&self, persister: &Persister) -> bool {
        persister.save(TAGS_TABLE, self.to_document())
    }

    /// Load the stored table, or an empty one if it was never saved.
    ///
    /// # Errors
    ///
    /// Returns the store or decode error; store errors are also published as
    /// a notice by the persister.
    pub async fn load(persister: &Persister) -> Result<Self, PersistError> {
        match persister.load(TAGS_TABLE).await? {
            Some(document) => Self::from_document(document),
            None => Ok(Self::new()),
        }
    }
}

#[cfg(test)]
#[path = "tags_test.rs"]
mod tests;
