use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::ids::ItemId;

/// One ranked record. Immutable once ingested; removal is tracked by the
/// engine, never by deleting the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Item {
    pub fn new(id: ItemId, fields: BTreeMap<String, FieldValue>) -> Self {
        Self { id, fields }
    }

    /// An item with no fields, for callers that only care about ids.
    pub fn bare(id: ItemId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}

/// Holds the ingested items in display order plus the free-text annotations
/// attached to them. Annotations are independent of ranking state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStore {
    items: Vec<Item>,
    index: BTreeMap<ItemId, usize>,
    annotations: BTreeMap<ItemId, String>,
}

impl ItemStore {
    /// Build a store from already-identified items. Rejects an empty list and
    /// duplicate ids without keeping any partial state.
    pub fn new(items: Vec<Item>) -> Result<Self, CoreError> {
        if items.is_empty() {
            return Err(CoreError::InvalidInput("item list is empty".into()));
        }
        let mut index = BTreeMap::new();
        for (pos, item) in items.iter().enumerate() {
            if index.insert(item.id, pos).is_some() {
                return Err(CoreError::DuplicateItem(item.id));
            }
        }
        Ok(Self {
            items,
            index,
            annotations: BTreeMap::new(),
        })
    }

    /// Ingest raw records: shuffle them so the source ordering cannot bias the
    /// comparisons, then assign ids `0..n` in the shuffled order.
    pub fn ingest<R: Rng + ?Sized>(
        mut records: Vec<BTreeMap<String, FieldValue>>,
        rng: &mut R,
    ) -> Result<Self, CoreError> {
        records.shuffle(rng);
        let items = records
            .into_iter()
            .enumerate()
            .map(|(pos, fields)| Ok(Item::new(position_id(pos)?, fields)))
            .collect::<Result<Vec<_>, CoreError>>()?;
        Self::new(items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item_id: ItemId) -> bool {
        self.index.contains_key(&item_id)
    }

    pub fn get(&self, item_id: ItemId) -> Option<&Item> {
        self.index.get(&item_id).map(|pos| &self.items[*pos])
    }

    /// Items in ingestion order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|i| i.id).collect()
    }

    /// Set the annotation for an item. Empty text clears it.
    pub fn annotate(&mut self, item_id: ItemId, text: &str) -> Result<(), CoreError> {
        if !self.contains(item_id) {
            return Err(CoreError::UnknownItem(item_id));
        }
        if text.is_empty() {
            self.annotations.remove(&item_id);
        } else {
            self.annotations.insert(item_id, text.to_string());
        }
        Ok(())
    }

    pub fn annotation(&self, item_id: ItemId) -> Option<&str> {
        self.annotations.get(&item_id).map(String::as_str)
    }

    pub fn annotations(&self) -> &BTreeMap<ItemId, String> {
        &self.annotations
    }

    /// Replace all annotations. Unknown ids are rejected.
    pub fn load_annotations(&mut self, annotations: Vec<(ItemId, String)>) -> Result<(), CoreError> {
        let mut map = BTreeMap::new();
        for (item_id, text) in annotations {
            if !self.contains(item_id) {
                return Err(CoreError::UnknownItem(item_id));
            }
            if !text.is_empty() {
                map.insert(item_id, text);
            }
        }
        self.annotations = map;
        Ok(())
    }
}

/// Ingestion ids are record positions; they must fit the id width.
fn position_id(pos: usize) -> Result<ItemId, CoreError> {
    u32::try_from(pos)
        .map(ItemId::new)
        .map_err(|_| CoreError::InvalidInput(format!("record {pos} exceeds the item id range")))
}
