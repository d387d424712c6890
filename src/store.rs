//! In-memory item store.
//!
//! A `HashMap` behind a readers-writer lock. Reads share the lock; writes
//! hold it exclusively, and only for the map mutation itself. Nothing inside
//! a critical section awaits or does I/O, so a plain `std::sync::RwLock` is
//! the right tool; it is never held across an `.await`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// A stored item. `id` is assigned by the store and never changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub title: String,
    pub completed: bool,
}

/// The client-supplied part of an item.
///
/// Decodes only from a JSON object. An `id` key, or any other unknown key,
/// is ignored; missing fields default.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemInput {
    pub title: String,
    pub completed: bool,
}

impl ItemInput {
    pub fn new(title: impl Into<String>, completed: bool) -> Self {
        Self { title: title.into(), completed }
    }

    fn into_item(self, id: i64) -> Item {
        Item { id, title: self.title, completed: self.completed }
    }
}

// Hand-written so that only maps are accepted: a derived struct impl would
// also read a JSON array positionally.
impl<'de> Deserialize<'de> for ItemInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ItemInputVisitor)
    }
}

struct ItemInputVisitor;

impl<'de> Visitor<'de> for ItemInputVisitor {
    type Value = ItemInput;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an item object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ItemInput, A::Error> {
        let mut title = None;
        let mut completed = None;
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "title" if title.is_some() => return Err(de::Error::duplicate_field("title")),
                "title" => title = Some(map.next_value()?),
                "completed" if completed.is_some() => {
                    return Err(de::Error::duplicate_field("completed"));
                }
                "completed" => completed = Some(map.next_value()?),
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(ItemInput {
            title: title.unwrap_or_default(),
            completed: completed.unwrap_or_default(),
        })
    }
}

struct Inner {
    items: HashMap<i64, Item>,
    /// Strictly greater than every id ever issued. Ids are not reused after
    /// a delete.
    next_id: i64,
}

/// Thread-safe keyed container of [`Item`]s.
///
/// Construct one at startup and share it as `Arc<ItemStore>`.
pub struct ItemStore {
    inner: RwLock<Inner>,
}

impl ItemStore {
    /// An empty store. The first item created gets id `1`.
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner { items: HashMap::new(), next_id: 1 }) }
    }

    /// A store holding a few sample items, ids `1..=3`.
    pub fn seeded() -> Self {
        let store = Self::new();
        store.create(ItemInput::new("Learn Rust", true));
        store.create(ItemInput::new("Build a web framework", true));
        store.create(ItemInput::new("Share it with the world", false));
        store
    }

    // A panic can only poison the lock between whole-map operations; every
    // write below leaves the map consistent before it can unwind.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of every item, in no particular order.
    pub fn all(&self) -> Vec<Item> {
        self.read().items.values().cloned().collect()
    }

    pub fn get(&self, id: i64) -> Option<Item> {
        self.read().items.get(&id).cloned()
    }

    /// Stores `input` under the next id and returns the stored item.
    pub fn create(&self, input: ItemInput) -> Item {
        let mut inner = self.write();
        let id = inner.next_id;
        inner.next_id += 1;
        let item = input.into_item(id);
        inner.items.insert(id, item.clone());
        item
    }

    /// Replaces every field of item `id`. Returns `None`, changing nothing,
    /// if there is no such item.
    pub fn update(&self, id: i64, input: ItemInput) -> Option<Item> {
        let mut inner = self.write();
        let slot = inner.items.get_mut(&id)?;
        *slot = input.into_item(id);
        Some(slot.clone())
    }

    /// Removes item `id`. Returns whether it was there.
    pub fn delete(&self, id: i64) -> bool {
        self.write().items.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ItemStore {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn sorted(mut items: Vec<Item>) -> Vec<Item> {
        items.sort_by_key(|item| item.id);
        items
    }

    #[test]
    fn create_assigns_sequential_ids_from_one() {
        let store = ItemStore::new();
        let a = store.create(ItemInput::new("a", false));
        let b = store.create(ItemInput::new("b", true));
        assert_eq!(a, Item { id: 1, title: "a".into(), completed: false });
        assert_eq!(b.id, 2);
    }

    #[test]
    fn get_returns_what_create_stored() {
        let store = ItemStore::new();
        let created = store.create(ItemInput::new("write tests", true));
        assert_eq!(store.get(created.id), Some(created));
        assert_eq!(store.get(99), None);
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let store = ItemStore::new();
        let first = store.create(ItemInput::new("a", false));
        assert!(store.delete(first.id));
        let second = store.create(ItemInput::new("b", false));
        assert_eq!(second.id, first.id + 1);
    }

    #[test]
    fn update_replaces_all_fields_and_keeps_id() {
        let store = ItemStore::new();
        let item = store.create(ItemInput::new("draft", true));

        let updated = store.update(item.id, ItemInput::new("final", false)).unwrap();

        assert_eq!(updated, Item { id: item.id, title: "final".into(), completed: false });
        assert_eq!(store.get(item.id), Some(updated));
    }

    #[test]
    fn update_on_absent_id_changes_nothing() {
        let store = ItemStore::seeded();
        let before = sorted(store.all());

        assert_eq!(store.update(42, ItemInput::new("ghost", true)), None);

        assert_eq!(sorted(store.all()), before);
    }

    #[test]
    fn delete_twice_reports_found_then_not_found() {
        let store = ItemStore::new();
        let item = store.create(ItemInput::new("once", false));

        assert!(store.delete(item.id));
        assert!(!store.delete(item.id));
        assert_eq!(store.get(item.id), None);
    }

    #[test]
    fn len_tracks_creates_minus_successful_deletes() {
        let store = ItemStore::new();
        for i in 0..5 {
            store.create(ItemInput::new(format!("item {i}"), false));
        }
        assert!(store.delete(2));
        assert!(store.delete(4));
        assert!(!store.delete(4));
        assert!(!store.delete(100));

        assert_eq!(store.len(), 3);
        assert_eq!(store.all().len(), 3);
    }

    #[test]
    fn seeded_store_has_three_items() {
        let store = ItemStore::seeded();
        let ids: Vec<i64> = sorted(store.all()).into_iter().map(|item| item.id).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(store.create(ItemInput::default()).id, 4);
    }

    #[test]
    fn input_decodes_from_objects_only() {
        let input: ItemInput =
            serde_json::from_str(r#"{"id":5,"title":"t","completed":true,"extra":[1]}"#).unwrap();
        assert_eq!(input, ItemInput::new("t", true));

        let input: ItemInput = serde_json::from_str("{}").unwrap();
        assert_eq!(input, ItemInput::default());

        for body in [r#"["A", true]"#, "[]", r#""A""#, "null", r#"{"title":"a","title":"b"}"#] {
            assert!(serde_json::from_str::<ItemInput>(body).is_err(), "{body}");
        }
    }

    #[test]
    fn concurrent_creates_get_distinct_increasing_ids() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 250;

        let store = Arc::new(ItemStore::new());
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|i| store.create(ItemInput::new(format!("{t}-{i}"), false)).id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all_ids = HashSet::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            // Within one thread, later creates were assigned later.
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            all_ids.extend(ids);
        }

        assert_eq!(all_ids.len(), THREADS * PER_THREAD);
        assert_eq!(all_ids.iter().max(), Some(&((THREADS * PER_THREAD) as i64)));
        assert_eq!(store.len(), THREADS * PER_THREAD);
    }

    #[test]
    fn readers_never_see_torn_items() {
        let store = Arc::new(ItemStore::new());
        let id = store.create(ItemInput::new("even", false)).id;

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..2_000 {
                    let input = if i % 2 == 0 {
                        ItemInput::new("odd", true)
                    } else {
                        ItemInput::new("even", false)
                    };
                    store.update(id, input);
                }
            })
        };

        for _ in 0..2_000 {
            let item = store.get(id).unwrap();
            assert_eq!(item.completed, item.title == "odd");
        }
        writer.join().unwrap();
    }
}
