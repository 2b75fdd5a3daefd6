//! Swiss - a columnar entity store with bitset-indexed queries.
//!
//! This crate stores one presence bitmap per component kind, with entity
//! ids doubling as dense indices into per-kind payload tables. The design
//! goal is cheap set algebra over large window populations: asking "every
//! entity with A and B but not C" folds three `u64` words per 64 entities
//! instead of walking anything.
//!
//! The store itself is type-erased. It only tracks presence bits; actual
//! payloads live in [`Table`]s owned by the caller, one per kind, indexed
//! by the same ids. Keeping the two separate means the hot query path
//! never touches payload memory, and the caller decides which kinds even
//! have payloads (markers are just bits).
//!
//! Ids are reused. [`EntityStore::allocate`] always returns the lowest
//! free slot, and capacity grows geometrically when the store is full.
//! The [`EntityStore::count_holes`] metric reports fragmentation below
//! the high-water mark for observability.
//!
//! # Basic usage
//!
//! ```
//! use swiss::{EntityStore, Query, Table, META};
//!
//! const POS: usize = 1;
//! const HIDDEN: usize = 2;
//!
//! let mut store = EntityStore::new(3, 4);
//! let mut pos: Table<(f32, f32)> = Table::new();
//!
//! let id = store.allocate();
//! store.add(POS, id);
//! pos.set(id, (10.0, 20.0));
//!
//! let q = Query::new().has(POS).not(HIDDEN);
//! let visible: Vec<_> = store.iter(&q).collect();
//! assert_eq!(visible, vec![id]);
//! assert_eq!(pos.get(id), Some(&(10.0, 20.0)));
//! ```
//!
//! # Queries
//!
//! A [`Query`] is a list of required kinds and a list of negated kinds.
//! Evaluation is bucket-at-a-time: for every 64-entity bucket the store
//! AND-folds the required bitmaps (on top of the `META` bitmap, which
//! tracks liveness) and AND-NOT-folds the negated ones, then iterates the
//! resulting word via find-first-set.
//!
//! The iterator captures each bucket word when it first reaches it and
//! clears bits as it yields ids. Component changes made mid-iteration are
//! visible for buckets the cursor has not reached yet; ids at or before
//! the cursor are never revisited.

use std::fmt;

#[cfg(test)]
mod tests;

/// Entity handle. A dense index into the store; reused after removal.
pub type EntityId = usize;

/// The liveness kind. Every allocated entity has `META`; removing the
/// entity clears it. Kind 0 is reserved for this in every store.
pub const META: usize = 0;

const BUCKET_SIZE: usize = 64;

fn num_buckets(capacity: usize) -> usize {
    capacity / BUCKET_SIZE + (capacity % BUCKET_SIZE != 0) as usize
}

/// A set of component requirements evaluated bucket-at-a-time.
///
/// `has` terms must all be present, `not` terms must all be absent.
/// Liveness (`META`) is implied and never needs to be listed.
#[derive(Clone, Debug, Default)]
pub struct Query {
    q_required: Vec<usize>,
    q_negated: Vec<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self {
            q_required: Vec::new(),
            q_negated: Vec::new(),
        }
    }

    /// Require this kind to be present.
    pub fn has<K: Into<usize>>(mut self, kind: K) -> Self {
        self.q_required.push(kind.into());
        self
    }

    /// Require this kind to be absent.
    pub fn not<K: Into<usize>>(mut self, kind: K) -> Self {
        self.q_negated.push(kind.into());
        self
    }
}

/// The entity store: one presence bitmap per component kind.
pub struct EntityStore {
    /// Number of slots every bitmap covers.
    s_capacity: usize,
    /// Number of live entities.
    s_size: usize,
    /// Lowest free slot, None when the store is full.
    s_first_free: Option<usize>,
    /// One bitmap per kind, each `num_buckets(capacity)` words long.
    s_bitmaps: Vec<Vec<u64>>,
    /// Kinds that must be released explicitly before entity removal.
    s_safemode: Vec<bool>,
}

impl fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("capacity", &self.s_capacity)
            .field("size", &self.s_size)
            .field("kinds", &self.s_bitmaps.len())
            .finish()
    }
}

impl EntityStore {
    /// Create a store tracking `num_kinds` component kinds (including
    /// `META`) with room for `initial_capacity` entities.
    pub fn new(num_kinds: usize, initial_capacity: usize) -> Self {
        assert!(num_kinds > 0);
        assert!(initial_capacity > 0);

        let buckets = num_buckets(initial_capacity);
        Self {
            s_capacity: initial_capacity,
            s_size: 0,
            s_first_free: Some(0),
            s_bitmaps: vec![vec![0; buckets]; num_kinds],
            s_safemode: vec![false; num_kinds],
        }
    }

    /// Mark a kind safe-mode: `remove()` will debug-assert if an entity
    /// still carries it. Used for kinds owning GPU resources that a
    /// system has to release by hand.
    pub fn disable_auto_remove<K: Into<usize>>(&mut self, kind: K) {
        let kind = kind.into();
        self.s_safemode[kind] = true;
    }

    pub fn capacity(&self) -> usize {
        self.s_capacity
    }

    pub fn size(&self) -> usize {
        self.s_size
    }

    fn grow(&mut self, new_capacity: usize) {
        let buckets = num_buckets(new_capacity);
        for bitmap in self.s_bitmaps.iter_mut() {
            bitmap.resize(buckets, 0);
        }
        self.s_capacity = new_capacity;
    }

    fn set_bit(&mut self, kind: usize, id: EntityId, present: bool) {
        let word = &mut self.s_bitmaps[kind][id / BUCKET_SIZE];
        let mask = 1u64 << (id % BUCKET_SIZE);
        if present {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    /// Fold one bucket of the query: meta AND required AND NOT negated.
    fn make_bucket(&self, query: &Query, bucket: usize) -> u64 {
        let mut key = self.s_bitmaps[META][bucket];
        for kind in query.q_required.iter() {
            key &= self.s_bitmaps[*kind][bucket];
        }
        for kind in query.q_negated.iter() {
            key &= !self.s_bitmaps[*kind][bucket];
        }
        key
    }

    /// Find the next id at or after `start` whose bit is clear in `kind`.
    fn find_next_free(&self, kind: usize, start: usize) -> Option<usize> {
        let bitmap = &self.s_bitmaps[kind];
        for bucket in (start / BUCKET_SIZE)..bitmap.len() {
            let mut word = !bitmap[bucket];
            if bucket == start / BUCKET_SIZE {
                // Mask off everything below the start offset
                word &= !0u64 << (start % BUCKET_SIZE);
            }
            if word == 0 {
                continue;
            }
            let index = bucket * BUCKET_SIZE + word.trailing_zeros() as usize;
            if index >= self.s_capacity {
                return None;
            }
            return Some(index);
        }
        None
    }

    /// Claim the lowest free id, growing capacity when full. The new
    /// entity carries only `META`.
    pub fn allocate(&mut self) -> EntityId {
        if self.s_first_free.is_none() {
            let new_capacity = self.s_capacity * 2;
            self.grow(new_capacity);
            self.s_first_free = self.find_next_free(META, 0);
        }

        let id = self.s_first_free.unwrap();
        self.set_bit(META, id, true);
        self.s_first_free = self.find_next_free(META, id + 1);
        self.s_size += 1;
        id
    }

    /// Release an entity, clearing every component bit it carries.
    ///
    /// Safe-mode kinds must have been removed explicitly already; in
    /// debug builds this asserts.
    pub fn remove(&mut self, id: EntityId) {
        assert!(self.has(META, id));

        for kind in 0..self.s_bitmaps.len() {
            if self.has(kind, id) {
                debug_assert!(
                    !self.s_safemode[kind],
                    "removing entity {} with live safe-mode component {}",
                    id, kind
                );
                self.set_bit(kind, id, false);
            }
        }

        match self.s_first_free {
            Some(first) if first < id => (),
            _ => self.s_first_free = Some(id),
        }
        self.s_size -= 1;
    }

    /// Mark a component present. The component must not already be
    /// present; use [`EntityStore::ensure`] for idempotent adds.
    pub fn add<K: Into<usize>>(&mut self, kind: K, id: EntityId) {
        let kind = kind.into();
        if kind != META {
            assert!(self.has(META, id));
        }
        assert!(!self.has(kind, id));
        self.set_bit(kind, id, true);
    }

    /// Mark a component present whether or not it already was.
    pub fn ensure<K: Into<usize>>(&mut self, kind: K, id: EntityId) {
        let kind = kind.into();
        assert!(self.has(META, id));
        self.set_bit(kind, id, true);
    }

    pub fn has<K: Into<usize>>(&self, kind: K, id: EntityId) -> bool {
        let kind = kind.into();
        let word = self.s_bitmaps[kind][id / BUCKET_SIZE];
        word & (1u64 << (id % BUCKET_SIZE)) != 0
    }

    pub fn remove_component<K: Into<usize>>(&mut self, kind: K, id: EntityId) {
        let kind = kind.into();
        self.set_bit(kind, id, false);
    }

    /// Clear a kind's bitmap wholesale. The per-frame transient kinds
    /// are dropped this way at the frame tail.
    pub fn reset_component<K: Into<usize>>(&mut self, kind: K) {
        let kind = kind.into();
        for word in self.s_bitmaps[kind].iter_mut() {
            *word = 0;
        }
    }

    /// Set `target`'s bitmap to exactly the query result, bucket by
    /// bucket. Buckets where the query is empty are left untouched.
    pub fn set_where<K: Into<usize>>(&mut self, target: K, query: &Query) {
        let target = target.into();
        for bucket in 0..num_buckets(self.s_capacity) {
            let key = self.make_bucket(query, bucket);
            if key == 0 {
                continue;
            }
            self.s_bitmaps[target][bucket] = key;
        }
    }

    /// Clear `target` on every entity matching the query.
    pub fn remove_where<K: Into<usize>>(&mut self, target: K, query: &Query) {
        let target = target.into();
        for bucket in 0..num_buckets(self.s_capacity) {
            let key = self.make_bucket(query, bucket);
            if key == 0 {
                continue;
            }
            self.s_bitmaps[target][bucket] &= !key;
        }
    }

    /// Set `target` on every entity matching the query.
    pub fn ensure_where<K: Into<usize>>(&mut self, target: K, query: &Query) {
        let target = target.into();
        for bucket in 0..num_buckets(self.s_capacity) {
            let key = self.make_bucket(query, bucket);
            if key == 0 {
                continue;
            }
            self.s_bitmaps[target][bucket] |= key;
        }
    }

    /// Count entities matching the query without iterating ids.
    pub fn count_where(&self, query: &Query) -> usize {
        let mut count = 0;
        for bucket in 0..num_buckets(self.s_capacity) {
            count += self.make_bucket(query, bucket).count_ones() as usize;
        }
        count
    }

    /// Number of unset `META` bits below the highest live id. Everything
    /// between the high-water mark and capacity is not fragmentation.
    pub fn count_holes(&self) -> usize {
        let mut holes = self.s_capacity;
        let mut highwater = 0;
        for bucket in 0..num_buckets(self.s_capacity) {
            let word = self.s_bitmaps[META][bucket];
            if word != 0 {
                let local = BUCKET_SIZE - word.leading_zeros() as usize;
                highwater = bucket * BUCKET_SIZE + local;
            }
            holes -= word.count_ones() as usize;
        }
        holes - (self.s_capacity - highwater)
    }

    /// Iterate ids matching the query in ascending order. The store is
    /// borrowed for the whole loop; systems that mutate components while
    /// walking a query use a [`QueryCursor`] instead.
    pub fn iter<'a>(&'a self, query: &'a Query) -> QueryIter<'a> {
        QueryIter {
            qi_store: self,
            qi_cursor: QueryCursor::new(query.clone()),
        }
    }
}

/// A resumable query walk that borrows the store only per step.
///
/// The cursor captures each bucket word when it first reaches it and
/// clears bits as it yields ids, so component changes made between steps
/// are visible for buckets the cursor has not reached and invisible at
/// or before it. This is what lets systems add and remove components on
/// the entities they are iterating.
#[derive(Clone, Debug)]
pub struct QueryCursor {
    c_query: Query,
    /// Current bucket index; usize::MAX before the first step.
    c_bucket: usize,
    /// Remaining bits of the captured bucket word.
    c_word: u64,
}

impl QueryCursor {
    pub fn new(query: Query) -> Self {
        Self {
            c_query: query,
            c_bucket: usize::MAX,
            c_word: 0,
        }
    }

    /// Yield the next matching id, or None when the walk is done.
    pub fn next(&mut self, store: &EntityStore) -> Option<EntityId> {
        let buckets = num_buckets(store.s_capacity);
        while self.c_word == 0 {
            self.c_bucket = self.c_bucket.wrapping_add(1);
            if self.c_bucket >= buckets {
                return None;
            }
            self.c_word = store.make_bucket(&self.c_query, self.c_bucket);
        }

        let offset = self.c_word.trailing_zeros() as usize;
        self.c_word ^= 1u64 << offset;
        let id = self.c_bucket * BUCKET_SIZE + offset;
        if id >= store.s_capacity {
            return None;
        }
        Some(id)
    }
}

/// Iterator adapter over [`QueryCursor`] for read-only walks.
pub struct QueryIter<'a> {
    qi_store: &'a EntityStore,
    qi_cursor: QueryCursor,
}

impl<'a> Iterator for QueryIter<'a> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        self.qi_cursor.next(self.qi_store)
    }
}

/// Payload storage for one component kind.
///
/// A growable column indexed by entity id. The store's bitmaps are the
/// source of truth for presence; the table just holds the data, so a
/// `get` on an id whose bit is clear returns whatever was left behind
/// only if the caller never cleared it. The compositor's typed wrappers
/// keep the two in sync.
#[derive(Debug)]
pub struct Table<T> {
    t_data: Vec<Option<T>>,
}

impl<T> Table<T> {
    pub fn new() -> Self {
        Self { t_data: Vec::new() }
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.t_data.get(id).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.t_data.get_mut(id).and_then(|slot| slot.as_mut())
    }

    pub fn set(&mut self, id: EntityId, val: T) {
        if id >= self.t_data.len() {
            self.t_data.resize_with(id + 1, || None);
        }
        self.t_data[id] = Some(val);
    }

    pub fn take(&mut self, id: EntityId) -> Option<T> {
        self.t_data.get_mut(id).and_then(|slot| slot.take())
    }

    /// Fetch-or-insert, for payloads with a cheap default.
    pub fn get_or_insert_with<F: FnOnce() -> T>(&mut self, id: EntityId, f: F) -> &mut T {
        if id >= self.t_data.len() {
            self.t_data.resize_with(id + 1, || None);
        }
        self.t_data[id].get_or_insert_with(f)
    }

    pub fn clear(&mut self) {
        for slot in self.t_data.iter_mut() {
            *slot = None;
        }
    }
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}
