/*!

Per-component-type sparse storage.

A [`ComponentStore<C>`] is a partial mapping `entity → C`. The entity keyspace
is partitioned into buckets of `2^B` slots (`B` chosen so a bucket of cells is
roughly 64 KiB, never below 6, overridable per type). Per bucket, lazily
allocated:

- a slot bitmap tracking which slots hold a live component,
- a jump table that lets iteration skip runs of absent slots in O(1),
- the cell array itself (omitted entirely for zero-sized tag components),
- while batching, a delta bitmap recording slots whose presence is pending
  change.

A top-level bitmap carries one bit per bucket with any live slot.

Jump-table encoding: slot 0 of bucket 0 holds the first live entity id (0 if
none). A live entity's slot holds the next live id, or 0 if it is the last.
The last slot of a run of absent entities holds the run's first slot, which
is what lets erase find the run boundary without scanning; run starts hold
the next live id where the erase path maintains them. Cell addresses never
change while a component is present, so references handed out by iteration
stay valid across insertions elsewhere.

While the owning scene is batching, `insert` and `erase` do not touch the
bitmap or jump table. Inserts construct their cell immediately (so `get`
observes them) and toggle the delta bit; erases only toggle the delta bit,
deferring the destructor. `contains` answers from the live bit XOR the delta
bit. Reconciliation walks the recorded checklist in reverse, applying only
net changes.

*/

use std::any::Any;
use std::collections::BTreeMap;
use std::mem::{self, MaybeUninit};
use std::ptr::{self, NonNull};

use log::{debug, trace};

use crate::component::Component;
use crate::entity::{Entity, INVALID_ENTITY};
use crate::event::ComponentRemovedEvent;
use crate::registry;
use crate::scene::Scene;
use crate::search::SearchIndex;

/// Bucket-size exponent for a component of `size` bytes: the smallest `B ≥ 6`
/// such that a bucket of cells reaches about 64 KiB.
const fn bucket_exp_for(size: usize) -> u32 {
    let unit = if size < 4 { 4 } else { size };
    let mut exp = 6u32;
    while (unit << exp) < 65536 {
        exp += 1;
    }
    exp
}

pub(crate) struct ComponentStore<C: Component> {
    /// Live component count. Stays at its pre-batch value while batching.
    len: usize,
    /// One bit per bucket: set iff the bucket has any live slot.
    top_mask: Vec<u64>,
    /// Per-bucket slot bitmaps.
    slot_masks: Vec<Option<Box<[u64]>>>,
    /// Per-bucket jump tables.
    jump_tables: Vec<Option<Box<[Entity]>>>,
    /// Per-bucket cell arrays. Never allocated for tag components.
    cells: Vec<Option<Box<[MaybeUninit<C>]>>>,
    /// Per-bucket pending-change bitmaps, populated only while batching.
    delta_masks: Vec<Option<Box<[u64]>>>,
    /// Entities whose delta bit was toggled this batch, in toggle order.
    checklist: Vec<Entity>,
    batching: bool,
    index: C::Index,
    added_event_key: usize,
    removed_event_key: usize,
}

impl<C: Component> ComponentStore<C> {
    const BUCKET_EXP: u32 = {
        let exp = match C::BUCKET_EXP_HINT {
            Some(exp) => exp,
            None => bucket_exp_for(mem::size_of::<C>()),
        };
        if exp < 6 {
            6
        } else {
            exp
        }
    };
    const BUCKET_CAPACITY: u32 = 1 << Self::BUCKET_EXP;
    const SLOT_MASK: u32 = Self::BUCKET_CAPACITY - 1;
    const MASK_WORDS: usize = (Self::BUCKET_CAPACITY >> 6) as usize;
    const IS_TAG: bool = mem::size_of::<C>() == 0;

    pub(crate) fn new() -> Self {
        Self {
            len: 0,
            top_mask: Vec::new(),
            slot_masks: Vec::new(),
            jump_tables: Vec::new(),
            cells: Vec::new(),
            delta_masks: Vec::new(),
            checklist: Vec::new(),
            batching: false,
            index: C::Index::default(),
            added_event_key: registry::event_key::<crate::event::ComponentAddedEvent<C>>(),
            removed_event_key: registry::event_key::<ComponentRemovedEvent<C>>(),
        }
    }

    #[inline]
    fn bucket_of(e: Entity) -> usize {
        (e >> Self::BUCKET_EXP) as usize
    }

    #[inline]
    fn slot_of(e: Entity) -> usize {
        (e & Self::SLOT_MASK) as usize
    }

    // ---- bitmap plumbing ----------------------------------------------

    /// Grows the parallel per-bucket arrays to cover `bucket`.
    fn ensure_bucket(&mut self, bucket: usize) {
        if self.slot_masks.len() <= bucket {
            self.slot_masks.resize_with(bucket + 1, || None);
            self.jump_tables.resize_with(bucket + 1, || None);
            self.cells.resize_with(bucket + 1, || None);
            self.delta_masks.resize_with(bucket + 1, || None);
        }
        let top_words = (bucket >> 6) + 1;
        if self.top_mask.len() < top_words {
            self.top_mask.resize(top_words, 0);
        }
    }

    fn zeroed_mask() -> Box<[u64]> {
        vec![0u64; Self::MASK_WORDS].into_boxed_slice()
    }

    #[inline]
    fn top_bit(&self, bucket: usize) -> bool {
        self.top_mask
            .get(bucket >> 6)
            .is_some_and(|w| w & (1 << (bucket & 63)) != 0)
    }

    fn set_slot_bit(&mut self, e: Entity) {
        let bucket = Self::bucket_of(e);
        self.ensure_bucket(bucket);
        let mask = self.slot_masks[bucket].get_or_insert_with(Self::zeroed_mask);
        let slot = Self::slot_of(e);
        mask[slot >> 6] |= 1 << (slot & 63);
        self.top_mask[bucket >> 6] |= 1 << (bucket & 63);
    }

    fn clear_slot_bit(&mut self, e: Entity) {
        let bucket = Self::bucket_of(e);
        let Some(mask) = self.slot_masks.get_mut(bucket).and_then(Option::as_mut) else {
            return;
        };
        let slot = Self::slot_of(e);
        mask[slot >> 6] &= !(1 << (slot & 63));
        if mask.iter().all(|&w| w == 0) {
            self.top_mask[bucket >> 6] &= !(1 << (bucket & 63));
        }
    }

    /// Live bit for `e`, ignoring any pending batch change.
    #[inline]
    pub(crate) fn contains_raw(&self, e: Entity) -> bool {
        let bucket = Self::bucket_of(e);
        match self.slot_masks.get(bucket).and_then(Option::as_ref) {
            Some(mask) => {
                let slot = Self::slot_of(e);
                mask[slot >> 6] & (1 << (slot & 63)) != 0
            }
            None => false,
        }
    }

    #[inline]
    fn delta_bit(&self, e: Entity) -> bool {
        let bucket = Self::bucket_of(e);
        match self.delta_masks.get(bucket).and_then(Option::as_ref) {
            Some(mask) => {
                let slot = Self::slot_of(e);
                mask[slot >> 6] & (1 << (slot & 63)) != 0
            }
            None => false,
        }
    }

    fn toggle_delta(&mut self, e: Entity) {
        let bucket = Self::bucket_of(e);
        self.ensure_bucket(bucket);
        let mask = self.delta_masks[bucket].get_or_insert_with(Self::zeroed_mask);
        let slot = Self::slot_of(e);
        mask[slot >> 6] ^= 1 << (slot & 63);
    }

    /// Presence as observed by `contains`/`get`: the live bit XOR the pending
    /// delta while batching.
    #[inline]
    pub(crate) fn contains(&self, e: Entity) -> bool {
        self.contains_raw(e) ^ self.delta_bit(e)
    }

    /// Highest nonempty bucket strictly below `bucket`, via a reverse word
    /// scan of the top-level bitmap.
    fn find_previous_bucket(&self, bucket: usize) -> Option<usize> {
        let words = &self.top_mask;
        if words.is_empty() {
            return None;
        }
        let mut w = bucket >> 6;
        if w >= words.len() {
            w = words.len();
        } else {
            let below = if bucket & 63 == 0 {
                0
            } else {
                words[w] & ((1u64 << (bucket & 63)) - 1)
            };
            if below != 0 {
                return Some((w << 6) + (63 - below.leading_zeros()) as usize);
            }
        }
        while w > 0 {
            w -= 1;
            if words[w] != 0 {
                return Some((w << 6) + (63 - words[w].leading_zeros()) as usize);
            }
        }
        None
    }

    /// Highest live entity in `bucket`. The bucket's top-level bit must be
    /// set.
    fn highest_live_in_bucket(&self, bucket: usize) -> Entity {
        let mask = self.slot_masks[bucket]
            .as_ref()
            .expect("top-level bit set for an unallocated bucket");
        for word in (0..Self::MASK_WORDS).rev() {
            if mask[word] != 0 {
                let bit = 63 - mask[word].leading_zeros();
                return ((bucket as u32) << Self::BUCKET_EXP) | ((word as u32) << 6) | bit;
            }
        }
        unreachable!("top-level bit set for an empty bucket");
    }

    /// The largest live entity below `e`, or 0 if there is none. Searches the
    /// current bucket's bitmap with a reverse bit scan, then falls back to
    /// the top-level bitmap.
    fn find_previous_live(&self, e: Entity) -> Entity {
        let bucket = Self::bucket_of(e);
        let slot = Self::slot_of(e);

        if let Some(mask) = self.slot_masks.get(bucket).and_then(Option::as_ref) {
            let mut word = slot >> 6;
            let below = if slot & 63 == 0 {
                0
            } else {
                mask[word] & ((1u64 << (slot & 63)) - 1)
            };
            if below != 0 {
                let bit = 63 - below.leading_zeros();
                return ((bucket as u32) << Self::BUCKET_EXP) | ((word as u32) << 6) | bit;
            }
            while word > 0 {
                word -= 1;
                if mask[word] != 0 {
                    let bit = 63 - mask[word].leading_zeros();
                    return ((bucket as u32) << Self::BUCKET_EXP) | ((word as u32) << 6) | bit;
                }
            }
        }

        match self.find_previous_bucket(bucket) {
            Some(b) => self.highest_live_in_bucket(b),
            None => 0,
        }
    }

    // ---- jump table ----------------------------------------------------

    #[inline]
    pub(crate) fn jump_get(&self, e: Entity) -> Entity {
        let bucket = Self::bucket_of(e);
        match self.jump_tables.get(bucket).and_then(Option::as_ref) {
            Some(table) => table[Self::slot_of(e)],
            None => 0,
        }
    }

    fn jump_set(&mut self, e: Entity, value: Entity) {
        let bucket = Self::bucket_of(e);
        self.ensure_bucket(bucket);
        let table = self.jump_tables[bucket]
            .get_or_insert_with(|| vec![0 as Entity; Self::BUCKET_CAPACITY as usize].into_boxed_slice());
        table[Self::slot_of(e)] = value;
    }

    /// Splices newly-live `e` into the jump chain. `e`'s live bit must
    /// already be set.
    fn jump_insert(&mut self, e: Entity) {
        // Slot 0 acts as a virtual live entity anchoring the chain, so a
        // missing predecessor resolves to it.
        let p = self.find_previous_live(e);
        let s = self.jump_get(p);
        self.jump_set(e, s);
        self.jump_set(p, e);
        if s != 0 && e + 1 < s {
            // The absent run continuing past `e` now starts at `e + 1`.
            self.jump_set(s - 1, e + 1);
        }
        if p + 1 < e {
            // The run preceding `e` now ends at `e - 1`.
            self.jump_set(e - 1, p + 1);
        }
    }

    /// Unlinks live `e` from the jump chain. Must run before `e`'s live bit
    /// is cleared.
    fn jump_erase(&mut self, e: Entity) {
        let s = self.jump_get(e);
        // The predecessor in two reads: `e - 1` is either live, or the tail
        // of the preceding absent run, which names the run start; the slot
        // just below that start is the live predecessor (0 anchors the
        // chain when the run leads the keyspace).
        let p = if e - 1 == 0 || self.contains_raw(e - 1) {
            e - 1
        } else {
            self.jump_get(e - 1) - 1
        };
        self.jump_set(p, s);
        if p + 1 < e {
            // The merged run's first slot keeps the next live id.
            self.jump_set(p + 1, s);
        }
        if s != 0 && s > p + 1 {
            // The merged run's tail points back at its start.
            self.jump_set(s - 1, p + 1);
        }
    }

    /// First live entity, or 0 if the store is empty. Slot 0 of bucket 0 is
    /// maintained as the chain anchor by both insert and erase.
    #[inline]
    pub(crate) fn first_live(&self) -> Entity {
        self.jump_get(0)
    }

    // ---- cells ---------------------------------------------------------

    #[inline]
    pub(crate) fn cell_ptr(&self, e: Entity) -> *mut C {
        if Self::IS_TAG {
            return NonNull::dangling().as_ptr();
        }
        let bucket = Self::bucket_of(e);
        let cells = self.cells[bucket]
            .as_ref()
            .expect("cell array not allocated for a stored component");
        cells.as_ptr().cast_mut().cast::<C>().wrapping_add(Self::slot_of(e))
    }

    fn ensure_cells(&mut self, e: Entity) {
        if Self::IS_TAG {
            return;
        }
        let bucket = Self::bucket_of(e);
        self.ensure_bucket(bucket);
        self.cells[bucket].get_or_insert_with(|| {
            (0..Self::BUCKET_CAPACITY)
                .map(|_| MaybeUninit::uninit())
                .collect::<Vec<_>>()
                .into_boxed_slice()
        });
    }

    fn construct_cell(&mut self, e: Entity, value: C) {
        if Self::IS_TAG {
            // Presence is the whole state; the value has no bytes to store,
            // but it may still own a destructor, which erase replays.
            mem::forget(value);
            return;
        }
        self.ensure_cells(e);
        unsafe { ptr::write(self.cell_ptr(e), value) };
    }

    fn destruct_cell(&mut self, e: Entity) {
        unsafe { ptr::drop_in_place(self.cell_ptr(e)) };
    }

    /// Shared reference to the stored value. Caller guarantees the cell is
    /// constructed.
    #[inline]
    unsafe fn read_cell(&self, e: Entity) -> &C {
        &*self.cell_ptr(e)
    }

    pub(crate) fn get(&self, e: Entity) -> Option<&C> {
        if self.contains(e) {
            Some(unsafe { self.read_cell(e) })
        } else {
            None
        }
    }

    pub(crate) fn get_mut(&mut self, e: Entity) -> Option<&mut C> {
        if self.contains(e) {
            Some(unsafe { &mut *self.cell_ptr(e) })
        } else {
            None
        }
    }

    // ---- mutation ------------------------------------------------------

    /// Installs `value` for `e`. Remove hooks and events for a replaced value
    /// are the scene's responsibility and have already run; this method adds
    /// the new value to the search index.
    pub(crate) fn insert(&mut self, e: Entity, value: C) {
        trace!("insert entity {e} into {}", std::any::type_name::<C>());
        if self.batching {
            match (self.contains_raw(e), self.delta_bit(e)) {
                // Replace in place; presence unchanged, delta untouched.
                (true, false) => {
                    self.destruct_cell(e);
                    self.construct_cell(e, value);
                }
                // A pending erase is reverted: its deferred destructor runs
                // now, and the delta flips back to "no change".
                (true, true) => {
                    self.destruct_cell(e);
                    self.construct_cell(e, value);
                    self.toggle_delta(e);
                }
                // A pending insert is replaced.
                (false, true) => {
                    self.destruct_cell(e);
                    self.construct_cell(e, value);
                }
                // Fresh pending insert: the cell is constructed immediately
                // so `get` observes it; bitmap and jump table wait for
                // reconciliation.
                (false, false) => {
                    self.construct_cell(e, value);
                    self.toggle_delta(e);
                    self.checklist.push(e);
                }
            }
        } else if self.contains_raw(e) {
            self.destruct_cell(e);
            self.construct_cell(e, value);
        } else {
            self.set_slot_bit(e);
            self.jump_insert(e);
            self.construct_cell(e, value);
            self.len += 1;
        }
        if C::Index::ACTIVE {
            let value = self.cell_ptr(e);
            self.index.add_entity(e, unsafe { &*value });
        }
    }

    /// Removes `e`'s component. Remove hooks and events have already run at
    /// the scene level; erase of an absent entity is a no-op.
    pub(crate) fn erase(&mut self, e: Entity) {
        trace!("erase entity {e} from {}", std::any::type_name::<C>());
        if self.batching {
            match (self.contains_raw(e), self.delta_bit(e)) {
                // Withdraw a pending insert: its cell dies immediately.
                (false, true) => {
                    self.destruct_cell(e);
                    self.toggle_delta(e);
                }
                // Live with no pending change: record the erase, defer the
                // destructor until reconciliation.
                (true, false) => {
                    self.toggle_delta(e);
                    self.checklist.push(e);
                }
                // Absent, or already pending erase.
                _ => {}
            }
        } else if self.contains_raw(e) {
            self.jump_erase(e);
            self.clear_slot_bit(e);
            self.destruct_cell(e);
            self.len -= 1;
        }
    }

    /// Runs the search-index remove hook for `e`'s current value.
    pub(crate) fn index_remove_current(&mut self, e: Entity) {
        if C::Index::ACTIVE && self.contains(e) {
            let value = self.cell_ptr(e);
            self.index.remove_entity(e, unsafe { &*value });
        }
    }

    pub(crate) fn start_batch(&mut self) {
        self.batching = true;
    }

    /// Applies all recorded net changes. Walks the checklist in reverse so
    /// the last toggle for an entity wins; entries whose delta bit has
    /// returned to zero net no change and are skipped.
    pub(crate) fn finish_batch(&mut self) {
        self.batching = false;
        let checklist = mem::take(&mut self.checklist);
        let mut applied = 0usize;
        for &e in checklist.iter().rev() {
            if !self.delta_bit(e) {
                continue;
            }
            self.toggle_delta(e);
            applied += 1;
            if self.contains_raw(e) {
                // Net erase: the cell still holds the pre-batch value.
                self.jump_erase(e);
                self.clear_slot_bit(e);
                self.destruct_cell(e);
                self.len -= 1;
            } else {
                // Net insert: the cell was constructed during the batch.
                self.set_slot_bit(e);
                self.jump_insert(e);
                self.len += 1;
            }
        }
        if applied > 0 {
            debug!(
                "reconciled {applied} of {} batched changes for {}",
                checklist.len(),
                std::any::type_name::<C>()
            );
        }
        self.checklist = checklist;
        self.checklist.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Event-type keys for this container's lifecycle events, resolved once
    /// at construction: `(added, removed)`.
    pub(crate) fn lifecycle_event_keys(&self) -> (usize, usize) {
        (self.added_event_key, self.removed_event_key)
    }

    pub(crate) fn take_index(&mut self) -> C::Index {
        mem::take(&mut self.index)
    }

    pub(crate) fn put_index(&mut self, index: C::Index) {
        self.index = index;
    }

    pub(crate) fn search_index(&self) -> &C::Index {
        &self.index
    }

    /// Destructs every live cell and releases all bucket allocations. Only
    /// valid outside a batch; batched clears go through per-entity `erase`.
    pub(crate) fn clear(&mut self) {
        debug_assert!(!self.batching);
        if mem::needs_drop::<C>() {
            let mut e = self.first_live();
            while e != 0 {
                self.destruct_cell(e);
                e = self.jump_get(e);
            }
        }
        self.len = 0;
        self.top_mask.clear();
        self.slot_masks.clear();
        self.jump_tables.clear();
        self.cells.clear();
        self.delta_masks.clear();
        self.checklist.clear();
    }

    // ---- iteration support ---------------------------------------------

    /// Live entities in ascending order (pre-batch view).
    pub(crate) fn live_entities(&self) -> LiveEntities<'_, C> {
        LiveEntities {
            store: self,
            next: self.first_live(),
        }
    }

    /// Entities as `contains` observes them, ascending: live entities minus
    /// pending erases, plus pending inserts.
    fn effective_entities(&self, out: &mut Vec<Entity>) {
        for e in self.live_entities() {
            if !self.delta_bit(e) {
                out.push(e);
            }
        }
        for &e in &self.checklist {
            if self.delta_bit(e) && !self.contains_raw(e) {
                out.push(e);
            }
        }
        // Pending inserts interleave with live ids, and the checklist can
        // mention an entity more than once.
        out.sort_unstable();
        out.dedup();
    }

    // ---- debug support -------------------------------------------------

    /// Verifies the bitmap / jump-table / count agreement the container
    /// promises outside a batch. Test aid, not part of the API.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        assert!(!self.batching, "invariants only hold outside a batch");

        let mut bit_count = 0usize;
        for mask in self.slot_masks.iter().flatten() {
            bit_count += mask.iter().map(|w| w.count_ones() as usize).sum::<usize>();
        }
        assert_eq!(bit_count, self.len, "bitmap population disagrees with len");

        let mut walked = 0usize;
        let mut prev = 0 as Entity;
        let mut e = self.first_live();
        while e != 0 {
            assert!(e > prev, "jump chain must ascend strictly");
            assert!(self.contains_raw(e), "jump chain visits absent entity {e}");
            walked += 1;
            prev = e;
            e = self.jump_get(e);
            assert!(walked <= self.len, "jump chain longer than len");
        }
        assert_eq!(walked, self.len, "jump chain shorter than len");

        // Absent-run tails must point back at their run start: for live `e`
        // with successor `s`, the run between them starts at `e + 1`.
        let mut e = self.first_live();
        while e != 0 {
            let s = self.jump_get(e);
            if s != 0 && s > e + 1 {
                assert!(!self.contains_raw(s - 1));
                assert_eq!(
                    self.jump_get(s - 1),
                    e + 1,
                    "absent-run tail before {s} must point at its run start"
                );
            }
            e = s;
        }

        // The leading run's tail points at slot 1, and the anchor at the
        // first live entity.
        let first = self.first_live();
        if first > 1 {
            assert_eq!(self.jump_get(first - 1), 1);
        }
    }
}

impl<C: Component> Drop for ComponentStore<C> {
    fn drop(&mut self) {
        if !mem::needs_drop::<C>() {
            return;
        }
        // Live bits cover both settled values and pending erases; pending
        // inserts live only in the checklist.
        let mut e = self.first_live();
        while e != 0 {
            unsafe { ptr::drop_in_place(self.cell_ptr(e)) };
            e = self.jump_get(e);
        }
        let checklist = mem::take(&mut self.checklist);
        for &e in &checklist {
            if self.delta_bit(e) && !self.contains_raw(e) {
                self.toggle_delta(e);
                unsafe { ptr::drop_in_place(self.cell_ptr(e)) };
            }
        }
    }
}

pub(crate) struct LiveEntities<'a, C: Component> {
    store: &'a ComponentStore<C>,
    next: Entity,
}

impl<C: Component> Iterator for LiveEntities<'_, C> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        if self.next == 0 {
            return None;
        }
        let e = self.next;
        self.next = self.store.jump_get(e);
        Some(e)
    }
}

/// Read-only walk over `(entity, &C)` pairs in ascending entity order,
/// surfaced as [`Scene::components`](crate::Scene::components).
pub struct ComponentIter<'a, C: Component> {
    inner: Option<LiveEntities<'a, C>>,
}

impl<'a, C: Component> ComponentIter<'a, C> {
    pub(crate) fn new(store: Option<&'a ComponentStore<C>>) -> Self {
        Self {
            inner: store.map(ComponentStore::live_entities),
        }
    }
}

impl<'a, C: Component> Iterator for ComponentIter<'a, C> {
    type Item = (Entity, &'a C);

    fn next(&mut self) -> Option<Self::Item> {
        let inner = self.inner.as_mut()?;
        let e = inner.next()?;
        Some((e, unsafe { inner.store.read_cell(e) }))
    }
}

// ---- type-erased surface ------------------------------------------------

/// The type-agnostic operations the scene drives across all containers.
/// Typed lifecycle emission from erased contexts goes through monomorphized
/// fn-pointer thunks rather than downcast chains.
pub(crate) trait ErasedStore: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn len(&self) -> usize;
    fn contains(&self, id: Entity) -> bool;
    fn start_batch(&mut self);
    fn finish_batch(&mut self);
    fn erase(&mut self, id: Entity);
    fn clear(&mut self);
    fn effective_entities(&self, out: &mut Vec<Entity>);
    fn index_remove_current(&mut self, id: Entity);
    fn index_active(&self) -> bool;
    fn removed_event_key(&self) -> usize;
    fn removed_emitter(&self) -> fn(&mut Scene, Entity);
    fn index_refresher(&self) -> fn(&mut Scene);
    fn list_entities(&self, table: &mut BTreeMap<Entity, Entity>);
    fn concat_into(&self, target: &mut Scene, table: &BTreeMap<Entity, Entity>);
    fn copy_into(&self, target: &mut Scene, result_id: Entity, original_id: Entity);
}

fn emit_removed<C: Component>(scene: &mut Scene, id: Entity) {
    scene.emit(ComponentRemovedEvent::<C>::new(id));
}

fn refresh_index<C: Component>(scene: &mut Scene) {
    scene.update_search_index::<C>();
}

impl<C: Component> ErasedStore for ComponentStore<C> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn len(&self) -> usize {
        ComponentStore::len(self)
    }

    fn contains(&self, id: Entity) -> bool {
        ComponentStore::contains(self, id)
    }

    fn start_batch(&mut self) {
        ComponentStore::start_batch(self);
    }

    fn finish_batch(&mut self) {
        ComponentStore::finish_batch(self);
    }

    fn erase(&mut self, id: Entity) {
        ComponentStore::erase(self, id);
    }

    fn clear(&mut self) {
        ComponentStore::clear(self);
    }

    fn effective_entities(&self, out: &mut Vec<Entity>) {
        ComponentStore::effective_entities(self, out);
    }

    fn index_remove_current(&mut self, id: Entity) {
        ComponentStore::index_remove_current(self, id);
    }

    fn index_active(&self) -> bool {
        C::Index::ACTIVE
    }

    fn removed_event_key(&self) -> usize {
        self.removed_event_key
    }

    fn removed_emitter(&self) -> fn(&mut Scene, Entity) {
        emit_removed::<C>
    }

    fn index_refresher(&self) -> fn(&mut Scene) {
        refresh_index::<C>
    }

    fn list_entities(&self, table: &mut BTreeMap<Entity, Entity>) {
        for e in self.live_entities() {
            table.insert(e, INVALID_ENTITY);
        }
    }

    fn concat_into(&self, target: &mut Scene, table: &BTreeMap<Entity, Entity>) {
        for e in self.live_entities() {
            let value = unsafe { self.read_cell(e) };
            if let Some(copy) = value.duplicate() {
                if let Some(&new_id) = table.get(&e) {
                    target.attach_one(new_id, copy);
                }
            }
        }
    }

    fn copy_into(&self, target: &mut Scene, result_id: Entity, original_id: Entity) {
        if let Some(value) = self.get(original_id) {
            if let Some(copy) = value.duplicate() {
                target.attach_one(result_id, copy);
            }
        }
    }
}
