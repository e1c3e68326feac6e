/*!

The scene: top-level owner of entities, containers, and the event bus.

Entities are created through it, components are attached through it, and
events are routed through it. A scene is strictly single-threaded; it holds
no internal synchronization and hands `Rc`-based handler state around
freely.

Lifecycle emission is phased so handlers can observe the affected value:
the scene checks container state, runs the search-index hook, emits, then
re-checks before mutating, which makes re-entrant handlers (ones that attach
or detach the very component being changed) safe.

*/

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::mem;
use std::rc::Rc;

use log::debug;

use crate::component::{Component, ComponentBundle};
use crate::entity::{Entity, INVALID_ENTITY};
use crate::event::{
    ComponentAddedEvent, ComponentRemovedEvent, EventHandler, Receiver, Subscription,
};
use crate::query::Query;
use crate::registry;
use crate::search::{IndexLookup, SearchIndex};
use crate::store::{ComponentIter, ComponentStore, ErasedStore};

pub struct Scene {
    /// Next fresh id. Starts at 1; id 0 is the iteration sentinel.
    next_id: Entity,
    recyclable_ids: Vec<Entity>,
    /// Ids retired while batching; they join `recyclable_ids` when the
    /// outermost batch finishes so nothing inside the batch can re-mint them.
    deferred_recyclable_ids: Vec<Entity>,
    defer_depth: i32,
    /// Containers indexed by component type key.
    containers: Vec<Option<Box<dyn ErasedStore>>>,
    /// Handler lists indexed by event type key.
    event_handlers: Vec<Vec<EventHandler>>,
    subscription_counter: usize,
}

impl Scene {
    pub fn new() -> Scene {
        Scene {
            next_id: 1,
            recyclable_ids: Vec::new(),
            deferred_recyclable_ids: Vec::new(),
            defer_depth: 0,
            containers: Vec::new(),
            event_handlers: Vec::new(),
            subscription_counter: 0,
        }
    }

    // ---- entities ------------------------------------------------------

    fn mint(&mut self) -> Entity {
        if let Some(id) = self.recyclable_ids.pop() {
            return id;
        }
        if self.next_id == INVALID_ENTITY {
            return INVALID_ENTITY;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Creates an entity and attaches the given components. Pass `()` for an
    /// empty entity; creating one is just a counter increment.
    ///
    /// Returns [`INVALID_ENTITY`] when the id space is exhausted.
    pub fn add<B: ComponentBundle>(&mut self, bundle: B) -> Entity {
        let id = self.mint();
        if id != INVALID_ENTITY {
            bundle.attach_to(self, id);
        }
        id
    }

    /// Attaches a tuple of components to an existing entity. Components the
    /// entity already has are replaced (emitting a removal for the old value
    /// first); declared dependencies are attached before their dependents.
    pub fn attach<B: ComponentBundle>(&mut self, id: Entity, bundle: B) {
        bundle.attach_to(self, id);
    }

    /// Attaches a default-constructed `C` to `id`.
    pub fn emplace<C: Component + Default>(&mut self, id: Entity) {
        self.attach_one(id, C::default());
    }

    pub(crate) fn attach_one<C: Component>(&mut self, id: Entity, value: C) {
        if id == 0 || id == INVALID_ENTITY {
            return;
        }
        C::ensure_dependencies(self, id);
        self.ensure_store::<C>();
        let store = self.store_mut::<C>();
        let (added_key, removed_key) = store.lifecycle_event_keys();
        let replacing = store.contains(id);
        if replacing {
            store.index_remove_current(id);
            self.emit_keyed(removed_key, ComponentRemovedEvent::<C>::new(id));
        }
        self.store_mut::<C>().insert(id, value);
        self.emit_keyed(added_key, ComponentAddedEvent::<C>::new(id));
    }

    /// Removes `id`'s `C` component, if any. The id itself stays live.
    pub fn detach<C: Component>(&mut self, id: Entity) {
        let present = self
            .store_ref::<C>()
            .is_some_and(|store| store.contains(id));
        if !present {
            return;
        }
        let store = self.store_mut::<C>();
        let (_, removed_key) = store.lifecycle_event_keys();
        store.index_remove_current(id);
        self.emit_keyed(removed_key, ComponentRemovedEvent::<C>::new(id));
        self.store_mut::<C>().erase(id);
    }

    /// Removes every component of `id` and releases the id for reuse.
    pub fn remove(&mut self, id: Entity) {
        if id == 0 || id == INVALID_ENTITY {
            return;
        }
        for key in 0..self.containers.len() {
            let emitter = match self.containers[key].as_mut() {
                Some(store) if store.contains(id) => {
                    store.index_remove_current(id);
                    Some(store.removed_emitter())
                }
                _ => None,
            };
            if let Some(emit_removed) = emitter {
                emit_removed(self, id);
                if let Some(store) = self.containers[key].as_mut() {
                    store.erase(id);
                }
            }
        }
        if self.defer_depth > 0 {
            self.deferred_recyclable_ids.push(id);
        } else {
            self.recyclable_ids.push(id);
        }
    }

    /// Removes every component of every entity. Outside a batch this also
    /// resets the id counter, so previously minted ids become invalid.
    ///
    /// Containers clear in type-key order; within a container, entities go in
    /// ascending order.
    pub fn clear_entities(&mut self) {
        debug!("clearing all entities");
        let mut scratch = Vec::new();
        for key in 0..self.containers.len() {
            let Some(store) = self.containers[key].as_ref() else {
                continue;
            };
            let per_entity = self.defer_depth > 0
                || store.index_active()
                || self.handler_count_for_key(store.removed_event_key()) > 0;
            if !per_entity {
                if let Some(store) = self.containers[key].as_mut() {
                    store.clear();
                }
                continue;
            }

            scratch.clear();
            store.effective_entities(&mut scratch);
            let emitter = store.removed_emitter();
            for &e in &scratch {
                match self.containers[key].as_mut() {
                    // A handler for an earlier entity may have erased this one.
                    Some(store) if store.contains(e) => store.index_remove_current(e),
                    _ => continue,
                }
                emitter(self, e);
                if let Some(store) = self.containers[key].as_mut() {
                    store.erase(e);
                }
            }
        }
        if self.defer_depth == 0 {
            self.next_id = 1;
            self.recyclable_ids.clear();
            self.deferred_recyclable_ids.clear();
        }
    }

    // ---- queries -------------------------------------------------------

    /// Shared access to `id`'s `C` component.
    pub fn get<C: Component>(&self, id: Entity) -> Option<&C> {
        self.store_ref::<C>()?.get(id)
    }

    /// Exclusive access to `id`'s `C` component. In-place mutation does not
    /// refresh the type's search index; see
    /// [`update_search_index`](Self::update_search_index).
    pub fn get_mut<C: Component>(&mut self, id: Entity) -> Option<&mut C> {
        self.store_opt_mut::<C>()?.get_mut(id)
    }

    pub fn has<C: Component>(&self, id: Entity) -> bool {
        self.store_ref::<C>()
            .is_some_and(|store| store.contains(id))
    }

    /// Number of entities carrying `C`. While batching this stays at its
    /// pre-batch value.
    pub fn count<C: Component>(&self) -> usize {
        self.store_ref::<C>().map_or(0, ComponentStore::len)
    }

    /// Read-only walk over `(entity, &C)` in ascending entity order.
    pub fn components<C: Component>(&self) -> ComponentIter<'_, C> {
        ComponentIter::new(self.store_ref::<C>())
    }

    /// Calls `f` once per entity matching the query `Q`, in ascending entity
    /// order; see the [`query`](crate::query) module. The loop runs inside an
    /// implicit batch, so `f` may mutate the scene it is handed.
    pub fn foreach<Q: Query, F>(&mut self, f: F)
    where
        F: for<'a> FnMut(&mut Scene, Entity, Q::Item<'a>),
    {
        Q::run(self, f);
    }

    // ---- batching ------------------------------------------------------

    /// Begins deferring structural mutation. Batches nest; reconciliation
    /// runs when the depth returns to zero.
    pub fn start_batch(&mut self) {
        self.defer_depth += 1;
        if self.defer_depth == 1 {
            for store in self.containers.iter_mut().flatten() {
                store.start_batch();
            }
        }
    }

    /// Leaves one level of batching; the outermost finish applies all
    /// recorded changes and releases ids retired during the batch.
    pub fn finish_batch(&mut self) {
        if self.defer_depth == 0 {
            return;
        }
        self.defer_depth -= 1;
        if self.defer_depth == 0 {
            for store in self.containers.iter_mut().flatten() {
                store.finish_batch();
            }
            let deferred = mem::take(&mut self.deferred_recyclable_ids);
            self.recyclable_ids.extend(deferred);
        }
    }

    // ---- scene-to-scene transfer ---------------------------------------

    /// Copies all entities of `other` into this scene, minting fresh ids.
    /// Components registered `clone = false` are silently skipped; event
    /// handlers are not copied. `other` should not be mid-batch.
    ///
    /// When `translation_table` is given it receives the old-to-new id
    /// correspondence.
    pub fn concat(&mut self, other: &Scene, translation_table: Option<&mut BTreeMap<Entity, Entity>>) {
        let mut table = BTreeMap::new();
        for store in other.containers.iter().flatten() {
            store.list_entities(&mut table);
        }
        debug!("concat of {} entities", table.len());

        self.start_batch();
        for new_id in table.values_mut() {
            *new_id = self.mint();
        }
        for store in other.containers.iter().flatten() {
            store.concat_into(self, &table);
        }
        self.finish_batch();

        if let Some(out) = translation_table {
            *out = table;
        }
    }

    /// Copies one entity of `other` into this scene, returning the new id.
    /// Skips components registered `clone = false`.
    pub fn copy(&mut self, other: &Scene, other_id: Entity) -> Entity {
        let id = self.mint();
        if id == INVALID_ENTITY {
            return id;
        }
        for store in other.containers.iter().flatten() {
            store.copy_into(self, id, other_id);
        }
        id
    }

    // ---- events --------------------------------------------------------

    /// Calls every registered handler for `E`'s type, in registration order.
    /// Handlers registered or removed during dispatch take effect on the
    /// next emit.
    pub fn emit<E: 'static>(&mut self, event: E) {
        self.emit_keyed(registry::event_key::<E>(), event);
    }

    /// Emit with the event key already resolved; containers cache their
    /// lifecycle keys so per-component traffic skips the registry.
    pub(crate) fn emit_keyed<E: 'static>(&mut self, key: usize, event: E) {
        let Some(handlers) = self.event_handlers.get(key) else {
            return;
        };
        if handlers.is_empty() {
            return;
        }
        let snapshot = handlers.clone();
        for handler in &snapshot {
            if handler.active.get() {
                (handler.callback)(&mut *self, &event);
            }
        }
    }

    /// Registers an event handler; returns its subscription id for
    /// [`remove_event_handler`](Self::remove_event_handler).
    pub fn add_event_handler<E: 'static>(
        &mut self,
        handler: impl Fn(&mut Scene, &E) + 'static,
    ) -> usize {
        let id = self.next_subscription();
        self.add_handler_under(id, handler);
        id
    }

    /// Registers a handler under an existing subscription id. Used by
    /// receiver registration; `add_event_handler` is the public entry point.
    #[doc(hidden)]
    pub fn add_handler_under<E: 'static>(
        &mut self,
        subscription: usize,
        handler: impl Fn(&mut Scene, &E) + 'static,
    ) {
        let active = self.flag_for(subscription);
        let key = registry::event_key::<E>();
        if self.event_handlers.len() <= key {
            self.event_handlers.resize_with(key + 1, Vec::new);
        }
        let list = &mut self.event_handlers[key];
        list.retain(|h| h.active.get());
        list.push(EventHandler {
            subscription,
            active,
            callback: Rc::new(move |scene, any| {
                let event = any
                    .downcast_ref::<E>()
                    .expect("event type mismatch in handler dispatch");
                handler(scene, event);
            }),
        });
    }

    /// Removes every handler registered under `id`.
    pub fn remove_event_handler(&mut self, id: usize) {
        for list in &mut self.event_handlers {
            list.retain(|h| {
                if h.subscription == id {
                    h.active.set(false);
                    false
                } else {
                    h.active.get()
                }
            });
        }
    }

    /// Registers a handler whose lifetime is scoped to the returned
    /// [`Subscription`]: dropping it deregisters the handler.
    pub fn subscribe<E: 'static>(
        &mut self,
        handler: impl Fn(&mut Scene, &E) + 'static,
    ) -> Subscription {
        let id = self.add_event_handler(handler);
        Subscription::new(id, self.flag_for(id))
    }

    /// Registers all handlers of a receiver under one subscription id.
    pub fn add_receiver<R: Receiver>(&mut self, receiver: &Rc<RefCell<R>>) -> usize {
        let id = self.next_subscription();
        R::register(receiver, self, id);
        id
    }

    /// Number of live handlers for event type `E`.
    pub fn handler_count<E: 'static>(&self) -> usize {
        self.handler_count_for_key(registry::event_key::<E>())
    }

    fn next_subscription(&mut self) -> usize {
        let id = self.subscription_counter;
        self.subscription_counter += 1;
        id
    }

    fn handler_count_for_key(&self, key: usize) -> usize {
        self.event_handlers
            .get(key)
            .map_or(0, |list| list.iter().filter(|h| h.active.get()).count())
    }

    /// The shared active flag for a subscription, so that every handler
    /// registered under one id retires together.
    fn flag_for(&self, subscription: usize) -> Rc<Cell<bool>> {
        for list in &self.event_handlers {
            for handler in list {
                if handler.subscription == subscription {
                    return Rc::clone(&handler.active);
                }
            }
        }
        Rc::new(Cell::new(true))
    }

    // ---- search indexes ------------------------------------------------

    /// Looks up an entity through `C`'s search index. Returns
    /// [`INVALID_ENTITY`] on a miss or when `C` has no container yet.
    pub fn find_entity<C: Component, Q>(&self, query: Q) -> Entity
    where
        C::Index: IndexLookup<Q>,
    {
        match self.store_ref::<C>() {
            Some(store) => store.search_index().find(query),
            None => INVALID_ENTITY,
        }
    }

    /// Looks up a component value through `C`'s search index.
    pub fn find_component<C: Component, Q>(&self, query: Q) -> Option<&C>
    where
        C::Index: IndexLookup<Q>,
    {
        let id = self.find_entity::<C, Q>(query);
        if id == INVALID_ENTITY {
            None
        } else {
            self.get::<C>(id)
        }
    }

    /// Runs a full refresh of `C`'s search index.
    pub fn update_search_index<C: Component>(&mut self) {
        self.ensure_store::<C>();
        let mut index = self.store_mut::<C>().take_index();
        index.refresh(self);
        self.store_mut::<C>().put_index(index);
    }

    /// Refreshes the search index of every component type that has one.
    pub fn update_search_indices(&mut self) {
        for key in 0..self.containers.len() {
            let refresher = match self.containers[key].as_ref() {
                Some(store) if store.index_active() => store.index_refresher(),
                _ => continue,
            };
            refresher(self);
        }
    }

    // ---- container plumbing --------------------------------------------

    fn ensure_store<C: Component>(&mut self) {
        let key = C::type_key();
        if self.containers.len() <= key {
            self.containers.resize_with(key + 1, || None);
        }
        if self.containers[key].is_none() {
            let mut store = ComponentStore::<C>::new();
            if self.defer_depth > 0 {
                store.start_batch();
            }
            self.containers[key] = Some(Box::new(store));
        }
    }

    fn store_ref<C: Component>(&self) -> Option<&ComponentStore<C>> {
        self.containers
            .get(C::type_key())?
            .as_ref()?
            .as_any()
            .downcast_ref()
    }

    fn store_opt_mut<C: Component>(&mut self) -> Option<&mut ComponentStore<C>> {
        self.containers
            .get_mut(C::type_key())?
            .as_mut()?
            .as_any_mut()
            .downcast_mut()
    }

    fn store_mut<C: Component>(&mut self) -> &mut ComponentStore<C> {
        self.ensure_store::<C>();
        self.store_opt_mut::<C>()
            .expect("container exists after ensure_store")
    }

    pub(crate) fn store_ptr<C: Component>(&mut self) -> *mut ComponentStore<C> {
        self.store_mut::<C>()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        // Emits removals for every surviving component before the handler
        // tables go away with the rest of the fields.
        self.clear_entities();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_component;

    #[derive(Clone, Debug, PartialEq)]
    struct Hp(u32);
    define_component!(Hp);

    #[derive(Clone, Debug, PartialEq)]
    struct Mana(u32);
    define_component!(Mana);

    #[test]
    fn ids_ascend_from_one() {
        let mut scene = Scene::new();
        assert_eq!(scene.add(()), 1);
        assert_eq!(scene.add(()), 2);
        assert_eq!(scene.add(()), 3);
    }

    #[test]
    fn removed_ids_are_recycled() {
        let mut scene = Scene::new();
        let a = scene.add((Hp(1),));
        let _b = scene.add((Hp(2),));
        scene.remove(a);
        assert_eq!(scene.add(()), a, "retired id is minted again");
        assert_eq!(scene.add(()), 3);
    }

    #[test]
    fn remove_during_batch_defers_recycling() {
        let mut scene = Scene::new();
        let a = scene.add((Hp(1),));
        scene.start_batch();
        scene.remove(a);
        let fresh = scene.add(());
        assert_ne!(fresh, a, "retired id must not be re-minted inside the batch");
        scene.finish_batch();
        assert_eq!(scene.add(()), a);
    }

    #[test]
    fn exhaustion_returns_invalid() {
        let mut scene = Scene::new();
        scene.next_id = INVALID_ENTITY;
        assert_eq!(scene.add(()), INVALID_ENTITY);
        // A recyclable id still satisfies the request.
        scene.recyclable_ids.push(42);
        assert_eq!(scene.add(()), 42);
        assert_eq!(scene.add(()), INVALID_ENTITY);
    }

    #[test]
    fn attach_to_reserved_ids_is_a_no_op() {
        let mut scene = Scene::new();
        scene.attach(INVALID_ENTITY, (Hp(1),));
        scene.attach(0, (Hp(1),));
        assert_eq!(scene.count::<Hp>(), 0);
    }

    #[test]
    fn get_and_has_answer_per_type() {
        let mut scene = Scene::new();
        let id = scene.add((Hp(5),));
        assert!(scene.has::<Hp>(id));
        assert!(!scene.has::<Mana>(id));
        assert_eq!(scene.get::<Hp>(id), Some(&Hp(5)));
        assert_eq!(scene.get::<Mana>(id), None);

        scene.get_mut::<Hp>(id).unwrap().0 = 9;
        assert_eq!(scene.get::<Hp>(id), Some(&Hp(9)));
    }

    #[test]
    fn detach_keeps_the_entity_alive() {
        let mut scene = Scene::new();
        let id = scene.add((Hp(1), Mana(2)));
        scene.detach::<Hp>(id);
        assert!(!scene.has::<Hp>(id));
        assert!(scene.has::<Mana>(id));
        // The id was not recycled.
        assert_ne!(scene.add(()), id);
    }

    #[test]
    fn clear_entities_resets_the_allocator() {
        let mut scene = Scene::new();
        scene.add((Hp(1),));
        let b = scene.add((Hp(2),));
        scene.remove(b);
        scene.clear_entities();
        assert_eq!(scene.count::<Hp>(), 0);
        assert_eq!(scene.add(()), 1, "counter restarts after clear");
    }

    #[test]
    fn clear_entities_inside_batch_defers() {
        let mut scene = Scene::new();
        let id = scene.add((Hp(1),));
        scene.start_batch();
        scene.clear_entities();
        assert!(!scene.has::<Hp>(id), "cleared component is hidden at once");
        assert_eq!(scene.count::<Hp>(), 1, "count stays pre-batch");
        scene.finish_batch();
        assert_eq!(scene.count::<Hp>(), 0);
    }

    #[test]
    fn emplace_attaches_defaults() {
        #[derive(Clone, Default, Debug, PartialEq)]
        struct Flagged(bool);
        define_component!(Flagged);

        let mut scene = Scene::new();
        let id = scene.add(());
        scene.emplace::<Flagged>(id);
        assert_eq!(scene.get::<Flagged>(id), Some(&Flagged(false)));
    }

    #[test]
    fn components_iterates_ascending() {
        let mut scene = Scene::new();
        let mut ids = Vec::new();
        for i in 0..5u32 {
            ids.push(scene.add((Hp(i),)));
        }
        let walked: Vec<_> = scene.components::<Hp>().map(|(e, hp)| (e, hp.0)).collect();
        assert_eq!(
            walked,
            ids.iter().enumerate().map(|(i, &e)| (e, i as u32)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn batched_ops_match_unbatched_results() {
        let run = |batched: bool| {
            let mut scene = Scene::new();
            let ids: Vec<_> = (0..10).map(|i| scene.add((Hp(i),))).collect();
            if batched {
                scene.start_batch();
            }
            for (i, &id) in ids.iter().enumerate() {
                if i % 2 == 0 {
                    scene.detach::<Hp>(id);
                } else {
                    scene.attach(id, (Mana(i as u32),));
                }
            }
            if batched {
                scene.finish_batch();
            }
            (scene.count::<Hp>(), scene.count::<Mana>())
        };
        assert_eq!(run(false), run(true));
    }
}
