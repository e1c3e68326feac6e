/*!

The per-component-type search index extension point.

A component type may associate an index through
`define_component!(Name, index = NameIndex)`. The container then invokes the
index's [`add_entity`](SearchIndex::add_entity) and
[`remove_entity`](SearchIndex::remove_entity) hooks on exactly the mutations
the scene emits lifecycle events for, so an index can maintain, say, a
name-to-entity map without observing events itself. The default index,
[`NoIndex`], does nothing; its [`ACTIVE`](SearchIndex::ACTIVE) flag is
`false`, which lets the container skip per-entity hook calls entirely for
unindexed types.

Indexes are consulted through [`Scene::find_entity`](crate::Scene::find_entity)
and friends. Lookups dispatch on the query-argument type via [`IndexLookup`];
an index supporting several lookup shapes implements the trait once per
argument type.

An index only sees mutations that go through the container. If a component
value is mutated in place (through `get_mut` or iteration), the index is
stale until [`Scene::update_search_index`](crate::Scene::update_search_index)
triggers a full [`refresh`](SearchIndex::refresh).

*/

use crate::component::Component;
use crate::entity::Entity;
use crate::scene::Scene;

/// Per-component-type acceleration structure maintained by the container.
///
/// `Default` is required so the scene can temporarily displace the index
/// while handing it a reference to the rest of the scene during
/// [`refresh`](Self::refresh).
pub trait SearchIndex<C: Component>: Default + 'static {
    /// Whether the container should invoke the per-entity hooks at all.
    /// `false` only for [`NoIndex`].
    const ACTIVE: bool = true;

    /// Called when `id`'s component is added, after construction.
    fn add_entity(&mut self, _id: Entity, _value: &C) {}

    /// Called when `id`'s component is removed, before destruction.
    fn remove_entity(&mut self, _id: Entity, _value: &C) {}

    /// Manual full rebuild. Never called automatically; the user triggers it
    /// through [`Scene::update_search_index`](crate::Scene::update_search_index).
    fn refresh(&mut self, _scene: &Scene) {}
}

/// Lookup dispatch for [`SearchIndex`] implementations. `Q` is the search
/// argument type; implement once per supported argument shape.
pub trait IndexLookup<Q> {
    /// Returns the matching entity, or
    /// [`INVALID_ENTITY`](crate::INVALID_ENTITY) if there is none.
    fn find(&self, query: Q) -> Entity;
}

/// The inert default index. Selected by `define_component!` unless the
/// definition names an index type.
#[derive(Default)]
pub struct NoIndex;

impl<C: Component> SearchIndex<C> for NoIndex {
    const ACTIVE: bool = false;
}
