/*!

An entity is just an id. It takes up no memory in the scene by itself; only
attached components do. Ids are minted by [`Scene::add`](crate::Scene::add)
starting from 1 and are recycled after [`Scene::remove`](crate::Scene::remove).

Two ids are reserved and never minted:

- `0` is the iteration sentinel: slot 0 of the first storage bucket anchors
  the jump table that iteration walks.
- [`INVALID_ENTITY`] (`u32::MAX`) is the in-band "no entity" value returned by
  an exhausted allocator or a missed search.

*/

/// The entity type. A plain 32-bit id; the only identity in the system.
pub type Entity = u32;

/// The reserved "no entity" id.
///
/// Returned by [`Scene::add`](crate::Scene::add) when the id space is
/// exhausted and by [`Scene::find_entity`](crate::Scene::find_entity) on a
/// search miss. Attaching components to it is a no-op.
pub const INVALID_ENTITY: Entity = Entity::MAX;
