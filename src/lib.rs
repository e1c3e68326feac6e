//! A sparse-storage entity-component-system runtime.
//!
//! Scena is the core of an ECS intended as a foundation for interactive
//! simulations such as games and agent worlds. It is a library, not an
//! application: there is no scheduler, no serialization, no CLI. The central
//! object is the [`Scene`], which owns:
//!
//! * an entity allocator minting 32-bit ids and recycling retired ones,
//! * one sparse container per registered component type, storing components
//!   in bucketed, stable-address cells with a bitmap-and-jump-table layout so
//!   iteration skips absent entities in O(1),
//! * a typed event bus carrying built-in
//!   [`ComponentAddedEvent`](event::ComponentAddedEvent) /
//!   [`ComponentRemovedEvent`](event::ComponentRemovedEvent) lifecycle events
//!   plus arbitrary user events,
//! * batching state that defers structural mutation, which is what makes
//!   attaching and removing components mid-iteration safe.
//!
//! Component types are plain user types registered with
//! [`define_component!`]:
//!
//! ```rust,ignore
//! use scena::prelude::*;
//!
//! #[derive(Clone)]
//! struct Age { years: u32 }
//! #[derive(Clone)]
//! struct Alive;                    // zero-sized tag: presence only
//!
//! define_component!(Age);
//! define_component!(Alive);
//!
//! let mut scene = Scene::new();
//! scene.add((Age { years: 0 }, Alive));
//!
//! scene.foreach::<(&mut Age, Option<&mut Alive>), _>(|scene, id, (age, alive)| {
//!     age.years += 1;
//!     if alive.is_some() && age.years > 40 {
//!         scene.remove(id);        // safe mid-iteration: applied at loop exit
//!     }
//! });
//! ```
//!
//! A scene is single-threaded and unsynchronized; wrap access externally if
//! you need parallelism. Fallible operations report in-band:
//! [`Scene::add`](Scene::add) returns [`INVALID_ENTITY`] on exhaustion,
//! lookups return `Option`/`false`, and searches return [`INVALID_ENTITY`]
//! on a miss.

pub mod component;
pub use component::{Component, ComponentBundle};

pub mod entity;
pub use entity::{Entity, INVALID_ENTITY};

pub mod event;
pub use event::{ComponentAddedEvent, ComponentRemovedEvent, Receiver, Subscription};

pub mod query;
pub use query::{Query, QueryParam};

pub mod scene;
pub use scene::Scene;

pub mod search;
pub use search::{IndexLookup, NoIndex, SearchIndex};

pub mod store;
pub use store::ComponentIter;

#[doc(hidden)]
pub mod registry;

pub mod prelude {
    pub use crate::component::{Component, ComponentBundle};
    pub use crate::entity::{Entity, INVALID_ENTITY};
    pub use crate::event::{ComponentAddedEvent, ComponentRemovedEvent, Receiver, Subscription};
    pub use crate::scene::Scene;
    pub use crate::search::{IndexLookup, NoIndex, SearchIndex};
    pub use crate::{define_component, define_receiver};
}
