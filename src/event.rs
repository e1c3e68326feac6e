/*!

The typed event channel.

Any `'static` type can be emitted as an event. Handlers are closures taking
`(&mut Scene, &Event)` and are registered under a subscription id; a
[`Subscription`] handle deregisters on drop, and a receiver type defined with
[`define_receiver!`](crate::define_receiver) registers one handler per listed
event type under a single subscription.

Two lifecycle events are built in and emitted by every container:
[`ComponentAddedEvent<C>`] after a component is constructed and
[`ComponentRemovedEvent<C>`] before one is destroyed. They carry the entity
id; the component value is observable through the scene for the duration of
the handler call (for removals, the value has not yet been destroyed).

Dispatch iterates a snapshot of the handler list, so handlers may register or
remove handlers (including themselves); such changes take effect on the next
emit of that event type. Re-entrant emits are allowed.

*/

use std::any::Any;
use std::cell::Cell;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::component::Component;
use crate::entity::Entity;
use crate::scene::Scene;

/// Emitted after a `C` component is constructed for an entity.
///
/// Also fires for the new value when an existing component is replaced
/// (preceded by a [`ComponentRemovedEvent`] for the old one).
pub struct ComponentAddedEvent<C: Component> {
    /// The entity that got the component.
    pub entity: Entity,
    marker: PhantomData<fn() -> C>,
}

/// Emitted before a `C` component is destroyed. The value is still readable
/// through [`Scene::get`](crate::Scene::get) during the handler call. The
/// scene destructor emits this for every component still alive at teardown.
pub struct ComponentRemovedEvent<C: Component> {
    /// The entity losing the component.
    pub entity: Entity,
    marker: PhantomData<fn() -> C>,
}

impl<C: Component> ComponentAddedEvent<C> {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            marker: PhantomData,
        }
    }
}

impl<C: Component> ComponentRemovedEvent<C> {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            marker: PhantomData,
        }
    }
}

impl<C: Component> Clone for ComponentAddedEvent<C> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<C: Component> Copy for ComponentAddedEvent<C> {}

impl<C: Component> Clone for ComponentRemovedEvent<C> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<C: Component> Copy for ComponentRemovedEvent<C> {}

/// One registered handler. The `active` flag is shared with any
/// [`Subscription`] handle so a dropped handle can retire the handler
/// without access to the scene.
#[derive(Clone)]
pub(crate) struct EventHandler {
    pub(crate) subscription: usize,
    pub(crate) active: Rc<Cell<bool>>,
    pub(crate) callback: Rc<dyn Fn(&mut Scene, &dyn Any)>,
}

/// Scoped event registration: dropping the handle deregisters every handler
/// added under its subscription id.
#[must_use = "dropping a Subscription immediately deregisters its handlers"]
pub struct Subscription {
    id: usize,
    active: Rc<Cell<bool>>,
}

impl Subscription {
    pub(crate) fn new(id: usize, active: Rc<Cell<bool>>) -> Self {
        Self { id, active }
    }

    /// The subscription id, usable with
    /// [`Scene::remove_event_handler`](crate::Scene::remove_event_handler).
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.set(false);
    }
}

/// An object receiving several event types at once. Implemented by
/// [`define_receiver!`](crate::define_receiver); registered with
/// [`Scene::add_receiver`](crate::Scene::add_receiver).
pub trait Receiver: 'static {
    fn register(
        this: &std::rc::Rc<std::cell::RefCell<Self>>,
        scene: &mut Scene,
        subscription: usize,
    ) where
        Self: Sized;
}

/// Wires a type's methods up as event handlers registered under one
/// subscription:
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct LifeCounter { alive: i64 }
///
/// impl LifeCounter {
///     fn on_added(&mut self, _scene: &mut Scene, _event: &ComponentAddedEvent<Alive>) {
///         self.alive += 1;
///     }
///     fn on_removed(&mut self, _scene: &mut Scene, _event: &ComponentRemovedEvent<Alive>) {
///         self.alive -= 1;
///     }
/// }
///
/// define_receiver!(LifeCounter {
///     ComponentAddedEvent<Alive> => on_added,
///     ComponentRemovedEvent<Alive> => on_removed,
/// });
/// ```
#[macro_export]
macro_rules! define_receiver {
    ($receiver:ty { $($event:ty => $method:ident),+ $(,)? }) => {
        impl $crate::event::Receiver for $receiver {
            fn register(
                this: &::std::rc::Rc<::std::cell::RefCell<Self>>,
                scene: &mut $crate::Scene,
                subscription: usize,
            ) {
                $(
                    let receiver = ::std::rc::Rc::clone(this);
                    scene.add_handler_under(
                        subscription,
                        move |scene: &mut $crate::Scene, event: &$event| {
                            receiver.borrow_mut().$method(scene, event);
                        },
                    );
                )+
            }
        }
    };
}
