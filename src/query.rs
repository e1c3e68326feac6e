/*!

The iteration engine behind [`Scene::foreach`](crate::Scene::foreach).

A query is a marker type describing the component tuple to visit: `&mut C`
marks a required component, `Option<&mut C>` an optional one. The callback is
invoked once per entity that has every required component, in ascending
entity order, with `None` standing in for absent optionals:

```rust,ignore
scene.foreach::<(&mut Age, Option<&mut Name>), _>(|scene, id, (age, name)| {
    age.years += 1;
    if let Some(name) = name {
        log::info!("{} had a birthday", name.0);
    }
});
```

Driving-iterator selection: with no required components the engine walks the
union of the optionals, advancing whichever cursor sits at the minimum id.
Otherwise the shortest required container drives (its size bounds the yield),
every other required cursor is asked to position at exactly the driver's
entity, and optional cursors contribute their value when they coincide. A
single required component walks its container's jump table directly.

`foreach` brackets the loop in a batch, so the callback may freely attach and
detach components or add and remove entities through the scene it is handed:
cursors observe the pre-batch jump table, inserts are invisible until the
loop exits, and erased entities still yield their pre-batch values (their
destructors run at reconciliation). Two restrictions hold inside the loop:
don't replace a component whose reference the callback currently holds, and
don't call `finish_batch` by hand. A query naming the same component type
twice panics.

*/

use crate::component::Component;
use crate::entity::Entity;
use crate::scene::Scene;
use crate::store::ComponentStore;

/// Per-slot cursor over one container's pre-batch state.
#[doc(hidden)]
pub struct Cursor<C: Component> {
    store: *mut ComponentStore<C>,
    current: Entity,
}

impl<C: Component> Cursor<C> {
    fn new(scene: &mut Scene) -> Self {
        let store = scene.store_ptr::<C>();
        let current = unsafe { (*store).first_live() };
        Cursor { store, current }
    }

    #[inline]
    fn len(&self) -> usize {
        unsafe { (*self.store).len() }
    }

    #[inline]
    fn next_of(&self, e: Entity) -> Entity {
        unsafe { (*self.store).jump_get(e) }
    }

    /// Positions at exactly `e` if it is live, per the driver's contract that
    /// requested ids never decrease. Never moves backward.
    #[inline]
    fn try_advance(&mut self, e: Entity) -> bool {
        if unsafe { (*self.store).contains_raw(e) } {
            self.current = e;
            true
        } else {
            false
        }
    }

    /// Advances to the first live entity at or beyond `e`.
    #[inline]
    fn advance_to(&mut self, e: Entity) {
        while self.current != 0 && self.current < e {
            self.current = self.next_of(self.current);
        }
    }

    #[inline]
    fn advance(&mut self) {
        self.current = self.next_of(self.current);
    }

    #[inline]
    unsafe fn cell_ptr(&self, e: Entity) -> *mut C {
        (*self.store).cell_ptr(e)
    }
}

/// One slot of a query tuple: `&mut C` (required) or `Option<&mut C>`
/// (optional).
pub trait QueryParam {
    type Component: Component;
    type Item<'a>;
    const REQUIRED: bool;

    /// Builds the callback argument for an invocation at `e`. For required
    /// slots `e` must be live in the slot's container.
    #[doc(hidden)]
    unsafe fn fetch<'a>(cursor: &mut Cursor<Self::Component>, e: Entity) -> Self::Item<'a>;
}

impl<'x, C: Component> QueryParam for &'x mut C {
    type Component = C;
    type Item<'a> = &'a mut C;
    const REQUIRED: bool = true;

    unsafe fn fetch<'a>(cursor: &mut Cursor<C>, e: Entity) -> &'a mut C {
        &mut *cursor.cell_ptr(e)
    }
}

impl<'x, C: Component> QueryParam for Option<&'x mut C> {
    type Component = C;
    type Item<'a> = Option<&'a mut C>;
    const REQUIRED: bool = false;

    unsafe fn fetch<'a>(cursor: &mut Cursor<C>, e: Entity) -> Option<&'a mut C> {
        if cursor.current == e {
            Some(&mut *cursor.cell_ptr(e))
        } else {
            None
        }
    }
}

/// A component tuple accepted by [`Scene::foreach`](crate::Scene::foreach): a
/// single [`QueryParam`] or a tuple of two to four of them.
pub trait Query {
    type Item<'a>;

    #[doc(hidden)]
    fn run<F>(scene: &mut Scene, f: F)
    where
        F: for<'a> FnMut(&mut Scene, Entity, Self::Item<'a>);
}

// Single required component: a direct walk through the container's jump
// table, no intersection logic.
impl<'x, C: Component> Query for &'x mut C {
    type Item<'a> = &'a mut C;

    fn run<F>(scene: &mut Scene, mut f: F)
    where
        F: for<'a> FnMut(&mut Scene, Entity, Self::Item<'a>),
    {
        scene.start_batch();
        let cursor = Cursor::<C>::new(scene);
        let mut e = cursor.current;
        while e != 0 {
            let item = unsafe { &mut *cursor.cell_ptr(e) };
            f(&mut *scene, e, item);
            e = cursor.next_of(e);
        }
        scene.finish_batch();
    }
}

impl<'x, C: Component> Query for Option<&'x mut C> {
    type Item<'a> = Option<&'a mut C>;

    fn run<F>(scene: &mut Scene, mut f: F)
    where
        F: for<'a> FnMut(&mut Scene, Entity, Self::Item<'a>),
    {
        scene.start_batch();
        let cursor = Cursor::<C>::new(scene);
        let mut e = cursor.current;
        while e != 0 {
            let item = unsafe { Some(&mut *cursor.cell_ptr(e)) };
            f(&mut *scene, e, item);
            e = cursor.next_of(e);
        }
        scene.finish_batch();
    }
}

fn assert_distinct(keys: &[usize]) {
    for i in 1..keys.len() {
        assert!(
            !keys[..i].contains(&keys[i]),
            "foreach query names the same component type twice"
        );
    }
}

macro_rules! impl_query_for_tuple {
    ($(($P:ident, $c:ident, $idx:tt)),+) => {
        impl<$($P: QueryParam),+> Query for ($($P,)+) {
            type Item<'a> = ($($P::Item<'a>,)+);

            fn run<F>(scene: &mut Scene, mut f: F)
            where
                F: for<'a> FnMut(&mut Scene, Entity, Self::Item<'a>),
            {
                assert_distinct(&[$(<$P::Component as Component>::type_key()),+]);
                scene.start_batch();
                $(let mut $c = Cursor::<$P::Component>::new(scene);)+

                let all_optional = $(!$P::REQUIRED &&)+ true;
                if all_optional {
                    // Union walk: visit whichever cursor sits at the minimum
                    // id, passing None for the rest.
                    loop {
                        let mut e = Entity::MAX;
                        $(if $c.current != 0 && $c.current < e {
                            e = $c.current;
                        })+
                        if e == Entity::MAX {
                            break;
                        }
                        let items = ($(unsafe { $P::fetch(&mut $c, e) },)+);
                        f(&mut *scene, e, items);
                        $(if $c.current == e {
                            $c.advance();
                        })+
                    }
                } else {
                    // The shortest required container drives; its size is the
                    // upper bound on yielded entities.
                    let mut driver = usize::MAX;
                    let mut shortest = usize::MAX;
                    $(if $P::REQUIRED && $c.len() < shortest {
                        shortest = $c.len();
                        driver = $idx;
                    })+

                    let mut e = match driver {
                        $($idx => $c.current,)+
                        _ => unreachable!(),
                    };
                    while e != 0 {
                        let mut all_required = true;
                        $(if $P::REQUIRED && $idx != driver && !$c.try_advance(e) {
                            all_required = false;
                        })+
                        if all_required {
                            $(if !$P::REQUIRED {
                                $c.advance_to(e);
                            })+
                            let items = ($(unsafe { $P::fetch(&mut $c, e) },)+);
                            f(&mut *scene, e, items);
                        }
                        e = match driver {
                            $($idx => $c.next_of(e),)+
                            _ => unreachable!(),
                        };
                    }
                }
                scene.finish_batch();
            }
        }
    };
}

impl_query_for_tuple!((P0, c0, 0), (P1, c1, 1));
impl_query_for_tuple!((P0, c0, 0), (P1, c1, 1), (P2, c2, 2));
impl_query_for_tuple!((P0, c0, 0), (P1, c1, 1), (P2, c2, 2), (P3, c3, 3));

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[derive(Clone, Debug, PartialEq)]
    struct A(u32);
    define_component!(A);

    #[derive(Clone, Debug, PartialEq)]
    struct B(u32);
    define_component!(B);

    #[derive(Clone, Debug, PartialEq)]
    struct Tag;
    define_component!(Tag);

    #[test]
    fn single_component_walks_in_order() {
        let mut scene = Scene::new();
        for i in 0..5 {
            scene.add((A(i),));
        }
        let mut seen = Vec::new();
        scene.foreach::<&mut A, _>(|_, id, a| {
            seen.push((id, a.0));
        });
        assert_eq!(seen, vec![(1, 0), (2, 1), (3, 2), (4, 3), (5, 4)]);
    }

    #[test]
    fn required_pair_intersects() {
        let mut scene = Scene::new();
        let mut expected = Vec::new();
        for i in 1..=20u32 {
            let id = scene.add((A(i),));
            if i % 3 == 0 {
                scene.attach(id, (B(i * 10),));
                expected.push(id);
            }
        }
        let mut seen = Vec::new();
        scene.foreach::<(&mut A, &mut B), _>(|_, id, (a, b)| {
            assert_eq!(b.0, a.0 * 10);
            seen.push(id);
        });
        assert_eq!(seen, expected);
    }

    #[test]
    fn optional_slot_passes_none_when_absent() {
        let mut scene = Scene::new();
        let with_b = scene.add((A(1), B(2)));
        let without_b = scene.add((A(3),));

        let mut seen = Vec::new();
        scene.foreach::<(&mut A, Option<&mut B>), _>(|_, id, (_a, b)| {
            seen.push((id, b.map(|b| b.0)));
        });
        assert_eq!(seen, vec![(with_b, Some(2)), (without_b, None)]);
    }

    #[test]
    fn all_optional_walks_the_union() {
        let mut scene = Scene::new();
        let only_a = scene.add((A(1),));
        let only_b = scene.add((B(2),));
        let both = scene.add((A(3), B(4)));
        let neither = scene.add(());

        let mut seen = Vec::new();
        scene.foreach::<(Option<&mut A>, Option<&mut B>), _>(|_, id, (a, b)| {
            seen.push((id, a.is_some(), b.is_some()));
        });
        assert_eq!(
            seen,
            vec![(only_a, true, false), (only_b, false, true), (both, true, true)]
        );
        assert!(!seen.iter().any(|&(id, _, _)| id == neither));
    }

    #[test]
    fn all_absent_optionals_invoke_zero_times() {
        let mut scene = Scene::new();
        scene.add(());
        let mut calls = 0;
        scene.foreach::<(Option<&mut A>, Option<&mut B>), _>(|_, _, _| calls += 1);
        assert_eq!(calls, 0);
    }

    #[test]
    fn tags_iterate_without_storage() {
        let mut scene = Scene::new();
        let tagged = scene.add((A(7), Tag));
        scene.add((A(8),));
        let mut seen = Vec::new();
        scene.foreach::<(&mut Tag, &mut A), _>(|_, id, (_tag, a)| {
            seen.push((id, a.0));
        });
        assert_eq!(seen, vec![(tagged, 7)]);
    }

    #[test]
    fn inserts_during_iteration_are_invisible_inside_the_loop() {
        let mut scene = Scene::new();
        for i in 0..4 {
            scene.add((A(i),));
        }
        let mut visits = 0;
        scene.foreach::<&mut A, _>(|scene, _, _| {
            visits += 1;
            scene.add((A(100),));
        });
        assert_eq!(visits, 4);
        assert_eq!(scene.count::<A>(), 8);
    }

    #[test]
    fn erases_during_iteration_yield_pre_batch_values() {
        let mut scene = Scene::new();
        let doomed = scene.add((A(1),));
        let keeper = scene.add((A(2),));

        let mut seen = Vec::new();
        scene.foreach::<&mut A, _>(|scene, id, a| {
            if id == doomed {
                scene.remove(doomed);
            }
            seen.push((id, a.0));
        });
        // The erase was recorded before the doomed entity's own visit ended,
        // and the later entity is unaffected.
        assert_eq!(seen, vec![(doomed, 1), (keeper, 2)]);
        assert_eq!(scene.count::<A>(), 1);
        assert!(!scene.has::<A>(doomed));
    }

    #[test]
    fn detach_of_upcoming_entity_still_yields_it() {
        let mut scene = Scene::new();
        let first = scene.add((A(1),));
        let second = scene.add((A(2),));

        let mut seen = Vec::new();
        scene.foreach::<&mut A, _>(|scene, id, a| {
            if id == first {
                scene.detach::<A>(second);
            }
            seen.push((id, a.0));
        });
        assert_eq!(seen, vec![(first, 1), (second, 2)]);
        assert_eq!(scene.count::<A>(), 1);
    }

    #[test]
    fn shortest_required_container_drives() {
        let mut scene = Scene::new();
        for i in 1..=100u32 {
            let id = scene.add((A(i),));
            if i <= 3 {
                scene.attach(id, (B(i),));
            }
        }
        // B is far smaller; the loop must yield exactly B's entities whether
        // or not B comes first in the tuple.
        let mut count = 0;
        scene.foreach::<(&mut A, &mut B), _>(|_, _, _| count += 1);
        assert_eq!(count, 3);
        let mut count = 0;
        scene.foreach::<(&mut B, &mut A), _>(|_, _, _| count += 1);
        assert_eq!(count, 3);
    }

    #[test]
    #[should_panic(expected = "same component type twice")]
    fn duplicate_component_panics() {
        let mut scene = Scene::new();
        scene.add((A(1),));
        scene.foreach::<(&mut A, Option<&mut A>), _>(|_, _, _| {});
    }

    #[test]
    fn nested_foreach_of_disjoint_components() {
        let mut scene = Scene::new();
        scene.add((A(1),));
        scene.add((B(2),));
        let mut pairs = 0;
        scene.foreach::<&mut A, _>(|scene, _, _| {
            scene.foreach::<&mut B, _>(|_, _, _| pairs += 1);
        });
        assert_eq!(pairs, 1);
    }
}
