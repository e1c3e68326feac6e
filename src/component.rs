/*!

The component contract and the `define_component!` macro.

Any `'static` value type can be a component, but it must be registered with
[`define_component!`] before use so the crate can generate its process-wide
type key, its transfer behavior, and its optional search-index and dependency
declarations:

```rust,ignore
pub struct Age { pub years: u32 }
pub struct Alive;                       // zero-sized tag

define_component!(Age);
define_component!(Alive);
define_component!(Name, index = NameIndex);
define_component!(Velocity, requires = [Position]);
define_component!(Opaque, clone = false);
```

By default a registered component must be `Clone`; the clone is what
[`Scene::concat`](crate::Scene::concat) and [`Scene::copy`](crate::Scene::copy)
transfer between scenes. `clone = false` opts out, and such components are
silently skipped by scene-to-scene transfer.

A `requires = [...]` list declares components that must co-exist on any
entity bearing this one: attaching the component first attaches each missing
dependency default-constructed.

*/

use crate::entity::Entity;
use crate::scene::Scene;
use crate::search::SearchIndex;

/// A registered component type. Implemented by [`define_component!`], not by
/// hand.
pub trait Component: Sized + 'static {
    /// The search index maintained for this type;
    /// [`NoIndex`](crate::search::NoIndex) unless the definition names one.
    type Index: SearchIndex<Self>;

    /// Overrides the bucket-size exponent chosen by the by-size heuristic.
    /// Bucket capacity is `2^N` entities.
    const BUCKET_EXP_HINT: Option<u32> = None;

    /// The process-wide dense key for this type, assigned on first use.
    fn type_key() -> usize;

    /// A copy of this value for scene-to-scene transfer, or `None` for
    /// components registered with `clone = false`.
    fn duplicate(&self) -> Option<Self> {
        None
    }

    /// Attaches any missing dependency components to `id`.
    fn ensure_dependencies(_scene: &mut Scene, _id: Entity) {}
}

/// A set of component values attached together: the unit value or a tuple of
/// up to eight components. Mirrors the initial-component lists accepted by
/// [`Scene::add`](crate::Scene::add) and
/// [`Scene::attach`](crate::Scene::attach).
pub trait ComponentBundle {
    fn attach_to(self, scene: &mut Scene, id: Entity);
}

impl ComponentBundle for () {
    fn attach_to(self, _scene: &mut Scene, _id: Entity) {}
}

macro_rules! impl_bundle {
    ($(($C:ident, $i:tt)),+) => {
        impl<$($C: Component),+> ComponentBundle for ($($C,)+) {
            fn attach_to(self, scene: &mut Scene, id: Entity) {
                $( scene.attach_one(id, self.$i); )+
            }
        }
    };
}

impl_bundle!((C0, 0));
impl_bundle!((C0, 0), (C1, 1));
impl_bundle!((C0, 0), (C1, 1), (C2, 2));
impl_bundle!((C0, 0), (C1, 1), (C2, 2), (C3, 3));
impl_bundle!((C0, 0), (C1, 1), (C2, 2), (C3, 3), (C4, 4));
impl_bundle!((C0, 0), (C1, 1), (C2, 2), (C3, 3), (C4, 4), (C5, 5));
impl_bundle!((C0, 0), (C1, 1), (C2, 2), (C3, 3), (C4, 4), (C5, 5), (C6, 6));
impl_bundle!(
    (C0, 0),
    (C1, 1),
    (C2, 2),
    (C3, 3),
    (C4, 4),
    (C5, 5),
    (C6, 6),
    (C7, 7)
);

#[doc(hidden)]
#[macro_export]
macro_rules! __define_component_impl {
    (
        $component:ty,
        $index:ty,
        $hint:expr,
        [$($dep:ty),*],
        $duplicate:expr
    ) => {
        impl $crate::Component for $component {
            type Index = $index;

            const BUCKET_EXP_HINT: ::core::option::Option<u32> = $hint;

            fn type_key() -> usize {
                static KEY: ::std::sync::atomic::AtomicUsize =
                    ::std::sync::atomic::AtomicUsize::new(usize::MAX);
                $crate::registry::resolve_component_key(&KEY)
            }

            fn duplicate(&self) -> ::core::option::Option<Self> {
                let duplicate = $duplicate;
                duplicate(self)
            }

            fn ensure_dependencies(scene: &mut $crate::Scene, id: $crate::Entity) {
                $(
                    if !scene.has::<$dep>(id) {
                        scene.emplace::<$dep>(id);
                    }
                )*
                let _ = (scene, id);
            }
        }
    };
}

/// Registers a type as a component.
///
/// * `define_component!(T)`: `T: Clone`, no index, no dependencies.
/// * `define_component!(T, clone = false)`: excluded from scene transfer.
/// * `define_component!(T, index = I)`: maintain search index `I`.
/// * `define_component!(T, requires = [A, B])`: attach missing dependencies
///   (default-constructed) whenever `T` is attached.
/// * `define_component!(T, bucket_exp = N)`: force `2^N`-entity storage
///   buckets instead of the by-size heuristic.
#[macro_export]
macro_rules! define_component {
    ($component:ty) => {
        $crate::__define_component_impl!(
            $component,
            $crate::search::NoIndex,
            ::core::option::Option::None,
            [],
            |value: &Self| ::core::option::Option::Some(::core::clone::Clone::clone(value))
        );
    };
    ($component:ty, clone = false) => {
        $crate::__define_component_impl!(
            $component,
            $crate::search::NoIndex,
            ::core::option::Option::None,
            [],
            |_value: &Self| ::core::option::Option::None
        );
    };
    ($component:ty, index = $index:ty) => {
        $crate::__define_component_impl!(
            $component,
            $index,
            ::core::option::Option::None,
            [],
            |value: &Self| ::core::option::Option::Some(::core::clone::Clone::clone(value))
        );
    };
    ($component:ty, requires = [$($dep:ty),+ $(,)?]) => {
        $crate::__define_component_impl!(
            $component,
            $crate::search::NoIndex,
            ::core::option::Option::None,
            [$($dep),+],
            |value: &Self| ::core::option::Option::Some(::core::clone::Clone::clone(value))
        );
    };
    ($component:ty, requires = [$($dep:ty),+ $(,)?], clone = false) => {
        $crate::__define_component_impl!(
            $component,
            $crate::search::NoIndex,
            ::core::option::Option::None,
            [$($dep),+],
            |_value: &Self| ::core::option::Option::None
        );
    };
    ($component:ty, bucket_exp = $exp:expr) => {
        $crate::__define_component_impl!(
            $component,
            $crate::search::NoIndex,
            ::core::option::Option::Some($exp),
            [],
            |value: &Self| ::core::option::Option::Some(::core::clone::Clone::clone(value))
        );
    };
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Label(String);
    define_component!(Label);

    #[derive(Clone, Copy, Debug, PartialEq, Default)]
    struct Position {
        x: i32,
        y: i32,
    }
    define_component!(Position);

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Velocity {
        dx: i32,
    }
    define_component!(Velocity, requires = [Position]);

    struct Opaque(#[allow(dead_code)] *const u8);
    define_component!(Opaque, clone = false);

    #[test]
    fn type_keys_are_stable_and_distinct() {
        let a = Label::type_key();
        let b = Position::type_key();
        assert_ne!(a, b);
        assert_eq!(Label::type_key(), a);
    }

    #[test]
    fn duplicate_follows_registration() {
        let label = Label("x".into());
        assert_eq!(label.duplicate(), Some(Label("x".into())));
        let opaque = Opaque(std::ptr::null());
        assert!(opaque.duplicate().is_none());
    }

    #[test]
    fn dependencies_are_attached_first() {
        let mut scene = Scene::new();
        let id = scene.add(());
        scene.attach(id, (Velocity { dx: 3 },));
        assert!(scene.has::<Position>(id));
        assert_eq!(scene.get::<Position>(id), Some(&Position::default()));
        assert_eq!(scene.get::<Velocity>(id), Some(&Velocity { dx: 3 }));
    }

    #[test]
    fn dependency_does_not_overwrite_existing() {
        let mut scene = Scene::new();
        let id = scene.add((Position { x: 7, y: 8 },));
        scene.attach(id, (Velocity { dx: 1 },));
        assert_eq!(scene.get::<Position>(id), Some(&Position { x: 7, y: 8 }));
    }

    #[test]
    fn bundles_attach_in_order() {
        let mut scene = Scene::new();
        let id = scene.add((Label("a".into()), Position { x: 1, y: 2 }));
        assert!(scene.has::<Label>(id));
        assert!(scene.has::<Position>(id));
    }
}
