//! A user-supplied search index: name-to-entity lookup, hook maintenance,
//! and manual refresh after in-place mutation.

use rustc_hash::FxHashMap;
use scena::prelude::*;

#[derive(Clone, Debug, PartialEq)]
struct Name(String);

#[derive(Default)]
struct NameIndex {
    by_name: FxHashMap<String, Entity>,
}

impl SearchIndex<Name> for NameIndex {
    fn add_entity(&mut self, id: Entity, value: &Name) {
        self.by_name.insert(value.0.clone(), id);
    }

    fn remove_entity(&mut self, id: Entity, value: &Name) {
        if self.by_name.get(&value.0) == Some(&id) {
            self.by_name.remove(&value.0);
        }
    }

    fn refresh(&mut self, scene: &Scene) {
        self.by_name.clear();
        for (id, name) in scene.components::<Name>() {
            self.by_name.insert(name.0.clone(), id);
        }
    }
}

impl IndexLookup<&str> for NameIndex {
    fn find(&self, query: &str) -> Entity {
        self.by_name.get(query).copied().unwrap_or(INVALID_ENTITY)
    }
}

define_component!(Name, index = NameIndex);

fn named(scene: &mut Scene, name: &str) -> Entity {
    scene.add((Name(name.to_string()),))
}

#[test]
fn hooks_keep_the_index_current() {
    let mut scene = Scene::new();
    let alice = named(&mut scene, "alice");
    let bob = named(&mut scene, "bob");

    assert_eq!(scene.find_entity::<Name, _>("alice"), alice);
    assert_eq!(scene.find_entity::<Name, _>("bob"), bob);
    assert_eq!(scene.find_entity::<Name, _>("carol"), INVALID_ENTITY);
    assert_eq!(
        scene.find_component::<Name, _>("bob"),
        Some(&Name("bob".to_string()))
    );

    scene.remove(bob);
    assert_eq!(scene.find_entity::<Name, _>("bob"), INVALID_ENTITY);
}

#[test]
fn replace_retargets_the_index() {
    let mut scene = Scene::new();
    let id = named(&mut scene, "before");
    scene.attach(id, (Name("after".to_string()),));
    assert_eq!(scene.find_entity::<Name, _>("before"), INVALID_ENTITY);
    assert_eq!(scene.find_entity::<Name, _>("after"), id);
}

// In-place mutation leaves the index stale until an explicit refresh; that
// staleness is observable, not papered over.
#[test]
fn in_place_mutation_needs_update_search_index() {
    let mut scene = Scene::new();
    let a = named(&mut scene, "ant");
    let _b = named(&mut scene, "bee");
    let _c = named(&mut scene, "cat");
    let _d = named(&mut scene, "dog");

    scene.get_mut::<Name>(a).unwrap().0 = "anteater".to_string();

    assert_eq!(scene.find_entity::<Name, _>("ant"), a, "stale until refreshed");
    assert_eq!(scene.find_entity::<Name, _>("anteater"), INVALID_ENTITY);

    scene.update_search_index::<Name>();

    assert_eq!(scene.find_entity::<Name, _>("ant"), INVALID_ENTITY);
    assert_eq!(scene.find_entity::<Name, _>("anteater"), a);
}

#[test]
fn update_search_indices_refreshes_every_indexed_type() {
    let mut scene = Scene::new();
    let a = named(&mut scene, "x");
    scene.get_mut::<Name>(a).unwrap().0 = "y".to_string();
    scene.update_search_indices();
    assert_eq!(scene.find_entity::<Name, _>("y"), a);
}

#[test]
fn lookup_on_untouched_type_misses_cleanly() {
    let scene = Scene::new();
    assert_eq!(scene.find_entity::<Name, _>("anything"), INVALID_ENTITY);
    assert_eq!(scene.find_component::<Name, _>("anything"), None);
}
