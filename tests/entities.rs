//! Entity allocator behavior.

use scena::prelude::*;

#[derive(Clone, Debug, PartialEq)]
struct Payload {
    v: u64,
}
define_component!(Payload);

#[test]
fn fresh_ids_are_sequential_and_nonzero() {
    let mut scene = Scene::new();
    let first = scene.add(());
    assert_eq!(first, 1, "id 0 is reserved");
    assert_eq!(scene.add(()), 2);
}

#[test]
fn removed_ids_come_back() {
    let mut scene = Scene::new();
    let ids: Vec<_> = (0..8).map(|_| scene.add(())).collect();
    scene.remove(ids[3]);
    scene.remove(ids[6]);
    // Most recently retired first.
    assert_eq!(scene.add(()), ids[6]);
    assert_eq!(scene.add(()), ids[3]);
    assert_eq!(scene.add(()), 9);
}

#[test]
fn remove_strips_all_components() {
    let mut scene = Scene::new();
    let id = scene.add((Payload { v: 7 },));
    scene.remove(id);
    assert!(!scene.has::<Payload>(id));
    assert_eq!(scene.count::<Payload>(), 0);
}

#[test]
fn clear_entities_invalidates_everything() {
    let mut scene = Scene::new();
    for i in 0..10 {
        scene.add((Payload { v: i },));
    }
    scene.clear_entities();
    assert_eq!(scene.count::<Payload>(), 0);
    // The counter restarts, so old ids are genuinely reused.
    assert_eq!(scene.add(()), 1);
}

#[test]
fn removal_during_batch_keeps_id_out_of_circulation() {
    let mut scene = Scene::new();
    let doomed = scene.add((Payload { v: 1 },));
    scene.start_batch();
    scene.remove(doomed);
    let minted: Vec<_> = (0..4).map(|_| scene.add(())).collect();
    assert!(
        !minted.contains(&doomed),
        "an id retired mid-batch must not be re-minted until the batch ends"
    );
    scene.finish_batch();
    assert_eq!(scene.add(()), doomed);
}

#[test]
fn operations_on_reserved_ids_are_inert() {
    let mut scene = Scene::new();
    scene.attach(INVALID_ENTITY, (Payload { v: 1 },));
    assert_eq!(scene.count::<Payload>(), 0);
    scene.remove(INVALID_ENTITY);
    scene.remove(0);
    assert_eq!(scene.add(()), 1);
    assert!(!scene.has::<Payload>(INVALID_ENTITY));
    assert_eq!(scene.get::<Payload>(INVALID_ENTITY), None);
}
