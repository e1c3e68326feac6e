/*!

Process-wide type-key registries.

Every component type is assigned a small dense integer key the first time any
scene touches it; scenes index their container tables by that key. Event
types get keys from a separate counter for the same reason. Keys are
monotonic and never reused, so a key minted in one scene stays valid in every
other scene of the process.

Component keys are claimed through a per-type `AtomicUsize` generated by
`define_component!`: the static starts at `usize::MAX`, and the first call
locks the global counter and installs the next value with a compare-exchange
so that concurrent first accesses from different threads agree on one key.
Event keys have no per-type static to hang a cache on (any `'static` type can
be emitted), so they go through a `TypeId` map instead.

*/

use std::any::TypeId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex};

use rustc_hash::FxHashMap;

/// Counter for component-type keys. Holds the next key to assign,
/// equivalently the number of component types registered so far.
static NEXT_COMPONENT_KEY: Mutex<usize> = Mutex::new(0);

/// Event-type keys, assigned lazily on first emit or subscription.
static EVENT_KEYS: LazyLock<Mutex<(usize, FxHashMap<TypeId, usize>)>> =
    LazyLock::new(|| Mutex::new((0, FxHashMap::default())));

/// Claims a component key for the type owning `slot`, or returns the
/// already-claimed one.
///
/// Acquires the global counter lock, but only increments it if this call wins
/// the initialization race. It's possible for a single type to race its own
/// initialization from different threads; the compare-exchange guarantees
/// every caller observes the same key. The overhead is negligible because
/// after the first access the fast path is a single atomic load.
pub fn resolve_component_key(slot: &AtomicUsize) -> usize {
    let cached = slot.load(Ordering::Acquire);
    if cached != usize::MAX {
        return cached;
    }

    let mut guard = NEXT_COMPONENT_KEY.lock().unwrap();
    let candidate = *guard;
    match slot.compare_exchange(usize::MAX, candidate, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {
            // We won the race; the candidate is now this type's key.
            *guard += 1;
            candidate
        }
        // Another thread initialized the slot first; keep its key.
        Err(existing) => existing,
    }
}

/// Returns the dense key for event type `E`, assigning one on first use.
pub(crate) fn event_key<E: 'static>() -> usize {
    let mut guard = EVENT_KEYS.lock().unwrap();
    let (counter, keys) = &mut *guard;
    *keys.entry(TypeId::of::<E>()).or_insert_with(|| {
        let key = *counter;
        *counter += 1;
        key
    })
}
