//! Property-based invariant tests for the listener registry.
//!
//! 1. The live count always matches a model set of (name, listener, capture) keys
//! 2. Duplicate adds are rejected; removes only match the exact key
//! 3. Dispatch invokes exactly the live listeners registered under the event name
//! 4. `once` listeners run at most once

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use proptest::prelude::*;
use tabsync_core::{Event, Listener, ListenerOptions, ListenerRegistry};

// ── Helpers ──────────────────────────────────────────────────────────

const NAMES: [&str; 3] = ["resize", "storage", "click"];
const LISTENERS: usize = 4;

#[derive(Debug, Clone)]
enum RegistryOp {
    Add { name: usize, listener: usize, capture: bool },
    Remove { name: usize, listener: usize, capture: bool },
    Dispatch { name: usize },
}

fn arb_op() -> impl Strategy<Value = RegistryOp> {
    prop_oneof![
        (0..NAMES.len(), 0..LISTENERS, any::<bool>())
            .prop_map(|(name, listener, capture)| RegistryOp::Add { name, listener, capture }),
        (0..NAMES.len(), 0..LISTENERS, any::<bool>())
            .prop_map(|(name, listener, capture)| RegistryOp::Remove { name, listener, capture }),
        (0..NAMES.len()).prop_map(|name| RegistryOp::Dispatch { name }),
    ]
}

fn counting_listeners() -> (Vec<Listener>, Vec<Rc<Cell<usize>>>) {
    (0..LISTENERS)
        .map(|_| {
            let hits = Rc::new(Cell::new(0));
            let h = Rc::clone(&hits);
            let listener: Listener = Rc::new(move |_: &Event| h.set(h.get() + 1));
            (listener, hits)
        })
        .unzip()
}

// ═════════════════════════════════════════════════════════════════════════
// 1–3. Registry agrees with a set model
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn registry_matches_set_model(ops in proptest::collection::vec(arb_op(), 0..64)) {
        let registry = ListenerRegistry::new();
        let (listeners, hits) = counting_listeners();
        let mut model: BTreeSet<(usize, usize, bool)> = BTreeSet::new();

        for op in ops {
            match op {
                RegistryOp::Add { name, listener, capture } => {
                    let added = registry.add(NAMES[name], &listeners[listener], capture.into());
                    prop_assert_eq!(added, model.insert((name, listener, capture)));
                }
                RegistryOp::Remove { name, listener, capture } => {
                    let removed = registry.remove(NAMES[name], &listeners[listener], capture.into());
                    prop_assert_eq!(removed, model.remove(&(name, listener, capture)));
                }
                RegistryOp::Dispatch { name } => {
                    let before: Vec<usize> = hits.iter().map(|h| h.get()).collect();
                    let invoked = registry.dispatch(&Event::custom(NAMES[name], None));
                    let expected = model.iter().filter(|(n, _, _)| *n == name).count();
                    prop_assert_eq!(invoked, expected);

                    for (i, h) in hits.iter().enumerate() {
                        let registrations = model
                            .iter()
                            .filter(|(n, l, _)| *n == name && *l == i)
                            .count();
                        prop_assert_eq!(h.get() - before[i], registrations);
                    }
                }
            }
            prop_assert_eq!(registry.len(), model.len());
        }

        for (i, name) in NAMES.iter().enumerate() {
            let expected = model.iter().filter(|(n, _, _)| *n == i).count();
            prop_assert_eq!(registry.count(name), expected);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Once listeners
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn once_listener_runs_at_most_once(dispatches in 0usize..10) {
        let registry = ListenerRegistry::new();
        let (listeners, hits) = counting_listeners();
        registry.add("resize", &listeners[0], ListenerOptions::new().with_once(true));

        for _ in 0..dispatches {
            registry.dispatch(&Event::resize(10, 10));
        }
        prop_assert_eq!(hits[0].get(), dispatches.min(1));
        prop_assert_eq!(registry.is_empty(), dispatches > 0);
    }
}
