#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tabsync_core::StorageScope;
use tabsync_runtime::{Origin, PersistedCell, StoreError};

#[derive(Arbitrary, Debug)]
enum CellOp {
    Set { tab: u8, value: i32 },
    Add { tab: u8, delta: i16 },
    Remove { tab: u8 },
    Suspend { tab: u8, on: bool },
    FailWrites(bool),
    Clear { tab: u8 },
}

const TABS: usize = 3;

fuzz_target!(|ops: Vec<CellOp>| {
    let origin = Origin::new();
    let contexts: Vec<_> = (0..TABS).map(|_| origin.open_context()).collect();
    let cells: Vec<PersistedCell<i32>> = contexts
        .iter()
        .map(|ctx| PersistedCell::local(ctx, "n", 0))
        .collect();

    for op in ops.into_iter().take(256) {
        match op {
            CellOp::Set { tab, value } => cells[usize::from(tab) % TABS].set(value),
            CellOp::Add { tab, delta } => {
                cells[usize::from(tab) % TABS].update(|n| n.wrapping_add(i32::from(delta)));
            }
            CellOp::Remove { tab } => cells[usize::from(tab) % TABS].remove(),
            CellOp::Suspend { tab, on } => contexts[usize::from(tab) % TABS].set_suspended(on),
            CellOp::FailWrites(on) => origin
                .local_area()
                .fail_writes(on.then(|| StoreError::QuotaExceeded { key: String::new() })),
            CellOp::Clear { tab } => {
                let _ = contexts[usize::from(tab) % TABS].clear(StorageScope::Local);
            }
        }
    }

    // Once every context listens again, a fresh write reaches all of them.
    for ctx in &contexts {
        ctx.set_suspended(false);
    }
    origin.local_area().heal();
    cells[0].remove();
    cells[0].set(42);
    for cell in &cells[1..] {
        assert_eq!(cell.get(), 42);
    }
});
