#![no_main]

use libfuzzer_sys::fuzz_target;
use tabsync_runtime::{Origin, PersistedCell};

fuzz_target!(|data: &[u8]| {
    if data.len() > 4096 {
        return;
    }
    let raw = String::from_utf8_lossy(data);

    let origin = Origin::new();
    let _ = origin.local_area().set_item("state", &raw);
    let writer = origin.open_context();
    let reader = origin.open_context();

    let cell: PersistedCell<Vec<Option<String>>> =
        PersistedCell::local(&reader, "state", Vec::new());
    let _ = cell.get();

    // Push the same text through a live change notification.
    let peer: PersistedCell<String> = PersistedCell::local(&writer, "state", String::new());
    peer.set(raw.into_owned());
    let _ = cell.get();
});
