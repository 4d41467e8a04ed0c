#![forbid(unsafe_code)]

//! Core: event model, event targets, and listener registration.

pub mod event;
pub mod handle;
pub mod target;

pub use event::{Event, StorageEvent, StorageScope};
pub use handle::TargetHandle;
pub use target::{
    EventTarget, InertTarget, Listener, ListenerOptions, ListenerRegistry, Target, TargetId,
    TargetKind,
};
