#![forbid(unsafe_code)]

//! tabsync public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use tabsync_core::{Event, EventTarget, ListenerOptions, StorageScope, Target, TargetHandle};
#[cfg(feature = "runtime")]
pub use tabsync_runtime::{
    Context, EventSubscription, Origin, OriginConfig, PersistedCell, SetAction, TargetRef,
};

pub mod prelude {
    pub use tabsync_core as core;
    #[cfg(feature = "runtime")]
    pub use tabsync_runtime as runtime;

    pub use tabsync_core::{Event, ListenerOptions, StorageScope};
    #[cfg(feature = "runtime")]
    pub use tabsync_runtime::{EventSubscription, Origin, PersistedCell, TargetRef};
}
