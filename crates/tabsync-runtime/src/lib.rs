#![forbid(unsafe_code)]

//! Runtime: event subscriptions and persisted state kept consistent across
//! execution contexts.
//!
//! - [`subscription::EventSubscription`] owns one listener registration and
//!   always dispatches to the most recently supplied handler.
//! - [`persisted::PersistedCell`] mirrors a value into a key/value store and
//!   reconciles with change notifications from other contexts.
//! - [`storage`] holds the store interface and the in-memory host model
//!   (origins, contexts, and the change broadcast between them).
//!
//! # Fault model
//!
//! No operation on a cell or subscription returns an error. Store and codec
//! faults are recovered locally, logged through `tracing`, and recorded as a
//! [`error::FaultKind`] on the cell.

pub mod codec;
pub mod error;
pub mod persisted;
pub mod storage;
pub mod subscription;

pub use codec::{Codec, JsonCodec};
pub use error::{CodecError, FaultKind, StoreError};
pub use persisted::{ChangeGuard, PersistedCell, SetAction};
pub use storage::{Context, ContextId, Delivery, Origin, OriginConfig, StorageArea, Store};
pub use subscription::{EventSubscription, TargetRef};
