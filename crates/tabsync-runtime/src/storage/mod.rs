//! Key/value storage.
//!
//! [`Store`] is the interface a [`PersistedCell`](crate::persisted::PersistedCell)
//! talks to. The in-memory host model provides two implementations:
//!
//! - [`StorageArea`]: a plain key/value area with fault injection. Writes to
//!   it directly are not broadcast.
//! - The per-context handles returned by [`Context::store`]: they write
//!   through to a shared area and broadcast each effective change to the
//!   other contexts sharing it, never to the writer.

mod area;
mod origin;

pub use area::StorageArea;
pub use origin::{Context, ContextId, Delivery, Origin, OriginConfig};

use crate::error::StoreError;

/// A string key/value store.
///
/// Methods take `&self`; implementations are shared between every cell
/// bound to the same area and use interior mutability.
pub trait Store {
    /// The stored string for `key`, or `None` when absent.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`. Deleting an absent key succeeds.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}
