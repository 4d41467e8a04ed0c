#![forbid(unsafe_code)]

//! Persisted state kept consistent across execution contexts.
//!
//! A [`PersistedCell`] owns one `(key, scope)` binding in a [`Store`]. It
//! keeps an in-memory shadow of the decoded value, writes every local change
//! through to the store, and listens on its context's global target for
//! `"storage"` notifications sent by other contexts.
//!
//! # State machine
//!
//! ```text
//! create ──► Loaded(stored or default)
//! Loaded ──write──► Loaded(new)       store accepted the write
//! Loaded ──write──► Loaded(unchanged) store or codec fault
//! Loaded ──remove──► Loaded(default)  always, even on delete fault
//! Loaded ──write/remove──► Loaded(peer) a peer wrote back during the call
//! Loaded ──notification──► Loaded(decoded or default)
//! ```
//!
//! # Write ordering
//!
//! A write resolves the new value against the in-memory value, encodes it,
//! and hands it to the store **before** touching memory. If encoding or the
//! store fails, the in-memory value is left as it was, so memory never holds
//! a value the store does not. Without a store (storage unavailable) the
//! write commits to memory only.
//!
//! Notifications are delivered while the store call is still running, so a
//! peer context may write the same key back before `write` or `remove`
//! returns. The resulting reconciliation bumps the version. A local commit
//! that finds the version moved is skipped, since the store already holds the
//! newer value.
//!
//! # Default value
//!
//! The default is captured at creation and used for every fallback: absent
//! key, empty stored string, decode fault, remove, and a delete or clear
//! notification. [`set_default`](PersistedCell::set_default) replaces it for
//! future fallbacks only; a value already loaded is not rewritten. The
//! default is never written to the store by reading it.
//!
//! # Failure Modes
//!
//! Read, decode, encode, write, and delete faults are logged with
//! `tracing::warn!` and recorded in [`last_fault`](PersistedCell::last_fault).
//! None of them reach the caller.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tabsync_core::event::STORAGE;
use tabsync_core::{Event, StorageEvent, StorageScope};

use crate::codec::{Codec, JsonCodec};
use crate::error::FaultKind;
use crate::storage::{Context, Store};
use crate::subscription::EventSubscription;

/// The argument of [`PersistedCell::write`]: a replacement value or a
/// function of the current value.
pub enum SetAction<'a, T> {
    Value(T),
    Update(Box<dyn FnOnce(&T) -> T + 'a>),
}

impl<'a, T> SetAction<'a, T> {
    #[must_use]
    pub fn update(f: impl FnOnce(&T) -> T + 'a) -> Self {
        Self::Update(Box::new(f))
    }

    fn resolve(self, current: &T) -> T {
        match self {
            Self::Value(value) => value,
            Self::Update(f) => f(current),
        }
    }
}

impl<T> From<T> for SetAction<'_, T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for SetAction<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Update(_) => f.write_str("Update(..)"),
        }
    }
}

type Observer<T> = Rc<dyn Fn(&T)>;
type ObserverList<T> = RefCell<Vec<(u64, Observer<T>)>>;

/// RAII guard returned by [`PersistedCell::on_change`]. Dropping it removes
/// the observer.
#[must_use = "dropping the guard removes the observer"]
pub struct ChangeGuard {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl fmt::Debug for ChangeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeGuard")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

impl Drop for ChangeGuard {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

/// Stores a context offers, captured once so rebinding can switch scope.
#[derive(Clone, Default)]
struct Stores {
    local: Option<Rc<dyn Store>>,
    session: Option<Rc<dyn Store>>,
}

impl Stores {
    fn of(ctx: &Context) -> Self {
        Self {
            local: ctx.store(StorageScope::Local),
            session: ctx.store(StorageScope::Session),
        }
    }

    fn get(&self, scope: StorageScope) -> Option<Rc<dyn Store>> {
        match scope {
            StorageScope::Local => self.local.clone(),
            StorageScope::Session => self.session.clone(),
        }
    }
}

struct Binding<T> {
    key: String,
    scope: StorageScope,
    default: T,
    store: Option<Rc<dyn Store>>,
}

/// Shared interior, reachable from the reconciliation listener.
struct CellState<T, C> {
    binding: RefCell<Binding<T>>,
    /// Swapped whole on commit; readers clone the `Rc` and drop the borrow.
    value: RefCell<Rc<T>>,
    codec: C,
    version: Cell<u64>,
    last_fault: Cell<Option<FaultKind>>,
    fault_count: Cell<u64>,
    observers: Rc<ObserverList<T>>,
    next_observer: Cell<u64>,
}

impl<T: Clone, C: Codec<T>> CellState<T, C> {
    fn current(&self) -> Rc<T> {
        Rc::clone(&self.value.borrow())
    }

    fn key_and_scope(&self) -> (String, StorageScope) {
        let binding = self.binding.borrow();
        (binding.key.clone(), binding.scope)
    }

    fn default_value(&self) -> T {
        self.binding.borrow().default.clone()
    }

    fn record(&self, fault: FaultKind) {
        self.last_fault.set(Some(fault));
        self.fault_count.set(self.fault_count.get() + 1);
    }

    /// Read the bound key from the store, falling back to the default.
    fn load(&self) -> T {
        let (key, scope) = self.key_and_scope();
        let store = self.binding.borrow().store.clone();
        let Some(store) = store else {
            return self.default_value();
        };
        match store.get(&key) {
            Ok(raw) => self.decode_or_default(&key, scope, raw.as_deref()),
            Err(err) => {
                tracing::warn!(
                    message = "persist.read_failed",
                    key = key.as_str(),
                    scope = scope.as_str(),
                    error = %err
                );
                self.record(FaultKind::Read);
                self.default_value()
            }
        }
    }

    fn decode_or_default(&self, key: &str, scope: StorageScope, raw: Option<&str>) -> T {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return self.default_value();
        };
        match self.codec.decode(raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(
                    message = "persist.decode_failed",
                    key,
                    scope = scope.as_str(),
                    error = %err
                );
                self.record(FaultKind::Decode);
                self.default_value()
            }
        }
    }

    /// Replace the in-memory value and notify observers.
    fn commit(&self, value: T) {
        let snapshot = Rc::new(value);
        *self.value.borrow_mut() = Rc::clone(&snapshot);
        self.version.set(self.version.get() + 1);

        let observers: Vec<Observer<T>> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, f)| Rc::clone(f))
            .collect();
        for observer in observers {
            observer(&*snapshot);
        }
    }

    /// Adopt the value carried by a notification from another context.
    fn reconcile(&self, change: &StorageEvent) {
        let (key, scope) = self.key_and_scope();
        if !change.affects(scope, &key) {
            return;
        }
        let raw = change.key.as_ref().and(change.new_value.as_deref());
        tracing::debug!(
            message = "persist.reconcile",
            key = key.as_str(),
            scope = scope.as_str(),
            removed = raw.is_none()
        );
        let value = self.decode_or_default(&key, scope, raw);
        self.commit(value);
    }
}

/// One logical value mirrored into a key/value store and kept in step with
/// other contexts writing the same key.
///
/// # Example
///
/// ```
/// use tabsync_runtime::{Origin, PersistedCell};
///
/// let origin = Origin::new();
/// let tab_a = origin.open_context();
/// let tab_b = origin.open_context();
///
/// let a = PersistedCell::local(&tab_a, "counter", 1);
/// let b = PersistedCell::local(&tab_b, "counter", 1);
///
/// a.update(|n| n + 1);
/// assert_eq!(a.get(), 2);
/// assert_eq!(b.get(), 2);
///
/// a.remove();
/// assert_eq!(b.get(), 1);
/// ```
pub struct PersistedCell<T, C = JsonCodec> {
    state: Rc<CellState<T, C>>,
    stores: Stores,
    reconcile: EventSubscription,
}

impl<T: fmt::Debug, C> fmt::Debug for PersistedCell<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let binding = self.state.binding.borrow();
        f.debug_struct("PersistedCell")
            .field("key", &binding.key)
            .field("scope", &binding.scope)
            .field("value", &self.state.value.borrow())
            .field("persistent", &binding.store.is_some())
            .field("version", &self.state.version.get())
            .finish()
    }
}

impl<T> PersistedCell<T, JsonCodec>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    /// Bind `key` in `scope` of `ctx`, encoded as JSON.
    #[must_use]
    pub fn new(ctx: &Context, key: impl Into<String>, default: T, scope: StorageScope) -> Self {
        Self::with_codec(ctx, key, default, scope, JsonCodec)
    }

    /// Bind `key` in the local scope.
    #[must_use]
    pub fn local(ctx: &Context, key: impl Into<String>, default: T) -> Self {
        Self::new(ctx, key, default, StorageScope::Local)
    }

    /// Bind `key` in the session scope.
    #[must_use]
    pub fn session(ctx: &Context, key: impl Into<String>, default: T) -> Self {
        Self::new(ctx, key, default, StorageScope::Session)
    }
}

impl<T, C> PersistedCell<T, C>
where
    T: Clone + 'static,
    C: Codec<T> + 'static,
{
    /// Bind `key` in `scope` of `ctx` with a custom codec.
    ///
    /// When `ctx` has no storage the cell works in memory only; when it has
    /// no global target the cell receives no notifications.
    #[must_use]
    pub fn with_codec(
        ctx: &Context,
        key: impl Into<String>,
        default: T,
        scope: StorageScope,
        codec: C,
    ) -> Self {
        let stores = Stores::of(ctx);
        let binding = Binding {
            key: key.into(),
            scope,
            default: default.clone(),
            store: stores.get(scope),
        };
        let state = Rc::new(CellState {
            binding: RefCell::new(binding),
            value: RefCell::new(Rc::new(default)),
            codec,
            version: Cell::new(0),
            last_fault: Cell::new(None),
            fault_count: Cell::new(0),
            observers: Rc::new(RefCell::new(Vec::new())),
            next_observer: Cell::new(0),
        });
        let initial = state.load();
        *state.value.borrow_mut() = Rc::new(initial);

        let mut cell = Self {
            state,
            stores,
            reconcile: EventSubscription::for_context(ctx),
        };
        cell.listen();
        cell
    }

    /// Supply the reconciliation handler for the current binding.
    fn listen(&mut self) {
        let weak: Weak<CellState<T, C>> = Rc::downgrade(&self.state);
        self.reconcile.subscribe_global(STORAGE, move |event: &Event| {
            if let (Some(state), Some(change)) = (weak.upgrade(), event.as_storage()) {
                state.reconcile(change);
            }
        });
    }

    /// A clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        T::clone(&*self.state.current())
    }

    /// Borrow the current value without cloning it.
    ///
    /// `f` sees the value as of the call. It may write to this cell or to any
    /// peer; those changes are visible to later reads, not to `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let current = self.state.current();
        f(&*current)
    }

    /// Replace the value, or derive it from the current in-memory value.
    ///
    /// The store is written first; on an encode or store fault the
    /// in-memory value is unchanged and the fault is logged.
    pub fn write<'a>(&self, action: impl Into<SetAction<'a, T>>) {
        let next = action.into().resolve(&self.state.current());
        let (key, scope) = self.state.key_and_scope();
        let store = self.state.binding.borrow().store.clone();
        let version = self.state.version.get();

        if let Some(store) = store {
            let raw = match self.state.codec.encode(&next) {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::warn!(
                        message = "persist.encode_failed",
                        key = key.as_str(),
                        scope = scope.as_str(),
                        error = %err
                    );
                    self.state.record(FaultKind::Encode);
                    return;
                }
            };
            if let Err(err) = store.set(&key, &raw) {
                tracing::warn!(
                    message = "persist.write_failed",
                    key = key.as_str(),
                    scope = scope.as_str(),
                    error = %err
                );
                self.state.record(FaultKind::Write);
                return;
            }
            if self.state.version.get() != version {
                tracing::debug!(
                    message = "persist.superseded",
                    key = key.as_str(),
                    scope = scope.as_str()
                );
                return;
            }
        }
        self.state.commit(next);
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        self.write(SetAction::Value(value));
    }

    /// Derive the new value from the current in-memory value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.write(SetAction::update(f));
    }

    /// Delete the key from the store and reset to the default.
    ///
    /// The reset happens even when the delete fails. It is skipped only when
    /// a peer wrote the key back while the delete was being broadcast.
    pub fn remove(&self) {
        let (key, scope) = self.state.key_and_scope();
        let store = self.state.binding.borrow().store.clone();
        let version = self.state.version.get();
        if let Some(store) = store
            && let Err(err) = store.delete(&key)
        {
            tracing::warn!(
                message = "persist.delete_failed",
                key = key.as_str(),
                scope = scope.as_str(),
                error = %err
            );
            self.state.record(FaultKind::Delete);
        }
        if self.state.version.get() != version {
            tracing::debug!(
                message = "persist.superseded",
                key = key.as_str(),
                scope = scope.as_str()
            );
            return;
        }
        self.state.commit(self.state.default_value());
    }

    /// Bind to a different key or scope.
    ///
    /// Nothing is migrated: the cell reloads as if freshly created for the
    /// new binding. Rebinding to the current binding does nothing.
    pub fn rebind(&mut self, key: impl Into<String>, scope: StorageScope) {
        let key = key.into();
        {
            let mut binding = self.state.binding.borrow_mut();
            if binding.key == key && binding.scope == scope {
                return;
            }
            binding.key = key;
            binding.scope = scope;
            binding.store = self.stores.get(scope);
        }
        let value = self.state.load();
        self.state.commit(value);
        self.listen();
    }

    /// Replace the fallback value used from now on.
    ///
    /// The current value is left alone, even if it came from the old default.
    pub fn set_default(&self, default: T) {
        self.state.binding.borrow_mut().default = default;
    }

    /// Call `f` with the new value after every in-memory change.
    pub fn on_change(&self, f: impl Fn(&T) + 'static) -> ChangeGuard {
        let id = self.state.next_observer.get();
        self.state.next_observer.set(id + 1);
        let observer: Observer<T> = Rc::new(f);
        self.state.observers.borrow_mut().push((id, observer));

        let observers = Rc::downgrade(&self.state.observers);
        let unsubscribe: Box<dyn FnOnce()> = Box::new(move || {
            if let Some(observers) = observers.upgrade() {
                observers.borrow_mut().retain(|(oid, _)| *oid != id);
            }
        });
        ChangeGuard {
            unsubscribe: Some(unsubscribe),
        }
    }

    #[must_use]
    pub fn key(&self) -> String {
        self.state.binding.borrow().key.clone()
    }

    #[must_use]
    pub fn scope(&self) -> StorageScope {
        self.state.binding.borrow().scope
    }

    #[must_use]
    pub fn default_value(&self) -> T {
        self.state.default_value()
    }

    /// Whether writes reach a store.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.state.binding.borrow().store.is_some()
    }

    /// Whether the cell listens for notifications from other contexts.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.reconcile.is_registered()
    }

    /// Number of in-memory changes since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.version.get()
    }

    /// The most recent fault this cell recovered from.
    #[must_use]
    pub fn last_fault(&self) -> Option<FaultKind> {
        self.state.last_fault.get()
    }

    /// Faults recovered from since creation.
    #[must_use]
    pub fn fault_count(&self) -> u64 {
        self.state.fault_count.get()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
