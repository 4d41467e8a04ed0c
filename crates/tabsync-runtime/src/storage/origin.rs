//! Origins, contexts, and the storage change broadcast.
//!
//! # Model
//!
//! An [`Origin`] owns one local area shared by all of its contexts and one
//! session area per top-level context. A [`Context`] is a single execution
//! context with its own global and document targets. Frames opened with
//! [`Origin::open_frame`] share their parent's session area.
//!
//! # Broadcast
//!
//! Writes made through [`Context::store`] that change an area produce a
//! [`StorageEvent`]. It is dispatched as `"storage"` on the global target of
//! every other live, non-suspended context sharing the area. The writer's own
//! context never receives it.
//!
//! # Failure Modes
//!
//! - **Suspended context**: notifications addressed to it are dropped, not
//!   replayed on resume.
//! - **Dropped context**: it stops receiving notifications; stores handed out
//!   from it keep working against the shared area.
//! - **Dropped origin**: stores keep working; nothing is broadcast.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Deserialize;
use tabsync_core::{Event, EventTarget, StorageEvent, StorageScope, Target};

use super::{StorageArea, Store};
use crate::error::StoreError;

/// When change notifications reach other contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Dispatch during the mutating call.
    #[default]
    Immediate,
    /// Hold notifications until [`Origin::deliver_pending`].
    Queued,
}

/// Configuration for an [`Origin`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Default: [`Delivery::Immediate`].
    pub delivery: Delivery,
    /// When false, contexts have no storage and cells stay in memory.
    /// Default: true.
    pub storage_enabled: bool,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            delivery: Delivery::Immediate,
            storage_enabled: true,
        }
    }
}

impl OriginConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    #[must_use]
    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    #[must_use]
    pub fn with_storage_enabled(mut self, enabled: bool) -> Self {
        self.storage_enabled = enabled;
        self
    }
}

/// Identity of a context within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionId(u64);

struct Notification {
    source: ContextId,
    session: Option<SessionId>,
    change: StorageEvent,
}

// ─── Origin ──────────────────────────────────────────────────────────────────

struct OriginInner {
    config: OriginConfig,
    local: Rc<StorageArea>,
    contexts: RefCell<Vec<Weak<ContextHost>>>,
    pending: RefCell<VecDeque<Notification>>,
    next_context: Cell<u64>,
    next_session: Cell<u64>,
}

impl OriginInner {
    fn next_context_id(&self) -> ContextId {
        let id = self.next_context.get();
        self.next_context.set(id + 1);
        ContextId(id)
    }

    fn next_session_id(&self) -> SessionId {
        let id = self.next_session.get();
        self.next_session.set(id + 1);
        SessionId(id)
    }

    fn publish(&self, notification: Notification) {
        match self.config.delivery {
            Delivery::Immediate => {
                self.deliver(&notification);
            }
            Delivery::Queued => self.pending.borrow_mut().push_back(notification),
        }
    }

    /// Dispatch one notification; returns the number of contexts reached.
    fn deliver(&self, notification: &Notification) -> usize {
        let recipients: Vec<Rc<ContextHost>> = {
            let mut contexts = self.contexts.borrow_mut();
            contexts.retain(|weak| weak.strong_count() > 0);
            contexts
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|host| host.id != notification.source)
                .filter(|host| match notification.session {
                    Some(session) => host.session == session,
                    None => true,
                })
                .collect()
        };

        let event = Event::Storage(notification.change.clone());
        let mut reached = 0;
        for host in recipients {
            if host.suspended.get() {
                tracing::trace!(
                    message = "storage.notify_dropped",
                    context = host.id.raw(),
                    key = notification.change.key.as_deref()
                );
                continue;
            }
            host.window.dispatch(&event);
            reached += 1;
        }
        tracing::trace!(
            message = "storage.notify",
            source = notification.source.raw(),
            scope = notification.change.scope.as_str(),
            key = notification.change.key.as_deref(),
            reached
        );
        reached
    }
}

/// A set of contexts sharing storage.
///
/// Cloning an `Origin` creates a new handle to the **same** origin.
#[derive(Clone)]
pub struct Origin {
    inner: Rc<OriginInner>,
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin")
            .field("config", &self.inner.config)
            .field("contexts", &self.context_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Default for Origin {
    fn default() -> Self {
        Self::new()
    }
}

impl Origin {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(OriginConfig::default())
    }

    #[must_use]
    pub fn with_config(config: OriginConfig) -> Self {
        Self {
            inner: Rc::new(OriginInner {
                config,
                local: Rc::new(StorageArea::new(StorageScope::Local)),
                contexts: RefCell::new(Vec::new()),
                pending: RefCell::new(VecDeque::new()),
                next_context: Cell::new(1),
                next_session: Cell::new(1),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &OriginConfig {
        &self.inner.config
    }

    /// Open a top-level context with a fresh session area.
    #[must_use]
    pub fn open_context(&self) -> Context {
        let session = self.inner.next_session_id();
        let area = Rc::new(StorageArea::new(StorageScope::Session));
        self.open(session, area)
    }

    /// Open a context nested in `parent`, sharing its session area.
    ///
    /// A headless parent, or one opened by a different origin, has no
    /// session this origin may share; the frame gets a fresh one.
    #[must_use]
    pub fn open_frame(&self, parent: &Context) -> Context {
        match &parent.host {
            Some(host) if Weak::ptr_eq(&host.origin, &Rc::downgrade(&self.inner)) => {
                self.open(host.session, Rc::clone(&host.session_area))
            }
            Some(host) => {
                tracing::warn!(
                    message = "origin.foreign_parent",
                    parent = host.id.raw()
                );
                self.open_context()
            }
            None => self.open_context(),
        }
    }

    fn open(&self, session: SessionId, session_area: Rc<StorageArea>) -> Context {
        let id = self.inner.next_context_id();
        let weak_origin = Rc::downgrade(&self.inner);
        let stores = self.inner.config.storage_enabled.then(|| {
            let local = Rc::new(ContextStore {
                area: Rc::clone(&self.inner.local),
                source: id,
                session: None,
                origin: weak_origin.clone(),
            });
            let session_store = Rc::new(ContextStore {
                area: Rc::clone(&session_area),
                source: id,
                session: Some(session),
                origin: weak_origin,
            });
            (local, session_store)
        });
        let host = Rc::new(ContextHost {
            id,
            origin: Rc::downgrade(&self.inner),
            session,
            session_area,
            window: Target::global(),
            document: Target::document(),
            suspended: Cell::new(false),
            stores,
        });
        {
            let mut contexts = self.inner.contexts.borrow_mut();
            contexts.retain(|weak| weak.strong_count() > 0);
            contexts.push(Rc::downgrade(&host));
        }
        tracing::debug!(message = "origin.open_context", context = id.raw());
        Context {
            id,
            host: Some(host),
        }
    }

    /// The local area shared by every context.
    #[must_use]
    pub fn local_area(&self) -> Rc<StorageArea> {
        Rc::clone(&self.inner.local)
    }

    /// Number of contexts still alive.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.inner
            .contexts
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Notifications held back by [`Delivery::Queued`].
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Deliver every held notification in order, including any produced
    /// while delivering. Returns the number of context deliveries made.
    pub fn deliver_pending(&self) -> usize {
        let mut reached = 0;
        loop {
            let next = self.inner.pending.borrow_mut().pop_front();
            match next {
                Some(notification) => reached += self.inner.deliver(&notification),
                None => return reached,
            }
        }
    }

    /// Throw away held notifications without delivering them.
    pub fn discard_pending(&self) -> usize {
        let mut pending = self.inner.pending.borrow_mut();
        let dropped = pending.len();
        pending.clear();
        dropped
    }
}

// ─── Context ─────────────────────────────────────────────────────────────────

struct ContextHost {
    id: ContextId,
    origin: Weak<OriginInner>,
    session: SessionId,
    session_area: Rc<StorageArea>,
    window: Rc<Target>,
    document: Rc<Target>,
    suspended: Cell<bool>,
    /// `(local, session)`; absent when storage is disabled.
    stores: Option<(Rc<ContextStore>, Rc<ContextStore>)>,
}

/// One execution context.
///
/// Cloning a `Context` creates a new handle to the **same** context. The
/// context stops receiving notifications once every handle is dropped.
#[derive(Clone)]
pub struct Context {
    id: ContextId,
    host: Option<Rc<ContextHost>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("headless", &self.is_headless())
            .field("suspended", &self.is_suspended())
            .finish()
    }
}

impl Context {
    /// A context with no global target and no storage.
    ///
    /// Subscriptions against the global target are no-ops and cells are
    /// in-memory only.
    #[must_use]
    pub fn headless() -> Self {
        Self {
            id: ContextId(0),
            host: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[must_use]
    pub fn is_headless(&self) -> bool {
        self.host.is_none()
    }

    /// The concrete global target.
    #[must_use]
    pub fn window(&self) -> Option<Rc<Target>> {
        self.host.as_ref().map(|h| Rc::clone(&h.window))
    }

    /// The global target as a trait object.
    #[must_use]
    pub fn global(&self) -> Option<Rc<dyn EventTarget>> {
        self.window().map(|w| w as Rc<dyn EventTarget>)
    }

    #[must_use]
    pub fn document(&self) -> Option<Rc<Target>> {
        self.host.as_ref().map(|h| Rc::clone(&h.document))
    }

    /// The store for `scope`, or `None` when storage is unavailable here.
    #[must_use]
    pub fn store(&self, scope: StorageScope) -> Option<Rc<dyn Store>> {
        let (local, session) = self.host.as_ref()?.stores.as_ref()?;
        let store: Rc<dyn Store> = match scope {
            StorageScope::Local => Rc::clone(local) as Rc<dyn Store>,
            StorageScope::Session => Rc::clone(session) as Rc<dyn Store>,
        };
        Some(store)
    }

    /// The session area backing this context, for inspection and fault
    /// injection.
    #[must_use]
    pub fn session_area(&self) -> Option<Rc<StorageArea>> {
        self.host.as_ref().map(|h| Rc::clone(&h.session_area))
    }

    /// Clear every key in `scope`, notifying the other contexts.
    ///
    /// Does nothing when storage is unavailable.
    pub fn clear(&self, scope: StorageScope) -> Result<(), StoreError> {
        let Some((local, session)) = self.host.as_ref().and_then(|h| h.stores.as_ref()) else {
            return Ok(());
        };
        match scope {
            StorageScope::Local => local.clear(),
            StorageScope::Session => session.clear(),
        }
    }

    /// Dispatch `event` on the global target. Returns the listener count
    /// invoked, `0` when headless.
    pub fn dispatch(&self, event: &Event) -> usize {
        self.host.as_ref().map_or(0, |h| h.window.dispatch(event))
    }

    /// While suspended, change notifications addressed to this context are
    /// dropped.
    pub fn set_suspended(&self, suspended: bool) {
        if let Some(host) = &self.host {
            host.suspended.set(suspended);
        }
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.host.as_ref().is_some_and(|h| h.suspended.get())
    }
}

// ─── ContextStore ────────────────────────────────────────────────────────────

/// A context's write-through handle to a shared area.
struct ContextStore {
    area: Rc<StorageArea>,
    source: ContextId,
    /// Set for session areas; limits delivery to contexts of that session.
    session: Option<SessionId>,
    origin: Weak<OriginInner>,
}

impl ContextStore {
    fn notify(&self, change: StorageEvent) {
        if let Some(origin) = self.origin.upgrade() {
            origin.publish(Notification {
                source: self.source,
                session: self.session,
                change,
            });
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        if self.area.clear()? {
            self.notify(StorageEvent::cleared(self.area.scope()));
        }
        Ok(())
    }
}

impl Store for ContextStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.area.get_item(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let old = self.area.set_item(key, value)?;
        if old.as_deref() != Some(value) {
            self.notify(StorageEvent::set(self.area.scope(), key, old, value));
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        if let Some(old) = self.area.remove_item(key)? {
            self.notify(StorageEvent::removed(self.area.scope(), key, Some(old)));
        }
        Ok(())
    }
}
