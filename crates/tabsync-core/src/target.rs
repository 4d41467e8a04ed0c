#![forbid(unsafe_code)]

//! Event targets and listener registration.
//!
//! # Design
//!
//! An [`EventTarget`] is anything that accepts `(name, listener, options)`
//! registrations. Listener identity is the address of the shared closure, so
//! the same [`Listener`] value must be handed to
//! [`remove_listener`](EventTarget::remove_listener) that was handed to
//! [`add_listener`](EventTarget::add_listener).
//!
//! # Invariants
//!
//! 1. A registration is keyed by `(name, listener address, options)`. Adding
//!    an identical key twice keeps a single registration.
//! 2. Removal with any other listener value or options leaves the existing
//!    registration in place.
//! 3. Listeners are invoked in registration order.
//! 4. A listener removed while a dispatch is in progress is not invoked by
//!    that dispatch.
//! 5. A `once` listener is removed before its first invocation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::Event;

/// Shared callback installed on a target.
pub type Listener = Rc<dyn Fn(&Event)>;

// ─── Target ID generation ────────────────────────────────────────────────────

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

fn next_target_id() -> TargetId {
    TargetId(NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed))
}

/// Process-unique identity of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Allocate a fresh identity for a new target.
    #[must_use]
    pub fn fresh() -> Self {
        next_target_id()
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

// ─── Options ─────────────────────────────────────────────────────────────────

/// Registration options. Equality of the whole value is significant: removal
/// only matches a registration made with equal options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ListenerOptions {
    pub capture: bool,
    /// Remove the registration before its first invocation.
    pub once: bool,
    pub passive: bool,
}

impl ListenerOptions {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            capture: false,
            once: false,
            passive: false,
        }
    }

    #[must_use]
    pub const fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    #[must_use]
    pub const fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    #[must_use]
    pub const fn with_passive(mut self, passive: bool) -> Self {
        self.passive = passive;
        self
    }
}

impl From<bool> for ListenerOptions {
    /// A bare boolean selects capture, as in the DOM shorthand.
    fn from(capture: bool) -> Self {
        Self::new().with_capture(capture)
    }
}

// ─── EventTarget ─────────────────────────────────────────────────────────────

/// An addressable source of named events.
pub trait EventTarget {
    /// Stable identity; a change of identity forces re-subscription.
    fn target_id(&self) -> TargetId;

    /// Whether this target can hold listeners at all. Subscribing to a target
    /// that returns `false` is a no-op.
    fn accepts_listeners(&self) -> bool {
        true
    }

    fn add_listener(&self, name: &str, listener: &Listener, options: ListenerOptions);

    fn remove_listener(&self, name: &str, listener: &Listener, options: ListenerOptions);
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

// ─── ListenerRegistry ────────────────────────────────────────────────────────

struct Entry {
    name: String,
    listener: Listener,
    options: ListenerOptions,
    /// Set on removal so an in-flight dispatch skips the entry.
    removed: Rc<Cell<bool>>,
}

impl Entry {
    fn matches(&self, name: &str, listener: &Listener, options: ListenerOptions) -> bool {
        self.name == name && self.options == options && same_listener(&self.listener, listener)
    }
}

/// Ordered listener storage backing concrete targets.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: RefCell<Vec<Entry>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.borrow();
        f.debug_struct("ListenerRegistry")
            .field("len", &entries.len())
            .field(
                "names",
                &entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Returns `false` if the identical registration
    /// already exists.
    pub fn add(&self, name: &str, listener: &Listener, options: ListenerOptions) -> bool {
        let mut entries = self.entries.borrow_mut();
        if entries.iter().any(|e| e.matches(name, listener, options)) {
            return false;
        }
        entries.push(Entry {
            name: name.to_string(),
            listener: Rc::clone(listener),
            options,
            removed: Rc::new(Cell::new(false)),
        });
        true
    }

    /// Remove the registration with exactly this key. Returns `false` when
    /// nothing matched; the caller gets no other signal.
    pub fn remove(&self, name: &str, listener: &Listener, options: ListenerOptions) -> bool {
        let mut entries = self.entries.borrow_mut();
        match entries
            .iter()
            .position(|e| e.matches(name, listener, options))
        {
            Some(idx) => {
                let entry = entries.remove(idx);
                entry.removed.set(true);
                true
            }
            None => false,
        }
    }

    /// Invoke every listener registered under `event.name()`.
    ///
    /// Returns the number of listeners invoked. Listeners may add or remove
    /// registrations while running; additions take effect on the next
    /// dispatch.
    pub fn dispatch(&self, event: &Event) -> usize {
        let name = event.name();
        let snapshot: Vec<(Listener, ListenerOptions, Rc<Cell<bool>>)> = self
            .entries
            .borrow()
            .iter()
            .filter(|e| e.name == name)
            .map(|e| (Rc::clone(&e.listener), e.options, Rc::clone(&e.removed)))
            .collect();

        let mut invoked = 0;
        for (listener, options, removed) in snapshot {
            if removed.get() {
                continue;
            }
            if options.once {
                self.remove(name, &listener, options);
            }
            listener(event);
            invoked += 1;
        }
        invoked
    }

    /// Number of live registrations under `name`.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.name == name)
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

// ─── Concrete targets ────────────────────────────────────────────────────────

/// The three kinds of target a context exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    /// The context-wide target (receives `resize` and `storage`).
    Global,
    /// The document of a context.
    Document,
    /// One element inside a document.
    Element { tag: String },
}

/// An in-memory event target.
#[derive(Debug)]
pub struct Target {
    id: TargetId,
    kind: TargetKind,
    listeners: ListenerRegistry,
}

impl Target {
    #[must_use]
    pub fn new(kind: TargetKind) -> Self {
        Self {
            id: TargetId::fresh(),
            kind,
            listeners: ListenerRegistry::new(),
        }
    }

    #[must_use]
    pub fn global() -> Rc<Self> {
        Rc::new(Self::new(TargetKind::Global))
    }

    #[must_use]
    pub fn document() -> Rc<Self> {
        Rc::new(Self::new(TargetKind::Document))
    }

    #[must_use]
    pub fn element(tag: impl Into<String>) -> Rc<Self> {
        Rc::new(Self::new(TargetKind::Element { tag: tag.into() }))
    }

    #[must_use]
    pub fn kind(&self) -> &TargetKind {
        &self.kind
    }

    /// Deliver `event` to the listeners registered under its name.
    pub fn dispatch(&self, event: &Event) -> usize {
        let invoked = self.listeners.dispatch(event);
        #[cfg(feature = "tracing")]
        tracing::trace!(
            message = "target.dispatch",
            target_id = self.id.raw(),
            event = event.name(),
            invoked
        );
        invoked
    }

    /// Live registrations under `name`.
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.count(name)
    }
}

impl EventTarget for Target {
    fn target_id(&self) -> TargetId {
        self.id
    }

    fn add_listener(&self, name: &str, listener: &Listener, options: ListenerOptions) {
        self.listeners.add(name, listener, options);
    }

    fn remove_listener(&self, name: &str, listener: &Listener, options: ListenerOptions) {
        if !self.listeners.remove(name, listener, options) {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                message = "target.remove_unmatched",
                target_id = self.id.raw(),
                event = name
            );
        }
    }
}

/// A target without listener capability. Registrations against it are
/// ignored.
#[derive(Debug)]
pub struct InertTarget {
    id: TargetId,
}

impl InertTarget {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: TargetId::fresh(),
        }
    }
}

impl Default for InertTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl EventTarget for InertTarget {
    fn target_id(&self) -> TargetId {
        self.id
    }

    fn accepts_listeners(&self) -> bool {
        false
    }

    fn add_listener(&self, _name: &str, _listener: &Listener, _options: ListenerOptions) {}

    fn remove_listener(&self, _name: &str, _listener: &Listener, _options: ListenerOptions) {}
}
