#![forbid(unsafe_code)]

//! Event subscriptions with a stable listener identity.
//!
//! # Design
//!
//! [`EventSubscription`] is driven by repeated calls to
//! [`subscribe`](EventSubscription::subscribe), typically once per update
//! cycle of its owner. Each call may carry a new handler closure. The handler
//! is stored in a single-slot holder, and the listener actually installed on
//! the target is a forwarder that reads the slot at dispatch time. Handler
//! changes therefore never touch the target.
//!
//! # Invariants
//!
//! 1. At most one registration exists at any time.
//! 2. A registration is replaced only when `(target identity, event name,
//!    options)` changes; the old one is removed before the new one is added.
//! 3. Removal uses exactly the `(name, forwarder, options)` recorded at
//!    registration.
//! 4. A dispatch always reaches the most recently supplied handler.
//! 5. After [`teardown`](EventSubscription::teardown) or drop, no handler
//!    supplied to this subscription is invoked again.
//!
//! # Failure Modes
//!
//! - **No target**: when the target resolves to nothing, or to a target that
//!   cannot hold listeners, the call is a no-op (any prior registration is
//!   torn down). A later call that resolves a target registers normally.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tabsync_core::{Event, EventTarget, Listener, ListenerOptions, TargetHandle, TargetId};

use crate::storage::Context;

type Handler = Rc<dyn Fn(&Event)>;

/// Where a subscription attaches.
#[derive(Clone, Default)]
pub enum TargetRef {
    /// The owning context's global target.
    #[default]
    Global,
    /// A specific target.
    Direct(Rc<dyn EventTarget>),
    /// A deferred reference resolved on every `subscribe` call.
    Handle(TargetHandle),
}

impl fmt::Debug for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("Global"),
            Self::Direct(target) => f.debug_tuple("Direct").field(&target.target_id()).finish(),
            Self::Handle(handle) => f.debug_tuple("Handle").field(handle).finish(),
        }
    }
}

impl TargetRef {
    fn resolve(&self, global: Option<&Rc<dyn EventTarget>>) -> Option<Rc<dyn EventTarget>> {
        match self {
            Self::Global => global.cloned(),
            Self::Direct(target) => Some(Rc::clone(target)),
            Self::Handle(handle) => handle.resolve(),
        }
    }
}

impl<T: EventTarget + 'static> From<Rc<T>> for TargetRef {
    fn from(target: Rc<T>) -> Self {
        Self::Direct(target)
    }
}

impl From<TargetHandle> for TargetRef {
    fn from(handle: TargetHandle) -> Self {
        Self::Handle(handle)
    }
}

impl From<&TargetHandle> for TargetRef {
    fn from(handle: &TargetHandle) -> Self {
        Self::Handle(handle.clone())
    }
}

/// The live `(target, name, forwarder, options)` tuple.
struct Registration {
    target: Rc<dyn EventTarget>,
    target_id: TargetId,
    event_name: String,
    listener: Listener,
    options: ListenerOptions,
}

impl Registration {
    fn matches(&self, target_id: TargetId, event_name: &str, options: ListenerOptions) -> bool {
        self.target_id == target_id && self.event_name == event_name && self.options == options
    }
}

/// Owns one listener registration against one `(event name, target)` pair.
pub struct EventSubscription {
    global: Option<Rc<dyn EventTarget>>,
    handler: Rc<RefCell<Option<Handler>>>,
    registration: Option<Registration>,
    registrations_created: u64,
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("event", &self.registered_event())
            .field("target", &self.registered_target())
            .field("registrations_created", &self.registrations_created)
            .finish()
    }
}

impl EventSubscription {
    /// A subscription whose [`TargetRef::Global`] resolves to `global`.
    #[must_use]
    pub fn new(global: Option<Rc<dyn EventTarget>>) -> Self {
        Self {
            global,
            handler: Rc::new(RefCell::new(None)),
            registration: None,
            registrations_created: 0,
        }
    }

    /// A subscription bound to the global target of `ctx`.
    #[must_use]
    pub fn for_context(ctx: &Context) -> Self {
        Self::new(ctx.global())
    }

    /// Supply the current handler and (re)establish the registration.
    ///
    /// The handler slot is updated on every call. The target is resolved on
    /// every call; the registration is replaced only when the resolved target,
    /// `event_name`, or `options` differ from the live registration.
    pub fn subscribe<F>(
        &mut self,
        event_name: &str,
        handler: F,
        target: impl Into<TargetRef>,
        options: impl Into<ListenerOptions>,
    ) where
        F: Fn(&Event) + 'static,
    {
        *self.handler.borrow_mut() = Some(Rc::new(handler));

        let options = options.into();
        let resolved = target
            .into()
            .resolve(self.global.as_ref())
            .filter(|t| t.accepts_listeners());
        let Some(target) = resolved else {
            self.teardown();
            return;
        };

        let target_id = target.target_id();
        if self
            .registration
            .as_ref()
            .is_some_and(|r| r.matches(target_id, event_name, options))
        {
            return;
        }

        self.teardown();
        let listener = self.forwarder();
        target.add_listener(event_name, &listener, options);
        self.registrations_created += 1;
        tracing::debug!(
            message = "subscription.register",
            event = event_name,
            target_id = target_id.raw()
        );
        self.registration = Some(Registration {
            target,
            target_id,
            event_name: event_name.to_string(),
            listener,
            options,
        });
    }

    /// Shorthand for `subscribe(name, handler, TargetRef::Global, default)`.
    pub fn subscribe_global<F>(&mut self, event_name: &str, handler: F)
    where
        F: Fn(&Event) + 'static,
    {
        self.subscribe(event_name, handler, TargetRef::Global, ListenerOptions::default());
    }

    /// Remove the live registration, if any.
    pub fn teardown(&mut self) {
        if let Some(reg) = self.registration.take() {
            reg.target
                .remove_listener(&reg.event_name, &reg.listener, reg.options);
            tracing::debug!(
                message = "subscription.teardown",
                event = reg.event_name.as_str(),
                target_id = reg.target_id.raw()
            );
        }
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    #[must_use]
    pub fn registered_event(&self) -> Option<&str> {
        self.registration.as_ref().map(|r| r.event_name.as_str())
    }

    #[must_use]
    pub fn registered_target(&self) -> Option<TargetId> {
        self.registration.as_ref().map(|r| r.target_id)
    }

    #[must_use]
    pub fn registered_options(&self) -> Option<ListenerOptions> {
        self.registration.as_ref().map(|r| r.options)
    }

    /// Registrations made over this subscription's lifetime.
    #[must_use]
    pub fn registrations_created(&self) -> u64 {
        self.registrations_created
    }

    /// Build a listener that forwards to whatever handler is in the slot at
    /// dispatch time. Inert once this subscription is dropped.
    fn forwarder(&self) -> Listener {
        let slot = Rc::downgrade(&self.handler);
        Rc::new(move |event: &Event| {
            let current = slot.upgrade().and_then(|s| s.borrow().clone());
            if let Some(handler) = current {
                handler(event);
            }
        })
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use tabsync_core::{InertTarget, Target};

    use super::*;

    fn on_window(window: &Rc<Target>) -> EventSubscription {
        EventSubscription::new(Some(Rc::clone(window) as Rc<dyn EventTarget>))
    }

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    fn bump(count: &Rc<Cell<u32>>) -> impl Fn(&Event) + 'static {
        let c = Rc::clone(count);
        move |_: &Event| c.set(c.get() + 1)
    }

    #[test]
    fn attach_dispatch_and_unmount() {
        let window = Target::global();
        let count = counter();
        let mut sub = on_window(&window);

        sub.subscribe("resize", bump(&count), window.clone(), false);
        window.dispatch(&Event::resize(800, 600));
        assert_eq!(count.get(), 1);

        drop(sub);
        window.dispatch(&Event::resize(800, 600));
        assert_eq!(count.get(), 1);
        assert_eq!(window.listener_count("resize"), 0);
    }

    #[test]
    fn handler_change_keeps_single_registration() {
        let window = Target::global();
        let first = counter();
        let second = counter();
        let mut sub = on_window(&window);

        sub.subscribe_global("resize", bump(&first));
        sub.subscribe_global("resize", bump(&second));

        assert_eq!(sub.registrations_created(), 1);
        assert_eq!(window.listener_count("resize"), 1);

        window.dispatch(&Event::resize(1, 1));
        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn omitted_target_defaults_to_global() {
        let window = Target::global();
        let mut sub = on_window(&window);
        sub.subscribe("scroll", |_: &Event| {}, TargetRef::default(), false);
        assert_eq!(sub.registered_target(), Some(window.target_id()));
    }

    #[test]
    fn event_name_change_reregisters() {
        let window = Target::global();
        let count = counter();
        let mut sub = on_window(&window);

        sub.subscribe_global("resize", bump(&count));
        sub.subscribe_global("focus", bump(&count));

        assert_eq!(sub.registrations_created(), 2);
        assert_eq!(window.listener_count("resize"), 0);
        assert_eq!(window.listener_count("focus"), 1);
        assert_eq!(sub.registered_event(), Some("focus"));
    }

    #[test]
    fn target_change_moves_registration() {
        let window = Target::global();
        let el = Target::element("div");
        let count = counter();
        let mut sub = on_window(&window);

        sub.subscribe_global("click", bump(&count));
        sub.subscribe("click", bump(&count), el.clone(), false);

        assert_eq!(window.listener_count("click"), 0);
        assert_eq!(el.listener_count("click"), 1);
        el.dispatch(&Event::custom("click", None));
        window.dispatch(&Event::custom("click", None));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn options_change_reregisters_and_removes_with_recorded_options() {
        let window = Target::global();
        let mut sub = on_window(&window);

        sub.subscribe("resize", |_: &Event| {}, TargetRef::Global, false);
        sub.subscribe("resize", |_: &Event| {}, TargetRef::Global, true);

        assert_eq!(sub.registrations_created(), 2);
        assert_eq!(window.listener_count("resize"), 1);
        assert_eq!(
            sub.registered_options(),
            Some(ListenerOptions::new().with_capture(true))
        );

        sub.teardown();
        assert_eq!(window.listener_count("resize"), 0);
    }

    #[test]
    fn empty_handle_is_noop_until_attached() {
        let handle = TargetHandle::new();
        let count = counter();
        let mut sub = EventSubscription::new(None);

        sub.subscribe("click", bump(&count), &handle, false);
        assert!(!sub.is_registered());

        let el = Target::element("button");
        handle.attach(el.clone());
        sub.subscribe("click", bump(&count), &handle, false);
        assert!(sub.is_registered());

        el.dispatch(&Event::custom("click", None));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn detached_handle_tears_down() {
        let el = Target::element("input");
        let handle = TargetHandle::attached(el.clone());
        let mut sub = EventSubscription::new(None);

        sub.subscribe("change", |_: &Event| {}, &handle, false);
        assert_eq!(el.listener_count("change"), 1);

        handle.detach();
        sub.subscribe("change", |_: &Event| {}, &handle, false);
        assert!(!sub.is_registered());
        assert_eq!(el.listener_count("change"), 0);
    }

    #[test]
    fn no_global_target_is_noop() {
        let mut sub = EventSubscription::new(None);
        sub.subscribe_global("resize", |_: &Event| {});
        assert!(!sub.is_registered());
        sub.teardown();
    }

    #[test]
    fn target_without_listener_capability_is_noop() {
        let inert = Rc::new(InertTarget::new());
        let mut sub = EventSubscription::new(None);
        sub.subscribe("resize", |_: &Event| {}, inert, false);
        assert!(!sub.is_registered());
        assert_eq!(sub.registrations_created(), 0);
    }

    #[test]
    fn handler_may_resupply_itself_during_dispatch() {
        let window = Target::global();
        let sub = Rc::new(RefCell::new(on_window(&window)));
        let count = counter();

        let inner_sub = Rc::downgrade(&sub);
        let c = Rc::clone(&count);
        sub.borrow_mut().subscribe_global("resize", move |_: &Event| {
            c.set(c.get() + 1);
            if let Some(s) = inner_sub.upgrade() {
                let c2 = Rc::clone(&c);
                // Replacing the handler mid-dispatch must not panic.
                s.borrow_mut()
                    .subscribe_global("resize", move |_: &Event| c2.set(c2.get() + 10));
            }
        });

        window.dispatch(&Event::resize(1, 1));
        assert_eq!(count.get(), 1);
        window.dispatch(&Event::resize(1, 1));
        assert_eq!(count.get(), 11);
    }

    #[test]
    fn context_subscription_uses_context_window() {
        let origin = crate::storage::Origin::new();
        let ctx = origin.open_context();
        let count = counter();
        let mut sub = EventSubscription::for_context(&ctx);

        sub.subscribe_global("resize", bump(&count));
        ctx.dispatch(&Event::resize(1, 1));
        assert_eq!(count.get(), 1);

        sub.teardown();
        ctx.dispatch(&Event::resize(1, 1));
        assert_eq!(count.get(), 1);
    }
}
