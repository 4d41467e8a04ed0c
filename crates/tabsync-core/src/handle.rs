#![forbid(unsafe_code)]

//! Deferred target references.
//!
//! A [`TargetHandle`] is a shared slot that may not point at a live target
//! yet (an element that has not been mounted). Consumers resolve it at each
//! activation; an empty handle resolves to nothing.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::target::{EventTarget, TargetId};

/// Shared, clonable slot holding an optional target.
///
/// Cloning a handle creates a new reference to the **same** slot.
#[derive(Clone, Default)]
pub struct TargetHandle {
    slot: Rc<RefCell<Option<Rc<dyn EventTarget>>>>,
}

impl fmt::Debug for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetHandle")
            .field("target", &self.target_id())
            .finish()
    }
}

impl TargetHandle {
    /// An empty handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle already pointing at `target`.
    #[must_use]
    pub fn attached(target: Rc<dyn EventTarget>) -> Self {
        let handle = Self::new();
        handle.attach(target);
        handle
    }

    /// Point the handle at `target`, replacing any previous target.
    pub fn attach(&self, target: Rc<dyn EventTarget>) {
        *self.slot.borrow_mut() = Some(target);
    }

    /// Empty the handle. Returns the previous target, if any.
    pub fn detach(&self) -> Option<Rc<dyn EventTarget>> {
        self.slot.borrow_mut().take()
    }

    /// The target currently in the slot.
    #[must_use]
    pub fn resolve(&self) -> Option<Rc<dyn EventTarget>> {
        self.slot.borrow().clone()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.slot.borrow().is_some()
    }

    #[must_use]
    pub fn target_id(&self) -> Option<TargetId> {
        self.slot.borrow().as_ref().map(|t| t.target_id())
    }
}
