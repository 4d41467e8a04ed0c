#![forbid(unsafe_code)]

//! Canonical event types delivered to listeners.
//!
//! Every event carries its dispatch name through [`Event::name`]. Targets
//! route an event only to listeners registered under that exact name.

use std::fmt;
use std::str::FromStr;

/// Dispatch name of [`Event::Resize`].
pub const RESIZE: &str = "resize";

/// Dispatch name of [`Event::Storage`].
pub const STORAGE: &str = "storage";

/// Which of the two independent storage areas a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StorageScope {
    /// Durable area shared by every context of an origin.
    #[default]
    Local,
    /// Area bound to one session (a context and the frames nested in it).
    Session,
}

impl StorageScope {
    /// Stable lowercase name, used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Session => "session",
        }
    }
}

impl fmt::Display for StorageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown scope name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownScope(pub String);

impl fmt::Display for UnknownScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown storage scope: {:?}", self.0)
    }
}

impl std::error::Error for UnknownScope {}

impl FromStr for StorageScope {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "session" => Ok(Self::Session),
            other => Err(UnknownScope(other.to_string())),
        }
    }
}

/// Change notification emitted by a storage area to the other contexts that
/// share it.
///
/// `key == None` means the whole area was cleared. `new_value == None` means
/// the key was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StorageEvent {
    pub scope: StorageScope,
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl StorageEvent {
    /// A key was written.
    #[must_use]
    pub fn set(
        scope: StorageScope,
        key: impl Into<String>,
        old_value: Option<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            key: Some(key.into()),
            old_value,
            new_value: Some(new_value.into()),
        }
    }

    /// A key was deleted.
    #[must_use]
    pub fn removed(scope: StorageScope, key: impl Into<String>, old_value: Option<String>) -> Self {
        Self {
            scope,
            key: Some(key.into()),
            old_value,
            new_value: None,
        }
    }

    /// The whole area was cleared.
    #[must_use]
    pub fn cleared(scope: StorageScope) -> Self {
        Self {
            scope,
            key: None,
            old_value: None,
            new_value: None,
        }
    }

    /// Whether this notification concerns `key` in `scope`.
    ///
    /// A clear notification concerns every key of its scope.
    #[must_use]
    pub fn affects(&self, scope: StorageScope, key: &str) -> bool {
        self.scope == scope && self.key.as_deref().is_none_or(|k| k == key)
    }
}

/// An event dispatched through an [`EventTarget`](crate::target::EventTarget).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The viewport of the context changed size.
    Resize { width: u32, height: u32 },
    /// A storage area shared with another context changed.
    Storage(StorageEvent),
    /// Application-defined event.
    Custom {
        name: String,
        detail: Option<String>,
    },
}

impl Event {
    #[must_use]
    pub fn resize(width: u32, height: u32) -> Self {
        Self::Resize { width, height }
    }

    #[must_use]
    pub fn custom(name: impl Into<String>, detail: Option<String>) -> Self {
        Self::Custom {
            name: name.into(),
            detail,
        }
    }

    /// Name listeners must be registered under to receive this event.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Resize { .. } => RESIZE,
            Self::Storage(_) => STORAGE,
            Self::Custom { name, .. } => name,
        }
    }

    /// The storage change carried by this event, if any.
    #[must_use]
    pub fn as_storage(&self) -> Option<&StorageEvent> {
        match self {
            Self::Storage(change) => Some(change),
            _ => None,
        }
    }
}

impl From<StorageEvent> for Event {
    fn from(change: StorageEvent) -> Self {
        Self::Storage(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_dispatch_constants() {
        assert_eq!(Event::resize(80, 24).name(), RESIZE);
        assert_eq!(
            Event::from(StorageEvent::cleared(StorageScope::Local)).name(),
            STORAGE
        );
        assert_eq!(Event::custom("focus", None).name(), "focus");
    }

    #[test]
    fn scope_parses_and_displays() {
        assert_eq!("local".parse::<StorageScope>(), Ok(StorageScope::Local));
        assert_eq!("session".parse::<StorageScope>(), Ok(StorageScope::Session));
        assert!("cookie".parse::<StorageScope>().is_err());
        assert_eq!(StorageScope::Session.to_string(), "session");
        assert_eq!(StorageScope::default(), StorageScope::Local);
    }

    #[test]
    fn affects_filters_by_scope_and_key() {
        let change = StorageEvent::set(StorageScope::Local, "count", None, "1");
        assert!(change.affects(StorageScope::Local, "count"));
        assert!(!change.affects(StorageScope::Local, "other"));
        assert!(!change.affects(StorageScope::Session, "count"));
    }

    #[test]
    fn clear_affects_every_key_in_scope() {
        let change = StorageEvent::cleared(StorageScope::Session);
        assert!(change.affects(StorageScope::Session, "a"));
        assert!(change.affects(StorageScope::Session, "b"));
        assert!(!change.affects(StorageScope::Local, "a"));
    }

    #[test]
    fn as_storage_only_for_storage_events() {
        let change = StorageEvent::removed(StorageScope::Local, "k", Some("1".into()));
        let event = Event::from(change.clone());
        assert_eq!(event.as_storage(), Some(&change));
        assert!(Event::resize(1, 1).as_storage().is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn storage_event_serializes_with_lowercase_scope() {
        let change = StorageEvent::set(StorageScope::Session, "token", None, "\"abc\"");
        let json = serde_json::to_string(&change).expect("serialize");
        assert!(json.contains("\"scope\":\"session\""));
        let back: StorageEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, change);
    }
}
