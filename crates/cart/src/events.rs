//! Change notification for views bound to the store.
//!
//! Listeners are plain closures invoked synchronously, in registration
//! order, after each mutation has been persisted. The store never renders
//! anything itself: advisories describe conditions and leave presentation to
//! whoever is listening.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tangogi_core::{CartLine, LineId, ProductId};

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A mutation made through this store.
    Local,
    /// A write by another tab replaced the collection.
    Remote,
}

/// A notification delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// The cart changed; carries the new snapshot.
    CartChanged {
        lines: Vec<CartLine>,
        origin: ChangeOrigin,
    },
    /// The wishlist changed; carries the new snapshot.
    WishlistChanged {
        product_ids: Vec<ProductId>,
        origin: ChangeOrigin,
    },
    /// A non-fatal condition for user-facing messaging.
    Advisory(Advisory),
}

/// How a view should present an advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A non-fatal condition raised while applying an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// A quantity above the ceiling was reduced to the ceiling.
    QuantityClamped {
        line_id: LineId,
        product_id: ProductId,
        requested: u64,
        applied: u32,
    },
    /// An out-of-stock product was not added.
    Unavailable { product_id: ProductId, name: String },
    /// A stored value could not be read and was treated as empty.
    StorageCorrupted { key: String, reason: String },
    /// A change could not be written; it is only held in memory.
    PersistenceFailed { key: String, reason: String },
}

impl Advisory {
    /// Presentation level, matching the site's toast styles.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::QuantityClamped { .. } => Severity::Info,
            Self::Unavailable { .. } | Self::StorageCorrupted { .. } => Severity::Warning,
            Self::PersistenceFailed { .. } => Severity::Error,
        }
    }

    /// User-facing wording for the condition.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::QuantityClamped { applied, .. } => {
                format!("You can add at most {applied} of this item")
            }
            Self::Unavailable { name, .. } => format!("{name} is out of stock"),
            Self::StorageCorrupted { .. } => {
                "Saved items could not be restored and were reset".to_string()
            }
            Self::PersistenceFailed { .. } => {
                "Your changes could not be saved on this device".to_string()
            }
        }
    }
}

type Listener = Rc<dyn Fn(&ChangeEvent)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// The set of listeners attached to one store.
#[derive(Default)]
pub(crate) struct Listeners {
    registry: Rc<RefCell<Registry>>,
}

impl Listeners {
    pub(crate) fn subscribe(&self, listener: impl Fn(&ChangeEvent) + 'static) -> Subscription {
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, Rc::new(listener)));

        Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }

    pub(crate) fn emit(&self, event: &ChangeEvent) {
        // Snapshot first so a listener may unsubscribe while being called.
        let listeners: Vec<Listener> = self
            .registry
            .borrow()
            .entries
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    pub(crate) fn emit_all(&self, advisories: &[Advisory]) {
        for advisory in advisories {
            self.emit(&ChangeEvent::Advisory(advisory.clone()));
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle keeps the listener attached; call
/// [`Subscription::unsubscribe`] to detach it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Subscription {
    /// Detach the listener. Later changes are not delivered to it.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .borrow_mut()
                .entries
                .retain(|(id, _)| *id != self.id);
        }
    }

    /// Whether the listener is still attached to a live store.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.borrow().entries.iter().any(|(id, _)| *id == self.id))
    }
}
