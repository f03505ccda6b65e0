//! The cart/wishlist state store.
//!
//! One [`CartStore`] is the single source of truth for a tab. Every public
//! mutation runs to completion before returning: mutate, persist, notify.
//! Writes made by other tabs arrive through the storage change feed and are
//! applied by [`CartStore::sync_external`] as a last-writer-wins full
//! replace of the affected collection.

use tangogi_core::{
    CartLine, CartTotals, LineId, ProductDescriptor, ProductError, ProductId, WishlistState,
};
use tracing::{debug, info, instrument, warn};

use crate::config::{CART_KEY, StoreConfig, WISHLIST_KEY};
use crate::events::{Advisory, ChangeEvent, ChangeOrigin, Listeners, Subscription};
use crate::persistence::{ExternalChanges, Loaded, Persistence};
use crate::storage::{KeyValueStorage, StorageEvent, WatchError};

/// The value of an operation plus the advisories raised while applying it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Applied<T> {
    pub value: T,
    pub advisories: Vec<Advisory>,
}

impl<T> Applied<T> {
    const fn new(value: T, advisories: Vec<Advisory>) -> Self {
        Self { value, advisories }
    }

    /// Discard the advisories and keep the value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Whether the operation finished without any advisory.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.advisories.is_empty()
    }
}

/// Why an add was refused. The cart is unchanged in every case.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The product is out of stock.
    #[error("{name} is out of stock")]
    Unavailable { product_id: ProductId, name: String },

    /// A quantity of zero was requested.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// The product descriptor failed validation.
    #[error("invalid product: {0}")]
    InvalidProduct(#[from] ProductError),
}

/// Outcome of [`CartStore::set_quantity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantityChange {
    /// The line now has the contained state.
    Updated(CartLine),
    /// The quantity was zero or below; the line was deleted.
    Removed(CartLine),
    /// No line has that id (possibly removed by another tab).
    Missing,
}

/// The two independently persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Cart,
    Wishlist,
}

/// Reconciliation state of one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// This tab's view is current; it was the last writer it knows of.
    #[default]
    Local,
    /// An external write was observed and is being applied.
    Reconciling,
}

/// Authoritative cart and wishlist for one tab.
pub struct CartStore<S> {
    persistence: Persistence<S>,
    config: StoreConfig,
    cart: Vec<CartLine>,
    wishlist: Vec<ProductId>,
    cart_sync: SyncState,
    wishlist_sync: SyncState,
    /// Set while the last save of the collection failed.
    cart_dirty: bool,
    wishlist_dirty: bool,
    cart_changes: ExternalChanges,
    wishlist_changes: ExternalChanges,
    listeners: Listeners,
}

impl<S: KeyValueStorage> CartStore<S> {
    /// Open a store over `storage`, loading whatever is persisted.
    ///
    /// Unreadable stored values are replaced by empty collections and
    /// reported as [`Advisory::StorageCorrupted`] in the returned advisories,
    /// since no listener can be attached yet.
    pub fn open(storage: S, config: StoreConfig) -> Applied<Self> {
        let persistence = Persistence::new(storage, config.storage_prefix.clone());
        let cart_changes = persistence.on_external_change(CART_KEY);
        let wishlist_changes = persistence.on_external_change(WISHLIST_KEY);

        let mut store = Self {
            persistence,
            config,
            cart: Vec::new(),
            wishlist: Vec::new(),
            cart_sync: SyncState::Local,
            wishlist_sync: SyncState::Local,
            cart_dirty: false,
            wishlist_dirty: false,
            cart_changes,
            wishlist_changes,
            listeners: Listeners::default(),
        };

        let mut advisories = Vec::new();
        store.cart = store.load_cart(&mut advisories);
        store.wishlist = store.load_wishlist(&mut advisories);

        info!(
            lines = store.cart.len(),
            wishlist = store.wishlist.len(),
            "cart store opened"
        );
        Applied::new(store, advisories)
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The persistence adapter.
    #[must_use]
    pub const fn persistence(&self) -> &Persistence<S> {
        &self.persistence
    }

    /// Register a listener called after every change.
    pub fn subscribe(&self, listener: impl Fn(&ChangeEvent) + 'static) -> Subscription {
        self.listeners.subscribe(listener)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Add `quantity` units of `product`.
    ///
    /// Adding a product already in the cart increases that line's quantity.
    /// Quantities above the ceiling are clamped.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] if the product is out of stock, invalid, or
    /// `quantity` is zero. An out-of-stock rejection is also published to
    /// listeners as [`Advisory::Unavailable`].
    #[instrument(skip(self, product), fields(product_id = %product.product_id))]
    pub fn add_to_cart(
        &mut self,
        product: &ProductDescriptor,
        quantity: u32,
    ) -> Result<Applied<CartLine>, Rejection> {
        product.validate()?;

        if quantity == 0 {
            return Err(Rejection::InvalidQuantity);
        }

        if !product.in_stock {
            debug!("rejecting out-of-stock product");
            self.listeners
                .emit(&ChangeEvent::Advisory(Advisory::Unavailable {
                    product_id: product.product_id.clone(),
                    name: product.name.clone(),
                }));
            return Err(Rejection::Unavailable {
                product_id: product.product_id.clone(),
                name: product.name.clone(),
            });
        }

        let max = self.config.max_quantity;
        let mut advisories = Vec::new();

        let line = if let Some(line) = self
            .cart
            .iter_mut()
            .find(|line| line.product_id == product.product_id)
        {
            let requested = u64::from(line.quantity) + u64::from(quantity);
            line.quantity = clamp_quantity(requested, max, line, &mut advisories);
            line.clone()
        } else {
            let mut line = CartLine::from_product(product, quantity);
            line.quantity = clamp_quantity(u64::from(quantity), max, &line, &mut advisories);
            self.cart.push(line.clone());
            line
        };

        debug!(line_id = %line.line_id, quantity = line.quantity, "added to cart");
        self.commit_cart(&mut advisories);
        Ok(Applied::new(line, advisories))
    }

    /// Remove a line. Returns whether a line was removed; an unknown id is
    /// a no-op.
    #[instrument(skip(self))]
    pub fn remove_from_cart(&mut self, line_id: LineId) -> Applied<bool> {
        let Some(index) = self.position(line_id) else {
            debug!("line not in cart");
            return Applied::new(false, Vec::new());
        };

        self.cart.remove(index);
        let mut advisories = Vec::new();
        self.commit_cart(&mut advisories);
        Applied::new(true, advisories)
    }

    /// Set a line's quantity.
    ///
    /// Zero or below removes the line; above the ceiling clamps to the
    /// ceiling and reports [`Advisory::QuantityClamped`]. Every call on an
    /// existing line persists and notifies, even if the quantity is
    /// unchanged.
    #[instrument(skip(self))]
    pub fn set_quantity(&mut self, line_id: LineId, new_quantity: i64) -> Applied<QuantityChange> {
        let Some(index) = self.position(line_id) else {
            debug!("line not in cart");
            return Applied::new(QuantityChange::Missing, Vec::new());
        };

        let mut advisories = Vec::new();

        let requested = u64::try_from(new_quantity).unwrap_or(0);
        if requested == 0 {
            let removed = self.cart.remove(index);
            self.commit_cart(&mut advisories);
            return Applied::new(QuantityChange::Removed(removed), advisories);
        }

        let max = self.config.max_quantity;
        let Some(line) = self.cart.get_mut(index) else {
            return Applied::new(QuantityChange::Missing, advisories);
        };
        line.quantity = clamp_quantity(requested, max, line, &mut advisories);
        let line = line.clone();
        self.commit_cart(&mut advisories);
        Applied::new(QuantityChange::Updated(line), advisories)
    }

    /// Remove every line.
    #[instrument(skip(self))]
    pub fn clear_cart(&mut self) -> Applied<()> {
        self.cart.clear();
        let mut advisories = Vec::new();
        self.commit_cart(&mut advisories);
        Applied::new((), advisories)
    }

    /// Copy of the cart lines in insertion order.
    #[must_use]
    pub fn cart_snapshot(&self) -> Vec<CartLine> {
        self.cart.clone()
    }

    /// Copy of one line, if present.
    #[must_use]
    pub fn line(&self, line_id: LineId) -> Option<CartLine> {
        self.cart.iter().find(|line| line.line_id == line_id).cloned()
    }

    /// Copy of the line holding `product_id`, if present.
    #[must_use]
    pub fn line_for_product(&self, product_id: &ProductId) -> Option<CartLine> {
        self.cart
            .iter()
            .find(|line| &line.product_id == product_id)
            .cloned()
    }

    /// Total number of units in the cart.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.cart.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Subtotal, tax, shipping and total for the current cart.
    #[must_use]
    pub fn compute_totals(&self) -> CartTotals {
        CartTotals::compute(
            &self.cart,
            self.config.tax_rate,
            self.config.shipping_fee,
            self.config.currency,
        )
    }

    // =========================================================================
    // Wishlist
    // =========================================================================

    /// Add `product_id` to the wishlist, or remove it if already present.
    #[instrument(skip(self))]
    pub fn toggle_wishlist(&mut self, product_id: &ProductId) -> Applied<WishlistState> {
        let state = if let Some(index) = self.wishlist.iter().position(|id| id == product_id) {
            self.wishlist.remove(index);
            WishlistState::Removed
        } else {
            self.wishlist.push(product_id.clone());
            WishlistState::Added
        };

        debug!(?state, "wishlist toggled");
        let mut advisories = Vec::new();
        self.commit_wishlist(&mut advisories);
        Applied::new(state, advisories)
    }

    /// Remove every wishlist entry.
    #[instrument(skip(self))]
    pub fn clear_wishlist(&mut self) -> Applied<()> {
        self.wishlist.clear();
        let mut advisories = Vec::new();
        self.commit_wishlist(&mut advisories);
        Applied::new((), advisories)
    }

    /// Add one unit of a wishlisted product to the cart and drop it from the
    /// wishlist.
    ///
    /// # Errors
    ///
    /// Returns the same rejections as [`CartStore::add_to_cart`]; the
    /// wishlist is left untouched in that case.
    pub fn move_to_cart(
        &mut self,
        product: &ProductDescriptor,
    ) -> Result<Applied<CartLine>, Rejection> {
        let mut added = self.add_to_cart(product, 1)?;

        if let Some(index) = self
            .wishlist
            .iter()
            .position(|id| id == &product.product_id)
        {
            self.wishlist.remove(index);
            let mut advisories = Vec::new();
            self.commit_wishlist(&mut advisories);
            added.advisories.extend(advisories);
        }
        Ok(added)
    }

    /// Copy of the wishlist in insertion order.
    #[must_use]
    pub fn wishlist_snapshot(&self) -> Vec<ProductId> {
        self.wishlist.clone()
    }

    /// Whether `product_id` is on the wishlist.
    #[must_use]
    pub fn is_wishlisted(&self, product_id: &ProductId) -> bool {
        self.wishlist.contains(product_id)
    }

    // =========================================================================
    // Cross-tab reconciliation
    // =========================================================================

    /// Reconciliation state of a collection.
    #[must_use]
    pub const fn sync_state(&self, collection: Collection) -> SyncState {
        match collection {
            Collection::Cart => self.cart_sync,
            Collection::Wishlist => self.wishlist_sync,
        }
    }

    /// Whether the collection holds a change that could not be saved.
    #[must_use]
    pub const fn has_unsaved_changes(&self, collection: Collection) -> bool {
        match collection {
            Collection::Cart => self.cart_dirty,
            Collection::Wishlist => self.wishlist_dirty,
        }
    }

    /// Apply every pending external write, in the order observed.
    ///
    /// Returns the number of changes applied. A collection whose feed
    /// overflowed is re-read from storage instead of replaying its queue.
    pub fn sync_external(&mut self) -> usize {
        self.drain_feed(Collection::Cart) + self.drain_feed(Collection::Wishlist)
    }

    /// Replace the affected collection with an externally written value.
    ///
    /// Returns `false` if `event` concerns neither collection. An unreadable
    /// value or a removed key leaves the collection empty.
    #[instrument(skip(self, event), fields(key = %event.key))]
    pub fn apply_external_change(&mut self, event: &StorageEvent) -> bool {
        let mut advisories = Vec::new();

        if event.key == self.persistence.storage_key(CART_KEY) {
            self.cart_sync = SyncState::Reconciling;
            let loaded = Loaded::decode(event.new_value.as_deref());
            self.cart = self.accept_cart(loaded, &event.key, &mut advisories);
            self.cart_dirty = false;
            info!(lines = self.cart.len(), "cart replaced by external write");

            self.listeners.emit(&ChangeEvent::CartChanged {
                lines: self.cart.clone(),
                origin: ChangeOrigin::Remote,
            });
            self.cart_sync = SyncState::Local;
        } else if event.key == self.persistence.storage_key(WISHLIST_KEY) {
            self.wishlist_sync = SyncState::Reconciling;
            let loaded = Loaded::decode(event.new_value.as_deref());
            self.wishlist = accept_wishlist(loaded, &event.key, &mut advisories);
            self.wishlist_dirty = false;
            info!(
                entries = self.wishlist.len(),
                "wishlist replaced by external write"
            );

            self.listeners.emit(&ChangeEvent::WishlistChanged {
                product_ids: self.wishlist.clone(),
                origin: ChangeOrigin::Remote,
            });
            self.wishlist_sync = SyncState::Local;
        } else {
            return false;
        }

        self.listeners.emit_all(&advisories);
        true
    }

    /// Re-read both collections from storage and notify listeners.
    pub fn reload(&mut self) -> Applied<()> {
        let mut advisories = Vec::new();
        self.cart = self.load_cart(&mut advisories);
        self.wishlist = self.load_wishlist(&mut advisories);
        self.cart_dirty = false;
        self.wishlist_dirty = false;

        self.listeners.emit(&ChangeEvent::CartChanged {
            lines: self.cart.clone(),
            origin: ChangeOrigin::Remote,
        });
        self.listeners.emit(&ChangeEvent::WishlistChanged {
            product_ids: self.wishlist.clone(),
            origin: ChangeOrigin::Remote,
        });
        self.listeners.emit_all(&advisories);
        Applied::new((), advisories)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn drain_feed(&mut self, collection: Collection) -> usize {
        let mut applied = 0;
        loop {
            let next = match collection {
                Collection::Cart => self.cart_changes.try_next(),
                Collection::Wishlist => self.wishlist_changes.try_next(),
            };
            match next {
                Ok(Some(event)) => applied += usize::from(self.apply_external_change(&event)),
                Ok(None) => return applied,
                Err(WatchError::Lagged(missed)) => {
                    warn!(?collection, missed, "change feed overflowed, re-reading from storage");
                    self.discard_pending(collection);
                    return applied + usize::from(self.resync(collection));
                }
            }
        }
    }

    /// Drop queued events; storage already holds a newer value.
    fn discard_pending(&mut self, collection: Collection) {
        let feed = match collection {
            Collection::Cart => &mut self.cart_changes,
            Collection::Wishlist => &mut self.wishlist_changes,
        };
        while !matches!(feed.try_next(), Ok(None)) {}
    }

    /// Re-read one collection after its feed overflowed.
    ///
    /// A collection with an unsaved change keeps its in-memory state.
    /// Listeners hear about the re-read only if storage differs from memory.
    fn resync(&mut self, collection: Collection) -> bool {
        let mut advisories = Vec::new();

        match collection {
            Collection::Cart => {
                if self.cart_dirty {
                    warn!("cart has unsaved changes, keeping local state");
                    return false;
                }
                let lines = self.load_cart(&mut advisories);
                if lines == self.cart && advisories.is_empty() {
                    return false;
                }
                self.cart_sync = SyncState::Reconciling;
                self.cart = lines;
                info!(lines = self.cart.len(), "cart re-read from storage");
                self.listeners.emit(&ChangeEvent::CartChanged {
                    lines: self.cart.clone(),
                    origin: ChangeOrigin::Remote,
                });
                self.cart_sync = SyncState::Local;
            }
            Collection::Wishlist => {
                if self.wishlist_dirty {
                    warn!("wishlist has unsaved changes, keeping local state");
                    return false;
                }
                let ids = self.load_wishlist(&mut advisories);
                if ids == self.wishlist && advisories.is_empty() {
                    return false;
                }
                self.wishlist_sync = SyncState::Reconciling;
                self.wishlist = ids;
                info!(entries = self.wishlist.len(), "wishlist re-read from storage");
                self.listeners.emit(&ChangeEvent::WishlistChanged {
                    product_ids: self.wishlist.clone(),
                    origin: ChangeOrigin::Remote,
                });
                self.wishlist_sync = SyncState::Local;
            }
        }

        self.listeners.emit_all(&advisories);
        true
    }

    fn position(&self, line_id: LineId) -> Option<usize> {
        self.cart.iter().position(|line| line.line_id == line_id)
    }

    fn load_cart(&self, advisories: &mut Vec<Advisory>) -> Vec<CartLine> {
        let key = self.persistence.storage_key(CART_KEY);
        let loaded = self.persistence.load_checked(CART_KEY);
        self.accept_cart(loaded, &key, advisories)
    }

    fn load_wishlist(&self, advisories: &mut Vec<Advisory>) -> Vec<ProductId> {
        let key = self.persistence.storage_key(WISHLIST_KEY);
        let loaded = self.persistence.load_checked(WISHLIST_KEY);
        accept_wishlist(loaded, &key, advisories)
    }

    fn accept_cart(
        &self,
        loaded: Loaded<Vec<CartLine>>,
        key: &str,
        advisories: &mut Vec<Advisory>,
    ) -> Vec<CartLine> {
        match loaded {
            Loaded::Present(lines) => normalize_cart(lines, self.config.max_quantity),
            Loaded::Missing => Vec::new(),
            Loaded::Corrupted { reason } => {
                advisories.push(Advisory::StorageCorrupted {
                    key: key.to_owned(),
                    reason,
                });
                Vec::new()
            }
        }
    }

    fn commit_cart(&mut self, advisories: &mut Vec<Advisory>) {
        let saved = self.persistence.save(CART_KEY, &self.cart);
        self.cart_dirty = saved.is_err();
        if let Err(e) = saved {
            warn!(error = %e, "cart kept in memory only");
            advisories.push(Advisory::PersistenceFailed {
                key: self.persistence.storage_key(CART_KEY),
                reason: e.to_string(),
            });
        }

        self.listeners.emit(&ChangeEvent::CartChanged {
            lines: self.cart.clone(),
            origin: ChangeOrigin::Local,
        });
        self.listeners.emit_all(advisories);
    }

    fn commit_wishlist(&mut self, advisories: &mut Vec<Advisory>) {
        let saved = self.persistence.save(WISHLIST_KEY, &self.wishlist);
        self.wishlist_dirty = saved.is_err();
        if let Err(e) = saved {
            warn!(error = %e, "wishlist kept in memory only");
            advisories.push(Advisory::PersistenceFailed {
                key: self.persistence.storage_key(WISHLIST_KEY),
                reason: e.to_string(),
            });
        }

        self.listeners.emit(&ChangeEvent::WishlistChanged {
            product_ids: self.wishlist.clone(),
            origin: ChangeOrigin::Local,
        });
        self.listeners.emit_all(advisories);
    }
}

/// Clamp `requested` to `max`, recording an advisory when it was reduced.
fn clamp_quantity(
    requested: u64,
    max: u32,
    line: &CartLine,
    advisories: &mut Vec<Advisory>,
) -> u32 {
    if requested > u64::from(max) {
        advisories.push(Advisory::QuantityClamped {
            line_id: line.line_id,
            product_id: line.product_id.clone(),
            requested,
            applied: max,
        });
        return max;
    }
    u32::try_from(requested).unwrap_or(max)
}

/// Merge lines sharing a product into the first of them, clamp to `max`,
/// and drop empty lines.
fn normalize_cart(lines: Vec<CartLine>, max: u32) -> Vec<CartLine> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());

    for line in lines {
        if line.quantity == 0 {
            continue;
        }
        if let Some(existing) = merged
            .iter_mut()
            .find(|existing| existing.product_id == line.product_id)
        {
            existing.quantity = existing.quantity.saturating_add(line.quantity);
        } else {
            merged.push(line);
        }
    }

    for line in &mut merged {
        line.quantity = line.quantity.min(max);
    }
    merged
}

fn accept_wishlist(
    loaded: Loaded<Vec<ProductId>>,
    key: &str,
    advisories: &mut Vec<Advisory>,
) -> Vec<ProductId> {
    match loaded {
        Loaded::Present(ids) => {
            let mut unique: Vec<ProductId> = Vec::with_capacity(ids.len());
            for id in ids {
                if !unique.contains(&id) {
                    unique.push(id);
                }
            }
            unique
        }
        Loaded::Missing => Vec::new(),
        Loaded::Corrupted { reason } => {
            advisories.push(Advisory::StorageCorrupted {
                key: key.to_owned(),
                reason,
            });
            Vec::new()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rust_decimal::Decimal;

    use super::*;
    use crate::storage::{MemoryStorage, WATCH_CAPACITY};

    fn product(id: &str, price: i64) -> ProductDescriptor {
        ProductDescriptor {
            product_id: ProductId::parse(id).unwrap(),
            unit_price: Decimal::from(price),
            name: format!("Product {id}"),
            image_ref: format!("images/products/{id}.jpg"),
            unit: "kg".to_string(),
            in_stock: true,
        }
    }

    fn open(storage: MemoryStorage) -> CartStore<MemoryStorage> {
        let opened = CartStore::open(storage, StoreConfig::default());
        assert!(opened.is_clean());
        opened.into_value()
    }

    fn record(store: &CartStore<MemoryStorage>) -> Rc<RefCell<Vec<ChangeEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let _subscription = store.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        events
    }

    #[test]
    fn test_re_add_increments_single_line() {
        let mut store = open(MemoryStorage::new());
        let tomatoes = product("prod-001", 1200);

        let first = store.add_to_cart(&tomatoes, 1).unwrap().into_value();
        let second = store.add_to_cart(&tomatoes, 1).unwrap().into_value();

        assert_eq!(first.line_id, second.line_id);
        let snapshot = store.cart_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].quantity, 2);
    }

    #[test]
    fn test_add_captures_display_fields() {
        let mut store = open(MemoryStorage::new());
        let line = store
            .add_to_cart(&product("prod-003", 800), 3)
            .unwrap()
            .into_value();

        assert_eq!(line.name, "Product prod-003");
        assert_eq!(line.image_ref, "images/products/prod-003.jpg");
        assert_eq!(line.unit, "kg");
        assert_eq!(line.unit_price, Decimal::from(800));
        assert_eq!(line.quantity, 3);
    }

    #[test]
    fn test_add_zero_quantity_rejected() {
        let mut store = open(MemoryStorage::new());
        assert_eq!(
            store.add_to_cart(&product("prod-001", 1200), 0),
            Err(Rejection::InvalidQuantity)
        );
        assert!(store.cart_snapshot().is_empty());
    }

    #[test]
    fn test_add_invalid_product_rejected() {
        let mut store = open(MemoryStorage::new());
        let mut bad = product("prod-001", 1200);
        bad.name = String::new();

        assert!(matches!(
            store.add_to_cart(&bad, 1),
            Err(Rejection::InvalidProduct(ProductError::EmptyName(_)))
        ));
    }

    #[test]
    fn test_out_of_stock_rejected_and_advised() {
        let mut store = open(MemoryStorage::new());
        let events = record(&store);
        let mut chicken = product("prod-004", 2500);
        chicken.in_stock = false;

        let result = store.add_to_cart(&chicken, 1);

        assert!(matches!(result, Err(Rejection::Unavailable { .. })));
        assert!(store.cart_snapshot().is_empty());
        assert!(matches!(
            events.borrow().as_slice(),
            [ChangeEvent::Advisory(Advisory::Unavailable { .. })]
        ));
    }

    #[test]
    fn test_add_beyond_ceiling_clamps() {
        let mut store = open(MemoryStorage::new());
        let rice = product("prod-002", 4500);
        let _ = store.add_to_cart(&rice, 90).unwrap();

        let applied = store.add_to_cart(&rice, 20).unwrap();

        assert_eq!(applied.value.quantity, 99);
        assert!(matches!(
            applied.advisories.as_slice(),
            [Advisory::QuantityClamped { requested: 110, applied: 99, .. }]
        ));
    }

    #[test]
    fn test_set_quantity_clamps_to_ceiling() {
        let mut store = open(MemoryStorage::new());
        let line = store
            .add_to_cart(&product("prod-001", 1200), 1)
            .unwrap()
            .into_value();

        let applied = store.set_quantity(line.line_id, 150);

        assert!(matches!(&applied.value, QuantityChange::Updated(l) if l.quantity == 99));
        assert!(matches!(
            applied.advisories.as_slice(),
            [Advisory::QuantityClamped { requested: 150, applied: 99, .. }]
        ));
        assert_eq!(store.line(line.line_id).unwrap().quantity, 99);
    }

    #[test]
    fn test_set_quantity_non_positive_removes() {
        for quantity in [0, -1, i64::MIN] {
            let mut store = open(MemoryStorage::new());
            let line = store
                .add_to_cart(&product("prod-001", 1200), 2)
                .unwrap()
                .into_value();

            let applied = store.set_quantity(line.line_id, quantity);

            assert!(matches!(applied.value, QuantityChange::Removed(_)));
            assert!(store.cart_snapshot().is_empty());
        }
    }

    #[test]
    fn test_quantities_stay_positive_over_any_sequence() {
        let mut store = open(MemoryStorage::new());
        let line = store
            .add_to_cart(&product("prod-001", 1200), 5)
            .unwrap()
            .into_value();

        for quantity in [3, 200, 1, -4, 7, 0, 12] {
            let _ = store.set_quantity(line.line_id, quantity);
            assert!(store.cart_snapshot().iter().all(|line| line.quantity >= 1));
        }
        assert!(store.cart_snapshot().is_empty());
    }

    #[test]
    fn test_missing_line_is_noop() {
        let mut store = open(MemoryStorage::new());
        let events = record(&store);

        assert!(!store.remove_from_cart(LineId::generate()).value);
        assert_eq!(
            store.set_quantity(LineId::generate(), 4).value,
            QuantityChange::Missing
        );
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_mutations_persist_and_notify() {
        let storage = MemoryStorage::new();
        let mut store = open(storage.clone());
        let events = record(&store);

        let line = store
            .add_to_cart(&product("prod-001", 1200), 1)
            .unwrap()
            .into_value();
        let _ = store.toggle_wishlist(&ProductId::parse("prod-009").unwrap());
        let _ = store.remove_from_cart(line.line_id);

        let events = events.borrow();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            ChangeEvent::CartChanged { lines, origin: ChangeOrigin::Local } if lines.len() == 1
        ));
        assert!(matches!(
            &events[1],
            ChangeEvent::WishlistChanged { product_ids, .. } if product_ids.len() == 1
        ));
        assert!(matches!(
            &events[2],
            ChangeEvent::CartChanged { lines, .. } if lines.is_empty()
        ));

        assert_eq!(storage.get("tangogi-cart").unwrap().as_deref(), Some("[]"));
        assert_eq!(
            storage.get("tangogi-wishlist").unwrap().as_deref(),
            Some(r#"["prod-009"]"#)
        );
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut store = open(MemoryStorage::new());
        let _ = store.add_to_cart(&product("prod-001", 1200), 1).unwrap();

        let mut snapshot = store.cart_snapshot();
        snapshot[0].quantity = 42;
        snapshot.clear();

        assert_eq!(store.cart_snapshot()[0].quantity, 1);
    }

    #[test]
    fn test_totals() {
        let mut store = open(MemoryStorage::new());
        let _ = store.add_to_cart(&product("tomatoes", 1200), 2).unwrap();
        let _ = store.add_to_cart(&product("bananas", 800), 1).unwrap();

        let totals = store.compute_totals();
        assert_eq!(totals.subtotal, Decimal::from(3200));
        assert_eq!(totals.tax, Decimal::from(160));
        assert_eq!(totals.total, Decimal::from(3860));
        assert_eq!(store.item_count(), 3);
    }

    #[test]
    fn test_clear_cart() {
        let mut store = open(MemoryStorage::new());
        let _ = store.add_to_cart(&product("prod-001", 1200), 1).unwrap();
        let _ = store.add_to_cart(&product("prod-002", 4500), 1).unwrap();

        let _ = store.clear_cart();
        assert!(store.cart_snapshot().is_empty());
        assert_eq!(store.compute_totals().total, Decimal::ZERO);
    }

    #[test]
    fn test_wishlist_toggle_symmetry() {
        let mut store = open(MemoryStorage::new());
        let id = ProductId::parse("prod-005").unwrap();

        assert_eq!(store.toggle_wishlist(&id).value, WishlistState::Added);
        assert!(store.is_wishlisted(&id));
        assert_eq!(store.toggle_wishlist(&id).value, WishlistState::Removed);
        assert!(!store.is_wishlisted(&id));
        assert!(store.wishlist_snapshot().is_empty());
    }

    #[test]
    fn test_move_to_cart() {
        let mut store = open(MemoryStorage::new());
        let carrots = product("prod-005", 600);
        let _ = store.toggle_wishlist(&carrots.product_id);

        let line = store.move_to_cart(&carrots).unwrap().into_value();

        assert_eq!(line.quantity, 1);
        assert!(!store.is_wishlisted(&carrots.product_id));
    }

    #[test]
    fn test_move_to_cart_out_of_stock_keeps_wishlist() {
        let mut store = open(MemoryStorage::new());
        let mut turkey = product("prod-010", 3800);
        turkey.in_stock = false;
        let _ = store.toggle_wishlist(&turkey.product_id);

        assert!(store.move_to_cart(&turkey).is_err());
        assert!(store.is_wishlisted(&turkey.product_id));
    }

    #[test]
    fn test_open_restores_persisted_state() {
        let storage = MemoryStorage::new();
        {
            let mut store = open(storage.clone());
            let _ = store.add_to_cart(&product("prod-001", 1200), 2).unwrap();
            let _ = store.toggle_wishlist(&ProductId::parse("prod-003").unwrap());
        }

        let store = open(storage);
        assert_eq!(store.item_count(), 2);
        assert_eq!(store.wishlist_snapshot().len(), 1);
    }

    #[test]
    fn test_open_with_corrupted_storage() {
        let storage = MemoryStorage::new();
        storage.set("tangogi-cart", "{{{").unwrap();
        storage.set("tangogi-wishlist", "42").unwrap();

        let opened = CartStore::open(storage.clone(), StoreConfig::default());
        assert_eq!(opened.advisories.len(), 2);
        assert!(
            opened
                .advisories
                .iter()
                .all(|a| matches!(a, Advisory::StorageCorrupted { .. }))
        );

        let mut store = opened.into_value();
        assert!(store.cart_snapshot().is_empty());
        assert!(store.wishlist_snapshot().is_empty());

        // The bad entry is overwritten on the next save.
        let _ = store.add_to_cart(&product("prod-001", 1200), 1).unwrap();
        assert!(storage.get("tangogi-cart").unwrap().unwrap().starts_with('['));
    }

    #[test]
    fn test_load_merges_duplicate_products() {
        let storage = MemoryStorage::new();
        let a = CartLine::from_product(&product("prod-001", 1200), 60);
        let b = CartLine::from_product(&product("prod-001", 1200), 50);
        let c = CartLine::from_product(&product("prod-002", 4500), 1);
        let mut empty = CartLine::from_product(&product("prod-003", 800), 1);
        empty.quantity = 0;
        storage
            .set(
                "tangogi-cart",
                &serde_json::to_string(&vec![a.clone(), b, c, empty]).unwrap(),
            )
            .unwrap();
        storage
            .set("tangogi-wishlist", r#"["x","y","x"]"#)
            .unwrap();

        let store = open(storage);
        let lines = store.cart_snapshot();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line_id, a.line_id);
        assert_eq!(lines[0].quantity, 99);
        assert_eq!(store.wishlist_snapshot().len(), 2);
    }

    #[test]
    fn test_persistence_failure_keeps_memory_state() {
        let mut store = open(MemoryStorage::with_quota(16));
        let events = record(&store);

        let applied = store.add_to_cart(&product("prod-001", 1200), 1).unwrap();

        assert!(matches!(
            applied.advisories.as_slice(),
            [Advisory::PersistenceFailed { .. }]
        ));
        assert_eq!(store.cart_snapshot().len(), 1);
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn test_set_same_quantity_persists_and_notifies() {
        let storage = MemoryStorage::new();
        let mut store = open(storage.clone());
        let line = store
            .add_to_cart(&product("prod-001", 1200), 2)
            .unwrap()
            .into_value();
        let events = record(&store);

        let applied = store.set_quantity(line.line_id, 2);

        assert!(applied.is_clean());
        assert!(matches!(applied.value, QuantityChange::Updated(ref l) if l.quantity == 2));
        assert!(matches!(
            events.borrow().as_slice(),
            [ChangeEvent::CartChanged {
                origin: ChangeOrigin::Local,
                ..
            }]
        ));
        let stored: Vec<CartLine> = store.persistence().load(CART_KEY).unwrap();
        assert_eq!(stored, store.cart_snapshot());
    }

    #[test]
    fn test_successful_save_clears_unsaved_flag() {
        let mut store = open(MemoryStorage::with_quota(120));

        let applied = store.add_to_cart(&product("prod-001", 1200), 1).unwrap();
        assert!(!applied.is_clean());
        assert!(store.has_unsaved_changes(Collection::Cart));
        assert!(!store.has_unsaved_changes(Collection::Wishlist));

        assert!(store.clear_cart().is_clean());
        assert!(!store.has_unsaved_changes(Collection::Cart));
    }

    #[test]
    fn test_own_mutations_never_replay_as_remote() {
        let storage = MemoryStorage::new();
        let mut store = open(storage.clone());
        let _other_tab = open(storage.open_tab());
        let id = ProductId::parse("prod-001").unwrap();

        for _ in 0..(WATCH_CAPACITY + 44) {
            let _ = store.toggle_wishlist(&id);
        }
        let events = record(&store);

        assert_eq!(store.sync_external(), 0);
        assert!(events.borrow().is_empty());
        assert!(store.wishlist_snapshot().is_empty());
    }

    #[test]
    fn test_overflowed_feed_rereads_from_storage() {
        let storage = MemoryStorage::new();
        let mut tab_a = open(storage.clone());
        let mut tab_b = open(storage.open_tab());
        let events = record(&tab_a);

        let line = tab_b
            .add_to_cart(&product("prod-001", 1200), 1)
            .unwrap()
            .into_value();
        for i in 0..(WATCH_CAPACITY + 44) {
            let quantity = i64::try_from(i % 50).unwrap() + 1;
            let _ = tab_b.set_quantity(line.line_id, quantity);
        }

        assert_eq!(tab_a.sync_external(), 1);

        let stored: Vec<CartLine> = tab_a.persistence().load(CART_KEY).unwrap();
        assert_eq!(tab_a.cart_snapshot(), stored);
        assert_eq!(tab_a.cart_snapshot(), tab_b.cart_snapshot());
        assert_eq!(
            *events.borrow(),
            vec![ChangeEvent::CartChanged {
                lines: stored,
                origin: ChangeOrigin::Remote,
            }]
        );
        assert_eq!(tab_a.sync_state(Collection::Cart), SyncState::Local);
        assert_eq!(tab_a.sync_external(), 0);
    }

    #[test]
    fn test_overflow_keeps_unsaved_collection() {
        let storage = MemoryStorage::with_quota(120);
        let mut tab_a = open(storage.clone());
        let mut tab_b = open(storage.open_tab());

        let applied = tab_a.add_to_cart(&product("prod-001", 1200), 1).unwrap();
        assert!(matches!(
            applied.advisories.as_slice(),
            [Advisory::PersistenceFailed { .. }]
        ));
        let events = record(&tab_a);

        // An odd number of toggles leaves the product on the wishlist.
        let id = ProductId::parse("prod-002").unwrap();
        for _ in 0..=WATCH_CAPACITY {
            let _ = tab_b.toggle_wishlist(&id);
        }

        assert_eq!(tab_a.sync_external(), 1);

        assert_eq!(tab_a.cart_snapshot().len(), 1);
        assert!(tab_a.has_unsaved_changes(Collection::Cart));
        assert_eq!(tab_a.wishlist_snapshot(), vec![id.clone()]);
        assert_eq!(
            *events.borrow(),
            vec![ChangeEvent::WishlistChanged {
                product_ids: vec![id],
                origin: ChangeOrigin::Remote,
            }]
        );
    }

    #[test]
    fn test_external_replace_fires_once() {
        let storage = MemoryStorage::new();
        let mut store = open(storage.clone());
        let _ = store.add_to_cart(&product("prod-001", 1200), 1).unwrap();
        let events = record(&store);

        storage.inject_raw("tangogi-cart", Some("[]"));
        assert_eq!(store.sync_external(), 1);

        assert!(store.cart_snapshot().is_empty());
        assert_eq!(
            *events.borrow(),
            vec![ChangeEvent::CartChanged {
                lines: Vec::new(),
                origin: ChangeOrigin::Remote,
            }]
        );
        assert_eq!(store.sync_state(Collection::Cart), SyncState::Local);
        assert_eq!(store.sync_external(), 0);
    }

    #[test]
    fn test_external_corrupt_value_empties_collection() {
        let storage = MemoryStorage::new();
        let mut store = open(storage.clone());
        let _ = store.toggle_wishlist(&ProductId::parse("prod-001").unwrap());
        let events = record(&store);

        storage.inject_raw("tangogi-wishlist", Some("not json"));
        store.sync_external();

        assert!(store.wishlist_snapshot().is_empty());
        let events = events.borrow();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            ChangeEvent::Advisory(Advisory::StorageCorrupted { .. })
        ));
    }

    #[test]
    fn test_external_removal_empties_collection() {
        let storage = MemoryStorage::new();
        let mut store = open(storage.clone());
        let _ = store.add_to_cart(&product("prod-001", 1200), 1).unwrap();

        storage.inject_raw("tangogi-cart", None);
        store.sync_external();

        assert!(store.cart_snapshot().is_empty());
    }

    #[test]
    fn test_unrelated_external_key_ignored() {
        let storage = MemoryStorage::new();
        let mut store = open(storage.clone());

        storage.inject_raw("darkMode", Some("true"));
        assert_eq!(store.sync_external(), 0);
        assert!(!store.apply_external_change(&StorageEvent {
            key: "darkMode".to_string(),
            new_value: None,
        }));
    }
}
