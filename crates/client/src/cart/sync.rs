//! Optimistic cart synchronization.
//!
//! [`CartSyncEngine`] applies quantity edits to the local cart immediately and
//! reconciles them with the backend once the line has been quiet for the
//! debounce window.
//!
//! # Line lifecycle
//!
//! ```text
//! Synced --edit--> PendingLocal --quiet--> Syncing --ok--> Synced
//!                                            |
//!                                            +--fail--> Error --refetch--> Synced
//! ```
//!
//! Each line has its own timer and at most one update in flight. Edits that
//! arrive while an update is in flight re-arm the timer; when the update
//! settles, the newest local quantity is sent next. A response for a quantity
//! that has since been edited never overwrites the newer local value.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mely_core::{LineId, Quantity};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::backend::CartBackend;
use super::count::CartCountBroadcaster;
use super::model::{Cart, CartError, CartLine, LineReconciliation, LineState};
use crate::error::ApiError;
use crate::notify::{Confirmer, NoticeKind, Notifier};

/// Errors returned by the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cart has no line {0}")]
    UnknownLine(LineId),

    #[error("checkout is blocked while {pending} line(s) await confirmation")]
    CheckoutBlocked { pending: usize },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl From<CartError> for SyncError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::UnknownLine(id) => Self::UnknownLine(id),
        }
    }
}

/// Read-only copy of the cart as currently displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSnapshot {
    pub lines: Vec<CartLine>,
    pub total: Decimal,
    pub pending: Vec<LineId>,
    pub local_item_count: u32,
}

impl CartSnapshot {
    fn of(cart: &Cart) -> Self {
        Self {
            lines: cart.lines().to_vec(),
            total: cart.total(),
            pending: cart.pending_ids(),
            local_item_count: cart.local_item_count(),
        }
    }

    /// Whether the purchase can be finalized from this state.
    #[must_use]
    pub fn can_finalize(&self) -> bool {
        self.pending.is_empty()
    }
}

struct ArmedTimer {
    seq: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    quantity: Quantity,
    /// Value of `LineSync::edits` when the update was sent.
    edits: u64,
}

#[derive(Default)]
struct LineSync {
    timer: Option<ArmedTimer>,
    in_flight: Option<InFlight>,
    /// Count of local edits applied to the line.
    edits: u64,
    /// Last values the server agreed to.
    confirmed: Option<LineReconciliation>,
}

#[derive(Default)]
struct SyncState {
    cart: Cart,
    lines: HashMap<LineId, LineSync>,
    next_seq: u64,
}

struct EngineInner {
    backend: Arc<dyn CartBackend>,
    counts: CartCountBroadcaster,
    notifier: Arc<dyn Notifier>,
    confirmer: Arc<dyn Confirmer>,
    debounce: Duration,
    state: Mutex<SyncState>,
    checkout: watch::Sender<bool>,
}

/// Local-first cart with debounced, per-line reconciliation.
///
/// Cheap to clone; clones drive the same cart.
#[derive(Clone)]
pub struct CartSyncEngine {
    inner: Arc<EngineInner>,
}

impl CartSyncEngine {
    /// Create an engine with an empty cart. Call [`load`](Self::load) next.
    #[must_use]
    pub fn new(
        backend: Arc<dyn CartBackend>,
        counts: CartCountBroadcaster,
        notifier: Arc<dyn Notifier>,
        confirmer: Arc<dyn Confirmer>,
        debounce: Duration,
    ) -> Self {
        let (checkout, _) = watch::channel(true);
        Self {
            inner: Arc::new(EngineInner {
                backend,
                counts,
                notifier,
                confirmer,
                debounce,
                state: Mutex::new(SyncState::default()),
                checkout,
            }),
        }
    }

    /// Fetch the cart from the backend, replacing local state.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Api` if the cart cannot be fetched.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<CartSnapshot, SyncError> {
        self.refetch().await?;
        Ok(self.snapshot().await)
    }

    /// Current cart as displayed.
    pub async fn snapshot(&self) -> CartSnapshot {
        CartSnapshot::of(&self.inner.state.lock().await.cart)
    }

    /// Whether finalizing the purchase is currently allowed.
    #[must_use]
    pub fn can_finalize(&self) -> bool {
        *self.inner.checkout.borrow()
    }

    /// Observe the checkout gate: `true` while no line awaits confirmation.
    #[must_use]
    pub fn subscribe_checkout(&self) -> watch::Receiver<bool> {
        self.inner.checkout.subscribe()
    }

    /// Apply a quantity edit locally and schedule its reconciliation.
    ///
    /// Returns `Ok(false)` when the quantity is outside `1..=10`, in which
    /// case nothing changes.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::UnknownLine` if the cart has no such line.
    #[instrument(skip(self))]
    pub async fn on_quantity_edit(&self, line: LineId, quantity: i64) -> Result<bool, SyncError> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        if !state.cart.apply_local_quantity(line, quantity)? {
            debug!("Quantity outside editable range, ignoring");
            return Ok(false);
        }
        state.lines.entry(line).or_default().edits += 1;
        self.arm(state, line);
        self.publish_gate(&state.cart);
        Ok(true)
    }

    /// Shift a line's quantity by `delta`, as the +/- buttons do.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::UnknownLine` if the cart has no such line.
    pub async fn step(&self, line: LineId, delta: i64) -> Result<bool, SyncError> {
        let current = {
            let state = self.inner.state.lock().await;
            state
                .cart
                .line(line)
                .ok_or(SyncError::UnknownLine(line))?
                .quantity()
        };
        self.on_quantity_edit(line, i64::from(current.get()) + delta)
            .await
    }

    /// Remove a line after the user confirms.
    ///
    /// The line disappears locally only once the backend confirmed the
    /// deletion. Returns `Ok(false)` if the user declined.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::UnknownLine` if the cart has no such line, or
    /// `SyncError::Api` if the deletion failed (the cart is refetched).
    #[instrument(skip(self))]
    pub async fn remove_line(&self, line: LineId) -> Result<bool, SyncError> {
        let product = {
            let state = self.inner.state.lock().await;
            state
                .cart
                .line(line)
                .ok_or(SyncError::UnknownLine(line))?
                .product
                .name
                .clone()
        };

        let detail = format!("Remove {product} from your cart?");
        if !self.inner.confirmer.confirm("Remove item", &detail).await {
            debug!("Removal declined");
            return Ok(false);
        }

        if let Err(e) = self.inner.backend.delete_line(line).await {
            warn!(error = %e, "Line deletion failed");
            self.inner
                .notifier
                .notify(NoticeKind::Error, &e.user_message());
            self.resync().await;
            return Err(e.into());
        }

        {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            if let Some(timer) = state.lines.remove(&line).and_then(|entry| entry.timer) {
                timer.handle.abort();
            }
            if state.cart.remove_line(line).is_err() {
                debug!("Line already gone after refetch");
            }
            self.publish_gate(&state.cart);
        }

        info!("Line removed");
        self.inner
            .notifier
            .notify(NoticeKind::Success, "Item removed from cart");
        self.refresh_count().await;
        Ok(true)
    }

    /// Gate check before moving on to checkout.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::CheckoutBlocked` while any line awaits confirmation.
    pub async fn finalize_purchase(&self) -> Result<CartSnapshot, SyncError> {
        let snapshot = self.snapshot().await;
        if !snapshot.can_finalize() {
            return Err(SyncError::CheckoutBlocked {
                pending: snapshot.pending.len(),
            });
        }
        Ok(snapshot)
    }

    // =========================================================================
    // Timers and reconciliation
    // =========================================================================

    fn arm(&self, state: &mut SyncState, line: LineId) {
        state.next_seq += 1;
        let seq = state.next_seq;

        let engine = self.clone();
        let debounce = self.inner.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            engine.fire(line, seq).await;
        });

        let entry = state.lines.entry(line).or_default();
        if let Some(previous) = entry.timer.replace(ArmedTimer { seq, handle }) {
            previous.handle.abort();
        }
    }

    async fn fire(&self, line: LineId, seq: u64) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let Some(entry) = state.lines.get_mut(&line) else {
            return;
        };
        if entry.timer.as_ref().map(|timer| timer.seq) != Some(seq) {
            return;
        }
        // Taken out so that nothing aborts this task once it is sending.
        entry.timer = None;

        if entry.in_flight.is_some() {
            debug!(%line, "Update in flight, newest quantity follows when it settles");
            return;
        }
        let Some(current) = state.cart.line(line) else {
            return;
        };
        let quantity = current.quantity();
        let unit_price = current.unit_price();

        if let Some(confirmed) = entry
            .confirmed
            .as_ref()
            .filter(|confirmed| confirmed.quantity == quantity)
            .cloned()
        {
            debug!(%line, "Quantity unchanged since last confirmation");
            reconcile(&mut state.cart, line, &confirmed);
            self.publish_gate(&state.cart);
            return;
        }

        let sent = InFlight {
            quantity,
            edits: entry.edits,
        };
        entry.in_flight = Some(sent);
        set_state(&mut state.cart, line, LineState::Syncing);
        self.publish_gate(&state.cart);
        drop(guard);

        self.push(line, sent, unit_price).await;
    }

    #[instrument(skip(self, unit_price), fields(quantity = %sent.quantity))]
    async fn push(&self, line: LineId, mut sent: InFlight, mut unit_price: Decimal) {
        loop {
            let result = self
                .inner
                .backend
                .update_quantity(line, sent.quantity, unit_price)
                .await;

            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;

            let Some(entry) = state.lines.get_mut(&line) else {
                // Removed while the update was in flight.
                drop(guard);
                if result.is_ok() {
                    self.refresh_count().await;
                }
                return;
            };
            entry.in_flight = None;

            let reconciliation = match result {
                Ok(reconciliation) => reconciliation,
                Err(e) => {
                    warn!(error = %e, "Quantity update failed");
                    set_state(&mut state.cart, line, LineState::Error);
                    self.publish_gate(&state.cart);
                    drop(guard);

                    self.inner
                        .notifier
                        .notify(NoticeKind::Error, &e.user_message());
                    self.resync().await;
                    return;
                }
            };
            entry.confirmed = Some(reconciliation.clone());

            let superseded = entry.edits != sent.edits;
            if superseded && entry.timer.is_some() {
                // The armed timer sends the newer quantity.
                self.publish_gate(&state.cart);
                drop(guard);
                self.refresh_count().await;
                return;
            }

            let Some(current) = state.cart.line(line) else {
                drop(guard);
                self.refresh_count().await;
                return;
            };

            if !superseded || current.quantity() == reconciliation.quantity {
                reconcile(&mut state.cart, line, &reconciliation);
                self.publish_gate(&state.cart);
                drop(guard);
                debug!("Line reconciled");
                self.refresh_count().await;
                return;
            }

            // Edited again and the timer already fired: send the newest value now.
            sent = InFlight {
                quantity: current.quantity(),
                edits: entry.edits,
            };
            unit_price = current.unit_price();
            entry.in_flight = Some(sent);
            set_state(&mut state.cart, line, LineState::Syncing);
            self.publish_gate(&state.cart);
            drop(guard);

            debug!(quantity = %sent.quantity, "Sending coalesced follow-up");
            self.refresh_count().await;
        }
    }

    /// Rebuild the cart from the backend.
    ///
    /// Armed timers are cancelled. Lines with an update still in flight stay
    /// `Syncing` until it settles.
    async fn refetch(&self) -> Result<(), ApiError> {
        let lines = self.inner.backend.fetch_lines().await?;

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let mut cart = Cart::new(lines);

        for (id, entry) in &mut state.lines {
            if let Some(timer) = entry.timer.take() {
                timer.handle.abort();
            }
            if entry.in_flight.is_some() && cart.set_state(*id, LineState::Syncing).is_err() {
                debug!(line = %id, "In-flight line no longer in cart");
            }
        }
        for line in cart.lines() {
            state.lines.entry(line.id).or_default().confirmed = Some(LineReconciliation {
                quantity: line.quantity(),
                subtotal: line.subtotal(),
                unit_price: Some(line.unit_price()),
            });
        }
        state
            .lines
            .retain(|id, entry| entry.in_flight.is_some() || cart.line(*id).is_some());

        state.cart = cart;
        self.publish_gate(&state.cart);
        debug!(lines = state.cart.lines().len(), "Cart refetched");
        Ok(())
    }

    /// Refetch after a failure, surfacing a refetch failure to the user.
    async fn resync(&self) {
        if let Err(e) = self.refetch().await {
            warn!(error = %e, "Cart refetch failed");
            self.inner
                .notifier
                .notify(NoticeKind::Error, &e.user_message());
        }
    }

    async fn refresh_count(&self) {
        if let Err(e) = self.inner.counts.refresh().await {
            debug!(error = %e, "Cart count refresh failed");
        }
    }

    fn publish_gate(&self, cart: &Cart) {
        let open = cart.pending_ids().is_empty();
        self.inner.checkout.send_if_modified(|current| {
            if *current == open {
                false
            } else {
                *current = open;
                true
            }
        });
    }
}

impl std::fmt::Debug for CartSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSyncEngine")
            .field("debounce", &self.inner.debounce)
            .field("can_finalize", &self.can_finalize())
            .finish_non_exhaustive()
    }
}

fn reconcile(cart: &mut Cart, line: LineId, reconciliation: &LineReconciliation) {
    if cart.reconcile_line(line, reconciliation).is_err() {
        debug!(%line, "Reconciled line no longer in cart");
    }
}

fn set_state(cart: &mut Cart, line: LineId, state: LineState) {
    if cart.set_state(line, state).is_err() {
        debug!(%line, "Line no longer in cart");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use mely_core::line_subtotal;
    use reqwest::StatusCode;

    use super::*;
    use crate::cart::model::tests::line as cart_line;
    use crate::error::Result;

    const DEBOUNCE: Duration = Duration::from_millis(800);

    /// In-memory backend with configurable latency and stock limits.
    #[derive(Default)]
    struct FakeBackend {
        server: StdMutex<BTreeMap<i64, (u32, Decimal)>>,
        updates: StdMutex<Vec<(LineId, u32)>>,
        deletes: StdMutex<Vec<LineId>>,
        stock: StdMutex<Option<u32>>,
        fail_fetch: StdMutex<bool>,
        fail_delete: StdMutex<bool>,
        latency: Duration,
    }

    impl FakeBackend {
        fn with_lines(lines: &[(i64, u32, Decimal)]) -> Self {
            let backend = Self::default();
            for (id, quantity, price) in lines {
                backend
                    .server
                    .lock()
                    .unwrap()
                    .insert(*id, (*quantity, *price));
            }
            backend
        }

        fn updates(&self) -> Vec<(LineId, u32)> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CartBackend for FakeBackend {
        async fn fetch_lines(&self) -> Result<Vec<CartLine>> {
            if *self.fail_fetch.lock().unwrap() {
                return Err(ApiError::NetworkUnavailable("offline".to_string()));
            }
            Ok(self
                .server
                .lock()
                .unwrap()
                .iter()
                .map(|(id, (quantity, price))| cart_line(*id, *quantity, *price))
                .collect())
        }

        async fn update_quantity(
            &self,
            line: LineId,
            quantity: Quantity,
            _unit_price: Decimal,
        ) -> Result<LineReconciliation> {
            self.updates.lock().unwrap().push((line, quantity.get()));
            tokio::time::sleep(self.latency).await;

            if let Some(stock) = *self.stock.lock().unwrap()
                && quantity.get() > stock
            {
                return Err(ApiError::ValidationRejected {
                    status: StatusCode::CONFLICT,
                    message: format!("Solo quedan {stock} unidades"),
                });
            }

            let mut server = self.server.lock().unwrap();
            let entry = server.get_mut(&line.as_i64()).unwrap();
            entry.0 = quantity.get();
            Ok(LineReconciliation {
                quantity,
                subtotal: line_subtotal(entry.1, quantity),
                unit_price: None,
            })
        }

        async fn delete_line(&self, line: LineId) -> Result<()> {
            if *self.fail_delete.lock().unwrap() {
                return Err(ApiError::ValidationRejected {
                    status: StatusCode::NOT_FOUND,
                    message: "Detalle no encontrado".to_string(),
                });
            }
            self.deletes.lock().unwrap().push(line);
            self.server.lock().unwrap().remove(&line.as_i64());
            Ok(())
        }

        async fn item_count(&self) -> Result<u32> {
            Ok(self.server.lock().unwrap().values().map(|(q, _)| q).sum())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(StdMutex<Vec<(NoticeKind, String)>>);

    impl RecordingNotifier {
        fn errors(&self) -> Vec<String> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|(kind, _)| *kind == NoticeKind::Error)
                .map(|(_, message)| message.clone())
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, kind: NoticeKind, message: &str) {
            self.0.lock().unwrap().push((kind, message.to_string()));
        }
    }

    struct Answer(bool);

    #[async_trait]
    impl Confirmer for Answer {
        async fn confirm(&self, _title: &str, _detail: &str) -> bool {
            self.0
        }
    }

    struct Harness {
        engine: CartSyncEngine,
        backend: Arc<FakeBackend>,
        notifier: Arc<RecordingNotifier>,
        counts: CartCountBroadcaster,
    }

    async fn harness(backend: FakeBackend, confirm: bool) -> Harness {
        let backend = Arc::new(backend);
        let notifier = Arc::new(RecordingNotifier::default());
        let counts = CartCountBroadcaster::new(backend.clone());
        let engine = CartSyncEngine::new(
            backend.clone(),
            counts.clone(),
            notifier.clone(),
            Arc::new(Answer(confirm)),
            DEBOUNCE,
        );
        engine.load().await.unwrap();
        Harness {
            engine,
            backend,
            notifier,
            counts,
        }
    }

    fn price(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_increments_send_one_update() {
        let h = harness(FakeBackend::with_lines(&[(7, 2, price(2500))]), true).await;
        let line = LineId::new(7);

        h.engine.step(line, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.engine.step(line, 1).await.unwrap();

        let snapshot = h.engine.snapshot().await;
        assert_eq!(snapshot.lines[0].quantity().get(), 4);
        assert_eq!(snapshot.lines[0].subtotal(), price(10000));
        assert_eq!(snapshot.total, price(10000));
        assert_eq!(snapshot.pending, vec![line]);
        assert!(!h.engine.can_finalize());
        assert!(h.backend.updates().is_empty());

        settle().await;

        assert_eq!(h.backend.updates(), vec![(line, 4)]);
        let snapshot = h.engine.snapshot().await;
        assert_eq!(snapshot.lines[0].state(), LineState::Synced);
        assert!(snapshot.pending.is_empty());
        assert!(h.engine.can_finalize());
        assert_eq!(h.counts.current(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_edits_sends_last_value() {
        let h = harness(FakeBackend::with_lines(&[(1, 1, price(1000))]), true).await;
        let line = LineId::new(1);

        for quantity in [2, 3, 6] {
            h.engine.on_quantity_edit(line, quantity).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        settle().await;

        assert_eq!(h.backend.updates(), vec![(line, 6)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_quantity_issues_no_call() {
        let h = harness(FakeBackend::with_lines(&[(7, 2, price(2500))]), true).await;
        let line = LineId::new(7);

        h.engine.on_quantity_edit(line, 3).await.unwrap();
        h.engine.on_quantity_edit(line, 2).await.unwrap();
        assert!(!h.engine.can_finalize());
        settle().await;

        assert!(h.backend.updates().is_empty());
        assert!(h.engine.can_finalize());
        assert_eq!(
            h.engine.snapshot().await.lines[0].state(),
            LineState::Synced
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_edit_keeps_gate_open() {
        let h = harness(FakeBackend::with_lines(&[(7, 10, price(2500))]), true).await;

        assert!(!h.engine.step(LineId::new(7), 1).await.unwrap());
        assert!(h.engine.can_finalize());
        assert!(matches!(
            h.engine.on_quantity_edit(LineId::new(99), 2).await,
            Err(SyncError::UnknownLine(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_update_restores_server_truth() {
        let backend = FakeBackend::with_lines(&[(7, 3, price(2500))]);
        *backend.stock.lock().unwrap() = Some(3);
        let h = harness(backend, true).await;
        let line = LineId::new(7);

        h.engine.on_quantity_edit(line, 5).await.unwrap();
        settle().await;

        let snapshot = h.engine.snapshot().await;
        assert_eq!(snapshot.lines[0].quantity().get(), 3);
        assert_eq!(snapshot.lines[0].subtotal(), price(7500));
        assert!(snapshot.pending.is_empty());
        assert_eq!(h.notifier.errors(), vec!["Solo quedan 3 unidades"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refetch_keeps_line_in_error() {
        let backend = FakeBackend::with_lines(&[(7, 3, price(2500))]);
        *backend.stock.lock().unwrap() = Some(3);
        let h = harness(backend, true).await;
        *h.backend.fail_fetch.lock().unwrap() = true;

        h.engine.on_quantity_edit(LineId::new(7), 5).await.unwrap();
        settle().await;

        let snapshot = h.engine.snapshot().await;
        assert_eq!(snapshot.lines[0].state(), LineState::Error);
        assert!(!h.engine.can_finalize());
        assert_eq!(h.notifier.errors().len(), 2);
        assert!(matches!(
            h.engine.finalize_purchase().await,
            Err(SyncError::CheckoutBlocked { pending: 1 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_flight_is_sent_after_it_settles() {
        let backend = FakeBackend {
            latency: Duration::from_secs(2),
            ..FakeBackend::with_lines(&[(7, 2, price(2500))])
        };
        let h = harness(backend, true).await;
        let line = LineId::new(7);

        // t=0: edit to 3; update for 3 goes out at t=800ms and settles at 2800ms
        h.engine.on_quantity_edit(line, 3).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(h.backend.updates(), vec![(line, 3)]);

        // t=1000ms: edit to 5 while 3 is in flight; the timer fires at 1800ms
        h.engine.on_quantity_edit(line, 5).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1900)).await;

        // t=2900ms: the response for 3 did not overwrite 5; the follow-up is out
        let snapshot = h.engine.snapshot().await;
        assert_eq!(snapshot.lines[0].quantity().get(), 5);
        assert_eq!(snapshot.lines[0].state(), LineState::Syncing);
        assert_eq!(h.backend.updates(), vec![(line, 3), (line, 5)]);

        settle().await;
        let snapshot = h.engine.snapshot().await;
        assert_eq!(snapshot.lines[0].quantity().get(), 5);
        assert_eq!(snapshot.lines[0].state(), LineState::Synced);
        assert!(h.engine.can_finalize());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_does_not_overwrite_newer_edit() {
        let backend = FakeBackend {
            latency: Duration::from_millis(300),
            ..FakeBackend::with_lines(&[(7, 2, price(2500))])
        };
        let h = harness(backend, true).await;
        let line = LineId::new(7);

        // t=0: edit to 3; update for 3 goes out at 800ms and settles at 1100ms
        h.engine.on_quantity_edit(line, 3).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(h.backend.updates(), vec![(line, 3)]);

        // t=1000ms: edit to 5; its timer is still armed when the 3 comes back
        h.engine.on_quantity_edit(line, 5).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let snapshot = h.engine.snapshot().await;
        assert_eq!(snapshot.lines[0].quantity().get(), 5);
        assert_eq!(snapshot.lines[0].subtotal(), price(12500));
        assert_eq!(snapshot.lines[0].state(), LineState::PendingLocal);
        assert!(!h.engine.can_finalize());
        assert_eq!(h.backend.updates(), vec![(line, 3)]);

        settle().await;
        let snapshot = h.engine.snapshot().await;
        assert_eq!(snapshot.lines[0].quantity().get(), 5);
        assert_eq!(snapshot.lines[0].state(), LineState::Synced);
        assert_eq!(h.backend.updates(), vec![(line, 3), (line, 5)]);
        assert!(h.engine.can_finalize());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lines_sync_independently() {
        let h = harness(
            FakeBackend::with_lines(&[(1, 1, price(1000)), (2, 1, price(500))]),
            true,
        )
        .await;

        h.engine.on_quantity_edit(LineId::new(1), 2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        h.engine.on_quantity_edit(LineId::new(2), 4).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Line 1 is through its window, line 2 is not
        assert_eq!(h.backend.updates(), vec![(LineId::new(1), 2)]);
        assert_eq!(h.engine.snapshot().await.pending, vec![LineId::new(2)]);

        settle().await;
        assert_eq!(h.backend.updates().len(), 2);
        assert_eq!(h.engine.snapshot().await.total, price(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkout_gate_is_observable() {
        let h = harness(FakeBackend::with_lines(&[(7, 2, price(2500))]), true).await;
        let mut gate = h.engine.subscribe_checkout();
        assert!(*gate.borrow_and_update());

        h.engine.on_quantity_edit(LineId::new(7), 3).await.unwrap();
        gate.changed().await.unwrap();
        assert!(!*gate.borrow_and_update());

        gate.changed().await.unwrap();
        assert!(*gate.borrow_and_update());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_waits_for_confirmation_and_server() {
        let h = harness(
            FakeBackend::with_lines(&[(7, 2, price(2500)), (9, 1, price(1000))]),
            true,
        )
        .await;

        assert!(h.engine.remove_line(LineId::new(9)).await.unwrap());

        let snapshot = h.engine.snapshot().await;
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.total, price(5000));
        assert_eq!(*h.backend.deletes.lock().unwrap(), vec![LineId::new(9)]);
        assert_eq!(h.counts.current(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_removal_keeps_line() {
        let h = harness(FakeBackend::with_lines(&[(9, 1, price(1000))]), false).await;

        assert!(!h.engine.remove_line(LineId::new(9)).await.unwrap());
        assert_eq!(h.engine.snapshot().await.lines.len(), 1);
        assert!(h.backend.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_removal_refetches() {
        let h = harness(FakeBackend::with_lines(&[(9, 1, price(1000))]), true).await;
        *h.backend.fail_delete.lock().unwrap() = true;

        let result = h.engine.remove_line(LineId::new(9)).await;

        assert!(matches!(result, Err(SyncError::Api(_))));
        assert_eq!(h.engine.snapshot().await.lines.len(), 1);
        assert_eq!(h.notifier.errors(), vec!["Detalle no encontrado"]);
    }
}
