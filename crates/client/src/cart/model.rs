//! In-memory cart model.
//!
//! The model owns the ordered lines and keeps every line's subtotal equal to
//! `round(unit_price * quantity, 2)` for locally-applied quantities, so the
//! derived total never disagrees with what the lines display.

use mely_core::{LineId, ProductId, Quantity, VariantId, line_subtotal};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by cart model operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("cart has no line {0}")]
    UnknownLine(LineId),
}

/// Confirmation state of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineState {
    /// The displayed quantity is the server's.
    #[default]
    Synced,
    /// Edited locally, waiting for the debounce window to elapse.
    PendingLocal,
    /// A quantity update is in flight.
    Syncing,
    /// The last update failed; a refetch is restoring server truth.
    Error,
}

impl LineState {
    /// Whether the line belongs in the pending set.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        !matches!(self, Self::Synced)
    }
}

/// Product a line refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductRef {
    pub id: Option<ProductId>,
    pub name: String,
}

/// Variant (model) of the product a line refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantRef {
    pub id: Option<VariantId>,
    pub name: String,
    /// Units in stock, when the backend reports it.
    pub stock: Option<u32>,
}

/// One line of the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub id: LineId,
    pub product: ProductRef,
    pub variant: VariantRef,
    quantity: Quantity,
    unit_price: Decimal,
    subtotal: Decimal,
    state: LineState,
}

impl CartLine {
    /// Build a line from server data. The server's subtotal is kept as-is.
    #[must_use]
    pub const fn from_server(
        id: LineId,
        product: ProductRef,
        variant: VariantRef,
        quantity: Quantity,
        unit_price: Decimal,
        subtotal: Decimal,
    ) -> Self {
        Self {
            id,
            product,
            variant,
            quantity,
            unit_price,
            subtotal,
            state: LineState::Synced,
        }
    }

    #[must_use]
    pub const fn quantity(&self) -> Quantity {
        self.quantity
    }

    #[must_use]
    pub const fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    #[must_use]
    pub const fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    #[must_use]
    pub const fn state(&self) -> LineState {
        self.state
    }
}

/// Authoritative values for one line, as returned by a successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineReconciliation {
    pub quantity: Quantity,
    pub subtotal: Decimal,
    /// New unit price, when the server reports one.
    pub unit_price: Option<Decimal>,
}

/// Ordered collection of lines with a derived total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Build a cart from server lines, keeping their order.
    #[must_use]
    pub const fn new(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn line(&self, id: LineId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.id == id)
    }

    fn line_mut(&mut self, id: LineId) -> Result<&mut CartLine, CartError> {
        self.lines
            .iter_mut()
            .find(|line| line.id == id)
            .ok_or(CartError::UnknownLine(id))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Apply a user edit.
    ///
    /// Quantities outside `1..=10` leave the line untouched and return
    /// `Ok(false)`. Otherwise the quantity and subtotal are updated, the line
    /// becomes `PendingLocal` and `Ok(true)` is returned.
    ///
    /// # Errors
    ///
    /// Returns `CartError::UnknownLine` if the cart has no such line.
    pub fn apply_local_quantity(&mut self, id: LineId, quantity: i64) -> Result<bool, CartError> {
        let line = self.line_mut(id)?;
        let Ok(quantity) = Quantity::try_from(quantity) else {
            return Ok(false);
        };

        line.quantity = quantity;
        line.subtotal = line_subtotal(line.unit_price, quantity);
        line.state = LineState::PendingLocal;
        Ok(true)
    }

    /// Install authoritative values for a line and mark it `Synced`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::UnknownLine` if the cart has no such line.
    pub fn reconcile_line(
        &mut self,
        id: LineId,
        authoritative: &LineReconciliation,
    ) -> Result<(), CartError> {
        let line = self.line_mut(id)?;
        line.quantity = authoritative.quantity;
        line.subtotal = authoritative.subtotal;
        if let Some(unit_price) = authoritative.unit_price {
            line.unit_price = unit_price;
        }
        line.state = LineState::Synced;
        Ok(())
    }

    /// Change a line's confirmation state.
    ///
    /// # Errors
    ///
    /// Returns `CartError::UnknownLine` if the cart has no such line.
    pub fn set_state(&mut self, id: LineId, state: LineState) -> Result<(), CartError> {
        self.line_mut(id)?.state = state;
        Ok(())
    }

    /// Remove a line. Call only after the server confirmed the deletion.
    ///
    /// # Errors
    ///
    /// Returns `CartError::UnknownLine` if the cart has no such line.
    pub fn remove_line(&mut self, id: LineId) -> Result<CartLine, CartError> {
        let index = self
            .lines
            .iter()
            .position(|line| line.id == id)
            .ok_or(CartError::UnknownLine(id))?;
        Ok(self.lines.remove(index))
    }

    /// Sum of the displayed subtotals.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(|line| line.subtotal).sum()
    }

    /// Sum of displayed quantities, including unconfirmed edits.
    #[must_use]
    pub fn local_item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity.get()).sum()
    }

    /// Ids of lines that are not `Synced`, in cart order.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<LineId> {
        self.lines
            .iter()
            .filter(|line| line.state.is_pending())
            .map(|line| line.id)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn line(id: i64, quantity: u32, unit_price: Decimal) -> CartLine {
        CartLine::from_server(
            LineId::new(id),
            ProductRef {
                id: Some(ProductId::new(id * 10)),
                name: format!("Producto {id}"),
            },
            VariantRef {
                id: Some(VariantId::new(id * 100)),
                name: "Único".to_string(),
                stock: Some(10),
            },
            Quantity::authoritative(quantity),
            unit_price,
            line_subtotal(unit_price, Quantity::authoritative(quantity)),
        )
    }

    fn assert_total_invariant(cart: &Cart) {
        let sum: Decimal = cart.lines().iter().map(CartLine::subtotal).sum();
        assert_eq!(cart.total(), sum);
    }

    #[test]
    fn test_local_edit_recomputes_subtotal_and_total() {
        let mut cart = Cart::new(vec![
            line(7, 2, Decimal::new(2500, 2)),
            line(8, 1, Decimal::new(1999, 2)),
        ]);

        assert!(cart.apply_local_quantity(LineId::new(7), 4).unwrap());

        let edited = cart.line(LineId::new(7)).unwrap();
        assert_eq!(edited.quantity().get(), 4);
        assert_eq!(edited.subtotal(), Decimal::new(10000, 2));
        assert_eq!(edited.state(), LineState::PendingLocal);
        assert_eq!(cart.total(), Decimal::new(11999, 2));
        assert_total_invariant(&cart);
    }

    #[test]
    fn test_out_of_range_edit_is_noop() {
        let mut cart = Cart::new(vec![line(7, 2, Decimal::new(2500, 2))]);
        let before = cart.clone();

        assert!(!cart.apply_local_quantity(LineId::new(7), 0).unwrap());
        assert!(!cart.apply_local_quantity(LineId::new(7), 11).unwrap());
        assert!(!cart.apply_local_quantity(LineId::new(7), -3).unwrap());

        assert_eq!(cart, before);
    }

    #[test]
    fn test_unknown_line() {
        let mut cart = Cart::new(vec![line(7, 2, Decimal::ONE)]);
        assert_eq!(
            cart.apply_local_quantity(LineId::new(99), 3),
            Err(CartError::UnknownLine(LineId::new(99)))
        );
        assert!(cart.remove_line(LineId::new(99)).is_err());
    }

    #[test]
    fn test_subtotal_rounds_half_away_from_zero() {
        // 3 x 0.125 = 0.375 -> 0.38
        let mut cart = Cart::new(vec![line(1, 1, Decimal::new(125, 3))]);
        cart.apply_local_quantity(LineId::new(1), 3).unwrap();
        assert_eq!(
            cart.line(LineId::new(1)).unwrap().subtotal(),
            Decimal::new(38, 2)
        );
    }

    #[test]
    fn test_reconcile_installs_server_values() {
        let mut cart = Cart::new(vec![line(7, 2, Decimal::new(2500, 2))]);
        cart.apply_local_quantity(LineId::new(7), 5).unwrap();

        cart.reconcile_line(
            LineId::new(7),
            &LineReconciliation {
                quantity: Quantity::authoritative(3),
                subtotal: Decimal::new(7200, 2),
                unit_price: Some(Decimal::new(2400, 2)),
            },
        )
        .unwrap();

        let reconciled = cart.line(LineId::new(7)).unwrap();
        assert_eq!(reconciled.quantity().get(), 3);
        assert_eq!(reconciled.subtotal(), Decimal::new(7200, 2));
        assert_eq!(reconciled.unit_price(), Decimal::new(2400, 2));
        assert_eq!(reconciled.state(), LineState::Synced);
        assert_total_invariant(&cart);
    }

    #[test]
    fn test_total_invariant_across_edit_sequence() {
        let mut cart = Cart::new(vec![
            line(1, 1, Decimal::new(333, 2)),
            line(2, 4, Decimal::new(1005, 3)),
            line(3, 10, Decimal::new(99_999, 2)),
        ]);
        let edits = [(1, 7), (2, 3), (3, 1), (2, 12), (1, 2), (3, 10), (2, 9)];

        for (id, quantity) in edits {
            cart.apply_local_quantity(LineId::new(id), quantity).unwrap();
            assert_total_invariant(&cart);
        }
        cart.remove_line(LineId::new(2)).unwrap();
        assert_total_invariant(&cart);
        assert_eq!(cart.local_item_count(), 12);
    }

    #[test]
    fn test_pending_ids_follow_state() {
        let mut cart = Cart::new(vec![line(1, 1, Decimal::ONE), line(2, 1, Decimal::ONE)]);
        assert!(cart.pending_ids().is_empty());

        cart.apply_local_quantity(LineId::new(2), 2).unwrap();
        cart.set_state(LineId::new(1), LineState::Error).unwrap();
        assert_eq!(cart.pending_ids(), vec![LineId::new(1), LineId::new(2)]);
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        #[derive(Debug, Clone)]
        enum Op {
            Edit(usize, i64),
            Reconcile(usize, u32, i64, Option<i64>),
            Fail(usize),
            Remove(usize),
        }

        fn cart_strategy() -> impl Strategy<Value = Cart> {
            proptest::collection::vec((1u32..=10, 1i64..1_000_000, 0u32..4), 0..6).prop_map(
                |specs| {
                    Cart::new(
                        specs
                            .into_iter()
                            .enumerate()
                            .map(|(i, (quantity, cents, scale))| {
                                line(
                                    i64::try_from(i).unwrap() + 1,
                                    quantity,
                                    Decimal::new(cents, scale),
                                )
                            })
                            .collect(),
                    )
                },
            )
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                4 => (any::<usize>(), -2i64..14).prop_map(|(i, q)| Op::Edit(i, q)),
                2 => (
                    any::<usize>(),
                    1u32..=10,
                    0i64..2_000_000,
                    proptest::option::of(1i64..100_000),
                )
                    .prop_map(|(i, q, subtotal, price)| Op::Reconcile(i, q, subtotal, price)),
                1 => any::<usize>().prop_map(Op::Fail),
                1 => any::<usize>().prop_map(Op::Remove),
            ]
        }

        fn pick(cart: &Cart, index: usize) -> Option<LineId> {
            let lines = cart.lines();
            if lines.is_empty() {
                return None;
            }
            lines.get(index % lines.len()).map(|line| line.id)
        }

        fn apply(cart: &mut Cart, op: Op) {
            match op {
                Op::Edit(i, quantity) => {
                    if let Some(id) = pick(cart, i) {
                        cart.apply_local_quantity(id, quantity).unwrap();
                    }
                }
                Op::Reconcile(i, quantity, subtotal, price) => {
                    if let Some(id) = pick(cart, i) {
                        let reconciliation = LineReconciliation {
                            quantity: Quantity::authoritative(quantity),
                            subtotal: Decimal::new(subtotal, 2),
                            unit_price: price.map(|cents| Decimal::new(cents, 2)),
                        };
                        cart.reconcile_line(id, &reconciliation).unwrap();
                    }
                }
                Op::Fail(i) => {
                    if let Some(id) = pick(cart, i) {
                        cart.set_state(id, LineState::Error).unwrap();
                    }
                }
                Op::Remove(i) => {
                    if let Some(id) = pick(cart, i) {
                        cart.remove_line(id).unwrap();
                    }
                }
            }
        }

        proptest! {
            #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

            #[test]
            fn total_matches_subtotals_in_every_state(
                mut cart in cart_strategy(),
                ops in proptest::collection::vec(op_strategy(), 0..40),
            ) {
                for op in ops {
                    apply(&mut cart, op);

                    let sum: Decimal = cart.lines().iter().map(CartLine::subtotal).sum();
                    prop_assert_eq!(cart.total(), sum);

                    let items: u32 = cart.lines().iter().map(|l| l.quantity().get()).sum();
                    prop_assert_eq!(cart.local_item_count(), items);

                    for line in cart.lines() {
                        if line.state() == LineState::PendingLocal {
                            prop_assert_eq!(
                                line.subtotal(),
                                line_subtotal(line.unit_price(), line.quantity())
                            );
                        }
                    }
                }
            }
        }
    }
}
