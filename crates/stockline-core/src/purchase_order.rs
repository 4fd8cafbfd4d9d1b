//! # Purchase Order Workflow
//!
//! Status graph and receive planning for inbound stock.
//!
//! ## State Machine
//! ```text
//!   ┌───────┐  send   ┌──────┐ receive ┌──────────┐ complete ┌───────────┐
//!   │ draft │───────►│ sent │────────►│ received │─────────►│ completed │
//!   └───┬───┘        └──┬───┘         └──────────┘          └───────────┘
//!       │    cancel     │ cancel
//!       └──────┬────────┘
//!              ▼
//!        ┌───────────┐
//!        │ cancelled │
//!        └───────────┘
//! ```
//!
//! Only `receive` touches stock. Only a draft can be edited or deleted.

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus, ReceiveItem};
use crate::validation::{validate_price, validate_received_quantity};

impl PurchaseOrderStatus {
    /// Returns true if the graph has an edge from `self` to `next`.
    pub const fn can_transition_to(&self, next: PurchaseOrderStatus) -> bool {
        use PurchaseOrderStatus::*;
        matches!(
            (*self, next),
            (Draft, Sent)
                | (Draft, Cancelled)
                | (Sent, Received)
                | (Sent, Cancelled)
                | (Received, Completed)
        )
    }

    /// Validates a transition, returning the target status.
    pub fn transition(&self, next: PurchaseOrderStatus) -> CoreResult<PurchaseOrderStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }

    pub const fn is_editable(&self) -> bool {
        matches!(self, PurchaseOrderStatus::Draft)
    }
}

/// Rejects edits and deletes of a purchase order that left draft.
pub fn ensure_editable(order: &PurchaseOrder) -> CoreResult<()> {
    if order.status.is_editable() {
        Ok(())
    } else {
        Err(CoreError::PurchaseOrderNotEditable {
            number: order.number.clone(),
            status: order.status,
        })
    }
}

/// Subtotal and item count of an open order, from ordered values.
pub fn order_totals(items: &[PurchaseOrderItem]) -> CoreResult<(Money, i64)> {
    let mut subtotal = Money::zero();
    let mut count: i64 = 0;
    for item in items {
        let line = Money::from_minor(item.price_cents)
            .checked_mul(item.ordered_qty)
            .ok_or_else(|| CoreError::overflow("purchase order subtotal"))?;
        subtotal = subtotal
            .checked_add(line)
            .ok_or_else(|| CoreError::overflow("purchase order subtotal"))?;
        count = count
            .checked_add(item.ordered_qty)
            .ok_or_else(|| CoreError::overflow("purchase order item count"))?;
    }
    Ok((subtotal, count))
}

// =============================================================================
// Receive Planning
// =============================================================================

/// The confirmed receipt of one item, merged from input and order defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReceipt {
    pub item_id: String,
    pub variant_id: String,
    pub unit_id: String,
    pub received_qty: i64,
    pub received_price: Money,
    pub verified: bool,
}

/// Merges receive input with the order's items.
///
/// Items not mentioned in `input` are received as ordered and left
/// unverified. The result follows the order of `items`.
///
/// ## Errors
/// - `Mismatch` if an input item id is not on this order
/// - `Duplicate` if an item id appears twice
/// - Range errors for negative quantities or prices
pub fn resolve_receipt(
    order_number: &str,
    items: &[PurchaseOrderItem],
    input: &[ReceiveItem],
) -> CoreResult<Vec<ResolvedReceipt>> {
    let mut by_item: HashMap<&str, &ReceiveItem> = HashMap::with_capacity(input.len());
    for entry in input {
        if !items.iter().any(|i| i.id == entry.item_id) {
            return Err(ValidationError::Mismatch {
                field: "item_id".to_string(),
                value: entry.item_id.clone(),
                owner: format!("purchase order {}", order_number),
            }
            .into());
        }
        validate_received_quantity(entry.received_qty)?;
        validate_price("received_price", entry.received_price_cents)?;
        if by_item.insert(entry.item_id.as_str(), entry).is_some() {
            return Err(ValidationError::Duplicate {
                field: "item_id".to_string(),
                value: entry.item_id.clone(),
            }
            .into());
        }
    }

    Ok(items
        .iter()
        .map(|item| {
            let (received_qty, price, verified) = match by_item.get(item.id.as_str()) {
                Some(entry) => (entry.received_qty, entry.received_price_cents, entry.verified),
                None => (item.ordered_qty, item.price_cents, false),
            };
            ResolvedReceipt {
                item_id: item.id.clone(),
                variant_id: item.variant_id.clone(),
                unit_id: item.unit_id.clone(),
                received_qty,
                received_price: Money::from_minor(price),
                verified,
            }
        })
        .collect())
}

/// `(Σ received_qty × received_price, Σ received_qty)`.
pub fn receipt_totals(receipts: &[ResolvedReceipt]) -> CoreResult<(Money, i64)> {
    let mut subtotal = Money::zero();
    let mut count: i64 = 0;
    for r in receipts {
        let line = r
            .received_price
            .checked_mul(r.received_qty)
            .ok_or_else(|| CoreError::overflow("received subtotal"))?;
        subtotal = subtotal
            .checked_add(line)
            .ok_or_else(|| CoreError::overflow("received subtotal"))?;
        count = count
            .checked_add(r.received_qty)
            .ok_or_else(|| CoreError::overflow("received item count"))?;
    }
    Ok((subtotal, count))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use PurchaseOrderStatus::*;

    const ALL: [PurchaseOrderStatus; 5] = [Draft, Sent, Received, Completed, Cancelled];

    fn item(id: &str, qty: i64, price: i64) -> PurchaseOrderItem {
        PurchaseOrderItem {
            id: id.to_string(),
            purchase_order_id: "po1".to_string(),
            product_id: "p1".to_string(),
            variant_id: format!("v-{}", id),
            unit_id: "box".to_string(),
            product_name: "Egg".to_string(),
            variant_label: "Grade A".to_string(),
            unit_name: "Box".to_string(),
            ordered_qty: qty,
            price_cents: price,
            received_qty: None,
            received_price_cents: None,
            verified: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_transition_graph_is_exact() {
        let allowed = [
            (Draft, Sent),
            (Draft, Cancelled),
            (Sent, Received),
            (Sent, Cancelled),
            (Received, Completed),
        ];
        for from in ALL {
            for to in ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(from.can_transition_to(to), expected, "{} -> {}", from, to);
                assert_eq!(from.transition(to).is_ok(), expected);
            }
        }
    }

    #[test]
    fn test_receive_twice_is_rejected() {
        let err = Received.transition(Received).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition { from: Received, to: Received }
        ));
    }

    #[test]
    fn test_terminal_states() {
        for to in ALL {
            assert!(!Completed.can_transition_to(to));
            assert!(!Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn test_only_draft_is_editable() {
        for status in ALL {
            assert_eq!(status.is_editable(), status == Draft);
        }
    }

    #[test]
    fn test_resolve_receipt_defaults_unlisted_items() {
        let items = vec![item("a", 2, 800_000), item("b", 5, 1_000)];
        let input = vec![ReceiveItem {
            item_id: "b".to_string(),
            received_qty: 4,
            received_price_cents: 1_100,
            verified: true,
        }];

        let receipts = resolve_receipt("PO-2026-000001", &items, &input).unwrap();
        assert_eq!(receipts[0].received_qty, 2);
        assert_eq!(receipts[0].received_price.minor(), 800_000);
        assert!(!receipts[0].verified);
        assert_eq!(receipts[1].received_qty, 4);
        assert!(receipts[1].verified);

        let (subtotal, count) = receipt_totals(&receipts).unwrap();
        assert_eq!(subtotal.minor(), 2 * 800_000 + 4 * 1_100);
        assert_eq!(count, 6);
    }

    #[test]
    fn test_resolve_receipt_rejects_foreign_and_duplicate_items() {
        let items = vec![item("a", 2, 100)];
        let foreign = vec![ReceiveItem {
            item_id: "zzz".to_string(),
            received_qty: 1,
            received_price_cents: 100,
            verified: false,
        }];
        assert!(matches!(
            resolve_receipt("PO-1", &items, &foreign),
            Err(CoreError::Validation(ValidationError::Mismatch { .. }))
        ));

        let entry = ReceiveItem {
            item_id: "a".to_string(),
            received_qty: 1,
            received_price_cents: 100,
            verified: false,
        };
        let twice = vec![entry.clone(), entry];
        assert!(matches!(
            resolve_receipt("PO-1", &items, &twice),
            Err(CoreError::Validation(ValidationError::Duplicate { .. }))
        ));
    }

    #[test]
    fn test_order_totals() {
        let items = vec![item("a", 2, 800_000), item("b", 3, 500)];
        let (subtotal, count) = order_totals(&items).unwrap();
        assert_eq!(subtotal.minor(), 1_601_500);
        assert_eq!(count, 5);
    }
}
