//! # Error Types
//!
//! Domain-specific error types for stockline-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockline-core errors (this file)                                     │
//! │  ├── CoreError        - Unit graph, pricing, stock, workflow errors    │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockline-db errors (separate crate)                                  │
//! │  └── DbError          - Database failures, wraps CoreError             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → endpoint                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (unit id, product name, status)
//! 3. Errors are enum variants, never String
//! 4. `InsufficientStock` is a business outcome, not a system fault

use thiserror::Error;

use crate::types::PurchaseOrderStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A unit's `converts_to` chain loops back on itself before reaching
    /// the base unit.
    #[error("Unit conversion cycle detected at unit {unit_id}")]
    CycleDetected { unit_id: String },

    /// A unit points at a conversion target that does not exist in the
    /// product's unit set.
    #[error("Unit {unit_id} converts to unknown unit {target_id}")]
    DanglingReference { unit_id: String, target_id: String },

    /// A unit cannot be deleted while other units convert through it.
    #[error("Unit {unit_id} is referenced by dependent units: {}", dependents.join(", "))]
    DependentUnitsExist {
        unit_id: String,
        dependents: Vec<String>,
    },

    /// The base unit of a product can never be deleted.
    #[error("Base unit {unit_id} cannot be deleted")]
    BaseUnitDeletion { unit_id: String },

    /// A non-base unit reached a dead end: no `converts_to` and not the base.
    #[error("Unit {unit_id} does not reach the base unit")]
    UnreachableBase { unit_id: String },

    /// Unit lookup failed.
    #[error("Unit not found: {0}")]
    UnitNotFound(String),

    /// Unit structure is frozen because stock exists for the product.
    ///
    /// ## When This Occurs
    /// Any variant of the product has `current_stock > 0`. Changing a
    /// conversion factor at that point would silently re-scale stock that
    /// was counted under the old factors.
    #[error("Units of product {product_id} are locked while stock is on hand")]
    UnitsLockedByStock { product_id: String },

    /// Tier resolution was asked to pick from an empty list.
    #[error("Pricing tier list is empty")]
    EmptyTierList,

    /// Insufficient stock to complete a sale or negative adjustment.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout line: 1 Dozen (12 pcs)
    ///      │
    ///      ▼
    /// Check stock: available=10
    ///      │
    ///      ▼
    /// InsufficientStock { product_name: "Egg", available: 10, required: 12 }
    ///      │
    ///      ▼
    /// UI shows: "Only 10 pcs of Egg in stock"
    /// ```
    #[error("Insufficient stock for {product_name} ({variant_label}): available {available}, required {required}")]
    InsufficientStock {
        product_name: String,
        variant_label: String,
        available: i64,
        required: i64,
    },

    /// Purchase order status change outside the allowed graph.
    #[error("Purchase order cannot move from {from} to {to}")]
    InvalidTransition {
        from: PurchaseOrderStatus,
        to: PurchaseOrderStatus,
    },

    /// Purchase order is no longer a draft.
    #[error("Purchase order {number} is {status} and can no longer be edited")]
    PurchaseOrderNotEditable {
        number: String,
        status: PurchaseOrderStatus,
    },

    /// Arithmetic on quantities or money left the `i64` range.
    #[error("Arithmetic overflow while computing {context}")]
    Overflow { context: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an Overflow error for the given computation.
    pub fn overflow(context: impl Into<String>) -> Self {
        CoreError::Overflow {
            context: context.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// They are raised before any mutation happens.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., a malformed document number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., two units with the same name).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Pricing tiers are not a valid ascending list.
    #[error("Invalid pricing tiers: {reason}")]
    InvalidTiers { reason: String },

    /// Unit set breaks a structural rule (base unit count, self-reference).
    #[error("Invalid unit set: {reason}")]
    InvalidUnits { reason: String },

    /// Referenced entity does not belong where it is used.
    #[error("{field} '{value}' does not belong to {owner}")]
    Mismatch {
        field: String,
        value: String,
        owner: String,
    },
}

impl ValidationError {
    pub(crate) fn tiers(reason: impl Into<String>) -> Self {
        ValidationError::InvalidTiers {
            reason: reason.into(),
        }
    }

    pub(crate) fn units(reason: impl Into<String>) -> Self {
        ValidationError::InvalidUnits {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message() {
        let err = CoreError::InsufficientStock {
            product_name: "Egg".to_string(),
            variant_label: "Grade A".to_string(),
            available: 10,
            required: 12,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Egg (Grade A): available 10, required 12"
        );
    }

    #[test]
    fn test_dependent_units_message_names_them() {
        let err = CoreError::DependentUnitsExist {
            unit_id: "dozen".to_string(),
            dependents: vec!["box".to_string(), "crate".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Unit dozen is referenced by dependent units: box, crate"
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = CoreError::InvalidTransition {
            from: PurchaseOrderStatus::Received,
            to: PurchaseOrderStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "Purchase order cannot move from received to cancelled"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
