//! # Unit Graph Resolver
//!
//! Validates a product's units of measure and derives `to_base_unit`.
//!
//! ## Shape of the Graph
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every non-base unit points at one target; chains end at the base.     │
//! │                                                                         │
//! │        Box (×12) ──► Dozen (×12) ──► Pcs (base, 1)                      │
//! │                                        ▲                                │
//! │        Tray (×30) ─────────────────────┘   (branching is allowed)       │
//! │                                                                         │
//! │  to_base_unit(Box) = 12 × 12 × 1 = 144                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every walk keeps its own visited set. Nothing is memoized between calls,
//! so concurrent validations of different edits never share state.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{NewUnit, Unit, UnitEdit};
use crate::validation::{validate_conversion_factor, validate_name};

/// Maximum characters in a unit name.
const MAX_UNIT_NAME: usize = 50;

fn index(units: &[Unit]) -> HashMap<&str, &Unit> {
    units.iter().map(|u| (u.id.as_str(), u)).collect()
}

// =============================================================================
// Resolution
// =============================================================================

/// Walks `converts_to` from `unit_id` up to the base unit, multiplying
/// conversion factors along the way.
///
/// ## Errors
/// - `UnitNotFound` if `unit_id` is not in `units`
/// - `CycleDetected` if a unit is revisited before the base is reached
/// - `DanglingReference` if a target does not exist
/// - `UnreachableBase` if a non-base unit has no target
/// - `Overflow` if the product of factors leaves `i64`
pub fn compute_to_base_unit(unit_id: &str, units: &[Unit]) -> CoreResult<i64> {
    let by_id = index(units);
    let mut current = *by_id
        .get(unit_id)
        .ok_or_else(|| CoreError::UnitNotFound(unit_id.to_string()))?;
    let mut visited: HashSet<&str> = HashSet::new();
    let mut factor: i64 = 1;

    loop {
        if current.is_base {
            return Ok(factor);
        }

        if !visited.insert(current.id.as_str()) {
            return Err(CoreError::CycleDetected {
                unit_id: current.id.clone(),
            });
        }

        factor = factor
            .checked_mul(current.conversion_factor)
            .ok_or_else(|| CoreError::overflow(format!("to_base_unit of {}", unit_id)))?;

        let target = current
            .converts_to
            .as_deref()
            .ok_or_else(|| CoreError::UnreachableBase {
                unit_id: current.id.clone(),
            })?;

        current = *by_id
            .get(target)
            .ok_or_else(|| CoreError::DanglingReference {
                unit_id: current.id.clone(),
                target_id: target.to_string(),
            })?;
    }
}

/// Returns true if pointing `from_id` at `proposed_target_id` would close
/// a loop.
///
/// Simulates the walk upward from the proposed target over the current
/// edges; reaching `from_id` means the edit would make `from_id` its own
/// ancestor. Self-reference always counts as a cycle, and so does an
/// already-cyclic chain above the target.
pub fn would_create_cycle(from_id: &str, proposed_target_id: &str, units: &[Unit]) -> bool {
    if from_id == proposed_target_id {
        return true;
    }

    let by_id = index(units);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut cursor = Some(proposed_target_id);

    while let Some(id) = cursor {
        if id == from_id || !visited.insert(id) {
            return true;
        }
        cursor = by_id.get(id).and_then(|unit| {
            if unit.is_base {
                None
            } else {
                unit.converts_to.as_deref()
            }
        });
    }

    false
}

/// Recomputes `to_base_unit` for every unit in place.
///
/// All values are computed against the unchanged input before any is
/// written, so a failure leaves `units` untouched.
pub fn recalculate_all(units: &mut [Unit]) -> CoreResult<()> {
    let computed = units
        .iter()
        .map(|u| {
            if u.is_base {
                Ok(1)
            } else {
                compute_to_base_unit(&u.id, units)
            }
        })
        .collect::<CoreResult<Vec<i64>>>()?;

    for (unit, value) in units.iter_mut().zip(computed) {
        unit.to_base_unit = value;
    }

    Ok(())
}

/// Returns every unit whose chain passes through `unit_id`, directly or
/// transitively, in input order.
pub fn dependents<'a>(unit_id: &str, units: &'a [Unit]) -> Vec<&'a Unit> {
    let by_id = index(units);

    units
        .iter()
        .filter(|candidate| candidate.id != unit_id)
        .filter(|candidate| {
            let mut visited: HashSet<&str> = HashSet::new();
            let mut cursor = candidate.converts_to.as_deref();
            while let Some(id) = cursor {
                if id == unit_id {
                    return true;
                }
                if !visited.insert(id) {
                    return false;
                }
                cursor = by_id
                    .get(id)
                    .filter(|u| !u.is_base)
                    .and_then(|u| u.converts_to.as_deref());
            }
            false
        })
        .collect()
}

// =============================================================================
// Structural Validation
// =============================================================================

/// Validates a complete unit set and derives `to_base_unit` for it.
///
/// ## Rules
/// - Exactly one base unit, with no target and factor 1
/// - Unit names are unique within the product (case-insensitive)
/// - Every non-base unit has a target, is not its own target, and
///   resolves to the base without cycles
pub fn validate_unit_set(units: &mut [Unit]) -> CoreResult<()> {
    let base_count = units.iter().filter(|u| u.is_base).count();
    if base_count != 1 {
        return Err(ValidationError::units(format!(
            "expected exactly one base unit, found {}",
            base_count
        ))
        .into());
    }

    let mut names: HashSet<String> = HashSet::new();
    for unit in units.iter() {
        validate_name("unit name", &unit.name, MAX_UNIT_NAME)?;
        validate_conversion_factor(unit.conversion_factor)?;

        if !names.insert(unit.name.trim().to_lowercase()) {
            return Err(ValidationError::Duplicate {
                field: "unit name".to_string(),
                value: unit.name.clone(),
            }
            .into());
        }

        if unit.is_base {
            if unit.converts_to.is_some() || unit.conversion_factor != 1 {
                return Err(ValidationError::units(format!(
                    "base unit '{}' must have factor 1 and no target",
                    unit.name
                ))
                .into());
            }
        } else if unit.converts_to.as_deref() == Some(unit.id.as_str()) {
            return Err(ValidationError::units(format!(
                "unit '{}' cannot convert to itself",
                unit.name
            ))
            .into());
        }
    }

    recalculate_all(units)
}

/// Finds a unit by id, falling back to a case-insensitive name match.
pub fn find_unit<'a>(units: &'a [Unit], key: &str) -> Option<&'a Unit> {
    units.iter().find(|u| u.id == key).or_else(|| {
        let wanted = key.trim().to_lowercase();
        units.iter().find(|u| u.name.trim().to_lowercase() == wanted)
    })
}

/// Builds and validates a product's initial unit set.
///
/// Targets in `input` are unit names (or ids produced by `new_id`, though
/// callers normally use names). Ids are minted by `new_id` so this stays
/// free of I/O and randomness.
pub fn build_unit_set(
    product_id: &str,
    input: &[NewUnit],
    now: DateTime<Utc>,
    mut new_id: impl FnMut() -> String,
) -> CoreResult<Vec<Unit>> {
    if input.is_empty() {
        return Err(ValidationError::units("a product needs at least one unit").into());
    }

    let mut units: Vec<Unit> = input
        .iter()
        .map(|u| Unit {
            id: new_id(),
            product_id: product_id.to_string(),
            name: u.name.trim().to_string(),
            conversion_factor: u.conversion_factor,
            converts_to: None,
            to_base_unit: 1,
            is_base: u.is_base,
            created_at: now,
        })
        .collect();

    let mut targets = Vec::with_capacity(units.len());
    for (unit, new_unit) in units.iter().zip(input) {
        let target = match new_unit.converts_to.as_deref() {
            Some(key) => Some(
                find_unit(&units, key)
                    .map(|t| t.id.clone())
                    .ok_or_else(|| CoreError::DanglingReference {
                        unit_id: unit.name.clone(),
                        target_id: key.to_string(),
                    })?,
            ),
            None => None,
        };
        targets.push(target);
    }
    for (unit, target) in units.iter_mut().zip(targets) {
        unit.converts_to = target;
    }

    validate_unit_set(&mut units)?;
    Ok(units)
}

// =============================================================================
// Edits
// =============================================================================

/// Adds a non-base unit to an existing set and returns the new set.
pub fn add_unit(
    units: &[Unit],
    input: &NewUnit,
    id: String,
    now: DateTime<Utc>,
) -> CoreResult<Vec<Unit>> {
    if input.is_base {
        return Err(ValidationError::units("a product already has a base unit").into());
    }

    let key = input
        .converts_to
        .as_deref()
        .ok_or_else(|| CoreError::UnreachableBase {
            unit_id: input.name.clone(),
        })?;
    let target = find_unit(units, key).ok_or_else(|| CoreError::DanglingReference {
        unit_id: input.name.clone(),
        target_id: key.to_string(),
    })?;
    let product_id = target.product_id.clone();
    let target_id = target.id.clone();

    let mut next = units.to_vec();
    next.push(Unit {
        id,
        product_id,
        name: input.name.trim().to_string(),
        conversion_factor: input.conversion_factor,
        converts_to: Some(target_id),
        to_base_unit: 1,
        is_base: false,
        created_at: now,
    });

    validate_unit_set(&mut next)?;
    Ok(next)
}

/// Applies a partial edit to one unit and returns the recalculated set.
///
/// ## Rules
/// - Renaming never changes numeric relationships
/// - The base unit keeps factor 1 and cannot be pointed anywhere
/// - A retarget is rejected if it is a self-reference, dangles, or
///   [`would_create_cycle`]
pub fn apply_edit(units: &[Unit], unit_id: &str, edit: &UnitEdit) -> CoreResult<Vec<Unit>> {
    let position = units
        .iter()
        .position(|u| u.id == unit_id)
        .ok_or_else(|| CoreError::UnitNotFound(unit_id.to_string()))?;
    let is_base = units[position].is_base;
    let mut next = units.to_vec();

    if let Some(name) = &edit.name {
        next[position].name = name.trim().to_string();
    }

    if let Some(factor) = edit.conversion_factor {
        validate_conversion_factor(factor)?;
        if is_base && factor != 1 {
            return Err(ValidationError::units("the base unit's factor is always 1").into());
        }
        next[position].conversion_factor = factor;
    }

    if let Some(key) = edit.converts_to.as_deref() {
        if is_base {
            return Err(
                ValidationError::units("the base unit cannot convert to another unit").into(),
            );
        }
        let target = find_unit(units, key).ok_or_else(|| CoreError::DanglingReference {
            unit_id: unit_id.to_string(),
            target_id: key.to_string(),
        })?;
        if target.id == unit_id {
            return Err(ValidationError::units(format!(
                "unit '{}' cannot convert to itself",
                units[position].name
            ))
            .into());
        }
        if would_create_cycle(unit_id, &target.id, units) {
            return Err(CoreError::CycleDetected {
                unit_id: unit_id.to_string(),
            });
        }
        next[position].converts_to = Some(target.id.clone());
    }

    validate_unit_set(&mut next)?;
    Ok(next)
}

/// Checks that `unit_id` may be deleted.
///
/// ## Errors
/// - `BaseUnitDeletion` for the base unit, always
/// - `DependentUnitsExist` naming every unit that converts through it
pub fn ensure_deletable(unit_id: &str, units: &[Unit]) -> CoreResult<()> {
    let unit = units
        .iter()
        .find(|u| u.id == unit_id)
        .ok_or_else(|| CoreError::UnitNotFound(unit_id.to_string()))?;

    if unit.is_base {
        return Err(CoreError::BaseUnitDeletion {
            unit_id: unit_id.to_string(),
        });
    }

    let blocking = dependents(unit_id, units);
    if !blocking.is_empty() {
        return Err(CoreError::DependentUnitsExist {
            unit_id: unit_id.to_string(),
            dependents: blocking.iter().map(|u| u.name.clone()).collect(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str, factor: i64, target: Option<&str>, is_base: bool) -> Unit {
        Unit {
            id: id.to_string(),
            product_id: "p1".to_string(),
            name: id.to_string(),
            conversion_factor: factor,
            converts_to: target.map(str::to_string),
            to_base_unit: 1,
            is_base,
            created_at: Utc::now(),
        }
    }

    /// pcs (base) ◄── dozen (×12) ◄── box (×12) ◄── pallet (×40)
    ///            ◄── tray (×30)
    fn egg_units() -> Vec<Unit> {
        vec![
            unit("pcs", 1, None, true),
            unit("dozen", 12, Some("pcs"), false),
            unit("box", 12, Some("dozen"), false),
            unit("pallet", 40, Some("box"), false),
            unit("tray", 30, Some("pcs"), false),
        ]
    }

    #[test]
    fn test_box_is_144_pieces() {
        let units = egg_units();
        assert_eq!(compute_to_base_unit("box", &units).unwrap(), 144);
    }

    #[test]
    fn test_base_is_one() {
        let units = egg_units();
        assert_eq!(compute_to_base_unit("pcs", &units).unwrap(), 1);
    }

    #[test]
    fn test_recalculate_all_satisfies_chain_product() {
        let mut units = egg_units();
        recalculate_all(&mut units).unwrap();

        let by_id: HashMap<String, Unit> =
            units.iter().map(|u| (u.id.clone(), u.clone())).collect();
        for u in &units {
            if u.is_base {
                assert_eq!(u.to_base_unit, 1);
            } else {
                let target = &by_id[u.converts_to.as_deref().unwrap()];
                assert_eq!(u.to_base_unit, u.conversion_factor * target.to_base_unit);
            }
        }
        assert_eq!(by_id["pallet"].to_base_unit, 5760);
        assert_eq!(by_id["tray"].to_base_unit, 30);
    }

    #[test]
    fn test_cycle_is_detected() {
        let units = vec![
            unit("pcs", 1, None, true),
            unit("a", 2, Some("b"), false),
            unit("b", 3, Some("c"), false),
            unit("c", 4, Some("a"), false),
        ];
        assert!(matches!(
            compute_to_base_unit("a", &units),
            Err(CoreError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_dangling_reference() {
        let units = vec![unit("pcs", 1, None, true), unit("dozen", 12, Some("ghost"), false)];
        match compute_to_base_unit("dozen", &units) {
            Err(CoreError::DanglingReference { unit_id, target_id }) => {
                assert_eq!(unit_id, "dozen");
                assert_eq!(target_id, "ghost");
            }
            other => panic!("expected DanglingReference, got {:?}", other),
        }
    }

    #[test]
    fn test_would_create_cycle() {
        let units = egg_units();
        // pcs ◄ dozen ◄ box: pointing dozen at box closes a loop
        assert!(would_create_cycle("dozen", "box", &units));
        assert!(would_create_cycle("dozen", "pallet", &units));
        // self-reference
        assert!(would_create_cycle("box", "box", &units));
        // retargeting box onto tray is fine
        assert!(!would_create_cycle("box", "tray", &units));
        assert!(!would_create_cycle("tray", "pallet", &units));
    }

    #[test]
    fn test_dependents_are_transitive() {
        let units = egg_units();
        let mut names: Vec<&str> = dependents("dozen", &units)
            .into_iter()
            .map(|u| u.id.as_str())
            .collect();
        names.sort();
        assert_eq!(names, vec!["box", "pallet"]);
        assert!(dependents("tray", &units).is_empty());
    }

    #[test]
    fn test_ensure_deletable() {
        let units = egg_units();
        assert!(matches!(
            ensure_deletable("pcs", &units),
            Err(CoreError::BaseUnitDeletion { .. })
        ));
        match ensure_deletable("box", &units) {
            Err(CoreError::DependentUnitsExist { dependents, .. }) => {
                assert_eq!(dependents, vec!["pallet".to_string()]);
            }
            other => panic!("expected DependentUnitsExist, got {:?}", other),
        }
        assert!(ensure_deletable("pallet", &units).is_ok());
    }

    #[test]
    fn test_apply_edit_rejects_cycle_and_self_reference() {
        let units = egg_units();
        let to_box = UnitEdit {
            converts_to: Some("box".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            apply_edit(&units, "dozen", &to_box),
            Err(CoreError::CycleDetected { .. })
        ));
        assert!(matches!(
            apply_edit(&units, "box", &to_box),
            Err(CoreError::Validation(ValidationError::InvalidUnits { .. }))
        ));
    }

    #[test]
    fn test_apply_edit_rename_keeps_numbers() {
        let mut units = egg_units();
        recalculate_all(&mut units).unwrap();
        let edit = UnitEdit {
            name: Some("Carton".to_string()),
            ..Default::default()
        };
        let next = apply_edit(&units, "box", &edit).unwrap();
        let renamed = next.iter().find(|u| u.id == "box").unwrap();
        assert_eq!(renamed.name, "Carton");
        assert_eq!(renamed.to_base_unit, 144);
    }

    #[test]
    fn test_apply_edit_factor_change_propagates() {
        let units = egg_units();
        let edit = UnitEdit {
            conversion_factor: Some(10),
            ..Default::default()
        };
        let next = apply_edit(&units, "dozen", &edit).unwrap();
        let pallet = next.iter().find(|u| u.id == "pallet").unwrap();
        assert_eq!(pallet.to_base_unit, 40 * 12 * 10);
    }

    #[test]
    fn test_apply_edit_base_cannot_be_retargeted() {
        let units = egg_units();
        let edit = UnitEdit {
            converts_to: Some("dozen".to_string()),
            ..Default::default()
        };
        assert!(apply_edit(&units, "pcs", &edit).is_err());
    }

    #[test]
    fn test_build_unit_set_resolves_names() {
        let input = vec![
            NewUnit::derived("Box", 12, "Dozen"),
            NewUnit::base("Pcs"),
            NewUnit::derived("Dozen", 12, "pcs"),
        ];
        let mut seq = 0;
        let units = build_unit_set("p1", &input, Utc::now(), || {
            seq += 1;
            format!("u{}", seq)
        })
        .unwrap();

        let boxed = units.iter().find(|u| u.name == "Box").unwrap();
        assert_eq!(boxed.to_base_unit, 144);
        assert_eq!(boxed.converts_to.as_deref(), Some("u3"));
    }

    #[test]
    fn test_build_unit_set_requires_single_base() {
        let none = vec![NewUnit::derived("Dozen", 12, "Dozen")];
        assert!(build_unit_set("p1", &none, Utc::now(), || "x".to_string()).is_err());

        let two = vec![NewUnit::base("Pcs"), NewUnit::base("Gram")];
        let mut seq = 0;
        let result = build_unit_set("p1", &two, Utc::now(), || {
            seq += 1;
            seq.to_string()
        });
        assert!(matches!(
            result,
            Err(CoreError::Validation(ValidationError::InvalidUnits { .. }))
        ));
    }

    #[test]
    fn test_add_unit_branches_onto_existing_target() {
        let units = egg_units();
        let next = add_unit(
            &units,
            &NewUnit::derived("Half Dozen", 6, "pcs"),
            "half".to_string(),
            Utc::now(),
        )
        .unwrap();
        let half = next.iter().find(|u| u.id == "half").unwrap();
        assert_eq!(half.to_base_unit, 6);
    }

    #[test]
    fn test_overflow_is_reported() {
        let units = vec![
            unit("pcs", 1, None, true),
            unit("big", i64::MAX, Some("pcs"), false),
            unit("bigger", 2, Some("big"), false),
        ];
        assert!(matches!(
            compute_to_base_unit("bigger", &units),
            Err(CoreError::Overflow { .. })
        ));
    }
}
