//! Accounting consistency checks applied to whichever candidate survives the
//! source stages. A failed check downgrades the result; it is never an error.

use serde::{Deserialize, Serialize};

use crate::models::{Category, TransactionContext};
use crate::movement::{infer_movement, MovementKind};

/// Ceiling applied to the confidence of a candidate that fails a check.
pub const VIOLATION_CONFIDENCE_CAP: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    MovementAlignment,
    SignConsistency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub check: Check,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Verdict {
    pub violations: Vec<Violation>,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// All failed checks joined for display, `None` when valid.
    pub fn reason(&self) -> Option<String> {
        if self.is_valid() {
            return None;
        }
        Some(
            self.violations
                .iter()
                .map(|v| v.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

pub fn check_movement_alignment(movement: MovementKind, category: &Category) -> Option<Violation> {
    if movement.allows(category.reporting_group) {
        return None;
    }
    Some(Violation {
        check: Check::MovementAlignment,
        message: format!(
            "{} cannot be reported under '{}' (category '{}')",
            movement.label(),
            category.reporting_group,
            category.name
        ),
    })
}

pub fn check_sign(context: &TransactionContext, category: &Category) -> Option<Violation> {
    let amount = context.amount;
    if amount > 0.0 && category.accounting_type.is_expense() {
        return Some(Violation {
            check: Check::SignConsistency,
            message: format!(
                "inflow of {amount:.2} cannot be classified as {} (category '{}')",
                category.accounting_type, category.name
            ),
        });
    }
    if amount < 0.0 && category.accounting_type.is_revenue() {
        return Some(Violation {
            check: Check::SignConsistency,
            message: format!(
                "outflow of {amount:.2} cannot be classified as {} (category '{}')",
                category.accounting_type, category.name
            ),
        });
    }
    None
}

/// Runs both checks against an already inferred movement kind.
pub fn validate_with_movement(
    context: &TransactionContext,
    movement: MovementKind,
    category: &Category,
) -> Verdict {
    let violations = [
        check_movement_alignment(movement, category),
        check_sign(context, category),
    ]
    .into_iter()
    .flatten()
    .collect();
    Verdict { violations }
}

pub fn validate(context: &TransactionContext, category: &Category) -> Verdict {
    validate_with_movement(context, infer_movement(context), category)
}
