use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::EngineConfig;
use crate::error::{ensure_non_negative, BillingError, BillingResult};
use crate::models::{PaymentMethod, PaymentState, PaymentStatus, SplitComponents, SplitSide};
use crate::totals::BillTotals;

/// Amount and split to show after the user picks a payment method
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefaults {
    pub amount_paid: Decimal,
    pub split: Option<SplitComponents>,
}

/// Amount and status after the user picks a status directly
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSelection {
    pub amount_paid: Decimal,
    pub status: PaymentStatus,
}

/// Payment status derivation, split validation and method defaults
#[derive(Debug, Clone)]
pub struct PaymentReconciler {
    split_tolerance: Decimal,
    display_scale: u32,
    full_settlement_on_new_bill: bool,
    seed_split_on_method_change: bool,
}

impl PaymentReconciler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            split_tolerance: config.split_tolerance,
            display_scale: config.display_scale,
            full_settlement_on_new_bill: config.full_settlement_on_new_bill,
            seed_split_on_method_change: config.seed_split_on_method_change,
        }
    }

    /// Status implied by the amounts.
    ///
    /// `forced` is a status the caller chose, never one derived earlier.
    /// `Cancelled` is returned unchanged. A zero grand total counts as settled
    /// unless the caller forced `Pending` or `Partial`, in which case it stays
    /// `Pending`.
    pub fn derive_status(
        grand_total: Decimal,
        amount_paid: Decimal,
        forced: Option<PaymentStatus>,
    ) -> PaymentStatus {
        if forced == Some(PaymentStatus::Cancelled) {
            return PaymentStatus::Cancelled;
        }

        if grand_total <= Decimal::ZERO {
            return match forced {
                Some(PaymentStatus::Pending | PaymentStatus::Partial) => PaymentStatus::Pending,
                _ => PaymentStatus::Paid,
            };
        }

        if amount_paid <= Decimal::ZERO {
            PaymentStatus::Pending
        } else if amount_paid < grand_total {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Paid
        }
    }

    /// `max(0, grand_total - amount_paid)`.
    pub fn compute_balance_due(grand_total: Decimal, amount_paid: Decimal) -> Decimal {
        (grand_total - amount_paid).max(Decimal::ZERO)
    }

    /// Checks that a split payment's components add up to the amount paid.
    ///
    /// Single-tender methods always pass. A split method with no components
    /// entered is treated as `0 + 0`. Components are never adjusted here.
    ///
    /// # Errors
    ///
    /// `BillingError::InvalidInput` for a negative component and
    /// `BillingError::SplitMismatch` when the sum is off by the tolerance or more.
    pub fn validate_split(
        &self,
        method: PaymentMethod,
        amount_paid: Decimal,
        split: Option<&SplitComponents>,
    ) -> BillingResult<()> {
        if !method.is_split() {
            return Ok(());
        }

        let split = split.copied().unwrap_or_default();
        ensure_non_negative("cash_component", split.cash_component)?;
        ensure_non_negative("other_component", split.other_component)?;

        let actual = split.sum();
        if (actual - amount_paid).abs() < self.split_tolerance {
            Ok(())
        } else {
            Err(BillingError::SplitMismatch {
                expected: amount_paid,
                actual,
            })
        }
    }

    /// Back-fills the amount paid for a status the user picked directly.
    ///
    /// `Paid` settles the whole grand total and `Pending` clears the amount.
    /// `Partial` and `Cancelled` leave the amount for the caller.
    pub fn select_status(status: PaymentStatus, grand_total: Decimal, amount_paid: Decimal) -> StatusSelection {
        let amount_paid = match status {
            PaymentStatus::Paid => grand_total,
            PaymentStatus::Pending => Decimal::ZERO,
            PaymentStatus::Partial | PaymentStatus::Cancelled => amount_paid,
        };

        StatusSelection {
            amount_paid,
            status: Self::derive_status(grand_total, amount_paid, Some(status)),
        }
    }

    /// Defaults applied when the user switches payment method.
    ///
    /// Only call this on an explicit method change. On a new bill a
    /// single-tender method presumes full settlement. Entering a split method
    /// with nothing split yet seeds an even split of the amount paid, or of
    /// the grand total when a new bill has nothing paid yet. An existing split
    /// is kept as entered.
    pub fn select_method_defaults(
        &self,
        method: PaymentMethod,
        grand_total: Decimal,
        amount_paid: Decimal,
        existing_split: Option<&SplitComponents>,
        is_new_bill: bool,
    ) -> MethodDefaults {
        if !method.is_split() {
            let amount_paid = if is_new_bill && self.full_settlement_on_new_bill {
                grand_total
            } else {
                amount_paid
            };
            return MethodDefaults {
                amount_paid,
                split: None,
            };
        }

        if let Some(split) = existing_split {
            return MethodDefaults {
                amount_paid,
                split: Some(*split),
            };
        }

        if !self.seed_split_on_method_change {
            return MethodDefaults {
                amount_paid,
                split: None,
            };
        }

        let base = if amount_paid > Decimal::ZERO {
            amount_paid
        } else if is_new_bill && self.full_settlement_on_new_bill {
            grand_total
        } else {
            Decimal::ZERO
        };

        MethodDefaults {
            amount_paid: base,
            split: Some(self.seed_split(base)),
        }
    }

    /// Even split of `amount`; the cash half is rounded to the display scale
    /// and the other half takes the remainder, so the two always sum exactly.
    pub fn seed_split(&self, amount: Decimal) -> SplitComponents {
        let half = (amount / Decimal::TWO)
            .round_dp_with_strategy(self.display_scale, RoundingStrategy::MidpointAwayFromZero);
        SplitComponents::new(half, amount - half)
    }

    /// Suggests the other half of a split after the user typed one side.
    pub fn suggest_complement(amount_paid: Decimal, entered: Decimal, side: SplitSide) -> SplitComponents {
        let rest = (amount_paid - entered).max(Decimal::ZERO);
        match side {
            SplitSide::Cash => SplitComponents::new(entered, rest),
            SplitSide::Other => SplitComponents::new(rest, entered),
        }
    }

    /// Confirms the derived fields agree with the primary ones.
    ///
    /// # Errors
    ///
    /// `BillingError::InvalidInput` for a negative amount paid, and
    /// `BillingError::InvariantViolation` when a total or balance is negative,
    /// the balance is stale, or a non-cancelled status disagrees with the amounts.
    pub fn check_invariants(totals: &BillTotals, payment: &PaymentState) -> BillingResult<()> {
        ensure_non_negative("amount_paid", payment.amount_paid)?;
        if totals.grand_total < Decimal::ZERO {
            return Err(BillingError::InvariantViolation(format!(
                "grand total is negative ({})",
                totals.grand_total
            )));
        }
        if payment.balance_due < Decimal::ZERO {
            return Err(BillingError::InvariantViolation(format!(
                "balance due is negative ({})",
                payment.balance_due
            )));
        }

        let expected_balance = Self::compute_balance_due(totals.grand_total, payment.amount_paid);
        if payment.balance_due != expected_balance {
            return Err(BillingError::InvariantViolation(format!(
                "balance due {} does not match grand total {} less amount paid {}",
                payment.balance_due, totals.grand_total, payment.amount_paid
            )));
        }

        let derived = Self::derive_status(totals.grand_total, payment.amount_paid, payment.status_override());
        if derived != payment.status {
            return Err(BillingError::InvariantViolation(format!(
                "status {} does not match amounts (expected {derived})",
                payment.status
            )));
        }

        Ok(())
    }
}

impl Default for PaymentReconciler {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}
