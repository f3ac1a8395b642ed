use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, BillingResult};
use crate::line_items::{LineItemCalculator, SubtotalMode};
use crate::models::{BillAdjustments, LineItem};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Derived bill totals. Never stored on its own; always recomputed from the
/// current lines and adjustments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillTotals {
    pub subtotal: Decimal,
    pub tax_percent: Decimal,
    pub tax_amount: Decimal,
    pub flat_discount: Decimal,
    pub additional_discount: Decimal,
    pub grand_total: Decimal,
}

impl BillTotals {
    /// `subtotal * tax_percent / 100`, with an absent rate meaning no tax.
    ///
    /// # Errors
    ///
    /// `BillingError::InvalidInput` for a negative subtotal or rate.
    pub fn compute_tax_amount(subtotal: Decimal, tax_percent: Option<Decimal>) -> BillingResult<Decimal> {
        let subtotal = ensure_non_negative("subtotal", subtotal)?;
        let tax_percent = ensure_non_negative("tax_percent", tax_percent.unwrap_or_default())?;
        Ok(subtotal * tax_percent / HUNDRED)
    }

    /// `max(0, subtotal + tax_amount - flat_discount - additional_discount)`.
    ///
    /// # Errors
    ///
    /// `BillingError::InvalidInput` when any amount is negative.
    pub fn compute_grand_total(
        subtotal: Decimal,
        tax_amount: Decimal,
        flat_discount: Option<Decimal>,
        additional_discount: Option<Decimal>,
    ) -> BillingResult<Decimal> {
        let subtotal = ensure_non_negative("subtotal", subtotal)?;
        let tax_amount = ensure_non_negative("tax_amount", tax_amount)?;
        let flat_discount = ensure_non_negative("flat_discount", flat_discount.unwrap_or_default())?;
        let additional_discount =
            ensure_non_negative("additional_discount", additional_discount.unwrap_or_default())?;

        Ok((subtotal + tax_amount - flat_discount - additional_discount).max(Decimal::ZERO))
    }

    /// Recomputes every total from the given lines and adjustments.
    ///
    /// # Errors
    ///
    /// `BillingError::InvalidInput` when an adjustment is negative.
    pub fn compute(
        lines: &[LineItem],
        adjustments: &BillAdjustments,
        mode: SubtotalMode,
    ) -> BillingResult<Self> {
        let subtotal = LineItemCalculator::compute_subtotal(lines, mode);
        let tax_amount = Self::compute_tax_amount(subtotal, Some(adjustments.tax_percent))?;
        let grand_total = Self::compute_grand_total(
            subtotal,
            tax_amount,
            Some(adjustments.flat_discount),
            Some(adjustments.additional_discount),
        )?;

        Ok(Self {
            subtotal,
            tax_percent: adjustments.tax_percent,
            tax_amount,
            flat_discount: adjustments.flat_discount,
            additional_discount: adjustments.additional_discount,
            grand_total,
        })
    }

    /// Both bill-level deductions together, as shown on a receipt.
    pub fn total_discount(&self) -> Decimal {
        self.flat_discount + self.additional_discount
    }
}
