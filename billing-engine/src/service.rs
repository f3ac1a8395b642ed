use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use logger_redacted::PiiRedactor;

use crate::config::EngineConfig;
use crate::error::{ensure_non_negative, BillingError, BillingResult};
use crate::line_items::SubtotalMode;
use crate::models::*;
use crate::payment::PaymentReconciler;
use crate::totals::BillTotals;

/// Bill aggregate: ordered lines, bill-level adjustments and payment fields,
/// with totals, balance and status always derived from them.
///
/// A `Bill` is only ever produced by [`BillingService`], which recomputes
/// every derived field on each edit, so a value of this type is never stale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bill {
    pub(crate) context: BillContext,
    pub(crate) lines: Vec<LineItem>,
    pub(crate) adjustments: BillAdjustments,
    pub(crate) totals: BillTotals,
    pub(crate) payment: PaymentState,
    pub(crate) notes: Option<String>,
    /// Stored version this copy was loaded from; 0 for a bill never committed.
    pub(crate) version: u64,
}

impl Bill {
    pub fn context(&self) -> &BillContext {
        &self.context
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn adjustments(&self) -> &BillAdjustments {
        &self.adjustments
    }

    pub fn totals(&self) -> &BillTotals {
        &self.totals
    }

    pub fn payment(&self) -> &PaymentState {
        &self.payment
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// True until the bill has been committed once.
    pub fn is_new(&self) -> bool {
        self.version == 0
    }
}

/// A single user edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "edit", content = "value", rename_all = "snake_case")]
pub enum BillEdit {
    AddLine(LineItemInput),
    AddCatalogLine(CatalogEntry),
    UpdateLine { index: usize, patch: LinePatch },
    RemoveLine { index: usize },
    SetTaxPercent(Decimal),
    SetFlatDiscount(Decimal),
    SetAdditionalDiscount(Decimal),
    SetAmountPaid(Decimal),
    /// Fires the method defaults.
    SelectPaymentMethod(PaymentMethod),
    SetSplit(SplitComponents),
    /// Fires the status back-fill.
    SelectStatus(PaymentStatus),
    SetPaymentReference(Option<String>),
    SetNotes(Option<String>),
}

impl BillEdit {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddLine(_) => "add_line",
            Self::AddCatalogLine(_) => "add_catalog_line",
            Self::UpdateLine { .. } => "update_line",
            Self::RemoveLine { .. } => "remove_line",
            Self::SetTaxPercent(_) => "set_tax_percent",
            Self::SetFlatDiscount(_) => "set_flat_discount",
            Self::SetAdditionalDiscount(_) => "set_additional_discount",
            Self::SetAmountPaid(_) => "set_amount_paid",
            Self::SelectPaymentMethod(_) => "select_payment_method",
            Self::SetSplit(_) => "set_split",
            Self::SelectStatus(_) => "select_status",
            Self::SetPaymentReference(_) => "set_payment_reference",
            Self::SetNotes(_) => "set_notes",
        }
    }
}

/// Ordered edits applied as one recomputation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillPatch {
    pub edits: Vec<BillEdit>,
}

impl BillPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, edit: BillEdit) -> Self {
        self.edits.push(edit);
        self
    }
}

impl From<BillEdit> for BillPatch {
    fn from(edit: BillEdit) -> Self {
        Self { edits: vec![edit] }
    }
}

impl From<Vec<BillEdit>> for BillPatch {
    fn from(edits: Vec<BillEdit>) -> Self {
        Self { edits }
    }
}

/// Billing service: the only way bills are created and changed
pub struct BillingService {
    pub(crate) config: EngineConfig,
    pub(crate) reconciler: PaymentReconciler,
    pub(crate) redactor: PiiRedactor,
}

impl BillingService {
    /// Create a new billing service
    pub fn new(config: EngineConfig) -> Self {
        Self {
            reconciler: PaymentReconciler::new(&config),
            config,
            redactor: PiiRedactor::default(),
        }
    }

    /// Replaces the redactor applied to references and notes in log events.
    pub fn with_redactor(mut self, redactor: PiiRedactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn reconciler(&self) -> &PaymentReconciler {
        &self.reconciler
    }

    /// Builds a new bill from its initial lines. No lines gives one blank template line.
    ///
    /// # Errors
    ///
    /// `BillingError::InvalidInput` when a line has a negative number.
    pub fn create_bill(&self, context: BillContext, lines: Vec<LineItemInput>) -> BillingResult<Bill> {
        let mut lines = lines
            .into_iter()
            .map(LineItem::new)
            .collect::<BillingResult<Vec<_>>>()?;
        if lines.is_empty() {
            lines.push(LineItem::blank());
        }

        let mut bill = Bill {
            context,
            lines,
            adjustments: BillAdjustments::default(),
            totals: BillTotals::default(),
            payment: PaymentState::default(),
            notes: None,
            version: 0,
        };

        // Nothing is forced on a fresh bill.
        bill.totals = BillTotals::compute(&bill.lines, &bill.adjustments, SubtotalMode::IncludeAll)?;
        bill.payment.status =
            PaymentReconciler::derive_status(bill.totals.grand_total, bill.payment.amount_paid, None);
        bill.payment.balance_due =
            PaymentReconciler::compute_balance_due(bill.totals.grand_total, bill.payment.amount_paid);

        debug!(
            patient_id = %bill.context.patient_id,
            lines = bill.lines.len(),
            grand_total = %bill.totals.grand_total,
            "Bill created"
        );
        Ok(bill)
    }

    /// Applies `patch` to a copy of `bill` and returns the recomputed copy.
    ///
    /// Edits run in order and totals, balance and status are re-derived after
    /// each one, so a method change sees the grand total left by earlier
    /// edits. On error `bill` is untouched. A split that does not add up is
    /// allowed here; it blocks [`BillingService::finalize`] only.
    ///
    /// # Errors
    ///
    /// `BillingError::InvalidInput` for negative numbers,
    /// `BillingError::LineNotFound` for a bad line index and
    /// `BillingError::InvariantViolation` if derivation goes wrong.
    pub fn recompute_bill(&self, bill: &Bill, patch: impl Into<BillPatch>) -> BillingResult<Bill> {
        let mut next = bill.clone();

        for edit in patch.into().edits {
            let kind = edit.kind();
            self.apply_edit(&mut next, edit)?;
            Self::refresh(&mut next)?;
            debug!(
                edit = kind,
                grand_total = %next.totals.grand_total,
                amount_paid = %next.payment.amount_paid,
                status = %next.payment.status,
                "Bill edit applied"
            );
        }

        PaymentReconciler::check_invariants(&next.totals, &next.payment)?;
        Ok(next)
    }

    /// Live split check for enabling the save action.
    ///
    /// # Errors
    ///
    /// `BillingError::SplitMismatch` or `BillingError::InvalidInput` as
    /// returned by [`PaymentReconciler::validate_split`].
    pub fn split_check(&self, bill: &Bill) -> BillingResult<()> {
        self.reconciler.validate_split(
            bill.payment.method,
            bill.payment.amount_paid,
            bill.payment.split.as_ref(),
        )
    }

    fn apply_edit(&self, bill: &mut Bill, edit: BillEdit) -> BillingResult<()> {
        match edit {
            BillEdit::AddLine(input) => bill.lines.push(LineItem::new(input)?),
            BillEdit::AddCatalogLine(entry) => {
                let line = LineItem::from_catalog(&entry)?;
                // A catalog pick fills the untouched template line instead of sitting under it.
                if matches!(bill.lines.as_slice(), [only] if only.is_blank()) {
                    bill.lines.clear();
                }
                bill.lines.push(line);
            }
            BillEdit::UpdateLine { index, patch } => {
                let line = bill
                    .lines
                    .get_mut(index)
                    .ok_or(BillingError::LineNotFound { index })?;
                *line = line.apply(&patch)?;
            }
            BillEdit::RemoveLine { index } => {
                if index >= bill.lines.len() {
                    return Err(BillingError::LineNotFound { index });
                }
                bill.lines.remove(index);
                if bill.lines.is_empty() {
                    bill.lines.push(LineItem::blank());
                }
            }
            BillEdit::SetTaxPercent(tax_percent) => {
                bill.adjustments.tax_percent = ensure_non_negative("tax_percent", tax_percent)?;
            }
            BillEdit::SetFlatDiscount(discount) => {
                bill.adjustments.flat_discount = ensure_non_negative("flat_discount", discount)?;
            }
            BillEdit::SetAdditionalDiscount(discount) => {
                bill.adjustments.additional_discount = ensure_non_negative("additional_discount", discount)?;
            }
            BillEdit::SetAmountPaid(amount) => {
                bill.payment.amount_paid = ensure_non_negative("amount_paid", amount)?;
                bill.payment.forced_status = None;
            }
            BillEdit::SelectPaymentMethod(method) => {
                let defaults = self.reconciler.select_method_defaults(
                    method,
                    bill.totals.grand_total,
                    bill.payment.amount_paid,
                    bill.payment.split.as_ref(),
                    bill.is_new(),
                );
                bill.payment.method = method;
                bill.payment.amount_paid = defaults.amount_paid;
                bill.payment.split = defaults.split;
                bill.payment.forced_status = None;
            }
            BillEdit::SetSplit(split) => {
                ensure_non_negative("cash_component", split.cash_component)?;
                ensure_non_negative("other_component", split.other_component)?;
                bill.payment.split = Some(split);
            }
            BillEdit::SelectStatus(status) => {
                let selection =
                    PaymentReconciler::select_status(status, bill.totals.grand_total, bill.payment.amount_paid);
                bill.payment.amount_paid = selection.amount_paid;
                bill.payment.status = selection.status;
                bill.payment.forced_status = Some(status);
            }
            BillEdit::SetPaymentReference(reference) => {
                bill.payment.reference = reference.filter(|r| !r.trim().is_empty());
            }
            BillEdit::SetNotes(notes) => {
                bill.notes = notes.filter(|n| !n.trim().is_empty());
            }
        }
        Ok(())
    }

    /// Re-derives totals, status and balance from the primary fields.
    pub(crate) fn refresh(bill: &mut Bill) -> BillingResult<()> {
        bill.totals = BillTotals::compute(&bill.lines, &bill.adjustments, SubtotalMode::IncludeAll)?;
        bill.payment.status = PaymentReconciler::derive_status(
            bill.totals.grand_total,
            bill.payment.amount_paid,
            bill.payment.status_override(),
        );
        bill.payment.balance_due =
            PaymentReconciler::compute_balance_due(bill.totals.grand_total, bill.payment.amount_paid);
        Ok(())
    }
}

impl Default for BillingService {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn context() -> BillContext {
        BillContext::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2026, 3, 14).unwrap())
    }

    fn consultation(price: Decimal) -> LineItemInput {
        LineItemInput {
            service_name: "Consultation".to_string(),
            unit_price: price,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_bill_derives_totals() {
        let service = BillingService::default();
        let bill = service.create_bill(context(), vec![consultation(dec!(500))]).unwrap();

        assert_eq!(bill.totals().grand_total, dec!(500));
        assert_eq!(bill.payment().status, PaymentStatus::Pending);
        assert_eq!(bill.payment().balance_due, dec!(500));
        assert!(bill.is_new());
    }

    #[test]
    fn test_create_bill_without_lines_has_template() {
        let service = BillingService::default();
        let bill = service.create_bill(context(), vec![]).unwrap();

        assert_eq!(bill.lines().len(), 1);
        assert!(bill.lines()[0].is_blank());
        assert_eq!(bill.payment().status, PaymentStatus::Paid);
    }

    #[test]
    fn test_recompute_leaves_original_untouched() {
        let service = BillingService::default();
        let bill = service.create_bill(context(), vec![consultation(dec!(500))]).unwrap();

        let paid = service.recompute_bill(&bill, BillEdit::SetAmountPaid(dec!(200))).unwrap();
        assert_eq!(paid.payment().status, PaymentStatus::Partial);
        assert_eq!(bill.payment().amount_paid, Decimal::ZERO);
    }

    #[test]
    fn test_failed_patch_is_atomic() {
        let service = BillingService::default();
        let bill = service.create_bill(context(), vec![consultation(dec!(500))]).unwrap();

        let patch = BillPatch::new()
            .with(BillEdit::SetAmountPaid(dec!(100)))
            .with(BillEdit::SetTaxPercent(dec!(-1)));
        assert!(matches!(
            service.recompute_bill(&bill, patch),
            Err(BillingError::InvalidInput { field: "tax_percent", .. })
        ));
        assert_eq!(bill.payment().amount_paid, Decimal::ZERO);
    }

    #[test]
    fn test_line_edits() {
        let service = BillingService::default();
        let bill = service.create_bill(context(), vec![consultation(dec!(500))]).unwrap();

        let bill = service
            .recompute_bill(
                &bill,
                vec![
                    BillEdit::AddLine(LineItemInput {
                        service_name: "Dressing".to_string(),
                        quantity: Some(dec!(2)),
                        unit_price: dec!(100),
                        ..Default::default()
                    }),
                    BillEdit::UpdateLine {
                        index: 1,
                        patch: LinePatch {
                            line_discount: Some(dec!(50)),
                            ..Default::default()
                        },
                    },
                ],
            )
            .unwrap();
        assert_eq!(bill.totals().subtotal, dec!(650));

        let bill = service.recompute_bill(&bill, BillEdit::RemoveLine { index: 0 }).unwrap();
        assert_eq!(bill.totals().subtotal, dec!(150));

        assert!(matches!(
            service.recompute_bill(&bill, BillEdit::RemoveLine { index: 5 }),
            Err(BillingError::LineNotFound { index: 5 })
        ));
    }

    #[test]
    fn test_removing_last_line_leaves_template() {
        let service = BillingService::default();
        let bill = service.create_bill(context(), vec![consultation(dec!(500))]).unwrap();

        let bill = service.recompute_bill(&bill, BillEdit::RemoveLine { index: 0 }).unwrap();
        assert_eq!(bill.lines().len(), 1);
        assert!(bill.lines()[0].is_blank());
        assert_eq!(bill.totals().grand_total, Decimal::ZERO);
    }

    #[test]
    fn test_catalog_pick_replaces_template() {
        let service = BillingService::default();
        let bill = service.create_bill(context(), vec![]).unwrap();
        let entry = CatalogEntry {
            name: "Nebulization".to_string(),
            category: Some("Procedure".to_string()),
            default_price: dec!(250),
        };

        let bill = service.recompute_bill(&bill, BillEdit::AddCatalogLine(entry.clone())).unwrap();
        assert_eq!(bill.lines().len(), 1);
        assert_eq!(bill.totals().subtotal, dec!(250));

        let bill = service.recompute_bill(&bill, BillEdit::AddCatalogLine(entry)).unwrap();
        assert_eq!(bill.lines().len(), 2);
        assert_eq!(bill.totals().subtotal, dec!(500));
    }

    #[test]
    fn test_line_edit_keeps_partial_amount() {
        let service = BillingService::default();
        let bill = service.create_bill(context(), vec![consultation(dec!(500))]).unwrap();

        let bill = service
            .recompute_bill(
                &bill,
                vec![
                    BillEdit::SelectPaymentMethod(PaymentMethod::Cash),
                    BillEdit::SetAmountPaid(dec!(200)),
                ],
            )
            .unwrap();
        assert_eq!(bill.payment().status, PaymentStatus::Partial);

        let bill = service
            .recompute_bill(&bill, BillEdit::AddLine(consultation(dec!(300))))
            .unwrap();
        assert_eq!(bill.payment().amount_paid, dec!(200));
        assert_eq!(bill.payment().balance_due, dec!(600));
        assert_eq!(bill.payment().status, PaymentStatus::Partial);
    }

    #[test]
    fn test_partial_bill_discounted_to_zero_reads_paid() {
        let service = BillingService::default();
        let bill = service.create_bill(context(), vec![consultation(dec!(500))]).unwrap();

        for edits in [
            vec![BillEdit::SetAmountPaid(dec!(200)), BillEdit::SetFlatDiscount(dec!(500))],
            vec![BillEdit::SetFlatDiscount(dec!(500)), BillEdit::SetAmountPaid(dec!(200))],
        ] {
            let bill = service.recompute_bill(&bill, edits).unwrap();
            assert_eq!(bill.totals().grand_total, Decimal::ZERO);
            assert_eq!(bill.payment().balance_due, Decimal::ZERO);
            assert_eq!(bill.payment().status, PaymentStatus::Paid);
        }
    }

    #[test]
    fn test_pending_bill_discounted_to_zero_reads_paid() {
        let service = BillingService::default();
        let bill = service.create_bill(context(), vec![consultation(dec!(500))]).unwrap();
        assert_eq!(bill.payment().status, PaymentStatus::Pending);

        let bill = service.recompute_bill(&bill, BillEdit::SetFlatDiscount(dec!(500))).unwrap();
        assert_eq!(bill.payment().status, PaymentStatus::Paid);
    }

    #[test]
    fn test_selected_pending_holds_at_zero_total() {
        let service = BillingService::default();
        let bill = service.create_bill(context(), vec![consultation(dec!(500))]).unwrap();

        let bill = service
            .recompute_bill(
                &bill,
                vec![
                    BillEdit::SelectStatus(PaymentStatus::Pending),
                    BillEdit::SetFlatDiscount(dec!(500)),
                ],
            )
            .unwrap();
        assert_eq!(bill.payment().forced_status, Some(PaymentStatus::Pending));
        assert_eq!(bill.payment().status, PaymentStatus::Pending);

        // Entering an amount hands the status back to the derivation.
        let bill = service.recompute_bill(&bill, BillEdit::SetAmountPaid(dec!(0))).unwrap();
        assert_eq!(bill.payment().forced_status, None);
        assert_eq!(bill.payment().status, PaymentStatus::Paid);
    }

    #[test]
    fn test_blank_reference_is_cleared() {
        let service = BillingService::default();
        let bill = service.create_bill(context(), vec![consultation(dec!(500))]).unwrap();

        let bill = service
            .recompute_bill(&bill, BillEdit::SetPaymentReference(Some("  ".to_string())))
            .unwrap();
        assert_eq!(bill.payment().reference, None);
    }

    #[test]
    fn test_edit_wire_format() {
        let edit = BillEdit::SelectPaymentMethod(PaymentMethod::CashPlusUpi);
        let json = serde_json::to_string(&edit).unwrap();
        assert_eq!(json, r#"{"edit":"select_payment_method","value":"cash+upi"}"#);

        let parsed: BillEdit = serde_json::from_str(r#"{"edit":"remove_line","value":{"index":2}}"#).unwrap();
        assert_eq!(parsed, BillEdit::RemoveLine { index: 2 });
    }
}
