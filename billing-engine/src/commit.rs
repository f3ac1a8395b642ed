use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use logger_redacted::{redacted_debug, redacted_warn};

use crate::error::{BillingError, BillingResult};
use crate::line_items::SubtotalMode;
use crate::models::*;
use crate::payment::PaymentReconciler;
use crate::service::{Bill, BillingService};
use crate::totals::BillTotals;

/// Fully reconciled bill, ready to be written in one unit.
///
/// This is the only shape persistence, receipts and notifications should
/// consume; none of them re-derive totals or status on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledBill {
    pub context: BillContext,
    pub lines: Vec<LineItem>,
    pub adjustments: BillAdjustments,
    pub totals: BillTotals,
    pub payment: PaymentState,
    /// Caller notes, without the split summary.
    pub notes: Option<String>,
    /// e.g. `Split: Cash ₹150.00 + UPI ₹150.00`
    pub payment_note: Option<String>,
    pub version: u64,
}

impl ReconciledBill {
    /// Caller notes and split summary joined the way receipts print them.
    pub fn display_notes(&self) -> Option<String> {
        match (self.notes.as_deref(), self.payment_note.as_deref()) {
            (Some(notes), Some(split)) => Some(format!("{notes} | {split}")),
            (Some(notes), None) => Some(notes.to_string()),
            (None, Some(split)) => Some(split.to_string()),
            (None, None) => None,
        }
    }
}

impl BillingService {
    /// Produces the record to persist.
    ///
    /// Blank-named lines are dropped (unless configured otherwise), every
    /// derived field is recomputed over what remains, and the split and
    /// invariants are checked. The record keeps the bill's version.
    ///
    /// # Errors
    ///
    /// `BillingError::EmptyBill` when no line has a service name,
    /// `BillingError::SplitMismatch` when split components do not add up,
    /// `BillingError::InvalidInput` for a negative amount paid and
    /// `BillingError::InvariantViolation` if derivation goes wrong.
    pub fn finalize(&self, bill: &Bill) -> BillingResult<ReconciledBill> {
        let result = self.reconcile(bill);
        if let Err(err) = &result {
            warn!(
                patient_id = %bill.context.patient_id,
                version = bill.version,
                error = %err,
                "Bill finalize blocked"
            );
        }
        result
    }

    fn reconcile(&self, bill: &Bill) -> BillingResult<ReconciledBill> {
        let lines: Vec<LineItem> = if self.config.exclude_incomplete_lines_on_commit {
            bill.lines.iter().filter(|line| line.is_complete()).cloned().collect()
        } else {
            bill.lines.clone()
        };
        if !lines.iter().any(LineItem::is_complete) {
            return Err(BillingError::EmptyBill);
        }

        let totals = BillTotals::compute(&lines, &bill.adjustments, SubtotalMode::IncludeAll)?;
        let mut payment = bill.payment.clone();
        payment.status =
            PaymentReconciler::derive_status(totals.grand_total, payment.amount_paid, payment.status_override());
        payment.balance_due = PaymentReconciler::compute_balance_due(totals.grand_total, payment.amount_paid);
        if !payment.method.is_split() {
            payment.split = None;
        }

        self.reconciler
            .validate_split(payment.method, payment.amount_paid, payment.split.as_ref())?;
        PaymentReconciler::check_invariants(&totals, &payment)?;

        let payment_note = self.split_note(&payment);

        Ok(ReconciledBill {
            context: bill.context.clone(),
            lines,
            adjustments: bill.adjustments.clone(),
            totals,
            payment,
            notes: bill.notes.clone(),
            payment_note,
            version: bill.version,
        })
    }

    /// Finalizes `bill` for a write guarded by the stored version.
    ///
    /// The version is checked before anything else. The returned record
    /// carries `stored_version + 1`; the persistence layer writes it only if
    /// the stored version is still `stored_version`.
    ///
    /// # Errors
    ///
    /// `BillingError::Conflict` (retryable, see [`BillingService::rebase`])
    /// when the bill was loaded from another version, plus everything
    /// [`BillingService::finalize`] returns.
    pub fn prepare_commit(&self, bill: &Bill, stored_version: u64) -> BillingResult<ReconciledBill> {
        if bill.version != stored_version {
            warn!(
                patient_id = %bill.context.patient_id,
                expected = bill.version,
                found = stored_version,
                "Bill version conflict"
            );
            return Err(BillingError::Conflict {
                expected: bill.version,
                found: stored_version,
            });
        }

        let mut record = self.finalize(bill)?;
        record.version = stored_version + 1;

        let reference = record
            .payment
            .reference
            .as_deref()
            .map(|r| self.redactor.redact_reference(r))
            .unwrap_or_default();
        info!(
            patient_id = %record.context.patient_id,
            version = record.version,
            grand_total = %record.totals.grand_total,
            amount_paid = %record.payment.amount_paid,
            status = %record.payment.status,
            method = %record.payment.method,
            reference = %reference,
            "Bill commit prepared"
        );
        if let Some(notes) = record.notes.as_deref() {
            redacted_debug!(self.redactor, notes, version = record.version, "Bill notes");
        }

        Ok(record)
    }

    /// Rebuilds an editable bill from a stored record, re-deriving every total.
    ///
    /// # Errors
    ///
    /// `BillingError::InvariantViolation` when the stored status cannot be
    /// reconciled with the stored amounts, or `BillingError::InvalidInput` for
    /// a negative stored adjustment or amount paid.
    pub fn load_bill(&self, record: &ReconciledBill) -> BillingResult<Bill> {
        let mut lines = record.lines.clone();
        if lines.is_empty() {
            lines.push(LineItem::blank());
        }

        let mut bill = Bill {
            context: record.context.clone(),
            lines,
            adjustments: record.adjustments.clone(),
            totals: BillTotals::default(),
            payment: record.payment.clone(),
            notes: record.notes.clone(),
            version: record.version,
        };
        Self::refresh(&mut bill)?;
        PaymentReconciler::check_invariants(&bill.totals, &bill.payment)?;
        Ok(bill)
    }

    /// Re-runs this editor's payment fields against the latest stored record
    /// after a [`BillingError::Conflict`].
    ///
    /// Lines, adjustments and notes come from `latest`; method, amount paid,
    /// split, status and reference come from `bill`. Totals, balance and status
    /// are recomputed, so nothing from the stale copy survives unchecked.
    ///
    /// A cancellation in `latest` stands: the stored payment fields are kept
    /// and the caller gets back a cancelled bill to review.
    ///
    /// # Errors
    ///
    /// As [`BillingService::load_bill`].
    pub fn rebase(&self, bill: &Bill, latest: &ReconciledBill) -> BillingResult<Bill> {
        let mut rebased = self.load_bill(latest)?;
        if latest.payment.status == PaymentStatus::Cancelled {
            warn!(
                patient_id = %latest.context.patient_id,
                from_version = bill.version,
                to_version = latest.version,
                "Bill cancelled by another editor; payment changes not carried over"
            );
            return Ok(rebased);
        }

        rebased.payment.method = bill.payment.method;
        rebased.payment.amount_paid = bill.payment.amount_paid;
        rebased.payment.split = bill.payment.split;
        rebased.payment.status = bill.payment.status;
        rebased.payment.forced_status = bill.payment.forced_status;
        rebased.payment.reference = bill.payment.reference.clone();
        Self::refresh(&mut rebased)?;
        PaymentReconciler::check_invariants(&rebased.totals, &rebased.payment)?;

        if let Some(reference) = rebased.payment.reference.as_deref() {
            redacted_warn!(
                self.redactor,
                reference,
                from_version = bill.version,
                to_version = rebased.version,
                "Bill rebased after conflict"
            );
        }
        Ok(rebased)
    }

    fn split_note(&self, payment: &PaymentState) -> Option<String> {
        let label = payment.method.other_tender_label()?;
        let split = payment.split?;
        Some(format!(
            "Split: Cash {} + {} {}",
            self.config.format_amount(split.cash_component),
            label,
            self.config.format_amount(split.other_component)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::BillEdit;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn bill_with(service: &BillingService, lines: Vec<LineItemInput>) -> Bill {
        let context = BillContext::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
        service.create_bill(context, lines).unwrap()
    }

    fn named(name: &str, price: Decimal) -> LineItemInput {
        LineItemInput {
            service_name: name.to_string(),
            unit_price: price,
            ..Default::default()
        }
    }

    #[test]
    fn test_finalize_drops_blank_lines() {
        let service = BillingService::default();
        let bill = bill_with(&service, vec![named("Consultation", dec!(500)), named("", dec!(200))]);
        assert_eq!(bill.totals().grand_total, dec!(700));

        let record = service.finalize(&bill).unwrap();
        assert_eq!(record.lines.len(), 1);
        assert_eq!(record.totals.grand_total, dec!(500));
        assert_eq!(record.payment.balance_due, dec!(500));
    }

    #[test]
    fn test_finalize_keeps_blank_lines_when_configured() {
        let service = BillingService::new(crate::config::EngineConfig {
            exclude_incomplete_lines_on_commit: false,
            ..Default::default()
        });
        let bill = bill_with(&service, vec![named("Consultation", dec!(500)), named("", dec!(200))]);

        let record = service.finalize(&bill).unwrap();
        assert_eq!(record.totals.grand_total, dec!(700));
    }

    #[test]
    fn test_finalize_empty_bill() {
        let service = BillingService::default();
        let bill = bill_with(&service, vec![]);
        assert!(matches!(service.finalize(&bill), Err(BillingError::EmptyBill)));
    }

    #[test]
    fn test_finalize_blocks_on_split_mismatch() {
        let service = BillingService::default();
        let bill = bill_with(&service, vec![named("Consultation", dec!(300))]);
        let bill = service
            .recompute_bill(
                &bill,
                vec![
                    BillEdit::SelectPaymentMethod(PaymentMethod::CashPlusUpi),
                    BillEdit::SetSplit(SplitComponents::new(dec!(150), dec!(100))),
                ],
            )
            .unwrap();

        let err = service.finalize(&bill).unwrap_err();
        assert!(matches!(err, BillingError::SplitMismatch { .. }));
        assert!(err.is_blocking_save());
    }

    #[test]
    fn test_split_note() {
        let service = BillingService::default();
        let bill = bill_with(&service, vec![named("Consultation", dec!(300))]);
        let bill = service
            .recompute_bill(
                &bill,
                vec![
                    BillEdit::SetNotes(Some("Follow-up in 7 days".to_string())),
                    BillEdit::SelectPaymentMethod(PaymentMethod::CashPlusCard),
                ],
            )
            .unwrap();

        let record = service.finalize(&bill).unwrap();
        assert_eq!(record.payment_note.as_deref(), Some("Split: Cash ₹150.00 + Card ₹150.00"));
        assert_eq!(
            record.display_notes().as_deref(),
            Some("Follow-up in 7 days | Split: Cash ₹150.00 + Card ₹150.00")
        );
    }

    #[test]
    fn test_prepare_commit_bumps_version() {
        let service = BillingService::default();
        let bill = bill_with(&service, vec![named("Consultation", dec!(500))]);

        let record = service.prepare_commit(&bill, 0).unwrap();
        assert_eq!(record.version, 1);

        let reloaded = service.load_bill(&record).unwrap();
        assert!(!reloaded.is_new());
        assert_eq!(reloaded.version(), 1);
    }

    #[test]
    fn test_prepare_commit_conflict() {
        let service = BillingService::default();
        let bill = bill_with(&service, vec![named("Consultation", dec!(500))]);

        let err = service.prepare_commit(&bill, 3).unwrap_err();
        assert!(matches!(err, BillingError::Conflict { expected: 0, found: 3 }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_load_rederives_stored_status() {
        let service = BillingService::default();
        let bill = bill_with(&service, vec![named("Consultation", dec!(500))]);
        let mut record = service.prepare_commit(&bill, 0).unwrap();

        // Stored as paid with nothing paid: derivation moves it to pending, never silently keeps it.
        record.payment.status = PaymentStatus::Paid;
        let reloaded = service.load_bill(&record).unwrap();
        assert_eq!(reloaded.payment().status, PaymentStatus::Pending);
    }

    #[test]
    fn test_load_rejects_negative_amount_paid() {
        let service = BillingService::default();
        let bill = bill_with(&service, vec![named("Consultation", dec!(500))]);
        let mut record = service.prepare_commit(&bill, 0).unwrap();

        record.payment.amount_paid = dec!(-100);
        record.payment.balance_due = dec!(600);
        assert!(matches!(
            service.load_bill(&record),
            Err(BillingError::InvalidInput { field: "amount_paid", .. })
        ));
    }

    #[test]
    fn test_finalize_rejects_negative_amount_paid() {
        let service = BillingService::default();
        let mut bill = bill_with(&service, vec![named("Consultation", dec!(500))]);
        bill.payment.amount_paid = dec!(-100);

        let err = service.finalize(&bill).unwrap_err();
        assert!(matches!(err, BillingError::InvalidInput { field: "amount_paid", .. }));
        assert!(err.is_blocking_save());
    }

    #[test]
    fn test_rebase_keeps_cancellation() {
        let service = BillingService::default();
        let bill = bill_with(&service, vec![named("Consultation", dec!(500))]);
        let stored = service.prepare_commit(&bill, 0).unwrap();

        let reception = service.load_bill(&stored).unwrap();
        let cashier = service.load_bill(&stored).unwrap();

        let reception = service
            .recompute_bill(&reception, BillEdit::SelectStatus(PaymentStatus::Cancelled))
            .unwrap();
        let latest = service.prepare_commit(&reception, 1).unwrap();
        assert_eq!(latest.payment.status, PaymentStatus::Cancelled);

        let cashier = service
            .recompute_bill(&cashier, BillEdit::SetAmountPaid(dec!(500)))
            .unwrap();
        assert!(service.prepare_commit(&cashier, latest.version).is_err());

        let rebased = service.rebase(&cashier, &latest).unwrap();
        assert_eq!(rebased.payment().status, PaymentStatus::Cancelled);
        assert_eq!(rebased.payment().amount_paid, Decimal::ZERO);

        let committed = service.prepare_commit(&rebased, latest.version).unwrap();
        assert_eq!(committed.payment.status, PaymentStatus::Cancelled);
        assert_eq!(committed.version, 3);
    }
}
