use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::commit::ReconciledBill;
use crate::models::{PaymentStatus, Tender};

/// Count and money for one payment status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusBucket {
    pub count: u64,
    pub amount: Decimal,
}

/// Figures over a set of non-cancelled bills
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub bill_count: u64,
    pub revenue: Decimal,
    pub collected: Decimal,
    pub outstanding: Decimal,
    /// Amount is what was collected.
    pub paid: StatusBucket,
    /// Amount is the full grand total.
    pub pending: StatusBucket,
    /// Amount is the balance still due.
    pub partial: StatusBucket,
}

impl PeriodSummary {
    fn add(&mut self, bill: &ReconciledBill) {
        let totals = &bill.totals;
        let payment = &bill.payment;

        self.bill_count += 1;
        self.revenue += totals.grand_total;
        self.collected += payment.amount_paid;
        self.outstanding += payment.balance_due;

        let (bucket, amount) = match payment.status {
            PaymentStatus::Paid => (&mut self.paid, payment.amount_paid),
            PaymentStatus::Pending => (&mut self.pending, totals.grand_total),
            PaymentStatus::Partial => (&mut self.partial, payment.balance_due),
            PaymentStatus::Cancelled => return,
        };
        bucket.count += 1;
        bucket.amount += amount;
    }
}

/// Collected money per tender
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TenderBreakdown {
    pub cash: Decimal,
    pub upi: Decimal,
    pub card: Decimal,
    pub bank: Decimal,
}

impl TenderBreakdown {
    fn credit(&mut self, tender: Tender, amount: Decimal) {
        let slot = match tender {
            Tender::Cash => &mut self.cash,
            Tender::Upi => &mut self.upi,
            Tender::Card => &mut self.card,
            Tender::Bank => &mut self.bank,
        };
        *slot += amount;
    }

    fn add(&mut self, bill: &ReconciledBill) {
        let payment = &bill.payment;
        if let Some(tender) = payment.method.tender() {
            self.credit(tender, payment.amount_paid);
        } else if let (Some(other), Some(split)) = (payment.method.other_tender(), payment.split) {
            self.credit(Tender::Cash, split.cash_component);
            self.credit(other, split.other_component);
        }
    }

    pub fn total(&self) -> Decimal {
        self.cash + self.upi + self.card + self.bank
    }
}

/// Service-level revenue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRevenue {
    pub service_name: String,
    pub category: Option<String>,
    pub quantity: Decimal,
    pub total_charges: Decimal,
    /// Bills carrying at least one line for this service.
    pub bill_count: u64,
}

/// Clinic collection dashboard figures
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionSummary {
    pub all_time: PeriodSummary,
    /// Bills dated `today`.
    pub today: PeriodSummary,
    pub cancelled_count: u64,
    pub tenders: TenderBreakdown,
    pub by_service: Vec<ServiceRevenue>,
}

impl CollectionSummary {
    /// Aggregates committed bills. Cancelled bills only add to `cancelled_count`.
    pub fn from_bills(bills: &[ReconciledBill], today: NaiveDate) -> Self {
        let mut summary = Self::default();
        let mut services: BTreeMap<&str, ServiceRevenue> = BTreeMap::new();

        for bill in bills {
            if bill.payment.status == PaymentStatus::Cancelled {
                summary.cancelled_count += 1;
                continue;
            }

            summary.all_time.add(bill);
            if bill.context.bill_date == today {
                summary.today.add(bill);
            }
            summary.tenders.add(bill);

            let mut seen: Vec<&str> = Vec::new();
            for line in bill.lines.iter().filter(|line| line.is_complete()) {
                let name = line.service_name();
                let entry = services.entry(name).or_insert_with(|| ServiceRevenue {
                    service_name: name.to_string(),
                    category: line.category().map(str::to_string),
                    quantity: Decimal::ZERO,
                    total_charges: Decimal::ZERO,
                    bill_count: 0,
                });
                entry.quantity += line.quantity();
                entry.total_charges += line.line_total();
                if !seen.contains(&name) {
                    seen.push(name);
                    entry.bill_count += 1;
                }
            }
        }

        summary.by_service = services.into_values().collect();
        summary
    }
}
