use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BillingError;

/// Service line on a bill.
///
/// `line_total` is derived from quantity, unit price and line discount and is
/// only ever written by the line item calculator. Deserialising goes through
/// [`LineItemInput`], so a stored total is recomputed rather than trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LineItemInput")]
pub struct LineItem {
    pub(crate) service_name: String,
    pub(crate) category: Option<String>,
    pub(crate) quantity: Decimal,
    pub(crate) unit_price: Decimal,
    pub(crate) line_discount: Decimal,
    pub(crate) line_total: Decimal,
}

/// Caller-supplied fields of a line item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItemInput {
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Defaults to 1 when absent.
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(default)]
    pub line_discount: Decimal,
}

/// Partial update of a line item; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinePatch {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub line_discount: Option<Decimal>,
}

/// Named service with a default price, used to pre-fill a new line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub category: Option<String>,
    pub default_price: Decimal,
}

/// Bill-level tax rate and flat deductions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillAdjustments {
    /// Percentage, 18 means 18%.
    #[serde(default)]
    pub tax_percent: Decimal,
    #[serde(default)]
    pub flat_discount: Decimal,
    #[serde(default)]
    pub additional_discount: Decimal,
}

/// Payment method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[default]
    #[serde(rename = "cash")]
    Cash,
    #[serde(rename = "upi", alias = "gpay")]
    Upi,
    #[serde(rename = "debit_card")]
    DebitCard,
    #[serde(rename = "credit_card")]
    CreditCard,
    #[serde(rename = "bank_transfer")]
    BankTransfer,
    #[serde(rename = "cash+upi")]
    CashPlusUpi,
    #[serde(rename = "cash+card")]
    CashPlusCard,
}

/// Kind of money received, used to break collections down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tender {
    Cash,
    Upi,
    Card,
    Bank,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 7] = [
        Self::Cash,
        Self::Upi,
        Self::DebitCard,
        Self::CreditCard,
        Self::BankTransfer,
        Self::CashPlusUpi,
        Self::CashPlusCard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Upi => "upi",
            Self::DebitCard => "debit_card",
            Self::CreditCard => "credit_card",
            Self::BankTransfer => "bank_transfer",
            Self::CashPlusUpi => "cash+upi",
            Self::CashPlusCard => "cash+card",
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self, Self::CashPlusUpi | Self::CashPlusCard)
    }

    /// Tender of a single-tender method; `None` for split methods.
    pub fn tender(&self) -> Option<Tender> {
        match self {
            Self::Cash => Some(Tender::Cash),
            Self::Upi => Some(Tender::Upi),
            Self::DebitCard | Self::CreditCard => Some(Tender::Card),
            Self::BankTransfer => Some(Tender::Bank),
            Self::CashPlusUpi | Self::CashPlusCard => None,
        }
    }

    /// Non-cash half of a split method.
    pub fn other_tender(&self) -> Option<Tender> {
        match self {
            Self::CashPlusUpi => Some(Tender::Upi),
            Self::CashPlusCard => Some(Tender::Card),
            _ => None,
        }
    }

    pub fn other_tender_label(&self) -> Option<&'static str> {
        match self.other_tender() {
            Some(Tender::Upi) => Some("UPI"),
            Some(Tender::Card) => Some("Card"),
            _ => None,
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(Self::Cash),
            "upi" | "gpay" => Ok(Self::Upi),
            "debit_card" => Ok(Self::DebitCard),
            "credit_card" => Ok(Self::CreditCard),
            "bank_transfer" => Ok(Self::BankTransfer),
            "cash+upi" => Ok(Self::CashPlusUpi),
            "cash+card" => Ok(Self::CashPlusCard),
            _ => Err(BillingError::UnknownPaymentMethod(s.to_string())),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Partial,
    #[serde(alias = "completed")]
    Paid,
    /// Set only by an explicit caller action; derivation never leaves it.
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "partial" => Ok(Self::Partial),
            "paid" | "completed" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(BillingError::UnknownPaymentStatus(s.to_string())),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two halves of a split payment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitComponents {
    pub cash_component: Decimal,
    pub other_component: Decimal,
}

impl SplitComponents {
    pub fn new(cash_component: Decimal, other_component: Decimal) -> Self {
        Self {
            cash_component,
            other_component,
        }
    }

    pub fn sum(&self) -> Decimal {
        self.cash_component + self.other_component
    }
}

/// Which half of a split the user typed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitSide {
    Cash,
    Other,
}

/// Payment fields of a bill. `balance_due` and `status` are kept consistent
/// with the amounts by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentState {
    pub method: PaymentMethod,
    pub amount_paid: Decimal,
    /// Only meaningful for split methods.
    #[serde(default)]
    pub split: Option<SplitComponents>,
    pub status: PaymentStatus,
    pub balance_due: Decimal,
    /// Opaque external transaction id.
    #[serde(default)]
    pub reference: Option<String>,
    /// Status the user picked directly. Cleared when the amount or method changes.
    #[serde(default)]
    pub forced_status: Option<PaymentStatus>,
}

impl PaymentState {
    /// Status the derivation must honour: a cancellation, else the user's pick.
    pub fn status_override(&self) -> Option<PaymentStatus> {
        if self.status == PaymentStatus::Cancelled {
            Some(PaymentStatus::Cancelled)
        } else {
            self.forced_status
        }
    }
}

/// Externally assigned identity of a bill
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillContext {
    pub patient_id: Uuid,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
    #[serde(default)]
    pub clinic_id: Option<Uuid>,
    pub bill_date: NaiveDate,
}

impl BillContext {
    pub fn new(patient_id: Uuid, bill_date: NaiveDate) -> Self {
        Self {
            patient_id,
            appointment_id: None,
            clinic_id: None,
            bill_date,
        }
    }

    pub fn with_appointment(mut self, appointment_id: Uuid) -> Self {
        self.appointment_id = Some(appointment_id);
        self
    }

    pub fn with_clinic(mut self, clinic_id: Uuid) -> Self {
        self.clinic_id = Some(clinic_id);
        self
    }
}
