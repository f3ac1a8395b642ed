use rust_decimal::Decimal;

use crate::error::{ensure_non_negative, BillingError, BillingResult};
use crate::models::{CatalogEntry, LineItem, LineItemInput, LinePatch};

/// Which lines count towards a subtotal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubtotalMode {
    /// Every line, including ones still being filled in.
    #[default]
    IncludeAll,
    /// Skip lines whose service name is blank.
    ExcludeIncomplete,
}

/// Line total and subtotal arithmetic
pub struct LineItemCalculator;

impl LineItemCalculator {
    /// `max(0, quantity * unit_price - line_discount)`, quantity defaulting to 1.
    ///
    /// A discount larger than the line amount floors the total at zero rather
    /// than failing, since a form mid-edit passes through such states.
    ///
    /// # Errors
    ///
    /// `BillingError::InvalidInput` when any input is negative.
    pub fn compute_line_total(
        quantity: Option<Decimal>,
        unit_price: Decimal,
        line_discount: Decimal,
    ) -> BillingResult<Decimal> {
        let quantity = ensure_non_negative("quantity", quantity.unwrap_or(Decimal::ONE))?;
        let unit_price = ensure_non_negative("unit_price", unit_price)?;
        let line_discount = ensure_non_negative("line_discount", line_discount)?;

        Ok((quantity * unit_price - line_discount).max(Decimal::ZERO))
    }

    /// Sums the line totals.
    pub fn compute_subtotal(lines: &[LineItem], mode: SubtotalMode) -> Decimal {
        lines
            .iter()
            .filter(|line| mode == SubtotalMode::IncludeAll || line.is_complete())
            .map(LineItem::line_total)
            .sum()
    }
}

impl LineItem {
    /// # Errors
    ///
    /// `BillingError::InvalidInput` when quantity, price or discount is negative.
    pub fn new(input: LineItemInput) -> BillingResult<Self> {
        let line_total =
            LineItemCalculator::compute_line_total(input.quantity, input.unit_price, input.line_discount)?;

        Ok(Self {
            service_name: input.service_name,
            category: input.category,
            quantity: input.quantity.unwrap_or(Decimal::ONE),
            unit_price: input.unit_price,
            line_discount: input.line_discount,
            line_total,
        })
    }

    /// Empty template line: no name, quantity 1, no price.
    pub fn blank() -> Self {
        Self {
            service_name: String::new(),
            category: None,
            quantity: Decimal::ONE,
            unit_price: Decimal::ZERO,
            line_discount: Decimal::ZERO,
            line_total: Decimal::ZERO,
        }
    }

    /// # Errors
    ///
    /// `BillingError::InvalidInput` for a negative default price.
    pub fn from_catalog(entry: &CatalogEntry) -> BillingResult<Self> {
        Self::new(LineItemInput {
            service_name: entry.name.clone(),
            category: entry.category.clone(),
            quantity: None,
            unit_price: entry.default_price,
            line_discount: Decimal::ZERO,
        })
    }

    /// Returns the edited line with its total recomputed.
    ///
    /// # Errors
    ///
    /// `BillingError::InvalidInput` when the edit makes a number negative.
    pub fn apply(&self, patch: &LinePatch) -> BillingResult<Self> {
        Self::new(LineItemInput {
            service_name: patch
                .service_name
                .clone()
                .unwrap_or_else(|| self.service_name.clone()),
            category: self.category.clone(),
            quantity: Some(patch.quantity.unwrap_or(self.quantity)),
            unit_price: patch.unit_price.unwrap_or(self.unit_price),
            line_discount: patch.line_discount.unwrap_or(self.line_discount),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn line_discount(&self) -> Decimal {
        self.line_discount
    }

    pub fn line_total(&self) -> Decimal {
        self.line_total
    }

    /// A line counts for persistence only once it has a service name.
    pub fn is_complete(&self) -> bool {
        !self.service_name.trim().is_empty()
    }

    /// Untouched template line.
    pub fn is_blank(&self) -> bool {
        !self.is_complete() && self.unit_price.is_zero() && self.line_discount.is_zero()
    }
}

impl TryFrom<LineItemInput> for LineItem {
    type Error = BillingError;

    fn try_from(input: LineItemInput) -> Result<Self, Self::Error> {
        Self::new(input)
    }
}

impl From<&LineItem> for LineItemInput {
    fn from(line: &LineItem) -> Self {
        Self {
            service_name: line.service_name.clone(),
            category: line.category.clone(),
            quantity: Some(line.quantity),
            unit_price: line.unit_price,
            line_discount: line.line_discount,
        }
    }
}
