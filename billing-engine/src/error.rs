use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    /// A negative amount, quantity or percentage reached the engine.
    #[error("Invalid input: {field} must not be negative (got {value})")]
    InvalidInput { field: &'static str, value: Decimal },

    /// Split components do not add up to the amount paid.
    #[error("Split payment mismatch: components sum to {actual}, amount paid is {expected}")]
    SplitMismatch { expected: Decimal, actual: Decimal },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Line item {index} does not exist")]
    LineNotFound { index: usize },

    #[error("Bill has no billable line items")]
    EmptyBill,

    /// The stored bill moved on since this copy was loaded.
    #[error("Bill version conflict: edited version {expected}, stored version {found}")]
    Conflict { expected: u64, found: u64 },

    #[error("Unknown payment method: {0}")]
    UnknownPaymentMethod(String),

    #[error("Unknown payment status: {0}")]
    UnknownPaymentStatus(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl BillingError {
    /// Only a version conflict can succeed on retry, after rebasing onto the stored bill.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Errors that keep the save action disabled while they hold.
    pub fn is_blocking_save(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. } | Self::SplitMismatch { .. } | Self::EmptyBill
        )
    }
}

pub type BillingResult<T> = Result<T, BillingError>;

/// Rejects negative values for `field`.
pub(crate) fn ensure_non_negative(field: &'static str, value: Decimal) -> BillingResult<Decimal> {
    if value < Decimal::ZERO {
        return Err(BillingError::InvalidInput { field, value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ensure_non_negative() {
        assert_eq!(ensure_non_negative("quantity", dec!(2)).unwrap(), dec!(2));
        assert_eq!(ensure_non_negative("quantity", Decimal::ZERO).unwrap(), Decimal::ZERO);
        assert!(matches!(
            ensure_non_negative("unit_price", dec!(-0.01)),
            Err(BillingError::InvalidInput { field: "unit_price", .. })
        ));
    }

    #[test]
    fn test_error_classification() {
        let conflict = BillingError::Conflict { expected: 1, found: 2 };
        assert!(conflict.is_retryable());
        assert!(!conflict.is_blocking_save());

        let mismatch = BillingError::SplitMismatch { expected: dec!(300), actual: dec!(250) };
        assert!(mismatch.is_blocking_save());
        assert!(!mismatch.is_retryable());
        assert_eq!(
            mismatch.to_string(),
            "Split payment mismatch: components sum to 250, amount paid is 300"
        );
    }
}
