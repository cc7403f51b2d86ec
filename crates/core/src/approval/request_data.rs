//! Type-specific request payloads.
//!
//! Each approval type carries its own strongly-typed payload. Payloads are
//! validated once, when the request is created; beyond that the engine
//! stores them opaquely.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::ApprovalType;

/// Validation errors for request payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestDataError {
    /// The payload could not be decoded for the given type.
    #[error("Malformed {approval_type} payload: {message}")]
    Malformed {
        /// The approval type the payload was decoded as.
        approval_type: ApprovalType,
        /// Decoder message (names the missing or invalid field).
        message: String,
    },

    /// A monetary field is zero or negative.
    #[error("Field '{field}' must be positive")]
    NotPositive {
        /// The offending field.
        field: &'static str,
    },

    /// A percentage lies outside the allowed range.
    #[error("Field '{field}' must be greater than 0 and at most 100")]
    PercentageOutOfRange {
        /// The offending field.
        field: &'static str,
    },

    /// A required text field is blank.
    #[error("Field '{field}' is required")]
    Blank {
        /// The offending field.
        field: &'static str,
    },

    /// Fields are individually valid but contradict each other.
    #[error("Inconsistent payload: {0}")]
    Inconsistent(String),
}

/// DISCOUNT_APPROVAL payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountApprovalData {
    /// Unit price before the discount.
    pub original_price: Decimal,
    /// Discount as a percentage of the original price.
    pub discount_percentage: Decimal,
    /// Discount as an absolute amount.
    pub discount_amount: Decimal,
    /// Price after the discount.
    pub sale_price: Decimal,
}

/// SALE_CANCELLATION payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleCancellationData {
    /// Booked value of the sale being cancelled.
    pub sale_value: Decimal,
    /// Why the sale is being cancelled.
    pub reason: String,
}

/// PRICE_OVERRIDE payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceOverrideData {
    /// Price from the project price list.
    pub base_price: Decimal,
    /// Price currently applied to the unit.
    pub current_price: Decimal,
    /// Requested new price.
    pub proposed_price: Decimal,
    /// Deviation of the proposed price from the base price, in percent.
    pub deviation_percentage: Decimal,
}

/// REFUND_APPROVAL payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundApprovalData {
    /// Amount to refund.
    pub refund_amount: Decimal,
    /// Amount of the payment being refunded.
    pub original_payment_amount: Decimal,
    /// Why the refund is issued.
    pub reason: String,
}

/// INSTALLMENT_MODIFICATION payload.
///
/// The original and proposed values depend on the modification type
/// (a due date, an amount, a schedule) and are kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentModificationData {
    /// Kind of modification, e.g. `due_date_change`.
    pub modification_type: String,
    /// Value before the modification.
    pub original_value: serde_json::Value,
    /// Requested value.
    pub proposed_value: serde_json::Value,
}

/// COMMISSION_PAYOUT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionPayoutData {
    /// Commission amount to pay out.
    pub amount: Decimal,
    /// Broker or agent receiving the payout.
    pub payee: String,
}

/// INVOICE_APPROVAL payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceApprovalData {
    /// Invoice total.
    pub invoice_amount: Decimal,
    /// Invoice category, e.g. `milestone` or `maintenance`.
    pub invoice_type: String,
}

/// Request payload, one variant per approval type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "approval_type",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum RequestData {
    /// Discount on a unit price.
    DiscountApproval(DiscountApprovalData),
    /// Cancellation of a booked sale.
    SaleCancellation(SaleCancellationData),
    /// Manual override of a unit price.
    PriceOverride(PriceOverrideData),
    /// Refund of a received payment.
    RefundApproval(RefundApprovalData),
    /// Change to an installment plan.
    InstallmentModification(InstallmentModificationData),
    /// Payout of a broker commission.
    CommissionPayout(CommissionPayoutData),
    /// Release of an invoice.
    InvoiceApproval(InvoiceApprovalData),
}

fn positive(value: Decimal, field: &'static str) -> Result<(), RequestDataError> {
    if value > Decimal::ZERO {
        Ok(())
    } else {
        Err(RequestDataError::NotPositive { field })
    }
}

fn non_blank(value: &str, field: &'static str) -> Result<(), RequestDataError> {
    if value.trim().is_empty() {
        Err(RequestDataError::Blank { field })
    } else {
        Ok(())
    }
}

impl RequestData {
    /// Decodes a loosely-typed JSON payload for the given approval type
    /// and validates it.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` when a field is missing or has the wrong shape,
    /// or any validation error from [`RequestData::validate`].
    pub fn from_json(
        approval_type: ApprovalType,
        payload: serde_json::Value,
    ) -> Result<Self, RequestDataError> {
        let tagged = serde_json::json!({
            "approval_type": approval_type.as_str(),
            "data": payload,
        });

        let data: Self =
            serde_json::from_value(tagged).map_err(|e| RequestDataError::Malformed {
                approval_type,
                message: e.to_string(),
            })?;

        data.validate()?;
        Ok(data)
    }

    /// The approval type this payload belongs to.
    #[must_use]
    pub fn approval_type(&self) -> ApprovalType {
        match self {
            Self::DiscountApproval(_) => ApprovalType::DiscountApproval,
            Self::SaleCancellation(_) => ApprovalType::SaleCancellation,
            Self::PriceOverride(_) => ApprovalType::PriceOverride,
            Self::RefundApproval(_) => ApprovalType::RefundApproval,
            Self::InstallmentModification(_) => ApprovalType::InstallmentModification,
            Self::CommissionPayout(_) => ApprovalType::CommissionPayout,
            Self::InvoiceApproval(_) => ApprovalType::InvoiceApproval,
        }
    }

    /// Validates the payload's required fields and internal consistency.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), RequestDataError> {
        match self {
            Self::DiscountApproval(d) => {
                positive(d.original_price, "originalPrice")?;
                positive(d.discount_amount, "discountAmount")?;
                if d.discount_percentage <= Decimal::ZERO
                    || d.discount_percentage > Decimal::ONE_HUNDRED
                {
                    return Err(RequestDataError::PercentageOutOfRange {
                        field: "discountPercentage",
                    });
                }
                if d.sale_price < Decimal::ZERO {
                    return Err(RequestDataError::NotPositive { field: "salePrice" });
                }
                if d.discount_amount > d.original_price {
                    return Err(RequestDataError::Inconsistent(
                        "discount amount exceeds original price".to_string(),
                    ));
                }
                if d.sale_price > d.original_price {
                    return Err(RequestDataError::Inconsistent(
                        "sale price exceeds original price".to_string(),
                    ));
                }
                Ok(())
            }
            Self::SaleCancellation(d) => {
                positive(d.sale_value, "saleValue")?;
                non_blank(&d.reason, "reason")
            }
            Self::PriceOverride(d) => {
                positive(d.base_price, "basePrice")?;
                positive(d.current_price, "currentPrice")?;
                positive(d.proposed_price, "proposedPrice")?;
                if d.proposed_price == d.current_price {
                    return Err(RequestDataError::Inconsistent(
                        "proposed price equals current price".to_string(),
                    ));
                }
                Ok(())
            }
            Self::RefundApproval(d) => {
                positive(d.refund_amount, "refundAmount")?;
                positive(d.original_payment_amount, "originalPaymentAmount")?;
                non_blank(&d.reason, "reason")?;
                if d.refund_amount > d.original_payment_amount {
                    return Err(RequestDataError::Inconsistent(
                        "refund amount exceeds original payment".to_string(),
                    ));
                }
                Ok(())
            }
            Self::InstallmentModification(d) => {
                non_blank(&d.modification_type, "modificationType")?;
                if d.original_value.is_null() {
                    return Err(RequestDataError::Blank {
                        field: "originalValue",
                    });
                }
                if d.proposed_value.is_null() {
                    return Err(RequestDataError::Blank {
                        field: "proposedValue",
                    });
                }
                if d.original_value == d.proposed_value {
                    return Err(RequestDataError::Inconsistent(
                        "proposed value equals original value".to_string(),
                    ));
                }
                Ok(())
            }
            Self::CommissionPayout(d) => {
                positive(d.amount, "amount")?;
                non_blank(&d.payee, "payee")
            }
            Self::InvoiceApproval(d) => {
                positive(d.invoice_amount, "invoiceAmount")?;
                non_blank(&d.invoice_type, "invoiceType")
            }
        }
    }

    /// The amount of money at stake, used for dual-control thresholds.
    ///
    /// Price overrides count the size of the change; installment changes
    /// count only when both values are plain numbers. A change too large to
    /// represent saturates at [`Decimal::MAX`].
    #[must_use]
    pub fn financial_amount(&self) -> Option<Decimal> {
        match self {
            Self::DiscountApproval(d) => Some(d.discount_amount),
            Self::SaleCancellation(d) => Some(d.sale_value),
            Self::PriceOverride(d) => Some(change(d.current_price, d.proposed_price)),
            Self::RefundApproval(d) => Some(d.refund_amount),
            Self::InstallmentModification(d) => {
                let original = json_decimal(&d.original_value)?;
                let proposed = json_decimal(&d.proposed_value)?;
                Some(change(original, proposed))
            }
            Self::CommissionPayout(d) => Some(d.amount),
            Self::InvoiceApproval(d) => Some(d.invoice_amount),
        }
    }
}

fn change(from: Decimal, to: Decimal) -> Decimal {
    from.checked_sub(to).map_or(Decimal::MAX, |d| d.abs())
}

fn json_decimal(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
