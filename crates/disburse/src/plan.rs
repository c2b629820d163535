//! Disbursement plan: validated inputs plus all derived amounts.

use meritdrop_core::{parse_units, Address};

use crate::{DisburseError, Result};

/// A fully validated disbursement: who gets paid, how much each, and the
/// total the disbursement contract must be approved for.
///
/// All derived amounts are integer base units; the human-entered amount is
/// kept only for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisbursementPlan {
    pub token: Address,
    pub decimals: u8,
    /// Per-recipient amount as entered, in human units.
    pub amount_each: String,
    /// Recipient wallets in dataset order.
    pub recipients: Vec<Address>,
    /// Per-recipient amount in base units.
    pub amount_each_base: u128,
    /// `amount_each_base * recipients.len()`, checked.
    pub total_base: u128,
}

impl DisbursementPlan {
    /// Build and validate a plan. Every failure here is a validation
    /// error: nothing has touched the chain yet.
    pub fn build(
        token: Address,
        decimals: u8,
        amount_each: &str,
        recipients: Vec<Address>,
    ) -> Result<Self> {
        if token.is_zero() {
            return Err(DisburseError::Validation(
                "token address is required".to_string(),
            ));
        }
        if recipients.is_empty() {
            return Err(DisburseError::Validation(
                "no recipients match the criterion".to_string(),
            ));
        }
        let amount_each_base = parse_units(amount_each, decimals)
            .map_err(|e| DisburseError::Validation(format!("per-recipient amount: {e}")))?;
        if amount_each_base == 0 {
            return Err(DisburseError::Validation(
                "per-recipient amount must be positive".to_string(),
            ));
        }
        let total_base = amount_each_base
            .checked_mul(recipients.len() as u128)
            .ok_or_else(|| {
                DisburseError::Validation("total amount does not fit in 128 bits".to_string())
            })?;

        Ok(Self {
            token,
            decimals,
            amount_each: amount_each.trim().to_string(),
            recipients,
            amount_each_base,
            total_base,
        })
    }

    /// Per-recipient amounts in submission order.
    pub fn amounts(&self) -> Vec<u128> {
        vec![self.amount_each_base; self.recipients.len()]
    }
}
