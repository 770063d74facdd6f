use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::ServiceOutcome;
use crate::domain::contact::Urn;
use crate::CoreError;

/// Typed failures of an airtime transfer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AirtimeError {
    /// No amount was configured for the recipient's currency
    #[error("no amount configured for transfers in {0}")]
    NoAmountForCurrency(String),

    /// Every product costs more than the configured amount
    #[error("amount requested {amount} {currency} is below the minimum product of {minimum}")]
    BelowMinimum {
        /// Recipient's currency
        currency: String,
        /// Amount configured for that currency
        amount: Decimal,
        /// Cheapest product available
        minimum: Decimal,
    },

    /// The provider failed the transfer
    #[error("airtime provider error: {0}")]
    Provider(String),
}

/// A product a provider sells, priced in the recipient's currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirtimeProduct {
    /// Provider specific product code
    pub code: String,
    /// Value of the product
    pub value: Decimal,
}

/// A completed airtime transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirtimeTransfer {
    /// Sender, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Urn>,
    /// Recipient
    pub recipient: Urn,
    /// Currency the transfer was made in
    pub currency: String,
    /// Amount configured for that currency
    pub desired_amount: Decimal,
    /// Amount actually transferred
    pub actual_amount: Decimal,
}

/// Transfers airtime to phone numbers
#[async_trait]
pub trait AirtimeService: Send + Sync {
    /// Transfer the amount configured for the recipient's currency in `amounts`
    async fn transfer(
        &self,
        sender: Option<&Urn>,
        recipient: &Urn,
        amounts: &BTreeMap<String, Decimal>,
    ) -> ServiceOutcome<AirtimeTransfer, AirtimeError>;
}

/// Creates the airtime service for a session
pub type AirtimeServiceFactory =
    Arc<dyn Fn() -> Result<Arc<dyn AirtimeService>, CoreError> + Send + Sync>;

/// The most valuable product whose value doesn't exceed `amount`
///
/// Products without a positive value are never picked.
pub fn select_product(products: &[AirtimeProduct], amount: Decimal) -> Option<&AirtimeProduct> {
    products
        .iter()
        .filter(|p| p.value > Decimal::ZERO && p.value <= amount)
        .fold(None, |best: Option<&AirtimeProduct>, p| match best {
            Some(b) if b.value >= p.value => Some(b),
            _ => Some(p),
        })
}
