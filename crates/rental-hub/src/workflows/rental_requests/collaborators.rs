//! Outbound seams to the systems the lifecycle engine depends on but does not own.
//!
//! Implementations are expected to enforce their own deadlines and report an elapsed
//! deadline as a `Timeout` error so callers can retry.

use serde::{Deserialize, Serialize};

use super::domain::{HouseId, HouseListing, OrderId, Principal, RentalRequest, UserId};

/// Resolves credentials into principals.
pub trait IdentityDirectory: Send + Sync {
    fn resolve(&self, credential: &str) -> Result<Principal, AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredential,
    #[error("credentials not recognised")]
    UnknownCredential,
    #[error("identity directory unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of rental-house inventory.
pub trait HouseRegistry: Send + Sync {
    /// Soft-deleted houses are reported as `NotFound`.
    fn listing(&self, house_id: &HouseId) -> Result<HouseListing, RegistryError>;
    fn owned_by(&self, landlord_id: &UserId) -> Result<Vec<HouseId>, RegistryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("house not found")]
    NotFound,
    #[error("house registry unavailable: {0}")]
    Unavailable(String),
    #[error("house registry timed out")]
    Timeout,
}

/// Checkout handle returned when a payment is initiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub order_id: OrderId,
    pub checkout_url: String,
}

/// Opaque payment processor.
pub trait PaymentGateway: Send + Sync {
    fn initiate_checkout(&self, request: &RentalRequest) -> Result<Checkout, GatewayError>;
    /// Reports whether funds for the order have been captured.
    fn verify_status(&self, order_id: &OrderId) -> Result<bool, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("gateway does not know order {0}")]
    UnknownOrder(OrderId),
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
    #[error("payment gateway timed out")]
    Timeout,
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_) | GatewayError::Timeout)
    }
}
